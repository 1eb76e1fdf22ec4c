use crate::container::chain;
use crate::container::descriptor::{Activated, ConstructionPlan, Instance, ServiceId};
use crate::container::lifecycle::Disposable;
use crate::container::resolver::{ServiceRequest, ServiceResolver};
use crate::container::selector::select_constructor;
use crate::errors::{BoxError, ContainerError};
use std::sync::Arc;

/// Fallback producing a parameter value when DI yields nothing
pub type DefaultFn = Arc<dyn Fn() -> Instance + Send + Sync>;

/// Direct construction of an unregistered `Injectable` type
pub type SelfConstructFn = fn(&dyn ServiceResolver) -> Result<Instance, ContainerError>;

/// Trait for types the container can construct itself.
///
/// Implementors declare their public constructors explicitly; the best one
/// for the registered services is chosen once, at registration time.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn constructors() -> Vec<Constructor<Self>>;

    /// Expose the disposal contract so the owner can release this instance
    fn as_disposable(self: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        None
    }
}

/// Conversion from an implementation to the contract it is registered under.
///
/// Every type converts to itself. Trait-object contracts are declared with
/// [`impl_upcast!`](crate::impl_upcast).
pub trait Upcast<T: ?Sized>: Send + Sync + 'static {
    fn upcast(self: Arc<Self>) -> Arc<T>;
}

impl<T: Send + Sync + 'static> Upcast<T> for T {
    fn upcast(self: Arc<Self>) -> Arc<T> {
        self
    }
}

/// Declare that an implementation can be registered under trait-object contracts.
///
/// ```ignore
/// impl_upcast!(SqlRepository => dyn Repository, dyn HealthCheck);
/// ```
#[macro_export]
macro_rules! impl_upcast {
    ($implementation:ty => $($contract:ty),+ $(,)?) => {
        $(
            impl $crate::container::Upcast<$contract> for $implementation {
                fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$contract> {
                    self
                }
            }
        )+
    };
}

/// How a parameter is satisfied when DI has no registration for it
#[derive(Clone)]
pub enum ParameterKind {
    /// Must be supplied by DI or an explicit argument
    Required,
    /// Nullable: receives `None` when nothing is registered
    Optional,
    /// Falls back to a declared default value
    Defaulted(DefaultFn),
    /// Constructed directly when the type is not registered
    SelfConstructing(SelfConstructFn),
}

impl std::fmt::Debug for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterKind::Required => write!(f, "Required"),
            ParameterKind::Optional => write!(f, "Optional"),
            ParameterKind::Defaulted(_) => write!(f, "Defaulted(<default_fn>)"),
            ParameterKind::SelfConstructing(_) => write!(f, "SelfConstructing"),
        }
    }
}

/// Declared constructor parameter
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub name: &'static str,
    pub service_id: ServiceId,
    pub kind: ParameterKind,
    /// Resolve through the key table instead of the type table
    pub key: Option<String>,
}

impl ParameterInfo {
    /// Nullable parameters accept a null argument and resolve to `None`
    pub fn is_nullable(&self) -> bool {
        matches!(self.kind, ParameterKind::Optional)
    }

    /// Whether DI must produce a value for this parameter
    pub fn is_required(&self) -> bool {
        matches!(self.kind, ParameterKind::Required)
    }
}

type BuildFn<T> = Arc<dyn Fn(&mut Arguments<'_>) -> Result<T, BoxError> + Send + Sync>;

/// A public constructor of `T`: its parameter list and the function building `T`.
///
/// ```ignore
/// Constructor::new(|args| Ok(ReportService::new(args.next()?, args.next_optional()?)))
///     .param::<dyn Logger>("logger")
///     .optional_param::<Settings>("settings")
/// ```
pub struct Constructor<T> {
    parameters: Vec<ParameterInfo>,
    build: BuildFn<T>,
}

impl<T> Clone for Constructor<T> {
    fn clone(&self) -> Self {
        Self {
            parameters: self.parameters.clone(),
            build: self.build.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Constructor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constructor")
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Constructor<T> {
    /// Create a constructor. Arguments are read in parameter declaration order.
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&mut Arguments<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            parameters: Vec::new(),
            build: Arc::new(build),
        }
    }

    fn push<P: ?Sized + 'static>(mut self, name: &'static str, kind: ParameterKind, key: Option<String>) -> Self {
        self.parameters.push(ParameterInfo {
            name,
            service_id: ServiceId::of::<P>(),
            kind,
            key,
        });
        self
    }

    /// Declare a parameter DI must satisfy
    pub fn param<P: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.push::<P>(name, ParameterKind::Required, None)
    }

    /// Declare a nullable parameter, read with [`Arguments::next_optional`]
    pub fn optional_param<P: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.push::<P>(name, ParameterKind::Optional, None)
    }

    /// Declare a parameter with a default used when `P` is not registered
    pub fn param_or<P, F>(self, name: &'static str, default: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<P> + Send + Sync + 'static,
    {
        let default: DefaultFn = Arc::new(move || Arc::new(default()) as Instance);
        self.push::<P>(name, ParameterKind::Defaulted(default), None)
    }

    /// Declare a parameter falling back to `P::default()`
    pub fn param_or_default<P: Default + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.param_or::<P, _>(name, || Arc::new(P::default()))
    }

    /// Declare a parameter resolved by key
    pub fn keyed_param<P: ?Sized + Send + Sync + 'static>(
        self,
        name: &'static str,
        key: impl Into<String>,
    ) -> Self {
        self.push::<P>(name, ParameterKind::Required, Some(key.into()))
    }

    /// Declare a concrete parameter constructed directly when it is not registered
    pub fn injectable_param<P: Injectable>(self, name: &'static str) -> Self {
        self.push::<P>(
            name,
            ParameterKind::SelfConstructing(construct_unregistered::<P>),
            None,
        )
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }
}

/// Resolved constructor arguments, consumed in declaration order
pub struct Arguments<'a> {
    implementation: &'static str,
    parameters: &'a [ParameterInfo],
    values: Vec<Option<Instance>>,
    position: usize,
}

impl<'a> Arguments<'a> {
    pub(crate) fn new(
        implementation: &'static str,
        parameters: &'a [ParameterInfo],
        values: Vec<Option<Instance>>,
    ) -> Self {
        Self {
            implementation,
            parameters,
            values,
            position: 0,
        }
    }

    /// Take the next argument, failing if it is absent
    pub fn next<T>(&mut self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let index = self.position;
        match self.next_optional::<T>()? {
            Some(value) => Ok(value),
            None => {
                let parameter = self.parameters.get(index).map(|p| p.name).unwrap_or("?");
                Err(ContainerError::UnresolvableParameter {
                    parameter: parameter.to_string(),
                    parameter_type: std::any::type_name::<T>().to_string(),
                    implementation: self.implementation.to_string(),
                    chain: chain::current_path(),
                })
            }
        }
    }

    /// Take the next argument of a nullable parameter
    pub fn next_optional<T>(&mut self) -> Result<Option<Arc<T>>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let index = self.position;
        let parameter = self.parameters.get(index).ok_or_else(|| {
            ContainerError::UnresolvableParameter {
                parameter: format!("#{}", index),
                parameter_type: std::any::type_name::<T>().to_string(),
                implementation: self.implementation.to_string(),
                chain: format!("constructor declares {} parameter(s)", self.parameters.len()),
            }
        })?;
        self.position += 1;

        match self.values.get_mut(index).and_then(Option::take) {
            None => Ok(None),
            Some(instance) => instance
                .downcast_ref::<Arc<T>>()
                .cloned()
                .map(Some)
                .ok_or_else(|| ContainerError::TypeMismatch {
                    expected: std::any::type_name::<T>().to_string(),
                    found: parameter.service_id.type_name().to_string(),
                }),
        }
    }

    /// Number of arguments not yet taken
    pub fn remaining(&self) -> usize {
        self.parameters.len().saturating_sub(self.position)
    }
}

/// Pre-bound value for one parameter
#[derive(Clone)]
pub(crate) enum Supplied {
    /// Resolve through DI
    Resolve,
    Value(Instance),
    Null,
}

/// Fill every parameter and run the constructor
pub(crate) fn construct<T: Injectable>(
    resolver: &dyn ServiceResolver,
    constructor: &Constructor<T>,
    supplied: Vec<Supplied>,
) -> Result<Arc<T>, ContainerError> {
    let implementation = std::any::type_name::<T>();
    let mut values = Vec::with_capacity(constructor.parameters.len());

    for (index, parameter) in constructor.parameters.iter().enumerate() {
        let value = match supplied.get(index) {
            Some(Supplied::Value(value)) => Some(value.clone()),
            Some(Supplied::Null) => None,
            Some(Supplied::Resolve) | None => resolve_parameter(resolver, implementation, parameter)?,
        };
        values.push(value);
    }

    let mut arguments = Arguments::new(implementation, &constructor.parameters, values);
    let value = (constructor.build)(&mut arguments)
        .map_err(|error| ContainerError::construction_failed(implementation, error))?;
    Ok(Arc::new(value))
}

fn resolve_parameter(
    resolver: &dyn ServiceResolver,
    implementation: &'static str,
    parameter: &ParameterInfo,
) -> Result<Option<Instance>, ContainerError> {
    let mut request = ServiceRequest::optional(parameter.service_id);
    if let Some(key) = parameter.key.as_deref() {
        request = request.with_key(key);
    }
    if let ParameterKind::SelfConstructing(fallback) = &parameter.kind {
        request = request.with_fallback(*fallback);
    }

    if let Some(instance) = resolver.resolve_instance(&request)? {
        return Ok(Some(instance));
    }

    match &parameter.kind {
        ParameterKind::Optional => Ok(None),
        ParameterKind::Defaulted(default) => Ok(Some(default())),
        ParameterKind::Required | ParameterKind::SelfConstructing(_) => {
            Err(ContainerError::UnresolvableParameter {
                parameter: parameter.name.to_string(),
                parameter_type: parameter.service_id.type_name().to_string(),
                implementation: implementation.to_string(),
                chain: chain::current_path(),
            })
        }
    }
}

/// Select the constructor of `I` for pure DI and compile its activation
pub(crate) fn plan_for<C, I>() -> ConstructionPlan
where
    C: ?Sized + Send + Sync + 'static,
    I: Injectable + Upcast<C>,
{
    let implementation = ServiceId::of::<I>();
    let constructors = I::constructors();
    let selected = select_constructor(
        implementation.type_name(),
        constructors.iter().map(|c| c.parameters()),
        &[],
    )
    .ok()
    .and_then(|selection| constructors.into_iter().nth(selection.index));

    let Some(constructor) = selected else {
        tracing::debug!(implementation = %implementation, "No viable constructor; failure deferred to resolution");
        return ConstructionPlan {
            implementation,
            parameters: None,
            activate: Arc::new(move |_: &dyn ServiceResolver| -> Result<Activated, ContainerError> {
                Err(ContainerError::NoViableConstructor {
                    implementation: implementation.type_name().to_string(),
                    supplied: String::new(),
                })
            }),
        };
    };

    let parameters = constructor.parameters().to_vec();
    ConstructionPlan {
        implementation,
        parameters: Some(parameters),
        activate: Arc::new(move |resolver: &dyn ServiceResolver| -> Result<Activated, ContainerError> {
            let instance = construct(resolver, &constructor, Vec::new())?;
            let disposable = I::as_disposable(&instance);
            let contract: Arc<C> = <I as Upcast<C>>::upcast(instance);
            Ok(Activated {
                instance: Arc::new(contract),
                disposable,
            })
        }),
    }
}

/// Construct an unregistered `T` for the current owner, which tracks its disposal
pub(crate) fn construct_unregistered<T: Injectable>(
    resolver: &dyn ServiceResolver,
) -> Result<Instance, ContainerError> {
    let _frame = chain::enter(ServiceId::of::<T>(), resolver.max_resolution_depth())?;
    let instance = crate::container::activator::instantiate::<T>(resolver, Vec::new())?;

    if let Some(disposable) = T::as_disposable(&instance) {
        resolver.track_disposable(disposable)?;
    }
    tracing::debug!(service = std::any::type_name::<T>(), "Constructed unregistered service");
    Ok(Arc::new(instance))
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Logger: Send + Sync {
        fn name(&self) -> &str;
    }

    struct ConsoleLogger;

    impl Logger for ConsoleLogger {
        fn name(&self) -> &str {
            "console"
        }
    }

    crate::impl_upcast!(ConsoleLogger => dyn Logger);

    #[derive(Default)]
    struct Settings;

    #[test]
    fn test_upcast_to_trait_object() {
        let logger: Arc<dyn Logger> = <ConsoleLogger as Upcast<dyn Logger>>::upcast(Arc::new(ConsoleLogger));
        assert_eq!(logger.name(), "console");
    }

    #[test]
    fn test_parameter_declarations() {
        let constructor: Constructor<()> = Constructor::new(|_| Ok(()))
            .param::<dyn Logger>("logger")
            .optional_param::<Settings>("settings")
            .param_or_default::<Settings>("fallback")
            .keyed_param::<dyn Logger>("audit", "audit");

        let parameters = constructor.parameters();
        assert_eq!(parameters.len(), 4);
        assert!(parameters[0].is_required());
        assert!(parameters[1].is_nullable());
        assert!(matches!(parameters[2].kind, ParameterKind::Defaulted(_)));
        assert_eq!(parameters[3].key.as_deref(), Some("audit"));
        assert!(parameters[0].service_id.is::<dyn Logger>());
    }

    #[test]
    fn test_arguments_in_declaration_order() {
        let constructor: Constructor<()> = Constructor::new(|_| Ok(()))
            .param::<dyn Logger>("logger")
            .optional_param::<Settings>("settings");
        let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger);
        let logger: Instance = Arc::new(logger);
        let values = vec![Some(logger), None];

        let mut arguments = Arguments::new("test::Target", constructor.parameters(), values);
        assert_eq!(arguments.remaining(), 2);
        assert_eq!(arguments.next::<dyn Logger>().unwrap().name(), "console");
        assert!(arguments.next_optional::<Settings>().unwrap().is_none());
        assert_eq!(arguments.remaining(), 0);
        assert!(arguments.next::<Settings>().is_err());
    }

    #[test]
    fn test_arguments_reject_wrong_type() {
        let constructor: Constructor<()> = Constructor::new(|_| Ok(())).param::<Settings>("settings");
        let settings: Instance = Arc::new(Arc::new(Settings));
        let values = vec![Some(settings)];

        let mut arguments = Arguments::new("test::Target", constructor.parameters(), values);
        let result = arguments.next::<dyn Logger>();
        assert!(matches!(result, Err(ContainerError::TypeMismatch { .. })));
    }

    #[test]
    fn test_missing_required_argument_names_parameter() {
        let constructor: Constructor<()> = Constructor::new(|_| Ok(())).param::<Settings>("settings");
        let mut arguments = Arguments::new("test::Target", constructor.parameters(), vec![None]);

        match arguments.next::<Settings>() {
            Err(ContainerError::UnresolvableParameter { parameter, implementation, .. }) => {
                assert_eq!(parameter, "settings");
                assert_eq!(implementation, "test::Target");
            }
            _ => panic!("expected an unresolvable parameter"),
        }
    }
}
