//! Construction of types that are not registered in the container.
//!
//! The caller supplies some constructor arguments by value and the resolver
//! fills the rest. Objects created here belong to the caller and are never
//! tracked for disposal.

use crate::container::autowiring::{construct, Constructor, Injectable, Supplied};
use crate::container::chain;
use crate::container::descriptor::{Instance, ServiceId};
use crate::container::resolver::{ServiceResolver, ServiceResolverExt};
use crate::container::selector::{select_constructor, ArgumentType, Selection};
use crate::errors::ContainerError;
use std::sync::Arc;

/// An explicitly supplied constructor argument
#[derive(Clone)]
pub struct Argument {
    argument_type: ArgumentType,
    value: Option<Instance>,
}

impl Argument {
    /// Argument for a parameter declared with type `T`
    pub fn of<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            argument_type: ArgumentType::Typed(ServiceId::of::<T>()),
            value: Some(Arc::new(value)),
        }
    }

    /// Null argument for a nullable parameter
    pub fn null() -> Self {
        Self {
            argument_type: ArgumentType::Null,
            value: None,
        }
    }

    pub fn argument_type(&self) -> ArgumentType {
        self.argument_type
    }
}

impl std::fmt::Debug for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Argument({})", self.argument_type)
    }
}

/// Factory utility for ad hoc instantiation
pub struct Activator;

impl Activator {
    /// Create `T` using the best constructor for `arguments`, filling the
    /// remaining parameters from `resolver`
    pub fn create_instance<T: Injectable>(
        resolver: &dyn ServiceResolver,
        arguments: Vec<Argument>,
    ) -> Result<Arc<T>, ContainerError> {
        let _frame = chain::enter(ServiceId::of::<T>(), resolver.max_resolution_depth())?;
        instantiate::<T>(resolver, arguments)
    }

    /// Pre-select the constructor of `T` for a fixed argument signature
    pub fn create_factory<T: Injectable>(
        argument_types: &[ArgumentType],
    ) -> Result<ObjectFactory<T>, ContainerError> {
        let constructors = T::constructors();
        let selection = select_constructor(
            std::any::type_name::<T>(),
            constructors.iter().map(|c| c.parameters()),
            argument_types,
        )?;
        let bindings = selection.bindings;
        let constructor = constructors
            .into_iter()
            .nth(selection.index)
            .ok_or_else(|| no_viable::<T>(argument_types))?;

        Ok(ObjectFactory {
            constructor,
            bindings,
            argument_types: argument_types.to_vec(),
        })
    }

    /// Return the registered `T`, or construct one when nothing is registered
    pub fn get_service_or_create_instance<T: Injectable>(
        resolver: &dyn ServiceResolver,
    ) -> Result<Arc<T>, ContainerError> {
        match resolver.get_service::<T>()? {
            Some(service) => Ok(service),
            None => Self::create_instance::<T>(resolver, Vec::new()),
        }
    }
}

/// Reusable constructor bound to one argument signature
pub struct ObjectFactory<T> {
    constructor: Constructor<T>,
    bindings: Vec<Option<usize>>,
    argument_types: Vec<ArgumentType>,
}

impl<T: Injectable> ObjectFactory<T> {
    /// Create an instance; `arguments` must match the signature this factory was built for
    pub fn create(
        &self,
        resolver: &dyn ServiceResolver,
        arguments: Vec<Argument>,
    ) -> Result<Arc<T>, ContainerError> {
        let matches_signature = arguments.len() == self.argument_types.len()
            && arguments
                .iter()
                .zip(&self.argument_types)
                .all(|(argument, expected)| argument.argument_type == *expected);
        if !matches_signature {
            let supplied: Vec<ArgumentType> = arguments.iter().map(Argument::argument_type).collect();
            return Err(no_viable::<T>(&supplied));
        }

        let _frame = chain::enter(ServiceId::of::<T>(), resolver.max_resolution_depth())?;
        let supplied = bind(&self.bindings, arguments);
        construct(resolver, &self.constructor, supplied)
    }

    pub fn argument_types(&self) -> &[ArgumentType] {
        &self.argument_types
    }
}

/// Select, bind and construct without touching the resolution chain
pub(crate) fn instantiate<T: Injectable>(
    resolver: &dyn ServiceResolver,
    arguments: Vec<Argument>,
) -> Result<Arc<T>, ContainerError> {
    let argument_types: Vec<ArgumentType> = arguments.iter().map(Argument::argument_type).collect();
    let constructors = T::constructors();
    let Selection { index, bindings } = select_constructor(
        std::any::type_name::<T>(),
        constructors.iter().map(|c| c.parameters()),
        &argument_types,
    )?;
    let constructor = constructors
        .into_iter()
        .nth(index)
        .ok_or_else(|| no_viable::<T>(&argument_types))?;

    construct(resolver, &constructor, bind(&bindings, arguments))
}

fn bind(bindings: &[Option<usize>], arguments: Vec<Argument>) -> Vec<Supplied> {
    let mut values: Vec<Option<Instance>> = arguments.into_iter().map(|argument| argument.value).collect();

    bindings
        .iter()
        .map(|binding| match binding {
            None => Supplied::Resolve,
            Some(argument) => match values.get_mut(*argument).and_then(Option::take) {
                Some(value) => Supplied::Value(value),
                None => Supplied::Null,
            },
        })
        .collect()
}

fn no_viable<T>(supplied: &[ArgumentType]) -> ContainerError {
    ContainerError::NoViableConstructor {
        implementation: std::any::type_name::<T>().to_string(),
        supplied: supplied
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_types() {
        let typed = Argument::of(Arc::new(42u32));
        assert_eq!(typed.argument_type(), ArgumentType::Typed(ServiceId::of::<u32>()));
        assert_eq!(Argument::null().argument_type(), ArgumentType::Null);
        assert_eq!(format!("{:?}", Argument::null()), "Argument(null)");
    }

    #[test]
    fn test_bind_places_values_by_parameter() {
        let arguments = vec![Argument::null(), Argument::of(Arc::new(7u8))];
        let supplied = bind(&[Some(1), None, Some(0)], arguments);

        assert!(matches!(supplied[0], Supplied::Value(_)));
        assert!(matches!(supplied[1], Supplied::Resolve));
        assert!(matches!(supplied[2], Supplied::Null));
    }
}
