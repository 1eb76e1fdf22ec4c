use crate::container::autowiring::ParameterInfo;
use crate::container::chain::ChainEntry;
use crate::container::lifecycle::Disposable;
use crate::container::resolver::ServiceResolver;
use crate::container::scope::ServiceLifetime;
use crate::errors::{BoxError, ContainerError};
use std::any::{Any, TypeId};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Service identifier for a contract or implementation type
#[derive(Debug, Clone, Copy)]
pub struct ServiceId {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceId {
    /// Create a new service ID for a type
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Check if this ServiceId identifies the given type
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for ServiceId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceId {}

impl Hash for ServiceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Identity of one registration, its position in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(pub(crate) usize);

impl DescriptorId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased service instance. Always holds an `Arc<C>` for the contract `C`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Factory function registered for a contract
pub type FactoryFn = Arc<dyn Fn(&dyn ServiceResolver) -> Result<Activated, BoxError> + Send + Sync>;

/// Compiled activation of a constructor-based registration
pub type ActivateFn =
    Arc<dyn Fn(&dyn ServiceResolver) -> Result<Activated, ContainerError> + Send + Sync>;

/// A freshly created instance and its disposal hook, if any
pub struct Activated {
    pub instance: Instance,
    pub disposable: Option<Arc<dyn Disposable>>,
}

/// Constructor chosen for an implementation type at registration time
pub struct ConstructionPlan {
    pub(crate) implementation: ServiceId,
    /// Parameters of the selected constructor; `None` when no constructor is viable
    pub(crate) parameters: Option<Vec<ParameterInfo>>,
    pub(crate) activate: ActivateFn,
}

impl ConstructionPlan {
    pub fn implementation(&self) -> ServiceId {
        self.implementation
    }

    pub fn parameters(&self) -> Option<&[ParameterInfo]> {
        self.parameters.as_deref()
    }
}

/// How a registration produces its instances
pub enum Activation {
    Constructor(ConstructionPlan),
    Factory(FactoryFn),
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Constructor(plan) => f
                .debug_struct("Constructor")
                .field("implementation", &plan.implementation)
                .field("parameters", &plan.parameters)
                .finish(),
            Activation::Factory(_) => write!(f, "Factory(<factory_fn>)"),
        }
    }
}

/// Service descriptor containing all metadata for one registration
#[derive(Debug)]
pub struct ServiceDescriptor {
    pub(crate) id: DescriptorId,
    pub(crate) service_id: ServiceId,
    pub(crate) lifetime: ServiceLifetime,
    pub(crate) key: Option<String>,
    pub(crate) activation: Activation,
}

impl ServiceDescriptor {
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    /// Contract type callers request
    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.activation, Activation::Factory(_))
    }

    /// Name of the implementation type, or "factory"
    pub fn implementation_name(&self) -> &'static str {
        match &self.activation {
            Activation::Constructor(plan) => plan.implementation.type_name(),
            Activation::Factory(_) => "factory",
        }
    }

    /// Type identifying this registration in the dependency graph
    pub fn entry_id(&self) -> ServiceId {
        match &self.activation {
            Activation::Constructor(plan) => plan.implementation,
            Activation::Factory(_) => self.service_id,
        }
    }

    /// Frame pushed on the resolution chain while this registration is constructing
    pub(crate) fn chain_entry(&self) -> ChainEntry {
        match &self.activation {
            Activation::Constructor(plan) => ChainEntry::from(plan.implementation),
            Activation::Factory(_) => ChainEntry::factory(self.service_id, self.id),
        }
    }

    /// Constructor parameters, empty for factories
    pub fn dependencies(&self) -> &[ParameterInfo] {
        match &self.activation {
            Activation::Constructor(plan) => plan.parameters.as_deref().unwrap_or(&[]),
            Activation::Factory(_) => &[],
        }
    }

    /// Create a new instance against the given resolver
    pub(crate) fn activate(&self, resolver: &dyn ServiceResolver) -> Result<Activated, ContainerError> {
        match &self.activation {
            Activation::Constructor(plan) => (plan.activate)(resolver),
            Activation::Factory(factory) => factory(resolver)
                .map_err(|error| ContainerError::construction_failed(self.service_id.type_name(), error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {}

    #[test]
    fn test_service_id_identity() {
        let a = ServiceId::of::<String>();
        let b = ServiceId::of::<String>();
        let c = ServiceId::of::<dyn Greeter>();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(c.is::<dyn Greeter>());
        assert!(c.to_string().ends_with("Greeter"));
    }

    #[test]
    fn test_descriptor_id_display() {
        assert_eq!(DescriptorId(3).to_string(), "#3");
        assert_eq!(DescriptorId(3).index(), 3);
    }
}
