use crate::container::registry::ServiceRegistry;
use crate::errors::ContainerError;

/// Service module trait for contributing a group of related registrations
pub trait ServiceModule: Send + Sync {
    /// Get module name (defaults to type name)
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Get module description
    fn description(&self) -> Option<&str> {
        None
    }

    /// Add this module's registrations
    fn configure(&self, registry: &mut ServiceRegistry) -> Result<(), ContainerError>;
}
