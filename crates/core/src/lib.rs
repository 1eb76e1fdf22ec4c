//! Dependency-injection container with singleton, scoped and transient
//! lifetimes, constructor selection, cycle detection and ordered disposal.

pub mod config;
pub mod container;
pub mod errors;

// Re-export key types for convenience
pub use config::{ConfigError, ContainerOptions};
pub use container::{
    Activator, Argument, ArgumentType, Constructor, Container, ContainerDescription, Disposable,
    Injectable, Scope, ScopeHandle, ServiceLifetime, ServiceModule, ServiceRegistry,
    ServiceResolver, ServiceResolverExt, Upcast,
};
pub use errors::{BoxError, ContainerError};

/// Commonly used items for registering and resolving services
pub mod prelude {
    pub use crate::container::{
        Arguments, Constructor, Container, Disposable, Injectable, Scope, ScopeHandle,
        ServiceLifetime, ServiceModule, ServiceRegistry, ServiceResolver, ServiceResolverExt,
    };
    pub use crate::errors::{BoxError, ContainerError};
    pub use crate::impl_upcast;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
