use thiserror::Error;

/// Boxed error returned by user factories, constructors and disposers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for registration, resolution and disposal
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Service not registered: {service}{}", chain_suffix(.chain))]
    NotRegistered { service: String, chain: String },

    #[error("Duplicate service key '{key}': already bound to {existing}, cannot bind {attempted}")]
    DuplicateKey {
        key: String,
        existing: String,
        attempted: String,
    },

    #[error("Circular dependency detected: {chain}")]
    CircularDependency { chain: String },

    #[error(
        "Cannot resolve parameter '{parameter}' of type {parameter_type} for {implementation}{}",
        chain_suffix(.chain)
    )]
    UnresolvableParameter {
        parameter: String,
        parameter_type: String,
        implementation: String,
        chain: String,
    },

    #[error("No viable constructor for {implementation} (supplied arguments: [{supplied}])")]
    NoViableConstructor {
        implementation: String,
        supplied: String,
    },

    #[error("Cannot use {owner}: it has been disposed")]
    Disposed { owner: String },

    #[error("Failed to construct {service}: {source}")]
    ConstructionFailed {
        service: String,
        #[source]
        source: BoxError,
    },

    #[error("Scoped service {service} cannot be resolved without an active scope")]
    ScopeRequired { service: String },

    #[error("Type mismatch: requested {expected}, but the registration provides {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Resolution depth limit of {limit} exceeded: {chain}")]
    ResolutionDepthExceeded { limit: usize, chain: String },

    #[error("Lock poisoned on resource: {resource}")]
    LockPoisoned { resource: String },

    #[error("{failures} disposal(s) failed while disposing {owner}; first failure: {first}")]
    DisposalFailed {
        owner: String,
        failures: usize,
        first: String,
    },

    #[error("Invalid container configuration: {0}")]
    InvalidConfiguration(#[from] crate::config::ConfigError),
}

fn chain_suffix(chain: &str) -> String {
    if chain.is_empty() {
        String::new()
    } else {
        format!(" (resolution chain: {})", chain)
    }
}

impl ContainerError {
    /// Create a not registered error
    pub fn not_registered(service: impl Into<String>, chain: impl Into<String>) -> Self {
        Self::NotRegistered {
            service: service.into(),
            chain: chain.into(),
        }
    }

    /// Create a disposed error for the named owner
    pub fn disposed(owner: impl Into<String>) -> Self {
        Self::Disposed {
            owner: owner.into(),
        }
    }

    /// Create a scope required error
    pub fn scope_required(service: impl Into<String>) -> Self {
        Self::ScopeRequired {
            service: service.into(),
        }
    }

    /// Create a lock poisoned error
    pub fn lock_poisoned(resource: impl Into<String>) -> Self {
        Self::LockPoisoned {
            resource: resource.into(),
        }
    }

    /// Wrap a failure raised by a factory or constructor.
    ///
    /// Container errors raised inside user code (for example a nested
    /// `get_required_service` propagated with `?`) keep their original kind.
    pub fn construction_failed(service: impl Into<String>, source: BoxError) -> Self {
        match source.downcast::<ContainerError>() {
            Ok(inner) => *inner,
            Err(source) => Self::ConstructionFailed {
                service: service.into(),
                source,
            },
        }
    }

    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::NotRegistered { .. })
    }

    pub fn is_circular_dependency(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed { .. })
    }

    pub fn is_scope_required(&self) -> bool {
        matches!(self, Self::ScopeRequired { .. })
    }

    pub fn is_construction_failure(&self) -> bool {
        matches!(self, Self::ConstructionFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("database offline")]
    struct Offline;

    #[test]
    fn test_construction_failure_preserves_source() {
        let error = ContainerError::construction_failed("app::Repo", Box::new(Offline));

        assert!(error.is_construction_failure());
        assert_eq!(error.to_string(), "Failed to construct app::Repo: database offline");
        assert_eq!(error.source().map(|s| s.to_string()), Some("database offline".to_string()));
    }

    #[test]
    fn test_construction_failure_unwraps_container_errors() {
        let inner = ContainerError::not_registered("app::Cache", "app::Repo");
        let error = ContainerError::construction_failed("app::Repo", Box::new(inner));

        assert!(error.is_not_registered());
    }

    #[test]
    fn test_chain_is_omitted_when_empty() {
        let error = ContainerError::not_registered("app::Cache", "");
        assert_eq!(error.to_string(), "Service not registered: app::Cache");

        let error = ContainerError::not_registered("app::Cache", "app::A -> app::B");
        assert_eq!(
            error.to_string(),
            "Service not registered: app::Cache (resolution chain: app::A -> app::B)"
        );
    }
}
