use crate::config::validation::{parse_flag, ConfigError, ConfigValidator, RangeValidator};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Environment variable toggling exactly-once singleton creation
pub const ENV_STRICT_SINGLETONS: &str = "TETHER_STRICT_SINGLETONS";
/// Environment variable toggling registration validation during build
pub const ENV_VALIDATE_ON_BUILD: &str = "TETHER_VALIDATE_ON_BUILD";
/// Environment variable overriding the resolution depth limit
pub const ENV_MAX_RESOLUTION_DEPTH: &str = "TETHER_MAX_RESOLUTION_DEPTH";

/// Default limit on nested constructions within one top-level resolution
pub const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 256;

const MAX_RESOLUTION_DEPTH_CEILING: usize = 4096;

/// Behavioral switches applied when a registry is built into a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// Guard singleton creation with a per-registration lock so a factory
    /// runs at most once even under concurrent first access.
    pub strict_singletons: bool,
    /// Check constructor dependencies, lifetimes and cycles in `build`.
    pub validate_on_build: bool,
    /// Maximum number of nested constructions in one resolution.
    pub max_resolution_depth: usize,
}

impl ContainerOptions {
    /// Create the default options
    pub fn new() -> Self {
        Self {
            strict_singletons: false,
            validate_on_build: false,
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
        }
    }

    /// Options suited for tests and development: everything checked eagerly
    pub fn strict() -> Self {
        Self {
            strict_singletons: true,
            validate_on_build: true,
            ..Self::new()
        }
    }

    pub fn with_strict_singletons(mut self, enabled: bool) -> Self {
        self.strict_singletons = enabled;
        self
    }

    pub fn with_validate_on_build(mut self, enabled: bool) -> Self {
        self.validate_on_build = enabled;
        self
    }

    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// Load options from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut options = Self::new();

        if let Ok(raw) = env::var(ENV_STRICT_SINGLETONS) {
            options.strict_singletons = parse_flag("strict_singletons", &raw)?;
        }

        if let Ok(raw) = env::var(ENV_VALIDATE_ON_BUILD) {
            options.validate_on_build = parse_flag("validate_on_build", &raw)?;
        }

        if let Ok(raw) = env::var(ENV_MAX_RESOLUTION_DEPTH) {
            options.max_resolution_depth = raw.trim().parse().map_err(|_| {
                ConfigError::invalid_value(
                    "max_resolution_depth",
                    raw.clone(),
                    "positive integer",
                )
            })?;
        }

        options.validate()?;
        Ok(options)
    }

    /// Parse options from a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_yaml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        RangeValidator {
            field: "max_resolution_depth",
            min: 1,
            max: MAX_RESOLUTION_DEPTH_CEILING,
        }
        .validate(&self.max_resolution_depth)
    }
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ContainerOptions::default();
        assert!(!options.strict_singletons);
        assert!(!options.validate_on_build);
        assert_eq!(options.max_resolution_depth, DEFAULT_MAX_RESOLUTION_DEPTH);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_partial_fields() {
        let options = ContainerOptions::from_yaml_str("strict_singletons: true\n").unwrap();
        assert!(options.strict_singletons);
        assert!(!options.validate_on_build);
        assert_eq!(options.max_resolution_depth, DEFAULT_MAX_RESOLUTION_DEPTH);
    }

    #[test]
    fn test_yaml_rejects_zero_depth() {
        let result = ContainerOptions::from_yaml_str("max_resolution_depth: 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_yaml_rejects_malformed_document() {
        let result = ContainerOptions::from_yaml_str("strict_singletons: [1, 2");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_builder_methods() {
        let options = ContainerOptions::new()
            .with_strict_singletons(true)
            .with_max_resolution_depth(8);
        assert!(options.strict_singletons);
        assert_eq!(options.max_resolution_depth, 8);
        assert_eq!(ContainerOptions::strict().validate_on_build, true);
    }
}
