use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Bounds check for numeric limits such as the resolution depth
pub struct RangeValidator {
    pub field: &'static str,
    pub min: usize,
    pub max: usize,
}

impl ConfigValidator<usize> for RangeValidator {
    fn validate(&self, value: &usize) -> Result<(), ConfigError> {
        if *value < self.min || *value > self.max {
            return Err(ConfigError::invalid_value(
                self.field,
                value.to_string(),
                format!("value between {} and {}", self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// Parse a boolean flag the way environment variables usually spell them
pub fn parse_flag(field: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(
            field,
            raw,
            "one of: true, false, 1, 0, yes, no, on, off",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validator() {
        let validator = RangeValidator {
            field: "max_resolution_depth",
            min: 1,
            max: 10,
        };

        assert!(validator.validate(&1).is_ok());
        assert!(validator.validate(&10).is_ok());
        assert!(validator.validate(&0).is_err());
        assert!(validator.validate(&11).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("flag", "TRUE").unwrap());
        assert!(parse_flag("flag", " on ").unwrap());
        assert!(!parse_flag("flag", "0").unwrap());

        match parse_flag("strict", "maybe") {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "strict");
                assert_eq!(value, "maybe");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
