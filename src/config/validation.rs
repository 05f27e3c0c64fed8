//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("database.path is required")]
    MissingDatabasePath,
    #[error("database.migration_batch_size must be at least 1")]
    ZeroBatchSize,
    #[error("selector.recent_window must be at least 1")]
    ZeroRecentWindow,
    #[error("crawl.page_size must be between 1 and 100, got {0}")]
    InvalidPageSize(u32),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.database.path.trim().is_empty() {
        errors.push(ValidationError::MissingDatabasePath);
    }
    if config.database.migration_batch_size == 0 {
        errors.push(ValidationError::ZeroBatchSize);
    }
    if config.selector.recent_window == 0 {
        errors.push(ValidationError::ZeroRecentWindow);
    }
    if !(1..=100).contains(&config.crawl.page_size) {
        errors.push(ValidationError::InvalidPageSize(config.crawl.page_size));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_reports_every_problem() {
        let toml = r#"
[database]
path = " "
migration_batch_size = 0

[selector]
recent_window = 0

[crawl]
page_size = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingDatabasePath,
                ValidationError::ZeroBatchSize,
                ValidationError::ZeroRecentWindow,
                ValidationError::InvalidPageSize(0),
            ]
        );
    }

    #[test]
    fn test_page_size_upper_bound() {
        let mut config = Config::default();
        config.crawl.page_size = 101;
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidPageSize(101)]);
    }
}
