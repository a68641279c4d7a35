//! Configuration validation utilities.

use courier_core::SecretStatus;

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, CourierConfig, KernelConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_app_config(&config.app)?;
    validate_kernel_config(&config.kernel)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_app_config(app: &AppConfig) -> ConfigResult<()> {
    if app.name.trim().is_empty() {
        return Err(ConfigError::missing_field("app.name"));
    }

    if app.secret_status == SecretStatus::Encrypted
        && app.secret_key.as_deref().is_none_or(str::is_empty)
    {
        return Err(ConfigError::missing_field("app.secret_key"));
    }

    Ok(())
}

fn validate_kernel_config(kernel: &KernelConfig) -> ConfigResult<()> {
    for entry in &kernel.middleware {
        let name = entry.split_once(':').map_or(entry.as_str(), |(name, _)| name);
        if name.trim().is_empty() {
            return Err(ConfigError::invalid_middleware(entry, "empty middleware name"));
        }
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(module) = logging.filters.keys().find(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter module name cannot be empty: '{module}'"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn test_encrypted_requires_key() {
        let mut config = CourierConfig::default();
        config.app.secret_status = SecretStatus::Encrypted;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.app.secret_key = Some(String::new());
        assert!(validate_config(&config).is_err());

        config.app.secret_key = Some("k".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_middleware_names() {
        let mut config = CourierConfig::default();
        config.kernel.middleware = vec!["throttle:1,1".into(), ":1".into()];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidMiddleware { .. })
        ));
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
    }
}
