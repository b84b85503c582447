use crate::config::{Config, Protocol};
use crate::error::ConfigError;

fn violation(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let connection = &config.connection;

    if connection.port == 0 {
        errors.push(violation("connection.port", "must not be 0".into()));
    }

    if connection.connect_timeout_secs == 0 {
        errors.push(violation(
            "connection.connect_timeout_secs",
            "must be at least 1".into(),
        ));
    }

    if connection.protocol == Protocol::Wip {
        match connection.url.as_deref() {
            None => errors.push(violation(
                "connection.url",
                "required when protocol is \"wip\"".into(),
            )),
            Some(url) if !url.starts_with("ws://") => errors.push(violation(
                "connection.url",
                format!("must start with ws://, got {url}"),
            )),
            Some(_) => {}
        }
    }

    if let (Some(from), Some(to)) = (config.backtrace.from_frame, config.backtrace.to_frame) {
        if to <= from {
            errors.push(violation(
                "backtrace.to_frame",
                format!("must be greater than from_frame ({from}), got {to}"),
            ));
        }
    }

    if config.values.reload_min_length == 0 {
        errors.push(violation(
            "values.reload_min_length",
            "must be at least 1".into(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
