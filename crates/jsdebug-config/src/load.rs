use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Directory, under a project root, that holds the project overlay.
pub const PROJECT_DIR_NAME: &str = ".jsdebug";

const CONFIG_FILE_NAME: &str = "config.toml";

const DEFAULT_CONFIG_CONTENT: &str = r#"# jsdebug configuration
# Uncomment and edit settings below to override defaults.

# [connection]
# protocol = "v8"          # or "wip"
# host = "127.0.0.1"
# port = 5858
# url = "ws://127.0.0.1:9222/devtools/page/<id>"
# connect_timeout_secs = 10

# [backtrace]
# from_frame = 0
# to_frame = 20
# compact = true

# [values]
# max_string_length = 1000
# reload_min_length = 65536

# [log]
# level = "info"
# file = "/tmp/jsdebug.log"
"#;

/// Load the effective configuration.
///
/// Layers `Config::default()`, then `config_dir/config.toml`, then the first
/// `.jsdebug/config.toml` found walking up from `project_dir`. The global
/// file is created with commented defaults when missing. The merged result
/// must validate.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or the first
/// validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global = ensure_global_file(config_dir)?;
    let overlays = std::iter::once(global)
        .chain(project_dir.and_then(find_project_config))
        .collect::<Vec<_>>();

    let mut config = Config::default();
    for path in overlays {
        let content = fs::read_to_string(&path)?;
        if !has_non_comment_content(&content) {
            continue;
        }
        tracing::debug!(path = %path.display(), "merging config layer");
        config = merge_configs(&config, &content)?;
    }
    checked(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    checked(config)
}

fn ensure_global_file(config_dir: &Path) -> Result<PathBuf, ConfigError> {
    fs::create_dir_all(config_dir)?;
    let path = config_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        fs::write(&path, DEFAULT_CONFIG_CONTENT).map_err(|e| ConfigError::CreateDefault {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), "created default config");
    }
    Ok(path)
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

fn has_non_comment_content(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#'))
}

fn checked(config: Config) -> Result<Config, ConfigError> {
    match validate(&config) {
        Ok(()) => Ok(config),
        Err(errors) => {
            for err in &errors {
                tracing::warn!(error = %err, "invalid configuration");
            }
            Err(errors.into_iter().next().unwrap_or_else(|| ConfigError::Validation {
                field: "config".to_string(),
                message: "validation failed".to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn missing_global_file_is_created_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config, Config::default());
        let created = fs::read_to_string(cfg_dir.join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(created, DEFAULT_CONFIG_CONTENT);
    }

    #[test]
    fn global_file_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        write(&cfg_dir.join(CONFIG_FILE_NAME), "[connection]\nport = 9229\n");

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config.connection.port, 9229);
        assert_eq!(config.connection.host, "127.0.0.1");
    }

    #[test]
    fn project_overlay_wins_over_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        write(
            &cfg_dir.join(CONFIG_FILE_NAME),
            "[connection]\nport = 9229\n[backtrace]\ncompact = false\n",
        );
        let project = tmp.path().join("project");
        write(
            &project.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME),
            "[connection]\nport = 6000\n",
        );
        let nested = project.join("src").join("lib");
        fs::create_dir_all(&nested).unwrap();

        let config = load_config(&cfg_dir, Some(&nested)).unwrap();
        assert_eq!(config.connection.port, 6000);
        assert!(!config.backtrace.compact);
    }

    #[test]
    fn merged_result_is_validated() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        write(&cfg_dir.join(CONFIG_FILE_NAME), "[connection]\nprotocol = \"wip\"\n");

        let err = load_config(&cfg_dir, None).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "connection.url")
        );
    }

    #[test]
    fn load_from_str_accepts_and_rejects() {
        let config = load_from_str("[values]\nmax_string_length = 200\n").unwrap();
        assert_eq!(config.values.max_string_length, Some(200));

        assert!(matches!(load_from_str("{{bad}}"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            load_from_str("[connection]\nport = 0\n"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn comment_only_content_is_skipped() {
        assert!(!has_non_comment_content(DEFAULT_CONFIG_CONTENT));
        assert!(!has_non_comment_content("\n  # port = 1\n"));
        assert!(has_non_comment_content("# note\nport = 4\n"));
    }
}
