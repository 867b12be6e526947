// Configuration loader
// Loads settings from an explicit TOML file, ~/.paperbanana/config.toml, or
// the environment

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use super::constants::API_KEY_ENV_VARS;
use super::settings::{config_home, Config};

/// Load configuration.
///
/// An explicit path must exist. Without one, `~/.paperbanana/config.toml` is
/// used when present; otherwise defaults plus an API key from the environment.
/// A config file with an empty `api_key` also picks the key up from the
/// environment.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    let config = match explicit_path {
        Some(path) => load_from_file(path)?,
        None => {
            let default_path = config_home().join("config.toml");
            if default_path.exists() {
                load_from_file(&default_path)?
            } else {
                Config::default()
            }
        }
    };

    finish(config, env_api_key())
}

/// Parse a config file without consulting the environment.
pub fn load_from_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str(contents).context("Failed to parse TOML")
}

fn env_api_key() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

fn finish(mut config: Config, env_key: Option<String>) -> Result<Config> {
    if config.backend.api_key.trim().is_empty() {
        match env_key {
            Some(key) => config.backend.api_key = key,
            None => bail!(
                "No API key found.\n\n\
                 Add one to ~/.paperbanana/config.toml:\n\n  \
                 [backend]\n  api_key = \"...\"\n\n\
                 or set an environment variable:\n  \
                 export GOOGLE_API_KEY=\"...\""
            ),
        }
    }

    config
        .validate()
        .context("Configuration validation failed")?;

    tracing::debug!(?config, "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            metrics_dir = "/tmp/pb-metrics"

            [backend]
            api_key = "abc"
            image_model = "custom-image"

            [pipeline]
            max_iterations = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.api_key, "abc");
        assert_eq!(config.backend.image_model, "custom-image");
        assert_eq!(config.backend.reasoning_model, "gemini-2.0-flash");
        assert_eq!(config.pipeline.max_iterations, 5);
        assert_eq!(config.metrics_dir, Path::new("/tmp/pb-metrics"));
    }

    #[test]
    fn test_env_key_fills_missing_key() {
        let config = finish(Config::default(), Some("from-env".into())).unwrap();
        assert_eq!(config.backend.api_key, "from-env");
    }

    #[test]
    fn test_file_key_wins_over_env() {
        let config = finish(Config::with_api_key("from-file"), Some("from-env".into())).unwrap();
        assert_eq!(config.backend.api_key, "from-file");
    }

    #[test]
    fn test_missing_key_everywhere_is_an_error() {
        let err = finish(Config::default(), None).unwrap_err();
        assert!(err.to_string().contains("No API key"));
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\napi_key = \"k\"\nmax_attempts = 1").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.backend.max_attempts, 1);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/paperbanana.toml"))).is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\napi_key = \"k\"\n[pipeline]\nmax_iterations = 0").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
