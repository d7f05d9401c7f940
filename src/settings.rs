use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::http::{DEFAULT_API_URL, DEFAULT_MAX_RETRIES};
use crate::timestamp::parse_date;

pub const SETTINGS_FILE: &str = "settings.toml";
pub const DEFAULT_DOWNLOAD_DIR: &str = "./slack_files";
pub const DEFAULT_MESSAGES_DIR: &str = "./slack_messages";

/// Optional TOML file; every key is a fallback under the environment.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub slack: SlackSettings,
    #[serde(default)]
    pub download: DownloadSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackSettings {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "channel-id")]
    pub channel_id: Option<String>,
    #[serde(default, rename = "api-url")]
    pub api_url: Option<String>,
    #[serde(default, rename = "max-retries")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default, rename = "download-dir")]
    pub download_dir: Option<PathBuf>,
    #[serde(default, rename = "messages-dir")]
    pub messages_dir: Option<PathBuf>,
    #[serde(default, rename = "download-files")]
    pub download_files: Option<bool>,
    #[serde(default, rename = "file-types")]
    pub file_types: Option<Vec<String>>,
    #[serde(default, rename = "oldest-date")]
    pub oldest_date: Option<String>,
    #[serde(default, rename = "newest-date")]
    pub newest_date: Option<String>,
}

impl Settings {
    /// Loads `path`, or `settings.toml` in the working directory when `None`.
    /// A missing default file yields empty settings; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(SETTINGS_FILE), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        debug!(path = %path.display(), "loaded settings file");

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AppError::TomlParse(e.to_string()))
    }
}

/// Raw, unvalidated configuration values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigValues {
    pub token: String,
    pub channel_id: String,
    pub download_dir: Option<PathBuf>,
    pub messages_dir: Option<PathBuf>,
    pub download_files: Option<bool>,
    pub file_types: Option<Vec<String>>,
    pub oldest_date: Option<String>,
    pub newest_date: Option<String>,
    pub api_url: Option<String>,
    pub max_retries: Option<u32>,
}

impl ConfigValues {
    /// Builds values from settings, then overlays anything set through `lookup`
    /// (normally the process environment).
    pub fn from_sources(settings: &Settings, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            token: var("SLACK_BOT_TOKEN")
                .or_else(|| settings.slack.token.clone())
                .unwrap_or_default(),
            channel_id: var("CHANNEL_ID")
                .or_else(|| settings.slack.channel_id.clone())
                .unwrap_or_default(),
            download_dir: var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .or_else(|| settings.download.download_dir.clone()),
            messages_dir: var("MESSAGES_DIR")
                .map(PathBuf::from)
                .or_else(|| settings.download.messages_dir.clone()),
            download_files: var("DOWNLOAD_FILES")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .or(settings.download.download_files),
            file_types: var("FILE_TYPES")
                .map(|v| parse_file_types(&v))
                .or_else(|| settings.download.file_types.clone()),
            oldest_date: var("OLDEST_DATE").or_else(|| settings.download.oldest_date.clone()),
            newest_date: var("NEWEST_DATE").or_else(|| settings.download.newest_date.clone()),
            api_url: var("SLACK_API_URL").or_else(|| settings.slack.api_url.clone()),
            max_retries: settings.slack.max_retries,
        }
    }

    /// Reads `.env` (if present), the settings file and the process environment.
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(AppError::Config(format!("failed to load .env: {}", e)));
        }
        let settings = Settings::load(settings_path)?;
        Ok(Self::from_sources(&settings, |key| std::env::var(key).ok()))
    }
}

/// Validated run configuration. Both output directories exist once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub token: String,
    pub channel_id: String,
    pub download_dir: PathBuf,
    pub messages_dir: PathBuf,
    pub download_files: bool,
    pub file_types: Vec<String>,
    pub oldest_date: Option<String>,
    pub newest_date: Option<String>,
    pub api_url: String,
    pub max_retries: u32,
}

impl Config {
    pub fn new(values: ConfigValues) -> Result<Self> {
        let token = values.token.trim().to_string();
        if token.is_empty() {
            return Err(AppError::Config("SLACK_BOT_TOKEN is required".to_string()));
        }
        let channel_id = values.channel_id.trim().to_string();
        if channel_id.is_empty() {
            return Err(AppError::Config("CHANNEL_ID is required".to_string()));
        }

        let oldest_date = normalize_date(values.oldest_date);
        let newest_date = normalize_date(values.newest_date);
        let oldest = oldest_date.as_deref().map(parse_date).transpose()?;
        let newest = newest_date.as_deref().map(parse_date).transpose()?;
        if let (Some(from), Some(to)) = (oldest, newest)
            && from > to
        {
            return Err(AppError::Config(format!(
                "oldest date {} is after newest date {}",
                from, to
            )));
        }

        let config = Self {
            token,
            channel_id,
            download_dir: values
                .download_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            messages_dir: values
                .messages_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MESSAGES_DIR)),
            download_files: values.download_files.unwrap_or(true),
            file_types: values.file_types.unwrap_or_default(),
            oldest_date,
            newest_date,
            api_url: values
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            max_retries: values.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        };

        for dir in [&config.download_dir, &config.messages_dir] {
            fs::create_dir_all(dir).map_err(|e| AppError::WriteFile {
                path: dir.display().to_string(),
                source: e,
            })?;
        }

        Ok(config)
    }
}

fn normalize_date(date: Option<String>) -> Option<String> {
    date.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

/// Splits a comma-separated list, trimming entries and dropping empties.
pub fn parse_file_types(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn values_in(dir: &TempDir) -> ConfigValues {
        ConfigValues {
            token: "xoxb-test".to_string(),
            channel_id: "C123".to_string(),
            download_dir: Some(dir.path().join("files")),
            messages_dir: Some(dir.path().join("messages")),
            ..ConfigValues::default()
        }
    }

    #[test]
    fn test_parse_file_types() {
        assert_eq!(parse_file_types(""), Vec::<String>::new());
        assert_eq!(parse_file_types("pdf, png ,,xlsx "), vec!["pdf", "png", "xlsx"]);
    }

    #[test]
    fn test_settings_parse_empty() {
        let settings = Settings::parse("").unwrap();
        assert!(settings.slack.token.is_none());
        assert!(settings.download.file_types.is_none());
    }

    #[test]
    fn test_settings_parse_full() {
        let settings = Settings::parse(
            r#"
[slack]
token = "xoxb-file"
channel-id = "C999"
api-url = "http://localhost:9999/api/"
max-retries = 2

[download]
download-dir = "/tmp/files"
messages-dir = "/tmp/messages"
download-files = false
file-types = ["pdf", "png"]
oldest-date = "2024-01-01"
newest-date = "2024-02-01"
"#,
        )
        .unwrap();

        assert_eq!(settings.slack.token.as_deref(), Some("xoxb-file"));
        assert_eq!(settings.slack.channel_id.as_deref(), Some("C999"));
        assert_eq!(settings.slack.max_retries, Some(2));
        assert_eq!(settings.download.download_files, Some(false));
        assert_eq!(
            settings.download.file_types,
            Some(vec!["pdf".to_string(), "png".to_string()])
        );
        assert_eq!(settings.download.oldest_date.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_settings_parse_invalid() {
        let err = Settings::parse("[slack\ntoken = 1").unwrap_err();
        assert!(matches!(err, AppError::TomlParse(_)));
    }

    #[test]
    fn test_settings_load_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, AppError::ReadFile { .. }));
    }

    #[test]
    fn test_settings_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[slack]\nchannel-id = \"C42\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.slack.channel_id.as_deref(), Some("C42"));
    }

    #[test]
    fn test_values_env_overrides_settings() {
        let settings = Settings::parse(
            r#"
[slack]
token = "xoxb-file"
channel-id = "C-file"

[download]
file-types = ["png"]
download-files = true
"#,
        )
        .unwrap();

        let values = ConfigValues::from_sources(
            &settings,
            env(&[
                ("CHANNEL_ID", "C-env"),
                ("FILE_TYPES", "pdf,docx"),
                ("DOWNLOAD_FILES", "FALSE"),
                ("OLDEST_DATE", ""),
            ]),
        );

        assert_eq!(values.token, "xoxb-file");
        assert_eq!(values.channel_id, "C-env");
        assert_eq!(
            values.file_types,
            Some(vec!["pdf".to_string(), "docx".to_string()])
        );
        assert_eq!(values.download_files, Some(false));
        assert_eq!(values.oldest_date, None);
    }

    #[test]
    fn test_values_download_files_true_case_insensitive() {
        let values =
            ConfigValues::from_sources(&Settings::default(), env(&[("DOWNLOAD_FILES", "True")]));
        assert_eq!(values.download_files, Some(true));

        let values =
            ConfigValues::from_sources(&Settings::default(), env(&[("DOWNLOAD_FILES", "yes")]));
        assert_eq!(values.download_files, Some(false));
    }

    #[test]
    fn test_config_requires_token() {
        let dir = TempDir::new().unwrap();
        let values = ConfigValues {
            token: "  ".to_string(),
            ..values_in(&dir)
        };

        let err = Config::new(values).unwrap_err();

        assert_eq!(err.to_string(), "configuration error: SLACK_BOT_TOKEN is required");
        assert!(!dir.path().join("files").exists());
    }

    #[test]
    fn test_config_requires_channel() {
        let dir = TempDir::new().unwrap();
        let values = ConfigValues {
            channel_id: String::new(),
            ..values_in(&dir)
        };

        let err = Config::new(values).unwrap_err();

        assert_eq!(err.to_string(), "configuration error: CHANNEL_ID is required");
    }

    #[test]
    fn test_config_rejects_invalid_date() {
        let dir = TempDir::new().unwrap();
        let values = ConfigValues {
            oldest_date: Some("2024-02-30".to_string()),
            ..values_in(&dir)
        };

        assert!(matches!(Config::new(values), Err(AppError::InvalidDate(_))));
    }

    #[test]
    fn test_config_rejects_reversed_range() {
        let dir = TempDir::new().unwrap();
        let values = ConfigValues {
            oldest_date: Some("2024-03-01".to_string()),
            newest_date: Some("2024-02-01".to_string()),
            ..values_in(&dir)
        };

        assert!(matches!(Config::new(values), Err(AppError::Config(_))));
    }

    #[test]
    fn test_config_defaults_and_directories() {
        let dir = TempDir::new().unwrap();

        let config = Config::new(values_in(&dir)).unwrap();

        assert!(config.download_files);
        assert!(config.file_types.is_empty());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.download_dir.is_dir());
        assert!(config.messages_dir.is_dir());
    }

    #[test]
    fn test_config_directory_creation_is_idempotent() {
        let dir = TempDir::new().unwrap();

        Config::new(values_in(&dir)).unwrap();
        let again = Config::new(values_in(&dir));

        assert!(again.is_ok());
    }
}
