use std::path::PathBuf;

use clap::Parser;

use crate::settings::ConfigValues;

#[derive(Parser, Debug)]
#[command(name = "slack-channel-downloader")]
#[command(about = "Download the message history and attached files of a Slack channel")]
#[command(version)]
pub struct Cli {
    /// Settings file (TOML), defaults to ./settings.toml when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Channel ID, overrides CHANNEL_ID
    #[arg(long)]
    pub channel: Option<String>,

    /// Directory for downloaded files, overrides DOWNLOAD_DIR
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Directory for the JSON and XLSX exports, overrides MESSAGES_DIR
    #[arg(long)]
    pub messages_dir: Option<PathBuf>,

    /// Only export messages, skip attached files
    #[arg(long)]
    pub no_files: bool,

    /// Comma separated file types to download (e.g. pdf,png)
    #[arg(long, value_delimiter = ',')]
    pub file_types: Option<Vec<String>>,

    /// Oldest date (YYYY-MM-DD), overrides OLDEST_DATE
    #[arg(short, long)]
    pub from: Option<String>,

    /// Newest date (YYYY-MM-DD), overrides NEWEST_DATE
    #[arg(short, long)]
    pub to: Option<String>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overlays flags given on the command line onto `values`.
    pub fn apply(&self, values: &mut ConfigValues) {
        if let Some(channel) = &self.channel {
            values.channel_id = channel.clone();
        }
        if let Some(dir) = &self.download_dir {
            values.download_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.messages_dir {
            values.messages_dir = Some(dir.clone());
        }
        if self.no_files {
            values.download_files = Some(false);
        }
        if let Some(types) = &self.file_types {
            values.file_types = Some(
                types
                    .iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            );
        }
        if let Some(from) = &self.from {
            values.oldest_date = Some(from.clone());
        }
        if let Some(to) = &self.to {
            values.newest_date = Some(to.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::parse_from([
            "slack-channel-downloader",
            "--channel",
            "C777",
            "--no-files",
            "--file-types",
            "pdf, png",
            "--from",
            "2024-01-01",
        ]);
        let mut values = ConfigValues {
            token: "xoxb-env".to_string(),
            channel_id: "C-env".to_string(),
            download_files: Some(true),
            ..ConfigValues::default()
        };

        cli.apply(&mut values);

        assert_eq!(values.token, "xoxb-env");
        assert_eq!(values.channel_id, "C777");
        assert_eq!(values.download_files, Some(false));
        assert_eq!(
            values.file_types,
            Some(vec!["pdf".to_string(), "png".to_string()])
        );
        assert_eq!(values.oldest_date.as_deref(), Some("2024-01-01"));
        assert_eq!(values.newest_date, None);
    }

    #[test]
    fn test_apply_without_flags_keeps_values() {
        let cli = Cli::parse_from(["slack-channel-downloader"]);
        let mut values = ConfigValues {
            channel_id: "C-env".to_string(),
            download_files: Some(true),
            ..ConfigValues::default()
        };
        let before = values.clone();

        cli.apply(&mut values);

        assert_eq!(values, before);
    }
}
