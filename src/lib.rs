//! Downloads the full message history of a Slack channel, resolves user names,
//! exports the messages as JSON and XLSX, and optionally downloads attached files.

pub mod api;
pub mod cli;
pub mod commands;
pub mod downloader;
pub mod error;
pub mod export;
pub mod http;
pub mod settings;
pub mod slack;
pub mod timestamp;

pub use api::{AuthInfo, ChannelInfo, Message, SlackApi};
pub use cli::Cli;
pub use commands::{RunSummary, download_channel, run_download_channel};
pub use downloader::{DownloadCallbacks, FileDescriptor, FileDownloader, extract_files};
pub use error::{AppError, DownloadError, Result};
pub use export::{save_to_excel, save_to_json};
pub use http::HttpSlackApi;
pub use settings::{Config, ConfigValues, Settings};
pub use slack::SlackClient;
pub use timestamp::{date_to_slack_ts, format_slack_ts, parse_date, replace_mentions};
