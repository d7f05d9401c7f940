use std::path::PathBuf;

use chrono::Local;
use tracing::info;

use crate::api::SlackApi;
use crate::downloader::{DownloadCallbacks, FileDownloader, extract_files};
use crate::error::{DownloadError, Result};
use crate::export::{export_file_stem, save_to_excel, save_to_json};
use crate::http::HttpSlackApi;
use crate::settings::Config;
use crate::slack::SlackClient;

/// Outcome of one channel download run.
#[derive(Debug, Default, PartialEq)]
pub struct RunSummary {
    pub message_count: usize,
    pub json_path: Option<PathBuf>,
    pub excel_path: Option<PathBuf>,
    pub files_found: usize,
    pub downloaded: Vec<PathBuf>,
    pub failed: usize,
}

pub fn run_download_channel(config: &Config) -> Result<RunSummary> {
    let api = HttpSlackApi::with_base_url(&config.token, &config.api_url)?
        .with_max_retries(config.max_retries)
        .with_rate_limit_callback(|wait_secs, attempt, max| {
            println!(
                "Rate limited by Slack, waiting {}s (retry {}/{})...",
                wait_secs, attempt, max
            );
        });
    let client = SlackClient::new(api);

    print_banner(config);
    let summary = download_channel(config, &client)?;
    print_summary(config, &summary);
    Ok(summary)
}

/// Token check, history, user directory, exports, then optional file downloads.
pub fn download_channel<A: SlackApi>(config: &Config, client: &SlackClient<A>) -> Result<RunSummary> {
    println!("Validating Slack token...");
    let auth = client.validate_token()?;
    println!("Authenticated as: {} in workspace: {}", auth.user, auth.team);

    println!("Fetching messages from channel {}...", config.channel_id);
    let on_progress = |count: usize| println!("Found {} messages so far...", count);
    let messages = client.get_channel_history(
        &config.channel_id,
        config.oldest_date.as_deref(),
        config.newest_date.as_deref(),
        Some(&on_progress),
    )?;

    if messages.is_empty() {
        println!("No messages found in the channel.");
        return Ok(RunSummary::default());
    }
    println!("Total messages found: {}", messages.len());

    println!("Fetching user information...");
    let user_map = client.get_users()?;
    println!("Found information for {} users", user_map.len());

    let stem = export_file_stem(&config.channel_id, Local::now());
    let json_path = save_to_json(&messages, &config.messages_dir.join(format!("{}.json", stem)))?;
    println!("Saved {} messages to {}", messages.len(), json_path.display());
    let excel_path = save_to_excel(
        &messages,
        &config.messages_dir.join(format!("{}.xlsx", stem)),
        &user_map,
    )?;
    println!("Saved {} messages to {}", messages.len(), excel_path.display());

    let mut summary = RunSummary {
        message_count: messages.len(),
        json_path: Some(json_path),
        excel_path: Some(excel_path),
        ..RunSummary::default()
    };

    if !config.download_files {
        return Ok(summary);
    }

    let files = extract_files(&messages, &config.file_types);
    summary.files_found = files.len();
    if files.is_empty() {
        println!("No files found in the messages.");
        return Ok(summary);
    }

    println!("Downloading {} files...", files.len());
    let downloader = FileDownloader::new(&config.token, &config.download_dir)?;
    let on_download = |name: &str, position: usize, total: usize| {
        println!("  [{}/{}] Downloading: {}", position, total, name);
    };
    let on_error = |name: &str, err: &DownloadError| {
        eprintln!("  Failed to download {}: {}", name, err);
    };
    let callbacks = DownloadCallbacks::new()
        .with_progress(&on_download)
        .with_error(&on_error);

    summary.downloaded = downloader.download_files(&files, callbacks);
    summary.failed = files.len() - summary.downloaded.len();
    info!(
        downloaded = summary.downloaded.len(),
        failed = summary.failed,
        "file downloads finished"
    );
    println!("Downloaded {} files", summary.downloaded.len());

    Ok(summary)
}

fn print_banner(config: &Config) {
    println!();
    println!("=== Slack Channel Content Downloader ===");
    println!("Channel ID: {}", config.channel_id);
    println!(
        "Download files: {}",
        if config.download_files { "Yes" } else { "No" }
    );
    if !config.file_types.is_empty() {
        println!("File types: {}", config.file_types.join(", "));
    }
    if config.oldest_date.is_some() || config.newest_date.is_some() {
        println!(
            "Date range: {} to {}",
            config.oldest_date.as_deref().unwrap_or("beginning"),
            config.newest_date.as_deref().unwrap_or("present")
        );
    }
    println!("========================================");
    println!();
}

fn print_summary(config: &Config, summary: &RunSummary) {
    if summary.message_count == 0 {
        return;
    }
    println!();
    println!("=== Summary ===");
    println!("Messages: {} messages saved", summary.message_count);
    if let Some(path) = &summary.json_path {
        println!("JSON file: {}", path.display());
    }
    if let Some(path) = &summary.excel_path {
        println!("Excel file: {}", path.display());
    }
    if config.download_files && !summary.downloaded.is_empty() {
        println!(
            "Files: {} files downloaded to {}",
            summary.downloaded.len(),
            config.download_dir.display()
        );
    }
    if summary.failed > 0 {
        println!("Failed downloads: {}", summary.failed);
    }
    println!("===============");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::settings::ConfigValues;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &TempDir, api_url: &str, download_files: bool) -> Config {
        Config::new(ConfigValues {
            token: "xoxb-test".to_string(),
            channel_id: "C1".to_string(),
            download_dir: Some(dir.path().join("files")),
            messages_dir: Some(dir.path().join("messages")),
            download_files: Some(download_files),
            api_url: Some(api_url.to_string()),
            max_retries: Some(0),
            ..ConfigValues::default()
        })
        .unwrap()
    }

    fn client(config: &Config) -> SlackClient<HttpSlackApi> {
        SlackClient::new(HttpSlackApi::with_base_url(&config.token, &config.api_url).unwrap())
    }

    fn mock_auth(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/auth.test")
            .with_status(200)
            .with_body(r#"{"ok":true,"team":"Acme","user":"bot","team_id":"T1","user_id":"U0"}"#)
            .create()
    }

    #[test]
    fn test_download_channel_full_run() {
        let mut server = mockito::Server::new();
        let file_url = format!("{}/files/report.pdf", server.url());
        let history_body = serde_json::json!({
            "ok": true,
            "has_more": false,
            "messages": [
                {"ts": "1700000001.000100", "user": "U1", "text": "report for <@U2>",
                 "files": [
                    {"id": "F1", "name": "report.pdf", "filetype": "pdf", "url_private_download": file_url},
                    {"id": "F2", "name": "photo.png", "filetype": "png", "url_private_download": "http://127.0.0.1:1/never"}
                 ]},
                {"ts": "1700000000.000100", "subtype": "channel_join", "text": "joined"}
            ]
        });
        let _auth = mock_auth(&mut server);
        let _history = server
            .mock("GET", "/conversations.history")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(history_body.to_string())
            .create();
        let _users = server
            .mock("GET", "/users.list")
            .with_status(200)
            .with_body(r#"{"ok":true,"members":[{"id":"U1","real_name":"Alice"},{"id":"U2","name":"bob"}]}"#)
            .create();
        let file = server
            .mock("GET", "/files/report.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.4")
            .create();

        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, &server.url(), true);
        config.file_types = vec!["pdf".to_string()];

        let summary = download_channel(&config, &client(&config)).unwrap();

        file.assert();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.files_found, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(
            summary.downloaded,
            vec![config.download_dir.join("0000-report.pdf")]
        );

        let json_path = summary.json_path.unwrap();
        let name = json_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("channel_C1_") && name.ends_with(".json"));
        let saved: Vec<serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(saved, history_body["messages"].as_array().unwrap().clone());

        let excel_path = summary.excel_path.unwrap();
        assert_eq!(excel_path.with_extension("json"), json_path);
        assert!(excel_path.exists());
    }

    #[test]
    fn test_download_channel_empty_history_exports_nothing() {
        let mut server = mockito::Server::new();
        let _auth = mock_auth(&mut server);
        let _history = server
            .mock("GET", "/conversations.history")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"ok":true,"messages":[],"has_more":false}"#)
            .create();
        let users = server.mock("GET", "/users.list").expect(0).create();

        let dir = TempDir::new().unwrap();
        let config = config(&dir, &server.url(), true);

        let summary = download_channel(&config, &client(&config)).unwrap();

        users.assert();
        assert_eq!(summary, RunSummary::default());
        assert_eq!(fs::read_dir(&config.messages_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_download_channel_invalid_token_aborts() {
        let mut server = mockito::Server::new();
        let _auth = server
            .mock("GET", "/auth.test")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"invalid_auth"}"#)
            .create();
        let history = server
            .mock("GET", "/conversations.history")
            .match_query(mockito::Matcher::Any)
            .expect(0)
            .create();

        let dir = TempDir::new().unwrap();
        let config = config(&dir, &server.url(), false);

        let err = download_channel(&config, &client(&config)).unwrap_err();

        history.assert();
        assert!(matches!(err, AppError::Auth { ref code, .. } if code == "invalid_auth"));
    }

    #[test]
    fn test_download_channel_user_directory_error_is_fatal() {
        let mut server = mockito::Server::new();
        let _auth = mock_auth(&mut server);
        let _history = server
            .mock("GET", "/conversations.history")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"ok":true,"messages":[{"ts":"1.0","text":"hi"}],"has_more":false}"#)
            .create();
        let _users = server
            .mock("GET", "/users.list")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"missing_scope"}"#)
            .create();

        let dir = TempDir::new().unwrap();
        let config = config(&dir, &server.url(), false);

        let err = download_channel(&config, &client(&config)).unwrap_err();

        assert!(matches!(err, AppError::Transport { ref code, .. } if code == "missing_scope"));
        assert_eq!(fs::read_dir(&config.messages_dir).unwrap().count(), 0);
    }
}
