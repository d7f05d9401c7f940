use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::Message;
use crate::error::{AppError, DownloadError, Result};

const CHUNK_SIZE: usize = 8192;
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Attachment metadata found in a message's `files` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileDescriptor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub filetype: Option<String>,
    pub url_private_download: Option<String>,
}

impl FileDescriptor {
    /// Reads the known fields of a `files` entry; non-string values count as absent.
    pub fn from_value(file_obj: &Value) -> Self {
        let field = |key: &str| {
            file_obj
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };
        Self {
            id: field("id"),
            name: field("name"),
            filetype: field("filetype"),
            url_private_download: field("url_private_download"),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }
}

/// Collects attachment descriptors in message order, then attachment order.
/// A non-empty `file_types` keeps only exact (case-sensitive) `filetype` matches.
pub fn extract_files(messages: &[Message], file_types: &[String]) -> Vec<FileDescriptor> {
    let mut files = Vec::new();

    for message in messages {
        let Some(msg_files) = message.get("files").and_then(|f| f.as_array()) else {
            continue;
        };
        files.extend(msg_files.iter().map(FileDescriptor::from_value));
    }

    if !file_types.is_empty() {
        files.retain(|f| {
            f.filetype
                .as_ref()
                .is_some_and(|ft| file_types.iter().any(|wanted| wanted == ft))
        });
    }

    files
}

/// Observer hooks for a download batch.
#[derive(Default, Clone, Copy)]
pub struct DownloadCallbacks<'a> {
    progress: Option<&'a dyn Fn(&str, usize, usize)>,
    error: Option<&'a dyn Fn(&str, &DownloadError)>,
}

impl<'a> DownloadCallbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called before each attempt with (name, 1-based position, total).
    pub fn with_progress(mut self, cb: &'a dyn Fn(&str, usize, usize)) -> Self {
        self.progress = Some(cb);
        self
    }

    pub fn with_error(mut self, cb: &'a dyn Fn(&str, &DownloadError)) -> Self {
        self.error = Some(cb);
        self
    }

    fn report_progress(&self, name: &str, position: usize, total: usize) {
        if let Some(cb) = self.progress {
            cb(name, position, total);
        }
    }

    fn report_error(&self, name: &str, err: &DownloadError) {
        if let Some(cb) = self.error {
            cb(name, err);
        }
    }
}

/// Downloads private Slack files with the bot token.
pub struct FileDownloader {
    client: Client,
    token: String,
    download_dir: PathBuf,
}

impl FileDownloader {
    pub fn new(token: &str, download_dir: &Path) -> Result<Self> {
        fs::create_dir_all(download_dir).map_err(|e| AppError::WriteFile {
            path: download_dir.display().to_string(),
            source: e,
        })?;

        // Files can be large; only the connect phase is bounded.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| AppError::transport("client_error", e.to_string()))?;

        Ok(Self {
            client,
            token: token.to_string(),
            download_dir: download_dir.to_path_buf(),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Target path, prefixed with a 4-digit sequence number when given.
    pub fn target_path(&self, name: &str, sequence: Option<usize>) -> PathBuf {
        let name = sanitize_file_name(name);
        match sequence {
            Some(n) => self.download_dir.join(format!("{:04}-{}", n, name)),
            None => self.download_dir.join(name),
        }
    }

    pub fn download_file(
        &self,
        file: &FileDescriptor,
        sequence: Option<usize>,
    ) -> std::result::Result<PathBuf, DownloadError> {
        let url = file
            .url_private_download
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(DownloadError::MissingUrl)?;
        let name = file
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(DownloadError::MissingName)?;

        let mut response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| DownloadError::Request {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                name: name.to_string(),
                status: status.as_u16(),
            });
        }

        // Slack answers an unauthorized file request with 200 and its login page.
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if content_type.to_lowercase().contains("text/html") {
            return Err(DownloadError::LoginPage {
                name: name.to_string(),
                content_type,
            });
        }

        let path = self.target_path(name, sequence);
        if let Err(e) = write_stream(&mut response, &path, name) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        debug!(path = %path.display(), "downloaded file");
        Ok(path)
    }

    /// Downloads `files` in order, isolating failures per file. Returns the
    /// paths that succeeded, in attempt order.
    pub fn download_files(
        &self,
        files: &[FileDescriptor],
        callbacks: DownloadCallbacks,
    ) -> Vec<PathBuf> {
        let total = files.len();
        let mut downloaded = Vec::with_capacity(total);

        for (i, file) in files.iter().enumerate() {
            let name = file.display_name();
            callbacks.report_progress(name, i + 1, total);

            match self.download_file(file, Some(i)) {
                Ok(path) => downloaded.push(path),
                Err(e) => {
                    warn!(file = name, error = %e, "file download failed");
                    callbacks.report_error(name, &e);
                }
            }
        }

        info!(
            downloaded = downloaded.len(),
            failed = total - downloaded.len(),
            "download batch finished"
        );
        downloaded
    }
}

fn write_stream(
    reader: &mut impl Read,
    path: &Path,
    name: &str,
) -> std::result::Result<(), DownloadError> {
    let write_err = |source: std::io::Error| DownloadError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).map_err(|e| DownloadError::Request {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).map_err(write_err)?;
    }

    writer.flush().map_err(write_err)
}

/// Keeps a remote file name from escaping the download directory.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
