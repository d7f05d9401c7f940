use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Serialize;

use crate::api::Message;
use crate::error::{AppError, Result};
use crate::timestamp::{format_slack_ts, replace_mentions};

/// Shown in the user column for messages without an author.
pub const SYSTEM_USER: &str = "SYSTEM";

const HEADERS: [&str; 3] = ["user_name", "text", "date"];
// Excel rejects longer cell strings.
const MAX_CELL_CHARS: usize = 32_767;

/// `channel_<id>_<YYYYMMDD_HHMMSS>`, shared by both export files of a run.
pub fn export_file_stem(channel_id: &str, now: DateTime<Local>) -> String {
    format!("channel_{}_{}", channel_id, now.format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadsheetRow {
    pub user_name: String,
    pub text: String,
    pub date: String,
}

pub fn spreadsheet_rows(
    messages: &[Message],
    user_map: &HashMap<String, String>,
) -> Vec<SpreadsheetRow> {
    messages
        .iter()
        .map(|msg| {
            let author = msg
                .get("user")
                .and_then(|u| u.as_str())
                .filter(|u| !u.is_empty());
            let user_name = match author {
                Some(id) => user_map.get(id).cloned().unwrap_or_else(|| id.to_string()),
                None => SYSTEM_USER.to_string(),
            };
            let text = msg.get("text").and_then(|t| t.as_str()).unwrap_or("");
            let ts = msg.get("ts").and_then(|t| t.as_str());

            SpreadsheetRow {
                user_name,
                text: replace_mentions(text, user_map),
                date: format_slack_ts(ts),
            }
        })
        .collect()
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AppError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, data).map_err(|e| AppError::JsonSerialize(e.to_string()))?;
    Ok(())
}

/// Writes the raw message records as indented JSON, non-ASCII kept verbatim.
pub fn save_to_json(messages: &[Message], path: &Path) -> Result<PathBuf> {
    ensure_parent(path)?;
    write_json(path, &messages)?;
    Ok(path.to_path_buf())
}

fn truncate_cell(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn write_workbook(rows: &[SpreadsheetRow], path: &Path) -> std::result::Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (col, header) in (0u16..).zip(HEADERS) {
        worksheet.write_string_with_format(0, col, header, &header_format)?;
    }

    for (row_idx, row) in (1u32..).zip(rows) {
        worksheet.write_string(row_idx, 0, truncate_cell(&row.user_name))?;
        worksheet.write_string(row_idx, 1, truncate_cell(&row.text))?;
        worksheet.write_string(row_idx, 2, &row.date)?;
    }

    worksheet.set_column_width(0, 24)?;
    worksheet.set_column_width(1, 80)?;
    worksheet.set_column_width(2, 20)?;

    workbook.save(path)
}

/// Writes one row per message: resolved user name, mention-substituted text, local date.
pub fn save_to_excel(
    messages: &[Message],
    path: &Path,
    user_map: &HashMap<String, String>,
) -> Result<PathBuf> {
    ensure_parent(path)?;
    let rows = spreadsheet_rows(messages, user_map);
    write_workbook(&rows, path)
        .map_err(|e| AppError::Spreadsheet(format!("{}: {}", path.display(), e)))?;
    Ok(path.to_path_buf())
}
