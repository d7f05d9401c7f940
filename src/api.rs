//! Capability boundary between the channel export pipeline and the Slack Web API.
//!
//! [`SlackApi`] exposes one call per remote method, each returning a single page.
//! Pagination, error classification and name resolution live in
//! [`crate::slack::SlackClient`], so any implementation of this trait (the
//! blocking HTTP client in [`crate::http`], or a scripted mock in tests) gets the
//! same behaviour.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A raw message record as returned by `conversations.history`.
///
/// Kept as an untyped JSON value so that the JSON export preserves every field.
pub type Message = serde_json::Value;

/// Page size requested from `conversations.history`.
pub const HISTORY_PAGE_LIMIT: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub user: String,
    pub team: String,
    pub user_id: String,
    pub team_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: Option<String>,
}

fn cursor_of(metadata: &Option<ResponseMetadata>) -> Option<&str> {
    metadata
        .as_ref()
        .and_then(|m| m.next_cursor.as_deref())
        .filter(|c| !c.is_empty())
}

/// Parameters of one `conversations.history` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRequest {
    pub channel: String,
    pub cursor: Option<String>,
    pub oldest: Option<String>,
    pub latest: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

impl HistoryPage {
    pub fn new(messages: Vec<Message>, has_more: bool, next_cursor: Option<&str>) -> Self {
        Self {
            messages,
            has_more,
            response_metadata: next_cursor.map(|c| ResponseMetadata {
                next_cursor: Some(c.to_string()),
            }),
        }
    }

    /// Cursor for the following page. Both `has_more` and a non-empty cursor are required.
    pub fn continuation(&self) -> Option<&str> {
        if self.has_more {
            cursor_of(&self.response_metadata)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

impl SlackUser {
    /// Best-effort display name: real name, profile real name, profile display
    /// name, handle, then the id itself. Empty strings are skipped.
    pub fn display_name(&self) -> Option<String> {
        let profile = self.profile.as_ref();
        [
            self.real_name.as_deref(),
            profile.and_then(|p| p.real_name.as_deref()),
            profile.and_then(|p| p.display_name.as_deref()),
            self.name.as_deref(),
            self.id.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UsersPage {
    #[serde(default)]
    pub members: Vec<SlackUser>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

impl UsersPage {
    pub fn new(members: Vec<SlackUser>, next_cursor: Option<&str>) -> Self {
        Self {
            members,
            response_metadata: next_cursor.map(|c| ResponseMetadata {
                next_cursor: Some(c.to_string()),
            }),
        }
    }

    pub fn next_cursor(&self) -> Option<&str> {
        cursor_of(&self.response_metadata)
    }
}

/// One call per Slack Web API method used by the exporter.
///
/// Remote failures are reported as [`crate::AppError::Transport`] carrying the
/// Slack error code; callers reclassify them.
pub trait SlackApi {
    fn auth_test(&self) -> Result<AuthInfo>;

    fn conversations_info(&self, channel: &str) -> Result<ChannelInfo>;

    fn conversations_history(&self, request: &HistoryRequest) -> Result<HistoryPage>;

    fn users_list(&self, cursor: Option<&str>) -> Result<UsersPage>;
}

impl<T: SlackApi + ?Sized> SlackApi for &T {
    fn auth_test(&self) -> Result<AuthInfo> {
        (**self).auth_test()
    }

    fn conversations_info(&self, channel: &str) -> Result<ChannelInfo> {
        (**self).conversations_info(channel)
    }

    fn conversations_history(&self, request: &HistoryRequest) -> Result<HistoryPage> {
        (**self).conversations_history(request)
    }

    fn users_list(&self, cursor: Option<&str>) -> Result<UsersPage> {
        (**self).users_list(cursor)
    }
}
