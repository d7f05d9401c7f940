use std::collections::HashMap;

use tracing::{debug, info};

use crate::api::{AuthInfo, ChannelInfo, HISTORY_PAGE_LIMIT, HistoryRequest, Message, SlackApi};
use crate::error::{AppError, Result};
use crate::timestamp::date_str_to_slack_ts;

/// Called with the running message total after each history page.
pub type HistoryProgress<'a> = Option<&'a dyn Fn(usize)>;

/// Which operation a remote error came from; picks the scope named in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    ChannelInfo,
    History,
}

impl Operation {
    fn required_scopes(self) -> &'static str {
        match self {
            Operation::ChannelInfo => "channels:read or groups:read",
            Operation::History => "channels:history or groups:history",
        }
    }

    fn failure(self) -> &'static str {
        match self {
            Operation::ChannelInfo => "channel access failed",
            Operation::History => "failed to fetch messages",
        }
    }
}

/// Maps a raw remote failure into the auth / not-found / transport taxonomy.
fn classify(err: AppError, op: Operation, channel_id: &str) -> AppError {
    match err {
        AppError::Transport { code, .. } if code == "missing_scope" => AppError::Auth {
            message: format!("token is missing required scope ({})", op.required_scopes()),
            code,
        },
        AppError::Transport { code, .. } if code == "channel_not_found" => AppError::NotFound {
            message: format!(
                "channel '{}' not found or bot doesn't have access",
                channel_id
            ),
            code,
        },
        AppError::Transport { code, message } => AppError::Transport {
            message: format!("{}: {}", op.failure(), message),
            code,
        },
        other => other,
    }
}

/// Slack operations used by the channel exporter, over any [`SlackApi`].
pub struct SlackClient<A> {
    api: A,
}

impl<A: SlackApi> SlackClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn validate_token(&self) -> Result<AuthInfo> {
        self.api.auth_test().map_err(|e| match e {
            AppError::Transport { code, message } => AppError::Auth {
                message: format!("token validation failed: {}", message),
                code,
            },
            other => other,
        })
    }

    pub fn get_channel_info(&self, channel_id: &str) -> Result<ChannelInfo> {
        self.api
            .conversations_info(channel_id)
            .map_err(|e| classify(e, Operation::ChannelInfo, channel_id))
    }

    /// Fetches every message of `channel_id` between the optional `YYYY-MM-DD`
    /// bounds, in page-arrival order. Any remote error discards the pages
    /// already fetched.
    pub fn get_channel_history(
        &self,
        channel_id: &str,
        oldest_date: Option<&str>,
        newest_date: Option<&str>,
        on_progress: HistoryProgress,
    ) -> Result<Vec<Message>> {
        let oldest = date_str_to_slack_ts(oldest_date)?;
        let latest = date_str_to_slack_ts(newest_date)?;

        let mut all_messages: Vec<Message> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let request = HistoryRequest {
                channel: channel_id.to_string(),
                cursor: cursor.take(),
                oldest: oldest.clone(),
                latest: latest.clone(),
                limit: HISTORY_PAGE_LIMIT,
            };

            let page = self
                .api
                .conversations_history(&request)
                .map_err(|e| classify(e, Operation::History, channel_id))?;

            if page.messages.is_empty() {
                debug!(channel_id, "empty history page, stopping");
                break;
            }

            let next = page.continuation().map(str::to_string);
            all_messages.extend(page.messages);
            debug!(channel_id, total = all_messages.len(), "fetched history page");

            if let Some(cb) = on_progress {
                cb(all_messages.len());
            }

            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        info!(channel_id, count = all_messages.len(), "fetched channel history");
        Ok(all_messages)
    }

    /// Maps every user id in the workspace directory to a display name.
    pub fn get_users(&self) -> Result<HashMap<String, String>> {
        let mut user_map = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.api.users_list(cursor.as_deref()).map_err(|e| match e {
                AppError::Transport { code, message } => AppError::Transport {
                    message: format!("failed to fetch users: {}", message),
                    code,
                },
                other => other,
            })?;

            for user in &page.members {
                match (&user.id, user.display_name()) {
                    (Some(id), Some(name)) => {
                        user_map.insert(id.clone(), name);
                    }
                    _ => debug!("skipping directory entry without id"),
                }
            }

            match page.next_cursor() {
                Some(c) => cursor = Some(c.to_string()),
                None => break,
            }
        }

        info!(count = user_map.len(), "fetched user directory");
        Ok(user_map)
    }
}
