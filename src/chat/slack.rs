//! Slack Web API `chat.postMessage`.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::{ChatClient, ChatError, PostResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    mrkdwn: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

/// Blocking Slack client authenticated with a bot token.
pub struct SlackClient {
    http: reqwest::blocking::Client,
    api_base: String,
    token: String,
}

impl SlackClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self, ChatError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

impl ChatClient for SlackClient {
    fn post(
        &mut self,
        channel: &str,
        text: &str,
        thread_handle: Option<&str>,
    ) -> Result<PostResponse, ChatError> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let payload = PostMessage {
            channel,
            text,
            mrkdwn: true,
            thread_ts: thread_handle,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ChatError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PostResponse = serde_json::from_str(&body)?;
        debug!(channel, ok = parsed.ok, ts = ?parsed.message_ts, "chat.postMessage");
        Ok(parsed)
    }
}
