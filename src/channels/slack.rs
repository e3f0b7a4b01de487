//! Slack channel: Events API webhook in, `chat.postMessage` out.
//!
//! The webhook answers immediately and runs the pipeline in a spawned task,
//! since Slack re-delivers events it has not seen acknowledged within a few
//! seconds.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::pipeline::{ApplicationProcessor, ChannelAdapter, InboundMessage};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Message subtypes that carry a new, complete message body.
const ACCEPTED_SUBTYPES: &[&str] = &["bot_message", "file_share", "thread_broadcast"];

// ── Events API payloads ─────────────────────────────────────────────

/// Top-level Events API envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    UrlVerification { challenge: String },
    EventCallback { event: SlackEvent },
    #[serde(other)]
    Other,
}

/// The inner `event` object. Only message fields we use are modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

impl SlackEvent {
    /// Convert a message event into an `InboundMessage`.
    ///
    /// Returns `None` for non-message events and for edits, deletions and
    /// other subtypes that do not represent a newly posted message.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        if self.kind != "message" || self.channel.is_empty() {
            return None;
        }
        if let Some(subtype) = self.subtype.as_deref()
            && !ACCEPTED_SUBTYPES.contains(&subtype)
        {
            debug!(subtype, "Ignoring message subtype");
            return None;
        }
        let timestamp = self.ts.as_deref().and_then(|ts| ts.parse::<f64>().ok());
        Some(InboundMessage {
            channel: "slack".to_string(),
            routing_key: self.channel,
            text: self.text,
            message_id: self.ts.clone(),
            timestamp,
            // Reply in the existing thread if the notification is itself a reply.
            thread_anchor: self.thread_ts.or(self.ts),
        })
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// Posts threaded replies with a bot token.
pub struct SlackChannel {
    bot_token: Option<SecretString>,
    client: reqwest::Client,
    api_base: String,
}

impl SlackChannel {
    pub fn new(bot_token: Option<SecretString>) -> Self {
        if bot_token.is_none() {
            warn!("SLACK_BOT_TOKEN not set; acknowledgments disabled");
        }
        Self {
            bot_token,
            client: reqwest::Client::new(),
            api_base: SLACK_API_BASE.to_string(),
        }
    }

    /// Point at a different API host (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }
}

#[derive(Deserialize)]
struct SlackApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ChannelAdapter for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send_reply(
        &self,
        original: &InboundMessage,
        reply: &str,
    ) -> Result<(), ChannelError> {
        let Some(token) = &self.bot_token else {
            return Err(ChannelError::NotConfigured {
                name: "slack".into(),
            });
        };

        let mut body = serde_json::json!({
            "channel": original.routing_key,
            "text": reply,
        });
        if let Some(anchor) = &original.thread_anchor {
            body["thread_ts"] = serde_json::Value::String(anchor.clone());
        }

        let send_failed = |reason: String| ChannelError::SendFailed {
            name: "slack".into(),
            reason,
        };

        let resp = self
            .client
            .post(self.api_url("chat.postMessage"))
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(send_failed(format!("HTTP {}", resp.status())));
        }
        let api: SlackApiResponse = resp.json().await.map_err(|e| send_failed(e.to_string()))?;
        if !api.ok {
            return Err(send_failed(api.error.unwrap_or_else(|| "unknown error".into())));
        }
        debug!(channel = %original.routing_key, "Slack reply posted");
        Ok(())
    }
}

// ── Inbound webhook ─────────────────────────────────────────────────

#[derive(Clone)]
struct WebhookState {
    processor: Arc<ApplicationProcessor>,
}

/// Routes: `POST /slack/events` and `GET /` health check.
pub fn slack_routes(processor: Arc<ApplicationProcessor>) -> Router {
    Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/slack/events", post(slack_events))
        .with_state(WebhookState { processor })
}

async fn slack_events(
    State(state): State<WebhookState>,
    Json(envelope): Json<SlackEnvelope>,
) -> Response {
    match envelope {
        SlackEnvelope::UrlVerification { challenge } => {
            info!("Slack URL verification");
            Json(serde_json::json!({ "challenge": challenge })).into_response()
        }
        SlackEnvelope::EventCallback { event } => {
            if let Some(message) = event.into_inbound() {
                let processor = Arc::clone(&state.processor);
                tokio::spawn(async move {
                    let outcome = processor.process(&message).await;
                    debug!(
                        routing_key = %message.routing_key,
                        outcome = outcome.label(),
                        "Slack event handled"
                    );
                });
            }
            StatusCode::OK.into_response()
        }
        SlackEnvelope::Other => StatusCode::OK.into_response(),
    }
}
