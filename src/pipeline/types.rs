//! Shared types for the message processing pipeline.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::extract::schema::{ContextField, ExtractedRecord};

// ── Inbound message ─────────────────────────────────────────────────

/// One inbound chat message, as delivered by a channel adapter.
///
/// Immutable once built; the pipeline never edits it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Source channel adapter: "slack", etc.
    pub channel: String,
    /// Originating conversation; selects the sheet partition.
    pub routing_key: String,
    /// Message body.
    pub text: String,
    /// Channel-native id of this message.
    pub message_id: Option<String>,
    /// Event time in epoch seconds, if the adapter could parse one.
    pub timestamp: Option<f64>,
    /// Message to thread replies under (channel-native id).
    pub thread_anchor: Option<String>,
}

impl InboundMessage {
    /// Key used to suppress repeated deliveries of the same event.
    pub fn dedup_key(&self) -> String {
        match (&self.message_id, self.timestamp) {
            (Some(id), _) => format!("{}:{}", self.routing_key, id),
            (None, Some(ts)) => format!("{}:{}", self.routing_key, ts),
            (None, None) => format!("{}:{}", self.routing_key, self.text),
        }
    }
}

// ── Normalized record ───────────────────────────────────────────────

/// Context fields derived alongside the schema fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordContext {
    pub submitted_on: String,
    pub organization: String,
    pub vendor: String,
    pub routing_key: String,
}

impl RecordContext {
    pub fn get(&self, field: ContextField) -> &str {
        match field {
            ContextField::SubmittedOn => &self.submitted_on,
            ContextField::Organization => &self.organization,
            ContextField::Vendor => &self.vendor,
            ContextField::RoutingKey => &self.routing_key,
        }
    }
}

/// The record handed to the sheet writer. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    context: RecordContext,
    fields: ExtractedRecord,
}

impl NormalizedRecord {
    pub fn new(context: RecordContext, fields: ExtractedRecord) -> Self {
        Self { context, fields }
    }

    pub fn context(&self) -> &RecordContext {
        &self.context
    }

    /// Cells in sheet column order: context fields, then schema fields.
    pub fn to_row(&self) -> Vec<String> {
        ContextField::ALL
            .iter()
            .map(|&f| self.context.get(f).to_string())
            .chain(self.fields.iter().map(|(_, v)| v.to_string()))
            .collect()
    }
}

// ── Pipeline outcome ────────────────────────────────────────────────

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Text does not contain a trigger phrase.
    NotTriggered,
    /// Same event was already accepted.
    Duplicate,
    /// Neither name nor member id could be extracted; nothing written.
    NoSignal,
    /// Row appended to `partition`.
    Recorded { partition: String },
    /// Store rejected the write; the record was dropped.
    WriteFailed { error: String },
}

impl PipelineOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotTriggered => "not_triggered",
            Self::Duplicate => "duplicate",
            Self::NoSignal => "no_signal",
            Self::Recorded { .. } => "recorded",
            Self::WriteFailed { .. } => "write_failed",
        }
    }
}

// ── Channel adapter trait ───────────────────────────────────────────

/// Outbound side of a channel: threaded replies to the source conversation.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel name (e.g. "slack").
    fn name(&self) -> &str;

    /// Post `reply` in the thread of `original`.
    async fn send_reply(&self, original: &InboundMessage, reply: &str)
    -> Result<(), ChannelError>;
}
