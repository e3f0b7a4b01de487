//! Application processor: turns a trigger message into one sheet row.
//!
//! Flow:
//! 1. Trigger gate (phrase match + duplicate suppression)
//! 2. Pattern extraction and model extraction, merged field by field
//! 3. Context enrichment and normalization
//! 4. No-signal check (name or member id required)
//! 5. Partition resolve + append
//! 6. Threaded acknowledgment (best effort)

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::extract::{
    ContextEnricher, ModelExtractor, PatternExtractor, SchemaField, merge, normalize_record,
};
use crate::pipeline::gate::{GateDecision, TriggerGate};
use crate::pipeline::types::{
    ChannelAdapter, InboundMessage, NormalizedRecord, PipelineOutcome, RecordContext,
};
use crate::sheets::SheetRouter;

/// Reply posted after a successful append.
const SUCCESS_REPLY: &str = "応募者情報をスプレッドシートに記録しました。";

/// Components the processor runs, wired once at startup.
pub struct ProcessorDeps {
    pub gate: TriggerGate,
    pub patterns: PatternExtractor,
    pub model: ModelExtractor,
    pub enricher: ContextEnricher,
    pub router: SheetRouter,
    pub replies: Arc<dyn ChannelAdapter>,
}

/// Runs the full pipeline for one inbound message.
pub struct ApplicationProcessor {
    deps: ProcessorDeps,
}

impl ApplicationProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self { deps }
    }

    /// Process one message top to bottom. Never panics on I/O failure;
    /// store errors end up in `PipelineOutcome::WriteFailed`.
    pub async fn process(&self, message: &InboundMessage) -> PipelineOutcome {
        match self.deps.gate.check(message) {
            GateDecision::NotTriggered => {
                debug!(routing_key = %message.routing_key, "No trigger phrase; skipping");
                return PipelineOutcome::NotTriggered;
            }
            GateDecision::Duplicate => {
                info!(routing_key = %message.routing_key, "Duplicate delivery; skipping");
                return PipelineOutcome::Duplicate;
            }
            GateDecision::Eligible => {}
        }

        info!(
            channel = %message.channel,
            routing_key = %message.routing_key,
            "Processing application notification"
        );

        let Some(record) = self.build_record(message).await else {
            info!(
                routing_key = %message.routing_key,
                "Neither name nor member id extracted; nothing recorded"
            );
            return PipelineOutcome::NoSignal;
        };

        let outcome = match self.write(&record).await {
            Ok(partition) => {
                info!(partition = %partition, "Applicant recorded");
                self.acknowledge(message, SUCCESS_REPLY).await;
                PipelineOutcome::Recorded { partition }
            }
            Err(e) => {
                error!(
                    routing_key = %message.routing_key,
                    error = %e,
                    "Failed to record applicant"
                );
                let notice = format!("スプレッドシートへの書き込みに失敗しました: {e}");
                self.acknowledge(message, &notice).await;
                PipelineOutcome::WriteFailed {
                    error: e.to_string(),
                }
            }
        };
        debug!(outcome = outcome.label(), "Pipeline finished");
        outcome
    }

    /// Extract, merge, enrich and normalize. `None` when the record has no
    /// name and no member id.
    pub async fn build_record(&self, message: &InboundMessage) -> Option<NormalizedRecord> {
        let text = &message.text;

        let pattern = self.deps.patterns.extract(text);
        let model = self.deps.model.extract(text).await;
        if model.is_degraded() {
            debug!("Continuing with pattern values only");
        }
        let merged = merge(&model.into_record(), &pattern);
        let fields = normalize_record(&merged);

        if !fields.has_signal() {
            return None;
        }

        let vendor = match self.deps.enricher.vendor(text) {
            Some(vendor) => vendor,
            None => self.deps.model.extract_vendor(text).await,
        };
        let context = RecordContext {
            submitted_on: self.deps.enricher.submission_date(message.timestamp),
            organization: self.deps.enricher.organization(text),
            vendor,
            routing_key: message.routing_key.clone(),
        };

        debug!(
            name = %fields.get(SchemaField::Name),
            member_id = %fields.get(SchemaField::MemberId),
            organization = %context.organization,
            vendor = %context.vendor,
            "Record built"
        );
        Some(NormalizedRecord::new(context, fields))
    }

    async fn write(&self, record: &NormalizedRecord) -> Result<String, PipelineError> {
        let partition = self
            .deps
            .router
            .resolve_partition(&record.context().routing_key)
            .await?;
        self.deps.router.append_record(&partition, record).await?;
        Ok(partition.name)
    }

    /// Fire-and-forget from the pipeline's point of view: failures are logged.
    async fn acknowledge(&self, message: &InboundMessage, reply: &str) {
        if let Err(e) = self.deps.replies.send_reply(message, reply).await {
            warn!(
                channel = self.deps.replies.name(),
                error = %e,
                "Acknowledgment not delivered"
            );
        }
    }
}
