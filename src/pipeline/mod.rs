//! Message processing pipeline.
//!
//! Every inbound message flows through:
//! 1. `TriggerGate::check()`: phrase match, duplicate suppression
//! 2. `ApplicationProcessor::build_record()`: extraction, merge, enrichment
//! 3. `SheetRouter`: partition resolve + append
//! 4. `ChannelAdapter::send_reply()`: threaded acknowledgment
//!
//! No-signal records exit silently between 2 and 3.

pub mod gate;
pub mod processor;
pub mod types;

pub use gate::{GateDecision, TriggerGate};
pub use processor::{ApplicationProcessor, ProcessorDeps};
pub use types::{
    ChannelAdapter, InboundMessage, NormalizedRecord, PipelineOutcome, RecordContext,
};
