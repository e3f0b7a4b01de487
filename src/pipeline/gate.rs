//! Trigger gate: decides whether a message enters the pipeline.
//!
//! A message is eligible when its text contains any trigger phrase and its
//! dedup key has not been seen among the last `capacity` accepted events.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use crate::pipeline::types::InboundMessage;

/// Gate decision for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Eligible,
    NotTriggered,
    Duplicate,
}

/// Bounded FIFO set of recently accepted event keys.
#[derive(Debug, Default)]
struct RecentKeys {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

pub struct TriggerGate {
    phrases: Vec<String>,
    capacity: usize,
    recent: Mutex<RecentKeys>,
}

impl TriggerGate {
    pub fn new(phrases: Vec<String>, capacity: usize) -> Self {
        Self {
            phrases: phrases.into_iter().filter(|p| !p.is_empty()).collect(),
            capacity,
            recent: Mutex::new(RecentKeys::default()),
        }
    }

    /// True when `text` contains any trigger phrase.
    pub fn is_triggered(&self, text: &str) -> bool {
        self.phrases.iter().any(|p| text.contains(p.as_str()))
    }

    /// Check a message and, if eligible, remember its key.
    pub fn check(&self, message: &InboundMessage) -> GateDecision {
        if !self.is_triggered(&message.text) {
            return GateDecision::NotTriggered;
        }
        if self.capacity == 0 {
            return GateDecision::Eligible;
        }

        let key = message.dedup_key();
        let mut recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if recent.seen.contains(&key) {
            debug!(key = %key, "Duplicate delivery suppressed");
            return GateDecision::Duplicate;
        }
        recent.seen.insert(key.clone());
        recent.order.push_back(key);
        while recent.order.len() > self.capacity {
            if let Some(old) = recent.order.pop_front() {
                recent.seen.remove(&old);
            }
        }
        GateDecision::Eligible
    }
}
