//! Pattern-based field extractor.
//!
//! Each schema field is looked up on its own `・<label>：<value>` line.
//! Missing labels are not an error; the field is simply left empty.

use regex::Regex;
use tracing::debug;

use crate::extract::schema::{ExtractedRecord, SchemaField};

/// Compiled labeled-line rule for one field.
#[derive(Debug, Clone)]
struct FieldRule {
    field: SchemaField,
    regex: Regex,
}

/// Deterministic extractor over the notification's labeled lines.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    rules: Vec<FieldRule>,
}

impl PatternExtractor {
    /// Build one rule per schema field.
    pub fn new() -> Self {
        let rules = SchemaField::ALL
            .iter()
            .map(|&field| FieldRule {
                field,
                regex: labeled_line(field),
            })
            .collect();
        Self { rules }
    }

    /// Extract every schema field from `text`.
    pub fn extract(&self, text: &str) -> ExtractedRecord {
        let mut record = ExtractedRecord::empty();
        for rule in &self.rules {
            if let Some(value) = rule
                .regex
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .filter(|v| !v.is_empty())
            {
                record.set(rule.field, value);
            }
        }
        debug!(
            matched = record.iter().filter(|(_, v)| !v.is_empty()).count(),
            "Pattern extraction complete"
        );
        record
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Horizontal whitespace only; a bare `\s` would let an empty value swallow
/// the next line.
const SPACE: &str = r"[ \t\x{3000}]*";

/// `・<label>：<value>` up to end of line. Accepts full-width or ASCII colon.
fn labeled_line(field: SchemaField) -> Regex {
    let label = regex::escape(field.line_label());
    let value = match field {
        // The reading in parentheses is not part of the name.
        SchemaField::Name => r"([^（(\n]+)",
        SchemaField::MemberId => r"(\S+)",
        _ => r"([^\n]+)",
    };
    // Labels come from a fixed table and are escaped, so this cannot fail.
    Regex::new(&format!(r"・{SPACE}{label}{SPACE}[：:]{SPACE}{value}")).unwrap()
}
