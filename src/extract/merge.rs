//! Extraction merger.

use crate::extract::schema::ExtractedRecord;

/// Per field: model value if non-empty, else pattern value, else `""`.
pub fn merge(model: &ExtractedRecord, pattern: &ExtractedRecord) -> ExtractedRecord {
    ExtractedRecord::from_fn(|field| {
        let preferred = model.get(field).trim();
        if preferred.is_empty() {
            pattern.get(field).to_string()
        } else {
            preferred.to_string()
        }
    })
}
