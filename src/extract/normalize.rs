//! Record normalizer: canonical forms for merged values.

use serde_json::Value;

use crate::extract::schema::{ExtractedRecord, SchemaField};

/// Honorifics stripped from the tail of a name.
const NAME_HONORIFICS: &[&str] = &["先生", "様", "さん", "殿"];

/// Normalize a merged record.
///
/// - identifier and age fields keep ASCII digits only
/// - names lose a trailing reading in parentheses and honorific suffixes
/// - everything else is trimmed
pub fn normalize_record(record: &ExtractedRecord) -> ExtractedRecord {
    ExtractedRecord::from_fn(|field| normalize_value(field, record.get(field)))
}

/// Normalize a single field value.
pub fn normalize_value(field: SchemaField, value: &str) -> String {
    if field.is_numeric() {
        return digits_only(value);
    }
    match field {
        SchemaField::Name => clean_name(value),
        _ => value.trim().to_string(),
    }
}

/// Keep only digits, folding full-width digits to ASCII.
///
/// `"tel:080-1234"` → `"0801234"`, `"32歳"` → `"32"`, `"abc"` → `""`.
pub fn digits_only(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32),
            _ => None,
        })
        .collect()
}

/// Strip a trailing `（reading）` and honorific suffixes from a name.
pub fn clean_name(value: &str) -> String {
    let mut name = value.trim();
    if let Some(idx) = name.find(['（', '(']) {
        name = name[..idx].trim_end();
    }
    loop {
        let before = name;
        for suffix in NAME_HONORIFICS {
            if let Some(stripped) = name.strip_suffix(suffix) {
                name = stripped.trim_end();
            }
        }
        if name == before {
            break;
        }
    }
    name.to_string()
}

/// Flatten a service-returned value into one string.
///
/// Scalars become their text form; arrays and objects use compact JSON so no
/// non-string type ever reaches the sheet.
pub fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
