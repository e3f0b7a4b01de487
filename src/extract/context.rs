//! Context enrichers: organization, vendor, submission date.

use chrono::{DateTime, FixedOffset};
use regex::Regex;

/// Suffixes removed from a bracketed organization name.
const ORGANIZATION_HONORIFICS: &[&str] = &["様", "御中", "さま"];

/// Pure text enrichers compiled once for a set of trigger phrases.
#[derive(Debug, Clone)]
pub struct ContextEnricher {
    organization: Regex,
    vendor: Vec<Regex>,
    offset: FixedOffset,
}

impl ContextEnricher {
    /// `trigger_phrases` anchor the vendor pattern (`<vendor>より…<phrase>`).
    pub fn new(trigger_phrases: &[String], offset: FixedOffset) -> Self {
        let vendor = trigger_phrases
            .iter()
            .filter(|p| !p.is_empty())
            .map(|phrase| {
                // Escaped phrase inside a fixed template; always valid.
                Regex::new(&format!(
                    r"([^\s【】]+?)[ \t\x{{3000}}]*より[^\n]*?{}",
                    regex::escape(phrase)
                ))
                .unwrap()
            })
            .collect();
        Self {
            organization: Regex::new(r"【([^】]*)】").unwrap(),
            vendor,
            offset,
        }
    }

    /// Name inside the first `【…】`, honorific removed; `""` if none.
    pub fn organization(&self, text: &str) -> String {
        let Some(inner) = self
            .organization
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
        else {
            return String::new();
        };
        let mut name = inner;
        for suffix in ORGANIZATION_HONORIFICS {
            if let Some(stripped) = name.strip_suffix(suffix) {
                name = stripped.trim_end();
                break;
            }
        }
        name.to_string()
    }

    /// Text immediately before `より` on the trigger line; `None` if the
    /// lightweight pattern does not match.
    pub fn vendor(&self, text: &str) -> Option<String> {
        self.vendor.iter().find_map(|re| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }

    /// `YYYY-MM-DD` in the configured offset; `""` for a missing or
    /// out-of-range timestamp.
    pub fn submission_date(&self, timestamp: Option<f64>) -> String {
        format_submission_date(timestamp, self.offset)
    }
}

/// Convert epoch seconds to a calendar date in `offset`.
pub fn format_submission_date(timestamp: Option<f64>, offset: FixedOffset) -> String {
    let Some(ts) = timestamp.filter(|t| t.is_finite()) else {
        return String::new();
    };
    let secs = ts.floor();
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return String::new();
    }
    DateTime::from_timestamp(secs as i64, 0)
        .map(|utc| utc.with_timezone(&offset).format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
