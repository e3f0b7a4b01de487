//! Model-assisted field extractor.
//!
//! Sends the message to the text-understanding service with a prompt that
//! enumerates every schema field. A failed attempt (transport or parse) is
//! retried once after a fixed delay; a second failure degrades to an empty
//! record. Nothing here ever returns an error to the pipeline.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, LlmError};
use crate::extract::normalize::flatten_value;
use crate::extract::schema::{ExtractedRecord, SchemaField};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Attempts per extraction (first try + one retry).
const MAX_ATTEMPTS: u32 = 2;

/// Max tokens for the extraction call.
const EXTRACTION_MAX_TOKENS: u32 = 1024;

/// Max tokens for the single-field vendor lookup.
const VENDOR_MAX_TOKENS: u32 = 64;

/// Temperature for extraction (deterministic).
const EXTRACTION_TEMPERATURE: f32 = 0.0;

/// Message content is truncated to this many characters before sending.
const MAX_INPUT_CHARS: usize = 4000;

/// Result of a model-assisted extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelExtraction {
    /// The service answered with a usable object.
    Extracted(ExtractedRecord),
    /// Every attempt failed; carries the last failure.
    Degraded(ExtractionError),
}

impl ModelExtraction {
    /// The extracted record, or an all-empty one when degraded.
    pub fn into_record(self) -> ExtractedRecord {
        match self {
            Self::Extracted(record) => record,
            Self::Degraded(_) => ExtractedRecord::empty(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Extractor backed by an `LlmProvider`.
pub struct ModelExtractor {
    llm: Arc<dyn LlmProvider>,
    retry_delay: Duration,
}

impl ModelExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, retry_delay: Duration) -> Self {
        Self { llm, retry_delay }
    }

    /// Extract every schema field from `text`.
    pub async fn extract(&self, text: &str) -> ModelExtraction {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extraction_system_prompt()),
            ChatMessage::user(truncate(text)),
        ])
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);

        match self.with_retry(request, parse_extraction_response).await {
            Ok(record) => {
                info!(
                    model = self.llm.model_name(),
                    filled = record.iter().filter(|(_, v)| !v.is_empty()).count(),
                    "Model extraction succeeded"
                );
                ModelExtraction::Extracted(record)
            }
            Err(ExtractionError::Disabled) => {
                debug!("No extraction service configured; using pattern values only");
                ModelExtraction::Degraded(ExtractionError::Disabled)
            }
            Err(e) => {
                warn!(
                    model = self.llm.model_name(),
                    error = %e,
                    "Model extraction degraded to pattern-only"
                );
                ModelExtraction::Degraded(e)
            }
        }
    }

    /// Ask the service for the vendor/source name only. Empty on any failure.
    pub async fn extract_vendor(&self, text: &str) -> String {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_vendor_system_prompt()),
            ChatMessage::user(truncate(text)),
        ])
        .with_temperature(EXTRACTION_TEMPERATURE)
        .with_max_tokens(VENDOR_MAX_TOKENS);

        match self.with_retry(request, parse_vendor_response).await {
            Ok(vendor) => vendor,
            Err(e) => {
                debug!(error = %e, "Vendor lookup failed; leaving empty");
                String::new()
            }
        }
    }

    /// Run `request`, parse with `parse`, retry once on either failure.
    /// A disabled service fails at once.
    async fn with_retry<T>(
        &self,
        request: CompletionRequest,
        parse: fn(&str) -> Result<T, ExtractionError>,
    ) -> Result<T, ExtractionError> {
        let mut last_err = ExtractionError::ServiceUnavailable("no attempt made".into());
        for attempt in 1..=MAX_ATTEMPTS {
            let outcome = match self.llm.complete(request.clone()).await {
                Ok(response) => parse(&response.content),
                Err(LlmError::Disabled { .. }) => return Err(ExtractionError::Disabled),
                Err(e) => Err(ExtractionError::ServiceUnavailable(e.to_string())),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(attempt, error = %e, "Extraction attempt failed");
                    last_err = e;
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(last_err)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the extraction system prompt from the schema.
pub fn build_extraction_system_prompt() -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(
        "You extract applicant details from a Japanese job-application notification.\n\n\
         Respond with ONLY a JSON object with exactly these keys:\n",
    );
    for field in SchemaField::ALL {
        prompt.push_str(&format!(
            "- \"{}\" (label「{}」): {}\n",
            field.key(),
            field.line_label(),
            field.description()
        ));
    }
    prompt.push_str(
        "\nRules:\n\
         - Every value is a string. Use \"\" when the message does not say.\n\
         - Never return numbers, arrays or nested objects; join multiple items into one string.\n\
         - Keep parenthetical content verbatim unless a field rule says to drop it.\n\
         - Do not invent values.",
    );
    prompt
}

fn build_vendor_system_prompt() -> String {
    "The message is a job-application notification forwarded from a job board. \
     Reply with ONLY the name of the job board or vendor that sent it, or an empty line if unknown."
        .to_string()
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_INPUT_CHARS).collect()
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse the service's JSON object into a record.
///
/// Unknown keys are ignored, missing keys stay empty, compound values are
/// flattened to a single string.
pub fn parse_extraction_response(raw: &str) -> Result<ExtractedRecord, ExtractionError> {
    let json_str = extract_json_object(raw);
    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| ExtractionError::MalformedResponse(format!("JSON parse error: {e}")))?;
    let object: Map<String, Value> = match value {
        Value::Object(map) => map,
        other => {
            return Err(ExtractionError::MalformedResponse(format!(
                "expected object, got {}",
                type_name(&other)
            )));
        }
    };

    Ok(ExtractedRecord::from_fn(|field| {
        object.get(field.key()).map(flatten_value).unwrap_or_default()
    }))
}

fn parse_vendor_response(raw: &str) -> Result<String, ExtractionError> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let cleaned = line.trim_matches(|c| c == '"' || c == '「' || c == '」' || c == '`');
    if cleaned.chars().count() > 40 {
        return Err(ExtractionError::MalformedResponse(
            "vendor answer is not a short name".into(),
        ));
    }
    Ok(cleaned.trim().to_string())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::provider::{CompletionResponse, DisabledProvider};

    /// Replays scripted responses in order; errors once the script runs out.
    struct ScriptedLlm {
        script: Mutex<Vec<Result<String, LlmError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedLlm {
        fn new(mut script: Vec<Result<String, LlmError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop();
            match next {
                Some(Ok(content)) => Ok(CompletionResponse { content }),
                Some(Err(e)) => Err(e),
                None => Err(LlmError::RequestFailed {
                    provider: "scripted".into(),
                    reason: "script exhausted".into(),
                }),
            }
        }
    }

    fn transport_error() -> LlmError {
        LlmError::RequestFailed {
            provider: "scripted".into(),
            reason: "timeout".into(),
        }
    }

    fn extractor(llm: Arc<ScriptedLlm>) -> ModelExtractor {
        ModelExtractor::new(llm, Duration::from_millis(1))
    }

    #[test]
    fn system_prompt_lists_every_field() {
        let prompt = build_extraction_system_prompt();
        for field in SchemaField::ALL {
            assert!(prompt.contains(field.key()), "missing {}", field.key());
        }
        assert!(prompt.contains("ONLY a JSON object"));
    }

    #[test]
    fn parse_fills_known_keys_and_defaults_rest() {
        let raw = r#"{"name": "山田 太郎", "age": 32, "cert": ["歯科衛生士", "保育士"], "extra": "x"}"#;
        let record = parse_extraction_response(raw).unwrap();
        assert_eq!(record.get(SchemaField::Name), "山田 太郎");
        assert_eq!(record.get(SchemaField::Age), "32");
        assert_eq!(
            record.get(SchemaField::Certifications),
            r#"["歯科衛生士","保育士"]"#
        );
        assert_eq!(record.get(SchemaField::Education), "");
    }

    #[test]
    fn parse_handles_markdown_wrapping() {
        let raw = "```json\n{\"member_id\": \"123\"}\n```";
        let record = parse_extraction_response(raw).unwrap();
        assert_eq!(record.get(SchemaField::MemberId), "123");
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(matches!(
            parse_extraction_response("[1, 2]"),
            Err(ExtractionError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_extraction_response("sorry, I can't"),
            Err(ExtractionError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(r#"{"name": "A"}"#.into())]));
        let out = extractor(Arc::clone(&llm)).extract("text").await;
        assert_eq!(out.into_record().get(SchemaField::Name), "A");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn retries_once_after_parse_failure() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("not json".into()),
            Ok(r#"{"member_id": "42"}"#.into()),
        ]));
        let out = extractor(Arc::clone(&llm)).extract("text").await;
        assert!(!out.is_degraded());
        assert_eq!(out.into_record().get(SchemaField::MemberId), "42");
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn degrades_after_two_transport_failures() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(transport_error()),
            Err(transport_error()),
            Ok(r#"{"name": "never reached"}"#.into()),
        ]));
        let out = extractor(Arc::clone(&llm)).extract("text").await;
        assert!(matches!(
            out,
            ModelExtraction::Degraded(ExtractionError::ServiceUnavailable(_))
        ));
        assert!(out.into_record().is_empty());
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn disabled_service_is_not_retried() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(LlmError::Disabled {
                provider: "none".into(),
            }),
            Ok(r#"{"name": "never reached"}"#.into()),
        ]));
        let out = extractor(Arc::clone(&llm)).extract("text").await;
        assert_eq!(out, ModelExtraction::Degraded(ExtractionError::Disabled));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_provider_skips_retry_delay() {
        let extractor = ModelExtractor::new(Arc::new(DisabledProvider), Duration::from_secs(60));
        let (fields, vendor) = tokio::time::timeout(Duration::from_secs(5), async {
            (
                extractor.extract("text").await,
                extractor.extract_vendor("text").await,
            )
        })
        .await
        .expect("disabled provider waited for the retry delay");
        assert!(fields.is_degraded());
        assert_eq!(vendor, "");
    }

    #[tokio::test]
    async fn vendor_lookup_trims_quotes() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("「ジョブメドレー」\n".into())]));
        assert_eq!(extractor(llm).extract_vendor("text").await, "ジョブメドレー");
    }

    #[tokio::test]
    async fn vendor_lookup_failure_is_empty() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        assert_eq!(extractor(llm).extract_vendor("text").await, "");
    }
}
