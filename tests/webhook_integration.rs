//! Integration tests for the Slack webhook.
//!
//! Each test builds the real router over an in-memory sheet store and drives
//! it with `tower::ServiceExt::oneshot`, so no sockets are opened.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use chrono::FixedOffset;
use serde_json::{Value, json};
use tokio::time::timeout;
use tower::ServiceExt;

use applicant_sync::channels::slack_routes;
use applicant_sync::error::{ChannelError, LlmError};
use applicant_sync::extract::{ContextEnricher, ModelExtractor, PatternExtractor};
use applicant_sync::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use applicant_sync::pipeline::{
    ApplicationProcessor, ChannelAdapter, InboundMessage, ProcessorDeps, TriggerGate,
};
use applicant_sync::sheets::{MemorySheetStore, SheetRouter};

/// Maximum time any test waits for the spawned pipeline task.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const BODY_LIMIT: usize = 64 * 1024;

const NOTIFICATION: &str = "【さくら歯科様】\n\
    ジョブメドレーより歯科衛生士の応募がございました。\n\
    ・氏名：佐藤 美咲（さとう みさき）様\n\
    ・会員番号：12345678\n\
    ・年齢：29歳\n";

/// Stub LLM provider (no real API calls). Always unavailable, so the
/// pipeline runs on pattern extraction alone.
struct OfflineLlm;

#[async_trait]
impl LlmProvider for OfflineLlm {
    fn model_name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "offline".into(),
            reason: "no network in tests".into(),
        })
    }
}

/// Collects replies instead of posting them.
#[derive(Default)]
struct CapturedReplies {
    replies: Mutex<Vec<(Option<String>, String)>>,
}

#[async_trait]
impl ChannelAdapter for CapturedReplies {
    fn name(&self) -> &str {
        "captured"
    }

    async fn send_reply(&self, original: &InboundMessage, reply: &str) -> Result<(), ChannelError> {
        self.replies
            .lock()
            .unwrap()
            .push((original.thread_anchor.clone(), reply.to_string()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemorySheetStore>,
    replies: Arc<CapturedReplies>,
}

fn build_app() -> TestApp {
    let phrases = vec!["の応募がございました".to_string()];
    let store = Arc::new(MemorySheetStore::new());
    let replies = Arc::new(CapturedReplies::default());
    let processor = Arc::new(ApplicationProcessor::new(ProcessorDeps {
        gate: TriggerGate::new(phrases.clone(), 64),
        patterns: PatternExtractor::new(),
        model: ModelExtractor::new(Arc::new(OfflineLlm), Duration::from_millis(1)),
        enricher: ContextEnricher::new(&phrases, FixedOffset::east_opt(9 * 3600).unwrap()),
        router: SheetRouter::new(store.clone()),
        replies: replies.clone(),
    }));
    TestApp {
        router: slack_routes(processor),
        store,
        replies,
    }
}

fn post_event(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/slack/events")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn message_event(channel: &str, text: &str, ts: &str) -> Value {
    json!({
        "type": "event_callback",
        "team_id": "T1",
        "event": {
            "type": "message",
            "channel": channel,
            "text": text,
            "ts": ts
        }
    })
}

/// Poll until the partition has `rows` rows or the timeout elapses.
async fn wait_for_rows(store: &MemorySheetStore, partition: &str, rows: usize) -> Vec<Vec<String>> {
    timeout(TEST_TIMEOUT, async {
        loop {
            if let Some(found) = store.rows(partition).await
                && found.len() >= rows
            {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for rows")
}

#[tokio::test]
async fn url_verification_echoes_challenge() {
    let app = build_app();
    let resp = app
        .router
        .oneshot(post_event(json!({
            "type": "url_verification",
            "token": "legacy",
            "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        v["challenge"],
        "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
    );
}

#[tokio::test]
async fn health_check_returns_ok() {
    let app = build_app();
    let resp = app
        .router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn notification_is_written_to_channel_partition() {
    let app = build_app();
    let resp = app
        .router
        .oneshot(post_event(message_event("C0123", NOTIFICATION, "1704123000.000100")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let rows = wait_for_rows(&app.store, "C0123", 3).await;
    assert_eq!(rows[0][0], "=COUNTA(D3:D)");
    assert_eq!(rows[1][0], "応募日");
    let row = &rows[2];
    assert_eq!(row[0], "2024-01-02");
    assert_eq!(row[1], "さくら歯科");
    assert_eq!(row[2], "ジョブメドレー");
    assert_eq!(row[3], "C0123");
    assert_eq!(row[4], "佐藤 美咲");
    assert_eq!(row[5], "12345678");
    assert_eq!(row[6], "29");

    // The acknowledgment is sent after the append; give it a moment.
    timeout(TEST_TIMEOUT, async {
        while app.replies.replies.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no acknowledgment");
    let replies = app.replies.replies.lock().unwrap();
    assert_eq!(replies[0].0.as_deref(), Some("1704123000.000100"));
}

#[tokio::test]
async fn redelivered_event_is_written_once() {
    let app = build_app();
    let event = message_event("C0123", NOTIFICATION, "1704123000.000100");
    for _ in 0..2 {
        let resp = app
            .router
            .clone()
            .oneshot(post_event(event.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    wait_for_rows(&app.store, "C0123", 3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(app.store.rows("C0123").await.unwrap().len(), 3);
}

#[tokio::test]
async fn message_without_applicant_writes_nothing() {
    let app = build_app();
    let resp = app
        .router
        .oneshot(post_event(message_event(
            "C0123",
            "ジョブメドレーより歯科医師の応募がございました。",
            "1704123001.000100",
        )))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(app.store.partition_names().await.is_empty());
    assert!(app.replies.replies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unrelated_chatter_is_ignored() {
    let app = build_app();
    let resp = app
        .router
        .oneshot(post_event(message_event("C0123", "・氏名：佐藤 美咲", "1.0")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(app.store.partition_names().await.is_empty());
}
