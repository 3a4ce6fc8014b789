#![allow(dead_code)]

use async_openai::types::{
    CreateChatCompletionRequest, CreateChatCompletionResponse, CreateEmbeddingRequest,
    CreateEmbeddingResponse,
};
use async_trait::async_trait;
use nl2sql::openai::CompletionBackend;
use nl2sql::{AssistantError, AssistantService, ErrorKind, OpenAISettings};
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static START: Once = Once::new();
static _GUARD: Lazy<Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(None));

/// Initialize test environment: dotenv and tracing (stderr + file).
/// Idempotent: safe to call multiple times.
pub fn init() {
    START.call_once(|| {
        let _ = dotenvy::dotenv();
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .expect("env filter");

        // Daily rotating log file separate from app runtime logs
        let file_appender = rolling::daily("logs", "tests.log");
        let (file_nb, guard) = tracing_appender::non_blocking(file_appender);
        *_GUARD.lock().unwrap() = Some(guard);

        let stderr_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_writer(std::io::stderr);

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_writer(file_nb);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();

        tracing::info!(target: "test_init", "Test tracing initialized (stderr + rotating file)");
    });
}

/// Backend that answers every question with a fixed SQL text, or fails with a transient error.
/// Clones share the call counter. `connect_delay` slows down client construction.
#[derive(Clone, Default)]
pub struct CannedBackend {
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
    pub connect_delay: Option<Duration>,
}

#[async_trait]
impl CompletionBackend for CannedBackend {
    async fn complete(
        &self,
        _request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, AssistantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AssistantError::new(ErrorKind::Transient, "error sending request: operation timed out"));
        }
        let body = json!({
            "id": "chatcmpl-canned",
            "object": "chat.completion",
            "created": 1_700_000_000u32,
            "model": "gpt-35-turbo",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "SELECT COUNT(*) FROM customer WHERE state = 'CA';" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 250, "completion_tokens": 14, "total_tokens": 264 }
        });
        Ok(serde_json::from_value(body).expect("valid canned response"))
    }

    async fn embed(
        &self,
        _request: CreateEmbeddingRequest,
    ) -> Result<CreateEmbeddingResponse, AssistantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AssistantError::unknown("embeddings are not canned"))
    }
}

/// Service wired to a `CannedBackend`, plus a counter of client constructions.
pub fn canned_service(
    backend: CannedBackend,
) -> (Arc<AssistantService<CannedBackend>>, Arc<AtomicUsize>) {
    let constructions = Arc::new(AtomicUsize::new(0));
    let counter = constructions.clone();
    let settings = OpenAISettings {
        completion_deployment: "gpt-35-turbo".into(),
        ..Default::default()
    };
    let service = AssistantService::with_connector(settings, move |_| {
        if let Some(delay) = backend.connect_delay {
            std::thread::sleep(delay);
        }
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(backend.clone())
    });
    (Arc::new(service), constructions)
}
