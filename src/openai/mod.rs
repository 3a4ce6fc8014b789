//! OpenAI / Azure OpenAI 連携のモジュール

pub mod client;
pub mod request;
pub mod service;
pub mod worker;

// 代表的な公開APIを再エクスポート
pub use client::{CompletionBackend, CompletionClient, EndpointKind};
pub use request::{ChatReply, build_chat_request, build_embedding_request};
pub use service::AssistantService;
pub use worker::{AssistantWorker, WorkerMessage, start_assistant_worker};
