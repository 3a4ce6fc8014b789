//! AssistantService
//!
//! 接続設定とシステムプロンプトを所有し、クライアントを初回利用時に一度だけ構築する。
//! シェル（UI層）にはこのオブジェクトを `Arc` で渡す。

use super::client::{CompletionBackend, CompletionClient};
use super::request::{
    ChatReply, build_chat_request, build_embedding_request, extract_embedding, extract_reply,
};
use crate::config::OpenAISettings;
use crate::error::AssistantError;
use once_cell::sync::OnceCell;
use tracing::{error, info, instrument};

type Connector<B> = Box<dyn Fn(&OpenAISettings) -> Result<B, AssistantError> + Send + Sync>;

/// チャット補完サービス
pub struct AssistantService<B = CompletionClient> {
    settings: OpenAISettings,
    connector: Connector<B>,
    backend: OnceCell<B>,
}

impl AssistantService<CompletionClient> {
    /// 実際の OpenAI / Azure OpenAI に接続するサービス
    pub fn new(settings: OpenAISettings) -> Self {
        Self::with_connector(settings, CompletionClient::connect)
    }
}

impl<B: CompletionBackend> AssistantService<B> {
    /// 任意の接続関数でサービスを作る（テストでモックを差し込む用）
    pub fn with_connector<F>(settings: OpenAISettings, connector: F) -> Self
    where
        F: Fn(&OpenAISettings) -> Result<B, AssistantError> + Send + Sync + 'static,
    {
        Self {
            settings,
            connector: Box::new(connector),
            backend: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &OpenAISettings {
        &self.settings
    }

    /// クライアントが構築済みか
    pub fn is_connected(&self) -> bool {
        self.backend.get().is_some()
    }

    /// クライアントを構築する。構築済みなら何もしない。
    pub fn connect(&self) -> Result<(), AssistantError> {
        self.backend().map(|_| ())
    }

    /// 構築済みならそれを返し、未構築なら構築する。
    ///
    /// 構築に失敗した場合はキャッシュせずエラーを返す（次回の呼び出しで再度試みる）。
    fn backend(&self) -> Result<&B, AssistantError> {
        self.backend.get_or_try_init(|| {
            info!(target: "openai", "connecting to OpenAI service");
            (self.connector)(&self.settings).map_err(|e| {
                error!(target: "openai", kind = %e.kind(), "client construction failed: {e}");
                e
            })
        })
    }

    /// 質問を送り、回答本文とトークン使用量を返す
    #[instrument(name = "ask", skip(self, user_prompt), fields(prompt_len = user_prompt.len()))]
    pub async fn ask(&self, user_prompt: &str) -> Result<ChatReply, AssistantError> {
        let result = self.try_ask(user_prompt).await;
        match &result {
            Ok(reply) => info!(target: "openai", reply = %reply, "chat completion received"),
            Err(e) => error!(target: "openai", kind = %e.kind(), "AssistantService::ask: {e}"),
        }
        result
    }

    async fn try_ask(&self, user_prompt: &str) -> Result<ChatReply, AssistantError> {
        let backend = self.backend()?;
        let req = build_chat_request(
            &self.settings.completion_deployment,
            self.settings.max_tokens,
            &self.settings.system_prompt,
            user_prompt,
        )?;
        let resp = backend.complete(req).await?;
        extract_reply(resp)
    }

    /// 入力テキストの埋め込みベクトルを返す
    ///
    /// 対話フローからは使っていない。失敗時は `ask` と同じくエラーを返す。
    #[instrument(name = "embed", skip(self, input), fields(input_len = input.len()))]
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AssistantError> {
        let result = self.try_embed(input).await;
        match &result {
            Ok(v) => info!(target: "openai", dims = v.len(), "embedding received"),
            Err(e) => error!(target: "openai", kind = %e.kind(), "AssistantService::embed: {e}"),
        }
        result
    }

    async fn try_embed(&self, input: &str) -> Result<Vec<f32>, AssistantError> {
        let backend = self.backend()?;
        let req = build_embedding_request(&self.settings.embedding_deployment, input)?;
        extract_embedding(backend.embed(req).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::openai::request::tests::{chat_response, roles_and_texts};
    use async_openai::types::{
        CreateChatCompletionRequest, CreateChatCompletionResponse, CreateEmbeddingRequest,
        CreateEmbeddingResponse,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// 受け取ったリクエストを記録し、固定の応答 or エラーを返すモック
    #[derive(Default)]
    struct MockBackend {
        requests: Mutex<Vec<CreateChatCompletionRequest>>,
        fail_with: Option<AssistantError>,
    }

    #[async_trait]
    impl CompletionBackend for Arc<MockBackend> {
        async fn complete(
            &self,
            request: CreateChatCompletionRequest,
        ) -> Result<CreateChatCompletionResponse, AssistantError> {
            self.requests.lock().unwrap().push(request);
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(chat_response(Some("SELECT * FROM customer;"), Some((100, 7)))),
            }
        }

        async fn embed(
            &self,
            _request: CreateEmbeddingRequest,
        ) -> Result<CreateEmbeddingResponse, AssistantError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            let body = json!({
                "object": "list",
                "model": "text-embedding-ada-002",
                "data": [{ "object": "embedding", "index": 0, "embedding": [0.25, -0.5, 1.0] }],
                "usage": { "prompt_tokens": 3, "total_tokens": 3 }
            });
            Ok(serde_json::from_value(body).unwrap())
        }
    }

    fn counting_service(
        mock: Arc<MockBackend>,
    ) -> (AssistantService<Arc<MockBackend>>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let settings = OpenAISettings {
            completion_deployment: "gpt-35-turbo".into(),
            embedding_deployment: "text-embedding-ada-002".into(),
            max_tokens: 1000,
            ..Default::default()
        };
        let service = AssistantService::with_connector(settings, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(mock.clone())
        });
        (service, count)
    }

    #[tokio::test]
    async fn client_is_constructed_once() {
        let mock = Arc::new(MockBackend::default());
        let (service, count) = counting_service(mock.clone());
        assert!(!service.is_connected());
        for _ in 0..5 {
            service.ask("How many customers?").await.unwrap();
        }
        service.embed("customers").await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(service.is_connected());
        assert_eq!(mock.requests.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn system_prompt_identical_across_calls() {
        let mock = Arc::new(MockBackend::default());
        let (service, _) = counting_service(mock.clone());
        service.ask("first").await.unwrap();
        service.ask("second").await.unwrap();
        let reqs = mock.requests.lock().unwrap();
        let a = roles_and_texts(&reqs[0]);
        let b = roles_and_texts(&reqs[1]);
        assert_eq!(a[0], b[0]);
        assert_eq!(a[0].1.as_bytes(), service.settings().system_prompt.as_str().as_bytes());
        assert_eq!(a[1].1, "first");
        assert_eq!(b[1].1, "second");
    }

    #[tokio::test]
    async fn california_question_sent_verbatim() {
        let mock = Arc::new(MockBackend::default());
        let (service, _) = counting_service(mock.clone());
        let reply = service.ask("How many customers are in California?").await.unwrap();
        assert_eq!(reply.text, "SELECT * FROM customer;");
        assert_eq!((reply.prompt_tokens, reply.completion_tokens), (100, 7));

        let reqs = mock.requests.lock().unwrap();
        let msgs = roles_and_texts(&reqs[0]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1], ("user", "How many customers are in California?".to_string()));
        assert_eq!(reqs[0].model, "gpt-35-turbo");
    }

    #[tokio::test]
    async fn transient_failure_propagates_unchanged_from_both_operations() {
        let mock = Arc::new(MockBackend {
            fail_with: Some(AssistantError::new(ErrorKind::Transient, "error sending request: connection reset")),
            ..Default::default()
        });
        let (service, _) = counting_service(mock);

        let err = service.ask("q").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.to_string(), "error sending request: connection reset");

        let err = service.embed("q").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.to_string(), "error sending request: connection reset");
    }

    #[tokio::test]
    async fn construction_failure_is_reported_and_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let service: AssistantService<Arc<MockBackend>> =
            AssistantService::with_connector(OpenAISettings::default(), move |_| {
                a.fetch_add(1, Ordering::SeqCst);
                Err(AssistantError::configuration("OpenAIKey is not configured"))
            });
        let err = service.ask("q").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(service.embed("q").await.is_err());
        assert!(!service.is_connected());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn connect_builds_once_before_first_question() {
        let (service, count) = counting_service(Arc::new(MockBackend::default()));
        service.connect().unwrap();
        assert!(service.is_connected());
        service.connect().unwrap();
        service.ask("q").await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let (service, _) = counting_service(Arc::new(MockBackend::default()));
        let v = service.embed("customers in CA").await.unwrap();
        assert_eq!(v, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn real_service_reports_missing_key_without_network() {
        let service = AssistantService::new(OpenAISettings::default());
        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt.block_on(service.ask("q")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
