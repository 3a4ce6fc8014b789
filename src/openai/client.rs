//! 接続層: OpenAI / Azure OpenAI クライアントの構築と呼び出し

use crate::config::{OpenAISettings, RetryPolicy};
use crate::error::AssistantError;
use async_openai::Client;
use async_openai::config::{AzureConfig, OpenAIConfig};
use async_openai::types::{
    CreateChatCompletionRequest, CreateChatCompletionResponse, CreateEmbeddingRequest,
    CreateEmbeddingResponse,
};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use reqwest::Url;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// 公開版 OpenAI のホスト名。これを含むエンドポイントはキーのみで認証する。
pub const OPENAI_PUBLIC_HOST: &str = "api.openai.com";

/// エンドポイント文字列から決まる接続先の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// api.openai.com（APIキーのみ）
    OpenAI,
    /// 任意URL + キー認証（Azure OpenAI）
    Azure,
}

impl EndpointKind {
    pub fn detect(endpoint: &str) -> Self {
        if endpoint.contains(OPENAI_PUBLIC_HOST) {
            EndpointKind::OpenAI
        } else {
            EndpointKind::Azure
        }
    }
}

/// アシスタントサービスが必要とするリモート呼び出し
///
/// テストではこのトレイトのモックを差し込む。
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, AssistantError>;

    async fn embed(
        &self,
        request: CreateEmbeddingRequest,
    ) -> Result<CreateEmbeddingResponse, AssistantError>;
}

/// async-openai クライアントのラッパー
///
/// Azure はデプロイ名がURLに入るため、チャット用と埋め込み用で別クライアントを持つ。
/// リトライは async-openai 内部ではなく `retry_transient` で行う
/// （内部のリトライは 429 / 5xx だけで、接続エラーは再試行されないため）。
#[derive(Clone)]
pub struct CompletionClient {
    inner: Endpoint,
    retry: RetryPolicy,
}

#[derive(Clone)]
enum Endpoint {
    OpenAI(Client<OpenAIConfig>),
    Azure {
        chat: Client<AzureConfig>,
        embeddings: Client<AzureConfig>,
    },
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompletionClient::{:?}", self.kind())
    }
}

/// async-openai 内部の再試行を無効にする（1回で結果を返させる）
fn single_attempt() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

impl CompletionClient {
    /// 設定からクライアントを構築する。設定不足はその場でエラーにする。
    #[instrument(name = "connect", skip(settings), fields(endpoint = %settings.endpoint))]
    pub fn connect(settings: &OpenAISettings) -> Result<Self, AssistantError> {
        if settings.api_key.trim().is_empty() {
            return Err(AssistantError::configuration("OpenAIKey is not configured"));
        }

        let inner = match EndpointKind::detect(&settings.endpoint) {
            EndpointKind::OpenAI => {
                let config = OpenAIConfig::new().with_api_key(settings.api_key.as_str());
                info!(target: "openai", "connected to public OpenAI endpoint");
                Endpoint::OpenAI(Client::with_config(config).with_backoff(single_attempt()))
            }
            EndpointKind::Azure => {
                let endpoint = settings.endpoint.trim();
                if endpoint.is_empty() {
                    return Err(AssistantError::configuration("OpenAIEndpoint is not configured"));
                }
                Url::parse(endpoint).map_err(|e| {
                    AssistantError::configuration(format!("invalid OpenAIEndpoint '{endpoint}': {e}"))
                })?;
                let azure = |deployment: &str| {
                    let config = AzureConfig::new()
                        .with_api_base(endpoint.trim_end_matches('/'))
                        .with_api_key(settings.api_key.as_str())
                        .with_api_version(settings.api_version.as_str())
                        .with_deployment_id(deployment);
                    Client::with_config(config).with_backoff(single_attempt())
                };
                info!(
                    target: "openai",
                    completion_deployment = %settings.completion_deployment,
                    embedding_deployment = %settings.embedding_deployment,
                    "connected to Azure OpenAI endpoint"
                );
                Endpoint::Azure {
                    chat: azure(&settings.completion_deployment),
                    embeddings: azure(&settings.embedding_deployment),
                }
            }
        };
        Ok(CompletionClient {
            inner,
            retry: settings.retry.clone(),
        })
    }

    pub fn kind(&self) -> EndpointKind {
        match self.inner {
            Endpoint::OpenAI(_) => EndpointKind::OpenAI,
            Endpoint::Azure { .. } => EndpointKind::Azure,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

/// `Transient` に分類された失敗だけを `policy` に従って再試行する
///
/// それ以外の種類は最初の失敗をそのまま返す。
pub(crate) async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, AssistantError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AssistantError>>,
{
    backoff::future::retry_notify(
        policy.to_backoff(),
        || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_retryable() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |e: AssistantError, wait: Duration| {
            warn!(target: "openai", wait_ms = wait.as_millis() as u64, "transient failure, retrying: {e}");
        },
    )
    .await
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, AssistantError> {
        retry_transient(&self.retry, || {
            let request = request.clone();
            async move {
                let resp = match &self.inner {
                    Endpoint::OpenAI(c) => c.chat().create(request).await,
                    Endpoint::Azure { chat, .. } => chat.chat().create(request).await,
                };
                resp.map_err(AssistantError::from)
            }
        })
        .await
    }

    async fn embed(
        &self,
        request: CreateEmbeddingRequest,
    ) -> Result<CreateEmbeddingResponse, AssistantError> {
        retry_transient(&self.retry, || {
            let request = request.clone();
            async move {
                let resp = match &self.inner {
                    Endpoint::OpenAI(c) => c.embeddings().create(request).await,
                    Endpoint::Azure { embeddings, .. } => embeddings.embeddings().create(request).await,
                };
                resp.map_err(AssistantError::from)
            }
        })
        .await
    }
}
