use crate::error::AssistantError;
use crate::prompt::SystemPrompt;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, CreateEmbeddingRequest,
    CreateEmbeddingRequestArgs, CreateEmbeddingResponse,
};
use std::fmt::{self, Display};
use tracing::debug;

/// サンプリング温度
pub const TEMPERATURE: f32 = 0.5;
/// nucleus sampling (top_p)
pub const TOP_P: f32 = 0.95;
pub const FREQUENCY_PENALTY: f32 = 0.0;
pub const PRESENCE_PENALTY: f32 = 0.0;

/// 1回の問い合わせ結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Display for ChatReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChatReply(len={}, prompt_tokens={}, completion_tokens={})",
            self.text.len(),
            self.prompt_tokens,
            self.completion_tokens
        )
    }
}

/// system → user の2メッセージだけを持つリクエストを組み立てる
///
/// `user_prompt` は加工せずにそのまま送る。
pub fn build_chat_request(
    deployment: &str,
    max_tokens: u32,
    system_prompt: &SystemPrompt,
    user_prompt: &str,
) -> Result<CreateChatCompletionRequest, AssistantError> {
    let system = ChatCompletionRequestSystemMessageArgs::default()
        .content(system_prompt.as_str())
        .build()
        .map_err(|e| AssistantError::configuration(format!("system message: {e}")))?;
    let user = ChatCompletionRequestUserMessageArgs::default()
        .content(user_prompt)
        .build()
        .map_err(|e| AssistantError::configuration(format!("user message: {e}")))?;
    let messages: [ChatCompletionRequestMessage; 2] = [system.into(), user.into()];

    // 旧API版の Azure デプロイは max_completion_tokens を受け付けない
    #[allow(deprecated)]
    let req = CreateChatCompletionRequestArgs::default()
        .model(deployment)
        .messages(messages)
        .max_tokens(max_tokens)
        .temperature(TEMPERATURE)
        .top_p(TOP_P)
        .frequency_penalty(FREQUENCY_PENALTY)
        .presence_penalty(PRESENCE_PENALTY)
        .build()
        .map_err(|e| AssistantError::configuration(format!("chat request: {e}")))?;
    debug!(target: "openai", model = %deployment, max_tokens, "chat request built");
    Ok(req)
}

/// 単一入力の埋め込みリクエスト
pub fn build_embedding_request(
    deployment: &str,
    input: &str,
) -> Result<CreateEmbeddingRequest, AssistantError> {
    CreateEmbeddingRequestArgs::default()
        .model(deployment)
        .input(input)
        .build()
        .map_err(|e| AssistantError::configuration(format!("embedding request: {e}")))
}

/// 最初の choice の本文と使用トークン数を取り出す
pub fn extract_reply(resp: CreateChatCompletionResponse) -> Result<ChatReply, AssistantError> {
    let (prompt_tokens, completion_tokens) = resp
        .usage
        .as_ref()
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AssistantError::unknown("response contained no choices"))?;
    Ok(ChatReply {
        text: choice.message.content.unwrap_or_default(),
        prompt_tokens,
        completion_tokens,
    })
}

/// 最初の埋め込みベクトルを取り出す
pub fn extract_embedding(resp: CreateEmbeddingResponse) -> Result<Vec<f32>, AssistantError> {
    resp.data
        .into_iter()
        .next()
        .map(|e| e.embedding)
        .ok_or_else(|| AssistantError::unknown("response contained no embeddings"))
}
