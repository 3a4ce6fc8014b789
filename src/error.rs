//! アシスタント呼び出しのエラー分類
//!
//! 呼び出し側が「再試行するか / 中断するか」を判断できるように、
//! async-openai のエラーを 4 種類の `ErrorKind` に振り分ける。

use async_openai::error::OpenAIError;
use std::fmt;
use thiserror::Error;

/// エラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// ネットワーク断・タイムアウト・レート制限・サーバーエラー（リトライ後も失敗）
    Transient,
    /// APIキー不正・アクセス拒否
    Authentication,
    /// 設定不足・設定ファイル不正・リクエスト構築失敗
    Configuration,
    /// 上記以外（応答の形式不正を含む）
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Authentication => write!(f, "authentication"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// アシスタント層の共通エラー
///
/// `Display` は元のエラーメッセージをそのまま返す（種類は `kind()` で取得）。
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AssistantError {
    kind: ErrorKind,
    message: String,
}

impl AssistantError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 呼び出し側で再試行する価値があるか
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl From<OpenAIError> for AssistantError {
    fn from(err: OpenAIError) -> Self {
        let kind = match &err {
            OpenAIError::Reqwest(e) => classify_reqwest_error(e),
            OpenAIError::ApiError(api) => {
                classify_api_error(api.r#type.as_deref(), api.code.is_some(), &api.message)
            }
            OpenAIError::InvalidArgument(_) => ErrorKind::Configuration,
            _ => ErrorKind::Unknown,
        };
        Self::new(kind, err.to_string())
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> ErrorKind {
    if let Some(status) = err.status() {
        return classify_status(status.as_u16());
    }
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ErrorKind::Transient
    } else {
        ErrorKind::Unknown
    }
}

pub(crate) fn classify_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Authentication,
        408 | 429 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Unknown,
    }
}

/// API が返したエラー本文（type / code / message）から種類を推定する
///
/// OpenAI と Azure でエラー本文の形が違うため、キーワードで判定する。
/// type も code も無いものは async-openai が 5xx の生の本文から作ったエラー。
pub(crate) fn classify_api_error(error_type: Option<&str>, has_code: bool, message: &str) -> ErrorKind {
    let bare_body = error_type.is_none() && !has_code;
    let message = message.to_lowercase();
    let error_type = error_type.unwrap_or_default().to_lowercase();

    // クォータ切れはレート制限と似た文言だが再試行しても回復しない
    if error_type == "insufficient_quota" || message.contains("quota") {
        return ErrorKind::Unknown;
    }

    const AUTH_HINTS: [&str; 5] = [
        "api key",
        "access denied",
        "unauthorized",
        "authentication",
        "permission",
    ];
    if error_type == "authentication_error" || AUTH_HINTS.iter().any(|h| message.contains(h)) {
        return ErrorKind::Authentication;
    }

    const TRANSIENT_HINTS: [&str; 4] = ["rate limit", "overloaded", "timed out", "temporarily"];
    if bare_body || error_type == "server_error" || TRANSIENT_HINTS.iter().any(|h| message.contains(h)) {
        return ErrorKind::Transient;
    }

    if message.contains("deployment") && message.contains("not exist") {
        return ErrorKind::Configuration;
    }

    ErrorKind::Unknown
}
