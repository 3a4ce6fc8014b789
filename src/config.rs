//! アプリケーション設定
//!
//! 読み込み順（後勝ち）:
//! 1. `appsettings.json`
//! 2. `appsettings.{NL2SQL_ENVIRONMENT}.json`
//! 3. 同名の環境変数（`.env` は起動時に dotenvy で読み込み済み）
//!
//! どの層も省略可能。キーが見つからない場合は空文字列になり、
//! 検証はクライアント構築時に行う。

use crate::error::AssistantError;
use crate::prompt::SystemPrompt;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const KEY_ENDPOINT: &str = "OpenAIEndpoint";
pub const KEY_API_KEY: &str = "OpenAIKey";
pub const KEY_EMBEDDING_DEPLOYMENT: &str = "OpenAIEmbeddingDeployment";
pub const KEY_COMPLETION_DEPLOYMENT: &str = "OpenAIcompletionsDeployment";
pub const KEY_MAX_TOKEN: &str = "OpenAIMaxToken";
pub const KEY_API_VERSION: &str = "OpenAIApiVersion";
pub const KEY_SYSTEM_PROMPT_FILE: &str = "SystemPromptFile";

/// 環境名（`appsettings.{env}.json` の選択）を指定する環境変数
pub const ENVIRONMENT_VAR: &str = "NL2SQL_ENVIRONMENT";

const ALL_KEYS: [&str; 7] = [
    KEY_ENDPOINT,
    KEY_API_KEY,
    KEY_EMBEDDING_DEPLOYMENT,
    KEY_COMPLETION_DEPLOYMENT,
    KEY_MAX_TOKEN,
    KEY_API_VERSION,
    KEY_SYSTEM_PROMPT_FILE,
];

/// `OpenAIMaxToken` が解釈できない場合の既定値
pub const DEFAULT_MAX_TOKENS: u32 = 8191;

/// Azure OpenAI REST API のバージョン既定値
pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";

/// 最大トークン数文字列を解釈する。正の整数でなければ 8191。
pub fn parse_max_tokens(raw: &str) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => DEFAULT_MAX_TOKENS,
    }
}

/// 接続層に渡す指数バックオフ設定
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 各リトライ前の待ち時間（ジッターなし）
    pub fn delay_schedule(&self) -> Vec<Duration> {
        let mut delays = Vec::with_capacity(self.max_retries as usize);
        let mut current = self.initial_delay;
        for _ in 0..self.max_retries {
            let capped = current.min(self.max_delay);
            delays.push(capped);
            current = capped.mul_f64(self.multiplier);
        }
        delays
    }

    /// リトライ全体に許す経過時間
    pub fn total_budget(&self) -> Duration {
        self.delay_schedule().iter().sum()
    }

    /// backoff クレートは回数ではなく経過時間で打ち切るため、
    /// 待ち時間の合計を上限にして回数を近似する。
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_delay)
            .with_randomization_factor(0.2)
            .with_max_elapsed_time(Some(self.total_budget()))
            .build()
    }
}

/// OpenAI / Azure OpenAI 接続設定
#[derive(Clone)]
pub struct OpenAISettings {
    pub endpoint: String,
    pub api_key: String,
    pub embedding_deployment: String,
    pub completion_deployment: String,
    pub max_tokens: u32,
    pub api_version: String,
    pub system_prompt: SystemPrompt,
    pub retry: RetryPolicy,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            embedding_deployment: String::new(),
            completion_deployment: String::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: DEFAULT_API_VERSION.to_string(),
            system_prompt: SystemPrompt::default(),
            retry: RetryPolicy::default(),
        }
    }
}

// APIキーをログに出さない
impl fmt::Debug for OpenAISettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAISettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &if self.api_key.is_empty() { "(empty)" } else { "***" })
            .field("embedding_deployment", &self.embedding_deployment)
            .field("completion_deployment", &self.completion_deployment)
            .field("max_tokens", &self.max_tokens)
            .field("api_version", &self.api_version)
            .field("system_prompt", &self.system_prompt)
            .field("retry", &self.retry)
            .finish()
    }
}

impl OpenAISettings {
    /// カレントディレクトリとプロセス環境変数から読み込む
    pub fn load() -> Result<Self, AssistantError> {
        let environment = std::env::var(ENVIRONMENT_VAR).ok();
        Self::load_from(Path::new("."), environment.as_deref(), |k| std::env::var(k).ok())
    }

    /// 任意のディレクトリ・環境変数参照関数から読み込む
    pub fn load_from<F>(dir: &Path, environment: Option<&str>, env: F) -> Result<Self, AssistantError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut layers = Layers::default();
        layers.merge_json_file(&dir.join("appsettings.json"))?;
        if let Some(name) = environment.filter(|n| !n.trim().is_empty()) {
            layers.merge_json_file(&dir.join(format!("appsettings.{name}.json")))?;
        }
        for key in ALL_KEYS {
            if let Some(value) = env(key) {
                debug!(target: "config", key, "environment override");
                layers.set(key, value);
            }
        }

        let system_prompt = match layers.get(KEY_SYSTEM_PROMPT_FILE).filter(|p| !p.is_empty()) {
            Some(p) => {
                let path = PathBuf::from(p);
                let path = if path.is_relative() { dir.join(path) } else { path };
                SystemPrompt::from_file(&path)?
            }
            None => SystemPrompt::default(),
        };

        let settings = Self {
            endpoint: layers.get_or_empty(KEY_ENDPOINT),
            api_key: layers.get_or_empty(KEY_API_KEY),
            embedding_deployment: layers.get_or_empty(KEY_EMBEDDING_DEPLOYMENT),
            completion_deployment: layers.get_or_empty(KEY_COMPLETION_DEPLOYMENT),
            max_tokens: parse_max_tokens(&layers.get_or_empty(KEY_MAX_TOKEN)),
            api_version: layers
                .get(KEY_API_VERSION)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            system_prompt,
            retry: RetryPolicy::default(),
        };
        info!(target: "config", settings = ?settings, "settings loaded");
        Ok(settings)
    }
}

/// 大文字小文字を区別しないキー → 値 のマップ
#[derive(Debug, Default)]
struct Layers {
    values: HashMap<String, String>,
}

impl Layers {
    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_ascii_lowercase(), value);
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// JSON ファイルのトップレベルのスカラー値を取り込む。ファイルが無ければ何もしない。
    fn merge_json_file(&mut self, path: &Path) -> Result<(), AssistantError> {
        if !path.exists() {
            debug!(target: "config", path = %path.display(), "settings file not found; skipped");
            return Ok(());
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let root: Value = serde_json::from_str(&text).map_err(|e| {
            AssistantError::configuration(format!("malformed JSON in {}: {e}", path.display()))
        })?;
        let Value::Object(map) = root else {
            return Err(AssistantError::configuration(format!(
                "{} must contain a JSON object",
                path.display()
            )));
        };
        for (key, value) in map {
            match value {
                Value::String(s) => self.set(&key, s),
                Value::Number(n) => self.set(&key, n.to_string()),
                Value::Bool(b) => self.set(&key, b.to_string()),
                _ => debug!(target: "config", key = %key, "non-scalar value ignored"),
            }
        }
        info!(target: "config", path = %path.display(), "settings file merged");
        Ok(())
    }
}
