//! システムプロンプト（対象スキーマと出力ルール）

use crate::error::AssistantError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// 既定のスキーマ説明: Contoso の `customer` テーブルを T-SQL に変換させる
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an intelligent assistant for Contoso.
You are designed to convert English natural language to Transact-SQL.
The query will run on a database whose schema is represented in this string.
Don't use joins for this schema and if all columns are required give the (*) notation.

CREATE TABLE customer (
  customer_id INT PRIMARY KEY,
  first_name NVARCHAR(50),
  last_name NVARCHAR(50),
  email NVARCHAR(100),
  phone NVARCHAR(20),
  address NVARCHAR(255),
  city NVARCHAR(50),
  state NVARCHAR(50),
  zip_code NVARCHAR(10),
  created_at DATETIME DEFAULT GETDATE()
);

Instructions:
- If you're unsure of an answer, you can say \"I don't know\" or \"I'm not sure\" and recommend users search themselves.
- Your response should be complete.
- Format the content so that it can be printed to the Command Line.";

/// 全リクエストで共有される不変のシステムプロンプト
///
/// 生成後は書き換えできないため、プロセス内のどのリクエストでも同一の
/// バイト列が送信される。
#[derive(Clone, PartialEq, Eq)]
pub struct SystemPrompt(Arc<str>);

impl SystemPrompt {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// ファイルからスキーマ説明を読み込む（別スキーマで使い回す場合）
    pub fn from_file(path: &Path) -> Result<Self, AssistantError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::configuration(format!(
                "failed to read system prompt file {}: {e}",
                path.display()
            ))
        })?;
        if text.trim().is_empty() {
            return Err(AssistantError::configuration(format!(
                "system prompt file {} is empty",
                path.display()
            )));
        }
        Ok(Self::new(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl fmt::Debug for SystemPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemPrompt(len={})", self.0.len())
    }
}
