//! アシスタントワーカー（TUIとは別スレッドで動く）
//!
//! 専用スレッドに Tokio ランタイムを1つだけ持ち、プロセス終了まで使い回す。
//! HTTP コネクションプールが同じランタイム上に留まるようにするため。

use super::client::CompletionBackend;
use super::request::ChatReply;
use super::service::AssistantService;
use crate::error::AssistantError;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// スピナー横に出す状態メッセージ
pub const STATUS_CONNECTING: &str = "Connecting to Open AI Service..";
pub const STATUS_PROCESSING: &str =
    "Processing user prompt to generate Completion using OpenAI Service..";

/// ワーカーからシェルへの通知
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// 処理段階の変化
    Status(&'static str),
    /// 最終結果（この後チャンネルは閉じる）
    Finished(Result<ChatReply, AssistantError>),
}

struct AskJob {
    prompt: String,
    reply: Sender<WorkerMessage>,
}

/// ワーカーへの送信ハンドル。モード間で clone して持ち回る。
#[derive(Clone)]
pub struct AssistantWorker {
    tx: Sender<AskJob>,
}

impl AssistantWorker {
    /// 質問を1件投入し、その結果を受け取るチャンネルを返す
    pub fn submit(&self, prompt: impl Into<String>) -> Result<Receiver<WorkerMessage>, AssistantError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(AskJob { prompt: prompt.into(), reply })
            .map_err(|_| AssistantError::unknown("assistant worker has stopped"))?;
        Ok(rx)
    }
}

/// ワーカースレッドを開始する
pub fn start_assistant_worker<B>(service: Arc<AssistantService<B>>) -> std::io::Result<AssistantWorker>
where
    B: CompletionBackend + 'static,
{
    let rt = Builder::new_multi_thread().worker_threads(1).enable_all().build()?;
    let (tx, rx) = mpsc::channel::<AskJob>();
    std::thread::Builder::new()
        .name("assistant-worker".into())
        .spawn(move || run_jobs(rt, rx, service))?;
    Ok(AssistantWorker { tx })
}

fn run_jobs<B: CompletionBackend>(rt: Runtime, rx: Receiver<AskJob>, service: Arc<AssistantService<B>>) {
    // 1件ずつ順番に処理する（同時に飛ぶリクエストは常に1つ）
    while let Ok(job) = rx.recv() {
        info!(target: "openai", prompt_len = job.prompt.len(), "prompt_received");
        let result = connect_then_ask(&rt, &service, &job);
        // 受信側（モード）が既に破棄されていても無視
        if job.reply.send(WorkerMessage::Finished(result)).is_err() {
            debug!(target: "openai", "reply receiver dropped");
        }
    }
    info!(target: "openai", "assistant worker stopped");
}

/// 未接続なら Connecting を出して構築を終えてから Processing に進む
fn connect_then_ask<B: CompletionBackend>(
    rt: &Runtime,
    service: &AssistantService<B>,
    job: &AskJob,
) -> Result<ChatReply, AssistantError> {
    if !service.is_connected() {
        let _ = job.reply.send(WorkerMessage::Status(STATUS_CONNECTING));
        service.connect()?;
    }
    let _ = job.reply.send(WorkerMessage::Status(STATUS_PROCESSING));
    rt.block_on(service.ask(&job.prompt))
}
