// 同階層のファイルをモジュールとしてインポート
pub mod config;
pub mod error;
pub mod modes; // メニュー / 質問の画面
pub mod openai;
pub mod prompt;
pub mod ui;

pub use config::OpenAISettings;
pub use error::{AssistantError, ErrorKind};
pub use openai::{AssistantService, AssistantWorker, ChatReply};

use color_eyre::Result;
use crossterm::event::{self as crossterm_event, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::Duration;

/// 描画とイベントポーリングの間隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// アプリケーションのメインループを実行
pub fn run(mut terminal: DefaultTerminal, worker: AssistantWorker) -> Result<()> {
    let mut current_mode = modes::AppMode::Menu(modes::MenuMode::new(worker.clone()));

    loop {
        // 現在のモードで更新処理を実行（スピナー・応答チェック）
        current_mode.update();

        terminal.draw(|f| current_mode.render(f))?;

        if crossterm_event::poll(POLL_INTERVAL)? {
            match crossterm_event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match current_mode.handle_key(key) {
                        Ok(Some(modes::AppMode::Exit)) => break,
                        Ok(Some(next_mode)) => current_mode = next_mode,
                        Ok(None) => {}
                        Err(e) => {
                            // エラーが発生した場合はメニューに戻す
                            tracing::error!(target: "app", "Error in mode: {:?}", e);
                            current_mode = modes::AppMode::Menu(modes::MenuMode::new(worker.clone()));
                        }
                    }
                }
                Event::Resize(_, _) => {
                    // 次ループで再描画されるので特別な処理なし
                }
                _ => {}
            }
        }
    }
    tracing::info!(target: "app", "exit selected");
    Ok(())
}
