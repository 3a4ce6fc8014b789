use color_eyre::Result;
use nl2sql::{AssistantService, OpenAISettings};
use std::sync::Arc;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    color_eyre::install()?;

    // .env は任意。無ければ無視する。
    let _ = dotenvy::dotenv();

    // ログ: 標準出力は使わず、ファイルへのみ出力してratatuiと衝突しないようにする
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // ファイルにANSIカラー不要
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    // 設定ファイルが壊れている場合は画面を開く前に終了する
    let settings = OpenAISettings::load()?;
    let service = Arc::new(AssistantService::new(settings));
    let worker = nl2sql::openai::start_assistant_worker(service)?;

    let terminal = ratatui::init();
    let res = nl2sql::run(terminal, worker);
    ratatui::restore();
    res
}
