//! 質問モード: 入力 → 問い合わせ中（スピナー） → 回答表示 → メニューへ戻る

use super::{AppMode, MenuMode, Mode};
use crate::error::AssistantError;
use crate::openai::worker::STATUS_PROCESSING;
use crate::openai::{AssistantWorker, ChatReply, WorkerMessage};
use crate::ui::{rule_line, spinner_frame};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    prelude::Stylize,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use std::sync::mpsc::{Receiver, TryRecvError};
use tracing::{info, warn};

pub const INPUT_PROMPT: &str = "Type your question and hit enter when ready.";
pub const EMPTY_INPUT_NOTICE: &str = "Please type a question before pressing Enter.";

const TEAL: Color = Color::Rgb(0, 128, 128);

/// 1往復の状態
pub enum AskState {
    /// 質問を入力中
    Input,
    /// ワーカーの応答待ち
    Pending {
        rx: Receiver<WorkerMessage>,
        status: &'static str,
        tick: usize,
    },
    /// 回答受信済み
    Answered(ChatReply),
    /// 失敗（メニューに戻れる）
    Failed(AssistantError),
}

/// 質問モード状態
pub struct AskMode {
    /// 現在の入力テキスト
    pub input: String,
    /// 最後に送信された質問
    pub last_submitted: Option<String>,
    /// 入力欄の下に出す注意書き
    pub notice: Option<&'static str>,
    state: AskState,
    worker: AssistantWorker,
}

impl AskMode {
    pub fn new(worker: AssistantWorker) -> Self {
        Self {
            input: String::new(),
            last_submitted: None,
            notice: None,
            state: AskState::Input,
            worker,
        }
    }

    pub fn state(&self) -> &AskState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, AskState::Pending { .. })
    }

    /// 質問を送信する。空白だけの入力は送らずに注意書きを出す。
    pub fn submit_prompt(&mut self) {
        if self.is_pending() {
            return;
        }
        if self.input.trim().is_empty() {
            self.notice = Some(EMPTY_INPUT_NOTICE);
            return;
        }
        let prompt = std::mem::take(&mut self.input);
        self.notice = None;
        info!(target: "app", prompt_len = prompt.len(), "submit_prompt");
        self.state = match self.worker.submit(prompt.clone()) {
            Ok(rx) => AskState::Pending {
                rx,
                status: STATUS_PROCESSING,
                tick: 0,
            },
            Err(e) => AskState::Failed(e),
        };
        self.last_submitted = Some(prompt);
    }

    /// ワーカーからの通知を取り込む（ブロックしない）
    pub fn check_ai_response(&mut self) {
        let AskState::Pending { rx, status, tick } = &mut self.state else {
            return;
        };
        *tick = tick.wrapping_add(1);
        let finished = loop {
            match rx.try_recv() {
                Ok(WorkerMessage::Status(s)) => *status = s,
                Ok(WorkerMessage::Finished(result)) => break Some(result),
                Err(TryRecvError::Empty) => break None,
                Err(TryRecvError::Disconnected) => {
                    break Some(Err(AssistantError::unknown("assistant worker has stopped")));
                }
            }
        };
        match finished {
            Some(Ok(reply)) => {
                info!(target: "app", reply = %reply, "ai_answer_received");
                self.state = AskState::Answered(reply);
            }
            Some(Err(e)) => {
                warn!(target: "app", kind = %e.kind(), "ai_answer_failed: {e}");
                self.state = AskState::Failed(e);
            }
            None => {}
        }
    }
}

impl Mode for AskMode {
    fn update(&mut self) {
        self.check_ai_response();
    }

    fn render(&self, f: &mut Frame) {
        let area = f.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // 入力欄
                Constraint::Length(1), // 注意書き / スピナー
                Constraint::Min(0),    // 回答
                Constraint::Length(1), // 操作説明
            ])
            .split(area);

        self.render_input(f, chunks[0]);
        self.render_status(f, chunks[1]);
        self.render_result(f, chunks[2]);
        self.render_footer(f, chunks[3]);
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<Option<AppMode>> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(Some(AppMode::Exit));
        }
        match self.state {
            // 応答待ちの間は他の操作を受け付けない
            AskState::Pending { .. } => Ok(None),
            AskState::Answered(_) | AskState::Failed(_) => match key.code {
                KeyCode::Enter | KeyCode::Esc => Ok(Some(self.back_to_menu())),
                _ => Ok(None),
            },
            AskState::Input => match key.code {
                KeyCode::Esc => Ok(Some(self.back_to_menu())),
                KeyCode::Enter => {
                    self.submit_prompt();
                    Ok(None)
                }
                KeyCode::Backspace => {
                    self.input.pop();
                    Ok(None)
                }
                KeyCode::Char(ch) => {
                    self.notice = None;
                    self.input.push(ch);
                    Ok(None)
                }
                _ => Ok(None),
            },
        }
    }
}

// ===== Private render methods =====

impl AskMode {
    fn back_to_menu(&self) -> AppMode {
        AppMode::Menu(MenuMode::new(self.worker.clone()))
    }

    fn render_input(&self, f: &mut Frame, area: Rect) {
        let text = match (&self.state, &self.last_submitted) {
            (AskState::Input, _) => format!("{}_", self.input),
            (_, Some(q)) => q.clone(),
            (_, None) => String::new(),
        };
        let input_widget = Paragraph::new(text)
            .style(Style::default().fg(TEAL))
            .block(Block::default().borders(Borders::ALL).title(INPUT_PROMPT));
        f.render_widget(input_widget, area);
    }

    fn render_status(&self, f: &mut Frame, area: Rect) {
        let line = match &self.state {
            AskState::Pending { status, tick, .. } => Line::from(format!(
                "{} {}",
                spinner_frame(*tick),
                status
            ))
            .fg(Color::Green),
            AskState::Input => match self.notice {
                Some(n) => Line::from(n).fg(Color::Yellow),
                None => Line::default(),
            },
            _ => Line::default(),
        };
        f.render_widget(Paragraph::new(line), area);
    }

    fn render_result(&self, f: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        match &self.state {
            AskState::Answered(reply) => {
                lines.push(Line::default());
                lines.push(rule_line("AI Assistant Response", area.width, Style::default().fg(Color::Gray)));
                lines.extend(reply.text.lines().map(|l| Line::from(l.to_string())));
                lines.push(Line::default());
                lines.push(
                    Line::from(format!(
                        "prompt tokens: {}  completion tokens: {}",
                        reply.prompt_tokens, reply.completion_tokens
                    ))
                    .fg(Color::DarkGray),
                );
                lines.push(Line::default());
                lines.push(rule_line("****", area.width, Style::default().fg(Color::Yellow)));
            }
            AskState::Failed(e) => {
                lines.push(Line::default());
                lines.push(rule_line("Request Failed", area.width, Style::default().fg(Color::Red)));
                lines.push(Line::from(format!("[{}] {}", e.kind(), e)).fg(Color::Red));
                lines.push(Line::default());
                lines.push(rule_line("****", area.width, Style::default().fg(Color::Yellow)));
            }
            AskState::Input | AskState::Pending { .. } => {}
        }
        f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
    }

    fn render_footer(&self, f: &mut Frame, area: Rect) {
        let help = match self.state {
            AskState::Input => "Enter: Send | Backspace: Delete | Esc: Menu | Ctrl+C: Quit",
            AskState::Pending { .. } => "Waiting for the assistant... | Ctrl+C: Quit",
            AskState::Answered(_) | AskState::Failed(_) => "Enter/Esc: Back to menu | Ctrl+C: Quit",
        };
        f.render_widget(Paragraph::new(help).fg(Color::DarkGray), area);
    }
}
