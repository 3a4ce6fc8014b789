//! メニューモード: 起動時の選択画面

use super::{AppMode, AskMode, Mode};
use crate::openai::AssistantWorker;
use crate::ui::inset;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use std::fmt;

/// メニューの選択肢
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Ask,
    Exit,
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuItem::Ask => write!(f, "1.  Ask AI Assistant"),
            MenuItem::Exit => write!(f, "2.  Exit this Application"),
        }
    }
}

impl MenuItem {
    fn all() -> [MenuItem; 2] {
        [MenuItem::Ask, MenuItem::Exit]
    }

    // 選択肢は2つだけなので next / prev は同じ
    fn toggle(self) -> MenuItem {
        match self {
            MenuItem::Ask => MenuItem::Exit,
            MenuItem::Exit => MenuItem::Ask,
        }
    }
}

/// メニューモード状態
pub struct MenuMode {
    selected: MenuItem,
    worker: AssistantWorker,
}

impl MenuMode {
    pub fn new(worker: AssistantWorker) -> Self {
        Self {
            selected: MenuItem::Ask,
            worker,
        }
    }

    pub fn selected(&self) -> MenuItem {
        self.selected
    }
}

impl Mode for MenuMode {
    fn update(&mut self) {}

    fn render(&self, f: &mut Frame) {
        let area = f.area();

        let block = Block::default()
            .title("nl2sql - AI Assistant")
            .borders(Borders::ALL);
        f.render_widget(block, area);

        let content_area = inset(area, 2, 2);

        let title = Paragraph::new("Select an option to continue")
            .style(Style::default().fg(Color::Cyan).bold());
        f.render_widget(title, Rect { height: 2, ..content_area });

        let menu_start_y = content_area.y + 3;
        for (index, item) in MenuItem::all().iter().enumerate() {
            let is_selected = self.selected == *item;
            let prefix = if is_selected { "▶ " } else { "  " };
            let style = if is_selected {
                Style::default().fg(Color::White).bg(Color::Blue).bold()
            } else {
                Style::default().fg(Color::White)
            };
            let paragraph = Paragraph::new(format!("{prefix}{item}")).style(style);
            f.render_widget(
                paragraph,
                Rect {
                    y: menu_start_y + index as u16,
                    height: 1,
                    ..content_area
                },
            );
        }

        let footer = Paragraph::new("↑/↓: Navigate | Enter: Select | Esc/q: Exit")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        f.render_widget(
            footer,
            Rect {
                y: area.height.saturating_sub(2),
                height: 1,
                ..area
            },
        );
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<Option<AppMode>> {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Ok(Some(AppMode::Exit))
            }
            KeyCode::Up | KeyCode::Down | KeyCode::Char('k') | KeyCode::Char('j') => {
                self.selected = self.selected.toggle();
                Ok(None)
            }
            KeyCode::Char('1') => Ok(Some(AppMode::Ask(AskMode::new(self.worker.clone())))),
            KeyCode::Char('2') => Ok(Some(AppMode::Exit)),
            KeyCode::Enter => {
                let next_mode = match self.selected {
                    MenuItem::Ask => AppMode::Ask(AskMode::new(self.worker.clone())),
                    MenuItem::Exit => AppMode::Exit,
                };
                Ok(Some(next_mode))
            }
            KeyCode::Esc | KeyCode::Char('q') => Ok(Some(AppMode::Exit)),
            _ => Ok(None),
        }
    }
}
