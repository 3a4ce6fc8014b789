//! UI描画の共通部品（罫線・スピナー）

use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};

/// スター型スピナーのフレーム
pub const SPINNER_FRAMES: [&str; 6] = ["✶", "✸", "✹", "✺", "✹", "✷"];

/// `tick` 番目のスピナーフレーム
pub fn spinner_frame(tick: usize) -> &'static str {
    SPINNER_FRAMES[tick % SPINNER_FRAMES.len()]
}

/// 中央にタイトルを置いた水平罫線 `──── title ────`
///
/// 幅が足りない場合はタイトルだけを返す。
pub fn rule_line(title: &str, width: u16, style: Style) -> Line<'static> {
    let label = format!(" {title} ");
    let label_len = label.chars().count();
    let width = width as usize;
    if width <= label_len {
        return Line::from(Span::styled(title.to_string(), style));
    }
    let left = (width - label_len) / 2;
    let right = width - label_len - left;
    Line::from(vec![
        Span::raw("─".repeat(left)),
        Span::styled(label, style),
        Span::raw("─".repeat(right)),
    ])
}

/// 外枠の内側にパディングを取った領域
pub fn inset(area: Rect, horizontal: u16, vertical: u16) -> Rect {
    Rect {
        x: area.x + horizontal,
        y: area.y + vertical,
        width: area.width.saturating_sub(horizontal * 2),
        height: area.height.saturating_sub(vertical * 2),
    }
}
