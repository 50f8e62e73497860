//! Conversation history display component

use crate::conversation::Message;
use crate::events::Speaker;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Renders the message list, newest at the bottom
pub struct ConversationHistory<'a> {
    messages: &'a [Message],
    /// Animation frame for pending placeholders
    frame: usize,
    /// Lines scrolled up from the bottom
    scroll_back: usize,
}

impl<'a> ConversationHistory<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            frame: 0,
            scroll_back: 0,
        }
    }

    pub fn frame(mut self, frame: usize) -> Self {
        self.frame = frame;
        self
    }

    pub fn scroll_back(mut self, lines: usize) -> Self {
        self.scroll_back = lines;
        self
    }

    /// All lines for the given content width, oldest first
    pub fn lines(&self, width: u16) -> Vec<Line<'a>> {
        let mut all_lines = Vec::new();
        for (i, message) in self.messages.iter().enumerate() {
            if i > 0 {
                all_lines.push(Line::from(""));
            }
            all_lines.extend(self.render_message(message, width));
        }
        all_lines
    }

    /// Furthest `scroll_back` that still fills the view rendered into `area`
    pub fn max_scroll_back(&self, area: Rect) -> usize {
        let inner_area = frame_block().inner(area);
        self.lines(inner_area.width)
            .len()
            .saturating_sub(inner_area.height as usize)
    }

    /// Render a single message into lines
    fn render_message(&self, message: &'a Message, width: u16) -> Vec<Line<'a>> {
        let mut lines = Vec::new();

        let time = message.sent_at.format("%H:%M").to_string();
        let (label, label_style) = match message.speaker {
            Speaker::User => ("You", Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD)),
            Speaker::Assistant => (
                "Assistant",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        };
        let arrow = if message.speaker.is_outgoing() { "→" } else { "←" };

        lines.push(Line::from(vec![
            Span::styled(format!("{arrow} "), Style::default().fg(Color::DarkGray)),
            Span::styled(label, label_style),
            Span::styled(format!("  {time}"), Style::default().fg(Color::DarkGray)),
        ]));

        let content_style = content_style(message);
        let wrapped = wrap_text(&message.text, width.saturating_sub(2) as usize);
        let last = wrapped.len().saturating_sub(1);
        for (i, content_line) in wrapped.into_iter().enumerate() {
            let mut spans = vec![Span::raw("  "), Span::styled(content_line, content_style)];
            if message.pending && i == last {
                spans.push(Span::styled(
                    typing_dots(self.frame),
                    Style::default().fg(Color::Yellow),
                ));
            }
            lines.push(Line::from(spans));
        }

        lines
    }
}

impl Widget for ConversationHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = frame_block();
        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.messages.is_empty() {
            let hint = Line::from(Span::styled(
                "Start by typing a message below.",
                Style::default().fg(Color::DarkGray),
            ));
            buf.set_line(inner_area.x, inner_area.y, &hint, inner_area.width);
            return;
        }

        let all_lines = self.lines(inner_area.width);
        let height = inner_area.height as usize;
        let end = all_lines.len().saturating_sub(self.scroll_back).max(height.min(all_lines.len()));
        let start = end.saturating_sub(height);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

fn frame_block() -> Block<'static> {
    Block::default().borders(Borders::ALL).title("Conversation")
}

fn content_style(message: &Message) -> Style {
    if message.pending {
        return Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC);
    }
    match message.speaker {
        Speaker::User => Style::default().fg(Color::Blue),
        Speaker::Assistant => Style::default(),
    }
}

fn typing_dots(frame: usize) -> &'static str {
    match frame % 4 {
        0 => " ",
        1 => " .",
        2 => " ..",
        _ => " ...",
    }
}

/// Wrap text to fit within `width` terminal columns, keeping explicit line breaks
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            if current_width > 0 && current_width + 1 + word.width() > width {
                lines.push(std::mem::take(&mut current_line));
                current_width = 0;
            }
            if current_width > 0 {
                current_line.push(' ');
                current_width += 1;
            }

            // Hard-split words wider than a full line. A line always takes at
            // least one character, even one wider than `width`.
            for c in word.chars() {
                let char_width = c.width().unwrap_or(0);
                if current_width > 0 && current_width + char_width > width {
                    lines.push(std::mem::take(&mut current_line));
                    current_width = 0;
                }
                current_line.push(c);
                current_width += char_width;
            }
        }

        lines.push(current_line);
    }

    lines
}
