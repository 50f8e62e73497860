use crate::ui::conversation::commands::{parse_slash_command, ParsedCommand};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    /// Enter was pressed on ordinary text; the caller submits the buffer
    Submit,
    /// Enter was pressed on a slash command; the buffer has been cleared
    Command(ParsedCommand),
    None,
}

/// Line editor over the conversation's input buffer.
///
/// The buffer itself lives with the controller so that submitting clears it;
/// the composer only keeps the cursor, measured in characters.
#[derive(Debug, Clone)]
pub struct ConversationComposer {
    cursor: usize,
    placeholder: String,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            cursor: 0,
            placeholder: placeholder.into(),
        }
    }

    /// Handle key input against `buffer`
    pub fn handle_key(&mut self, key: KeyEvent, buffer: &mut String) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }
        self.clamp(buffer);

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char(buffer, '\n');
                } else if let Some(command) = parse_slash_command(buffer) {
                    buffer.clear();
                    self.cursor = 0;
                    return ComposerResult::Command(command);
                } else {
                    return ComposerResult::Submit;
                }
            }
            KeyCode::Char(c) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    match c {
                        'a' => self.cursor = 0,
                        'e' => self.cursor = buffer.chars().count(),
                        'u' => {
                            buffer.clear();
                            self.cursor = 0;
                        }
                        _ => {}
                    }
                } else {
                    self.insert_char(buffer, c);
                }
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = byte_offset(buffer, self.cursor);
                    buffer.remove(at);
                }
            }
            KeyCode::Delete => {
                if self.cursor < buffer.chars().count() {
                    let at = byte_offset(buffer, self.cursor);
                    buffer.remove(at);
                }
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            KeyCode::Right => {
                if self.cursor < buffer.chars().count() {
                    self.cursor += 1;
                }
            }
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = buffer.chars().count(),
            _ => {}
        }

        ComposerResult::None
    }

    /// Insert pasted text at the cursor
    pub fn paste(&mut self, buffer: &mut String, text: &str) {
        self.clamp(buffer);
        for c in text.chars().filter(|c| *c != '\r') {
            self.insert_char(buffer, c);
        }
    }

    fn insert_char(&mut self, buffer: &mut String, c: char) {
        let at = byte_offset(buffer, self.cursor);
        buffer.insert(at, c);
        self.cursor += 1;
    }

    /// The buffer may have been cleared or replaced behind our back
    fn clamp(&mut self, buffer: &str) {
        self.cursor = self.cursor.min(buffer.chars().count());
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Borrow as a widget over the current buffer contents
    pub fn view<'a>(&'a self, buffer: &'a str, title: &'a str) -> ComposerView<'a> {
        ComposerView {
            composer: self,
            buffer,
            title,
        }
    }
}

fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct ComposerView<'a> {
    composer: &'a ConversationComposer,
    buffer: &'a str,
    title: &'a str,
}

impl Widget for ComposerView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let composer = self.composer;
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title)
            .style(Style::default().fg(Color::Green));

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.buffer.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                composer.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
            return;
        }

        let mut content = self.buffer.to_string();
        let at = byte_offset(&content, composer.cursor.min(content.chars().count()));
        content.insert(at, '▌');

        // Keep the line with the cursor visible when the text outgrows the box
        let lines: Vec<&str> = content.split('\n').collect();
        let height = inner_area.height as usize;
        let cursor_line = lines.iter().position(|l| l.contains('▌')).unwrap_or(0);
        let start = (cursor_line + 1).saturating_sub(height);

        for (i, line_text) in lines.iter().skip(start).take(height).enumerate() {
            let line = Line::from(vec![Span::raw(*line_text)]);
            buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
        }
    }
}
