use crate::controller::ConversationController;
use crate::ui::conversation::commands::{get_help_text, ParsedCommand, SlashCommand};
use crate::ui::conversation::composer::{ComposerResult, ConversationComposer};
use crate::ui::conversation::history::ConversationHistory;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};
use std::cell::Cell;
use tracing::debug;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Manages the chat screen: history above, composer below, status line last
pub struct ConversationManager {
    controller: ConversationController,
    composer: ConversationComposer,
    has_api_key: bool,
    frame: usize,
    scroll_back: usize,
    /// Where the history was last drawn, for bounding `scroll_back`
    history_area: Cell<Rect>,
}

impl ConversationManager {
    pub fn new(
        controller: ConversationController,
        input_placeholder: impl Into<String>,
        has_api_key: bool,
    ) -> Self {
        Self {
            controller,
            composer: ConversationComposer::new(input_placeholder),
            has_api_key,
            frame: 0,
            scroll_back: 0,
            history_area: Cell::new(Rect::default()),
        }
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    /// Fold finished exchanges into the view and advance the typing animation.
    /// The view jumps back to the newest entry only when an answer settles.
    pub fn tick(&mut self) {
        if self.controller.poll_completions() > 0 {
            self.scroll_back = 0;
        }
        if self.controller.is_waiting() {
            self.frame = self.frame.wrapping_add(1);
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        match key.code {
            KeyCode::Esc => return ConversationAction::Exit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return ConversationAction::Exit;
            }
            KeyCode::PageUp => {
                let max = ConversationHistory::new(self.controller.messages())
                    .max_scroll_back(self.history_area.get());
                self.scroll_back = self.scroll_back.saturating_add(5).min(max);
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(5);
                return ConversationAction::None;
            }
            _ => {}
        }

        let mut buffer = self.controller_input();
        let result = self.composer.handle_key(key, &mut buffer);
        self.controller.set_input(buffer);

        match result {
            ComposerResult::Submit => {
                if let Some(id) = self.controller.submit_input() {
                    debug!(request = %id, "submitted from composer");
                    self.scroll_back = 0;
                }
                ConversationAction::None
            }
            ComposerResult::Command(command) => self.handle_slash_command(command),
            ComposerResult::None => ConversationAction::None,
        }
    }

    /// Insert pasted text into the composer
    pub fn handle_paste(&mut self, text: &str) {
        let mut buffer = self.controller_input();
        self.composer.paste(&mut buffer, text);
        self.controller.set_input(buffer);
    }

    fn controller_input(&self) -> String {
        self.controller.input().to_string()
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        match command.command {
            SlashCommand::Clear => {
                self.controller.clear();
                self.scroll_back = 0;
                ConversationAction::None
            }
            SlashCommand::Help => {
                self.controller.push_note(get_help_text());
                self.scroll_back = 0;
                ConversationAction::None
            }
            SlashCommand::Bye => ConversationAction::Exit,
        }
    }

    fn status_line(&self) -> Line<'_> {
        let mut spans = vec![Span::styled(
            format!(" {} ", self.controller.model_name()),
            Style::default().fg(Color::Black).bg(Color::Cyan),
        )];

        let pending = self.controller.pending_count();
        if pending > 0 {
            spans.push(Span::styled(
                format!("  waiting for {pending} answer{}", if pending == 1 { "" } else { "s" }),
                Style::default().fg(Color::Yellow),
            ));
        }
        if !self.has_api_key {
            spans.push(Span::styled(
                "  no API key: set GEMINI_API_KEY or --api-key",
                Style::default().fg(Color::Red),
            ));
        }
        spans.push(Span::styled(
            "  /help for commands · Esc to quit",
            Style::default().fg(Color::DarkGray),
        ));
        Line::from(spans)
    }
}

impl Widget for &ConversationManager {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let input_lines = self.controller.input().split('\n').count().clamp(1, 5) as u16;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(input_lines + 2),
                Constraint::Length(1),
            ])
            .split(area);

        self.history_area.set(chunks[0]);
        ConversationHistory::new(self.controller.messages())
            .frame(self.frame)
            .scroll_back(self.scroll_back)
            .render(chunks[0], buf);

        self.composer
            .view(self.controller.input(), "Message")
            .render(chunks[1], buf);

        buf.set_line(chunks[2].x, chunks[2].y, &self.status_line(), chunks[2].width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Texts;
    use crate::error::ModelError;
    use crate::llm::{DeltaSink, GenerativeModel};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    struct EchoModel;

    #[async_trait]
    impl GenerativeModel for EchoModel {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            Ok(format!("echo: {prompt}"))
        }
    }

    /// Streams one fragment, then waits until released
    struct HeldStreamModel {
        release: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl GenerativeModel for HeldStreamModel {
        fn model_name(&self) -> &str {
            "held"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            Ok("Hello".to_string())
        }

        async fn generate_streaming(
            &self,
            _prompt: &str,
            on_delta: DeltaSink<'_>,
        ) -> Result<String, ModelError> {
            on_delta("Hel");
            let release = self.release.lock().unwrap().take();
            if let Some(release) = release {
                let _ = release.await;
            }
            Ok("Hello".to_string())
        }
    }

    fn manager() -> ConversationManager {
        let controller = ConversationController::new(Arc::new(EchoModel), Texts::default());
        ConversationManager::new(controller, "Type message here", true)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_line(manager: &mut ConversationManager, text: &str) -> ConversationAction {
        for c in text.chars() {
            manager.handle_key(press(KeyCode::Char(c)));
        }
        manager.handle_key(press(KeyCode::Enter))
    }

    #[tokio::test]
    async fn enter_submits_and_tick_settles() {
        let mut manager = manager();
        type_line(&mut manager, "Hello");
        assert_eq!(manager.controller().messages().len(), 2);
        assert_eq!(manager.controller().input(), "");

        while manager.controller().is_waiting() {
            tokio::task::yield_now().await;
            manager.tick();
        }
        assert_eq!(manager.controller().messages()[1].text, "echo: Hello");
    }

    #[tokio::test]
    async fn blank_enter_keeps_conversation_empty() {
        let mut manager = manager();
        type_line(&mut manager, "   ");
        assert!(manager.controller().messages().is_empty());
    }

    #[tokio::test]
    async fn help_and_clear_commands() {
        let mut manager = manager();
        type_line(&mut manager, "/help");
        assert_eq!(manager.controller().messages().len(), 1);
        assert!(manager.controller().messages()[0].text.contains("/clear"));

        type_line(&mut manager, "/clear");
        assert!(manager.controller().messages().is_empty());
    }

    #[tokio::test]
    async fn bye_and_escape_exit() {
        let mut manager = manager();
        assert_eq!(type_line(&mut manager, "/bye"), ConversationAction::Exit);
        assert_eq!(manager.handle_key(press(KeyCode::Esc)), ConversationAction::Exit);
    }

    #[tokio::test]
    async fn streamed_fragments_keep_scroll_position() {
        let (release, held) = oneshot::channel();
        let model = Arc::new(HeldStreamModel {
            release: Mutex::new(Some(held)),
        });
        let controller = ConversationController::new(model, Texts::default()).with_streaming(true);
        let mut manager = ConversationManager::new(controller, "Type message here", true);

        type_line(&mut manager, "Hi");
        manager.scroll_back = 3;
        while manager.controller().messages()[1].text != "Hel" {
            tokio::task::yield_now().await;
            manager.tick();
        }
        assert_eq!(manager.scroll_back, 3);

        release.send(()).unwrap();
        while manager.controller().is_waiting() {
            tokio::task::yield_now().await;
            manager.tick();
        }
        assert_eq!(manager.scroll_back, 0);
    }

    #[tokio::test]
    async fn page_up_stops_at_oldest_line() {
        let mut manager = manager();
        for i in 0..10 {
            manager.controller.push_note(format!("note {i}"));
        }
        let area = Rect::new(0, 0, 40, 12);
        let mut buf = Buffer::empty(area);
        (&manager).render(area, &mut buf);

        let max = ConversationHistory::new(manager.controller().messages())
            .max_scroll_back(manager.history_area.get());
        assert!(max > 0);

        for _ in 0..50 {
            manager.handle_key(press(KeyCode::PageUp));
        }
        assert_eq!(manager.scroll_back, max);

        for _ in 0..50 {
            manager.handle_key(press(KeyCode::PageDown));
        }
        assert_eq!(manager.scroll_back, 0);
    }
}
