use std::time::Duration;
use tracing::trace;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crate::domain::{ExplorerConfig, ExplorerError, Message};
use crate::model::Model;

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &ExplorerConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, ExplorerError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(self.handle_key(key));
                }
                Event::Resize(width, height) => {
                    return Ok(Some(Message::Resize(width as usize, height as usize)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Up | KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down | KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Left | KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right | KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Tab, _) => Some(Message::SwitchFocus),
            (KeyCode::Char(c @ '1'..='4'), _) => c.to_digit(10).map(|d| Message::ShowView(d as usize - 1)),
            (KeyCode::Char(' '), _) | (KeyCode::Enter, _) => Some(Message::ToggleSelection),
            (KeyCode::Char('c'), _) => Some(Message::ClearSelections),
            (KeyCode::Char('g'), _) => Some(Message::CycleGrouping),
            (KeyCode::Char('v'), _) => Some(Message::CycleValueColumn),
            (KeyCode::Char('o'), _) => Some(Message::ToggleOutliers),
            (KeyCode::Char('z'), _) => Some(Message::ToggleZeros),
            (KeyCode::Char('y'), _) => Some(Message::Copy),
            (KeyCode::Char('e'), _) => Some(Message::OpenFile),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode) -> Option<Message> {
        let controller = Controller::new(&ExplorerConfig::default());
        controller.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn maps_keys_to_messages() {
        assert_eq!(map(KeyCode::Char('q')), Some(Message::Quit));
        assert_eq!(map(KeyCode::Char('j')), Some(Message::MoveDown));
        assert_eq!(map(KeyCode::Char('3')), Some(Message::ShowView(2)));
        assert_eq!(map(KeyCode::Char(' ')), Some(Message::ToggleSelection));
        assert_eq!(map(KeyCode::Char('z')), Some(Message::ToggleZeros));
        assert_eq!(map(KeyCode::Char('x')), None);
    }
}
