//! Keyboard dispatch to the head root window

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::screen::Screen;
use crate::tree::WidgetTree;

impl<S: Screen> WidgetTree<S> {
    /// Deliver a key to the head window
    ///
    /// The focused widget sees the key first, then each ancestor until one
    /// handles it. An unhandled Tab or BackTab moves focus. Returns whether
    /// anything consumed the key.
    pub fn dispatch_key(&mut self, key: KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return false;
        }
        let Some(head) = self.head_root() else {
            return false;
        };
        let target = self.focused_widget(head).unwrap_or(head);

        for id in self.chain(target) {
            if self.with_widget_mut(id, |w| w.handle_key(&key)) == Some(true) {
                return true;
            }
        }

        let next = match key.code {
            KeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => self.prev_focused(target),
            KeyCode::Tab => self.next_focused(target),
            KeyCode::BackTab => self.prev_focused(target),
            _ => return false,
        };
        match next {
            Some(next) if next != target => {
                self.set_focus(next);
                true
            }
            _ => false,
        }
    }
}
