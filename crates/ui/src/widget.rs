//! Widget identity, geometry and behaviour hooks

use crossterm::event::KeyEvent;

use crate::screen::Screen;

/// Stable handle for a node in the widget tree
///
/// Ids are handed out monotonically and never reused, so a handle to a
/// destroyed widget stays invalid instead of aliasing a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(pub(crate) u64);

impl std::fmt::Display for WidgetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Widget({})", self.0)
    }
}

/// Screen-cell rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Role of a node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetKind {
    /// No children
    #[default]
    Leaf,
    /// Children keep their own bounds
    Container,
    /// Children are resized to fill the container
    Layout,
}

impl WidgetKind {
    pub const fn holds_children(self) -> bool {
        matches!(self, Self::Container | Self::Layout)
    }
}

/// Behaviour of a widget
///
/// Every hook has a do-nothing default; the tree owns focus, parent links
/// and bounds, the widget only reacts.
pub trait Widget {
    /// Paint into `area`
    fn draw(&mut self, _screen: &mut dyn Screen, _area: Rect, _focused: bool) {}

    /// Focus gained; return `true` if the widget already repainted itself
    fn on_focus(&mut self) -> bool {
        false
    }

    /// Focus lost
    fn on_blur(&mut self) {}

    /// Bounds changed
    fn on_resize(&mut self, _area: Rect) {}

    /// Called once, after all children are gone
    fn on_destroy(&mut self) {}

    /// Handle a key; return `true` to stop it bubbling to the parent
    fn handle_key(&mut self, _key: &KeyEvent) -> bool {
        false
    }

    /// Name of the input context (key map) active while this widget has focus
    fn input_context(&self) -> Option<&str> {
        None
    }
}

/// Widget with no behaviour, for plain grouping containers
#[derive(Debug, Clone, Copy, Default)]
pub struct Blank;

impl Widget for Blank {}
