//! tfm widget engine
//!
//! A [`WidgetTree`] owns every widget of the interface. It keeps the
//! parent/child structure, tab-order focus, the stack of root windows
//! (the head one gets the keyboard) and per-subtree redraw locks. Painting
//! goes through a [`Screen`].

mod focus;
mod keys;
pub mod screen;
pub mod tree;
pub mod widget;

pub use screen::{BufferScreen, NullScreen, Screen};
pub use tree::WidgetTree;
pub use widget::{Blank, Rect, Widget, WidgetId, WidgetKind};
