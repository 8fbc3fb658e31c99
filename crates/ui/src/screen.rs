//! Drawing collaborator
//!
//! The tree never writes to a terminal itself. Widgets paint through a
//! [`Screen`], and the tree asks it to flush once per redraw.

/// Terminal drawing surface
pub trait Screen {
    /// Write `text` at cell (`x`, `y`)
    fn put_str(&mut self, x: u16, y: u16, text: &str);

    /// Push pending output to the terminal
    fn refresh(&mut self);
}

/// Screen that discards everything
#[derive(Debug, Default)]
pub struct NullScreen;

impl Screen for NullScreen {
    fn put_str(&mut self, _x: u16, _y: u16, _text: &str) {}

    fn refresh(&mut self) {}
}

/// Headless screen that keeps every write, for tests and dumps
#[derive(Debug, Default)]
pub struct BufferScreen {
    pub writes: Vec<(u16, u16, String)>,
    pub refreshes: usize,
}

impl BufferScreen {
    /// Texts written so far, in order
    pub fn texts(&self) -> Vec<&str> {
        self.writes.iter().map(|(_, _, t)| t.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.writes.clear();
        self.refreshes = 0;
    }
}

impl Screen for BufferScreen {
    fn put_str(&mut self, x: u16, y: u16, text: &str) {
        self.writes.push((x, y, text.to_string()));
    }

    fn refresh(&mut self) {
        self.refreshes += 1;
    }
}
