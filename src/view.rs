// Document view and auto-scroll policy

use std::io::{self, Write};

/// Distance to the bottom, in display units, under which a view follows new output.
pub const NEAR_BOTTOM_THRESHOLD: u32 = 150;

/// Something that displays the growing document.
pub trait DocumentView {
    /// How far the current scroll position is from the bottom of the rendered content.
    fn distance_to_bottom(&self) -> u32;

    /// Re-renders after `appended` was added to the end of `document`.
    fn render(&mut self, document: &str, appended: &str) -> io::Result<()>;

    fn scroll_to_bottom(&mut self);
}

/// Decides whether a view should follow output as it arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollPolicy {
    pub threshold: u32,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            threshold: NEAR_BOTTOM_THRESHOLD,
        }
    }
}

impl ScrollPolicy {
    pub fn is_near_bottom<V: DocumentView + ?Sized>(&self, view: &V) -> bool {
        view.distance_to_bottom() < self.threshold
    }
}

/// Writes the raw Markdown to a terminal (or any writer) and keeps a row
/// based scroll model of what has been printed.
///
/// Display units are terminal rows; long lines wrap at `columns`.
pub struct TerminalView<W: Write> {
    out: W,
    columns: usize,
    viewport_rows: u32,
    scroll_top: u32,
    finished_rows: u32,
    column: usize,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W, viewport_rows: u32, columns: usize) -> Self {
        Self {
            out,
            columns: columns.max(1),
            viewport_rows,
            scroll_top: 0,
            finished_rows: 0,
            column: 0,
        }
    }

    pub fn content_rows(&self) -> u32 {
        self.finished_rows + u32::from(self.column > 0)
    }

    fn measure(&mut self, appended: &str) {
        for ch in appended.chars() {
            if ch == '\n' {
                self.finished_rows += 1;
                self.column = 0;
            } else if self.column == self.columns {
                self.finished_rows += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl<W: Write> DocumentView for TerminalView<W> {
    fn distance_to_bottom(&self) -> u32 {
        self.content_rows()
            .saturating_sub(self.scroll_top + self.viewport_rows)
    }

    fn render(&mut self, _document: &str, appended: &str) -> io::Result<()> {
        self.measure(appended);
        self.out.write_all(appended.as_bytes())?;
        self.out.flush()
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.content_rows().saturating_sub(self.viewport_rows);
    }
}
