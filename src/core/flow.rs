//! Flow window selection
//!
//! Each dense line carries a floating cursor that advances with time and
//! wraps modulo the line length. The lit window is the `highlightCount`
//! points just behind the cursor, wrapping around the end of the buffer so
//! the highlight slides continuously whether the path is open or closed.

use std::ops::Range;

use glam::DVec3;

use super::style::LineStyle;

/// Lower bound on the number of lit points
pub const MIN_HIGHLIGHT: f64 = 2.0;

/// Continuous per-line cursor ("active index") into a dense line.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlowCursor {
    index: f64,
}

impl FlowCursor {
    pub fn index(&self) -> f64 {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0.0;
    }

    /// Advance by `speed * dt_ms / 1000` points, wrapping modulo `len`.
    ///
    /// Always leaves the cursor in `[0, len)`; an empty line pins it at 0.
    pub fn advance(&mut self, speed: f64, dt_ms: f64, len: usize) -> f64 {
        if len == 0 {
            self.index = 0.0;
            return 0.0;
        }

        let len = len as f64;
        let step = speed * dt_ms / 1000.0;
        let next = (self.index + if step.is_finite() { step } else { 0.0 }).rem_euclid(len);
        // rem_euclid rounds up to `len` for tiny negative inputs
        self.index = if next < len { next } else { 0.0 };
        self.index
    }
}

/// Number of lit points for a line of `len` points: `max(2, flow_ratio * len)`.
pub fn highlight_count(flow_ratio: f64, len: usize) -> f64 {
    (flow_ratio * len as f64).max(MIN_HIGHLIGHT)
}

/// Lit window as index ranges into the dense line, ordered tail to head.
///
/// `second` is non-empty only when the window wraps past the end of the
/// buffer: `first` is then the tail slice and `second` the head slice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowWindow {
    pub first: Range<usize>,
    pub second: Range<usize>,
}

impl FlowWindow {
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn wraps(&self) -> bool {
        !self.second.is_empty()
    }

    /// Window points in flow order (oldest first)
    pub fn points<'a, T>(&self, line: &'a [T]) -> impl ExactSizeIterator<Item = &'a T> + 'a {
        let (first, second) = (&line[self.first.clone()], &line[self.second.clone()]);
        WindowIter {
            first: first.iter(),
            second: second.iter(),
        }
    }
}

struct WindowIter<'a, T> {
    first: std::slice::Iter<'a, T>,
    second: std::slice::Iter<'a, T>,
}

impl<'a, T> Iterator for WindowIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.first.next().or_else(|| self.second.next())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.first.len() + self.second.len();
        (n, Some(n))
    }
}

impl<T> ExactSizeIterator for WindowIter<'_, T> {}

/// Window ending at `active` (exclusive) and spanning `highlight` points.
///
/// Fractional bounds truncate toward zero. Lines shorter than two points
/// have no window.
pub fn select_window(active: f64, highlight: f64, len: usize) -> FlowWindow {
    if len < 2 {
        return FlowWindow::default();
    }

    let lenf = len as f64;
    let head_end = (active.max(0.0) as usize).min(len);
    if active < highlight {
        let tail_start = ((lenf - (highlight - active)).max(0.0) as usize).min(len);
        FlowWindow {
            first: tail_start..len,
            second: 0..head_end,
        }
    } else {
        let start = ((active - highlight) as usize).min(head_end);
        FlowWindow {
            first: start..head_end,
            second: 0..0,
        }
    }
}

/// A dense line and its animation cursor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowLine {
    points: Vec<DVec3>,
    cursor: FlowCursor,
}

impl FlowLine {
    pub fn new(points: Vec<DVec3>) -> Self {
        Self {
            points,
            cursor: FlowCursor::default(),
        }
    }

    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn cursor(&self) -> FlowCursor {
        self.cursor
    }

    /// Advance the cursor by `dt_ms` and return the window for this frame.
    pub fn step(&mut self, style: &LineStyle, dt_ms: f64) -> FlowWindow {
        if self.points.len() < 2 {
            self.cursor.reset();
            return FlowWindow::default();
        }
        let len = self.points.len();
        let active = self.cursor.advance(style.speed, dt_ms, len);
        select_window(active, highlight_count(style.flow_ratio, len), len)
    }
}
