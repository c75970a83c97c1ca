//! Row layout of the feed area, bottom-pinned.
//!
//! Lines are wrapped by terminal display width, so a CJK character takes
//! two columns. The layout built for a draw doubles as the viewport probe
//! the render buffer is pruned against.

use std::collections::HashMap;
use unicode_width::UnicodeWidthChar;

use danmuji_core::format::{FeedLine, Role};
use danmuji_core::{ItemId, ViewportProbe};

/// One visual row: runs of text with their role.
pub type Row = Vec<(String, Role)>;

/// Split `line` into rows no wider than `width` columns. Always at least
/// one row, even for an empty line.
pub fn wrap(line: &FeedLine, width: u16) -> Vec<Row> {
    let width = usize::from(width.max(1));
    let mut rows: Vec<Row> = vec![Vec::new()];
    let mut used = 0;

    for segment in &line.segments {
        let mut run = String::new();
        for ch in segment.text.chars() {
            let w = ch.width().unwrap_or(0);
            if used + w > width && used > 0 {
                if !run.is_empty() {
                    push_run(&mut rows, std::mem::take(&mut run), segment.role);
                }
                rows.push(Vec::new());
                used = 0;
            }
            run.push(ch);
            used += w;
        }
        if !run.is_empty() {
            push_run(&mut rows, run, segment.role);
        }
    }
    rows
}

fn push_run(rows: &mut [Row], text: String, role: Role) {
    if let Some(last) = rows.last_mut() {
        last.push((text, role));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    height: usize,
}

/// Where every item sits for one draw of the feed area.
#[derive(Debug, Clone, Default)]
pub struct FeedLayout {
    spans: HashMap<ItemId, Span>,
    total_rows: usize,
    viewport_rows: usize,
    tolerance_rows: usize,
}

impl FeedLayout {
    /// Lay out items top to bottom from their row counts.
    pub fn new(
        heights: impl IntoIterator<Item = (ItemId, usize)>,
        viewport_rows: u16,
        tolerance_rows: u16,
    ) -> Self {
        let mut spans = HashMap::new();
        let mut start = 0;
        for (id, height) in heights {
            spans.insert(id, Span { start, height });
            start += height;
        }
        Self {
            spans,
            total_rows: start,
            viewport_rows: usize::from(viewport_rows),
            tolerance_rows: usize::from(tolerance_rows),
        }
    }

    /// First visible row when pinned to the newest item.
    pub fn top(&self) -> usize {
        self.total_rows.saturating_sub(self.viewport_rows)
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }
}

impl ViewportProbe for FeedLayout {
    fn is_above_visible_top(&self, id: ItemId) -> Option<bool> {
        let span = self.spans.get(&id)?;
        Some(span.start + span.height + self.tolerance_rows <= self.top())
    }
}
