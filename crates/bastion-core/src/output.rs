//! Bounded message output.
//!
//! Commands that run several operations collect one chunk per operation and
//! render them into a single chat message. Chat messages have a hard size
//! limit, so [`OutputAccumulator::render`] trims the largest tables first until
//! everything fits, leaving a `...` marker row where rows were dropped.
//!
//! Sizes are counted in characters, which is how Discord counts message length.

use crate::markup::escape_fences;

/// Trailing row that marks omitted table content.
pub const MARKER_ROW: &str = "...";

/// Default message budget (Discord's message length limit).
pub const DEFAULT_BUDGET: usize = 2000;

/// Opening and closing code fence around a table, newline included.
const FENCE_OPEN: &str = "```\n";
const FENCE_CLOSE: &str = "\n```";

/// Cost of the marker row: its text plus its separator.
const MARKER_COST: usize = MARKER_ROW.len() + 1;

/// One unit of accumulated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    /// A fixed line of text. Never truncated.
    Status(String),
    /// Rows rendered inside a code block. Rows may be dropped from the end.
    Table(TableChunk),
}

impl OutputChunk {
    /// Number of characters this chunk contributes to the budget.
    pub fn cost(&self) -> usize {
        match self {
            OutputChunk::Status(text) => char_len(text) + 1,
            OutputChunk::Table(table) => table.cost(),
        }
    }

    fn render_into(&self, out: &mut String) {
        match self {
            OutputChunk::Status(text) => out.push_str(text),
            OutputChunk::Table(table) => table.render_into(out),
        }
    }
}

/// Ordered rows plus a flag for the trailing marker row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableChunk {
    rows: Vec<String>,
    truncated: bool,
}

impl TableChunk {
    /// Rows containing a code fence are escaped so they can't end the block.
    pub fn new(rows: Vec<String>) -> Self {
        Self {
            rows: escape_rows(rows),
            truncated: false,
        }
    }

    /// A table that is already known to be incomplete (e.g. a capped fetch).
    pub fn with_marker(rows: Vec<String>) -> Self {
        Self {
            rows: escape_rows(rows),
            truncated: true,
        }
    }

    /// Real rows, excluding the marker.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Whether trimming can still remove a real row.
    pub fn can_trim(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Fence overhead, every row with its separator, and the marker if set.
    pub fn cost(&self) -> usize {
        let rows: usize = self.rows.iter().map(|row| char_len(row) + 1).sum();
        let marker = if self.truncated { MARKER_COST } else { 0 };
        FENCE_OPEN.len() + FENCE_CLOSE.len() + rows + marker
    }

    /// Drops the last real row, setting the marker if it wasn't set yet.
    ///
    /// Returns how much the cost went down (the marker can make this
    /// negative), or `None` when no real row is left.
    pub fn trim_last(&mut self) -> Option<isize> {
        let removed = self.rows.pop()?;
        let mut saved = (char_len(&removed) + 1) as isize;
        if !self.truncated {
            self.truncated = true;
            saved -= MARKER_COST as isize;
        }
        Some(saved)
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(FENCE_OPEN);
        let mut first = true;
        for row in self
            .rows
            .iter()
            .map(String::as_str)
            .chain(self.truncated.then_some(MARKER_ROW))
        {
            if !first {
                out.push('\n');
            }
            out.push_str(row);
            first = false;
        }
        out.push_str(FENCE_CLOSE);
    }
}

fn escape_rows(rows: Vec<String>) -> Vec<String> {
    rows.into_iter()
        .map(|row| {
            if row.contains("```") {
                escape_fences(&row)
            } else {
                row
            }
        })
        .collect()
}

/// Collects output chunks and renders them within a size budget.
#[derive(Debug, Clone, Default)]
pub struct OutputAccumulator {
    chunks: Vec<OutputChunk>,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: OutputChunk) {
        self.chunks.push(chunk);
    }

    pub fn status(&mut self, text: impl Into<String>) {
        self.push(OutputChunk::Status(text.into()));
    }

    pub fn table(&mut self, table: TableChunk) {
        self.push(OutputChunk::Table(table));
    }

    pub fn chunks(&self) -> &[OutputChunk] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sum of all chunk costs.
    pub fn total_cost(&self) -> usize {
        self.chunks.iter().map(OutputChunk::cost).sum()
    }

    /// Trims tables until the total cost fits `budget` or nothing is left to
    /// trim. Returns the number of rows removed.
    ///
    /// Each step picks the costliest table that still has a real row; ties go
    /// to the earliest table.
    pub fn fit(&mut self, budget: usize) -> usize {
        let mut total = self.total_cost() as isize;
        let budget = budget as isize;
        let mut removed = 0;

        while total > budget {
            let Some(table) = self.largest_trimmable_table() else {
                break;
            };
            let Some(saved) = table.trim_last() else {
                break;
            };
            total -= saved;
            removed += 1;
        }

        removed
    }

    /// Fits the chunks into `budget` and renders them, one chunk per line.
    ///
    /// The result is cut to `budget` characters as a last resort, so it never
    /// exceeds the budget even when status lines alone are too long.
    pub fn render(&mut self, budget: usize) -> String {
        self.fit(budget);

        let mut out = String::new();
        for (index, chunk) in self.chunks.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            chunk.render_into(&mut out);
        }

        truncate_chars(&out, budget)
    }

    fn largest_trimmable_table(&mut self) -> Option<&mut TableChunk> {
        let mut best: Option<(usize, usize)> = None;
        for (index, chunk) in self.chunks.iter().enumerate() {
            let OutputChunk::Table(table) = chunk else {
                continue;
            };
            if !table.can_trim() {
                continue;
            }
            let cost = table.cost();
            if best.is_none_or(|(_, best_cost)| cost > best_cost) {
                best = Some((index, cost));
            }
        }

        let (index, _) = best?;
        match &mut self.chunks[index] {
            OutputChunk::Table(table) => Some(table),
            OutputChunk::Status(_) => None,
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Cuts `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
