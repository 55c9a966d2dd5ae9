/// LiveGrid Windowing Calculator
///
/// Given the display list (group headers and detail rows of different
/// heights) and a scroll position, computes which entries must be
/// materialized and where each one sits vertically.
///
/// Two implementations produce identical windows:
///
/// - `compute_window`: a single linear scan, accumulating heights from the
///   top of the list on every call
/// - `HeightIndex`: prefix sums built once per display list, answering each
///   scroll position with two binary searches
///
/// # Examples
///
/// ```
/// use livegrid::{compute_window, DisplayRow, Row};
///
/// let rows: Vec<DisplayRow> = (0..3)
///     .map(|i| DisplayRow::detail(Row::new(i.to_string()), 0))
///     .collect();
///
/// let window = compute_window(&rows, 0.0, 100.0, 0, 40.0, |_| 40.0);
/// assert_eq!(window.start_index, 0);
/// assert_eq!(window.end_index, 3);
/// assert_eq!(window.row_offsets, vec![0.0, 40.0, 80.0]);
/// assert_eq!(window.total_height, 120.0);
/// ```

use crate::row::DisplayRow;
use serde::{Deserialize, Serialize};

/// Visible slice of a display list.
///
/// `end_index` is exclusive. The slice includes the entry straddling the top
/// edge and the entry straddling the bottom edge (extended by overscan).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub start_index: usize,
    pub end_index: usize,
    /// `row_offsets[i - start_index]` is the absolute top of entry `i`.
    pub row_offsets: Vec<f64>,
    pub total_height: f64,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.start_index == self.end_index
    }

    /// Absolute offset of display-list entry `index`, if it is in the window.
    pub fn offset_of(&self, index: usize) -> Option<f64> {
        index
            .checked_sub(self.start_index)
            .and_then(|i| self.row_offsets.get(i))
            .copied()
    }

    /// `(display index, offset)` for every entry in the window.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.row_offsets
            .iter()
            .enumerate()
            .map(move |(i, offset)| (self.start_index + i, *offset))
    }
}

/// Per-kind row heights. Group headers have their own height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowHeights {
    pub row_height: f64,
    pub group_row_height: f64,
}

impl RowHeights {
    pub fn height_of(&self, row: &DisplayRow) -> f64 {
        if row.is_group() {
            self.group_row_height
        } else {
            self.row_height
        }
    }
}

/// Scroll bounds of the overscanned viewport: `(low, high)`, with `low <= high`.
/// A NaN scroll position reads as the top.
fn viewport_bounds(scroll_top: f64, container_height: f64, overscan_rows: usize, base_row_height: f64) -> (f64, f64) {
    let scroll_top = if scroll_top.is_nan() { 0.0 } else { scroll_top };
    let overscan = overscan_rows as f64 * base_row_height.max(0.0);
    let low = scroll_top - overscan;
    let high = scroll_top + container_height.max(0.0) + overscan;
    (low, high)
}

/// Compute the window by scanning the display list from the top.
///
/// `start_index` is the first entry whose bottom edge lies below
/// `scroll_top - overscan`. The window ends after the first entry whose bottom
/// edge lies below `scroll_top + container_height + overscan`, or at the end
/// of the list. Negative heights count as zero.
pub fn compute_window<F>(
    rows: &[DisplayRow],
    scroll_top: f64,
    container_height: f64,
    overscan_rows: usize,
    base_row_height: f64,
    row_height_of: F,
) -> Window
where
    F: Fn(&DisplayRow) -> f64,
{
    let (low, high) = viewport_bounds(scroll_top, container_height, overscan_rows, base_row_height);

    let mut accumulated = 0.0;
    let mut start = None;
    let mut end = None;
    let mut row_offsets = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let offset = accumulated;
        accumulated += row_height_of(row).max(0.0);

        if start.is_none() && accumulated > low {
            start = Some(i);
        }
        if start.is_some() && end.is_none() {
            row_offsets.push(offset);
            if accumulated > high {
                end = Some(i + 1);
            }
        }
    }

    let start_index = start.unwrap_or(rows.len());
    let end_index = end.unwrap_or(rows.len());

    Window {
        start_index,
        end_index,
        row_offsets,
        total_height: accumulated,
    }
}

/// Cached prefix sums over a display list's heights.
///
/// Rebuild whenever the display list changes; scroll and resize only need
/// `window`.
#[derive(Debug, Clone, Default)]
pub struct HeightIndex {
    /// `prefix[i]` is the offset of entry `i`; `prefix[len]` is the total height.
    prefix: Vec<f64>,
}

impl HeightIndex {
    pub fn build<F>(rows: &[DisplayRow], row_height_of: F) -> Self
    where
        F: Fn(&DisplayRow) -> f64,
    {
        let mut prefix = Vec::with_capacity(rows.len() + 1);
        let mut accumulated = 0.0;
        prefix.push(accumulated);
        for row in rows {
            accumulated += row_height_of(row).max(0.0);
            prefix.push(accumulated);
        }
        HeightIndex { prefix }
    }

    pub fn len(&self) -> usize {
        self.prefix.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_height(&self) -> f64 {
        self.prefix.last().copied().unwrap_or(0.0)
    }

    /// Absolute top of entry `index`; `offset_at(len)` is the total height.
    pub fn offset_at(&self, index: usize) -> Option<f64> {
        self.prefix.get(index).copied()
    }

    /// Index of the entry covering vertical position `y`, if any.
    pub fn index_at(&self, y: f64) -> Option<usize> {
        let i = self.first_bottom_above(y);
        (i < self.len()).then_some(i)
    }

    // First entry whose bottom edge is strictly greater than `y`.
    fn first_bottom_above(&self, y: f64) -> usize {
        match self.prefix.get(1..) {
            Some(bottoms) => bottoms.partition_point(|&bottom| bottom <= y),
            None => 0,
        }
    }

    /// Same result as `compute_window` over the indexed display list.
    pub fn window(&self, scroll_top: f64, container_height: f64, overscan_rows: usize, base_row_height: f64) -> Window {
        let len = self.len();
        let (low, high) = viewport_bounds(scroll_top, container_height, overscan_rows, base_row_height);

        let start_index = self.first_bottom_above(low);
        let last = self.first_bottom_above(high);
        let end_index = (if last < len { last + 1 } else { len }).max(start_index);

        Window {
            start_index,
            end_index,
            row_offsets: self.prefix[start_index..end_index].to_vec(),
            total_height: self.total_height(),
        }
    }
}

/// Window for a list of uniform rows, using division instead of a scan:
/// `floor(top / h) - overscan .. ceil((top + height) / h) + overscan`.
///
/// Only valid when every entry has height `row_height`, i.e. without group
/// headers of a different height.
pub fn fixed_window(len: usize, scroll_top: f64, container_height: f64, overscan_rows: usize, row_height: f64) -> Window {
    if row_height.is_nan() || row_height <= 0.0 || len == 0 {
        return Window {
            start_index: 0,
            end_index: 0,
            row_offsets: Vec::new(),
            total_height: 0.0,
        };
    }

    let first = (scroll_top / row_height).floor().max(0.0) as usize;
    let start_index = first.saturating_sub(overscan_rows).min(len);
    let last = ((scroll_top + container_height) / row_height).ceil().max(0.0) as usize;
    let end_index = last.saturating_add(overscan_rows).min(len).max(start_index);

    Window {
        start_index,
        end_index,
        row_offsets: (start_index..end_index).map(|i| i as f64 * row_height).collect(),
        total_height: len as f64 * row_height,
    }
}
