//! Table printer
//!
//! Column widths come from the first page of rows ([`PAGE_ROWS`]); later
//! pages reuse them. Projections with `:sort=N` columns buffer every row.
//! Box drawing is used for `[box]`/`[all-box]`, or on a terminal unless
//! `[no-box]` is set.

use super::{Printer, Sink};
use crate::error::Result;
use crate::projection::{cell_text, Align, Column, Projection};
use serde_json::Value;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Rows sampled for column widths before output starts
pub const PAGE_ROWS: usize = 500;

/// Wrap width for `:wrap` columns without `:width=N`
const DEFAULT_WRAP_WIDTH: usize = 40;

const SEPARATOR: &str = "  ";

struct BoxChars {
    horizontal: &'static str,
    vertical: &'static str,
    top: [&'static str; 3],
    middle: [&'static str; 3],
    bottom: [&'static str; 3],
}

const UNICODE_BOX: BoxChars = BoxChars {
    horizontal: "─",
    vertical: "│",
    top: ["┌", "┬", "┐"],
    middle: ["├", "┼", "┤"],
    bottom: ["└", "┴", "┘"],
};

const ASCII_BOX: BoxChars = BoxChars {
    horizontal: "-",
    vertical: "|",
    top: ["+", "+", "+"],
    middle: ["+", "+", "+"],
    bottom: ["+", "+", "+"],
};

struct Layout {
    /// Indexes of the columns shown
    visible: Vec<usize>,
    widths: Vec<usize>,
}

pub struct TablePrinter {
    projection: Projection,
    sink: Sink,
    rows: Vec<Vec<Value>>,
    layout: Option<Layout>,
    buffer_all: bool,
    boxed: bool,
    all_box: bool,
    ascii: bool,
}

impl TablePrinter {
    pub fn new(mut projection: Projection, sink: Sink) -> Self {
        if projection.columns.is_empty() {
            // One unlabeled cell per resource
            projection.columns.push(Column::default());
            projection.attrs.push(("no-heading".to_string(), None));
        }
        let all_box = projection.has_attr("all-box");
        let boxed = if projection.has_attr("box") || all_box {
            true
        } else if projection.has_attr("no-box") {
            false
        } else {
            sink.is_terminal()
        };
        let ascii = projection.has_attr("ascii");
        let buffer_all = projection.columns.iter().any(|c| c.sort.is_some());
        Self {
            projection,
            sink,
            rows: Vec::new(),
            layout: None,
            buffer_all,
            boxed,
            all_box,
            ascii,
        }
    }

    fn chars(&self) -> &'static BoxChars {
        if self.ascii {
            &ASCII_BOX
        } else {
            &UNICODE_BOX
        }
    }

    fn wrap_width(&self, index: usize) -> Option<usize> {
        let column = &self.projection.columns[index];
        column
            .wrap
            .then(|| column.width.unwrap_or(DEFAULT_WRAP_WIDTH).max(1))
    }

    /// Lines of one cell after wrapping
    fn cell_lines(&self, index: usize, value: &Value) -> Vec<String> {
        let text = cell_text(value);
        let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        match self.wrap_width(index) {
            Some(width) => lines.iter().flat_map(|l| wrap(l, width)).collect(),
            None => lines,
        }
    }

    fn compute_layout(&self, rendered: &[Vec<Vec<String>>]) -> Layout {
        let columns = &self.projection.columns;
        let visible: Vec<usize> = (0..columns.len())
            .filter(|&i| {
                !columns[i].optional
                    || rendered
                        .iter()
                        .any(|row| row[i].iter().any(|line| !line.is_empty()))
            })
            .collect();

        let headings = self.projection.headings();
        let show_heading = !self.projection.has_attr("no-heading");
        let widths = visible
            .iter()
            .map(|&i| {
                let mut width = if show_heading { headings[i].width() } else { 0 };
                for row in rendered {
                    for line in &row[i] {
                        width = width.max(line.width());
                    }
                }
                if let Some(wrap) = self.wrap_width(i) {
                    width = width.min(wrap.max(headings[i].width()));
                }
                if let Some(min) = columns[i].width {
                    width = width.max(min);
                }
                width
            })
            .collect();
        Layout { visible, widths }
    }

    fn flush_rows(&mut self) -> Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.rows);
        let rendered: Vec<Vec<Vec<String>>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, v)| self.cell_lines(i, v))
                    .collect()
            })
            .collect();

        let mut out = String::new();
        if self.layout.is_none() {
            let layout = self.compute_layout(&rendered);
            self.write_preamble(&layout, &mut out);
            self.layout = Some(layout);
        }
        if let Some(layout) = &self.layout {
            for (n, row) in rendered.iter().enumerate() {
                if self.boxed && self.all_box && n > 0 {
                    out.push_str(&self.border(layout, &self.chars().middle));
                }
                self.write_row(layout, row, false, &mut out);
            }
        }
        self.sink.write(&out)
    }

    fn write_preamble(&self, layout: &Layout, out: &mut String) {
        let title = self.projection.attr("title").filter(|t| !t.is_empty());
        let show_heading = !self.projection.has_attr("no-heading");
        let headings = self.projection.headings();
        let heading_cells: Vec<Vec<String>> = headings.iter().map(|h| vec![h.clone()]).collect();

        if !self.boxed {
            if let Some(title) = title {
                out.push_str(title);
                out.push('\n');
            }
            if show_heading {
                self.write_row(layout, &heading_cells, true, out);
            }
            return;
        }

        let chars = self.chars();
        if let Some(title) = title {
            let inner: usize = layout.widths.iter().map(|w| w + 3).sum::<usize>().saturating_sub(1);
            out.push_str(&format!(
                "{}{}{}\n",
                chars.top[0],
                chars.horizontal.repeat(inner),
                chars.top[2]
            ));
            out.push_str(&format!(
                "{v}{}{v}\n",
                pad(title, inner, Align::Center),
                v = chars.vertical
            ));
            out.push_str(&self.border(layout, &chars.middle));
        } else {
            out.push_str(&self.border(layout, &chars.top));
        }
        if show_heading {
            self.write_row(layout, &heading_cells, true, out);
            out.push_str(&self.border(layout, &chars.middle));
        }
    }

    fn border(&self, layout: &Layout, corners: &[&str; 3]) -> String {
        let chars = self.chars();
        let segments: Vec<String> = layout
            .widths
            .iter()
            .map(|w| chars.horizontal.repeat(w + 2))
            .collect();
        format!("{}{}{}\n", corners[0], segments.join(corners[1]), corners[2])
    }

    fn write_row(&self, layout: &Layout, cells: &[Vec<String>], heading: bool, out: &mut String) {
        let height = layout
            .visible
            .iter()
            .map(|&i| cells[i].len())
            .max()
            .unwrap_or(1)
            .max(1);
        let columns = &self.projection.columns;

        for line in 0..height {
            let parts: Vec<String> = layout
                .visible
                .iter()
                .zip(&layout.widths)
                .map(|(&i, &width)| {
                    let text = cells[i].get(line).map(String::as_str).unwrap_or_default();
                    let align = if heading && self.boxed {
                        Align::Center
                    } else {
                        columns[i].align
                    };
                    pad(text, width, align)
                })
                .collect();
            if self.boxed {
                let v = self.chars().vertical;
                out.push_str(&format!("{v} {} {v}\n", parts.join(&format!(" {v} "))));
            } else {
                out.push_str(parts.join(SEPARATOR).trim_end());
                out.push('\n');
            }
        }
    }
}

/// Pad `text` to `width` display columns
fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.width());
    match align {
        Align::Left => format!("{text}{}", " ".repeat(fill)),
        Align::Right => format!("{}{text}", " ".repeat(fill)),
        Align::Center => {
            let left = fill / 2;
            format!("{}{text}{}", " ".repeat(left), " ".repeat(fill - left))
        }
    }
}

/// Greedy word wrap to `width` display columns; long words are split
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        loop {
            let sep = usize::from(!current.is_empty());
            if current.width() + sep + word.width() <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(&word);
                break;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            // Word alone is too wide; break it by display width
            let mut head = String::new();
            let mut used = 0;
            let mut rest = word.chars().peekable();
            while let Some(&c) = rest.peek() {
                let w = c.width().unwrap_or(0);
                if used + w > width && !head.is_empty() {
                    break;
                }
                used += w;
                head.push(c);
                rest.next();
            }
            lines.push(head);
            word = rest.collect();
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

impl Printer for TablePrinter {
    fn add_record(&mut self, resource: &Value) -> Result<()> {
        let rows = self.projection.rows(resource);
        self.rows.extend(rows);
        if !self.buffer_all && self.rows.len() >= PAGE_ROWS {
            self.flush_rows()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.buffer_all {
            let mut rows = std::mem::take(&mut self.rows);
            self.projection.sort_rows(&mut rows);
            self.rows = rows;
        }
        self.flush_rows()?;
        if self.boxed {
            if let Some(layout) = &self.layout {
                let bottom = self.border(layout, &self.chars().bottom);
                self.sink.write(&bottom)?;
            }
        }
        Ok(())
    }
}
