//! Minimal column-aligned tables for `list` output.
#![allow(dead_code)]

use colored::{Color, Colorize};

#[derive(Debug)]
pub struct Cell {
    text: String,
    color: Color,
    bold: bool,
}

impl Cell {
    pub fn new<T: Into<String>>(text: T) -> Self {
        Self {
            text: text.into(),
            color: Color::BrightWhite,
            bold: false,
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn width(&self) -> usize {
        self.text.chars().count()
    }

    fn render(&self, width: usize) -> String {
        let padding = " ".repeat(width.saturating_sub(self.width()));
        let mut text = self.text.as_str().color(self.color);
        if self.bold {
            text = text.bold();
        }
        format!("{}{}", text, padding)
    }
}

pub trait IntoCell {
    fn into_cell(self) -> Cell;
}

impl<T: Into<String>> IntoCell for T {
    fn into_cell(self) -> Cell {
        Cell::new(self)
    }
}

#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<H: IntoCell>(headers: impl IntoIterator<Item = H>) -> Self {
        Self {
            headers: headers
                .into_iter()
                .map(|header| header.into_cell().bold())
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<C: IntoCell>(&mut self, row: impl IntoIterator<Item = C>) {
        self.rows
            .push(row.into_iter().map(IntoCell::into_cell).collect());
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(Cell::width).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i >= widths.len() {
                    widths.push(cell.width());
                } else if cell.width() > widths[i] {
                    widths[i] = cell.width();
                }
            }
        }

        let mut out = String::new();
        render_row(&mut out, &self.headers, &widths);
        for row in &self.rows {
            render_row(&mut out, row, &widths);
        }
        out
    }
}

fn render_row(out: &mut String, row: &[Cell], widths: &[usize]) {
    let rendered: Vec<String> = row
        .iter()
        .enumerate()
        .map(|(i, cell)| cell.render(widths.get(i).copied().unwrap_or(0)))
        .collect();
    out.push_str(rendered.join("  ").trim_end());
    out.push('\n');
}
