//! `spreadsheet-table`: every sheet becomes a titled text grid on landscape A4.
//!
//! Sheets are capped to [`LayoutOptions::max_sheet_rows`] by
//! [`LayoutOptions::max_sheet_columns`] and each cell to
//! [`LayoutOptions::max_sheet_cell_chars`]. Grids wider than a page are split
//! into column bands printed one after another.

use super::layout::{self, PageSize, TextLayout};
use super::ooxml::truncate_cell;
use super::{display_name, render_blocking, BackendAdapter};
use crate::config::LayoutOptions;
use crate::error::AttemptError;
use crate::format::Format;
use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use std::fs::File;
use std::ops::Range;
use std::path::Path;

const SEPARATOR: &str = " | ";

/// Apply the row, column and cell caps to raw sheet rows.
///
/// Returns the capped grid and how many rows were left out.
pub(crate) fn cap_grid<I>(rows: I, options: &LayoutOptions) -> (Vec<Vec<String>>, usize)
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut grid = Vec::new();
    let mut dropped = 0;
    for row in rows {
        if grid.len() == options.max_sheet_rows {
            dropped += 1;
            continue;
        }
        grid.push(
            row.into_iter()
                .take(options.max_sheet_columns)
                .map(|c| truncate_cell(c.trim(), options.max_sheet_cell_chars))
                .collect(),
        );
    }
    (grid, dropped)
}

fn column_widths(grid: &[Vec<String>]) -> Vec<usize> {
    let columns = grid.iter().map(Vec::len).max().unwrap_or(0);
    (0..columns)
        .map(|c| {
            grid.iter()
                .filter_map(|row| row.get(c))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
                .max(1)
        })
        .collect()
}

/// Split columns into consecutive bands whose rendered width fits `max_line`.
pub(crate) fn column_bands(widths: &[usize], max_line: usize) -> Vec<Range<usize>> {
    let mut bands = Vec::new();
    let mut start = 0;
    let mut used = 0;
    for (i, w) in widths.iter().enumerate() {
        let needed = if i == start { *w } else { used + SEPARATOR.len() + w };
        if i > start && needed > max_line {
            bands.push(start..i);
            start = i;
            used = *w;
        } else {
            used = needed;
        }
    }
    if start < widths.len() {
        bands.push(start..widths.len());
    }
    bands
}

fn format_row(row: &[String], widths: &[usize], band: Range<usize>) -> String {
    band.map(|c| {
        let cell = row.get(c).map(String::as_str).unwrap_or("");
        format!("{cell:<width$}", width = widths[c])
    })
    .collect::<Vec<_>>()
    .join(SEPARATOR)
    .trim_end()
    .to_string()
}

/// Spreadsheet-style column name: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub(crate) fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

fn render_sheet(page: &mut TextLayout, name: &str, grid: &[Vec<String>], dropped: usize) {
    page.page_break();
    page.heading(&format!("Sheet: {name}"));
    if grid.iter().all(|row| row.iter().all(String::is_empty)) {
        page.paragraph("(empty sheet)");
        return;
    }
    let widths = column_widths(grid);
    let bands = column_bands(&widths, page.max_mono_chars());
    let banded = bands.len() > 1;
    for band in bands {
        if banded {
            page.paragraph(&format!(
                "Columns {}-{}",
                column_name(band.start),
                column_name(band.end - 1)
            ));
        }
        for row in grid {
            page.mono(&format_row(row, &widths, band.clone()));
        }
        page.gap(8.0);
    }
    if dropped > 0 {
        page.paragraph(&format!("... {dropped} more rows not shown"));
    }
}

fn render(source: &Path, out: &mut File, options: LayoutOptions) -> Result<(), AttemptError> {
    let mut workbook = open_workbook_auto(source)
        .map_err(|e| AttemptError::failed(format!("cannot open workbook: {e}")))?;
    let names = workbook.sheet_names();
    if names.is_empty() {
        return Err(AttemptError::failed("workbook has no sheets"));
    }

    let mut page = TextLayout::new(PageSize::A4.landscape());
    page.title(&display_name(source));
    for name in &names {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| AttemptError::failed(format!("cannot read sheet {name}: {e}")))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(Data::to_string).collect::<Vec<_>>());
        let (grid, dropped) = cap_grid(rows, &options);
        render_sheet(&mut page, name, &grid, dropped);
    }
    layout::save(page.into_pdf(&display_name(source))?, out)
}

/// Renders workbook cell values as text tables.
pub struct SpreadsheetTableAdapter {
    options: LayoutOptions,
}

impl SpreadsheetTableAdapter {
    pub fn new(options: LayoutOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BackendAdapter for SpreadsheetTableAdapter {
    fn name(&self) -> &str {
        "spreadsheet-table"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Spreadsheet]
    }

    async fn invoke(&self, source: &Path, destination: &Path) -> Result<(), AttemptError> {
        let options = self.options;
        render_blocking(source, destination, move |src, out| render(src, out, options)).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::ooxml::test_support::write_package;
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn grid_is_capped() {
        let options = LayoutOptions {
            max_sheet_rows: 2,
            max_sheet_columns: 2,
            max_sheet_cell_chars: 6,
            ..LayoutOptions::default()
        };
        let rows = vec![
            strings(&["a", "b", "c"]),
            strings(&["long value", "x", "y"]),
            strings(&["dropped"]),
            strings(&["dropped"]),
        ];
        let (grid, dropped) = cap_grid(rows, &options);
        assert_eq!(grid, vec![strings(&["a", "b"]), strings(&["lon...", "x"])]);
        assert_eq!(dropped, 2);
    }

    #[test]
    fn default_cap_truncates_to_thirty() {
        let (grid, _) = cap_grid(vec![vec!["x".repeat(40)]], &LayoutOptions::default());
        assert_eq!(grid[0][0].chars().count(), 30);
        assert!(grid[0][0].ends_with("..."));
    }

    #[test]
    fn bands_split_wide_grids() {
        assert_eq!(column_bands(&[5, 5, 5], 100), vec![0..3]);
        // 5 + 3 + 5 = 13 fits, adding another 3 + 5 does not.
        assert_eq!(column_bands(&[5, 5, 5], 13), vec![0..2, 2..3]);
        // A single column wider than the line still gets its own band.
        assert_eq!(column_bands(&[20, 2], 10), vec![0..1, 1..2]);
        assert!(column_bands(&[], 10).is_empty());
    }

    #[test]
    fn rows_are_padded_into_columns() {
        let grid = vec![strings(&["id", "name"]), strings(&["1", "Ada"])];
        let widths = column_widths(&grid);
        assert_eq!(format_row(&grid[0], &widths, 0..2), "id | name");
        assert_eq!(format_row(&grid[1], &widths, 0..2), "1  | Ada");
    }

    #[test]
    fn column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    const NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    fn write_xlsx(path: &Path) {
        let workbook = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="{NS}" xmlns:r="{REL_NS}"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        );
        let rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
        );
        let sheet = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="{NS}"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Region</t></is></c><c r="B1" t="inlineStr"><is><t>Total</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>EMEA</t></is></c><c r="B2"><v>42</v></c></row></sheetData></worksheet>"#
        );
        write_package(
            path,
            &[
                ("xl/workbook.xml", &workbook),
                ("xl/_rels/workbook.xml.rels", &rels),
                ("xl/worksheets/sheet1.xml", &sheet),
            ],
        );
    }

    #[tokio::test]
    async fn converts_minimal_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("sales.xlsx");
        write_xlsx(&src);
        let dest = dir.path().join("sales.pdf");
        SpreadsheetTableAdapter::new(LayoutOptions::default())
            .invoke(&src, &dest)
            .await
            .unwrap();
        assert!(std::fs::metadata(&dest).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn unreadable_workbook_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.xlsx");
        std::fs::write(&src, b"definitely not a workbook").unwrap();
        let dest = dir.path().join("broken.pdf");
        let err = SpreadsheetTableAdapter::new(LayoutOptions::default())
            .invoke(&src, &dest)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot open workbook"));
        assert!(!dest.exists());
    }
}
