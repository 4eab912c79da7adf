//! CSV export/import of the grid's raw inputs.
//!
//! The layout mirrors what the browser build downloaded: a header line of
//! column letters, then one line per grid row starting with the row
//! number. Fields containing a comma, quote or newline are wrapped in
//! quotes with internal quotes doubled.

use thiserror::Error;

use crate::cell::{CellId, COLS, COLUMN_LABELS};
use crate::engine::Sheet;

#[derive(Error, Debug, PartialEq)]
pub enum CsvError {
    #[error("CSV input is empty")]
    Empty,
    #[error("row {0} does not start with its row number")]
    BadRowLabel(usize),
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render the sheet's raw inputs as CSV.
pub fn to_csv(sheet: &Sheet) -> String {
    let mut out = String::new();

    for letter in COLUMN_LABELS {
        out.push(',');
        out.push(letter);
    }
    out.push('\n');

    for (id, cell) in sheet.iter() {
        if id.col() == 0 {
            out.push_str(&id.row().to_string());
        }
        out.push(',');
        out.push_str(&escape_field(&cell.raw));
        if id.col() == COLS - 1 {
            out.push('\n');
        }
    }

    out
}

/// Split one CSV line into fields, honoring quoting and doubled quotes.
pub fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    fields.push(current);
    fields
}

/// Re-enter exported values into the sheet. The header line and row-number
/// column are skipped; cells beyond the fixed grid are ignored. Recalculates
/// once at the end.
pub fn import_csv(sheet: &mut Sheet, text: &str) -> Result<(), CsvError> {
    let mut lines = text.lines();
    let _header = lines.next().ok_or(CsvError::Empty)?;

    for (line_no, line) in lines.enumerate() {
        if line.is_empty() {
            continue;
        }
        let fields = parse_csv_row(line);
        let row: u16 = fields[0]
            .trim()
            .parse()
            .map_err(|_| CsvError::BadRowLabel(line_no + 2))?;

        for (col, value) in fields.iter().skip(1).enumerate() {
            if let Some(id) = CellId::new(row, col as u16) {
                sheet.cell_mut(id).raw = value.clone();
            }
        }
    }

    sheet.recalculate_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ROWS;

    #[test]
    fn header_and_row_labels() {
        let sheet = Sheet::new();
        let csv = to_csv(&sheet);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 1 + ROWS as usize);
        assert_eq!(lines[0], ",A,B,C,D,E");
        assert!(lines[1].starts_with("1,"));
        assert!(lines[10].starts_with("10,"));
    }

    #[test]
    fn special_characters_are_quoted() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn parse_row_reverses_quoting() {
        assert_eq!(parse_csv_row("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_csv_row("\"a,b\",c"), vec!["a,b", "c"]);
        assert_eq!(parse_csv_row("\"say \"\"hi\"\"\""), vec!["say \"hi\""]);
        assert_eq!(parse_csv_row("x,,y"), vec!["x", "", "y"]);
    }

    #[test]
    fn export_then_import_reproduces_raw_inputs() {
        let mut sheet = Sheet::new();
        sheet.set_cell_input_named("A1", "5").unwrap();
        sheet.set_cell_input_named("B2", "=A1*2").unwrap();
        sheet.set_cell_input_named("C3", "notes, with commas").unwrap();
        sheet.set_cell_input_named("D4", "say \"hi\"").unwrap();

        let csv = to_csv(&sheet);
        let mut restored = Sheet::new();
        import_csv(&mut restored, &csv).unwrap();

        for (id, cell) in sheet.iter() {
            assert_eq!(restored.cell(id).raw, cell.raw, "cell {id}");
            assert_eq!(restored.cell(id).value, cell.value, "cell {id}");
        }
    }

    #[test]
    fn import_rejects_garbage_row_labels() {
        let mut sheet = Sheet::new();
        let err = import_csv(&mut sheet, ",A,B,C,D,E\nnope,1,2,3,4,5\n");
        assert_eq!(err, Err(CsvError::BadRowLabel(2)));
    }

    #[test]
    fn empty_input_is_rejected() {
        let mut sheet = Sheet::new();
        assert_eq!(import_csv(&mut sheet, ""), Err(CsvError::Empty));
    }
}
