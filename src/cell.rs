use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid dimensions are fixed: rows 1..=10, columns A..=E.
pub const ROWS: u16 = 10;
pub const COLS: u16 = 5;
pub const COLUMN_LABELS: [char; COLS as usize] = ['A', 'B', 'C', 'D', 'E'];

/// Address of one cell on the fixed grid. `row` is 1-based, `col` is 0-based
/// (index into `COLUMN_LABELS`). Fields stay private so every id in
/// circulation went through the range check.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct CellId {
    row: u16,
    col: u16,
}

impl CellId {
    pub fn new(row: u16, col: u16) -> Option<Self> {
        if (1..=ROWS).contains(&row) && col < COLS {
            Some(CellId { row, col })
        } else {
            None
        }
    }

    /// Parse a cell name like `A1` or `c10`. Column letters are accepted in
    /// either case; anything outside the fixed grid yields `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let col = COLUMN_LABELS.iter().position(|&l| l == letter)? as u16;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let row: u16 = digits.parse().ok()?;
        Self::new(row, col)
    }

    pub fn row(&self) -> u16 {
        self.row
    }

    pub fn col(&self) -> u16 {
        self.col
    }

    pub fn name(&self) -> String {
        format!("{}{}", COLUMN_LABELS[self.col as usize], self.row)
    }

    /// Position in the row-major cell vector.
    pub fn index(&self) -> usize {
        (self.row as usize - 1) * COLS as usize + self.col as usize
    }

    /// All grid addresses in row-major order (A1, B1, .., E1, A2, ..).
    pub fn all() -> impl Iterator<Item = CellId> {
        (1..=ROWS).flat_map(|row| (0..COLS).map(move |col| CellId { row, col }))
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", COLUMN_LABELS[self.col as usize], self.row)
    }
}

/// Computed value of a cell after evaluation. Text cells pass raw input
/// through unchanged; failed evaluations are pinned to `Error` so a bad
/// formula never aborts a recalculation pass.
#[derive(Clone, PartialEq, Debug)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Error,
}

impl CellValue {
    /// Numeric view used when another cell references this one: numbers
    /// stand (NaN reads as 0), text parses fully or reads as 0, errors read
    /// as 0.
    pub fn as_number(&self) -> f64 {
        match self {
            CellValue::Number(n) if !n.is_nan() => *n,
            CellValue::Number(_) => 0.0,
            CellValue::Text(s) => s.trim().parse().unwrap_or(0.0),
            CellValue::Error => 0.0,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Text(s) => f.write_str(s),
            CellValue::Error => f.write_str("#ERROR"),
        }
    }
}

/// Cosmetic cell tag, cycled by the UI (right-click in the browser build).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellColor {
    #[default]
    White,
    Yellow,
    Green,
    Red,
}

impl CellColor {
    pub fn next(self) -> Self {
        match self {
            CellColor::White => CellColor::Yellow,
            CellColor::Yellow => CellColor::Green,
            CellColor::Green => CellColor::Red,
            CellColor::Red => CellColor::White,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Cell {
    /// Text exactly as the user typed it; a leading `=` marks a formula.
    pub raw: String,
    pub value: CellValue,
    pub color: CellColor,
}

impl Cell {
    pub fn empty() -> Self {
        Cell {
            raw: String::new(),
            value: CellValue::Number(0.0),
            color: CellColor::White,
        }
    }

    /// A cell worth persisting: it carries input or a non-default color.
    pub fn is_significant(&self) -> bool {
        !self.raw.is_empty() || self.color != CellColor::White
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_names() {
        assert_eq!(CellId::parse("A1"), CellId::new(1, 0));
        assert_eq!(CellId::parse("E10"), CellId::new(10, 4));
        assert_eq!(CellId::parse("c7"), CellId::new(7, 2));
    }

    #[test]
    fn rejects_out_of_grid_names() {
        assert_eq!(CellId::parse("F1"), None);
        assert_eq!(CellId::parse("A11"), None);
        assert_eq!(CellId::parse("A0"), None);
        assert_eq!(CellId::parse("1A"), None);
        assert_eq!(CellId::parse(""), None);
        assert_eq!(CellId::parse("A"), None);
        assert_eq!(CellId::parse("AB2"), None);
    }

    #[test]
    fn new_rejects_out_of_grid_coordinates() {
        assert_eq!(CellId::new(0, 0), None);
        assert_eq!(CellId::new(ROWS + 1, 0), None);
        assert_eq!(CellId::new(1, COLS), None);
        assert_eq!(CellId::new(99, 9), None);
    }

    #[test]
    fn name_round_trips() {
        for id in CellId::all() {
            assert_eq!(CellId::parse(&id.name()), Some(id));
        }
    }

    #[test]
    fn indexes_are_row_major_and_dense() {
        let indices: Vec<usize> = CellId::all().map(|id| id.index()).collect();
        assert_eq!(indices, (0..(ROWS * COLS) as usize).collect::<Vec<_>>());
    }

    #[test]
    fn numeric_view_of_values() {
        assert_eq!(CellValue::Number(3.5).as_number(), 3.5);
        assert_eq!(CellValue::Number(f64::NAN).as_number(), 0.0);
        assert_eq!(CellValue::Text("12".into()).as_number(), 12.0);
        assert_eq!(CellValue::Text("hello".into()).as_number(), 0.0);
        assert_eq!(CellValue::Error.as_number(), 0.0);
    }

    #[test]
    fn display_drops_trailing_zero_fraction() {
        assert_eq!(CellValue::Number(5.0).to_string(), "5");
        assert_eq!(CellValue::Number(5.5).to_string(), "5.5");
        assert_eq!(CellValue::Error.to_string(), "#ERROR");
    }

    #[test]
    fn color_cycle_wraps() {
        let mut c = CellColor::White;
        for _ in 0..4 {
            c = c.next();
        }
        assert_eq!(c, CellColor::White);
    }
}
