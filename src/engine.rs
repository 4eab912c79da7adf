//! Formula recalculation engine over the fixed A1..E10 grid.
//!
//! Inter-cell references are resolved without a dependency graph: a full
//! recalculation repeatedly re-evaluates every cell against the live value
//! table until an iteration changes nothing, capped at `ROWS * COLS`
//! iterations. Circular references are not detected; the bounded loop
//! simply leaves them at whatever value the last iteration produced
//! (mutual references settle at 0).

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::cell::{Cell, CellColor, CellId, CellValue, COLS, ROWS};
use crate::expr;

lazy_static! {
    static ref SUM_REGEX: Regex =
        Regex::new(r"(?i)SUM\(([A-E])(\d+):([A-E])(\d+)\)").unwrap();
    static ref REF_REGEX: Regex = Regex::new(r"(?i)([A-E])(\d+)").unwrap();
}

#[derive(Error, Debug, PartialEq)]
pub enum EngineError {
    #[error("invalid cell id '{0}'")]
    InvalidCellId(String),
}

/// The whole grid state, owned by the engine and mutated only through its
/// methods. The per-cell vector always holds every addressable cell.
#[derive(Clone, Debug)]
pub struct Sheet {
    cells: Vec<Cell>,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Sheet {
    pub fn new() -> Self {
        Sheet {
            cells: (0..(ROWS * COLS) as usize).map(|_| Cell::empty()).collect(),
        }
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id.index()]
    }

    /// All cells paired with their addresses, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        CellId::all().map(move |id| (id, &self.cells[id.index()]))
    }

    /// Numeric value a formula sees when it references `name`. A reference
    /// matching the column/row pattern but falling outside the grid reads
    /// as an empty cell, i.e. 0.
    fn numeric_by_name(&self, name: &str) -> f64 {
        match CellId::parse(name) {
            Some(id) => self.cells[id.index()].value.as_number(),
            None => 0.0,
        }
    }

    /// Store raw input for a cell and re-derive every cell's value.
    pub fn set_cell_input(&mut self, id: CellId, text: &str) {
        self.cells[id.index()].raw = text.to_string();
        self.recalculate_all();
    }

    /// As [`set_cell_input`](Self::set_cell_input) but addressed by name.
    pub fn set_cell_input_named(&mut self, name: &str, text: &str) -> Result<CellId, EngineError> {
        let id = CellId::parse(name).ok_or_else(|| EngineError::InvalidCellId(name.to_string()))?;
        self.set_cell_input(id, text);
        Ok(id)
    }

    pub fn cycle_color(&mut self, id: CellId) -> CellColor {
        let cell = &mut self.cells[id.index()];
        cell.color = cell.color.next();
        cell.color
    }

    /// Reset every cell to empty input and default color.
    pub fn clear_all(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::empty();
        }
        self.recalculate_all();
    }

    /// Evaluate one cell's raw input against the current value table.
    ///
    /// Literals (no leading `=`) parse as numbers or pass through as text.
    /// For formulas, same-column `SUM(range)` patterns are substituted
    /// first, then bare cell references, then the residue is fed to the
    /// safe expression evaluator. A cross-column range substitutes text
    /// the evaluator rejects, so it surfaces as `#ERROR`.
    pub fn evaluate_formula(&self, raw: &str) -> CellValue {
        let Some(body) = raw.strip_prefix('=') else {
            if raw.is_empty() {
                return CellValue::Text(String::new());
            }
            return match raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(raw.to_string()),
            };
        };

        let body = body.trim();

        let after_sums = SUM_REGEX.replace_all(body, |caps: &Captures| {
            let start_col = caps[1].to_ascii_uppercase();
            let end_col = caps[3].to_ascii_uppercase();
            if start_col != end_col {
                return "NaN".to_string();
            }
            let start: u32 = caps[2].parse().unwrap_or(0);
            let end: u32 = caps[4].parse().unwrap_or(0);
            // Rows past the grid always read 0, so the scan stops at the
            // last real row instead of walking the full lexical range.
            let end = end.min(ROWS as u32);
            let mut sum = 0.0;
            for row in start..=end {
                sum += self.numeric_by_name(&format!("{start_col}{row}"));
            }
            format!("{sum}")
        });

        let substituted = REF_REGEX.replace_all(&after_sums, |caps: &Captures| {
            format!("{}", self.numeric_by_name(&caps[0]))
        });

        match expr::eval(&substituted) {
            Ok(n) => CellValue::Number(round_fraction(n)),
            Err(_) => CellValue::Error,
        }
    }

    /// Bounded fixed-point pass: zero every value, then re-evaluate all
    /// cells against the in-place value table until nothing changes or the
    /// iteration budget (total cell count) runs out.
    pub fn recalculate_all(&mut self) {
        let raws: Vec<String> = self.cells.iter().map(|c| c.raw.clone()).collect();

        for cell in &mut self.cells {
            cell.value = CellValue::Number(0.0);
        }

        let budget = (ROWS * COLS) as usize;
        let mut changed = true;
        let mut passes = 0;
        while changed && passes < budget {
            changed = false;
            passes += 1;
            for i in 0..self.cells.len() {
                let next = self.evaluate_formula(&raws[i]);
                if next != self.cells[i].value {
                    self.cells[i].value = next;
                    changed = true;
                }
            }
        }
    }
}

/// Results with a fractional part are rounded to 4 decimal places before
/// being stored; integers and non-finite values stand as-is.
fn round_fraction(n: f64) -> f64 {
    if n.is_finite() && n.fract() != 0.0 {
        (n * 10_000.0).round() / 10_000.0
    } else {
        n
    }
}
