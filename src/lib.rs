/*!
# salesgrid

Server-side home for two small retail tools that used to live entirely in
the browser: a 10×5 spreadsheet widget with a formula evaluator and named
save files, and the data layer of a sales-forecast dashboard.

## Modules

- **cell**: grid addressing, cell state, computed values and colors
- **engine**: the formula recalculation engine (bounded fixed-point
  iteration over the grid, no dependency graph)
- **expr**: safe arithmetic expression evaluator used by the engine
- **export**: CSV export/import of raw cell inputs
- **store**: named snapshot persistence (gzip + bincode, keyed by id)
- **dashboard**: forecast service client, request sequencing and the pure
  KPI/table derivations the dashboard renders
- **app**: axum routes tying the pieces together

## Design notes

Recalculation deliberately has no dependency graph: every edit re-derives
the whole grid by repeated evaluation until a fixed point, capped at the
total cell count. Circular references are not flagged; they settle at
whatever the bounded iteration leaves behind. Formulas never execute
arbitrary code: after reference substitution the residue goes through a
small recursive-descent evaluator limited to `+ - * /` and parentheses.
*/

pub mod app;
pub mod cell;
pub mod dashboard;
pub mod engine;
pub mod export;
pub mod expr;
pub mod store;

pub use cell::{Cell, CellColor, CellId, CellValue};
pub use engine::Sheet;
