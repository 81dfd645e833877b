//! Tabular result rows and value coercion.
//!
//! A `Row` keeps the column order of the `SELECT` projection that produced it.
//! Mapping functions read cells positionally through the typed accessors below,
//! which never fail loudly: a non-numeric, missing or NULL cell simply yields
//! `None` and the caller skips the corresponding metric update.

use std::fmt;

/// A single scalar value returned by the database.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Converts the cell into a metric value.
    ///
    /// Text is trimmed and parsed as a decimal number. NULL, empty text,
    /// unparseable text and NaN all yield `None`. The only infinite text
    /// values accepted are `Infinity` and `-Infinity`.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Cell::Null => return None,
            Cell::Int(v) => *v as f64,
            Cell::Float(v) => *v,
            Cell::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return None;
                }
                let v = s.parse::<f64>().ok()?;
                if !v.is_finite() && !matches!(s, "Infinity" | "+Infinity" | "-Infinity") {
                    return None;
                }
                v
            }
        };
        if value.is_nan() { None } else { Some(value) }
    }

    /// Renders the cell as a label value. NULL becomes the literal `null`.
    pub fn as_label(&self) -> String {
        match self {
            Cell::Null => "null".to_string(),
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) => format_float(*v),
            Cell::Text(s) => s.clone(),
        }
    }

    /// Returns the text content, if this is a text cell.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.as_label()),
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<i32> for Cell {
    fn from(v: i32) -> Self {
        Cell::Int(v.into())
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Integral floats render without a fractional part (`3.0` -> `"3"`).
fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.0}", v)
    } else {
        v.to_string()
    }
}

/// One result row, in projection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Numeric value of column `index`, or `None` when missing or non-numeric.
    pub fn number(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(Cell::as_number)
    }

    /// Label value of column `index`. Missing columns render as empty.
    pub fn label(&self, index: usize) -> String {
        self.get(index).map(Cell::as_label).unwrap_or_default()
    }
}

impl From<Vec<Cell>> for Row {
    fn from(cells: Vec<Cell>) -> Self {
        Self::new(cells)
    }
}

/// Builds a `Row` from heterogeneous literals, e.g. `row!["dbA", 10, 20]`.
#[macro_export]
macro_rules! row {
    ($($cell:expr),* $(,)?) => {
        $crate::collector::Row::new(vec![$($crate::collector::Cell::from($cell)),*])
    };
}
