use serde::Serialize;
use std::collections::BTreeSet;

/// Counts of values that did not survive numeric coercion.
///
/// Blank and non-numeric count cells are stored as zero, so a zero in the
/// table can mean either "zero people" or "no data". The report keeps both
/// counts here so the page can say how much of the grid was filled in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CoercionReport {
    /// Count cells that were empty.
    pub blank_cells: usize,
    /// Count cells holding text (or other values) that do not parse as numbers.
    pub non_numeric_cells: usize,
    /// Rows whose year did not parse; they never appear in a filtered view.
    pub unindexed_rows: usize,
}

impl CoercionReport {
    pub fn zeroed_cells(&self) -> usize {
        self.blank_cells + self.non_numeric_cells
    }
}

/// One data row: a year index and one count per column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Row {
    /// `None` when the index cell failed numeric coercion.
    pub year: Option<i64>,
    pub values: Vec<i64>,
}

/// Smallest and largest numeric year in a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct YearBounds {
    pub min: i64,
    pub max: i64,
}

/// An inclusive `[start, end]` year range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct YearRange {
    pub start: i64,
    pub end: i64,
}

impl YearRange {
    pub fn contains(&self, year: i64) -> bool {
        self.start <= year && year <= self.end
    }
}

impl YearBounds {
    /// Resolve slider values the way the report's controls constrain them.
    ///
    /// The start slider runs from `min` to `max - 1` and defaults to `min`.
    /// The end slider's minimum follows the start (`start + 1`), runs up to
    /// `max` and defaults to `max`. Any requested value outside those limits
    /// is pulled back inside, so the result always has `start < end`.
    pub fn clamp(&self, start: Option<i64>, end: Option<i64>) -> YearRange {
        let last_start = (self.max - 1).max(self.min);
        let start = start.unwrap_or(self.min).clamp(self.min, last_start);
        let end = end.unwrap_or(self.max).clamp(start + 1, self.max.max(start + 1));
        YearRange { start, end }
    }

    pub fn full_range(&self) -> YearRange {
        YearRange {
            start: self.min,
            end: self.max,
        }
    }
}

/// A year-indexed grid of occupation counts, as read from one upload.
///
/// Tables are immutable once built; filtering produces a separate
/// [`FilteredView`](crate::filter::FilteredView).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Table {
    index_name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
    coercion: CoercionReport,
}

impl Table {
    /// Build a table. Every row must carry exactly one value per column.
    pub fn new(
        index_name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Row>,
        coercion: CoercionReport,
    ) -> Self {
        debug_assert!(rows.iter().all(|r| r.values.len() == columns.len()));
        Table {
            index_name: index_name.into(),
            columns,
            rows,
            coercion,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn coercion(&self) -> CoercionReport {
        self.coercion
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Distinct numeric years, ascending.
    pub fn years(&self) -> BTreeSet<i64> {
        self.rows.iter().filter_map(|r| r.year).collect()
    }

    /// `None` when the table has no numeric year at all.
    pub fn year_bounds(&self) -> Option<YearBounds> {
        let years = self.years();
        let min = *years.first()?;
        let max = *years.last()?;
        Some(YearBounds { min, max })
    }
}

/// Make column names unique the way spreadsheet readers usually do:
/// the second `Nurse` becomes `Nurse.1`, the third `Nurse.2`, and so on.
pub fn dedupe_column_names(names: Vec<String>) -> Vec<String> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", name, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        result.push(candidate);
    }

    result
}
