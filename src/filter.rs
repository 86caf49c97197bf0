use crate::error::RangeError;
use crate::table::{Table, YearRange};
use serde::Serialize;

/// One row of a filtered view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ViewRow {
    pub year: i64,
    pub values: Vec<i64>,
}

/// A read-only slice of a [`Table`]: a year range and an ordered set of columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilteredView {
    pub index_name: String,
    pub range: YearRange,
    pub columns: Vec<String>,
    pub rows: Vec<ViewRow>,
}

impl FilteredView {
    /// A view with no columns has nothing to chart.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }

    pub fn years(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.year).collect()
    }

    /// `(year, value)` points of one column, in year order.
    pub fn series(&self, column: usize) -> Vec<(i64, i64)> {
        self.rows
            .iter()
            .filter_map(|r| r.values.get(column).map(|v| (r.year, *v)))
            .collect()
    }
}

/// Slice `table` down to `range` (inclusive) and `columns` (in the given order).
///
/// Rows come back in ascending year order. Rows whose year failed to parse are
/// never included. Repeated column names are kept once, at their first position.
/// An empty `columns` list gives an empty view rather than an error.
pub fn filter(
    table: &Table,
    range: YearRange,
    columns: &[String],
) -> Result<FilteredView, RangeError> {
    if range.start >= range.end {
        return Err(RangeError::Inverted {
            start: range.start,
            end: range.end,
        });
    }

    let mut names: Vec<String> = Vec::with_capacity(columns.len());
    let mut positions = Vec::with_capacity(columns.len());
    for name in columns {
        if names.contains(name) {
            continue;
        }
        let position = table
            .column_position(name)
            .ok_or_else(|| RangeError::UnknownColumn(name.clone()))?;
        names.push(name.clone());
        positions.push(position);
    }

    let mut rows: Vec<ViewRow> = table
        .rows()
        .iter()
        .filter_map(|row| {
            let year = row.year.filter(|y| range.contains(*y))?;
            Some(ViewRow {
                year,
                values: positions.iter().map(|&p| row.values[p]).collect(),
            })
        })
        .collect();
    // stable: rows sharing a year keep sheet order
    rows.sort_by_key(|r| r.year);

    Ok(FilteredView {
        index_name: table.index_name().to_string(),
        range,
        columns: names,
        rows,
    })
}

/// The control values a user has set on the report page.
///
/// A selection is built once per request and passed by reference through the
/// pipeline; nothing downstream keeps or mutates it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Occupation chosen in the single-select box; the first column when unset.
    pub occupation: Option<String>,
    /// Occupations chosen in the multi-select box; `None` means "same as `occupation`".
    pub compare: Option<Vec<String>>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// A [`Selection`] checked against a particular table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub occupation: String,
    pub compare: Vec<String>,
    pub range: YearRange,
}

impl Selection {
    /// Apply the control rules: default the occupation, clamp the years,
    /// default the comparison set to the chosen occupation.
    pub fn resolve(&self, table: &Table) -> Result<ResolvedSelection, RangeError> {
        let occupation = match &self.occupation {
            Some(name) => {
                table
                    .column_position(name)
                    .ok_or_else(|| RangeError::UnknownColumn(name.clone()))?;
                name.clone()
            }
            None => table
                .columns()
                .first()
                .cloned()
                .ok_or_else(|| RangeError::UnknownColumn(String::new()))?,
        };

        let bounds = table.year_bounds().ok_or(RangeError::NoYears)?;
        let range = bounds.clamp(self.start, self.end);

        let compare = match &self.compare {
            Some(names) => names.clone(),
            None => vec![occupation.clone()],
        };

        Ok(ResolvedSelection {
            occupation,
            compare,
            range,
        })
    }
}

impl ResolvedSelection {
    /// View of the single chosen occupation.
    pub fn single_view(&self, table: &Table) -> Result<FilteredView, RangeError> {
        filter(table, self.range, std::slice::from_ref(&self.occupation))
    }

    /// View of the comparison occupations; empty when none are selected.
    pub fn compare_view(&self, table: &Table) -> Result<FilteredView, RangeError> {
        filter(table, self.range, &self.compare)
    }
}
