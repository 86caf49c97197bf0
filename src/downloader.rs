#![cfg(feature = "web")]

use crate::filter::FilteredView;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("CSV export failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown export format {0:?}; expected csv or xlsx")]
    UnknownFormat(String),
}

/// Download formats offered for a filtered view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn parse(name: &str) -> Result<Self, ExportError> {
        match name.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn render(&self, view: &FilteredView) -> Result<Vec<u8>, ExportError> {
        match self {
            ExportFormat::Csv => to_csv(view).map(String::into_bytes),
            ExportFormat::Xlsx => to_xlsx(view),
        }
    }
}

/// Convert a filtered view to CSV format
///
/// The header row is the index name followed by the view's columns; each
/// following row is a year and its counts.
///
/// # Arguments
/// * `view` - The view to convert
///
/// # Returns
/// * `Result<String, ExportError>` - CSV content as a string or an error
pub fn to_csv(view: &FilteredView) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let mut header = vec![view.index_name.clone()];
    header.extend(view.columns.iter().cloned());
    writer.write_record(&header)?;

    for row in &view.rows {
        let mut record = vec![row.year.to_string()];
        record.extend(row.values.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    // every field written above is valid UTF-8
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Convert a filtered view to XLSX format
///
/// Uses the same layout as [`to_csv`]: one header row, then one row per year.
///
/// # Returns
/// * `Result<Vec<u8>, ExportError>` - XLSX file content as bytes or an error
pub fn to_xlsx(view: &FilteredView) -> Result<Vec<u8>, ExportError> {
    use rust_xlsxwriter::Workbook;

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    worksheet.write_string(0, 0, view.index_name.as_str())?;
    for (c, name) in view.columns.iter().enumerate() {
        worksheet.write_string(0, (c + 1) as u16, name.as_str())?;
    }

    for (r, row) in view.rows.iter().enumerate() {
        let excel_row = (r + 1) as u32;
        worksheet.write_number(excel_row, 0, row.year as f64)?;
        for (c, value) in row.values.iter().enumerate() {
            worksheet.write_number(excel_row, (c + 1) as u16, *value as f64)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}
