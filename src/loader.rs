use crate::error::IngestionError;
use crate::table::{CoercionReport, Row, Table, dedupe_column_names};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use log::{debug, info};
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Seek};

/// Leading bytes of a ZIP archive, the container of `.xlsx` workbooks.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// Leading bytes of an OLE compound file, the container of legacy `.xls` workbooks.
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Container formats accepted for upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkbookFormat {
    Xlsx,
    Xls,
}

impl WorkbookFormat {
    /// Detect the container from its magic bytes.
    ///
    /// The uploaded file name is not trusted; a renamed CSV is rejected here
    /// rather than failing somewhere inside the workbook parser.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(ZIP_MAGIC) {
            Some(WorkbookFormat::Xlsx)
        } else if bytes.starts_with(CFB_MAGIC) {
            Some(WorkbookFormat::Xls)
        } else {
            None
        }
    }
}

/// Load an uploaded workbook into a [`Table`]
///
/// The first worksheet is read. Its first row holds the column headers, and
/// its first column holds the year index; every other cell is a count.
///
/// # Arguments
/// * `bytes` - Raw contents of the uploaded file
/// * `file_name` - Name the file was uploaded under, used in messages only
///
/// # Returns
/// * `Result<Table, IngestionError>` - The loaded table or the reason it was rejected
///
/// # Coercion
/// * Years that are not numeric are kept as unindexed rows
/// * Counts that are blank or not numeric become zero
/// * Fractional numbers are truncated toward zero
pub fn load_workbook(bytes: &[u8], file_name: &str) -> Result<Table, IngestionError> {
    if bytes.is_empty() {
        return Err(IngestionError::Empty);
    }

    let format = WorkbookFormat::sniff(bytes).ok_or_else(|| IngestionError::UnrecognizedFormat {
        file_name: file_name.to_string(),
    })?;
    debug!("reading {} as {:?}", file_name, format);

    let cursor = Cursor::new(bytes);
    let range = match format {
        WorkbookFormat::Xlsx => {
            let workbook: Xlsx<_> =
                Xlsx::new(cursor).map_err(|e| workbook_error(file_name, e))?;
            first_worksheet(workbook, file_name)?
        }
        WorkbookFormat::Xls => {
            let workbook: Xls<_> = Xls::new(cursor).map_err(|e| workbook_error(file_name, e))?;
            first_worksheet(workbook, file_name)?
        }
    };

    let table = table_from_range(&range, file_name)?;
    info!(
        "loaded {}: {} occupations, {} rows, {} cells coerced to zero",
        file_name,
        table.columns().len(),
        table.rows().len(),
        table.coercion().zeroed_cells()
    );
    Ok(table)
}

fn workbook_error(file_name: &str, e: impl std::fmt::Display) -> IngestionError {
    IngestionError::Workbook {
        file_name: file_name.to_string(),
        reason: e.to_string(),
    }
}

fn first_worksheet<RS, R>(mut workbook: R, file_name: &str) -> Result<Range<Data>, IngestionError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestionError::NoWorksheet {
            file_name: file_name.to_string(),
        })?
        .map_err(|e| workbook_error(file_name, e))
}

/// Convert a worksheet range into a table.
pub fn table_from_range(range: &Range<Data>, file_name: &str) -> Result<Table, IngestionError> {
    let missing_header = || IngestionError::MissingHeader {
        file_name: file_name.to_string(),
    };

    let mut rows = range.rows();
    let header = rows.next().ok_or_else(missing_header)?;
    if header.len() < 2 || header.iter().all(is_blank) {
        return Err(missing_header());
    }

    let index_name = header_name(&header[0], 0);
    let columns = dedupe_column_names(
        header[1..]
            .iter()
            .enumerate()
            .map(|(i, cell)| header_name(cell, i + 1))
            .collect(),
    );

    let mut coercion = CoercionReport::default();
    let mut table_rows = Vec::new();

    for cells in rows {
        if cells.iter().all(is_blank) {
            continue;
        }

        let year = cells.first().and_then(coerce_number);
        if year.is_none() {
            coercion.unindexed_rows += 1;
        }

        let mut values = Vec::with_capacity(columns.len());
        for c in 1..=columns.len() {
            let cell = cells.get(c).unwrap_or(&Data::Empty);
            match coerce_number(cell) {
                Some(n) => values.push(n),
                None => {
                    if is_blank(cell) {
                        coercion.blank_cells += 1;
                    } else {
                        coercion.non_numeric_cells += 1;
                    }
                    values.push(0);
                }
            }
        }

        table_rows.push(Row { year, values });
    }

    let distinct: BTreeSet<i64> = table_rows.iter().filter_map(|r| r.year).collect();
    if distinct.len() < 2 {
        return Err(IngestionError::TooFewYears {
            found: distinct.len(),
        });
    }

    Ok(Table::new(index_name, columns, table_rows, coercion))
}

/// Numeric value of a cell, truncated to an integer.
///
/// Text is trimmed and parsed as an integer, then as a decimal number.
/// Booleans count as 0 or 1. Blanks, errors, dates and any other text give `None`.
pub fn coerce_number(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(i) => Some(*i),
        Data::Float(f) => truncate(*f),
        Data::Bool(b) => Some(i64::from(*b)),
        Data::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn truncate(f: f64) -> Option<i64> {
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn header_name(cell: &Data, position: usize) -> String {
    match cell {
        Data::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
        c if is_blank(c) => format!("Unnamed: {}", position),
        Data::String(s) => s.trim().to_string(),
        c => c.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    fn grid(rows: Vec<Vec<Data>>) -> Range<Data> {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in rows.into_iter().enumerate() {
            for (c, cell) in row.into_iter().enumerate() {
                range.set_value((r as u32, c as u32), cell);
            }
        }
        range
    }

    #[test]
    fn coerces_every_cell_kind() {
        assert_eq!(coerce_number(&Data::Int(12)), Some(12));
        assert_eq!(coerce_number(&Data::Float(12.9)), Some(12));
        assert_eq!(coerce_number(&Data::Float(-3.7)), Some(-3));
        assert_eq!(coerce_number(&Data::Float(f64::NAN)), None);
        assert_eq!(coerce_number(&Data::Bool(true)), Some(1));
        assert_eq!(coerce_number(&s(" 2019 ")), Some(2019));
        assert_eq!(coerce_number(&s("15.0")), Some(15));
        assert_eq!(coerce_number(&s("n/a")), None);
        assert_eq!(coerce_number(&s("1,234")), None);
        assert_eq!(coerce_number(&Data::Empty), None);
    }

    fn record(out: &mut Vec<u8>, typ: u16, data: &[u8]) {
        out.extend_from_slice(&typ.to_le_bytes());
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(data);
    }

    fn bof(kind: u16) -> Vec<u8> {
        let mut data = vec![0u8; 16];
        data[0..2].copy_from_slice(&0x0600u16.to_le_bytes());
        data[2..4].copy_from_slice(&kind.to_le_bytes());
        data
    }

    fn directory_entry(name: &str, kind: u8, child: u32, start: u32, size: u32) -> Vec<u8> {
        let mut entry = vec![0u8; 128];
        let utf16: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
        entry[..utf16.len()].copy_from_slice(&utf16);
        entry[64..66].copy_from_slice(&((utf16.len() + 2) as u16).to_le_bytes());
        entry[66] = kind;
        entry[68..72].copy_from_slice(&u32::MAX.to_le_bytes());
        entry[72..76].copy_from_slice(&u32::MAX.to_le_bytes());
        entry[76..80].copy_from_slice(&child.to_le_bytes());
        entry[116..120].copy_from_slice(&start.to_le_bytes());
        entry[120..124].copy_from_slice(&size.to_le_bytes());
        entry
    }

    /// A BIFF8 workbook with one sheet of LABEL and NUMBER records, stored in
    /// a version 3 compound file with 512-byte sectors. The `Workbook` stream
    /// is padded to 4096 bytes so it lives in regular sectors.
    fn xls_workbook(header: &[&str], rows: &[(i64, &[i64])]) -> Vec<u8> {
        const SECTOR: usize = 512;
        const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
        const FAT_SECTOR: u32 = 0xFFFF_FFFD;
        const FREE: u32 = 0xFFFF_FFFF;
        let sheet_name = b"Sheet1";

        let mut stream = Vec::new();
        record(&mut stream, 0x0809, &bof(0x0005));
        // BOUNDSHEET record (4 + 8 + name) and the globals EOF (4) come before the sheet
        let sheet_offset = stream.len() + 12 + sheet_name.len() + 4;
        let mut boundsheet = (sheet_offset as u32).to_le_bytes().to_vec();
        boundsheet.extend_from_slice(&[0, 0, sheet_name.len() as u8, 0]);
        boundsheet.extend_from_slice(sheet_name);
        record(&mut stream, 0x0085, &boundsheet);
        record(&mut stream, 0x000A, &[]);
        assert_eq!(stream.len(), sheet_offset);

        record(&mut stream, 0x0809, &bof(0x0010));
        for (c, name) in header.iter().enumerate() {
            let mut label = Vec::new();
            label.extend_from_slice(&0u16.to_le_bytes());
            label.extend_from_slice(&(c as u16).to_le_bytes());
            label.extend_from_slice(&0u16.to_le_bytes());
            label.extend_from_slice(&(name.len() as u16).to_le_bytes());
            label.push(0);
            label.extend_from_slice(name.as_bytes());
            record(&mut stream, 0x0204, &label);
        }
        for (r, (year, values)) in rows.iter().enumerate() {
            let cells = std::iter::once(*year).chain(values.iter().copied());
            for (c, value) in cells.enumerate() {
                let mut number = Vec::new();
                number.extend_from_slice(&((r + 1) as u16).to_le_bytes());
                number.extend_from_slice(&(c as u16).to_le_bytes());
                number.extend_from_slice(&0u16.to_le_bytes());
                number.extend_from_slice(&(value as f64).to_le_bytes());
                record(&mut stream, 0x0203, &number);
            }
        }
        record(&mut stream, 0x000A, &[]);
        assert!(stream.len() <= 4096);
        stream.resize(4096, 0);
        let stream_sectors = stream.len() / SECTOR;

        let mut file = vec![0u8; SECTOR];
        file[0..8].copy_from_slice(CFB_MAGIC);
        file[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
        file[26..28].copy_from_slice(&3u16.to_le_bytes());
        file[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
        file[30..32].copy_from_slice(&9u16.to_le_bytes());
        file[32..34].copy_from_slice(&6u16.to_le_bytes());
        file[44..48].copy_from_slice(&1u32.to_le_bytes());
        file[48..52].copy_from_slice(&1u32.to_le_bytes());
        file[56..60].copy_from_slice(&4096u32.to_le_bytes());
        file[60..64].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        file[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        file[76..80].copy_from_slice(&0u32.to_le_bytes());
        for slot in file[80..].chunks_mut(4) {
            slot.copy_from_slice(&FREE.to_le_bytes());
        }

        // sector 0: FAT, sector 1: directory, sectors 2..: Workbook stream
        let mut fat = vec![FREE; SECTOR / 4];
        fat[0] = FAT_SECTOR;
        fat[1] = END_OF_CHAIN;
        for i in 0..stream_sectors {
            fat[2 + i] = if i + 1 == stream_sectors {
                END_OF_CHAIN
            } else {
                (3 + i) as u32
            };
        }
        file.extend(fat.iter().flat_map(|id| id.to_le_bytes()));

        file.extend(directory_entry("Root Entry", 5, 1, END_OF_CHAIN, 0));
        file.extend(directory_entry("Workbook", 2, FREE, 2, stream.len() as u32));
        file.extend(vec![0u8; 2 * 128]);

        file.extend(stream);
        file
    }

    #[test]
    fn reads_legacy_xls_workbooks() {
        let bytes = xls_workbook(
            &["year", "Nurse", "Teacher"],
            &[(2019, &[10, 30]), (2020, &[12, 31]), (2021, &[0, 29])],
        );
        assert_eq!(WorkbookFormat::sniff(&bytes), Some(WorkbookFormat::Xls));

        let table = load_workbook(&bytes, "jobs.xls").unwrap();
        assert_eq!(table.index_name(), "year");
        assert_eq!(table.columns(), ["Nurse", "Teacher"]);
        let rows: Vec<_> = table
            .rows()
            .iter()
            .map(|r| (r.year, r.values.clone()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (Some(2019), vec![10, 30]),
                (Some(2020), vec![12, 31]),
                (Some(2021), vec![0, 29]),
            ]
        );
        assert_eq!(table.coercion().zeroed_cells(), 0);
    }

    #[test]
    fn truncated_xls_is_a_workbook_error() {
        let bytes = xls_workbook(&["year", "Nurse"], &[(2019, &[1]), (2020, &[2])]);
        assert!(matches!(
            load_workbook(&bytes[..1024], "cut.xls"),
            Err(IngestionError::Workbook { .. })
        ));
    }

    #[test]
    fn sniffs_containers() {
        assert_eq!(
            WorkbookFormat::sniff(b"PK\x03\x04rest"),
            Some(WorkbookFormat::Xlsx)
        );
        assert_eq!(
            WorkbookFormat::sniff(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0]),
            Some(WorkbookFormat::Xls)
        );
        assert_eq!(WorkbookFormat::sniff(b"year,Nurse\n2019,10\n"), None);
    }

    #[test]
    fn rejects_empty_and_foreign_bytes() {
        assert!(matches!(
            load_workbook(&[], "empty.xlsx"),
            Err(IngestionError::Empty)
        ));
        assert!(matches!(
            load_workbook(b"year,Nurse\n2019,10\n", "data.xlsx"),
            Err(IngestionError::UnrecognizedFormat { .. })
        ));
        assert!(matches!(
            load_workbook(b"PK\x03\x04 not really a zip", "broken.xlsx"),
            Err(IngestionError::Workbook { .. })
        ));
    }

    #[test]
    fn builds_table_with_coercion_report() {
        let range = grid(vec![
            vec![s("year"), s("Nurse"), s("Teacher")],
            vec![Data::Float(2019.0), Data::Float(10.0), s("x")],
            vec![Data::Int(2020), Data::Float(12.5), Data::Empty],
            vec![s("total"), Data::Int(22), Data::Int(5)],
            vec![Data::Empty, Data::Empty, Data::Empty],
            vec![s("2021"), Data::Int(0), Data::Int(7)],
        ]);

        let table = table_from_range(&range, "jobs.xlsx").unwrap();
        assert_eq!(table.index_name(), "year");
        assert_eq!(table.columns(), ["Nurse", "Teacher"]);
        assert_eq!(table.rows().len(), 4);
        assert_eq!(table.rows()[0].values, vec![10, 0]);
        assert_eq!(table.rows()[1].values, vec![12, 0]);
        assert_eq!(table.rows()[2].year, None);
        assert_eq!(table.rows()[3].year, Some(2021));

        let report = table.coercion();
        assert_eq!(report.blank_cells, 1);
        assert_eq!(report.non_numeric_cells, 1);
        assert_eq!(report.unindexed_rows, 1);
    }

    #[test]
    fn blank_headers_are_named_by_position() {
        let range = grid(vec![
            vec![Data::Empty, s("Nurse"), Data::Empty, Data::Float(2.0)],
            vec![Data::Int(2019), Data::Int(1), Data::Int(2), Data::Int(3)],
            vec![Data::Int(2020), Data::Int(1), Data::Int(2), Data::Int(3)],
        ]);

        let table = table_from_range(&range, "jobs.xlsx").unwrap();
        assert_eq!(table.index_name(), "Unnamed: 0");
        assert_eq!(table.columns(), ["Nurse", "Unnamed: 2", "2"]);
    }

    #[test]
    fn header_without_occupations_is_missing() {
        let range = grid(vec![vec![s("year")], vec![Data::Int(2019)]]);
        assert!(matches!(
            table_from_range(&range, "jobs.xlsx"),
            Err(IngestionError::MissingHeader { .. })
        ));
    }

    #[test]
    fn single_year_is_rejected() {
        let range = grid(vec![
            vec![s("year"), s("Nurse")],
            vec![Data::Int(2019), Data::Int(1)],
            vec![s("n/a"), Data::Int(1)],
        ]);
        assert!(matches!(
            table_from_range(&range, "jobs.xlsx"),
            Err(IngestionError::TooFewYears { found: 1 })
        ));
    }
}
