//! CSV <-> `PriceRow` mapping.
//!
//! Every record has five columns: `id, name, category, price, create_date`.
//! On import the `id` column is read and discarded, the database assigns
//! fresh ids. Dates must be written exactly as `YYYY-MM-DD`.

use crate::errors::ServiceError;
use chrono::NaiveDate;
use common::model::price::{PriceRow, CSV_COLUMNS, DATE_FORMAT};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::warn;
use regex::Regex;
use std::io::Read;

/// Two-digit month and day, four-digit year. chrono alone would also accept
/// `2023-1-5`.
const DATE_PATTERN: &str = r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$";

/// Record reader over one CSV member. Field counts are checked per record by
/// `RowParser`, not by the reader, so a bad header cannot poison the rest of
/// the file.
pub fn reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input)
}

/// Consumes the header record of `member`. A header that cannot be read or
/// has the wrong shape is only logged.
pub fn skip_header<R: Read>(reader: &mut csv::Reader<R>, member: &str) {
    let mut header = StringRecord::new();
    match reader.read_record(&mut header) {
        Ok(true) if header.len() == CSV_COLUMNS.len() => {}
        Ok(true) => warn!(
            "{}: header has {} columns, expected {}",
            member,
            header.len(),
            CSV_COLUMNS.len()
        ),
        Ok(false) => warn!("{}: file is empty", member),
        Err(e) => warn!("Cant read first line in {}: {}", member, e),
    }
}

/// Maps a failure of the CSV reader itself. I/O errors come from the
/// decompressor, so they mean a broken archive.
pub fn read_error(error: csv::Error) -> ServiceError {
    let line = error.position().map(|p| p.line()).unwrap_or_default();
    match error.kind() {
        csv::ErrorKind::Io(_) => ServiceError::ArchiveFormat(error.to_string()),
        _ => ServiceError::RowShape {
            line,
            detail: error.to_string(),
        },
    }
}

pub struct RowParser {
    date_re: Regex,
}

impl RowParser {
    pub fn new() -> Result<Self, ServiceError> {
        let date_re = Regex::new(DATE_PATTERN)
            .map_err(|e| ServiceError::Internal(format!("Regex error: {}", e)))?;
        Ok(RowParser { date_re })
    }

    pub fn parse(&self, record: &StringRecord) -> Result<PriceRow, ServiceError> {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.len() != CSV_COLUMNS.len() {
            return Err(ServiceError::RowShape {
                line,
                detail: format!(
                    "expected {} fields, found {}",
                    CSV_COLUMNS.len(),
                    record.len()
                ),
            });
        }

        let price = &record[3];
        if !price.parse::<f64>().is_ok_and(f64::is_finite) {
            return Err(ServiceError::PriceFormat {
                line,
                value: price.to_string(),
            });
        }

        Ok(PriceRow {
            id: None,
            name: record[1].to_string(),
            category: record[2].to_string(),
            price: price.to_string(),
            create_date: self.parse_date(&record[4], line)?,
        })
    }

    fn parse_date(&self, value: &str, line: u64) -> Result<NaiveDate, ServiceError> {
        let invalid = || ServiceError::DateFormat {
            line,
            value: value.to_string(),
        };
        if !self.date_re.is_match(value) {
            return Err(invalid());
        }
        NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())
    }
}

pub fn serialize_row(row: &PriceRow) -> [String; 5] {
    [
        row.id.map(|id| id.to_string()).unwrap_or_default(),
        row.name.clone(),
        row.category.clone(),
        row.price.clone(),
        row.create_date.format(DATE_FORMAT).to_string(),
    ]
}

/// Renders `rows` as a CSV file, header first.
pub fn write_csv(rows: &[PriceRow]) -> Result<Vec<u8>, ServiceError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| ServiceError::Encoding(format!("Cant add header: {}", e)))?;
    for row in rows {
        writer
            .write_record(serialize_row(row))
            .map_err(|e| ServiceError::Encoding(format!("Cant write data to data.csv: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| ServiceError::Encoding(format!("Error flushing data to data.csv: {}", e)))
}
