//! Providers of tabular invoice rows.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::IngestionError;

/// A header row and the data records below it, all as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

/// Anything that can produce the rows of one upload.
pub trait RowSource {
    /// Read the whole table. Errors are fatal for the batch.
    fn read_table(&mut self) -> Result<RowTable, IngestionError>;
}

/// Rows already held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecRowSource {
    table: RowTable,
}

impl VecRowSource {
    pub fn new<H, R, C>(headers: H, records: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            table: RowTable {
                headers: headers.into_iter().map(Into::into).collect(),
                records: records
                    .into_iter()
                    .map(|r| r.into_iter().map(Into::into).collect())
                    .collect(),
            },
        }
    }
}

impl RowSource for VecRowSource {
    fn read_table(&mut self) -> Result<RowTable, IngestionError> {
        Ok(self.table.clone())
    }
}

/// CSV export reader. Records may be shorter than the header row (missing
/// trailing cells read as empty).
pub struct CsvRowSource<R> {
    reader: csv::Reader<R>,
}

impl CsvRowSource<File> {
    pub fn from_path(path: impl AsRef<Path>, delimiter: u8) -> Result<Self, IngestionError> {
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        Ok(Self { reader })
    }
}

impl<R: Read> CsvRowSource<R> {
    pub fn from_reader(reader: R, delimiter: u8) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self { reader }
    }
}

impl<R: Read> RowSource for CsvRowSource<R> {
    fn read_table(&mut self) -> Result<RowTable, IngestionError> {
        let headers = self
            .reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut records = Vec::new();
        for record in self.reader.records() {
            let record = record?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(RowTable { headers, records })
    }
}
