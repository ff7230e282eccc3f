//! Tabular in-memory representation of downloaded CSV content.

use std::fmt;

use crate::error::{DriveError, Result};

/// A parsed CSV file: header columns plus string-valued rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Decode raw downloaded bytes as UTF-8 CSV with a header row.
    ///
    /// Fails with [`DriveError::Parse`] on non-UTF-8 input, on a body with no
    /// header row, and on rows whose field count differs from the header.
    pub fn from_csv(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DriveError::Parse(format!("content is not valid UTF-8: {}", e)))?;

        let mut reader = csv::Reader::from_reader(text.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| DriveError::Parse(format!("invalid header row: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| DriveError::Parse(format!("invalid record: {}", e)))?;
            rows.push(record.iter().map(|field| field.to_string()).collect());
        }

        if columns.is_empty() && rows.is_empty() {
            return Err(DriveError::Parse("no header row to infer columns from".to_string()));
        }

        Ok(Self { columns, rows })
    }

    /// Column names from the header row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data rows, in file order.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// (rows, columns) dimensions.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    /// All values of the named column, or `None` if it does not exist.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[index].as_str()).collect())
    }
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            writeln!(f, "{}", row.join("\t"))?;
        }
        Ok(())
    }
}
