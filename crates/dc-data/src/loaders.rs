use csv::ReaderBuilder;
use dc_types::{DataError, DcResult, Frame, Value};

use crate::remote::RemoteStore;

/// CSV loader for sensor log files
#[derive(Debug, Clone, Copy)]
pub struct CsvLoader {
    delimiter: u8,
}

impl CsvLoader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Download one remote file and parse it.
    pub async fn fetch_csv(&self, store: &dyn RemoteStore, path: &str) -> DcResult<Frame> {
        let bytes = store.download(path).await?;
        tracing::debug!(path, bytes = bytes.len(), "Downloaded CSV file");
        self.parse_csv(&bytes)
    }

    /// Parse CSV bytes with a header row into a [`Frame`].
    pub fn parse_csv(&self, bytes: &[u8]) -> DcResult<Frame> {
        let text = decode_utf8_dropping_invalid(bytes);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| DataError::ParseError {
                message: format!("Failed to read CSV headers: {}", e),
            })?
            .clone();

        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(DataError::ParseError {
                message: "No columns to parse from file".to_string(),
            }
            .into());
        }

        let mut frame = Frame::new(headers.iter().map(str::to_string));

        for (line_num, result) in reader.records().enumerate() {
            let record = result.map_err(|e| DataError::ParseError {
                message: format!("Failed to read CSV record at line {}: {}", line_num + 2, e),
            })?;

            if record.len() > headers.len() {
                return Err(DataError::ParseError {
                    message: format!(
                        "Expected {} fields in line {}, saw {}",
                        headers.len(),
                        line_num + 2,
                        record.len()
                    ),
                }
                .into());
            }

            frame.push_row(record.iter().map(Value::parse_cell).collect());
        }

        Ok(frame)
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode UTF-8, silently dropping invalid byte sequences and a leading BOM.
pub fn decode_utf8_dropping_invalid(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }

    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}
