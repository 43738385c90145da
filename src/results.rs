//! Streaming reader for the gzip-compressed CSV results of an alert
//!
//! The header row names the columns; every following record becomes one
//! [`Row`]. Records are decoded lazily, one at a time. Files made of several
//! concatenated gzip members are read to the end of the last member.

use crate::error::ResultsError;
use crate::events::Row;
use csv::{ErrorKind, StringRecord};
use flate2::read::MultiGzDecoder;
use log::{debug, warn};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Lazily yields the rows of a results file
pub struct ResultsReader {
    path: PathBuf,
    reader: csv::Reader<MultiGzDecoder<File>>,
    headers: StringRecord,
    record: StringRecord,
    /// Set after end of input or an I/O failure
    done: bool,
}

impl ResultsReader {
    /// Open a results file and read its header row
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::Missing` if the path does not exist and
    /// `ResultsError::Unreadable` if it cannot be opened or decompressed.
    pub fn open(path: &Path) -> Result<Self, ResultsError> {
        if !path.exists() {
            return Err(ResultsError::Missing(path.display().to_string()));
        }

        let file = File::open(path)
            .map_err(|e| ResultsError::Unreadable(format!("{}: {}", path.display(), e)))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(MultiGzDecoder::new(file));

        let headers = reader
            .headers()
            .map_err(|e| ResultsError::Unreadable(format!("{}: {}", path.display(), e)))?
            .clone();

        debug!(
            "Opened results file {} with {} columns",
            path.display(),
            headers.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
            record: StringRecord::new(),
            done: false,
        })
    }

    /// Column names from the header row
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter()
    }
}

impl Iterator for ResultsReader {
    type Item = Result<Row, ResultsError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {
                    let row = Row::from_columns(self.headers.iter().zip(self.record.iter()));
                    return Some(Ok(row));
                }
                Ok(false) => self.done = true,
                Err(e) => {
                    if let ErrorKind::Io(_) = e.kind() {
                        self.done = true;
                        return Some(Err(ResultsError::Unreadable(format!(
                            "{}: {}",
                            self.path.display(),
                            e
                        ))));
                    }
                    // Structurally bad records only lose themselves
                    warn!("Skipping malformed results record: {}", e);
                }
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub(crate) fn gzip_file(content: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(file.reopen().unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
        file
    }

    /// Gzip file with a valid header whose compressed body is cut in half
    pub(crate) fn truncated_gzip_file() -> NamedTempFile {
        let mut content = String::from("type,value\n");
        // Pseudo-random hashes keep the body from compressing into a few blocks
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..20_000 {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            content.push_str(&format!("md5,{:016x}{:016x}\n", state, state.rotate_left(17)));
        }

        let file = gzip_file(&content);
        let len = file.as_file().metadata().unwrap().len();
        file.as_file().set_len(len / 2).unwrap();
        file
    }

    #[test]
    fn test_reads_rows_in_order() {
        let file = gzip_file(
            "_time,type,value,eventkey,__mv_value\n\
             100,ip-dst,1.2.3.4,A,\n\
             101,domain,evil.test,A,\n",
        );

        let reader = ResultsReader::open(file.path()).unwrap();
        let rows: Vec<Row> = reader.map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value.as_deref(), Some("1.2.3.4"));
        assert_eq!(rows[0].time.as_deref(), Some("100"));
        assert_eq!(rows[1].attr_type.as_deref(), Some("domain"));
        assert_eq!(rows[1].event_key.as_deref(), Some("A"));
    }

    #[test]
    fn test_reads_every_gzip_member() {
        let file = NamedTempFile::new().unwrap();
        let mut out = file.reopen().unwrap();
        for chunk in ["type,value\nmd5,first\n", "sha1,second\n", "sha256,third\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(chunk.as_bytes()).unwrap();
            out.write_all(&encoder.finish().unwrap()).unwrap();
        }
        out.flush().unwrap();

        let reader = ResultsReader::open(file.path()).unwrap();
        let values: Vec<String> = reader
            .map(|r| r.unwrap().value.unwrap_or_default())
            .collect();

        assert_eq!(values, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_truncated_body_is_unreadable() {
        let file = truncated_gzip_file();

        let reader = ResultsReader::open(file.path()).unwrap();
        let items: Vec<Result<Row, ResultsError>> = reader.collect();

        assert!(items.first().map_or(false, |r| r.is_ok()));
        assert!(matches!(
            items.last(),
            Some(Err(ResultsError::Unreadable(_)))
        ));
        // Nothing is yielded after the failure
        assert_eq!(items.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[test]
    fn test_headers_exposed() {
        let file = gzip_file("type,value\nmd5,abc\n");
        let reader = ResultsReader::open(file.path()).unwrap();

        assert_eq!(reader.headers().collect::<Vec<_>>(), vec!["type", "value"]);
    }

    #[test]
    fn test_missing_file() {
        let result = ResultsReader::open(Path::new("/nonexistent/results.csv.gz"));
        assert!(matches!(result, Err(ResultsError::Missing(_))));
    }

    #[test]
    fn test_not_gzip_is_unreadable() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "type,value\nmd5,abc\n").unwrap();
        file.flush().unwrap();

        let result = ResultsReader::open(file.path());
        assert!(matches!(result, Err(ResultsError::Unreadable(_))));
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let file = gzip_file("type,value\nmd5,abc\nonly-one-field\nsha1,def\n");

        let reader = ResultsReader::open(file.path()).unwrap();
        let rows: Vec<Row> = reader.map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value.as_deref(), Some("def"));
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        let file = gzip_file("type,value\n");
        let mut reader = ResultsReader::open(file.path()).unwrap();
        assert!(reader.next().is_none());
    }
}
