//! Row-at-a-time access to the table files of an extracted feed.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{GtfsTable, RawRow};

/// Reads `<root>/<table>.txt` files. Missing files read as empty tables.
#[derive(Debug, Clone)]
pub struct GtfsReader {
    root: PathBuf,
    delimiter: Option<u8>,
}

impl GtfsReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            delimiter: None,
        }
    }

    /// Fixes the delimiter instead of detecting it from each header line.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, table: GtfsTable) -> PathBuf {
        self.root.join(format!("{}.txt", table.name()))
    }

    /// Opens a single pass over `table`. Call again to re-read from the start.
    pub fn read(&self, table: GtfsTable) -> Result<TableRows> {
        let path = self.table_path(table);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(table = %table, "Table file absent, treating as empty");
                return Ok(TableRows::empty(table));
            }
            Err(e) => return Err(e.into()),
        };

        let mut file = BufReader::new(file);
        let delimiter = match self.delimiter {
            Some(delimiter) => delimiter,
            None => sniff_delimiter(&mut file)?,
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(file);
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        debug!(table = %table, path = %path.display(), delimiter = %char::from(delimiter), "Opened table file");

        Ok(TableRows {
            table,
            inner: Some((reader, headers)),
            record: csv::StringRecord::new(),
        })
    }
}

/// Pipe when the header line has pipes but no commas, comma otherwise.
fn sniff_delimiter(file: &mut BufReader<File>) -> Result<u8> {
    let mut header = String::new();
    file.read_line(&mut header)?;
    file.seek(SeekFrom::Start(0))?;
    if !header.contains(',') && header.contains('|') {
        Ok(b'|')
    } else {
        Ok(b',')
    }
}

/// Lazy rows of one table file, in file order.
pub struct TableRows {
    table: GtfsTable,
    inner: Option<(csv::Reader<BufReader<File>>, Vec<String>)>,
    record: csv::StringRecord,
}

impl TableRows {
    fn empty(table: GtfsTable) -> Self {
        Self {
            table,
            inner: None,
            record: csv::StringRecord::new(),
        }
    }

    pub fn table(&self) -> GtfsTable {
        self.table
    }
}

impl Iterator for TableRows {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let (reader, headers) = self.inner.as_mut()?;
        match reader.read_record(&mut self.record) {
            Ok(true) => Some(Ok(headers
                .iter()
                .cloned()
                .zip(self.record.iter().map(str::to_string))
                .collect())),
            Ok(false) => {
                self.inner = None;
                None
            }
            Err(e) => {
                self.inner = None;
                Some(Err(e.into()))
            }
        }
    }
}
