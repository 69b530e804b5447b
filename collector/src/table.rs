//! Merged result of a session and its delimited text encoding.
//!
//! Columns keep the order they were inserted in. They are not required to have
//! the same length: a collector that ended early or started late yields a
//! shorter column, and the encoder pads it with empty fields.

use eyre::{
    Context as _,
    Result,
};
use std::{
    fs::{
        self,
        File,
    },
    io::{
        BufWriter,
        Read,
        Write,
    },
    path::Path,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Sampled values, `None` where a fetch produced no data.
    Values(Vec<Option<f64>>),
    /// Pre-formatted timestamps.
    Timestamps(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Values(values) => values.len(),
            ColumnData::Timestamps(times) => times.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text of the cell at `row`, empty for absent values and past the end.
    pub fn cell(&self, row: usize) -> String {
        match self {
            ColumnData::Values(values) => values
                .get(row)
                .copied()
                .flatten()
                .map(|value| value.to_string())
                .unwrap_or_default(),
            ColumnData::Timestamps(times) => times.get(row).cloned().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(thiserror::Error, Debug)]
pub enum TableError {
    #[error("The table has no header row")]
    MissingHeader,
    #[error("Column {0:?} appears more than once in the header")]
    DuplicateColumn(String),
    #[error("Line {line} has an unterminated quoted field")]
    UnterminatedQuote { line: usize },
    #[error("Line {line} has {found} fields, the header has {expected}")]
    FieldCount { line: usize, expected: usize, found: usize },
    #[error("Line {line}, column {column:?}: {value:?} is not a number")]
    InvalidNumber { line: usize, column: String, value: String },
    #[error("Delimiter {0:?} cannot be used, it clashes with quoting or line breaks")]
    InvalidDelimiter(char),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<Column>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value column, replacing an existing column of the same name in place.
    pub fn insert_values(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        self.insert(name.into(), ColumnData::Values(values));
    }

    /// Insert a timestamp column, replacing an existing column of the same name in place.
    pub fn insert_timestamps(&mut self, name: impl Into<String>, times: Vec<String>) {
        self.insert(name.into(), ColumnData::Timestamps(times));
    }

    fn insert(&mut self, name: String, data: ColumnData) {
        match self.columns.iter_mut().find(|column| column.name == name) {
            Some(column) => column.data = data,
            None => self.columns.push(Column { name, data }),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn values(&self, name: &str) -> Option<&[Option<f64>]> {
        match &self.column(name)?.data {
            ColumnData::Values(values) => Some(values),
            ColumnData::Timestamps(_) => None,
        }
    }

    pub fn timestamps(&self, name: &str) -> Option<&[String]> {
        match &self.column(name)?.data {
            ColumnData::Timestamps(times) => Some(times),
            ColumnData::Values(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Length of the longest column.
    pub fn row_count(&self) -> usize {
        self.columns.iter().map(|column| column.data.len()).max().unwrap_or(0)
    }

    /// True when the columns do not all have the same length.
    pub fn is_ragged(&self) -> bool {
        let mut lengths = self.columns.iter().map(|column| column.data.len());
        match lengths.next() {
            Some(first) => lengths.any(|len| len != first),
            None => false,
        }
    }

    /// Encode the table as delimited text: one header row, then one row per index.
    pub fn write_delimited<W: Write>(&self, mut writer: W, delimiter: char) -> Result<(), TableError> {
        check_delimiter(delimiter)?;
        if self.columns.is_empty() {
            return Ok(());
        }

        let header: Vec<String> = self.columns.iter().map(|column| column.name.clone()).collect();
        write_record(&mut writer, &header, delimiter)?;

        for row in 0..self.row_count() {
            let cells: Vec<String> = self.columns.iter().map(|column| column.data.cell(row)).collect();
            write_record(&mut writer, &cells, delimiter)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Parse text produced by [`ResultTable::write_delimited`].
    ///
    /// The column named `time_label` is read back as timestamps, every other
    /// column as optional numbers. Empty cells become absent values, so the
    /// padding of a ragged value column comes back as trailing `None`s.
    pub fn read_delimited<R: Read>(mut reader: R, delimiter: char, time_label: &str) -> Result<Self, TableError> {
        check_delimiter(delimiter)?;
        let mut text = String::new();
        reader.read_to_string(&mut text)?;

        let mut records = split_records(&text, delimiter)?.into_iter();
        let (_, header) = records.next().ok_or(TableError::MissingHeader)?;
        for (idx, name) in header.iter().enumerate() {
            if header[..idx].contains(name) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }

        let mut columns: Vec<Column> = header
            .iter()
            .map(|name| Column {
                name: name.clone(),
                data: if name == time_label {
                    ColumnData::Timestamps(Vec::new())
                } else {
                    ColumnData::Values(Vec::new())
                },
            })
            .collect();

        for (line, fields) in records {
            if fields.len() != columns.len() {
                return Err(TableError::FieldCount {
                    line,
                    expected: columns.len(),
                    found: fields.len(),
                });
            }
            for (column, field) in columns.iter_mut().zip(fields) {
                match &mut column.data {
                    ColumnData::Timestamps(times) => times.push(field),
                    ColumnData::Values(values) if field.is_empty() => values.push(None),
                    ColumnData::Values(values) => {
                        let value = field.parse::<f64>().map_err(|_| TableError::InvalidNumber {
                            line,
                            column: column.name.clone(),
                            value: field.clone(),
                        })?;
                        values.push(Some(value));
                    }
                }
            }
        }

        // A timestamp is never empty, so trailing blanks are ragged padding.
        for column in &mut columns {
            if let ColumnData::Timestamps(times) = &mut column.data {
                while times.last().is_some_and(String::is_empty) {
                    times.pop();
                }
            }
        }

        Ok(Self { columns })
    }

    /// Write the table to `path` through a sibling temporary file, so readers
    /// never observe a half-written output.
    pub fn save(&self, path: &Path, delimiter: char) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("Output path {} has no file name", path.display()))?;
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

        let file = File::create(&tmp_path).wrap_err_with(|| format!("Failed to create {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_delimited(&mut writer, delimiter)
            .wrap_err_with(|| format!("Failed to write {}", tmp_path.display()))?;
        writer
            .into_inner()
            .map_err(|err| err.into_error())
            .and_then(|file| file.sync_all())
            .wrap_err_with(|| format!("Failed to flush {}", tmp_path.display()))?;

        fs::rename(&tmp_path, path)
            .wrap_err_with(|| format!("Failed to move {} to {}", tmp_path.display(), path.display()))?;
        debug!(path = %path.display(), rows = self.row_count(), columns = self.columns.len(), "table saved");
        Ok(())
    }

    pub fn load(path: &Path, delimiter: char, time_label: &str) -> Result<Self> {
        let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
        Self::read_delimited(file, delimiter, time_label).wrap_err_with(|| format!("Failed to parse {}", path.display()))
    }
}

fn check_delimiter(delimiter: char) -> Result<(), TableError> {
    if matches!(delimiter, '"' | '\n' | '\r') {
        return Err(TableError::InvalidDelimiter(delimiter));
    }
    Ok(())
}

fn write_record<W: Write>(writer: &mut W, fields: &[String], delimiter: char) -> std::io::Result<()> {
    // A lone empty field would otherwise be an empty line.
    if fields.len() == 1 && fields[0].is_empty() {
        return writer.write_all(b"\"\"\n");
    }

    let mut line = String::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            line.push(delimiter);
        }
        if field.contains([delimiter, '"', '\n', '\r']) {
            line.push('"');
            line.push_str(&field.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(field);
        }
    }
    line.push('\n');
    writer.write_all(line.as_bytes())
}

/// Split delimited text into records, returning each with its starting line number.
fn split_records(text: &str, delimiter: char) -> Result<Vec<(usize, Vec<String>)>, TableError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push((record_line, std::mem::take(&mut fields)));
                line += 1;
                record_line = line;
            }
            ch if ch == delimiter => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(TableError::UnterminatedQuote { line: record_line });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_line, fields));
    }
    Ok(records)
}
