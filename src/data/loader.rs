use crate::data::{CanonicalRecord, CanonicalTable, CombinedDataset, RawTable, RawValue, SourceRows, Value};
use crate::error::{ReconcileError, Result};
use crate::vocabulary::{SemanticType, Vocabulary};
use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, WriterBuilder};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
    /// Excel or OpenDocument workbook
    Workbook,
}

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase());
        let unavailable = |reason: String| ReconcileError::unavailable(path.display().to_string(), reason);

        match (ext.as_deref(), stem.as_deref()) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Err(unavailable("cannot determine format of gzipped file".into()))
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            (Some(ext), _) if WORKBOOK_EXTENSIONS.contains(&ext) => Ok(FileFormat::Workbook),
            (Some("sas7bdat"), _) => Err(unavailable(
                "SAS tables are not read directly; export the table to CSV".into(),
            )),
            _ => Err(unavailable("unsupported file format".into())),
        }
    }

    /// Field delimiter of delimited-text formats
    pub fn delimiter(&self) -> Option<u8> {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => Some(b','),
            FileFormat::Tsv | FileFormat::GzippedTsv => Some(b'\t'),
            FileFormat::Workbook => None,
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Data loader configuration
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Workbook sheet to read (the first sheet when unset)
    pub sheet: Option<String>,
}

/// Reads raw source tables from delimited text and workbooks
#[derive(Default)]
pub struct DataLoader {
    config: LoaderConfig,
}

impl DataLoader {
    /// Create new data loader with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new data loader with custom config
    pub fn with_config(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load a raw table. Missing or unreadable files make the source unavailable.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<RawTable> {
        let path = path.as_ref();
        info!("Loading data from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let table = match format.delimiter() {
            None => self.read_workbook(path)?,
            Some(delimiter) => {
                let file = File::open(path).map_err(|e| {
                    ReconcileError::unavailable(path.display().to_string(), e.to_string())
                })?;
                if format.is_gzipped() {
                    parse_delimited(BufReader::new(GzDecoder::new(file)), delimiter)?
                } else {
                    parse_delimited(BufReader::new(file), delimiter)?
                }
            }
        };

        info!("Loaded {} rows, {} columns", table.len(), table.headers.len());
        Ok(table)
    }

    /// Read one sheet of a workbook; its first row is the header
    fn read_workbook(&self, path: &Path) -> Result<RawTable> {
        let unavailable = |reason: String| ReconcileError::unavailable(path.display().to_string(), reason);

        let mut workbook = open_workbook_auto(path).map_err(|e| unavailable(e.to_string()))?;
        let sheet = match &self.config.sheet {
            Some(sheet) => sheet.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| unavailable("workbook has no sheets".into()))?,
        };
        debug!("Reading sheet '{}'", sheet);

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| unavailable(format!("sheet '{}': {}", sheet, e)))?;
        let mut rows = range.rows();
        let header = rows
            .next()
            .ok_or_else(|| unavailable(format!("sheet '{}' is empty", sheet)))?;

        let mut table = RawTable::new(header.iter().map(|cell| cell.to_string()));
        debug!("Headers: {:?}", table.headers);
        for row in rows {
            table.push_row(row.iter().map(workbook_cell).collect());
        }
        Ok(table)
    }
}

/// Parse a raw table from delimited text. Ragged rows are kept as read.
fn parse_delimited<R: Read>(reader: R, delimiter: u8) -> Result<RawTable> {
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.iter().map(|s| s.to_string());
    let mut table = RawTable::new(headers);
    debug!("Headers: {:?}", table.headers);

    for result in csv_reader.records() {
        let record = result?;
        table.push_row(record.iter().map(RawValue::from_field).collect());
    }

    Ok(table)
}

fn workbook_cell(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Missing,
        Data::Int(v) => RawValue::Number(*v as f64),
        Data::Float(v) => RawValue::Number(*v),
        Data::Bool(v) => RawValue::Number(if *v { 1.0 } else { 0.0 }),
        Data::String(s) => RawValue::from_field(s),
        other => RawValue::from_field(&other.to_string()),
    }
}

/// Write a canonical table as CSV: its columns as header, absent as empty cell
pub fn write_canonical_csv<P: AsRef<Path>>(table: &CanonicalTable, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(&table.columns)?;
    for record in &table.records {
        writer.write_record(
            table
                .columns
                .iter()
                .map(|c| record.get(c).map(|v| v.to_string()).unwrap_or_default()),
        )?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {:?}", table.len(), path);
    Ok(())
}

/// Read a canonical CSV back into a dataset. Cells are parsed according to the
/// declared type of their column; columns missing from the file are absent.
pub fn read_canonical_csv<P: AsRef<Path>>(path: P) -> Result<CombinedDataset> {
    let path = path.as_ref();
    let vocab = Vocabulary::standard();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new().from_reader(BufReader::new(file));

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut specs = Vec::with_capacity(headers.len());
    for header in &headers {
        let spec = vocab
            .field(header)
            .ok_or_else(|| ReconcileError::UnknownField(header.clone()))?;
        specs.push(spec);
    }

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("canonical")
        .to_string();
    let mut table = CanonicalTable::new(source.clone(), vocab.field_names());

    for result in reader.records() {
        let row = result?;
        let mut record = CanonicalRecord::new();
        for (spec, cell) in specs.iter().zip(row.iter()) {
            record.set(spec.name, parse_cell(spec.semantic, cell));
        }
        table.records.push(record);
    }

    let provenance = vec![SourceRows {
        source,
        rows: table.len(),
    }];
    info!("Read {} canonical rows from {:?}", table.len(), path);
    Ok(CombinedDataset::from_parts(table, provenance, 0))
}

fn parse_cell(semantic: SemanticType, cell: &str) -> Option<Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    let value = match semantic {
        SemanticType::Categorical => Value::Text(cell.to_string()),
        SemanticType::Boolean | SemanticType::BoundedInteger => match cell.parse::<i64>() {
            Ok(v) => Value::Integer(v),
            Err(_) => cell
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Text(cell.to_string())),
        },
        SemanticType::BoundedFloat => cell
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Text(cell.to_string())),
    };
    Some(value)
}
