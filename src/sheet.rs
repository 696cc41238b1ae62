//! Spreadsheet input and output for settlement lists.
//!
//! Input columns: `[longitude, latitude, name, ...]`, first row is a header.
//! `.csv` files go through the csv crate; anything else is opened with
//! calamine (xlsx, xls, ods). Results are written as `.csv` or `.xlsx`.

use crate::population::{ErrorLog, Settlement, SettlementStore};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fmt;
use std::path::Path;

pub const HEADERS: [&str; 5] = ["Longitude", "Latitude", "Name", "Population", "Data Source"];

const COORD_FORMAT: &str = "0.000000";
const POPULATION_FORMAT: &str = "#,##0";

/// What happened while reading the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadReport {
    /// Settlements that entered the store.
    pub accepted: usize,
    /// Rows dropped because their coordinates could not be used.
    pub skipped: usize,
    /// Rows without a name.
    pub blank: usize,
}

#[derive(Debug)]
pub enum SheetError {
    Open(String),
    NoWorksheet(String),
    Write(String),
}

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(msg) => write!(f, "Cannot read input: {}", msg),
            Self::NoWorksheet(path) => write!(f, "No worksheet found in {}", path),
            Self::Write(msg) => write!(f, "Cannot write results: {}", msg),
        }
    }
}

impl std::error::Error for SheetError {}

/// A single input row that was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RowError {
    Longitude { row: usize, text: String },
    Latitude { row: usize, text: String },
    OutOfRange { row: usize, lat: f64, lon: f64 },
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Longitude { row, text } => write!(f, "Cannot parse longitude in row {}: '{}'", row, text),
            Self::Latitude { row, text } => write!(f, "Cannot parse latitude in row {}: '{}'", row, text),
            Self::OutOfRange { row, lat, lon } => {
                write!(f, "Coordinates out of range in row {}: lat {}, lon {}", row, lat, lon)
            }
        }
    }
}

impl std::error::Error for RowError {}

// ─── Input ──────────────────────────────────────────────────────

/// Parse a coordinate cell. Comma decimal separators are accepted.
pub fn parse_coordinate(text: &str) -> Option<f64> {
    let v: f64 = text.trim().replace(',', ".").parse().ok()?;
    v.is_finite().then_some(v)
}

/// Turn one input row into a settlement. `row` is the 1-based sheet row.
///
/// `Ok(None)` for rows without a name; those are skipped silently.
pub fn parse_row(
    row: usize,
    lon: Option<&str>,
    lat: Option<&str>,
    name: Option<&str>,
) -> Result<Option<Settlement>, RowError> {
    let name = name.map(str::trim).unwrap_or("");
    if name.is_empty() {
        return Ok(None);
    }

    let lon_text = lon.unwrap_or("").trim();
    let lon = parse_coordinate(lon_text).ok_or_else(|| RowError::Longitude {
        row,
        text: lon_text.to_string(),
    })?;

    let lat_text = lat.unwrap_or("").trim();
    let lat = parse_coordinate(lat_text).ok_or_else(|| RowError::Latitude {
        row,
        text: lat_text.to_string(),
    })?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(RowError::OutOfRange { row, lat, lon });
    }

    Ok(Some(Settlement::new(name, lat, lon)))
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(n) => Some(n.to_string()),
        Data::Int(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

struct Ingest<'a> {
    store: SettlementStore,
    report: ReadReport,
    log: &'a dyn ErrorLog,
}

impl Ingest<'_> {
    fn row(&mut self, row: usize, lon: Option<&str>, lat: Option<&str>, name: Option<&str>) {
        match parse_row(row, lon, lat, name) {
            Ok(Some(settlement)) => {
                self.store.push(settlement);
                self.report.accepted += 1;
            }
            Ok(None) => self.report.blank += 1,
            Err(e) => self.skip(&e.to_string()),
        }
    }

    fn skip(&mut self, msg: &str) {
        eprintln!("  Warning: {}", msg);
        self.log.record(msg);
        self.report.skipped += 1;
    }
}

/// Read settlements from the first worksheet (or a CSV file).
pub fn read_settlements(
    path: &Path,
    log: &dyn ErrorLog,
) -> Result<(SettlementStore, ReadReport), SheetError> {
    let mut ingest = Ingest {
        store: SettlementStore::new(),
        report: ReadReport::default(),
        log,
    };

    if is_csv(path) {
        read_csv(path, &mut ingest)?;
    } else {
        read_workbook(path, &mut ingest)?;
    }

    Ok((ingest.store, ingest.report))
}

fn read_csv(path: &Path, ingest: &mut Ingest<'_>) -> Result<(), SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| SheetError::Open(format!("{}: {}", path.display(), e)))?;

    for (i, record) in reader.records().enumerate() {
        let row = i + 2;
        match record {
            Ok(rec) => ingest.row(row, rec.get(0), rec.get(1), rec.get(2)),
            Err(e) => ingest.skip(&format!("Cannot read row {}: {}", row, e)),
        }
    }
    Ok(())
}

fn read_workbook(path: &Path, ingest: &mut Ingest<'_>) -> Result<(), SheetError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| SheetError::Open(format!("{}: {}", path.display(), e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SheetError::NoWorksheet(path.display().to_string()))?
        .map_err(|e| SheetError::Open(format!("{}: {}", path.display(), e)))?;

    let (Some((start_row, _)), Some((end_row, _))) = (range.start(), range.end()) else {
        return Ok(());
    };

    // Absolute row 0 is the header.
    for row in start_row.max(1)..=end_row {
        let text = |col: u32| range.get_value((row, col)).and_then(cell_text);
        let (lon, lat, name) = (text(0), text(1), text(2));
        ingest.row(row as usize + 1, lon.as_deref(), lat.as_deref(), name.as_deref());
    }
    Ok(())
}

// ─── Output ─────────────────────────────────────────────────────

/// Six decimal places, as shown in the output sheet.
pub fn format_coordinate(value: f64) -> String {
    format!("{:.6}", value)
}

/// Thousands-grouped integer: 5234000 → "5,234,000".
pub fn format_population(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Display form of one result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub longitude: String,
    pub latitude: String,
    pub name: String,
    pub population: String,
    pub source: String,
}

impl From<&Settlement> for OutputRow {
    fn from(s: &Settlement) -> Self {
        Self {
            longitude: format_coordinate(s.lon),
            latitude: format_coordinate(s.lat),
            name: s.name.clone(),
            population: s.population().map(format_population).unwrap_or_default(),
            source: s.source().unwrap_or_default().to_string(),
        }
    }
}

impl OutputRow {
    pub fn fields(&self) -> [&str; 5] {
        [
            self.longitude.as_str(),
            self.latitude.as_str(),
            self.name.as_str(),
            self.population.as_str(),
            self.source.as_str(),
        ]
    }
}

/// Write results in input order, one row per settlement.
pub fn write_results(path: &Path, store: &SettlementStore) -> Result<(), SheetError> {
    if is_csv(path) {
        write_csv(path, store)
    } else {
        write_xlsx(path, store)
    }
}

fn write_csv(path: &Path, store: &SettlementStore) -> Result<(), SheetError> {
    let err = |e: csv::Error| SheetError::Write(format!("{}: {}", path.display(), e));

    let mut writer = csv::Writer::from_path(path).map_err(err)?;
    writer.write_record(HEADERS).map_err(err)?;
    for settlement in store {
        writer.write_record(OutputRow::from(settlement).fields()).map_err(err)?;
    }
    writer
        .flush()
        .map_err(|e| SheetError::Write(format!("{}: {}", path.display(), e)))
}

fn xlsx_err(e: XlsxError) -> SheetError {
    SheetError::Write(e.to_string())
}

fn write_xlsx(path: &Path, store: &SettlementStore) -> Result<(), SheetError> {
    let header = Format::new().set_bold();
    let coord = Format::new().set_num_format(COORD_FORMAT);
    let population = Format::new().set_num_format(POPULATION_FORMAT);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Results").map_err(xlsx_err)?;

    for (col, title) in HEADERS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *title, &header)
            .map_err(xlsx_err)?;
    }

    for (i, s) in store.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_number_with_format(row, 0, s.lon, &coord).map_err(xlsx_err)?;
        worksheet.write_number_with_format(row, 1, s.lat, &coord).map_err(xlsx_err)?;
        worksheet.write_string(row, 2, &s.name).map_err(xlsx_err)?;
        if let Some(p) = s.population() {
            worksheet
                .write_number_with_format(row, 3, p as f64, &population)
                .map_err(xlsx_err)?;
        }
        if let Some(source) = s.source() {
            worksheet.write_string(row, 4, source).map_err(xlsx_err)?;
        }
    }
    worksheet.autofit();

    workbook
        .save(path)
        .map_err(|e| SheetError::Write(format!("{}: {}", path.display(), e)))
}
