//! Per-product latency out of an LDM7 receiver log.
//!
//! Products arrive either over multicast (`mldm ... Received`) or through the
//! unicast backstop (`down7 ... Inserted`). Each such line carries the arrival
//! time in column 0, the product size, the time the sender inserted the product
//! and, in the last column, the product index.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LatencyError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Multicast,
    Backstop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductRecord {
    pub prodindex: u64,
    pub size: u64,
    pub latency: f64,
    pub source: Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub products: usize,
    pub total_bytes: u64,
    pub mean_latency: f64,
    pub max_latency: f64,
}

pub struct LineParser {
    mldm: Regex,
    backstop: Regex,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    pub const INSERT_TIME_FORMAT: &'static str = "%Y%m%d%H%M%S%.f";

    pub fn new() -> Self {
        Self {
            mldm: Regex::new(r".*mldm.*Received").expect("static regex"),
            backstop: Regex::new(r".*down7.*Inserted").expect("static regex"),
        }
    }

    pub fn parse(&self, line: &str) -> Option<ProductRecord> {
        // (size column, insertion time column)
        let (source, size_col, insert_col) = if self.mldm.is_match(line) {
            (Source::Multicast, 6, 7)
        } else if self.backstop.is_match(line) {
            (Source::Backstop, 5, 6)
        } else {
            return None;
        };
        let record = Self::columns(line, source, size_col, insert_col);
        if record.is_none() {
            tracing::warn!(line, "skipping malformed product line");
        }
        record
    }

    fn columns(line: &str, source: Source, size_col: usize, insert_col: usize) -> Option<ProductRecord> {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let prodindex = cols.last()?.parse().ok()?;
        let size = cols.get(size_col)?.parse().ok()?;
        let arrival = parse_arrival(cols.first()?)?;
        let inserted = NaiveDateTime::parse_from_str(cols.get(insert_col)?, Self::INSERT_TIME_FORMAT).ok()?;
        let elapsed = arrival.naive_utc() - inserted;
        let latency = elapsed.num_microseconds()? as f64 / 1e6;
        Some(ProductRecord {
            prodindex,
            size,
            latency,
            source,
        })
    }
}

// Arrival stamps are ISO-8601, either LDM's compact UTC form
// (20151101T220321.500000Z) or with a zone offset (2015-11-01T17:03:21.334512-0500).
fn parse_arrival(stamp: &str) -> Option<DateTime<Utc>> {
    if let Some(zulu) = stamp.strip_suffix('Z') {
        if let Ok(t) = NaiveDateTime::parse_from_str(zulu, "%Y%m%dT%H%M%S%.f") {
            return Some(Utc.from_utc_datetime(&t));
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(stamp) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y%m%dT%H%M%S%.f%z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(stamp, fmt).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn open(path: &Path) -> Result<Box<dyn BufRead>, LatencyError> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

pub fn extract<R: BufRead>(reader: R) -> Result<BTreeMap<u64, ProductRecord>, LatencyError> {
    let parser = LineParser::new();
    let mut products = BTreeMap::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(record) = parser.parse(&line) {
            // First occurrence wins
            products.entry(record.prodindex).or_insert(record);
        }
    }
    Ok(products)
}

pub fn extract_log(path: &Path) -> Result<BTreeMap<u64, ProductRecord>, LatencyError> {
    extract(open(path)?)
}

pub fn summarize(products: &BTreeMap<u64, ProductRecord>) -> Summary {
    if products.is_empty() {
        return Summary::default();
    }
    let total_latency: f64 = products.values().map(|p| p.latency).sum();
    Summary {
        products: products.len(),
        total_bytes: products.values().map(|p| p.size).sum(),
        mean_latency: total_latency / products.len() as f64,
        max_latency: products
            .values()
            .map(|p| p.latency)
            .fold(f64::MIN, f64::max),
    }
}

pub fn write_csv<W: std::io::Write>(
    products: &BTreeMap<u64, ProductRecord>,
    writer: W,
) -> Result<(), LatencyError> {
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    wtr.write_record(&["prodindex", " latency (s)"])?;
    for (prodindex, record) in products.iter() {
        wtr.write_record(&[prodindex.to_string(), record.latency.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

// Parse `log` and dump one latency row per product into `csv_path`.
pub fn run(log: &Path, csv_path: &Path) -> Result<Summary, LatencyError> {
    let products = extract_log(log)?;
    write_csv(&products, File::create(csv_path)?)?;
    let summary = summarize(&products);
    tracing::info!(
        products = summary.products,
        total_bytes = summary.total_bytes,
        mean_latency = summary.mean_latency,
        max_latency = summary.max_latency,
        "latency extracted"
    );
    Ok(summary)
}
