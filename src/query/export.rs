//! Tabular (CSV) and printable (HTML) renderings of a reading set.

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::domain::Reading;

pub const COLUMNS: [&str; 8] = [
    "Date",
    "Time",
    "Solar (kW)",
    "Wind (kW)",
    "Consumption (kW)",
    "Grid Import (kW)",
    "Battery Level (%)",
    "Efficiency (%)",
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = "csv", alias = "tabular")]
    Tabular,
    #[serde(rename = "printable", alias = "html", alias = "pdf")]
    Printable,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Tabular => "csv",
            ExportFormat::Printable => "html",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Tabular => "text/csv; charset=utf-8",
            ExportFormat::Printable => "text/html; charset=utf-8",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A rendered export, ready to hand to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDocument {
    pub format: ExportFormat,
    pub file_name: String,
    pub body: String,
}

impl ExportDocument {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

pub fn file_name(format: ExportFormat, day: NaiveDate) -> String {
    format!("energy_data_{}.{}", day.format(DATE_FORMAT), format.extension())
}

fn row(reading: &Reading, tz: Tz) -> [String; 8] {
    let local = reading.timestamp.with_timezone(&tz);
    [
        local.format(DATE_FORMAT).to_string(),
        local.format(TIME_FORMAT).to_string(),
        reading.solar_kw.to_string(),
        reading.wind_kw.to_string(),
        reading.consumption_kw.to_string(),
        reading.grid_import_kw.to_string(),
        reading.battery_level_pct.to_string(),
        reading.efficiency_pct.to_string(),
    ]
}

pub(crate) fn render_csv(readings: &[Reading], tz: Tz) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for reading in readings {
        writer.write_record(row(reading, tz))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

pub(crate) fn render_printable(readings: &[Reading], tz: Tz) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Energy Data Export</title>\n\
         <style>\nbody { font-family: Arial, sans-serif; }\n\
         table { width: 100%; border-collapse: collapse; }\n\
         th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }\n\
         th { background-color: #f2f2f2; }\n</style>\n</head>\n<body>\n\
         <h1>Energy Data Export</h1>\n<table>\n<thead>\n<tr>",
    );
    for column in COLUMNS {
        let _ = write!(html, "<th>{column}</th>");
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for reading in readings {
        html.push_str("<tr>");
        for cell in row(reading, tz) {
            let _ = write!(html, "<td>{cell}</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

/// Destination for rendered exports.
#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn deliver(&self, doc: &ExportDocument) -> Result<(), ExportError>;
}

/// Writes each document as `<dir>/<file_name>`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, doc: &ExportDocument) -> PathBuf {
        self.dir.join(&doc.file_name)
    }
}

#[async_trait]
impl ExportSink for FileSink {
    async fn deliver(&self, doc: &ExportDocument) -> Result<(), ExportError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(doc);
        tokio::fs::write(&path, doc.body.as_bytes()).await?;
        info!(path = %path.display(), bytes = doc.body.len(), "export written");
        Ok(())
    }
}

/// Keeps delivered documents in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    docs: Mutex<Vec<ExportDocument>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<ExportDocument> {
        std::mem::take(&mut *self.docs.lock())
    }
}

#[async_trait]
impl ExportSink for BufferSink {
    async fn deliver(&self, doc: &ExportDocument) -> Result<(), ExportError> {
        self.docs.lock().push(doc.clone());
        Ok(())
    }
}
