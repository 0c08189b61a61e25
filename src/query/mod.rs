//! Read-only views over history snapshots: filtering, paging and export.

pub mod export;
pub mod filter;
pub mod page;

pub use export::{
    BufferSink, ExportDocument, ExportError, ExportFormat, ExportSink, FileSink, COLUMNS,
};
pub use filter::{AssetType, Filter};
pub use page::Page;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::domain::{Reading, SimError};
use filter::Bounds;

pub const DEFAULT_RECENT_HOURS: u32 = 24;

/// Result of [`QueryEngine::filter`].
#[derive(Debug, Clone, Default)]
pub struct Filtered {
    pub readings: Vec<Reading>,
    /// Set when the filter itself was invalid; `readings` is then empty.
    pub warning: Option<SimError>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryEngine {
    tz: Tz,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(chrono_tz::UTC)
    }
}

impl QueryEngine {
    /// `tz` decides how calendar dates and exported times are read.
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn filter(&self, history: &[Reading], filter: &Filter, now: DateTime<Utc>) -> Filtered {
        if let Err(e) = filter.validate() {
            debug!(error = %e, "filter rejected");
            return Filtered {
                readings: Vec::new(),
                warning: Some(e),
            };
        }
        let bounds = Bounds::resolve(filter, self.tz, now);
        Filtered {
            readings: history
                .iter()
                .filter(|r| bounds.contains(r.timestamp))
                .cloned()
                .collect(),
            warning: None,
        }
    }

    pub fn paginate(&self, filtered: &[Reading], page: usize, page_size: usize) -> Page<Reading> {
        Page::of(filtered, page, page_size)
    }

    /// Readings from the last `hours` hours.
    pub fn recent(&self, history: &[Reading], hours: u32, now: DateTime<Utc>) -> Vec<Reading> {
        self.filter(history, &Filter::window(hours), now).readings
    }

    /// Renders `filtered`; `None` when there is nothing to export.
    pub fn export(
        &self,
        filtered: &[Reading],
        format: ExportFormat,
        now: DateTime<Utc>,
    ) -> Result<Option<ExportDocument>, ExportError> {
        if filtered.is_empty() {
            return Ok(None);
        }
        let body = match format {
            ExportFormat::Tabular => export::render_csv(filtered, self.tz)?,
            ExportFormat::Printable => export::render_printable(filtered, self.tz),
        };
        let day = now.with_timezone(&self.tz).date_naive();
        Ok(Some(ExportDocument {
            format,
            file_name: export::file_name(format, day),
            body,
        }))
    }
}
