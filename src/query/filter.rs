use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::SimError;

/// Asset category selector. Readings carry every asset, so this does not
/// narrow the result set.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AssetType {
    #[default]
    All,
    Solar,
    Wind,
    Battery,
    Grid,
}

/// History selection. Every present criterion must hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Inclusive, from local midnight.
    pub start_date: Option<NaiveDate>,
    /// Inclusive, through 23:59:59.999 local.
    pub end_date: Option<NaiveDate>,
    /// Only readings from the last N hours.
    pub window_hours: Option<u32>,
    #[serde(default)]
    pub asset_type: AssetType,
}

impl Filter {
    pub fn window(hours: u32) -> Self {
        Self {
            window_hours: Some(hours),
            ..Self::default()
        }
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if end < start => Err(SimError::InvalidFilterRange {
                start: start.to_string(),
                end: end.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Resolved UTC bounds of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub cutoff: Option<DateTime<Utc>>,
}

impl Bounds {
    pub fn resolve(filter: &Filter, tz: Tz, now: DateTime<Utc>) -> Self {
        let from = filter
            .start_date
            .map(|d| local_to_utc(tz, d.and_time(NaiveTime::MIN), false));
        let until = filter.end_date.map(|d| {
            let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
            local_to_utc(tz, d.and_time(end_of_day), true)
        });
        // a window reaching past the representable range has no cutoff
        let cutoff = filter.window_hours.and_then(|h| {
            TimeDelta::try_hours(i64::from(h)).and_then(|w| now.checked_sub_signed(w))
        });
        Self { from, until, cutoff }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| t >= from)
            && self.until.map_or(true, |until| t <= until)
            && self.cutoff.map_or(true, |cutoff| t >= cutoff)
    }
}

/// Maps a local wall time to UTC. Ambiguous times pick the earlier or later
/// instant; times skipped by a DST jump use the standard offset.
fn local_to_utc(tz: Tz, local: NaiveDateTime, latest: bool) -> DateTime<Utc> {
    let mapped = tz.from_local_datetime(&local);
    let picked = if latest { mapped.latest() } else { mapped.earliest() };
    match picked {
        Some(t) => t.with_timezone(&Utc),
        None => tz.from_utc_datetime(&local).with_timezone(&Utc),
    }
}
