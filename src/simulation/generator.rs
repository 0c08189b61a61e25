//! Synthetic generation and load profiles.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::domain::{round_to, Reading};

const GUST_PROBABILITY: f64 = 0.3;
const MORNING_PEAK_KW: f64 = 2.0;
const EVENING_PEAK_KW: f64 = 3.0;

/// Generation and load for one tick, before the battery is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub solar_kw: f64,
    pub wind_kw: f64,
    pub consumption_kw: f64,
    pub efficiency_pct: f64,
}

impl RawSample {
    pub fn net_power_kw(&self) -> f64 {
        self.solar_kw + self.wind_kw - self.consumption_kw
    }
}

pub struct SyntheticGenerator {
    rng: StdRng,
    tz: Tz,
}

impl SyntheticGenerator {
    pub fn new(tz: Tz, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, tz }
    }

    fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.tz).hour()
    }

    /// Time-of-day profile: solar only between 06:00 and 20:00 (exclusive),
    /// occasional wind gusts, morning and evening consumption peaks.
    pub fn auto_sample(&mut self, now: DateTime<Utc>) -> RawSample {
        let hour = self.local_hour(now);
        let daytime = hour > 6 && hour < 20;

        let solar_kw = if daytime {
            let base = self.rng.gen_range(2.0..10.0);
            let swing = ((f64::from(hour) - 6.0) * PI / 12.0).sin() * 4.0;
            (base + swing).max(0.0)
        } else {
            0.0
        };

        let gust = if self.rng.gen_bool(GUST_PROBABILITY) {
            self.rng.gen_range(0.0..4.0)
        } else {
            0.0
        };
        let wind_kw = 1.0 + self.rng.gen_range(0.0..3.0) + gust;

        let peak = match hour {
            7..=9 => MORNING_PEAK_KW,
            17..=21 => EVENING_PEAK_KW,
            _ => 0.0,
        };
        let consumption_kw = 4.0 + self.rng.gen_range(0.0..3.0) + peak;

        RawSample {
            solar_kw,
            wind_kw,
            consumption_kw,
            efficiency_pct: self.efficiency(),
        }
    }

    /// Clock-independent uniform values.
    pub fn manual_sample(&mut self) -> RawSample {
        RawSample {
            solar_kw: self.rng.gen_range(2.0..10.0),
            wind_kw: self.rng.gen_range(0.0..4.0),
            consumption_kw: self.rng.gen_range(3.0..8.0),
            efficiency_pct: self.efficiency(),
        }
    }

    fn efficiency(&mut self) -> f64 {
        self.rng.gen_range(85.0..95.0)
    }

    /// Feed efficiency is not metered; it is drawn from a wider band.
    pub fn feed_efficiency(&mut self) -> f64 {
        self.rng.gen_range(80.0..100.0)
    }

    /// `count` demo readings spaced `spacing` apart, the last one at `end`,
    /// oldest first.
    pub fn sample_history(
        &mut self,
        end: DateTime<Utc>,
        count: usize,
        spacing: Duration,
    ) -> Vec<Reading> {
        let mut readings: Vec<Reading> = (0..count)
            .map(|i| {
                let raw = self.manual_sample();
                Reading {
                    timestamp: end - spacing * i as i32,
                    solar_kw: round_to(raw.solar_kw, 2),
                    wind_kw: round_to(raw.wind_kw, 2),
                    consumption_kw: round_to(raw.consumption_kw, 2),
                    grid_import_kw: round_to(self.rng.gen_range(0.0..2.0), 2),
                    battery_level_pct: round_to(self.rng.gen_range(0.0..100.0), 1),
                    efficiency_pct: round_to(raw.efficiency_pct, 1),
                }
            })
            .collect();
        readings.reverse();
        readings
    }
}
