use serde::{Deserialize, Serialize};

use super::SimError;

/// Direction the battery last moved in.
///
/// Derived from the sign of net power on each tick that changes the level;
/// there is no separate idle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatteryMode {
    Charging,
    Discharging,
}

/// What a single [`BatteryModel::update`] did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatteryOutcome {
    Charged { delta_pct: f64 },
    Discharged { delta_pct: f64 },
    /// Deficit while at or below the reserve floor; the grid has to cover it.
    ReserveHold,
    Unchanged,
}

/// Fixed electrical parameters of the simulated battery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatteryParams {
    pub capacity_kwh: f64,
    pub round_trip_efficiency: f64,
    pub reserve_floor_pct: f64,
    /// Hours of energy flow represented by one tick.
    pub tick_hours: f64,
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self {
            capacity_kwh: 10.0,
            round_trip_efficiency: 0.9,
            reserve_floor_pct: 5.0,
            tick_hours: 5.0 / 60.0,
        }
    }
}

impl BatteryParams {
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.capacity_kwh.is_finite() && self.capacity_kwh > 0.0) {
            return Err(SimError::ConfigurationInvalid(format!(
                "battery capacity must be positive, got {} kWh",
                self.capacity_kwh
            )));
        }
        if !(self.round_trip_efficiency > 0.0 && self.round_trip_efficiency <= 1.0) {
            return Err(SimError::ConfigurationInvalid(format!(
                "round-trip efficiency must be in (0, 1], got {}",
                self.round_trip_efficiency
            )));
        }
        if !(0.0..=100.0).contains(&self.reserve_floor_pct) {
            return Err(SimError::ConfigurationInvalid(format!(
                "reserve floor must be within 0-100%, got {}",
                self.reserve_floor_pct
            )));
        }
        if !(self.tick_hours.is_finite() && self.tick_hours > 0.0) {
            return Err(SimError::ConfigurationInvalid(format!(
                "tick energy interval must be positive, got {} h",
                self.tick_hours
            )));
        }
        Ok(())
    }

    /// Percentage points of capacity moved by `power_kw` flowing for one tick.
    pub fn pct_per_tick(&self, power_kw: f64) -> f64 {
        (power_kw * self.tick_hours / self.capacity_kwh) * 100.0
    }
}

/// Serializable view of the battery for status reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatteryState {
    pub level_pct: f64,
    pub is_charging: bool,
    pub mode: BatteryMode,
    pub capacity_kwh: f64,
    pub round_trip_efficiency: f64,
    pub reserve_floor_pct: f64,
}

/// Charge-level state machine driven by net power each tick.
#[derive(Debug, Clone)]
pub struct BatteryModel {
    params: BatteryParams,
    level_pct: f64,
    mode: BatteryMode,
}

impl BatteryModel {
    pub fn new(params: BatteryParams, initial_level_pct: f64) -> Result<Self, SimError> {
        params.validate()?;
        Ok(Self {
            params,
            level_pct: Self::clamp_level(initial_level_pct),
            mode: BatteryMode::Charging,
        })
    }

    fn clamp_level(level: f64) -> f64 {
        if level.is_nan() {
            return 0.0;
        }
        level.clamp(0.0, 100.0)
    }

    pub fn params(&self) -> &BatteryParams {
        &self.params
    }

    pub fn level_pct(&self) -> f64 {
        self.level_pct
    }

    pub fn mode(&self) -> BatteryMode {
        self.mode
    }

    pub fn is_charging(&self) -> bool {
        self.mode == BatteryMode::Charging
    }

    pub fn at_reserve_floor(&self) -> bool {
        self.level_pct <= self.params.reserve_floor_pct
    }

    pub fn state(&self) -> BatteryState {
        BatteryState {
            level_pct: self.level_pct,
            is_charging: self.is_charging(),
            mode: self.mode,
            capacity_kwh: self.params.capacity_kwh,
            round_trip_efficiency: self.params.round_trip_efficiency,
            reserve_floor_pct: self.params.reserve_floor_pct,
        }
    }

    /// Applies one tick of `net_power_kw` (generation minus consumption).
    ///
    /// Charging stores `net * efficiency`; discharging draws `|net| / efficiency`
    /// so the same nominal energy costs more than it gains.
    pub fn update(&mut self, net_power_kw: f64) -> BatteryOutcome {
        let eff = self.params.round_trip_efficiency;

        if net_power_kw > 0.0 {
            let before = self.level_pct;
            let delta_pct = self.params.pct_per_tick(net_power_kw * eff);
            self.level_pct = Self::clamp_level(before + delta_pct);
            self.mode = BatteryMode::Charging;
            BatteryOutcome::Charged {
                delta_pct: self.level_pct - before,
            }
        } else if net_power_kw < 0.0 {
            if self.at_reserve_floor() {
                return BatteryOutcome::ReserveHold;
            }
            let before = self.level_pct;
            let delta_pct = self.params.pct_per_tick(net_power_kw.abs() / eff);
            self.level_pct = Self::clamp_level(before - delta_pct);
            self.mode = BatteryMode::Discharging;
            BatteryOutcome::Discharged {
                delta_pct: before - self.level_pct,
            }
        } else {
            BatteryOutcome::Unchanged
        }
    }
}
