//! Synthetic daily profiles.
//!
//! A 24-value hourly base profile is turned into one value per simulation
//! step. Each day is scaled by a random day factor `N(1, σ_day)`, a season
//! coefficient and a day-type coefficient, then refined to the step
//! resolution and perturbed with Gaussian noise. Values are clipped to
//! `[0, 1]` since they are fractions of nominal power.
//!
//! The calendar starts on 2018-01-01, which fixes weekdays and the holiday
//! periods (Jul 27-31, Aug 1-19, Dec 14-31).

use anyhow::{anyhow, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use dcgrid_core::diagnostics::categories;
use dcgrid_core::{AssetKind, Diagnostics, Network};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;
use tracing::debug;

use crate::Horizon;

const START_YEAR: i32 = 2018;

/// Calendar and noise coefficients of one asset family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileCoefficients {
    pub noise_std: f64,
    pub summer: f64,
    pub winter: f64,
    pub holiday: f64,
    pub weekend: f64,
    pub day_sigma: f64,
}

impl ProfileCoefficients {
    pub fn load() -> Self {
        Self {
            noise_std: 0.1,
            summer: 0.95,
            winter: 1.1,
            holiday: 1.0 / 5.0,
            weekend: 1.0 / 20.0,
            day_sigma: 0.1,
        }
    }

    pub fn ev() -> Self {
        Self {
            summer: 0.9,
            winter: 1.2,
            ..Self::load()
        }
    }

    pub fn pv() -> Self {
        Self {
            noise_std: 0.1,
            summer: 1.0,
            winter: 0.4,
            holiday: 1.0,
            weekend: 1.0,
            day_sigma: 0.4,
        }
    }

    /// Preset for an asset kind; batteries follow the droop loop, not a profile
    pub fn for_kind(kind: AssetKind) -> Option<Self> {
        match kind {
            AssetKind::Load => Some(Self::load()),
            AssetKind::EvCharger => Some(Self::ev()),
            AssetKind::Generator => Some(Self::pv()),
            AssetKind::Battery => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    fn of(date: NaiveDate) -> Self {
        match date.month() {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayType {
    Workday,
    Weekend,
    Vacation,
}

impl DayType {
    fn of(date: NaiveDate) -> Self {
        if is_holiday(date) {
            DayType::Vacation
        } else if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            DayType::Weekend
        } else {
            DayType::Workday
        }
    }
}

fn is_holiday(date: NaiveDate) -> bool {
    date.year() == START_YEAR
        && match date.month() {
            7 => date.day() >= 27,
            8 => date.day() <= 19,
            12 => date.day() >= 14,
            _ => false,
        }
}

/// Seeded generator of per-step profiles.
pub struct ProfileGenerator {
    horizon: Horizon,
    rng: StdRng,
}

impl ProfileGenerator {
    pub fn new(horizon: Horizon, seed: Option<u64>) -> Self {
        let rng = seed
            .map(StdRng::seed_from_u64)
            .unwrap_or_else(StdRng::from_entropy);
        Self { horizon, rng }
    }

    /// Expand a 24-value base profile over the whole horizon.
    pub fn generate(&mut self, base: &[f64], coefficients: &ProfileCoefficients) -> Result<Vec<f64>> {
        if base.len() != 24 {
            return Err(anyhow!(
                "daily base profile needs 24 hourly values, got {}",
                base.len()
            ));
        }
        let day_factor = Normal::new(1.0, coefficients.day_sigma)
            .map_err(|err| anyhow!("invalid day variation: {err}"))?;
        let noise = Normal::new(0.0, coefficients.noise_std)
            .map_err(|err| anyhow!("invalid noise level: {err}"))?;
        let start = NaiveDate::from_ymd_opt(START_YEAR, 1, 1)
            .ok_or_else(|| anyhow!("invalid calendar start"))?;

        let steps_per_day = self.horizon.steps_per_day();
        let mut values = Vec::with_capacity(self.horizon.steps());
        for day in 0..self.horizon.days {
            let date = start + Duration::days(i64::from(day));
            let mut factor = day_factor.sample(&mut self.rng);
            factor *= match Season::of(date) {
                Season::Summer => coefficients.summer,
                Season::Winter => coefficients.winter,
                Season::Spring | Season::Autumn => 1.0,
            };
            factor *= match DayType::of(date) {
                DayType::Vacation => coefficients.holiday,
                DayType::Weekend => coefficients.weekend,
                DayType::Workday => 1.0,
            };

            let day_profile: Vec<f64> = base.iter().map(|v| v * factor).collect();
            let refined = if steps_per_day == 24 {
                day_profile
            } else {
                interpolate(&day_profile, steps_per_day)
            };
            values.extend(
                refined
                    .into_iter()
                    .map(|v| (v + noise.sample(&mut self.rng)).clamp(0.0, 1.0)),
            );
        }
        Ok(values)
    }

    /// Give every asset with a daily base profile and no explicit profile a
    /// generated one. Returns the number of profiles generated.
    pub fn assign(&mut self, network: &mut Network, diag: &mut Diagnostics) -> Result<usize> {
        let mut generated = 0;
        for asset in network.assets_mut() {
            let Some(base) = asset.daily_base.clone() else {
                continue;
            };
            if asset.profile.is_some() {
                continue;
            }
            let Some(coefficients) = ProfileCoefficients::for_kind(asset.kind) else {
                diag.add_warning_with_entity(
                    categories::PROFILE,
                    "daily profile ignored for a battery",
                    &asset.name,
                );
                continue;
            };
            let values = self.generate(&base, &coefficients)?;
            asset.profile = Some(Arc::from(values));
            generated += 1;
        }
        debug!(generated, steps = self.horizon.steps(), "profiles generated");
        Ok(generated)
    }
}

/// Linear interpolation of an hourly profile onto `points` evenly spaced
/// samples between hour 0 and hour 23.
fn interpolate(hourly: &[f64], points: usize) -> Vec<f64> {
    let last = (hourly.len() - 1) as f64;
    if points < 2 {
        return hourly.iter().copied().take(points).collect();
    }
    (0..points)
        .map(|i| {
            let x = last * i as f64 / (points - 1) as f64;
            let lower = x.floor() as usize;
            let upper = (lower + 1).min(hourly.len() - 1);
            let t = x - lower as f64;
            hourly[lower] * (1.0 - t) + hourly[upper] * t
        })
        .collect()
}
