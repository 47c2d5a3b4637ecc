use crate::domain::models::{ParsedSettings, Settings, Slot};
use chrono::{Duration, NaiveDate};
use thiserror::Error;

/// No reminder is generated within this many minutes before bed time.
pub const WIND_DOWN_MINUTES: i64 = 60;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("{field} must be HH:MM, got '{value}'")]
    InvalidTimeOfDay { field: &'static str, value: String },
    #[error("bed time {bed} leaves no time after wake up {wake} once the 60 minute wind-down is subtracted")]
    InvalidTimeWindow { wake: String, bed: String },
    #[error("invalid numeric input: {0}")]
    InvalidNumericInput(String),
}

pub fn generate_schedule(settings: &Settings, day: NaiveDate) -> Result<Vec<Slot>, ScheduleError> {
    let parsed = settings.parse()?;
    generate_from_parsed(&parsed, day)
}

pub fn generate_from_parsed(parsed: &ParsedSettings, day: NaiveDate) -> Result<Vec<Slot>, ScheduleError> {
    let wake = day.and_time(parsed.wake);
    let effective_bed = day.and_time(parsed.bed) - Duration::minutes(WIND_DOWN_MINUTES);
    if effective_bed <= wake {
        return Err(ScheduleError::InvalidTimeWindow {
            wake: parsed.wake.format("%H:%M").to_string(),
            bed: parsed.bed.format("%H:%M").to_string(),
        });
    }

    let window_minutes = (effective_bed - wake).num_minutes();
    let glass_count = parsed.daily_volume.glass_count(parsed.glass_ml);
    let count = match i64::try_from(glass_count) {
        Ok(count) if count <= window_minutes => count,
        _ => {
            return Err(ScheduleError::InvalidNumericInput(format!(
                "{glass_count} glasses of {} ml do not fit into {window_minutes} minutes; at most one reminder per minute",
                parsed.glass_ml
            )));
        }
    };

    // Offsets are window * i / count rounded half-up to whole minutes.
    let slots = (1..=count)
        .map(|step| {
            let offset_minutes = (2 * window_minutes * step + count) / (2 * count);
            Slot::inactive((wake + Duration::minutes(offset_minutes)).time())
        })
        .collect();
    Ok(slots)
}
