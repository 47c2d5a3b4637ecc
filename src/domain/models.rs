use crate::domain::generator::ScheduleError;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_DECIMAL_PLACES: u32 = 9;

/// Raw user parameters, kept exactly as entered so they can be persisted and
/// shown back unchanged. Validation happens in [`Settings::parse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub wake_up: String,
    pub bed_time: String,
    pub daily_liters: String,
    pub glass_size: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wake_up: "08:00".to_string(),
            bed_time: "22:00".to_string(),
            daily_liters: "2".to_string(),
            glass_size: "250".to_string(),
        }
    }
}

impl Settings {
    pub fn get(&self, field: SettingField) -> &str {
        match field {
            SettingField::WakeUp => &self.wake_up,
            SettingField::BedTime => &self.bed_time,
            SettingField::DailyLiters => &self.daily_liters,
            SettingField::GlassSize => &self.glass_size,
        }
    }

    pub fn set(&mut self, field: SettingField, value: impl Into<String>) {
        let value = value.into();
        match field {
            SettingField::WakeUp => self.wake_up = value,
            SettingField::BedTime => self.bed_time = value,
            SettingField::DailyLiters => self.daily_liters = value,
            SettingField::GlassSize => self.glass_size = value,
        }
    }

    pub fn parse(&self) -> Result<ParsedSettings, ScheduleError> {
        let wake = parse_hhmm(&self.wake_up, SettingField::WakeUp)?;
        let bed = parse_hhmm(&self.bed_time, SettingField::BedTime)?;
        let daily_volume = DailyVolume::parse(&self.daily_liters)?;
        let glass_ml = parse_glass_size(&self.glass_size)?;
        Ok(ParsedSettings {
            wake,
            bed,
            daily_volume,
            glass_ml,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingField {
    WakeUp,
    BedTime,
    DailyLiters,
    GlassSize,
}

impl SettingField {
    pub const ALL: [SettingField; 4] = [
        SettingField::WakeUp,
        SettingField::BedTime,
        SettingField::DailyLiters,
        SettingField::GlassSize,
    ];

    /// Storage key of the field.
    pub fn key(self) -> &'static str {
        match self {
            Self::WakeUp => "wakeUp",
            Self::BedTime => "bedTime",
            Self::DailyLiters => "dailyLiters",
            Self::GlassSize => "glassSize",
        }
    }
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SettingField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        SettingField::ALL
            .into_iter()
            .find(|field| {
                field.key().eq_ignore_ascii_case(normalized)
                    || field
                        .key()
                        .eq_ignore_ascii_case(&normalized.replace(['_', '-'], ""))
            })
            .ok_or_else(|| {
                format!("unknown setting '{normalized}' (expected wakeUp, bedTime, dailyLiters or glassSize)")
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSettings {
    pub wake: NaiveTime,
    pub bed: NaiveTime,
    pub daily_volume: DailyVolume,
    pub glass_ml: u32,
}

/// Daily target in liters held as an exact decimal (`mantissa / 10^scale`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyVolume {
    mantissa: u64,
    scale: u32,
}

impl DailyVolume {
    /// Accepts both `.` and `,` as decimal separator.
    pub fn parse(raw: &str) -> Result<Self, ScheduleError> {
        let invalid = || {
            ScheduleError::InvalidNumericInput(format!(
                "{} must be a positive number, got '{}'",
                SettingField::DailyLiters,
                raw.trim()
            ))
        };

        let normalized = raw.trim().replace(',', ".");
        let (whole, fraction) = match normalized.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (normalized.as_str(), ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let fraction = fraction.trim_end_matches('0');
        let scale = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        if scale > MAX_DECIMAL_PLACES {
            return Err(invalid());
        }
        let digits = format!("{whole}{fraction}");
        let mantissa = if digits.is_empty() {
            0
        } else {
            digits.parse::<u64>().map_err(|_| invalid())?
        };
        if mantissa == 0 {
            return Err(invalid());
        }
        Ok(Self { mantissa, scale })
    }

    /// `ceil(total_ml / glass_ml)` computed without floating point error.
    pub fn glass_count(&self, glass_ml: u32) -> u64 {
        let numerator = u128::from(self.mantissa) * 1000;
        let denominator = 10u128.pow(self.scale) * u128::from(glass_ml.max(1));
        let count = numerator.div_ceil(denominator);
        u64::try_from(count).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub time: String,
    #[serde(rename = "done")]
    pub active: bool,
}

impl Slot {
    pub fn inactive(time: NaiveTime) -> Self {
        Self {
            time: format_hhmm(time),
            active: false,
        }
    }

    pub fn time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.time.trim(), "%H:%M").ok()
    }
}

/// Owned application state handed by reference into every core operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanState {
    pub settings: Settings,
    pub schedule: Vec<Slot>,
    pub all_active: bool,
    /// Settings the schedule was generated from. Edits to `settings` leave it
    /// alone until the next generation.
    pub generated_from: Option<Settings>,
}

impl PlanState {
    pub fn new(settings: Settings, schedule: Vec<Slot>) -> Self {
        let all_active = crate::domain::activation::all_active(&schedule);
        Self {
            settings,
            schedule,
            all_active,
            generated_from: None,
        }
    }

    pub fn with_generated_from(mut self, generated_from: Settings) -> Self {
        self.generated_from = Some(generated_from);
        self
    }

    /// Settings that describe the current schedule.
    pub fn schedule_settings(&self) -> &Settings {
        self.generated_from.as_ref().unwrap_or(&self.settings)
    }

    /// True when settings were edited after the schedule was generated.
    pub fn schedule_outdated(&self) -> bool {
        !self.schedule.is_empty() && self.schedule_settings() != &self.settings
    }

    pub fn active_times(&self) -> Vec<String> {
        self.schedule
            .iter()
            .filter(|slot| slot.active)
            .map(|slot| slot.time.clone())
            .collect()
    }
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn parse_hhmm(value: &str, field: SettingField) -> Result<NaiveTime, ScheduleError> {
    let invalid = || ScheduleError::InvalidTimeOfDay {
        field: field.key(),
        value: value.trim().to_string(),
    };

    let mut split = value.trim().split(':');
    let (Some(hour_str), Some(minute_str), None) = (split.next(), split.next(), split.next()) else {
        return Err(invalid());
    };
    let hour = hour_str.parse::<u32>().map_err(|_| invalid())?;
    let minute = minute_str.parse::<u32>().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

fn parse_glass_size(raw: &str) -> Result<u32, ScheduleError> {
    let value = raw.trim();
    match value.parse::<u32>() {
        Ok(glass_ml) if glass_ml > 0 => Ok(glass_ml),
        _ => Err(ScheduleError::InvalidNumericInput(format!(
            "{} must be a positive whole number of milliliters, got '{value}'",
            SettingField::GlassSize
        ))),
    }
}
