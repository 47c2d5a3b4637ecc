use crate::domain::models::{SettingField, Settings, Slot};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

pub const SCHEDULE_KEY: &str = "drinkSchedule";
pub const SCHEDULE_SETTINGS_KEY: &str = "drinkScheduleSettings";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredState {
    pub settings: Option<Settings>,
    pub schedule: Option<Vec<Slot>>,
    /// Settings the stored schedule was generated from, when recorded.
    pub generated_from: Option<Settings>,
}

/// A schedule together with the settings it was generated from.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleSnapshot<'a> {
    pub slots: &'a [Slot],
    pub generated_from: &'a Settings,
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<StoredState, InfraError>;
    /// Writes every settings key, and the schedule keys only when given.
    fn save(&self, settings: &Settings, schedule: Option<ScheduleSnapshot<'_>>) -> Result<(), InfraError>;
}

fn encode_entries(
    settings: &Settings,
    schedule: Option<ScheduleSnapshot<'_>>,
) -> Result<Vec<(&'static str, String)>, InfraError> {
    let mut entries: Vec<(&'static str, String)> = SettingField::ALL
        .into_iter()
        .map(|field| (field.key(), settings.get(field).to_string()))
        .collect();
    if let Some(schedule) = schedule {
        entries.push((SCHEDULE_KEY, serde_json::to_string(schedule.slots)?));
        entries.push((SCHEDULE_SETTINGS_KEY, serde_json::to_string(schedule.generated_from)?));
    }
    Ok(entries)
}

fn decode_entries(values: &HashMap<String, String>) -> StoredState {
    let settings = SettingField::ALL
        .into_iter()
        .try_fold(Settings::default(), |mut settings, field| {
            let value = values.get(field.key())?;
            settings.set(field, value.clone());
            Some(settings)
        });

    let schedule = values
        .get(SCHEDULE_KEY)
        .and_then(|raw| match serde_json::from_str::<Vec<Slot>>(raw) {
            Ok(schedule) => Some(schedule),
            Err(error) => {
                warn!(%error, "discarding unreadable persisted schedule");
                None
            }
        });

    let generated_from = values
        .get(SCHEDULE_SETTINGS_KEY)
        .and_then(|raw| match serde_json::from_str::<Settings>(raw) {
            Ok(settings) => Some(settings),
            Err(error) => {
                warn!(%error, "discarding unreadable schedule settings");
                None
            }
        });

    StoredState {
        settings,
        schedule,
        generated_from,
    }
}

#[derive(Debug, Clone)]
pub struct SqliteSettingsStore {
    db_path: PathBuf,
}

impl SqliteSettingsStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn load(&self) -> Result<StoredState, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare("SELECT key, value FROM settings")?;
        let values = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(decode_entries(&values))
    }

    fn save(&self, settings: &Settings, schedule: Option<ScheduleSnapshot<'_>>) -> Result<(), InfraError> {
        let entries = encode_entries(settings, schedule)?;
        let updated_at = Utc::now().to_rfc3339();
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        for (key, value) in &entries {
            transaction.execute(
                "INSERT INTO settings (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, value, updated_at],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
    fail_io: AtomicBool,
}

impl InMemorySettingsStore {
    /// Makes every subsequent load and save fail with an I/O error.
    pub fn set_failing(&self, failing: bool) {
        self.fail_io.store(failing, Ordering::SeqCst);
    }

    pub fn raw_value(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    pub fn put_raw(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.values
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("settings store lock poisoned: {error}")))
    }

    fn check_io(&self) -> Result<(), InfraError> {
        if self.fail_io.load(Ordering::SeqCst) {
            return Err(InfraError::Io(std::io::Error::other("settings store unavailable")));
        }
        Ok(())
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn load(&self) -> Result<StoredState, InfraError> {
        self.check_io()?;
        let values = self.lock()?;
        Ok(decode_entries(&values))
    }

    fn save(&self, settings: &Settings, schedule: Option<ScheduleSnapshot<'_>>) -> Result<(), InfraError> {
        self.check_io()?;
        let entries = encode_entries(settings, schedule)?;
        let mut values = self.lock()?;
        for (key, value) in entries {
            values.insert(key.to_string(), value);
        }
        Ok(())
    }
}
