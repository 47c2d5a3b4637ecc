use crate::application::bootstrap::bootstrap_workspace;
use crate::application::reconciler::{NowProvider, ReconcileOutcome, ReminderContent, ReminderReconciler};
use crate::domain::generator::generate_schedule;
use crate::domain::models::{PlanState, SettingField, Settings, Slot};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification::{
    ChannelImportance, DeliveredNotification, NotificationChannel, NotificationPort, PermissionStatus,
    TokioNotificationPort,
};
use crate::infrastructure::settings_store::{SettingsStore, SqliteSettingsStore};
use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlanView {
    pub settings: Settings,
    pub schedule: Vec<Slot>,
    pub all_active: bool,
    /// Settings were edited since the schedule was generated.
    pub schedule_outdated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<ReconcileOutcome>,
}

impl PlanView {
    fn from_plan(plan: &PlanState, reminders: Option<ReconcileOutcome>) -> Self {
        Self {
            settings: plan.settings.clone(),
            schedule: plan.schedule.clone(),
            all_active: plan.all_active,
            schedule_outdated: plan.schedule_outdated(),
            reminders,
        }
    }
}

pub struct AppState {
    config: AppConfig,
    plan: Mutex<PlanState>,
    reconciler: ReminderReconciler<dyn NotificationPort, dyn SettingsStore>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::open(workspace_root, None)
    }

    /// Same as [`AppState::new`], but every reminder that fires is also sent to `sink`.
    pub fn with_delivery_sink(
        workspace_root: PathBuf,
        sink: UnboundedSender<DeliveredNotification>,
    ) -> Result<Self, InfraError> {
        Self::open(workspace_root, Some(sink))
    }

    fn open(
        workspace_root: PathBuf,
        sink: Option<UnboundedSender<DeliveredNotification>>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let now_provider = local_now_provider(bootstrap.config.resolve_timezone()?);
        let store: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(&bootstrap.database_path));
        let mut port = TokioNotificationPort::new(bootstrap.config.notifications.enabled);
        if let Some(sink) = sink {
            port = port.with_delivery_sink(sink);
        }
        let port: Arc<dyn NotificationPort> = Arc::new(port);
        Ok(Self::with_components(bootstrap.config, store, port, now_provider))
    }

    /// Loads the persisted plan through `store`; unreadable or stale state
    /// falls back to the configured defaults.
    pub fn with_components(
        config: AppConfig,
        store: Arc<dyn SettingsStore>,
        port: Arc<dyn NotificationPort>,
        now_provider: NowProvider,
    ) -> Self {
        let content = ReminderContent {
            title: config.notifications.title.clone(),
            body: config.notifications.body.clone(),
        };
        let reconciler = ReminderReconciler::new(port, store, content).with_now_provider(now_provider);
        let today = reconciler.now().date();
        let plan = load_plan(&config, reconciler.store().as_ref(), today);
        Self {
            config,
            plan: Mutex::new(plan),
            reconciler,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn now(&self) -> NaiveDateTime {
        self.reconciler.now()
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        let message = error.to_string();
        if error.is_persistence() {
            self.log_error(command, &format!("storage failure: {message}"));
        } else {
            self.log_error(command, &message);
        }
        message
    }

    pub fn log_info(&self, command: &str, message: &str) {
        info!(command, "{message}");
    }

    pub fn log_error(&self, command: &str, message: &str) {
        error!(command, "{message}");
    }
}

pub fn local_now_provider(timezone: Option<Tz>) -> NowProvider {
    match timezone {
        Some(timezone) => Arc::new(move || Utc::now().with_timezone(&timezone).naive_local()),
        None => Arc::new(|| Local::now().naive_local()),
    }
}

fn load_plan(config: &AppConfig, store: &dyn SettingsStore, today: NaiveDate) -> PlanState {
    let stored = match store.load() {
        Ok(stored) => stored,
        Err(error) => {
            error!(%error, "failed to load persisted plan, starting from defaults");
            return PlanState::new(config.defaults.clone(), Vec::new());
        }
    };

    let settings = stored.settings.unwrap_or_else(|| config.defaults.clone());
    // Schedules saved without their generating settings are checked against
    // the current settings.
    let generated_from = stored.generated_from.unwrap_or_else(|| settings.clone());
    match stored.schedule {
        Some(schedule) if schedule_matches_settings(&generated_from, &schedule, today) => {
            PlanState::new(settings, schedule).with_generated_from(generated_from)
        }
        Some(schedule) => {
            warn!(
                slots = schedule.len(),
                "persisted schedule does not match the settings it was generated from, discarding it"
            );
            PlanState::new(settings, Vec::new())
        }
        None => PlanState::new(settings, Vec::new()),
    }
}

fn schedule_matches_settings(settings: &Settings, schedule: &[Slot], today: NaiveDate) -> bool {
    let Ok(expected) = generate_schedule(settings, today) else {
        return false;
    };
    expected.len() == schedule.len()
        && expected
            .iter()
            .zip(schedule)
            .all(|(expected, stored)| expected.time == stored.time)
}

pub async fn get_plan_impl(state: &AppState) -> Result<PlanView, InfraError> {
    let plan = state.plan.lock().await;
    Ok(PlanView::from_plan(&plan, None))
}

pub async fn update_setting_impl(
    state: &AppState,
    field: String,
    value: String,
) -> Result<PlanView, InfraError> {
    let field = field.parse::<SettingField>().map_err(InfraError::InvalidConfig)?;
    let mut plan = state.plan.lock().await;
    plan.settings.set(field, value.trim());

    if let Err(error) = state.reconciler.store().save(&plan.settings, None) {
        error!(%error, %field, "failed to persist setting, keeping in-memory value");
    }
    state.log_info("update_setting", &format!("updated {field}"));
    Ok(PlanView::from_plan(&plan, None))
}

pub async fn generate_schedule_impl(state: &AppState) -> Result<PlanView, InfraError> {
    let mut plan = state.plan.lock().await;
    let today = state.reconciler.now().date();
    let slots = generate_schedule(&plan.settings, today)?;
    let slot_count = slots.len();

    let outcome = state.reconciler.replace_schedule(&mut plan, slots).await?;
    state.log_info(
        "generate_schedule",
        &format!(
            "generated slots={slot_count} wake={} bed={} liters={} glass={}",
            plan.settings.wake_up, plan.settings.bed_time, plan.settings.daily_liters, plan.settings.glass_size
        ),
    );
    Ok(PlanView::from_plan(&plan, Some(outcome)))
}

pub async fn toggle_slot_impl(state: &AppState, index: usize) -> Result<PlanView, InfraError> {
    let mut plan = state.plan.lock().await;
    let outcome = state.reconciler.toggle_slot(&mut plan, index).await?;
    state.log_info(
        "toggle_slot",
        &format!(
            "toggled index={index} active={} scheduled={}",
            plan.schedule[index].active, outcome.scheduled
        ),
    );
    Ok(PlanView::from_plan(&plan, Some(outcome)))
}

/// Sets every slot to `target`, or flips the bulk state when `target` is absent.
pub async fn toggle_all_impl(state: &AppState, target: Option<bool>) -> Result<PlanView, InfraError> {
    let mut plan = state.plan.lock().await;
    let target = target.unwrap_or(!plan.all_active);
    let outcome = state.reconciler.toggle_all(&mut plan, target).await?;
    state.log_info(
        "toggle_all",
        &format!("set all slots active={target} scheduled={}", outcome.scheduled),
    );
    Ok(PlanView::from_plan(&plan, Some(outcome)))
}

pub async fn restore_reminders_impl(state: &AppState) -> Result<PlanView, InfraError> {
    let plan = state.plan.lock().await;
    let outcome = state.reconciler.restore(&plan).await?;
    state.log_info(
        "restore_reminders",
        &format!(
            "restored slots={:?} scheduled={} permission_denied={}",
            plan.active_times(),
            outcome.scheduled,
            outcome.permission_denied
        ),
    );
    Ok(PlanView::from_plan(&plan, Some(outcome)))
}

pub async fn prepare_notifications_impl(state: &AppState) -> Result<PermissionStatus, InfraError> {
    let port = state.reconciler.port();
    let status = port.request_permission().await?;
    if status == PermissionStatus::Denied {
        warn!("notification permission denied, active slots will not produce reminders");
    }
    let notifications = &state.config.notifications;
    port.ensure_channel(&NotificationChannel {
        id: notifications.channel_id.clone(),
        name: notifications.channel_name.clone(),
        importance: ChannelImportance::High,
    })
    .await?;
    state.log_info("prepare_notifications", &format!("permission={status:?}"));
    Ok(status)
}
