use crate::domain::generator::ScheduleError;
use crate::domain::models::{PlanState, Settings, Slot};
use crate::domain::trigger::trigger_delay_seconds;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification::{NotificationPort, NotificationRequest, PermissionStatus};
use crate::infrastructure::settings_store::{ScheduleSnapshot, SettingsStore};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub type NowProvider = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderContent {
    pub title: String,
    /// May contain `{glass}`, replaced with the configured glass size.
    pub body: String,
}

impl ReminderContent {
    pub fn body_for(&self, glass_size: &str) -> String {
        self.body.replace("{glass}", glass_size.trim())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub scheduled: usize,
    pub cancelled_all: bool,
    pub permission_denied: bool,
    pub persisted: bool,
}

/// Keeps the port's pending reminders equal to the active slots of a plan and
/// persists the plan after every change. Callers hold `&mut PlanState` for the
/// whole call, so two reconciliations never interleave.
pub struct ReminderReconciler<N, S>
where
    N: NotificationPort + ?Sized,
    S: SettingsStore + ?Sized,
{
    port: Arc<N>,
    store: Arc<S>,
    content: ReminderContent,
    now_provider: NowProvider,
}

impl<N, S> ReminderReconciler<N, S>
where
    N: NotificationPort + ?Sized,
    S: SettingsStore + ?Sized,
{
    pub fn new(port: Arc<N>, store: Arc<S>, content: ReminderContent) -> Self {
        Self {
            port,
            store,
            content,
            now_provider: Arc::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.now_provider)()
    }

    pub fn port(&self) -> &Arc<N> {
        &self.port
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Flips one slot. Activation schedules a single reminder; deactivation
    /// cancels everything and re-schedules the slots still active.
    pub async fn toggle_slot(&self, plan: &mut PlanState, index: usize) -> Result<ReconcileOutcome, InfraError> {
        let mut next = plan.clone();
        let now_active = next.toggle_slot(index)?;
        let glass_size = next.schedule_settings().glass_size.as_str();
        let result = if now_active {
            self.schedule_slots(std::slice::from_ref(&next.schedule[index]), glass_size)
                .await
        } else {
            self.rebuild(&next.schedule, glass_size).await
        };
        self.commit(plan, next.schedule, None, result).await
    }

    /// Bulk activation replaces the pending set with one reminder per slot;
    /// bulk deactivation only cancels.
    pub async fn toggle_all(&self, plan: &mut PlanState, target: bool) -> Result<ReconcileOutcome, InfraError> {
        let mut next = plan.clone();
        next.set_all(target);
        let result = if target {
            self.rebuild(&next.schedule, &next.schedule_settings().glass_size).await
        } else {
            self.cancel_all().await
        };
        self.commit(plan, next.schedule, None, result).await
    }

    /// Installs a schedule freshly generated from `plan.settings`. All slots
    /// start inactive, so every outstanding reminder is cancelled.
    pub async fn replace_schedule(
        &self,
        plan: &mut PlanState,
        schedule: Vec<Slot>,
    ) -> Result<ReconcileOutcome, InfraError> {
        let result = self.rebuild(&schedule, &plan.settings.glass_size).await;
        let generated_from = plan.settings.clone();
        self.commit(plan, schedule, Some(generated_from), result).await
    }

    /// Replays the persisted activation state after a restart.
    pub async fn restore(&self, plan: &PlanState) -> Result<ReconcileOutcome, InfraError> {
        self.rebuild(&plan.schedule, &plan.schedule_settings().glass_size).await
    }

    async fn commit(
        &self,
        plan: &mut PlanState,
        updated: Vec<Slot>,
        generated_from: Option<Settings>,
        result: Result<ReconcileOutcome, InfraError>,
    ) -> Result<ReconcileOutcome, InfraError> {
        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "reminder reconciliation failed, restoring previous reminders");
                if let Err(rollback_error) = self
                    .rebuild(&plan.schedule, &plan.schedule_settings().glass_size)
                    .await
                {
                    error!(error = %rollback_error, "failed to restore previous reminders");
                }
                return Err(error);
            }
        };

        plan.replace_schedule(updated);
        if generated_from.is_some() {
            plan.generated_from = generated_from;
        }
        let snapshot = ScheduleSnapshot {
            slots: &plan.schedule,
            generated_from: plan.schedule_settings(),
        };
        outcome.persisted = match self.store.save(&plan.settings, Some(snapshot)) {
            Ok(()) => true,
            Err(error) => {
                error!(%error, "failed to persist schedule, keeping in-memory state");
                false
            }
        };
        Ok(outcome)
    }

    async fn rebuild(&self, schedule: &[Slot], glass_size: &str) -> Result<ReconcileOutcome, InfraError> {
        let mut outcome = self.cancel_all().await?;
        let active: Vec<Slot> = schedule.iter().filter(|slot| slot.active).cloned().collect();
        let scheduled = self.schedule_slots(&active, glass_size).await?;
        outcome.scheduled = scheduled.scheduled;
        outcome.permission_denied = scheduled.permission_denied;
        Ok(outcome)
    }

    /// Cancellation is never gated on permission, so reminders armed while it
    /// was granted cannot outlive their slots.
    async fn cancel_all(&self) -> Result<ReconcileOutcome, InfraError> {
        self.port.cancel_all().await?;
        Ok(ReconcileOutcome {
            cancelled_all: true,
            ..ReconcileOutcome::default()
        })
    }

    async fn schedule_slots(&self, slots: &[Slot], glass_size: &str) -> Result<ReconcileOutcome, InfraError> {
        let mut outcome = ReconcileOutcome::default();
        if self.permission_denied().await? {
            outcome.permission_denied = true;
            return Ok(outcome);
        }

        let now = self.now();
        let body = self.content.body_for(glass_size);
        for slot in slots {
            let time = slot.time_of_day().ok_or_else(|| ScheduleError::InvalidTimeOfDay {
                field: "drinkSchedule",
                value: slot.time.clone(),
            })?;
            let request = NotificationRequest {
                slot_time: slot.time.clone(),
                delay_seconds: trigger_delay_seconds(time, now),
                title: self.content.title.clone(),
                body: body.clone(),
            };
            let delay_seconds = request.delay_seconds;
            match self.port.schedule(request).await {
                Ok(handle) => {
                    debug!(slot_time = %slot.time, delay_seconds, handle = %handle.0, "scheduled reminder");
                    outcome.scheduled += 1;
                }
                Err(InfraError::NotificationPermissionDenied) => {
                    warn!(slot_time = %slot.time, "notification permission denied, reminders are not delivered");
                    outcome.permission_denied = true;
                    break;
                }
                Err(error) => return Err(error),
            }
        }
        Ok(outcome)
    }

    async fn permission_denied(&self) -> Result<bool, InfraError> {
        Ok(self.port.permission_status().await? == PermissionStatus::Denied)
    }
}
