use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration as TokioDuration};
use tracing::{debug, info, warn};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle(prefix: &str) -> NotificationHandle {
    let sequence = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    NotificationHandle(format!("{prefix}-{sequence}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelImportance {
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: ChannelImportance,
}

/// A one-shot local notification. `slot_time` tags the reminder with the
/// schedule slot it represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub slot_time: String,
    pub delay_seconds: u64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationHandle(pub String);

/// Platform notification subsystem. Calls are fire-and-forget: an `Ok` means
/// the request was accepted, not that anything was delivered.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn permission_status(&self) -> Result<PermissionStatus, InfraError>;

    async fn request_permission(&self) -> Result<PermissionStatus, InfraError>;

    async fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), InfraError>;

    async fn schedule(&self, request: NotificationRequest) -> Result<NotificationHandle, InfraError>;

    async fn cancel_all(&self) -> Result<(), InfraError>;
}

fn ensure_positive_delay(request: &NotificationRequest) -> Result<(), InfraError> {
    if request.delay_seconds == 0 {
        return Err(InfraError::Notification(format!(
            "delay for reminder at {} must be > 0 seconds",
            request.slot_time
        )));
    }
    Ok(())
}

/// Drops timers that already fired so the set only holds pending reminders.
fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(finished) = tasks.try_join_next() {
        if let Err(error) = finished {
            if !error.is_cancelled() {
                warn!(%error, "reminder task failed");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveredNotification {
    pub handle: NotificationHandle,
    pub request: NotificationRequest,
}

/// In-process timers backed by tokio tasks. Pending reminders live only as
/// long as the process; persisted activation state is replayed on start.
#[derive(Debug)]
pub struct TokioNotificationPort {
    enabled: bool,
    tasks: Mutex<JoinSet<()>>,
    channel: Mutex<Option<NotificationChannel>>,
    delivery_sink: Option<UnboundedSender<DeliveredNotification>>,
}

impl TokioNotificationPort {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tasks: Mutex::new(JoinSet::new()),
            channel: Mutex::new(None),
            delivery_sink: None,
        }
    }

    pub fn with_delivery_sink(mut self, sink: UnboundedSender<DeliveredNotification>) -> Self {
        self.delivery_sink = Some(sink);
        self
    }

    pub fn pending(&self) -> Result<usize, InfraError> {
        let mut tasks = self.lock_tasks()?;
        reap_finished(&mut tasks);
        Ok(tasks.len())
    }

    fn lock_tasks(&self) -> Result<MutexGuard<'_, JoinSet<()>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::Notification(format!("reminder task lock poisoned: {error}")))
    }

    fn status(&self) -> PermissionStatus {
        if self.enabled {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }
}

#[async_trait]
impl NotificationPort for TokioNotificationPort {
    async fn permission_status(&self) -> Result<PermissionStatus, InfraError> {
        Ok(self.status())
    }

    async fn request_permission(&self) -> Result<PermissionStatus, InfraError> {
        Ok(self.status())
    }

    async fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), InfraError> {
        let mut current = self
            .channel
            .lock()
            .map_err(|error| InfraError::Notification(format!("channel lock poisoned: {error}")))?;
        if current.as_ref() != Some(channel) {
            debug!(channel_id = %channel.id, channel_name = %channel.name, "registered notification channel");
            *current = Some(channel.clone());
        }
        Ok(())
    }

    async fn schedule(&self, request: NotificationRequest) -> Result<NotificationHandle, InfraError> {
        if !self.enabled {
            return Err(InfraError::NotificationPermissionDenied);
        }
        ensure_positive_delay(&request)?;

        let handle = next_handle("reminder");
        let delivered = DeliveredNotification {
            handle: handle.clone(),
            request,
        };
        let sink = self.delivery_sink.clone();
        {
            let mut tasks = self.lock_tasks()?;
            reap_finished(&mut tasks);
            tasks.spawn(async move {
                sleep(TokioDuration::from_secs(delivered.request.delay_seconds)).await;
                info!(
                    handle = %delivered.handle.0,
                    slot_time = %delivered.request.slot_time,
                    title = %delivered.request.title,
                    body = %delivered.request.body,
                    "reminder due"
                );
                if let Some(sink) = sink {
                    let _ = sink.send(delivered);
                }
            });
        }
        Ok(handle)
    }

    async fn cancel_all(&self) -> Result<(), InfraError> {
        // Dropping the previous set aborts every pending timer.
        let previous = std::mem::take(&mut *self.lock_tasks()?);
        debug!(cancelled = previous.len(), "cancelled pending reminders");
        drop(previous);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    RequestPermission,
    EnsureChannel(String),
    Schedule(String),
    CancelAll,
}

#[derive(Debug)]
struct RecordingState {
    permission: PermissionStatus,
    live: Vec<(NotificationHandle, NotificationRequest)>,
    calls: Vec<PortCall>,
    fail_next_schedule: bool,
}

/// Records every call and keeps the set of notifications that would still
/// be pending on a real device.
#[derive(Debug)]
pub struct RecordingNotificationPort {
    state: Mutex<RecordingState>,
}

impl Default for RecordingNotificationPort {
    fn default() -> Self {
        Self::with_permission(PermissionStatus::Granted)
    }
}

impl RecordingNotificationPort {
    pub fn with_permission(permission: PermissionStatus) -> Self {
        Self {
            state: Mutex::new(RecordingState {
                permission,
                live: Vec::new(),
                calls: Vec::new(),
                fail_next_schedule: false,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordingState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::Notification(format!("recording port lock poisoned: {error}")))
    }

    pub fn set_permission(&self, permission: PermissionStatus) -> Result<(), InfraError> {
        self.lock()?.permission = permission;
        Ok(())
    }

    pub fn fail_next_schedule(&self) -> Result<(), InfraError> {
        self.lock()?.fail_next_schedule = true;
        Ok(())
    }

    /// Slot times of pending notifications, sorted.
    pub fn live_times(&self) -> Result<Vec<String>, InfraError> {
        let mut times: Vec<String> = self
            .lock()?
            .live
            .iter()
            .map(|(_, request)| request.slot_time.clone())
            .collect();
        times.sort();
        Ok(times)
    }

    pub fn live_requests(&self) -> Result<Vec<NotificationRequest>, InfraError> {
        Ok(self
            .lock()?
            .live
            .iter()
            .map(|(_, request)| request.clone())
            .collect())
    }

    pub fn calls(&self) -> Result<Vec<PortCall>, InfraError> {
        Ok(self.lock()?.calls.clone())
    }

    pub fn clear_calls(&self) -> Result<(), InfraError> {
        self.lock()?.calls.clear();
        Ok(())
    }
}

#[async_trait]
impl NotificationPort for RecordingNotificationPort {
    async fn permission_status(&self) -> Result<PermissionStatus, InfraError> {
        Ok(self.lock()?.permission)
    }

    async fn request_permission(&self) -> Result<PermissionStatus, InfraError> {
        let mut state = self.lock()?;
        state.calls.push(PortCall::RequestPermission);
        if state.permission == PermissionStatus::Undetermined {
            state.permission = PermissionStatus::Granted;
        }
        Ok(state.permission)
    }

    async fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), InfraError> {
        self.lock()?
            .calls
            .push(PortCall::EnsureChannel(channel.id.clone()));
        Ok(())
    }

    async fn schedule(&self, request: NotificationRequest) -> Result<NotificationHandle, InfraError> {
        let mut state = self.lock()?;
        state.calls.push(PortCall::Schedule(request.slot_time.clone()));
        if state.permission == PermissionStatus::Denied {
            return Err(InfraError::NotificationPermissionDenied);
        }
        if state.fail_next_schedule {
            state.fail_next_schedule = false;
            return Err(InfraError::Notification("scheduling rejected".to_string()));
        }
        ensure_positive_delay(&request)?;

        let handle = next_handle("recorded");
        state.live.push((handle.clone(), request));
        Ok(handle)
    }

    async fn cancel_all(&self) -> Result<(), InfraError> {
        let mut state = self.lock()?;
        state.calls.push(PortCall::CancelAll);
        state.live.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn request(slot_time: &str, delay_seconds: u64) -> NotificationRequest {
        NotificationRequest {
            slot_time: slot_time.to_string(),
            delay_seconds,
            title: "Time for a glass of water".to_string(),
            body: "Drink 250 ml now to stay on track.".to_string(),
        }
    }

    #[tokio::test]
    async fn tokio_port_delivers_due_reminder() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let port = TokioNotificationPort::new(true).with_delivery_sink(sender);

        let handle = port.schedule(request("09:38", 1)).await.expect("schedule");
        let delivered = tokio::time::timeout(TokioDuration::from_secs(5), receiver.recv())
            .await
            .expect("delivered in time")
            .expect("sink open");

        assert_eq!(delivered.handle, handle);
        assert_eq!(delivered.request.slot_time, "09:38");
    }

    #[tokio::test]
    async fn tokio_port_schedule_reaps_fired_timers() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let port = TokioNotificationPort::new(true).with_delivery_sink(sender);
        port.schedule(request("09:38", 1)).await.expect("schedule due");
        tokio::time::timeout(TokioDuration::from_secs(5), receiver.recv())
            .await
            .expect("delivered in time")
            .expect("sink open");
        tokio::time::sleep(TokioDuration::from_millis(100)).await;

        port.schedule(request("11:15", 3_600)).await.expect("schedule later");

        assert_eq!(port.lock_tasks().expect("tasks").len(), 1);
    }

    #[tokio::test]
    async fn tokio_port_cancel_all_drops_pending_timers() {
        let port = TokioNotificationPort::new(true);
        port.schedule(request("09:38", 3_600)).await.expect("schedule first");
        port.schedule(request("11:15", 7_200)).await.expect("schedule second");
        assert_eq!(port.pending().expect("pending"), 2);

        port.cancel_all().await.expect("cancel all");
        assert_eq!(port.pending().expect("pending"), 0);
    }

    #[tokio::test]
    async fn tokio_port_rejects_zero_delay_and_disabled_permission() {
        let port = TokioNotificationPort::new(true);
        assert!(matches!(
            port.schedule(request("09:38", 0)).await,
            Err(InfraError::Notification(_))
        ));

        let disabled = TokioNotificationPort::new(false);
        assert_eq!(
            disabled.request_permission().await.expect("permission"),
            PermissionStatus::Denied
        );
        assert!(matches!(
            disabled.schedule(request("09:38", 60)).await,
            Err(InfraError::NotificationPermissionDenied)
        ));
    }

    #[tokio::test]
    async fn recording_port_tracks_live_set_and_calls() {
        let port = RecordingNotificationPort::default();
        port.schedule(request("11:15", 60)).await.expect("schedule");
        port.schedule(request("09:38", 30)).await.expect("schedule");
        assert_eq!(port.live_times().expect("live"), vec!["09:38", "11:15"]);

        port.cancel_all().await.expect("cancel");
        assert!(port.live_times().expect("live").is_empty());
        assert_eq!(
            port.calls().expect("calls"),
            vec![
                PortCall::Schedule("11:15".to_string()),
                PortCall::Schedule("09:38".to_string()),
                PortCall::CancelAll,
            ]
        );
    }

    #[tokio::test]
    async fn recording_port_request_resolves_undetermined_permission() {
        let port = RecordingNotificationPort::with_permission(PermissionStatus::Undetermined);
        assert_eq!(
            port.request_permission().await.expect("request"),
            PermissionStatus::Granted
        );

        let denied = RecordingNotificationPort::with_permission(PermissionStatus::Denied);
        assert_eq!(
            denied.request_permission().await.expect("request"),
            PermissionStatus::Denied
        );
        assert!(matches!(
            denied.schedule(request("09:38", 30)).await,
            Err(InfraError::NotificationPermissionDenied)
        ));
    }
}
