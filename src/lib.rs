mod application;
mod domain;
mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    generate_schedule_impl, get_plan_impl, prepare_notifications_impl, restore_reminders_impl,
    toggle_all_impl, toggle_slot_impl, update_setting_impl, AppState, PlanView,
};
use chrono::{Duration as TimeDelta, NaiveDateTime};
use infrastructure::notification::{DeliveredNotification, PermissionStatus};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::info;
use tracing_subscriber::EnvFilter;

const WORKSPACE_ENV: &str = "HYDRATE_WORKSPACE";

const USAGE: &str = "usage: hydrate-reminder <command>

commands:
  init                        create the workspace and print its paths
  show                        print settings and schedule
  set <field> <value>         change wakeUp, bedTime, dailyLiters or glassSize
  generate [field=value ...]  apply edits, then build a fresh schedule
  toggle <index>              flip one slot
  toggle-all [on|off]         set every slot, or flip the bulk state
  watch                       keep reminders firing until Ctrl-C";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapResponse {
    workspace_root: String,
    config_dir: String,
    database_path: String,
}

fn bootstrap(root: &Path) -> Result<BootstrapResponse, String> {
    let result = bootstrap_workspace(root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        config_dir: result.config_dir.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

async fn get_plan(state: &AppState) -> Result<PlanView, String> {
    get_plan_impl(state)
        .await
        .map_err(|error| state.command_error("get_plan", &error))
}

async fn update_setting(state: &AppState, field: String, value: String) -> Result<PlanView, String> {
    update_setting_impl(state, field, value)
        .await
        .map_err(|error| state.command_error("update_setting", &error))
}

async fn generate_schedule(state: &AppState) -> Result<PlanView, String> {
    generate_schedule_impl(state)
        .await
        .map_err(|error| state.command_error("generate_schedule", &error))
}

async fn toggle_slot(state: &AppState, index: usize) -> Result<PlanView, String> {
    toggle_slot_impl(state, index)
        .await
        .map_err(|error| state.command_error("toggle_slot", &error))
}

async fn toggle_all(state: &AppState, target: Option<bool>) -> Result<PlanView, String> {
    toggle_all_impl(state, target)
        .await
        .map_err(|error| state.command_error("toggle_all", &error))
}

async fn restore_reminders(state: &AppState) -> Result<PlanView, String> {
    restore_reminders_impl(state)
        .await
        .map_err(|error| state.command_error("restore_reminders", &error))
}

async fn prepare_notifications(state: &AppState) -> Result<PermissionStatus, String> {
    prepare_notifications_impl(state)
        .await
        .map_err(|error| state.command_error("prepare_notifications", &error))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Init,
    Show,
    Set { field: String, value: String },
    Generate { edits: Vec<(String, String)> },
    Toggle { index: usize },
    ToggleAll { target: Option<bool> },
    Watch,
}

fn parse_cli<I>(args: I) -> Result<CliCommand, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let command = args.next().ok_or_else(|| "missing command".to_string())?;
    let rest: Vec<String> = args.collect();

    let parsed = match (command.as_str(), rest.as_slice()) {
        ("init", []) => CliCommand::Init,
        ("show", []) => CliCommand::Show,
        ("set", [field, value]) => CliCommand::Set {
            field: field.clone(),
            value: value.clone(),
        },
        ("generate", edits) => CliCommand::Generate {
            edits: edits
                .iter()
                .map(|edit| {
                    edit.split_once('=')
                        .map(|(field, value)| (field.to_string(), value.to_string()))
                        .ok_or_else(|| format!("expected field=value, got '{edit}'"))
                })
                .collect::<Result<_, _>>()?,
        },
        ("toggle", [index]) => CliCommand::Toggle {
            index: index
                .parse()
                .map_err(|_| format!("slot index must be a non-negative integer, got '{index}'"))?,
        },
        ("toggle-all", []) => CliCommand::ToggleAll { target: None },
        ("toggle-all", [switch]) => CliCommand::ToggleAll {
            target: Some(parse_switch(switch)?),
        },
        ("watch", []) => CliCommand::Watch,
        (other, _) => return Err(format!("unknown command or arguments: '{other}'")),
    };
    Ok(parsed)
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let formatted = serde_json::to_string_pretty(value).map_err(|error| error.to_string())?;
    println!("{formatted}");
    Ok(())
}

/// Time left until one minute past the next local midnight, when the day's
/// one-shot reminders are armed again.
fn until_rearm(now: NaiveDateTime) -> Duration {
    let rearm_at = now
        .date()
        .and_hms_opt(0, 1, 0)
        .map(|today| today + TimeDelta::days(1));
    let seconds = rearm_at
        .map(|rearm_at| (rearm_at - now).num_seconds())
        .unwrap_or(24 * 60 * 60);
    Duration::from_secs(u64::try_from(seconds.max(1)).unwrap_or(1))
}

async fn watch(state: &AppState, mut delivered: UnboundedReceiver<DeliveredNotification>) -> Result<(), String> {
    let permission = prepare_notifications(state).await?;
    let view = restore_reminders(state).await?;
    info!(
        app = %state.config().app_name,
        ?permission,
        active = view.schedule.iter().filter(|slot| slot.active).count(),
        "watching reminders, press Ctrl-C to stop"
    );
    print_json(&view)?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|error| error.to_string())?;
                info!("stopping reminder watch");
                return Ok(());
            }
            Some(notification) = delivered.recv() => {
                print_json(&notification)?;
            }
            _ = tokio::time::sleep(until_rearm(state.now())) => {
                restore_reminders(state).await?;
            }
        }
    }
}

async fn execute(workspace_root: PathBuf, command: CliCommand) -> Result<(), String> {
    let state = match command {
        CliCommand::Init => return print_json(&bootstrap(&workspace_root)?),
        CliCommand::Watch => {
            let (sink, delivered) = unbounded_channel();
            let state = AppState::with_delivery_sink(workspace_root, sink).map_err(|error| error.to_string())?;
            return watch(&state, delivered).await;
        }
        _ => AppState::new(workspace_root).map_err(|error| error.to_string())?,
    };

    match command {
        CliCommand::Show => print_json(&get_plan(&state).await?),
        CliCommand::Set { field, value } => print_json(&update_setting(&state, field, value).await?),
        CliCommand::Generate { edits } => {
            for (field, value) in edits {
                update_setting(&state, field, value).await?;
            }
            print_json(&generate_schedule(&state).await?)
        }
        CliCommand::Toggle { index } => print_json(&toggle_slot(&state, index).await?),
        CliCommand::ToggleAll { target } => print_json(&toggle_all(&state, target).await?),
        CliCommand::Init | CliCommand::Watch => Ok(()),
    }
}

fn workspace_root() -> Result<PathBuf, String> {
    match std::env::var_os(WORKSPACE_ENV) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => std::env::current_dir().map_err(|error| error.to_string()),
    }
}

pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let command = match parse_cli(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let result = workspace_root().and_then(|root| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|error| error.to_string())?
            .block_on(execute(root, command))
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 16)
            .expect("valid date")
            .and_hms_opt(hour, minute, second)
            .expect("valid time")
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(parse_cli(args(&["init"])), Ok(CliCommand::Init));
        assert_eq!(parse_cli(args(&["show"])), Ok(CliCommand::Show));
        assert_eq!(
            parse_cli(args(&["set", "glassSize", "300"])),
            Ok(CliCommand::Set {
                field: "glassSize".to_string(),
                value: "300".to_string()
            })
        );
        assert_eq!(
            parse_cli(args(&["generate", "wakeUp=07:00", "dailyLiters=2,5"])),
            Ok(CliCommand::Generate {
                edits: vec![
                    ("wakeUp".to_string(), "07:00".to_string()),
                    ("dailyLiters".to_string(), "2,5".to_string()),
                ]
            })
        );
        assert_eq!(parse_cli(args(&["toggle", "3"])), Ok(CliCommand::Toggle { index: 3 }));
        assert_eq!(
            parse_cli(args(&["toggle-all", "OFF"])),
            Ok(CliCommand::ToggleAll { target: Some(false) })
        );
        assert_eq!(parse_cli(args(&["toggle-all"])), Ok(CliCommand::ToggleAll { target: None }));
        assert_eq!(parse_cli(args(&["watch"])), Ok(CliCommand::Watch));
    }

    #[test]
    fn rejects_malformed_invocations() {
        for invocation in [
            args(&[]),
            args(&["toggle", "-1"]),
            args(&["toggle-all", "maybe"]),
            args(&["generate", "wakeUp"]),
            args(&["set", "glassSize"]),
            args(&["drink"]),
        ] {
            assert!(parse_cli(invocation.clone()).is_err(), "accepted {invocation:?}");
        }
    }

    #[test]
    fn rearm_waits_until_just_after_midnight() {
        assert_eq!(until_rearm(at(23, 0, 0)), Duration::from_secs(61 * 60));
        assert_eq!(until_rearm(at(0, 0, 30)), Duration::from_secs(24 * 60 * 60 + 30));
    }
}
