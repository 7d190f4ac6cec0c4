pub mod application;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::default_workspace_root;
use application::commands::{
    add_task_impl, complete_task_impl, get_config_impl, history_impl, list_tasks_impl, login_impl,
    logout_impl, pause_impl, remove_task_impl, resume_impl, set_api_base_url_impl, skip_impl,
    start_impl, status_impl, stop_impl, update_config_impl, watch_impl, AppState, WatchHooks,
    WatchResponse,
};
use application::config_form::ConfigPatch;
use application::ticker::TICK_PERIOD;
use application::timer::TickOutcome;
use clap::{Parser, Subcommand};
use domain::models::PomodoroSession;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pomotrack")]
#[command(version, about = "Pomodoro timer backed by a remote session API")]
#[command(
    after_help = "Environment:\n  POMOTRACK_HOME      Workspace directory\n  POMOTRACK_API_URL   API base URL override\n  POMOTRACK_EMAIL     Account used for login and the keyring\n  POMOTRACK_PASSWORD  Password for non-interactive login\n  RUST_LOG            Log verbosity"
)]
struct Cli {
    /// Workspace holding config/, state/ and logs/.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the open session and its countdown.
    Status,
    /// Start a new session.
    Start {
        /// work, short_break or long_break.
        #[arg(default_value = "work")]
        session_type: String,
        /// Work length in minutes; defaults to the server config.
        #[arg(long)]
        work: Option<u32>,
        /// Break length in minutes; defaults to the server config.
        #[arg(long = "break")]
        break_minutes: Option<u32>,
    },
    Pause,
    Resume,
    /// Cancel the open session.
    Stop,
    /// Complete the running session now.
    Skip,
    /// Follow the countdown until the session completes.
    Watch,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    History {
        #[arg(long)]
        offset: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    Logout,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        work: Option<u32>,
        #[arg(long)]
        short_break: Option<u32>,
        #[arg(long)]
        long_break: Option<u32>,
        #[arg(long)]
        long_break_interval: Option<u32>,
        #[arg(long)]
        alarm_sound: Option<String>,
        #[arg(long)]
        alarm_volume: Option<u32>,
        #[arg(long)]
        auto_start_breaks: Option<bool>,
        #[arg(long)]
        auto_start_pomodoros: Option<bool>,
    },
    /// Point the client at another API root.
    Endpoint { url: String },
}

#[derive(Subcommand)]
enum TaskCommand {
    List,
    Add { description: String },
    Done {
        task_id: String,
        /// Mark the task as not done instead.
        #[arg(long)]
        undo: bool,
    },
    Remove { task_id: String },
}

async fn status(state: &AppState) -> Result<serde_json::Value, String> {
    let response = status_impl(state)
        .await
        .map_err(|error| state.command_error("status", &error))?;
    to_json(&response)
}

async fn start(
    state: &AppState,
    session_type: String,
    work: Option<u32>,
    break_minutes: Option<u32>,
) -> Result<serde_json::Value, String> {
    let response = start_impl(state, session_type, work, break_minutes)
        .await
        .map_err(|error| state.command_error("start", &error))?;
    to_json(&response)
}

async fn pause(state: &AppState) -> Result<serde_json::Value, String> {
    let response = pause_impl(state)
        .await
        .map_err(|error| state.command_error("pause", &error))?;
    to_json(&response)
}

async fn resume(state: &AppState) -> Result<serde_json::Value, String> {
    let response = resume_impl(state)
        .await
        .map_err(|error| state.command_error("resume", &error))?;
    to_json(&response)
}

async fn stop(state: &AppState) -> Result<serde_json::Value, String> {
    let response = stop_impl(state)
        .await
        .map_err(|error| state.command_error("stop", &error))?;
    to_json(&response)
}

async fn skip(state: &AppState) -> Result<serde_json::Value, String> {
    let response = skip_impl(state)
        .await
        .map_err(|error| state.command_error("skip", &error))?;
    to_json(&response)
}

async fn watch(state: &AppState) -> Result<serde_json::Value, String> {
    let hooks = WatchHooks {
        period: TICK_PERIOD,
        on_tick: Arc::new(print_tick),
        on_complete: Some(Arc::new(|session: &PomodoroSession| {
            eprintln!();
            eprintln!("{} session finished", session.session_type.as_str());
        })),
    };
    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            log::warn!("ctrl-c handler unavailable: {error}");
            std::future::pending::<()>().await;
        }
    };
    let response: WatchResponse = watch_impl(state, hooks, shutdown)
        .await
        .map_err(|error| state.command_error("watch", &error))?;
    eprintln!();
    to_json(&response)
}

fn print_tick(outcome: &TickOutcome) {
    let line = match outcome {
        TickOutcome::Running(snapshot) => format!("{} remaining", snapshot.formatted()),
        TickOutcome::Paused(snapshot) => format!("{} paused", snapshot.formatted()),
        TickOutcome::Expired(_) => "00:00 waiting for the server to confirm".to_string(),
        TickOutcome::Completed(_) | TickOutcome::Idle => return,
    };
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r{line:<40}");
    let _ = stderr.flush();
}

async fn config(state: &AppState, command: ConfigCommand) -> Result<serde_json::Value, String> {
    match command {
        ConfigCommand::Show => {
            let config = get_config_impl(state)
                .await
                .map_err(|error| state.command_error("get_config", &error))?;
            to_json(&config)
        }
        ConfigCommand::Set {
            work,
            short_break,
            long_break,
            long_break_interval,
            alarm_sound,
            alarm_volume,
            auto_start_breaks,
            auto_start_pomodoros,
        } => {
            let patch = ConfigPatch {
                work_duration: work,
                short_break_duration: short_break,
                long_break_duration: long_break,
                long_break_interval,
                alarm_sound,
                alarm_volume,
                auto_start_breaks,
                auto_start_pomodoros,
            };
            let update = update_config_impl(state, patch)
                .await
                .map_err(|error| state.command_error("update_config", &error))?;
            to_json(&update)
        }
        ConfigCommand::Endpoint { url } => {
            let saved = set_api_base_url_impl(state, url)
                .map_err(|error| state.command_error("set_api_base_url", &error))?;
            to_json(&saved)
        }
    }
}

async fn history(
    state: &AppState,
    offset: Option<u32>,
    limit: Option<u32>,
) -> Result<serde_json::Value, String> {
    let view = history_impl(state, offset, limit)
        .await
        .map_err(|error| state.command_error("history", &error))?;
    to_json(&view)
}

async fn task(state: &AppState, command: TaskCommand) -> Result<serde_json::Value, String> {
    match command {
        TaskCommand::List => {
            let tasks = list_tasks_impl(state)
                .await
                .map_err(|error| state.command_error("list_tasks", &error))?;
            to_json(&tasks)
        }
        TaskCommand::Add { description } => {
            let task = add_task_impl(state, description)
                .await
                .map_err(|error| state.command_error("add_task", &error))?;
            to_json(&task)
        }
        TaskCommand::Done { task_id, undo } => {
            let task = complete_task_impl(state, task_id, !undo)
                .await
                .map_err(|error| state.command_error("complete_task", &error))?;
            to_json(&task)
        }
        TaskCommand::Remove { task_id } => {
            let removed = remove_task_impl(state, task_id)
                .await
                .map_err(|error| state.command_error("remove_task", &error))?;
            to_json(&removed)
        }
    }
}

async fn login(state: &AppState, email: Option<String>) -> Result<serde_json::Value, String> {
    let password = read_password()?;
    let response = login_impl(state, email, password)
        .await
        .map_err(|error| state.command_error("login", &error))?;
    to_json(&response)
}

fn logout(state: &AppState) -> Result<serde_json::Value, String> {
    let removed = logout_impl(state).map_err(|error| state.command_error("logout", &error))?;
    to_json(&removed)
}

/// `POMOTRACK_PASSWORD`, else one line from stdin.
fn read_password() -> Result<String, String> {
    if let Ok(password) = std::env::var("POMOTRACK_PASSWORD") {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    eprint!("password: ");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|error| format!("failed to read password: {error}"))?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err("password must not be empty".to_string());
    }
    Ok(password)
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|error| error.to_string())
}

async fn execute(cli: Cli) -> Result<serde_json::Value, String> {
    let workspace_root = match cli.root {
        Some(path) => path,
        None => default_workspace_root().map_err(|error| error.to_string())?,
    };
    let state = AppState::new(workspace_root).map_err(|error| error.to_string())?;

    match cli.command {
        Command::Status => status(&state).await,
        Command::Start {
            session_type,
            work,
            break_minutes,
        } => start(&state, session_type, work, break_minutes).await,
        Command::Pause => pause(&state).await,
        Command::Resume => resume(&state).await,
        Command::Stop => stop(&state).await,
        Command::Skip => skip(&state).await,
        Command::Watch => watch(&state).await,
        Command::Config { command } => config(&state, command).await,
        Command::History { offset, limit } => history(&state, offset, limit).await,
        Command::Task { command } => task(&state, command).await,
        Command::Login { email } => login(&state, email).await,
        Command::Logout => logout(&state),
    }
}

/// Entry point for the `pomotrack` binary; returns the process exit code.
pub fn run() -> i32 {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("error: failed to start async runtime: {error}");
            return 1;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(rendered) => {
                println!("{rendered}");
                0
            }
            Err(error) => {
                eprintln!("error: {error}");
                1
            }
        },
        Err(message) => {
            eprintln!("error: {message}");
            1
        }
    }
}
