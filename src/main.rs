use clap::{Args, Parser, Subcommand};
use progress_tracker::application::commands::{
    AppState, TaskEdit, clear_day_override_impl, create_day_impl, create_phase_impl,
    create_task_impl, create_week_impl, delete_day_impl, delete_phase_impl, delete_task_impl,
    delete_week_impl, get_task_impl, list_days_impl, list_phases_impl, list_tasks_impl,
    list_weeks_impl, override_day_status_impl, plan_schedule_impl, poll_impl, task_action_impl,
    today_impl, update_day_impl, update_phase_impl, update_task_impl, update_week_impl,
};
use progress_tracker::{EntityId, TrackerError};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tracker", version, about = "Track work and break time across phases, weeks and days")]
struct Cli {
    /// Workspace root holding config/, state/ and logs/
    #[arg(long, global = true, env = "TRACKER_WORKSPACE")]
    workspace: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Phase operations
    Phase {
        #[command(subcommand)]
        action: PhaseAction,
    },
    /// Week operations
    Week {
        #[command(subcommand)]
        action: WeekAction,
    },
    /// Day operations and status overrides
    Day {
        #[command(subcommand)]
        action: DayAction,
    },
    /// Task operations and timer transitions
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },
    /// Active tasks with live timing and the suggested refresh interval
    Poll,
    /// Lay planned dates over every week and day
    Schedule {
        /// First date of the plan (YYYY-MM-DD); defaults to today
        #[arg(long)]
        start: Option<String>,
    },
    /// Tasks planned for a date
    Today {
        /// Date to list (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum PhaseAction {
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
    /// Change fields; a new start date replans this phase and later ones
    Edit {
        id: EntityId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    Rm {
        id: EntityId,
    },
}

#[derive(Subcommand)]
enum WeekAction {
    Add {
        #[arg(long)]
        phase: EntityId,
        number: i64,
        #[arg(long)]
        focus: Option<String>,
    },
    List {
        #[arg(long)]
        phase: Option<EntityId>,
    },
    Edit {
        id: EntityId,
        #[arg(long)]
        number: Option<i64>,
        #[arg(long)]
        focus: Option<String>,
        /// Move the week to another phase
        #[arg(long)]
        phase: Option<EntityId>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    Rm {
        id: EntityId,
    },
}

#[derive(Subcommand)]
enum DayAction {
    Add {
        #[arg(long)]
        week: EntityId,
        number: i64,
        #[arg(long)]
        focus: Option<String>,
    },
    List {
        #[arg(long)]
        week: Option<EntityId>,
    },
    Edit {
        id: EntityId,
        #[arg(long)]
        number: Option<i64>,
        #[arg(long)]
        focus: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Planned date (YYYY-MM-DD); "none" clears it
        #[arg(long)]
        date: Option<String>,
        /// Move the day, with its tasks, to another week
        #[arg(long)]
        week: Option<EntityId>,
    },
    Rm {
        id: EntityId,
    },
    /// Pin the day's status regardless of its tasks
    Override {
        id: EntityId,
        status: String,
    },
    ClearOverride {
        id: EntityId,
    },
}

#[derive(Args)]
struct Transition {
    id: EntityId,
    /// Instant of the transition (RFC 3339); defaults to now
    #[arg(long)]
    at: Option<String>,
}

#[derive(Subcommand)]
enum TaskCommand {
    Add {
        title: String,
        #[arg(long)]
        week: EntityId,
        #[arg(long)]
        day: Option<EntityId>,
        #[arg(long)]
        hour: Option<i64>,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        #[arg(long)]
        week: Option<EntityId>,
        #[arg(long)]
        day: Option<EntityId>,
        #[arg(long)]
        status: Option<String>,
        /// Hide completed tasks
        #[arg(long)]
        open: bool,
    },
    Edit {
        id: EntityId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        hour: Option<i64>,
        #[arg(long)]
        week: Option<EntityId>,
        #[arg(long, conflicts_with = "no_day")]
        day: Option<EntityId>,
        /// Move the task up to week level
        #[arg(long)]
        no_day: bool,
    },
    Rm {
        id: EntityId,
    },
    Show {
        id: EntityId,
    },
    Start(Transition),
    Pause(Transition),
    Break(Transition),
    Resume(Transition),
    Complete(Transition),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => match std::env::current_dir() {
            Ok(path) => path,
            Err(error) => {
                eprintln!("error: failed to resolve current directory: {error}");
                return ExitCode::FAILURE;
            }
        },
    };

    let state = match AppState::new(workspace_root) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(%error, "failed to initialize workspace");
            eprintln!("error: {error}");
            return ExitCode::FAILURE;
        }
    };

    match run(&state, cli.command) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn respond<T: Serialize>(state: &AppState, command: &str, result: Result<T, TrackerError>) -> Result<String, String> {
    let value = result.map_err(|error| state.command_error(command, &error))?;
    serde_json::to_string_pretty(&value).map_err(|error| state.command_error(command, &TrackerError::from(error)))
}

fn transition(state: &AppState, action: &str, args: Transition) -> Result<String, String> {
    respond(
        state,
        "task_action",
        task_action_impl(state, args.id, action.to_string(), args.at),
    )
}

fn run(state: &AppState, command: Command) -> Result<String, String> {
    match command {
        Command::Phase { action } => match action {
            PhaseAction::Add { name, description } => {
                respond(state, "create_phase", create_phase_impl(state, name, description))
            }
            PhaseAction::List => respond(state, "list_phases", list_phases_impl(state)),
            PhaseAction::Edit {
                id,
                name,
                description,
                start,
                end,
            } => respond(
                state,
                "update_phase",
                update_phase_impl(state, id, name, description, start, end),
            ),
            PhaseAction::Rm { id } => respond(state, "delete_phase", delete_phase_impl(state, id)),
        },
        Command::Week { action } => match action {
            WeekAction::Add { phase, number, focus } => {
                respond(state, "create_week", create_week_impl(state, phase, number, focus))
            }
            WeekAction::List { phase } => respond(state, "list_weeks", list_weeks_impl(state, phase)),
            WeekAction::Edit {
                id,
                number,
                focus,
                phase,
                start,
                end,
            } => respond(
                state,
                "update_week",
                update_week_impl(state, id, number, focus, phase, start, end),
            ),
            WeekAction::Rm { id } => respond(state, "delete_week", delete_week_impl(state, id)),
        },
        Command::Day { action } => match action {
            DayAction::Add { week, number, focus } => {
                respond(state, "create_day", create_day_impl(state, week, number, focus))
            }
            DayAction::List { week } => respond(state, "list_days", list_days_impl(state, week)),
            DayAction::Edit {
                id,
                number,
                focus,
                notes,
                date,
                week,
            } => respond(
                state,
                "update_day",
                update_day_impl(state, id, number, focus, notes, date, week),
            ),
            DayAction::Rm { id } => respond(state, "delete_day", delete_day_impl(state, id)),
            DayAction::Override { id, status } => respond(
                state,
                "override_day_status",
                override_day_status_impl(state, id, status),
            ),
            DayAction::ClearOverride { id } => {
                respond(state, "clear_day_override", clear_day_override_impl(state, id))
            }
        },
        Command::Task { action } => match action {
            TaskCommand::Add {
                title,
                week,
                day,
                hour,
                description,
            } => respond(
                state,
                "create_task",
                create_task_impl(state, title, description, hour, week, day),
            ),
            TaskCommand::List {
                week,
                day,
                status,
                open,
            } => respond(state, "list_tasks", list_tasks_impl(state, week, day, status, open)),
            TaskCommand::Edit {
                id,
                title,
                description,
                hour,
                week,
                day,
                no_day,
            } => {
                let edit = TaskEdit {
                    title,
                    description,
                    hour_number: hour,
                    week_id: week,
                    day_id: day,
                    detach_day: no_day,
                };
                respond(state, "update_task", update_task_impl(state, id, edit))
            }
            TaskCommand::Rm { id } => respond(state, "delete_task", delete_task_impl(state, id)),
            TaskCommand::Show { id } => respond(state, "get_task", get_task_impl(state, id)),
            TaskCommand::Start(args) => transition(state, "start", args),
            TaskCommand::Pause(args) => transition(state, "pause", args),
            TaskCommand::Break(args) => transition(state, "take_break", args),
            TaskCommand::Resume(args) => transition(state, "resume", args),
            TaskCommand::Complete(args) => transition(state, "complete", args),
        },
        Command::Poll => respond(state, "poll", poll_impl(state)),
        Command::Schedule { start } => respond(state, "plan_schedule", plan_schedule_impl(state, start)),
        Command::Today { date } => respond(state, "today", today_impl(state, date)),
    }
}
