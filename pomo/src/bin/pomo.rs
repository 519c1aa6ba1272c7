// pomo: command-line front end
//
// Commands:
//   pomo create [-d 25m] [-p 4] [-t tag]... <message>
//   pomo start  [-d 25m] [-p 4] [-t tag]... <message>
//   pomo begin <task-id>
//   pomo list [-d 24h | --all] [-n limit] [--ascend]
//   pomo get [--flatten] [--pomodoros] [--ascend | --recent] [FILTER...]
//   pomo delete <task-id>...
//   pomo status | stop | config | init
//
// `start` and `begin` host the live session in this process until it
// completes or is stopped; every other command exits immediately.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use pomo_lib::logging;
use pomo_lib::render::{self, Tree};
use pomo_lib::session::client::SocketClient;
use pomo_lib::session::clock::SystemClock;
use pomo_lib::session::config::{Config, Settings};
use pomo_lib::session::persistence::{JsonTaskStore, TaskStore, TimeRange};
use pomo_lib::session::protocol::StatusSnapshot;
use pomo_lib::session::runtime::{SessionEvent, SessionRuntime};
use pomo_lib::session::server::SocketServer;
use pomo_lib::task::duration::parse_duration;
use pomo_lib::task::functional::{flatten, for_each_mut, prune};
use pomo_lib::task::{Filter, SortSpec, Task, TaskId, ROOT_ID};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

#[derive(Parser)]
#[command(name = "pomo", author, version, about = "Pomodoro task tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the task store, settings, socket and PID file
    #[arg(long, global = true, env = "POMO_DIR")]
    path: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the state directory and an empty task store
    Init,

    /// Display the current configuration
    #[command(alias = "cf")]
    Config,

    /// Create a new task without starting it
    #[command(alias = "c")]
    Create(TaskArgs),

    /// Create a new task and run its pomodoros now
    #[command(alias = "s")]
    Start(TaskArgs),

    /// Run the remaining pomodoros of an existing task
    #[command(alias = "b")]
    Begin {
        /// Task to run
        task_id: TaskId,
    },

    /// List top-level tasks started recently
    #[command(alias = "l")]
    List {
        /// Show tasks started within this window
        #[arg(short = 'd', long = "duration", default_value = "24h")]
        window: String,

        /// Show every task, including ones never started
        #[arg(short, long)]
        all: bool,

        /// Show at most this many tasks
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Oldest first
        #[arg(long)]
        ascend: bool,
    },

    /// Show the task tree, optionally filtered
    Get {
        /// Print one task per line instead of a tree
        #[arg(short, long)]
        flatten: bool,

        /// Show every pomodoro under its task (`--pomodoros=false` to hide)
        #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
        pomodoros: bool,

        /// Most recently started first
        #[arg(short, long)]
        recent: bool,

        /// Oldest first by id (wins over --recent)
        #[arg(short, long)]
        ascend: bool,

        /// Filters such as `tag=work`, `id=3`, `message=report` or a bare word
        filters: Vec<String>,
    },

    /// Delete stored tasks and their subtasks
    #[command(alias = "d")]
    Delete {
        #[arg(required = true)]
        task_ids: Vec<TaskId>,
    },

    /// Show the live session
    #[command(alias = "st")]
    Status,

    /// Stop the live session
    Stop,
}

#[derive(Args)]
struct TaskArgs {
    /// Length of each pomodoro, e.g. 25m or 1h30m
    #[arg(short, long)]
    duration: Option<String>,

    /// Number of pomodoros
    #[arg(short, long)]
    pomodoros: Option<usize>,

    /// Tags for this task
    #[arg(short, long = "tag")]
    tags: Vec<String>,

    /// What the task is about
    #[arg(required = true)]
    message: Vec<String>,
}

impl TaskArgs {
    fn into_task(self, settings: &Settings) -> Result<Task> {
        let duration = parse_duration(
            self.duration
                .as_deref()
                .unwrap_or(&settings.default_duration),
        )?;
        let count = self.pomodoros.unwrap_or(settings.default_pomodoros);
        Ok(Task::new(self.message.join(" "), self.tags, duration, count)?)
    }
}

#[derive(Serialize)]
struct ConfigView<'a> {
    #[serde(flatten)]
    config: &'a Config,
    tasks_file: PathBuf,
    settings_file: PathBuf,
    settings: &'a Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = match cli.path {
        Some(path) => Config::in_dir(path),
        None => Config::from_env(),
    };
    let settings = config.load_settings()?;
    let json = cli.json || settings.json;
    let store = Arc::new(JsonTaskStore::new(&config));

    match cli.command {
        Commands::Init => {
            let store = JsonTaskStore::init(&config)?;
            config
                .ensure_dirs()
                .context("Failed to create runtime directory")?;
            println!("initialized {}", store.path().display());
        }

        Commands::Config => {
            let view = ConfigView {
                config: &config,
                tasks_file: config.tasks_file(),
                settings_file: config.settings_file(),
                settings: &settings,
            };
            print_json(&view)?;
        }

        Commands::Create(args) => {
            let task = args.into_task(&settings)?;
            let id = store.write_task(&task)?;
            if json {
                print_json(&serde_json::json!({ "id": id }))?;
            } else {
                println!("{}", id);
            }
        }

        Commands::Start(args) => {
            let mut task = args.into_task(&settings)?;
            // A rival host makes bind fail before anything is written
            let server = SocketServer::bind(config.clone())?;
            task.id = store.write_task(&task)?;
            host_session(server, store, task, json).await?;
        }

        Commands::Begin { task_id } => {
            if task_id == ROOT_ID {
                bail!("task id must be positive");
            }
            let task = store.read_task(task_id)?;
            let server = SocketServer::bind(config.clone())?;
            host_session(server, store, task, json).await?;
        }

        Commands::List {
            window,
            all,
            limit,
            ascend,
        } => {
            let range = list_range(&window, all, Utc::now())?;
            let mut tasks = store.read_tasks(range)?;
            if !ascend {
                tasks.reverse();
            }
            if let Some(limit) = limit {
                tasks.truncate(limit);
            }

            if json {
                print_json(&tasks)?;
            } else {
                for task in &tasks {
                    println!("{}", render::history_line(task));
                }
            }
        }

        Commands::Get {
            flatten: flat,
            pomodoros,
            recent,
            ascend,
            filters,
        } => {
            let filters = Filter::parse_all(&filters)?;
            let root = store.read_task(ROOT_ID)?;
            let mut root = prune(&root, &filters);

            let order = SortSpec::from_flags(ascend, recent);
            for_each_mut(&mut root, |task| order.sort(&mut task.subtasks));

            if json {
                print_json(&root)?;
            } else if flat {
                for task in flatten(&root) {
                    println!("{}", render::task_line(task));
                }
            } else {
                print!("{}", Tree::new(&root).with_pomodoros(pomodoros));
            }
        }

        Commands::Delete { task_ids } => {
            for id in task_ids {
                store.delete_task(id)?;
                tracing::info!(task_id = id, "task deleted");
            }
        }

        Commands::Status => {
            let status = SocketClient::from_config(&config).status()?;
            print_status(status.as_ref(), json)?;
        }

        Commands::Stop => {
            let status = SocketClient::from_config(&config).stop()?;
            print_status(status.as_ref(), json)?;
        }
    }

    Ok(())
}

/// Run `task` in this process, answering on the already claimed `server`
/// until the session finishes
async fn host_session(
    server: SocketServer,
    store: Arc<JsonTaskStore>,
    task: Task,
    json: bool,
) -> Result<()> {
    let total = task.pomodoros.len();
    let runtime = Arc::new(SessionRuntime::new(task, store, Arc::new(SystemClock))?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_handle = tokio::spawn(server.serve(Arc::clone(&runtime), shutdown_rx));

    let mut events = runtime.subscribe();

    let stopper = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping session");
                if let Err(e) = runtime.stop().await {
                    tracing::error!(error = %e, "failed to stop session");
                }
            }
        })
    };

    let outcome = match runtime.start().await {
        Ok(status) => {
            if !json {
                println!("{}", render::status_line(Some(&status)));
            }
            let timer = runtime.run_timer();
            tokio::pin!(timer);
            let outcome = loop {
                tokio::select! {
                    outcome = &mut timer => break outcome,
                    event = events.recv() => match event {
                        Ok(event) => print_event(&event, total, json),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "progress output fell behind");
                        }
                        Err(broadcast::error::RecvError::Closed) => break (&mut timer).await,
                    },
                }
            };
            while let Ok(event) = events.try_recv() {
                print_event(&event, total, json);
            }
            outcome
        }
        Err(e) => Err(e),
    };

    stopper.abort();
    let _ = shutdown_tx.send(true);
    if let Err(e) = server_handle.await {
        tracing::warn!(error = %e, "status server task failed");
    }

    let status = outcome?;
    print_status(Some(&status), json)
}

/// Tasks started within `window` before `now`, or everything with `all`
fn list_range(window: &str, all: bool, now: DateTime<Utc>) -> Result<TimeRange> {
    if all {
        return Ok(TimeRange::all());
    }
    let window =
        chrono::Duration::from_std(parse_duration(window)?).context("list window is too large")?;
    let since = now
        .checked_sub_signed(window)
        .context("list window is too large")?;
    Ok(TimeRange::since(since))
}

fn print_event(event: &SessionEvent, total: usize, json: bool) {
    if !json {
        println!("{}", render::event_line(event, total));
    }
}

fn print_status(status: Option<&StatusSnapshot>, json: bool) -> Result<()> {
    if json {
        print_json(&status)
    } else {
        println!("{}", render::status_line(status));
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pomo").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_get_shows_pomodoros_unless_disabled() {
        match parse(&["get"]).command {
            Commands::Get { pomodoros, recent, .. } => {
                assert!(pomodoros);
                assert!(!recent);
            }
            _ => panic!("expected get"),
        }
        match parse(&["get", "--pomodoros=false", "tag=work"]).command {
            Commands::Get { pomodoros, filters, .. } => {
                assert!(!pomodoros);
                assert_eq!(filters, vec!["tag=work".to_string()]);
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_list_defaults_to_last_day() {
        match parse(&["l"]).command {
            Commands::List { window, all, limit, .. } => {
                assert_eq!(window, "24h");
                assert!(!all);
                assert_eq!(limit, None);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_list_range_rejects_overlong_window() {
        let now = Utc::now();
        let range = list_range("24h", false, now).unwrap();
        assert_eq!(range, TimeRange::since(now - chrono::Duration::hours(24)));
        assert!(list_range("3000000000h", false, now).is_err());
        assert!(list_range("3000000000h", true, now).unwrap().is_unbounded());

        let near_start = DateTime::<Utc>::MIN_UTC + chrono::Duration::hours(1);
        assert!(list_range("24h", false, near_start).is_err());
    }

    #[test]
    fn test_start_requires_message() {
        assert!(Cli::try_parse_from(["pomo", "start", "-d", "25m"]).is_err());
    }
}
