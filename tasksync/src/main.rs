//! `tasksync` command-line client.
//!
//! Reads go to the backend when it is reachable and fall back to the local
//! cache when it is not. Writes need the backend. Configuration via CLI
//! flags, environment variables, or config file
//! (`~/.config/tasksync/config.toml`).
//!
//! ```bash
//! tasksync login ann --password secret
//! tasksync sync
//! tasksync lists
//! tasksync add-task 3 "Write report" --estimate 45
//! tasksync set-status 12 completed
//! tasksync watch
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use tasksync::actions::Actions;
use tasksync::auth::{Session, SessionError};
use tasksync::cache::{FileStore, LocalCache, StoreError};
use tasksync::config::{CliArgs, ClientConfig, Command};
use tasksync::connectivity::{ConnectivityMonitor, TcpProbe};
use tasksync::gateway::http::HttpSetupError;
use tasksync::gateway::{GatewayError, HttpGateway, RemoteGateway};
use tasksync::state::{AppState, SyncStatus};
use tasksync::sync::{SyncOrchestrator, SyncOutcome};
use tasksync_proto::api::{TaskDraft, TaskListDraft, TaskListPatch, TaskQuery};
use tasksync_proto::{Task, TaskList};

/// Failures that end a command.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Setup(#[from] HttpSetupError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("sync failed: {0}")]
    Sync(GatewayError),
    #[error("not signed in (run `tasksync login`)")]
    NotSignedIn,
}

type Gateway = HttpGateway<FileStore>;

/// Everything a command may need, wired once.
struct Client {
    store: Arc<FileStore>,
    monitor: Arc<ConnectivityMonitor>,
    state: Arc<AppState>,
    gateway: Arc<Gateway>,
    session: Session<Gateway, FileStore>,
    sync: Arc<SyncOrchestrator<Gateway, FileStore>>,
    actions: Actions<Gateway>,
}

impl Client {
    async fn connect(config: &ClientConfig) -> Result<Self, CliError> {
        let store = Arc::new(FileStore::open(&config.data_dir).await?);
        let state = Arc::new(AppState::new());
        let gateway = Arc::new(
            HttpGateway::new(&config.base_url, config.request_timeout, Arc::clone(&store))?
                .with_state(Arc::clone(&state)),
        );

        let monitor = match TcpProbe::for_url(gateway.base_url(), config.probe_timeout) {
            Some(probe) => ConnectivityMonitor::start(probe, config.probe_interval).await,
            None => {
                tracing::warn!(url = %config.base_url, "base URL has no probeable host");
                ConnectivityMonitor::manual(false)
            }
        };
        let monitor = Arc::new(monitor);
        state.set_network_online(monitor.is_reachable());

        let session = Session::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            Arc::clone(&state),
        );
        let sync = Arc::new(SyncOrchestrator::new(
            Arc::clone(&gateway),
            LocalCache::new(Arc::clone(&store)),
            Arc::clone(&monitor),
            Arc::clone(&state),
            config.sync_config(),
        ));
        let actions = Actions::new(
            Arc::clone(&gateway),
            Arc::clone(&monitor),
            Arc::clone(&state),
        );

        session.restore().await?;
        sync.load_cached().await;

        Ok(Self {
            store,
            monitor,
            state,
            gateway,
            session,
            sync,
            actions,
        })
    }

    fn require_user(&self) -> Result<(), CliError> {
        if self.state.user().is_some() {
            Ok(())
        } else {
            Err(CliError::NotSignedIn)
        }
    }

    /// Tell the user when a read is served from the cache.
    fn report_freshness(outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Synced | SyncOutcome::Skipped => {}
            SyncOutcome::Pending => eprintln!("offline: showing cached data"),
            SyncOutcome::Failed(e) => eprintln!("refresh failed ({e}): showing cached data"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(base_url = %config.base_url, "tasksync starting");

    let command = cli.command.clone().unwrap_or(Command::Status);
    match run(command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs are written to a file so stdout carries only command output.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tasksync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, config: &ClientConfig) -> Result<(), CliError> {
    let client = Client::connect(config).await?;

    match command {
        Command::Login {
            identifier,
            password,
        } => {
            let user = client.session.login(&identifier, &password).await?;
            println!("signed in as {} ({})", user.username, user.id);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let user = client
                .session
                .register(&username, &email, &password)
                .await?;
            println!("registered and signed in as {} ({})", user.username, user.id);
        }
        Command::Logout => {
            client.session.logout().await?;
            println!("signed out");
        }
        Command::Whoami => {
            let user = client.session.current_user().await?;
            println!("{} <{}> (id {})", user.username, user.email, user.id);
        }
        Command::ForgotPassword { email } => {
            client.session.forgot_password(&email).await?;
            println!("if {email} has an account, a reset code is on its way");
        }
        Command::ResetPassword {
            code,
            password,
            confirm,
        } => {
            let user = client
                .session
                .reset_password(&code, &password, &confirm)
                .await?;
            println!("password changed, signed in as {}", user.username);
        }
        Command::Lists => {
            client.require_user()?;
            Client::report_freshness(&client.sync.sync_task_lists().await);
            print_lists(&client.state.task_lists());
        }
        Command::Tasks { list, status } => {
            client.require_user()?;
            Client::report_freshness(&client.sync.sync_tasks(list).await);
            let tasks: Vec<Task> = client
                .state
                .tasks(list)
                .into_iter()
                .filter(|t| status.is_none_or(|s| t.status == s))
                .collect();
            print_tasks(&tasks);
        }
        Command::Assigned { user } => {
            client.require_user()?;
            let tasks = client
                .gateway
                .list_tasks(TaskQuery::assigned_to(user))
                .await?;
            print_tasks(&tasks);
        }
        Command::Sync => {
            client.require_user()?;
            match client.sync.sync_all().await {
                SyncOutcome::Synced => {
                    println!("synced {} lists", client.state.task_lists().len());
                }
                SyncOutcome::Pending => println!("offline: sync pending"),
                SyncOutcome::Skipped => println!("sync already running"),
                SyncOutcome::Failed(e) => return Err(CliError::Sync(e)),
            }
        }
        Command::CreateList {
            title,
            description,
            public,
        } => {
            let draft = TaskListDraft {
                title,
                description,
                is_public: public,
            };
            let list = client.actions.create_task_list(draft).await?;
            println!("created list {}: {}", list.id, list.title);
        }
        Command::UpdateList {
            list,
            title,
            description,
            public,
        } => {
            let patch = TaskListPatch {
                title,
                description,
                is_public: public,
                collaborators: None,
            };
            let list = client.actions.update_task_list(list, patch).await?;
            println!("updated list {}: {}", list.id, list.title);
        }
        Command::DeleteList { list } => {
            client.actions.delete_task_list(list).await?;
            println!("deleted list {list}");
        }
        Command::Share { list, user } => {
            let list = client.actions.add_collaborator(list, user).await?;
            println!("list {} shared with user {user}", list.id);
        }
        Command::Unshare { list, user } => {
            let list = client.actions.remove_collaborator(list, user).await?;
            println!("list {} no longer shared with user {user}", list.id);
        }
        Command::AddTask {
            list,
            title,
            description,
            estimate,
            assign,
            due,
        } => {
            let draft = TaskDraft {
                description,
                estimated_minutes: estimate,
                assigned_to: assign,
                due_date: due,
                ..TaskDraft::new(list, title)
            };
            let task = client.actions.create_task(draft).await?;
            println!("created task {}: {}", task.id, task.title);
        }
        Command::SetStatus { task, status } => {
            let task = client.actions.update_task_status(task, status).await?;
            println!("task {} is now {}", task.id, task.status);
        }
        Command::DeleteTask { task } => {
            client.actions.delete_task(task).await?;
            println!("deleted task {task}");
        }
        Command::Status => print_status(&client).await,
        Command::ClearCache => {
            let removed = client.sync.clear_cache().await;
            println!("removed {removed} cached entries");
        }
        Command::Watch => {
            client.require_user()?;
            watch(&client).await;
        }
    }
    Ok(())
}

async fn print_status(client: &Client) {
    let sync = client.state.sync_state();
    let user = client
        .state
        .user()
        .map_or_else(|| "not signed in".to_string(), |u| u.username);
    println!("user:      {user}");
    println!(
        "backend:   {}",
        if client.monitor.is_reachable() {
            "reachable"
        } else {
            "unreachable"
        }
    );
    println!("status:    {}", sync.status);
    match client.sync.last_synced_at().await {
        Some(at) => println!("last sync: {}", at.to_rfc3339()),
        None => println!("last sync: never"),
    }
    println!("cached:    {} lists", client.state.task_lists().len());
    println!("data dir:  {}", client.store.dir().display());
}

async fn watch(client: &Client) {
    let _driver = client.sync.spawn_background();
    let mut changes = client.state.subscribe();
    if client.monitor.is_reachable() {
        Client::report_freshness(&client.sync.sync_all().await);
    }
    println!("watching (ctrl-c to stop)");

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = changes.borrow_and_update().clone();
                if client.state.user().is_none() {
                    println!("signed out by the server, log in again");
                    break;
                }
                let online = if s.online { "online" } else { "offline" };
                let busy = if s.syncing { ", syncing" } else { "" };
                match s.last_error {
                    Some(e) if s.status == SyncStatus::Error => {
                        println!("[{online}] {}{busy}: {e}", s.status);
                    }
                    _ => println!("[{online}] {}{busy}", s.status),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    tracing::info!("watch stopped");
}

fn print_lists(lists: &[TaskList]) {
    if lists.is_empty() {
        println!("no task lists");
        return;
    }
    for list in lists {
        let shared = if list.collaborators.is_empty() {
            String::new()
        } else {
            format!(", shared with {}", list.collaborators.len())
        };
        let visibility = if list.is_public { "public" } else { "private" };
        println!("{:>5}  {} ({visibility}{shared})", list.id.get(), list.title);
    }
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        let due = task
            .due_date
            .map(|d| format!(" due {}", d.format("%Y-%m-%d")))
            .unwrap_or_default();
        println!(
            "{:>5}  [{:<11}] {}{due}",
            task.id.get(),
            task.status.to_string(),
            task.title
        );
    }
}
