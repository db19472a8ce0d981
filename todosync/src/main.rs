//! `todosync`: follow a shared todo list from the terminal.
//!
//! Logs in (or uses a token), selects a list, subscribes to its push
//! channel and prints the task collection every time someone changes it.
//!
//! ```bash
//! todosync --email me@example.com --password secret --list 42
//!
//! # Or with a token from the environment
//! TODOSYNC_TOKEN=eyJ... todosync --ws-url wss://todo.example.com/ws
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use futures_util::FutureExt;
use tracing_appender::non_blocking::WorkerGuard;

use todosync::api::{self, ApiError, HttpTaskApi};
use todosync::channel::{ChannelManager, PushChannel};
use todosync::config::{CliArgs, ClientConfig};
use todosync::store::{StoreError, StoreSnapshot, TaskStore};
use todosync::sync::{RefetchHandler, SyncCoordinator, store_handler};

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("no credentials: set --token, or --email and --password")]
    NoCredentials,
    #[error("no list to follow")]
    NoList,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
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
    tracing::info!("todosync starting");

    match run(config).await {
        Ok(()) => {
            tracing::info!("todosync exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(err = %e, "todosync failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Install the `tracing` subscriber.
///
/// Writes to `file_path` when given, otherwise to stderr so stdout carries
/// only the task listing. The returned [`WorkerGuard`] must be held until
/// shutdown to flush buffered entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("TODOSYNC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file = file_path.and_then(|p| Some((p.parent()?, p.file_name()?)));
    let (writer, guard) = match file {
        Some((dir, name)) => {
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(env_filter)
        .with_ansi(file_path.is_none())
        .init();

    guard
}

async fn run(config: ClientConfig) -> Result<(), RunError> {
    let http = Arc::new(HttpTaskApi::new(config.to_api_config()));

    let token = match (&config.token, &config.email, &config.password) {
        (Some(token), _, _) => token.clone(),
        (None, Some(email), Some(password)) => http.login(email, password).await?.token,
        _ => return Err(RunError::NoCredentials),
    };
    http.set_token(Some(token.clone()));
    let user_id = api::user_id_from_token(&token)?;
    tracing::info!(user_id = %user_id, "authenticated");

    let store = Arc::new(TaskStore::new(Arc::clone(&http)));
    store.load_lists(user_id).await?;
    if let Some(list_id) = config.list_id {
        store.select_list(list_id).await?;
    }
    let list_id = store.current_list_id().ok_or(RunError::NoList)?;
    print_tasks(&store.snapshot());

    let channel = Arc::new(ChannelManager::new(config.to_channel_config()));
    let sync = SyncCoordinator::new(Arc::clone(&channel));
    sync.set_refetch_handler(printing_handler(Arc::clone(&store)));
    sync.attach(Some(list_id), Some(&token));

    let mut status = channel.watch_status();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = *status.borrow_and_update();
                if s.exhausted {
                    eprintln!("push channel gave up after {} attempts; restart to resume live updates", s.reconnect_attempts);
                }
                tracing::info!(state = %s.state, attempts = s.reconnect_attempts, "push channel status");
            }
        }
    }

    sync.detach();
    Ok(())
}

/// Refresh the store, then print the result.
fn printing_handler(store: Arc<TaskStore<HttpTaskApi>>) -> RefetchHandler {
    let refresh_store = store_handler(Arc::clone(&store));
    Arc::new(move |refresh| {
        let refresh_store = Arc::clone(&refresh_store);
        let store = Arc::clone(&store);
        async move {
            refresh_store(refresh).await;
            print_tasks(&store.snapshot());
        }
        .boxed()
    })
}

fn print_tasks(snapshot: &StoreSnapshot) {
    let title = snapshot
        .current_list
        .as_ref()
        .map_or("(no list)", |l| l.title.as_str());
    println!("== {title} [{}] ==", snapshot.filter);
    for task in &snapshot.tasks {
        let done = if task.completed { 'x' } else { ' ' };
        let star = if task.starred { " *" } else { "" };
        match task.due_date {
            Some(due) => println!("[{done}] {}{star} (due {due})", task.title),
            None => println!("[{done}] {}{star}", task.title),
        }
    }
    if let Some(error) = &snapshot.error {
        println!("! {error}");
    }
}
