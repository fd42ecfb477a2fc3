//! The CLI surface: subcommands mapping 1:1 onto service operations
//! (spec.md §6). Parsing (`Cli::parse`) and dispatch (`execute`) are kept
//! separate so dispatch can be exercised in tests without a process.

use clap::{Parser, Subcommand};
use tx_core::models::{NewTask, StatusFilter, TaskFilter, TaskStatus, UpdateTask};
use tx_services::{ClaimService, SyncService, TaskService};

use crate::dto::TaskView;
use crate::error::AdapterError;

#[derive(Parser, Debug)]
#[command(name = "tx")]
#[command(about = "Task graph, lease manager, and sync mirror CLI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Database path override.
    #[arg(long, env = "TX_DATABASE_URL")]
    pub db: Option<String>,

    /// Print machine-readable JSON instead of human text.
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Task graph operations.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Lease (claim) operations.
    Claim {
        #[command(subcommand)]
        command: ClaimCommand,
    },
    /// JSONL mirror operations.
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Create {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        score: Option<f64>,
    },
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        score: Option<f64>,
    },
    Show {
        id: String,
    },
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Ready,
    Remove {
        id: String,
        #[arg(long)]
        cascade: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ClaimCommand {
    Claim {
        task_id: String,
        worker_id: String,
        #[arg(long)]
        lease_minutes: Option<i64>,
    },
    Release {
        task_id: String,
        worker_id: String,
    },
    Renew {
        task_id: String,
        worker_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SyncCommand {
    Export,
    Import,
    Status,
}

/// Everything a [`Command`] needs to run, bundled so `execute` doesn't need
/// a long parameter list. Mirrors `Cli`'s three subcommand groups.
pub struct Services {
    pub tasks: TaskService,
    pub claims: ClaimService,
    pub sync: SyncService,
}

/// What a successfully executed command produced, left to the caller to
/// format (human text vs. `--json`) — dispatch itself never prints.
pub enum Output {
    Task(TaskView),
    Tasks(Vec<TaskView>),
    Removed,
    Claimed,
    Released,
    Renewed,
    SyncExported(u64),
    SyncImported { imported: u64, skipped: u64, conflicts: u64 },
    SyncStatus { dirty: bool },
}

fn parse_status(s: &str) -> Result<TaskStatus, AdapterError> {
    TaskStatus::from_str(s).ok_or_else(|| AdapterError::Validation(format!("unrecognized status: {s}")))
}

pub async fn execute(services: &Services, command: Command) -> Result<Output, AdapterError> {
    match command {
        Command::Task { command } => execute_task(services, command).await,
        Command::Claim { command } => execute_claim(services, command).await,
        Command::Sync { command } => execute_sync(services, command).await,
    }
}

async fn execute_task(services: &Services, command: TaskCommand) -> Result<Output, AdapterError> {
    match command {
        TaskCommand::Create { title, description, parent, score } => {
            let task = services
                .tasks
                .create(NewTask { title, description, parent_id: parent, score, ..Default::default() })
                .await?;
            let view = services.tasks.get_with_deps(&task.id).await?.map(TaskView::from).ok_or_else(|| AdapterError::NotFound(task.id.clone()))?;
            Ok(Output::Task(view))
        }
        TaskCommand::Update { id, title, status, score } => {
            let status = status.map(|s| parse_status(&s)).transpose()?;
            services.tasks.update(&id, UpdateTask { title, status, score, ..Default::default() }).await?;
            let view = services.tasks.get_with_deps(&id).await?.map(TaskView::from).ok_or_else(|| AdapterError::NotFound(id))?;
            Ok(Output::Task(view))
        }
        TaskCommand::Show { id } => {
            let view = services.tasks.get_with_deps(&id).await?.map(TaskView::from).ok_or_else(|| AdapterError::NotFound(id))?;
            Ok(Output::Task(view))
        }
        TaskCommand::List { status, limit } => {
            let status = status.map(|s| parse_status(&s)).transpose()?.map(StatusFilter::One);
            let filter = TaskFilter { status, parent_id: None, limit };
            let views = services.tasks.list_with_deps(filter).await?.into_iter().map(TaskView::from).collect();
            Ok(Output::Tasks(views))
        }
        TaskCommand::Ready => {
            let views = services
                .tasks
                .list_with_deps(TaskFilter::default())
                .await?
                .into_iter()
                .filter(|t| t.is_ready)
                .map(TaskView::from)
                .collect();
            Ok(Output::Tasks(views))
        }
        TaskCommand::Remove { id, cascade } => {
            services.tasks.remove(&id, cascade).await?;
            Ok(Output::Removed)
        }
    }
}

async fn execute_claim(services: &Services, command: ClaimCommand) -> Result<Output, AdapterError> {
    match command {
        ClaimCommand::Claim { task_id, worker_id, lease_minutes } => {
            services.claims.claim(&task_id, &worker_id, lease_minutes).await?;
            Ok(Output::Claimed)
        }
        ClaimCommand::Release { task_id, worker_id } => {
            services.claims.release(&task_id, &worker_id).await?;
            Ok(Output::Released)
        }
        ClaimCommand::Renew { task_id, worker_id } => {
            services.claims.renew(&task_id, &worker_id).await?;
            Ok(Output::Renewed)
        }
    }
}

async fn execute_sync(services: &Services, command: SyncCommand) -> Result<Output, AdapterError> {
    match command {
        SyncCommand::Export => Ok(Output::SyncExported(services.sync.export().await?)),
        SyncCommand::Import => {
            let report = services.sync.import().await?;
            Ok(Output::SyncImported { imported: report.imported, skipped: report.skipped, conflicts: report.conflicts })
        }
        SyncCommand::Status => {
            let status = services.sync.status().await?;
            Ok(Output::SyncStatus { dirty: status.dirty })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;
    use tx_database::Store;
    use tx_database::{SqliteClaimRepository, SqliteTaskDependencyRepository, SqliteTaskRepository};

    use super::*;

    async fn services() -> Services {
        let store = Store::open(":memory:").await.unwrap();
        store.migrate().await.unwrap();
        let pool = store.pool().clone();
        let tasks = TaskService::new(Arc::new(SqliteTaskRepository::new(pool.clone())), Arc::new(SqliteTaskDependencyRepository::new(pool.clone())));
        let claims = ClaimService::new(Arc::new(SqliteClaimRepository::new(store.clone())), Arc::new(SqliteTaskRepository::new(pool.clone())));
        let dir = tempdir().unwrap();
        let sync = SyncService::new(store, dir.path().join("tasks.jsonl"));
        Services { tasks, claims, sync }
    }

    #[tokio::test]
    async fn task_create_then_show_round_trips() {
        let services = services().await;
        let created = execute_task(&services, TaskCommand::Create { title: "write docs".to_string(), description: None, parent: None, score: None }).await.unwrap();
        let Output::Task(view) = created else { panic!("expected Output::Task") };

        let shown = execute_task(&services, TaskCommand::Show { id: view.id.clone() }).await.unwrap();
        let Output::Task(view2) = shown else { panic!("expected Output::Task") };
        assert_eq!(view.id, view2.id);
        assert_eq!(view2.title, "write docs");
    }

    #[tokio::test]
    async fn task_update_with_unrecognized_status_is_a_validation_error() {
        let services = services().await;
        let created = execute_task(&services, TaskCommand::Create { title: "x".to_string(), description: None, parent: None, score: None }).await.unwrap();
        let Output::Task(view) = created else { panic!("expected Output::Task") };

        let result = execute_task(&services, TaskCommand::Update { id: view.id, title: None, status: Some("bogus".to_string()), score: None }).await;
        assert!(matches!(result, Err(AdapterError::Validation(_))));
    }

    #[tokio::test]
    async fn task_show_for_unknown_id_is_not_found() {
        let services = services().await;
        let result = execute_task(&services, TaskCommand::Show { id: "tx-missing1".to_string() }).await;
        assert!(matches!(result, Err(AdapterError::NotFound(_))));
    }

    #[tokio::test]
    async fn claim_lifecycle_through_cli_dispatch() {
        let services = services().await;
        let created = execute_task(&services, TaskCommand::Create { title: "claimable".to_string(), description: None, parent: None, score: None }).await.unwrap();
        let Output::Task(view) = created else { panic!("expected Output::Task") };

        let claimed = execute_claim(&services, ClaimCommand::Claim { task_id: view.id.clone(), worker_id: "w-1".to_string(), lease_minutes: None }).await;
        assert!(matches!(claimed, Ok(Output::Claimed)));

        let second = execute_claim(&services, ClaimCommand::Claim { task_id: view.id.clone(), worker_id: "w-2".to_string(), lease_minutes: None }).await;
        assert!(second.is_err(), "a task already claimed by w-1 cannot be claimed by w-2");

        let released = execute_claim(&services, ClaimCommand::Release { task_id: view.id, worker_id: "w-1".to_string() }).await;
        assert!(matches!(released, Ok(Output::Released)));
    }

    #[tokio::test]
    async fn sync_status_reports_dirty_before_first_export() {
        let services = services().await;
        execute_task(&services, TaskCommand::Create { title: "needs sync".to_string(), description: None, parent: None, score: None }).await.unwrap();

        let status = execute_sync(&services, SyncCommand::Status).await.unwrap();
        assert!(matches!(status, Output::SyncStatus { dirty: true }));

        let exported = execute_sync(&services, SyncCommand::Export).await.unwrap();
        assert!(matches!(exported, Output::SyncExported(n) if n >= 1));

        let status = execute_sync(&services, SyncCommand::Status).await.unwrap();
        assert!(matches!(status, Output::SyncStatus { dirty: false }));
    }
}
