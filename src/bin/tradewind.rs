//! tradewind CLI — operator interface to the work queue engine.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tradewind_worker::config::Config;
use tradewind_worker::config::secrets::ExposeSecret;
use tradewind_worker::db::Db;
use tradewind_worker::engine::{Poller, PollerConfig, WorkerDirector};
use tradewind_worker::handler::HandlerRegistry;
use tradewind_worker::model::{FinishWork, NewWork, WorkQueueFilter, WorkStatus};
use tradewind_worker::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "tradewind", about = "Work queue engine for the Tradewind platform")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the polling worker daemon
    Serve {
        /// Poll interval in milliseconds (overrides POLL_INTERVAL_MS)
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },
    /// Work item operations
    Work {
        #[command(subcommand)]
        action: WorkAction,
    },
}

#[derive(Subcommand)]
enum WorkAction {
    /// Enqueue a new work item
    Add {
        /// Work type (determines handler routing)
        work_type: String,
        /// JSON input payload
        #[arg(long)]
        input: Option<String>,
        /// Priority (higher = allocated first)
        #[arg(long)]
        priority: Option<i32>,
        /// Earliest execution time (RFC 3339)
        #[arg(long)]
        scheduled: Option<String>,
        /// Retry budget
        #[arg(long)]
        retries: Option<i32>,
        /// Processing timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<i64>,
    },
    /// Claim the next eligible work item
    Allocate {
        /// Restrict to these work types
        #[arg(long = "type", name = "type")]
        types: Vec<String>,
        /// Worker identity (defaults to WORKER_ID)
        #[arg(long)]
        worker: Option<String>,
    },
    /// Record the outcome of an allocated item
    Finish {
        /// Work item ID
        work_id: String,
        /// Mark the item successful (failure when omitted)
        #[arg(long)]
        success: bool,
        /// JSON result payload
        #[arg(long)]
        result: Option<String>,
        /// JSON error payload
        #[arg(long)]
        error: Option<String>,
        /// Worker identity reporting the outcome
        #[arg(long)]
        worker: Option<String>,
    },
    /// Soft-delete a work item
    Remove {
        /// Work item ID
        work_id: String,
    },
    /// List work items
    List {
        /// Filter by status (new, allocated, success, failed, deleted)
        #[arg(long)]
        status: Vec<String>,
        /// Filter by work type
        #[arg(long = "type", name = "type")]
        types: Vec<String>,
        /// Free-text search over type, worker, and input
        #[arg(long)]
        query: Option<String>,
        /// Maximum items to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a work item
    Show {
        /// Work item ID (full UUID or prefix)
        id: String,
    },
    /// List distinct work types in the queue
    Types,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { poll_interval_ms } => cmd_serve(poll_interval_ms).await,
        Command::Work { action } => {
            let config = Config::from_env()?;
            let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
            db.migrate().await?;

            let director = WorkerDirector::new(
                db,
                Arc::new(HandlerRegistry::with_builtins()),
                config.work_defaults,
                config.worker_id.clone(),
            );

            match action {
                WorkAction::Add {
                    work_type,
                    input,
                    priority,
                    scheduled,
                    retries,
                    timeout_ms,
                } => {
                    cmd_work_add(
                        &director, work_type, input, priority, scheduled, retries, timeout_ms,
                    )
                    .await
                }
                WorkAction::Allocate { types, worker } => {
                    cmd_work_allocate(&director, types, worker).await
                }
                WorkAction::Finish {
                    work_id,
                    success,
                    result,
                    error,
                    worker,
                } => cmd_work_finish(&director, work_id, success, result, error, worker).await,
                WorkAction::Remove { work_id } => {
                    let item = director.remove_work(&work_id).await?;
                    println!("Removed: {} (status: {})", item.id, item.status);
                    Ok(())
                }
                WorkAction::List {
                    status,
                    types,
                    query,
                    limit,
                } => cmd_work_list(&director, status, types, query, limit).await,
                WorkAction::Show { id } => cmd_work_show(&director, id).await,
                WorkAction::Types => {
                    for work_type in director.active_work_types().await? {
                        println!("{work_type}");
                    }
                    Ok(())
                }
            }
        }
    }
}

async fn cmd_serve(poll_interval_ms: Option<u64>) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "tradewind-worker".to_string(),
    })?;

    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;

    let director = Arc::new(WorkerDirector::new(
        Arc::clone(&db),
        Arc::new(HandlerRegistry::with_builtins()),
        config.work_defaults,
        config.worker_id.clone(),
    ));

    let poller = Poller::new(
        db,
        director,
        PollerConfig {
            poll_interval: std::time::Duration::from_millis(
                poll_interval_ms.unwrap_or(config.poll_interval_ms),
            ),
        },
    );

    let handle = poller.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        handle.shutdown();
    });

    poller.run().await?;
    Ok(())
}

async fn cmd_work_add(
    director: &WorkerDirector,
    work_type: String,
    input: Option<String>,
    priority: Option<i32>,
    scheduled: Option<String>,
    retries: Option<i32>,
    timeout_ms: Option<i64>,
) -> anyhow::Result<()> {
    let input: serde_json::Value = match input {
        Some(json) => serde_json::from_str(&json)?,
        None => serde_json::json!({}),
    };

    let mut new = NewWork::new(&work_type).input(input);
    if let Some(priority) = priority {
        new = new.priority(priority);
    }
    if let Some(ref at) = scheduled {
        let at: DateTime<Utc> = DateTime::parse_from_rfc3339(at)
            .map_err(|e| anyhow::anyhow!("invalid --scheduled: {e}"))?
            .with_timezone(&Utc);
        new = new.scheduled(at);
    }
    if let Some(retries) = retries {
        new = new.retries(retries);
    }
    if let Some(timeout_ms) = timeout_ms {
        new = new.timeout_ms(timeout_ms);
    }

    let item = director.add_work(new).await?;
    println!(
        "Enqueued: {} (type: {}, priority: {}, scheduled: {})",
        item.id,
        item.work_type,
        item.priority,
        item.scheduled.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

async fn cmd_work_allocate(
    director: &WorkerDirector,
    types: Vec<String>,
    worker: Option<String>,
) -> anyhow::Result<()> {
    let types = if types.is_empty() { None } else { Some(types) };
    let item = director
        .allocate_work(types.as_deref(), worker.as_deref())
        .await?;

    match item {
        Some(item) => println!(
            "Allocated: {} (type: {}, worker: {})",
            item.id,
            item.work_type,
            item.worker.as_deref().unwrap_or("-")
        ),
        None => println!("No eligible work."),
    }
    Ok(())
}

async fn cmd_work_finish(
    director: &WorkerDirector,
    work_id: String,
    success: bool,
    result: Option<String>,
    error: Option<String>,
    worker: Option<String>,
) -> anyhow::Result<()> {
    let result: Option<serde_json::Value> =
        result.map(|s| serde_json::from_str(&s)).transpose()?;
    let error: Option<serde_json::Value> = error.map(|s| serde_json::from_str(&s)).transpose()?;

    let item = director
        .finish_work(
            &work_id,
            FinishWork {
                success,
                result,
                error,
                worker,
                started: None,
                finished: None,
            },
        )
        .await?;

    println!("Finished: {} (status: {})", item.id, item.status);
    Ok(())
}

async fn cmd_work_list(
    director: &WorkerDirector,
    status: Vec<String>,
    types: Vec<String>,
    query: Option<String>,
    limit: i64,
) -> anyhow::Result<()> {
    let status: Option<Vec<WorkStatus>> = if status.is_empty() {
        None
    } else {
        Some(
            status
                .iter()
                .map(|s| s.parse())
                .collect::<Result<_, _>>()
                .map_err(|e| anyhow::anyhow!("{e}"))?,
        )
    };

    let items = director
        .work_queue(&WorkQueueFilter {
            status,
            types: if types.is_empty() { None } else { Some(types) },
            query_string: query,
            limit: Some(limit),
            ..Default::default()
        })
        .await?;

    if items.is_empty() {
        println!("No work items found.");
        return Ok(());
    }

    // Header
    println!(
        "{:<8}  {:<14}  {:<10}  {:<4}  {:<16}  CREATED",
        "ID", "TYPE", "STATUS", "PRI", "WORKER"
    );
    println!("{}", "-".repeat(80));

    for item in &items {
        println!(
            "{:<8}  {:<14}  {:<10}  {:<4}  {:<16}  {}",
            item.id.to_string(),
            item.work_type,
            item.status.to_string(),
            item.priority,
            item.worker.as_deref().unwrap_or("-"),
            item.created.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} item(s)", items.len());
    Ok(())
}

async fn cmd_work_show(director: &WorkerDirector, id_str: String) -> anyhow::Result<()> {
    // Support prefix matching — find the work item whose ID starts with the given string
    let id = if id_str.len() < 36 {
        let items = director
            .work_queue(&WorkQueueFilter {
                limit: Some(100),
                ..Default::default()
            })
            .await?;
        let matches: Vec<_> = items
            .iter()
            .filter(|item| item.id.0.to_string().starts_with(&id_str))
            .collect();
        match matches.len() {
            0 => anyhow::bail!("no work item matching prefix '{id_str}'"),
            1 => matches[0].id.0.to_string(),
            n => anyhow::bail!("{n} work items match prefix '{id_str}' — be more specific"),
        }
    } else {
        id_str
    };

    let item = director
        .find_work(&id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("work item {id} not found"))?;

    println!("ID:         {}", item.id.0);
    println!("Type:       {}", item.work_type);
    println!("Status:     {}", item.status);
    println!("Priority:   {}", item.priority);
    println!("Scheduled:  {}", item.scheduled);
    println!("Retries:    {}", item.retries);
    println!(
        "Timeout:    {}",
        item.timeout_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or("-".to_string())
    );
    println!("Worker:     {}", item.worker.as_deref().unwrap_or("-"));
    println!("Input:      {}", serde_json::to_string_pretty(&item.input)?);
    println!("Created:    {}", item.created);
    println!("Updated:    {}", item.updated);
    if let Some(started) = item.started {
        println!("Started:    {started}");
    }
    if let Some(finished) = item.finished {
        println!("Finished:   {finished}");
    }
    if let Some(deleted) = item.deleted {
        println!("Deleted:    {deleted}");
    }
    if let Some(original) = item.original {
        println!("Original:   {}", original.0);
    }
    if let Some(ref result) = item.result {
        println!("Result:     {}", serde_json::to_string_pretty(result)?);
    }
    if let Some(ref error) = item.error {
        println!("Error:      {}", serde_json::to_string_pretty(error)?);
    }

    Ok(())
}
