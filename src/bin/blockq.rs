//! blockq CLI: block validation and task queue operations.

use std::path::{Path, PathBuf};

use blockq::config::Config;
use blockq::lifecycle::{self, Transition};
use blockq::model::TaskRecord;
use blockq::storage::{QueueStore, find, select_pending};
use blockq::telemetry::task::start_task_span;
use blockq::telemetry::{LogLevel, init_logging, set_level};
use blockq::validate::RecordValidator;
use chrono::Utc;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blockq", about = "Block validation and task queue operations")]
struct Cli {
    /// Override OPERATOR_LOG_LEVEL (DEBUG, INFO, WARNING, ERROR)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Block file operations
    Block {
        #[command(subcommand)]
        action: BlockAction,
    },
    /// Queue file operations
    Queue {
        /// Queue file (defaults to OPERATOR_QUEUE_PATH)
        #[arg(long, global = true)]
        queue: Option<PathBuf>,
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum BlockAction {
    /// Read and validate a block file
    Validate {
        path: PathBuf,
        /// Validate strictly even if the block is not `ok`
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// List pending tasks in dequeue order
    Pending {
        /// Maximum tasks to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a task
    Show { id: String },
    /// Mark a task in progress
    Start { id: String },
    /// Mark a task done
    Complete {
        id: String,
        #[arg(long)]
        result_path: String,
    },
    /// Mark a task failed
    Fail {
        id: String,
        #[arg(long)]
        error_msg: String,
        #[arg(long)]
        error_path: String,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_logging(config.log_config())?;
    if let Some(level) = cli.log_level {
        set_level(level)?;
    }

    match cli.command {
        Command::Block { action } => match action {
            BlockAction::Validate { path, strict } => cmd_block_validate(&path, strict),
        },
        Command::Queue { queue, action } => {
            let path = queue.unwrap_or_else(|| config.queue_path.clone());
            let store = QueueStore::new()?;
            match action {
                QueueAction::Pending { limit } => cmd_queue_pending(&store, &path, limit),
                QueueAction::Show { id } => cmd_queue_show(&store, &path, &id),
                QueueAction::Start { id } => cmd_queue_transition(&store, &path, &id, "start", |tasks| {
                    lifecycle::start_by_id(tasks, &id)
                }),
                QueueAction::Complete { id, result_path } => {
                    cmd_queue_transition(&store, &path, &id, "complete", |tasks| {
                        lifecycle::complete_by_id(tasks, &id, result_path, Utc::now())
                    })
                }
                QueueAction::Fail {
                    id,
                    error_msg,
                    error_path,
                } => cmd_queue_transition(&store, &path, &id, "fail", |tasks| {
                    lifecycle::fail_by_id(tasks, &id, error_msg, error_path, Utc::now())
                }),
            }
        }
    }
}

fn cmd_block_validate(path: &Path, strict: bool) -> anyhow::Result<()> {
    let validator = RecordValidator::new()?;
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    let (record, report) = validator.validate_value(&value, strict)?;

    println!("Block:      {}", record.block_id);
    println!("Status:     {}", record.status);
    println!("Mode:       {}", if report.strict { "strict" } else { "soft" });
    println!("Encoding:   {} (declared {})", report.encoding_used, record.encoding);
    println!("Size:       {} bytes (recorded {})", report.computed_size, record.size_bytes);
    println!("SHA-256:    {}", report.computed_hash);
    if report.is_clean() {
        println!("Result:     clean");
    } else {
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  [{}] {}", warning.rule, warning.message);
        }
    }
    Ok(())
}

fn cmd_queue_pending(store: &QueueStore, path: &Path, limit: usize) -> anyhow::Result<()> {
    let tasks = store.load(path)?;
    let pending = select_pending(&tasks);

    if pending.is_empty() {
        println!("No pending tasks.");
        return Ok(());
    }

    println!("{:<24}  {:<5}  {:<26}  BLOCK", "ID", "PRI", "CREATED");
    println!("{}", "-".repeat(80));
    for task in pending.iter().take(limit) {
        println!(
            "{:<24}  {:<5}  {:<26}  {}",
            task.id,
            task.priority,
            task.created_at,
            task.block_id.as_deref().unwrap_or("-")
        );
    }

    println!("\n{} pending of {} task(s)", pending.len(), tasks.len());
    Ok(())
}

fn cmd_queue_show(store: &QueueStore, path: &Path, id: &str) -> anyhow::Result<()> {
    let tasks = store.load(path)?;
    let Some(task) = find(&tasks, id) else {
        anyhow::bail!("no task with id '{id}' in {}", path.display());
    };
    println!("{}", serde_json::to_string_pretty(task)?);
    Ok(())
}

fn cmd_queue_transition<F>(
    store: &QueueStore,
    path: &Path,
    id: &str,
    op: &str,
    apply: F,
) -> anyhow::Result<()>
where
    F: FnOnce(&mut [TaskRecord]) -> Transition,
{
    let mut tasks = store.load(path)?;
    let span = start_task_span(op, id);
    let outcome = span.in_scope(|| apply(&mut tasks));

    match outcome {
        Transition::Applied { from, to } => {
            store.save(path, &tasks)?;
            println!("{id}: {from} -> {to}");
        }
        Transition::Unchanged(status) => println!("{id}: already {status} (no change)"),
        Transition::Rejected { current, requested } => {
            anyhow::bail!("{id}: cannot mark as {requested} (already {current})")
        }
        Transition::NotFound(id) => anyhow::bail!("no task with id '{id}' in {}", path.display()),
    }
    Ok(())
}
