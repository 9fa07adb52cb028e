//! Command-line client for a local Agora memory pool.

use agora_rs_config::{AgoraConfig, StoreProvider};
use agora_rs_core::{
    MemoryPool, SearchOptions, UpdateOutcome, WriteOutcome, WritePlan, WriteRequest,
};
use agora_rs_memory::{
    FileRecordStore, InMemoryMembership, InMemoryRecordStore, LogAuditSink, RecordStore,
};
use agora_rs_protocol::{RecordId, SharingPolicy};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_STORE_PATH: &str = ".agora/records.jsonl";

/// Command-line options for the Agora client.
#[derive(Parser)]
#[command(name = "agora", version)]
struct Cli {
    /// Optional path to an agora.json5 config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Record store file, overriding the configured path
    #[arg(long)]
    store: Option<PathBuf>,
    /// Agent performing the operation
    #[arg(long, default_value = "cli")]
    agent: String,
    /// Category membership as category:agent (repeatable)
    #[arg(long = "join", value_name = "CATEGORY:AGENT")]
    joins: Vec<String>,
    /// Shared space as space:agent,agent (repeatable)
    #[arg(long = "space-members", value_name = "SPACE:AGENTS")]
    spaces: Vec<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store content, skipping or merging duplicates unless --force is set
    Store {
        content: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long)]
        space: Option<String>,
        /// private, shared, category, or custom:a,b
        #[arg(long, default_value = "private")]
        share: SharingPolicy,
        #[arg(long)]
        force: bool,
    },
    /// Replace a record's content
    Update { id: RecordId, content: String },
    /// Change a record's sharing policy
    Share { id: RecordId, policy: SharingPolicy },
    /// Delete a record
    Delete { id: RecordId },
    /// Read a full record
    Get { id: RecordId },
    /// Index search returning summaries
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        exclude_expired: bool,
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// Records created around a record
    Timeline {
        id: RecordId,
        #[arg(long, default_value_t = 3)]
        before: usize,
        #[arg(long, default_value_t = 3)]
        after: usize,
        #[arg(long)]
        summaries: bool,
    },
    /// Full records by id
    Fetch {
        #[arg(required = true)]
        ids: Vec<RecordId>,
        #[arg(long)]
        metadata: bool,
    },
    /// Report redundant records owned by the agent
    Compact,
}

/// Entry point for the Agora CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let store = open_store(&config, cli.store.clone())?;
    let membership = Arc::new(InMemoryMembership::new());
    apply_memberships(&membership, &cli.joins, &cli.spaces)?;

    let pool = MemoryPool::builder(store)
        .membership(membership)
        .audit(Arc::new(LogAuditSink))
        .config(config)
        .build()
        .context("failed to build memory pool")?;
    run(&pool, &cli.agent, cli.command).await
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AgoraConfig> {
    if let Some(path) = path {
        info!("loading config from path: {}", path.display());
        return AgoraConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("failed to resolve current working directory")?;
    debug!("loading layered config from cwd: {}", cwd.display());
    let layered = AgoraConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

fn open_store(
    config: &AgoraConfig,
    override_path: Option<PathBuf>,
) -> anyhow::Result<Arc<dyn RecordStore>> {
    if override_path.is_none() && config.store.provider == StoreProvider::Memory {
        info!("using in-memory record store; records are discarded on exit");
        return Ok(Arc::new(InMemoryRecordStore::new()));
    }
    let path = override_path
        .or_else(|| config.store.path.clone().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    let store = FileRecordStore::open(&path)
        .with_context(|| format!("failed to open record store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn apply_memberships(
    membership: &InMemoryMembership,
    joins: &[String],
    spaces: &[String],
) -> anyhow::Result<()> {
    for join in joins {
        let Some((category, agent)) = join.split_once(':') else {
            bail!("invalid --join value {join:?}, expected CATEGORY:AGENT");
        };
        membership.join_category(category.trim(), agent.trim());
    }
    for space in spaces {
        let Some((name, agents)) = space.split_once(':') else {
            bail!("invalid --space-members value {space:?}, expected SPACE:AGENTS");
        };
        let agents = agents
            .split(',')
            .map(str::trim)
            .filter(|agent| !agent.is_empty());
        if !membership.create_space(name.trim(), agents) {
            bail!("space {name:?} given more than once");
        }
    }
    Ok(())
}

async fn run(pool: &MemoryPool, agent: &str, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Store {
            content,
            category,
            space,
            share,
            force,
        } => {
            let mut request = WriteRequest::new(agent, content)
                .category(category)
                .sharing(share);
            if let Some(space) = space {
                request = request.space(space);
            }
            if force {
                let outcome = pool.write(request, WritePlan::Store).await?;
                print_json(&describe_write(&outcome))
            } else {
                let (verdict, outcome) = pool.write_deduplicated(request).await?;
                print_json(&json!({ "verdict": verdict, "outcome": describe_write(&outcome) }))
            }
        }
        Command::Update { id, content } => {
            let outcome = pool
                .update_content(id, agent, &content, chrono::Utc::now())
                .await?;
            print_json(&describe_update(&outcome))
        }
        Command::Share { id, policy } => {
            let record = pool.change_sharing(id, agent, policy).await?;
            print_json(&record)
        }
        Command::Delete { id } => {
            pool.delete(id, agent).await?;
            print_json(&json!({ "deleted": id }))
        }
        Command::Get { id } => print_json(&pool.get(id, agent).await?),
        Command::Search {
            query,
            limit,
            exclude_expired,
            min_score,
        } => {
            let options = SearchOptions {
                exclude_expired,
                min_score,
            };
            print_json(&pool.search_index(&query, agent, limit, options).await?)
        }
        Command::Timeline {
            id,
            before,
            after,
            summaries,
        } => print_json(&pool.get_timeline(id, agent, before, after, summaries).await?),
        Command::Fetch { ids, metadata } => {
            print_json(&pool.get_memory_batch(&ids, agent, metadata).await?)
        }
        Command::Compact => print_json(&pool.compact(agent).await?),
    }
}

fn describe_write(outcome: &WriteOutcome) -> serde_json::Value {
    match outcome {
        WriteOutcome::Stored(record) => json!({ "stored": record }),
        WriteOutcome::Skipped => json!({ "skipped": true }),
        WriteOutcome::Merged(update) => json!({ "merged": describe_update(update) }),
    }
}

fn describe_update(outcome: &UpdateOutcome) -> serde_json::Value {
    match outcome {
        UpdateOutcome::Applied(record) => json!({ "applied": record }),
        UpdateOutcome::Superseded { current_updated_at } => {
            json!({ "superseded": { "current_updated_at": current_updated_at } })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_store_command() {
        let cli = Cli::try_parse_from([
            "agora",
            "--agent",
            "trading-bot",
            "--join",
            "markets:risk-mgmt",
            "store",
            "AAPL price is 187",
            "--category",
            "markets",
            "--share",
            "custom:risk-mgmt,ops",
        ])
        .expect("parse");
        assert_eq!(cli.agent, "trading-bot");
        assert_eq!(cli.joins, vec!["markets:risk-mgmt".to_string()]);
        let Command::Store { share, force, .. } = cli.command else {
            panic!("expected store command");
        };
        assert_eq!(share, SharingPolicy::custom(["risk-mgmt", "ops"]));
        assert!(!force);
    }

    #[test]
    fn rejects_malformed_memberships() {
        let membership = InMemoryMembership::new();
        assert!(apply_memberships(&membership, &["design".to_string()], &[]).is_err());
        assert!(
            apply_memberships(
                &membership,
                &["design:X".to_string()],
                &["ops:A, B".to_string()]
            )
            .is_ok()
        );
        assert_eq!(
            membership.space_members("ops"),
            Some(vec!["A".to_string(), "B".to_string()])
        );
    }
}
