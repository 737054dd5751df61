//! logstore CLI
//!
//! Command-line interface over the local stores:
//! - List index tables
//! - Ingest log lines as a chunk
//! - Resolve label queries to chunk references
//! - Fetch and print chunk contents
//! - Generate a default config file

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use logstore::chunk::{ChunkFetcher, LogEntry};
use logstore::config::{generate_default_config, Config, LoggingConfig};
use logstore::context::QueryContext;
use logstore::index::{ChunkRef, Labels, Timestamp};
use logstore::query::{IndexQuery, QueryEngine};
use logstore::storage::{
    label_hash_value, FsChunkStore, IndexWriter, SqliteIndexClient, TableClient, WriteBatch,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "logstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query label-indexed log chunks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List index tables
    Tables,

    /// Store log lines (one per line, from FILE or stdin) as a chunk and index it
    Ingest {
        #[command(flatten)]
        stream: StreamArgs,
        /// Input file (default: stdin)
        file: Option<PathBuf>,
    },

    /// Resolve label queries to chunk references
    Query {
        #[command(flatten)]
        selector: SelectorArgs,
    },

    /// Fetch chunks and print their log lines
    Fetch {
        #[command(flatten)]
        selector: SelectorArgs,
        /// Maximum number of lines to print
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct StreamArgs {
    /// Index table
    #[arg(short, long)]
    pub table: String,
    /// Tenant
    #[arg(short, long, default_value = "fake")]
    pub user: String,
    /// Labels in name=value format (repeatable)
    #[arg(short, long = "label", required = true)]
    pub labels: Vec<String>,
}

#[derive(Args)]
pub struct SelectorArgs {
    #[command(flatten)]
    pub stream: StreamArgs,
    /// Only chunks from this far back (e.g. 30s, 15m, 6h, 7d)
    #[arg(long, conflicts_with = "from")]
    pub since: Option<String>,
    /// Start of range: RFC 3339 or Unix milliseconds
    #[arg(long)]
    pub from: Option<String>,
    /// End of range: RFC 3339 or Unix milliseconds (default: now)
    #[arg(long)]
    pub to: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Tables => {
            let index = open_index(&config)?;
            let tables = index.list_tables().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else if tables.is_empty() {
                println!("No tables");
            } else {
                for table in tables {
                    println!("{table}");
                }
            }
        }

        Commands::Ingest { stream, file } => {
            let labels = parse_labels(&stream.labels)?;
            let lines = read_lines(file.as_ref())?;
            if lines.is_empty() {
                bail!("no log lines to ingest");
            }

            // consecutive timestamps keep the input order
            let now = Utc::now().timestamp_millis();
            let entries: Vec<LogEntry> = lines
                .into_iter()
                .enumerate()
                .map(|(i, line)| LogEntry::new(now + i as i64, line))
                .collect();

            let index = open_index(&config)?;
            let chunks = FsChunkStore::open(config.storage.chunk_dir())?;

            index.create_table(&stream.table).await?;
            let chunk_ref = chunks.put(&stream.user, &labels, &entries).await?;

            let mut batch = WriteBatch::new();
            batch.add_chunk(&stream.table, &chunk_ref, &labels);
            index.batch_write(batch).await?;

            tracing::info!(key = %chunk_ref.external_key(), entries = entries.len(), "ingested chunk");
            print_refs(&[chunk_ref], cli.json)?;
        }

        Commands::Query { selector } => {
            let engine = open_engine(&config)?;
            let refs = resolve(&engine, &selector).await?;
            print_refs(&refs, cli.json)?;
        }

        Commands::Fetch { selector, limit } => {
            let engine = open_engine(&config)?;
            let refs = resolve(&engine, &selector).await?;
            let (from, through) = time_range(&selector)?;

            let fetched = engine.fetch_chunks(&QueryContext::new(), refs).await;
            if let Some(err) = &fetched.last_error {
                eprintln!("warning: some chunks could not be fetched: {err}");
            }

            let mut lines: Vec<(Timestamp, String, String)> = fetched
                .chunks
                .into_iter()
                .flat_map(|chunk| {
                    let stream = chunk.labels.to_string();
                    chunk
                        .entries
                        .into_iter()
                        .filter(move |e| e.timestamp >= from && e.timestamp < through)
                        .map(move |e| (e.timestamp, stream.clone(), e.line))
                })
                .collect();
            lines.sort_by_key(|(ts, _, _)| *ts);
            if let Some(limit) = limit {
                lines.truncate(limit);
            }

            if cli.json {
                let rows: Vec<serde_json::Value> = lines
                    .iter()
                    .map(|(ts, stream, line)| {
                        serde_json::json!({ "timestamp": ts, "stream": stream, "line": line })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for (ts, stream, line) in lines {
                    println!("{} {} {}", format_time(ts), stream, line);
                }
            }
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("logstore={}", config.level)));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn open_index(config: &Config) -> Result<Arc<SqliteIndexClient>> {
    let path = config.storage.index_path();
    let index = SqliteIndexClient::open(&path)
        .with_context(|| format!("opening index at {}", path.display()))?
        .with_page_size(config.storage.index_page_size);
    Ok(Arc::new(index))
}

fn open_engine(config: &Config) -> Result<QueryEngine> {
    let index = open_index(config)?;
    let chunks = Arc::new(FsChunkStore::open(config.storage.chunk_dir())?);
    Ok(QueryEngine::new(index, chunks, &config.query).with_fetcher(
        ChunkFetcher::with_global_pool(config.query.max_chunk_fetch_parallelism),
    ))
}

/// Chunks carrying any of the selector's labels within its time range
async fn resolve(engine: &QueryEngine, selector: &SelectorArgs) -> Result<Vec<ChunkRef>> {
    let labels = parse_labels(&selector.stream.labels)?;
    let (from, through) = time_range(selector)?;

    let queries: Vec<IndexQuery> = labels
        .iter()
        .map(|label| {
            IndexQuery::new(
                selector.stream.table.as_str(),
                label_hash_value(&selector.stream.user, &label.name, &label.value),
            )
        })
        .collect();

    Ok(engine
        .chunk_refs_in_range(&QueryContext::new(), &queries, from, through)
        .await?)
}

fn parse_labels(pairs: &[String]) -> Result<Labels> {
    let mut parsed = Vec::with_capacity(pairs.len());
    for pair in pairs {
        match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() => parsed.push((name.to_string(), value.to_string())),
            _ => bail!("invalid label {pair:?}, expected name=value"),
        }
    }
    Ok(Labels::new(parsed))
}

fn read_lines(file: Option<&PathBuf>) -> Result<Vec<String>> {
    let lines: Vec<String> = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            content.lines().map(str::to_string).collect()
        }
        None => std::io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<Vec<_>>>()?,
    };
    Ok(lines.into_iter().filter(|l| !l.is_empty()).collect())
}

fn time_range(selector: &SelectorArgs) -> Result<(Timestamp, Timestamp)> {
    let now = Utc::now().timestamp_millis();
    let through = match &selector.to {
        Some(s) => parse_time(s)?,
        None => now + 1,
    };
    let from = match (&selector.since, &selector.from) {
        (Some(since), _) => now
            .checked_sub(parse_duration(since)?.num_milliseconds())
            .with_context(|| format!("--since {since} reaches past the earliest timestamp"))?,
        (None, Some(s)) => parse_time(s)?,
        (None, None) => Timestamp::MIN,
    };
    if from >= through {
        bail!("empty time range: from {from} is not before {through}");
    }
    Ok((from, through))
}

fn parse_time(s: &str) -> Result<Timestamp> {
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid time {s:?}, expected RFC 3339 or Unix milliseconds"))?;
    Ok(parsed.timestamp_millis())
}

fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (amount, unit): (&str, fn(i64) -> Option<Duration>) =
        if let Some(secs) = s.strip_suffix('s') {
            (secs, Duration::try_seconds)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, Duration::try_minutes)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, Duration::try_hours)
        } else if let Some(days) = s.strip_suffix('d') {
            (days, Duration::try_days)
        } else if let Some(weeks) = s.strip_suffix('w') {
            (weeks, Duration::try_weeks)
        } else {
            bail!("Invalid duration format: {s}. Use: 30s, 15m, 6h, 7d, 2w");
        };

    let amount: i64 = amount
        .parse()
        .with_context(|| format!("invalid duration amount in {s:?}"))?;
    unit(amount).with_context(|| format!("duration {s} is out of range"))
}

fn format_time(ms: Timestamp) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(t) => t.to_rfc3339(),
        None => ms.to_string(),
    }
}

fn print_refs(refs: &[ChunkRef], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(refs)?);
        return Ok(());
    }

    if refs.is_empty() {
        println!("No chunks found");
        return Ok(());
    }

    println!("{:<60} {:<26} {:<26}", "CHUNK", "START", "END");
    for r in refs {
        println!(
            "{:<60} {:<26} {:<26}",
            r.external_key(),
            format_time(r.start),
            format_time(r.end)
        );
    }
    println!("\n{} chunks", refs.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(since: &str) -> SelectorArgs {
        SelectorArgs {
            stream: StreamArgs {
                table: "index_1".to_string(),
                user: "fake".to_string(),
                labels: vec!["app=api".to_string()],
            },
            since: Some(since.to_string()),
            from: None,
            to: None,
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap().num_seconds(), 30);
        assert_eq!(parse_duration(" 6H ").unwrap().num_hours(), 6);
        assert_eq!(parse_duration("2w").unwrap().num_weeks(), 2);
        assert!(parse_duration("10y").is_err());
        assert!(parse_duration("xs").is_err());
    }

    #[test]
    fn test_out_of_range_duration_is_an_error() {
        assert!(parse_duration(&format!("{}w", i64::MAX)).is_err());
        assert!(parse_duration(&format!("{}s", i64::MAX)).is_err());
        assert!(time_range(&selector(&format!("{}s", i64::MAX))).is_err());
    }

    #[test]
    fn test_since_range() {
        let (from, through) = time_range(&selector("1h")).unwrap();
        assert_eq!(through - from, 3_600_001);
    }
}
