//! kessan CLI binary.
//!
//! Fetches EDINET filings into SQLite and audits what was stored.

mod integration;

use clap::{Args, Parser, Subcommand};
use integration::progress::BarProgress;
use integration::{logging, report, store_manager};
use kessan::data::edinet::{EDINET_BASE_URL, EdinetClient, RetryPolicy};
use kessan::{CategoryFilter, ConfigError, MarketGroup, ReferenceConfig, RunConfig, jst_today, parse_date, run_pipeline};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Parser)]
#[command(name = "kessan")]
#[command(about = "kessan: EDINET filings and XBRL financials into SQLite", long_about = None)]
#[command(version)]
struct Cli {
    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List, extract and store filings for a date range
    Fetch(Box<FetchArgs>),

    /// Show listing gaps and failed documents
    Audit {
        /// SQLite database path
        #[arg(long, env = "KESSAN_DB")]
        db: Option<PathBuf>,

        /// Maximum failed documents to print
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// First listing day, YYYY-MM-DD (default: today in JST)
    #[arg(long, env = "KESSAN_START_DATE")]
    start: Option<String>,

    /// Last listing day, YYYY-MM-DD (default: today in JST)
    #[arg(long, env = "KESSAN_END_DATE")]
    end: Option<String>,

    /// Keep every document type instead of filtering by description
    #[arg(long, conflicts_with = "keyword")]
    all_types: bool,

    /// Description keyword; repeat for several (default: 有価証券報告書)
    #[arg(long)]
    keyword: Vec<String>,

    /// Restrict to a market tier or index: prime, standard, growth, nikkei225
    #[arg(long)]
    market: Option<String>,

    /// Store every numeric fact as JSON
    #[arg(long)]
    full_capture: bool,

    /// Documents processed concurrently
    #[arg(long, env = "KESSAN_WORKERS", default_value = "6")]
    workers: usize,

    /// SQLite database path
    #[arg(long, env = "KESSAN_DB")]
    db: Option<PathBuf>,

    /// EDINET API subscription key
    #[arg(long, env = "EDINET_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// EDINET API base URL
    #[arg(long, env = "EDINET_BASE_URL", default_value = EDINET_BASE_URL)]
    base_url: String,

    /// Minimum milliseconds between API requests
    #[arg(long, default_value = "100")]
    rate_limit_ms: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Attempts per listing day or archive, first try included
    #[arg(long, default_value = "3")]
    retries: u32,

    /// Milliseconds before the first retry; doubles per retry
    #[arg(long, default_value = "1000")]
    backoff_ms: u64,

    /// Replacement tag-candidate table (JSON)
    #[arg(long)]
    tag_table: Option<PathBuf>,

    /// EDINET code list CSV
    #[arg(long, env = "KESSAN_EDINET_CODE_CSV")]
    edinet_code_csv: Option<PathBuf>,

    /// JPX market listing CSV
    #[arg(long, env = "KESSAN_MARKET_CSV")]
    market_csv: Option<PathBuf>,

    /// Index membership CSV
    #[arg(long, env = "KESSAN_INDEX_CSV")]
    index_csv: Option<PathBuf>,

    /// Index membership table in the database
    #[arg(long, default_value = "nikkei225")]
    index_table: String,

    /// Ignore reference tables older than this many days
    #[arg(long, default_value = "30")]
    max_table_age_days: i64,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl FetchArgs {
    fn into_config(self) -> Result<RunConfig, ConfigError> {
        let today = jst_today();
        let start_date = self.start.as_deref().map(parse_date).transpose()?.unwrap_or(today);
        let end_date = self.end.as_deref().map(parse_date).transpose()?.unwrap_or(today);

        let category = if self.all_types {
            CategoryFilter::IncludeAll
        } else if self.keyword.is_empty() {
            CategoryFilter::default()
        } else {
            CategoryFilter::Keywords(self.keyword)
        };

        let market = self
            .market
            .as_deref()
            .map(str::parse::<MarketGroup>)
            .transpose()
            .map_err(ConfigError::UnknownMarket)?;

        let config = RunConfig {
            start_date,
            end_date,
            category,
            market,
            full_capture: self.full_capture,
            workers: self.workers,
            db_path: store_manager::resolve_db_path(self.db),
            api_key: self.api_key,
            base_url: self.base_url,
            min_interval: Duration::from_millis(self.rate_limit_ms),
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy::new(self.retries, Duration::from_millis(self.backoff_ms)),
            tag_table: self.tag_table,
            reference: ReferenceConfig {
                edinet_code_csv: self.edinet_code_csv,
                market_listing_csv: self.market_csv,
                index_csv: self.index_csv,
                index_table: self.index_table,
                max_table_age_days: self.max_table_age_days,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Commands::Fetch(args) => fetch(*args).await?,
        Commands::Audit { db, limit } => {
            let db_path = store_manager::resolve_db_path(db);
            let store = store_manager::open_store(&db_path)?;
            report::print_audit(&store, &db_path, limit)?;
        }
    }

    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let show_progress = !args.no_progress && std::io::stderr().is_terminal();
    let config = args.into_config()?;

    let client = EdinetClient::with_config(config.require_api_key()?, config.client_config())?;
    tracing::debug!(db = %config.db_path.display(), base_url = client.base_url(), "opening store");
    let store = Arc::new(Mutex::new(store_manager::open_store(&config.db_path)?));
    let progress = BarProgress::new(show_progress);

    let summary = run_pipeline(&client, store, &config, &progress).await?;
    report::print_run_summary(&summary, &config.db_path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fetch_args(args: &[&str]) -> FetchArgs {
        let cli = Cli::try_parse_from(std::iter::once("kessan").chain(std::iter::once("fetch")).chain(args.iter().copied()))
            .unwrap();
        match cli.command {
            Commands::Fetch(args) => *args,
            Commands::Audit { .. } => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_fetch_args_to_config() {
        let config = fetch_args(&[
            "--start",
            "2024-06-01",
            "--end",
            "2024-06-30",
            "--market",
            "prime",
            "--keyword",
            "有価証券報告書",
            "--keyword",
            "四半期報告書",
            "--workers",
            "4",
            "--db",
            "/tmp/kessan-test.db",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(config.end_date, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        assert_eq!(config.market, Some(MarketGroup::Prime));
        assert_eq!(config.workers, 4);
        assert_eq!(
            config.category,
            CategoryFilter::Keywords(vec!["有価証券報告書".to_string(), "四半期報告書".to_string()])
        );
        assert_eq!(config.db_path, PathBuf::from("/tmp/kessan-test.db"));
    }

    #[test]
    fn test_all_types_disables_keywords() {
        let config = fetch_args(&["--start", "2024-06-01", "--end", "2024-06-01", "--all-types"])
            .into_config()
            .unwrap();
        assert_eq!(config.category, CategoryFilter::IncludeAll);
    }

    #[test]
    fn test_bad_input_is_config_error() {
        let bad_date = fetch_args(&["--start", "June 1st"]).into_config();
        assert!(matches!(bad_date, Err(ConfigError::InvalidDate(_))));

        let bad_market = fetch_args(&["--market", "mothers"]).into_config();
        assert!(matches!(bad_market, Err(ConfigError::UnknownMarket(m)) if m == "mothers"));

        let inverted = fetch_args(&["--start", "2024-06-02", "--end", "2024-06-01"]).into_config();
        assert!(matches!(inverted, Err(ConfigError::InvertedRange { .. })));

        let no_workers = fetch_args(&["--workers", "0"]).into_config();
        assert!(matches!(no_workers, Err(ConfigError::ZeroWorkers)));
    }
}
