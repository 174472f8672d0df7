use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use scriptsleuth_core::report::generate_scan_report;
use scriptsleuth_core::{CrawlArgs, Database, crawl, dispatch, validate};
use scriptsleuth_scanner::{CrawlResult, ScanConfig, Scanner};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, warn};
use url::Url;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/scriptsleuth/";
pub const DB_FILE_NAME: &str = "scriptsleuth.db";

/// A page to scan, with its popularity rank when the hosts file had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub url: String,
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Install the stderr log subscriber. Later calls are no-ops.
pub fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .try_init();
}

// Helper functions for scan handler

/// Load hosts from either a file or a single URL argument
pub fn load_hosts_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<HostEntry>> {
    if let Some(hosts_file_path) = hosts_file {
        load_hosts_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![HostEntry {
            url: url.as_str().to_string(),
            rank: None,
        }])
    } else {
        bail!("Either --url or --hosts-file must be provided")
    }
}

/// Load and parse hosts from a file, one per line
pub fn load_hosts_from_file(path: &Path) -> Result<Vec<HostEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hosts file {}", path.display()))?;

    let hosts: Vec<HostEntry> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_host_line(line.trim()))
        .collect();

    if hosts.is_empty() {
        bail!("No valid hosts found in {}", path.display());
    }

    Ok(hosts)
}

/// Parse a hosts file line. Accepts a URL, a bare host, or a `rank,host`
/// pair as found in top-sites CSV lists. Bare hosts get `http://`.
pub fn parse_host_line(line: &str) -> Option<HostEntry> {
    let (rank, host) = match line.split_once(',') {
        Some((rank, host)) => match rank.trim().parse::<i64>() {
            Ok(rank) => (Some(rank), host.trim()),
            Err(_) => (None, line),
        },
        None => (None, line),
    };

    if let Ok(url) = Url::parse(host)
        && url.has_host()
    {
        return Some(HostEntry {
            url: host.to_string(),
            rank,
        });
    }

    let with_scheme = format!("http://{}", host);
    if Url::parse(&with_scheme).is_ok() {
        return Some(HostEntry {
            url: with_scheme,
            rank,
        });
    }

    eprintln!("{}  Skipping invalid host '{}'", "⚠".yellow(), line);
    None
}

/// Expand `~` and environment variables in a user supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(path).map_or_else(|_| path.to_string(), |p| p.into_owned()))
}

pub fn default_db_path() -> PathBuf {
    expand_path(DEFAULT_CONFIG_DIR).join(DB_FILE_NAME)
}

pub fn scan_config_from_args(args: &ArgMatches) -> ScanConfig {
    let defaults = ScanConfig::default();
    ScanConfig {
        timeout_secs: args
            .get_one::<u64>("timeout")
            .copied()
            .unwrap_or(defaults.timeout_secs),
        max_concurrent_fetches: args
            .get_one::<u64>("concurrency")
            .map(|n| *n as usize)
            .unwrap_or(defaults.max_concurrent_fetches),
        share_fetches_by_url: args.get_flag("share-fetches"),
        reject_error_status: args.get_flag("reject-error-status"),
        ..defaults
    }
}

fn strings(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

pub fn render_json(url: &str, crawl_id: Option<i64>, result: &CrawlResult) -> serde_json::Result<String> {
    serde_json::to_string(&serde_json::json!({
        "url": url,
        "crawl_id": crawl_id,
        "result": result,
    }))
}

fn render(format: OutputFormat, url: &str, crawl_id: Option<i64>, result: &CrawlResult) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => {
            let mut report = generate_scan_report(url, result);
            if let Some(id) = crawl_id {
                report.push_str(&format!("{} Stored as crawl {}\n", "✓".green().bold(), id));
            }
            report
        }
        OutputFormat::Json => render_json(url, crawl_id, result)?,
    })
}

fn open_database(path: &Path) -> Result<Database> {
    if !Database::exists(path) {
        bail!(
            "No database at {}. Run `scriptsleuth init` first, or pass --no-store.",
            path.display()
        );
    }
    Database::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn print_prompt(msg: &str) -> Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    let config_dir = args
        .get_one::<String>("PATH")
        .map(|p| expand_path(p))
        .unwrap_or_else(|| expand_path(DEFAULT_CONFIG_DIR));
    let force = args.get_flag("force");
    let db_path = config_dir.join(DB_FILE_NAME);

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );

    if Database::exists(&db_path) {
        if !force {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!(
                "A database already exists at {}",
                db_path.display().to_string().bright_white()
            );
            let response = print_prompt("Overwrite it? [y/N]:")?;
            if response != "y" && response != "yes" {
                println!("{} Initialization cancelled.", "✗".red().bold());
                return Ok(());
            }
        }
        Database::drop(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Removed existing database", "✓".green().bold());
    }

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    Database::new(&db_path)
        .with_context(|| format!("Failed to create database {}", db_path.display()))?;

    println!("{} scriptsleuth initialization complete!", "✓".green().bold());
    println!("{} Database: {}", "✓".green().bold(), db_path.display());
    Ok(())
}

pub async fn handle_scan(args: &ArgMatches) -> Result<()> {
    init_logging(args.get_flag("debug"));

    let hosts = load_hosts_from_source(
        args.get_one::<Url>("url"),
        args.get_one::<PathBuf>("hosts-file"),
    )?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| OutputFormat::from_str(f))
        .unwrap_or(OutputFormat::Text);
    let batch = args
        .get_one::<String>("batch")
        .cloned()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let terms = strings(args, "term");
    let domains = strings(args, "domain");
    let tags = strings(args, "tag");
    let region = args.get_one::<String>("region").cloned();
    let rank = args.get_one::<i64>("rank").copied();

    let mut db = if args.get_flag("no-store") {
        None
    } else {
        let path = args
            .get_one::<String>("db")
            .map(|p| expand_path(p))
            .unwrap_or_else(default_db_path);
        Some(open_database(&path)?)
    };

    let scanner = Scanner::with_config(scan_config_from_args(args))?;

    let spinner = if hosts.len() > 1 {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    } else {
        ProgressBar::hidden()
    };

    let total = hosts.len();
    let mut failures = 0;
    for (i, host) in hosts.into_iter().enumerate() {
        spinner.set_message(format!("[{}/{}] Scanning {}", i + 1, total, host.url));

        let crawl_args = CrawlArgs {
            url: Some(host.url.clone()),
            batch: Some(batch.clone()),
            terms: non_empty(terms.clone()),
            domains: non_empty(domains.clone()),
            region: region.clone(),
            tags: non_empty(tags.clone()),
            rank: host.rank.or(rank),
            debug: false,
        };

        let outcome = match db.as_mut() {
            Some(db) => dispatch(&scanner, db, crawl_args)
                .await
                .map(|d| (Some(d.crawl_id), d.result)),
            None => match validate(crawl_args) {
                Ok(valid) => crawl(&scanner, &valid).await.map(|result| (None, result)),
                Err(e) => Err(e.into()),
            },
        };

        match outcome {
            Ok((crawl_id, result)) => {
                let rendered = render(format, &host.url, crawl_id, &result)?;
                spinner.suspend(|| println!("{}", rendered));
            }
            Err(e) => {
                failures += 1;
                warn!("Skipping {}: {}", host.url, e);
            }
        }
    }
    spinner.finish_and_clear();

    if failures == total {
        bail!("All {} scans failed", total);
    }
    if failures > 0 {
        eprintln!(
            "{} {} of {} scans failed (batch {})",
            "⚠".yellow(),
            failures,
            total,
            batch
        );
    }
    Ok(())
}

pub async fn handle_event(args: &ArgMatches) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("PATH")
        .context("An event document path is required")?;
    let document = fs::read_to_string(path)
        .with_context(|| format!("Failed to read event document {}", path.display()))?;
    let crawl_args = CrawlArgs::from_json(&document)
        .with_context(|| format!("Malformed event document {}", path.display()))?;
    init_logging(args.get_flag("debug") || crawl_args.debug);

    let db_path = args
        .get_one::<String>("db")
        .map(|p| expand_path(p))
        .unwrap_or_else(default_db_path);
    let mut db = open_database(&db_path)?;
    let scanner = Scanner::new()?;

    let dispatched = dispatch(&scanner, &mut db, crawl_args).await?;
    println!("{}", dispatched.crawl_id);
    Ok(())
}
