//! mailsweep CLI
//!
//! Starts a scan, polls its progress once per second and stops it
//! cooperatively on Ctrl-C.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use mailsweep_core::generate_domains;
use mailsweep_net::{check_proxy, ProxyConfig};
use mailsweep_runtime::{DiscoveryConfig, EngineConfig, EngineError, OutputConfig, RunSummary, ScanEngine};

#[derive(Parser)]
#[command(name = "mailsweep")]
#[command(author, version, about = "mailsweep: mass contact discovery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,

    /// Execution log file
    #[arg(long, default_value = "mailsweep.log")]
    log_file: PathBuf,

    /// Do not write an execution log file
    #[arg(long)]
    no_log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover sites and collect contact emails
    Scan {
        /// Number of sites to scan
        #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
        total: u64,

        /// Search query used to find relevant sites first
        #[arg(short, long)]
        query: Option<String>,

        /// Concurrent page fetches
        #[arg(short, long, default_value = "20")]
        workers: usize,

        /// Proxy as host:port[:user:pass] (repeatable, or comma-separated MAILSWEEP_PROXIES)
        #[arg(short, long = "proxy", env = "MAILSWEEP_PROXIES", value_delimiter = ',')]
        proxies: Vec<String>,

        /// Directory for found_emails.txt and scan_progress.json
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Local domain list merged into the candidate pool when present
        #[arg(long, default_value = "domains.txt")]
        domains_file: PathBuf,
    },

    /// Validate configured proxies
    Status {
        /// Proxy as host:port[:user:pass] (repeatable, or comma-separated MAILSWEEP_PROXIES)
        #[arg(short, long = "proxy", env = "MAILSWEEP_PROXIES", value_delimiter = ',')]
        proxies: Vec<String>,
    },

    /// Print synthetic candidate domains
    Generate {
        /// Number of domains
        #[arg(short, long, default_value = "20")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = if cli.no_log_file { None } else { Some(cli.log_file.as_path()) };
    init_logging(cli.verbose, log_file)?;

    match cli.command {
        Commands::Scan {
            total,
            query,
            workers,
            proxies,
            output_dir,
            domains_file,
        } => {
            run_scan(total as usize, query, workers, &proxies, output_dir, domains_file).await?;
        }
        Commands::Status { proxies } => {
            check_status(&proxies).await?;
        }
        Commands::Generate { count } => {
            for domain in generate_domains(count) {
                println!("{}", domain);
            }
        }
    }

    Ok(())
}

/// Console output plus an ANSI-free copy in the execution log
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(level)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .compact(),
        )
        .with(file_layer)
        .init();

    Ok(())
}

async fn run_scan(
    total: usize,
    query: Option<String>,
    workers: usize,
    proxies: &[String],
    output_dir: PathBuf,
    domains_file: PathBuf,
) -> Result<()> {
    println!("📧 mailsweep - mass contact discovery\n");

    let proxy = ProxyConfig::from_entries(proxies)?;
    let config = EngineConfig {
        max_workers: workers.max(1),
        proxy,
        discovery: DiscoveryConfig {
            local_override: Some(domains_file),
            ..DiscoveryConfig::default()
        },
        output: OutputConfig {
            dir: output_dir,
            ..OutputConfig::default()
        },
        ..EngineConfig::default()
    };

    match query.as_deref() {
        Some(q) => println!("🔍 Query: {}", q),
        None => println!("🔍 No query, scanning domain lists"),
    }
    println!("🎯 Sites: {} | 👷 Workers: {}", total, config.max_workers);
    println!("🌐 Proxies configured: {}", config.proxy.credentials.len());
    println!("💾 Output: {}\n", config.output.emails_path().display());

    let engine = Arc::new(ScanEngine::new(config));
    let mut runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(total, query.as_deref()).await })
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let result = loop {
        tokio::select! {
            joined = &mut runner => break joined?,
            _ = tokio::signal::ctrl_c() => {
                println!("\n⏹️  Stopping, waiting for in-flight sites...");
                engine.stop();
            }
            _ = ticker.tick() => print_progress(&engine, total),
        }
    };
    println!();

    match result {
        Ok(summary) => {
            print_summary(&summary, &engine);
            Ok(())
        }
        Err(EngineError::NoCandidates) => {
            println!("❌ No existing domains found");
            println!("   Try a different query or check your network connection.");
            Err(EngineError::NoCandidates.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_progress(engine: &ScanEngine, total: usize) {
    let stats = engine.stats();
    print!(
        "\r⏳ {} | {}/{} sites | {} with emails | {} unique emails   ",
        engine.state(),
        stats.sites_processed,
        total,
        stats.sites_with_emails,
        engine.found_emails().len()
    );
    let _ = io::stdout().flush();
}

fn print_summary(summary: &RunSummary, engine: &ScanEngine) {
    if summary.stopped {
        println!("⏹️  Scan stopped");
    } else {
        println!("✅ Scan complete!");
    }

    let stats = &summary.statistics;
    println!("\n📊 Results:");
    println!("   Sites checked: {}", stats.sites_checked);
    println!("   Sites from search: {}", stats.search_sites_found);
    println!("   Sites with emails: {}", stats.sites_with_emails);
    println!("   Total emails: {}", stats.emails_found);
    println!("   Unique emails: {}", summary.unique_emails);
    println!("   Time: {:.1}s", summary.elapsed.as_secs_f64());

    let config = engine.config();
    println!("\n📄 Emails saved to: {}", config.output.emails_path().display());
    println!("📄 Progress saved to: {}", config.output.progress_path().display());
}

async fn check_status(proxies: &[String]) -> Result<()> {
    let config = ProxyConfig::from_entries(proxies)?;

    if config.credentials.is_empty() {
        println!("ℹ️  No proxies configured, scans use direct connections");
        println!("   Pass --proxy host:port[:user:pass] or set MAILSWEEP_PROXIES");
        return Ok(());
    }

    println!("🔌 Checking {} proxies via {}...\n", config.credentials.len(), config.check_url);

    let mut working = 0;
    for credential in &config.credentials {
        match check_proxy(credential, &config.check_url, config.timeout).await {
            Ok(true) => {
                working += 1;
                println!("✅ {} is working", credential);
            }
            Ok(false) => println!("❌ {} is not responding", credential),
            Err(e) => println!("❌ {} error: {}", credential, e),
        }
    }

    println!("\n{}/{} proxies working", working, config.credentials.len());
    Ok(())
}
