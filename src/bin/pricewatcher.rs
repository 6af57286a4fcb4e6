//! pricewatcher CLI: manage watchers, run the scheduler, serve the queues.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pricewatcher::api::{self, AppState};
use pricewatcher::config::Config;
use pricewatcher::domain::DomainRegistry;
use pricewatcher::model::{Filter, WatcherId};
use pricewatcher::queue::QueueManager;
use pricewatcher::scheduler::{HttpSubmitter, Scheduler};
use pricewatcher::storage::WatcherStore;
use pricewatcher::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "pricewatcher",
    version,
    about = "A tool to manage your price watchers"
)]
struct Cli {
    /// Config file (default is $HOME/.pricewatcher.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// The minimum log verbosity level
    #[arg(short, long, global = true)]
    verbose: Option<String>,
    /// The path to the database file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a new price watcher
    Add {
        /// Product URL to watch
        url: String,
        /// Domain, for example bol.com; guessed from the url when omitted
        #[arg(long)]
        domain: Option<String>,
    },
    /// Show a list of watchers or domains
    List {
        #[command(subcommand)]
        target: ListTarget,
    },
    /// Remove a price watcher
    Remove {
        /// Watcher ID
        #[arg(required_unless_present = "all")]
        id: Option<u64>,
        /// Remove all the watchers
        #[arg(short, long, conflicts_with = "id")]
        all: bool,
    },
    /// Queue stale watchers on a fixed interval
    Watch {
        /// Minutes to wait between sweeps
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Hours since the last price before a watcher is due again
        #[arg(long)]
        check_interval: Option<f64>,
    },
    /// Start the webserver
    Webserver {
        /// Address to bind the webserver on
        #[arg(short, long)]
        address: Option<String>,
    },
}

#[derive(Subcommand)]
enum ListTarget {
    /// Supported domains
    Domains,
    /// Registered watchers
    Watchers {
        /// Only watchers on this domain
        #[arg(long)]
        domain: Option<String>,
        /// Only watchers with exactly this url
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.verbose {
        config.log.minimum_level = level;
    }
    if let Some(database) = cli.database {
        config.database_file = database;
    }

    match cli.command {
        Command::Add { url, domain } => {
            let _guard = telemetry(&config, false)?;
            cmd_add(&config, &url, domain.as_deref())
        }
        Command::List { target } => {
            let _guard = telemetry(&config, false)?;
            match target {
                ListTarget::Domains => cmd_list_domains(),
                ListTarget::Watchers { domain, url } => cmd_list_watchers(&config, domain, url),
            }
        }
        Command::Remove { id, all } => {
            let _guard = telemetry(&config, false)?;
            cmd_remove(&config, id, all)
        }
        Command::Watch {
            timeout,
            check_interval,
        } => {
            if let Some(minutes) = timeout {
                config.watcher.timeout = minutes;
            }
            if let Some(hours) = check_interval {
                config.watcher.check_interval = hours;
            }
            config.validate()?;
            let _guard = telemetry(&config, true)?;
            cmd_watch(&config).await
        }
        Command::Webserver { address } => {
            if let Some(address) = address {
                config.webserver.address = address;
            }
            config.validate()?;
            let _guard = telemetry(&config, true)?;
            cmd_webserver(&config).await
        }
    }
}

/// Long-running commands export to OTLP when configured; one-shot commands
/// only log locally.
fn telemetry(config: &Config, export: bool) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.log.otel_endpoint.clone().filter(|_| export),
        service_name: "pricewatcher".to_string(),
        default_level: config.log.minimum_level.clone(),
    })?)
}

fn open_store(config: &Config) -> anyhow::Result<WatcherStore> {
    Ok(WatcherStore::open(
        &config.database_file,
        DomainRegistry::default(),
    )?)
}

fn cmd_add(config: &Config, url: &str, domain: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let domain = store.registry().resolve(url, domain)?;
    let id = store.create(&domain, url)?;
    println!("Created watcher {id} ({domain})");
    Ok(())
}

fn cmd_list_domains() -> anyhow::Result<()> {
    println!("Supported domains:");
    for domain in DomainRegistry::default().domains() {
        println!("- {domain}");
    }
    Ok(())
}

fn cmd_list_watchers(
    config: &Config,
    domain: Option<String>,
    url: Option<String>,
) -> anyhow::Result<()> {
    let mut filter = Filter::new();
    if let Some(domain) = domain {
        filter.insert("domain".to_string(), domain);
    }
    if let Some(url) = url {
        filter.insert("url".to_string(), url);
    }

    let watchers = open_store(config)?.list(&filter)?;
    if watchers.is_empty() {
        println!("No watchers found.");
        return Ok(());
    }

    println!(
        "{:<6}  {:<12}  {:<24}  {:<10}  {:<16}  URL",
        "ID", "DOMAIN", "NAME", "PRICE", "LAST CHECKED"
    );
    println!("{}", "-".repeat(100));

    for watcher in &watchers {
        let name = if watcher.name.chars().count() > 24 {
            watcher.name.chars().take(24).collect()
        } else {
            watcher.name.clone()
        };
        let price = watcher
            .latest_price()
            .map(|p| format!("{:.2}", p.value))
            .unwrap_or_else(|| "-".to_string());
        let checked = if watcher.has_been_checked() {
            watcher.last_checked.format("%Y-%m-%d %H:%M").to_string()
        } else {
            "never".to_string()
        };
        let flag = if watcher.is_checking { " *" } else { "" };
        println!(
            "{:<6}  {:<12}  {:<24}  {:<10}  {:<16}  {}{}",
            watcher.id, watcher.domain, name, price, checked, watcher.url, flag
        );
    }

    println!("\n{} watcher(s)", watchers.len());
    Ok(())
}

fn cmd_remove(config: &Config, id: Option<u64>, all: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if all {
        let n = store.remove_all()?;
        println!("Removed {n} watcher(s)");
        return Ok(());
    }

    let id = WatcherId(id.ok_or_else(|| anyhow::anyhow!("give a watcher id or --all"))?);
    if store.remove(id)? {
        println!("Removed watcher {id}");
    } else {
        println!("No watcher with id {id}");
    }
    Ok(())
}

async fn cmd_watch(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let submitter = HttpSubmitter::new(config.submission_base_url())?;
    info!(target_url = submitter.base_url(), "submitting jobs over http");

    let scheduler = Scheduler::new(store, Arc::new(submitter), config.scheduler_config());

    let ctrl = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    scheduler.run().await?;
    Ok(())
}

async fn cmd_webserver(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let queues = QueueManager::for_registry(store.registry())?;
    let state = AppState::new(store, Arc::new(queues), config.scheduler_config());

    api::serve(state, config.bind_address(), async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;
    Ok(())
}
