use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scholarmail::{config::HarvestConfig, export, Harvester, Query};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Discover contact emails of researchers in a field.
#[derive(Parser, Debug)]
#[command(name = "scholarmail", version, about)]
struct Cli {
    /// Field of research, e.g. "machine learning"
    #[arg(long, env = "SCHOLARMAIL_FIELD")]
    field: Option<String>,

    /// Number of emails to find
    #[arg(long, env = "SCHOLARMAIL_QUOTA")]
    quota: Option<usize>,

    /// Only keep emails that look like this author's
    #[arg(long, env = "SCHOLARMAIL_AUTHOR")]
    author: Option<String>,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, short, env = "SCHOLARMAIL_CONFIG")]
    config: Option<PathBuf>,

    /// CSV file to write
    #[arg(long, short, env = "SCHOLARMAIL_OUTPUT")]
    output: Option<PathBuf>,

    /// Page hosts fetched at the same time
    #[arg(long, env = "SCHOLARMAIL_CONCURRENT_HOSTS")]
    concurrent_hosts: Option<usize>,
}

/// The main entry point of the application.
///
/// This function initializes logging, loads the configuration, runs the harvest,
/// prints the accepted emails and writes them to CSV.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = HarvestConfig::load(cli.config.as_deref())?;
    if let Some(field) = cli.field {
        config.field = field;
    }
    if let Some(quota) = cli.quota {
        config.quota = quota;
    }
    if let Some(author) = cli.author {
        config.author = Some(author);
    }
    if let Some(output) = cli.output {
        config.output = output;
    }
    if let Some(concurrent_hosts) = cli.concurrent_hosts {
        config.concurrent_hosts = concurrent_hosts;
    }
    config.validate()?;

    if config.field.trim().is_empty() {
        anyhow::bail!("no research field given; pass --field or set it in the configuration");
    }

    let mut query = Query::new(config.field.clone());
    if let Some(author) = &config.author {
        query = query.with_author(author.clone());
    }
    let output = config.output.clone();

    let harvester = Harvester::from_config(config)?;

    let stop = harvester.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current page");
            stop.stop();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Harvesting emails for '{}'...", query.field));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let start_time = Instant::now();
    let report = harvester.run(&query).await;
    spinner.finish_and_clear();

    if let Some(shortfall) = report.shortfall() {
        warn!("{}", shortfall);
    }

    if report.contacts.is_empty() {
        warn!("No emails found.");
    } else {
        println!("\n=== Accepted Contacts ===");
        for contact in &report.contacts {
            match &contact.author {
                Some(author) => println!("{} ({})", contact.email, author),
                None => println!("{}", contact.email),
            }
        }
    }

    if let Err(e) = export::save_contacts(&output, &report.contacts) {
        error!("Failed to save contacts: {}", e);
        return Err(e.into());
    }

    info!(
        found = report.contacts.len(),
        quota = report.quota,
        requests = report.fetch_attempts,
        elapsed = ?start_time.elapsed(),
        "Done ({:?})",
        report.termination
    );

    Ok(())
}
