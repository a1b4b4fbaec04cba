use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use friendlink::config::Config;
use friendlink::feed::{fetch_friend_feeds, recent_entries};
use friendlink::friends::load_entities;
use friendlink::status::{Prober, StatusChecker};
use friendlink::util::{fit_to_width, sanitize_for_terminal, truncate_to_width};

const BANNER: &str = "========================================";

#[derive(Parser, Debug)]
#[command(
    name = "friendlink",
    about = "Checks friend sites and keeps their status in frontmatter"
)]
struct Args {
    /// Config file (TOML). Missing file means defaults.
    #[arg(long, value_name = "FILE", default_value = "friendlink.toml")]
    config: PathBuf,

    /// Site root; overrides `content_root` from the config file
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe every friend and write the result back into its document
    Check,
    /// List tracked friends without probing them
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Fetch friends' feeds and print the most recent entries
    Feeds {
        /// Number of entries to print (defaults to `recent_feed_limit`)
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        /// Print JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(root) = args.root {
        config.content_root = root;
    }

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .build()
        .context("Failed to build HTTP client")?;

    match args.command {
        Command::Check => run_check(client, &config).await,
        Command::Status { json } => print_status(&config, json).await,
        Command::Feeds { limit, json } => {
            print_feeds(&client, &config, limit.unwrap_or(config.recent_feed_limit), json).await
        }
    }
}

async fn run_check(client: reqwest::Client, config: &Config) -> Result<()> {
    let started = Local::now();
    tracing::info!("{BANNER}");
    tracing::info!(
        time = %started.format("%Y-%m-%d %H:%M:%S"),
        dir = %config.friends_path().display(),
        "Friend status check started"
    );
    tracing::info!("{BANNER}");

    let checker = StatusChecker::new(
        Prober::from_config(client, config),
        config.friends_path(),
        config.pace(),
    );

    match checker.run_check_cycle().await {
        Ok(report) => {
            tracing::info!("{BANNER}");
            tracing::info!(
                checked = report.checked,
                skipped = report.skipped,
                online = report.online,
                offline = report.offline,
                hidden = report.hidden,
                elapsed_secs = (Local::now() - started).num_seconds(),
                "Friend status check finished"
            );
            tracing::info!("{BANNER}");
            Ok(())
        }
        Err(e) => {
            tracing::error!("{BANNER}");
            tracing::error!(error = %e, "Friend status check failed");
            tracing::error!("{BANNER}");
            Err(e).context("Friend status check failed")
        }
    }
}

async fn print_status(config: &Config, json: bool) -> Result<()> {
    let entities = load_entities(&config.friends_path())
        .await
        .context("Failed to load friends")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
        return Ok(());
    }

    println!(
        "{} {} {} {} {} {}",
        fit_to_width("ID", 16),
        fit_to_width("NAME", 24),
        fit_to_width("STATUS", 8),
        fit_to_width("FAILS", 5),
        fit_to_width("HIDDEN", 6),
        "LAST CHECKED"
    );
    for entity in &entities {
        let last_checked = entity
            .last_checked
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} {} {} {} {} {}",
            fit_to_width(&sanitize_for_terminal(&entity.id), 16),
            fit_to_width(&sanitize_for_terminal(&entity.name), 24),
            fit_to_width(entity.status.as_str(), 8),
            fit_to_width(&entity.failed_count.to_string(), 5),
            fit_to_width(if entity.hidden { "yes" } else { "no" }, 6),
            last_checked
        );
    }
    println!("{} friends", entities.len());
    Ok(())
}

async fn print_feeds(
    client: &reqwest::Client,
    config: &Config,
    limit: usize,
    json: bool,
) -> Result<()> {
    let entities = load_entities(&config.friends_path())
        .await
        .context("Failed to load friends")?;

    let feeds = fetch_friend_feeds(
        client,
        &entities,
        config.feed_timeout(),
        config.feed_concurrency,
    )
    .await;
    let recent = recent_entries(&feeds, limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&recent)?);
        return Ok(());
    }

    for item in &recent {
        println!(
            "{}  [{}] {}",
            item.entry.pub_date.with_timezone(&Local).format("%Y-%m-%d"),
            sanitize_for_terminal(&item.friend_id),
            truncate_to_width(&sanitize_for_terminal(&item.entry.title), 72)
        );
        println!("    {}", sanitize_for_terminal(&item.entry.link));
    }
    if recent.is_empty() {
        println!("No feed entries found");
    }
    Ok(())
}
