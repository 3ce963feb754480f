use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use snapsend::config::Config;
use snapsend::extract::NameExtractor;
use snapsend::matching::{match_stats, FuzzyMatcher};
use snapsend::ocr::HttpOcrClient;
use snapsend::onebot::batch::{send_batch, OutgoingMessage};
use snapsend::onebot::OneBotClient;
use snapsend::pipeline::Resolver;

#[derive(Parser)]
#[command(name = "snapsend")]
#[command(about = "Message the people visible in a screenshot", long_about = None)]
struct Cli {
    /// Config file path (defaults to ~/.config/snapsend/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize a screenshot and list the extracted name candidates
    Recognize {
        /// Image file
        image: PathBuf,
    },
    /// Recognize a screenshot and rank matching contacts
    Resolve {
        /// Image file
        image: PathBuf,
        /// Also print aggregate match statistics
        #[arg(long)]
        stats: bool,
    },
    /// Look one name up across the directory at strict tolerance
    Search {
        /// Name to search for
        name: String,
    },
    /// Send a message to friends and/or groups
    Send {
        /// Friend user ids to message privately
        #[arg(long = "user")]
        users: Vec<String>,
        /// Group ids to message
        #[arg(long = "group")]
        groups: Vec<String>,
        /// User ids to mention in the group messages
        #[arg(long = "at")]
        at_users: Vec<String>,
        /// Message body
        #[arg(short, long)]
        message: String,
    },
    /// Probe the recognition and OneBot endpoints
    Check,
}

fn build_resolver(config: &Config) -> anyhow::Result<Resolver> {
    let recognizer = HttpOcrClient::new(config.ocr.clone())?;
    let directory = OneBotClient::new(config.onebot.clone())?;
    let extractor = NameExtractor::new(config.extractor.clone())?;
    let matcher = FuzzyMatcher::new(config.matcher);
    Ok(Resolver::new(
        Arc::new(recognizer),
        Arc::new(directory),
        extractor,
        matcher,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Recognize { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let resolver = build_resolver(&config)?;
            let (fragments, candidates) = resolver.recognize(&bytes).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "fragments": fragments,
                    "candidates": candidates,
                }))?
            );
        }
        Commands::Resolve { image, stats } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let resolver = build_resolver(&config)?;
            let resolution = resolver.resolve(&bytes).await?;
            if resolution.candidates.is_empty() {
                eprintln!("no names detected in the image");
            } else if resolution.matches.total_count == 0 {
                eprintln!(
                    "{} name(s) detected, nothing matched in the directory",
                    resolution.candidates.len()
                );
            }
            println!("{}", serde_json::to_string_pretty(&resolution)?);
            if stats {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&match_stats(&resolution.matches.all))?
                );
            }
        }
        Commands::Search { name } => {
            let resolver = build_resolver(&config)?;
            let matches = resolver.search(&name).await?;
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
        Commands::Send {
            users,
            groups,
            at_users,
            message,
        } => {
            if users.is_empty() && groups.is_empty() {
                anyhow::bail!("nothing to send: pass --user and/or --group");
            }
            let transport = OneBotClient::new(config.onebot.clone())?;

            let mut messages = Vec::new();
            for user in users {
                messages.push(OutgoingMessage::private(user, message.clone()));
            }
            for group in groups {
                messages.push(OutgoingMessage::group(
                    group,
                    message.clone(),
                    at_users.clone(),
                ));
            }

            let reports = send_batch(&transport, &messages, &config.send).await;
            let sent = reports.iter().filter(|r| r.ok).count();
            println!("{}", serde_json::to_string_pretty(&reports)?);
            eprintln!("{sent}/{} sent", reports.len());
        }
        Commands::Check => {
            let ocr = HttpOcrClient::new(config.ocr.clone())?;
            let onebot = OneBotClient::new(config.onebot.clone())?;
            let (ocr_ok, onebot_ok) =
                tokio::join!(ocr.check_connection(), onebot.check_connection());
            println!("recognition endpoint: {}", if ocr_ok { "ok" } else { "unreachable" });
            println!("onebot endpoint:      {}", if onebot_ok { "ok" } else { "unreachable" });
            if !ocr_ok || !onebot_ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
