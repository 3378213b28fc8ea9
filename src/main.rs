use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use trade_thread::config::{AppConfig, DatabaseConfig};
use trade_thread::logging::init_logging;
use trade_thread::models::{Item, Message, NewMessage, NewRating, OutputFormat, UserId};
use trade_thread::notify::{DisabledNotifier, LogNotifier, NotificationDispatcher};
use trade_thread::validation::InputValidator;
use trade_thread::{Database, SqliteListings, SystemClock, TradeService};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Authenticated user id
    #[arg(short, long, global = true)]
    user: Option<UserId>,

    /// Database URL, overrides configuration
    #[arg(long, global = true)]
    db: Option<String>,

    /// Output format (txt, csv or json)
    #[arg(short, long, global = true, default_value = "txt")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register or update a listing in the local registry
    AddItem {
        /// Item id
        #[arg(long)]
        id: i64,

        /// Seller user id
        #[arg(long)]
        owner: UserId,

        /// Item name
        #[arg(short, long)]
        name: String,

        /// Price in the smallest currency unit
        #[arg(short, long)]
        price: i64,
    },
    /// Claim an item as its buyer
    Claim {
        /// Item id
        item: i64,
    },
    /// Confirm a purchase as completed
    Complete {
        /// Item id
        item: i64,
    },
    /// Send a message to the other participant
    Send {
        /// Item id
        item: i64,

        /// Message text
        body: String,

        /// Stored image reference
        #[arg(short, long)]
        attachment: Option<String>,
    },
    /// Edit one of your recent messages
    Edit {
        /// Message id
        message: i64,

        /// New message text
        body: String,
    },
    /// Delete one of your recent messages
    Delete {
        /// Message id
        message: i64,
    },
    /// Show an item's thread and mark it read
    Thread {
        /// Item id
        item: i64,
    },
    /// Rate the other participant of a completed transaction
    Rate {
        /// Item id
        item: i64,

        /// User being rated
        #[arg(long)]
        rated: UserId,

        /// Score from 1 to 5
        #[arg(short, long)]
        score: i64,

        /// Optional comment
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Show the ratings a user received
    Ratings {
        /// User id, defaults to --user
        target: Option<UserId>,
    },
    /// Show unread message counts
    Unread,
    /// List open transactions, most recent first
    Sidebar {
        /// Item to leave out
        #[arg(long)]
        exclude: Option<i64>,
    },
    /// List completed purchases
    Purchases,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging; the guard flushes the file writer on exit
    let _guard = init_logging(
        Some(&config.get_log_level()),
        config.logging.file_path.as_deref().map(Path::new),
        &config.logging.format,
    )?;

    let database_url = cli.db.clone().unwrap_or_else(|| config.get_database_url());
    InputValidator::validate_database_url(&database_url)?;
    let db = Database::with_config(&DatabaseConfig {
        url: database_url,
        ..config.database.clone()
    })?;

    let listings = Arc::new(SqliteListings::new(db.clone()));
    let dispatcher: Arc<dyn NotificationDispatcher> = if config.notification.enabled {
        Arc::new(LogNotifier)
    } else {
        Arc::new(DisabledNotifier)
    };
    let service = TradeService::new(db, listings.clone(), dispatcher, Arc::new(SystemClock));

    let format: OutputFormat = cli.format.parse().unwrap_or_else(|e| {
        warn!("{}. Using txt as default.", e);
        OutputFormat::Txt
    });

    match &cli.command {
        Commands::AddItem {
            id,
            owner,
            name,
            price,
        } => {
            let item = Item {
                id: *id,
                owner_id: *owner,
                name: name.clone(),
                price: *price,
                updated_at: Utc::now(),
            };
            listings.upsert_item(&item)?;
            info!(item_id = item.id, "Listing saved");
            println!("item {} saved", item.id);
        },
        Commands::Claim { item } => {
            let claim = service.claim_item(*item, require_user(&cli)?)?;
            println!("item {} claimed by user {}", claim.item_id, claim.buyer_id);
        },
        Commands::Complete { item } => {
            let completion = service.complete_transaction(*item, require_user(&cli)?)?;
            if let Some(notification) = completion.notification {
                notification.await.context("Completion notice task failed")?;
            }
            if completion.newly_completed {
                println!("transaction on item {} completed", item);
            } else {
                println!("transaction on item {} was already completed", item);
            }
        },
        Commands::Send {
            item,
            body,
            attachment,
        } => {
            let mut message = NewMessage::text(body.as_str());
            if let Some(reference) = attachment {
                message = message.with_attachment(reference.as_str());
            }
            let sent = service.send_message(*item, require_user(&cli)?, message)?;
            println!("message {} sent", sent.id);
        },
        Commands::Edit { message, body } => {
            let edited = service.edit_message(*message, require_user(&cli)?, body)?;
            println!("message {} edited", edited.id);
        },
        Commands::Delete { message } => {
            service.delete_message(*message, require_user(&cli)?)?;
            println!("message {} deleted", message);
        },
        Commands::Thread { item } => {
            let view = service.open_thread(*item, require_user(&cli)?)?;
            let mut out = io::stdout().lock();
            match format {
                OutputFormat::Txt => write_txt(&mut out, &view.messages)?,
                OutputFormat::Csv => write_csv(&mut out, &view.messages)?,
                OutputFormat::Json => serde_json::to_writer_pretty(&mut out, &view)?,
            }
            out.flush()?;
        },
        Commands::Rate {
            item,
            rated,
            score,
            comment,
        } => {
            let rating = service.submit_rating(
                require_user(&cli)?,
                NewRating {
                    item_id: *item,
                    rated_user_id: *rated,
                    score: *score,
                    comment: comment.clone(),
                },
            )?;
            println!("rating {} recorded", rating.id);
        },
        Commands::Ratings { target } => {
            let user_id = match target {
                Some(id) => *id,
                None => require_user(&cli)?,
            };
            let summary = service.rating_summary(user_id)?;
            match summary.display_average() {
                Some(average) => println!("user {user_id}: {average} ({} ratings)", summary.count),
                None => println!("user {user_id}: no ratings"),
            }
        },
        Commands::Unread => {
            let user_id = require_user(&cli)?;
            let counts = service.get_unread_counts(user_id)?;
            let trading = service.open_transaction_count(user_id)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&counts)?),
                _ => println!(
                    "unread: {} total, {} on open transactions ({} purchased, {} sold), {} open transactions",
                    counts.total, counts.open_transactions, counts.as_buyer, counts.as_seller, trading
                ),
            }
        },
        Commands::Sidebar { exclude } => {
            let sidebar = service.get_sidebar_transactions(require_user(&cli)?, *exclude)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sidebar)?),
                _ => {
                    for entry in &sidebar {
                        println!(
                            "{}\t{}\t{:?}\tunread {}\t{}",
                            entry.item.id,
                            entry.item.name,
                            entry.role,
                            entry.unread_count,
                            entry.latest_message_at.format("%b %d, %Y %r")
                        );
                    }
                },
            }
        },
        Commands::Purchases => {
            let items = service.completed_purchases(require_user(&cli)?)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
                _ => {
                    for item in &items {
                        println!("{}\t{}\t{}", item.id, item.name, item.price);
                    }
                },
            }
        },
    }

    debug!(metrics = ?service.metrics().snapshot(), "Run finished");
    Ok(())
}

/// The authenticated caller, required by every transaction command
fn require_user(cli: &Cli) -> Result<UserId> {
    cli.user.context("This command needs --user")
}

/// Write a thread as plain text
fn write_txt(out: &mut impl Write, messages: &[Message]) -> Result<()> {
    for message in messages {
        let edited = if message.is_edited { " (edited)" } else { "" };
        writeln!(
            out,
            "{}, {}, {}{}",
            message.sender_id,
            message.created_at.format("%b %d, %Y %r"),
            message.body,
            edited
        )?;
        if let Some(reference) = &message.attachment_ref {
            writeln!(out, "    [image: {reference}]")?;
        }
    }
    Ok(())
}

/// Write a thread as CSV
fn write_csv(out: &mut impl Write, messages: &[Message]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);

    // Write header
    writer.write_record(["Id", "Sender", "Timestamp", "Content", "Attachment", "Edited"])?;

    // Write data
    for message in messages {
        writer.write_record([
            message.id.to_string(),
            message.sender_id.to_string(),
            message.created_at.format("%b %d, %Y %r").to_string(),
            message.body.clone(),
            message.attachment_ref.clone().unwrap_or_default(),
            message.is_edited.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
