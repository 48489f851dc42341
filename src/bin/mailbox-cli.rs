#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for the mailbox engine over a JSON-file store

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mailbox_engine::{
    CancellationToken, Delivery, EngineConfig, ImapConfig, ImapSource, JsonFileStore, MailId,
    MailStore, MailView, MailboxService, SmtpConfig, SmtpDelivery, TrashEntry, UserId,
    ingest_once, spawn_ingestion,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailbox-cli")]
#[command(about = "Inbox, sent, archive and trash views over a shared mail store")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path of the JSON mail store (default: `MAIL_STORE` or mailstore.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Register an account
    AddUser {
        /// Email address of the account
        email: String,
    },

    /// List registered accounts
    Users,

    /// List visible mail addressed to a user
    Inbox {
        /// User id
        user: UserId,
    },

    /// List visible mail sent by a user
    Sent {
        /// User id
        user: UserId,
    },

    /// List a user's trash
    Trash {
        /// User id
        user: UserId,
    },

    /// Archive a mail for a user
    Archive { user: UserId, mail: MailId },

    /// Unarchive a mail for a user
    Unarchive { user: UserId, mail: MailId },

    /// Move a mail to a user's trash
    Delete { user: UserId, mail: MailId },

    /// Send a mail as a user
    Send {
        /// Sending user id
        user: UserId,

        /// Receiver address (repeatable)
        #[arg(long = "to", required = true)]
        to: Vec<String>,

        #[arg(long, default_value = "")]
        subject: String,

        #[arg(long, default_value = "")]
        body: String,

        /// Store the mail without relaying it over SMTP
        #[arg(long)]
        dry_run: bool,
    },

    /// Poll the IMAP mailbox and store new mail
    Poll {
        /// Run a single pass instead of looping until Ctrl-C
        #[arg(long)]
        once: bool,
    },
}

/// Delivery used when nothing should leave the machine.
struct DryRun;

#[async_trait]
impl Delivery for DryRun {
    async fn deliver(
        &self,
        from: &str,
        to: &[String],
        _subject: &str,
        _body: &str,
    ) -> mailbox_engine::Result<()> {
        info!("Dry run: not relaying mail from {} to {:?}", from, to);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = EngineConfig::from_env()?;
    let path = args.store.clone().unwrap_or_else(|| config.store_path.clone());
    let store = Arc::new(JsonFileStore::open(&path).await?);

    match &args.command {
        Command::AddUser { email } => {
            let user = store.add_user(email).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                println!("{} {}", user.id, user.email);
            }
        }
        Command::Users => {
            let users = store.users()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else {
                for user in &users {
                    println!("{:<6} {}", user.id, user.email);
                }
            }
        }
        Command::Inbox { user } => {
            let mails = service(&store, &config, Arc::new(DryRun)).get_inbox(*user).await?;
            print_mails(&args, &mails)?;
        }
        Command::Sent { user } => {
            let mails = service(&store, &config, Arc::new(DryRun)).get_sent(*user).await?;
            print_mails(&args, &mails)?;
        }
        Command::Trash { user } => {
            let trash = service(&store, &config, Arc::new(DryRun)).get_trash(*user).await?;
            print_trash(&args, &trash)?;
        }
        Command::Archive { user, mail } => {
            service(&store, &config, Arc::new(DryRun))
                .archive_mail(*user, *mail)
                .await?;
            println!("Archived mail {mail}");
        }
        Command::Unarchive { user, mail } => {
            service(&store, &config, Arc::new(DryRun))
                .unarchive_mail(*user, *mail)
                .await?;
            println!("Unarchived mail {mail}");
        }
        Command::Delete { user, mail } => {
            service(&store, &config, Arc::new(DryRun))
                .delete_mail(*user, *mail)
                .await?;
            println!("Moved mail {mail} to trash");
        }
        Command::Send {
            user,
            to,
            subject,
            body,
            dry_run,
        } => {
            let delivery: Arc<dyn Delivery> = if *dry_run {
                Arc::new(DryRun)
            } else {
                Arc::new(SmtpDelivery::new(&SmtpConfig::from_env()?)?)
            };
            let record = service(&store, &config, delivery)
                .send_mail(*user, to.clone(), subject.clone(), body.clone())
                .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("Sent mail {}", record.id);
            }
        }
        Command::Poll { once } => {
            cmd_poll(store, &config, *once).await?;
        }
    }

    Ok(())
}

fn service(
    store: &Arc<JsonFileStore>,
    config: &EngineConfig,
    delivery: Arc<dyn Delivery>,
) -> MailboxService {
    MailboxService::new(
        Arc::clone(store) as Arc<dyn MailStore>,
        delivery,
        config.local_domain.clone(),
    )
}

async fn cmd_poll(store: Arc<JsonFileStore>, config: &EngineConfig, once: bool) -> anyhow::Result<()> {
    let mut source = ImapSource::new(ImapConfig::from_env()?);

    if once {
        let count = ingest_once(store.as_ref(), &mut source).await?;
        println!("Ingested {count} message(s)");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let handle = spawn_ingestion(store, source, config.poll_interval, cancel.clone());
    info!(
        "Polling every {}s, press Ctrl-C to stop",
        config.poll_interval.as_secs()
    );

    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    handle.await?;
    Ok(())
}

fn print_mails(args: &Args, mails: &[MailView]) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(mails)?);
        return Ok(());
    }

    if mails.is_empty() {
        println!("No mail found.");
        return Ok(());
    }

    println!(
        "{:<8} {:<20} {:<28} {:<28} {}",
        "ID", "Date", "From", "To", "Subject"
    );
    println!("{}", "-".repeat(110));

    for mail in mails {
        println!(
            "{:<8} {:<20} {:<28} {:<28} {}",
            mail.id,
            mail.created_at.format("%Y-%m-%d %H:%M"),
            truncate(&mail.sender, 26),
            truncate(&mail.receivers.join(", "), 26),
            truncate(&mail.subject, 40),
        );
    }

    println!("\n{} mail(s)", mails.len());
    Ok(())
}

fn print_trash(args: &Args, trash: &[TrashEntry]) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(trash)?);
        return Ok(());
    }

    if trash.is_empty() {
        println!("Trash is empty.");
        return Ok(());
    }

    println!("{:<8} {:<20} {}", "ID", "Date", "Subject");
    println!("{}", "-".repeat(70));
    for entry in trash {
        println!(
            "{:<8} {:<20} {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            truncate(&entry.subject, 40),
        );
    }

    println!("\n{} mail(s)", trash.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
