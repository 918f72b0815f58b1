use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use batchmail::content::{ContentSource, HttpContent, StaticContent};
use batchmail::ingest::{self, screen_addresses};
use batchmail::mail::{LogTransport, SmtpMailer, Transport};
use batchmail::store::JsonFileStore;
use batchmail::{shutdown, Dispatcher, RecipientQueue, Settings};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod input;

#[derive(Parser)]
#[command(name = "batchmail", about = "Rate-limit aware batch mailing")]
struct Cli {
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    /// Overrides BATCHMAIL_STATE_FILE.
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher and the ingestion API.
    Run {
        /// Log messages instead of sending them.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Add addresses from a file (one per line, first CSV column).
    Enqueue {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print campaign progress.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut settings = Settings::load().context("loading BATCHMAIL_* settings")?;
    if let Some(path) = cli.state_file {
        settings.state_file = path;
    }

    let store = JsonFileStore::open(&settings.state_file)
        .with_context(|| format!("opening state file {}", settings.state_file.display()))?;
    let queue = RecipientQueue::new(store);

    match cli.command {
        Commands::Run { dry_run } => {
            let content: Box<dyn ContentSource> = match &settings.content_url {
                Some(url) => Box::new(
                    HttpContent::new(url.clone(), settings.content_timeout())
                        .context("building content client")?,
                ),
                None => Box::new(StaticContent(settings.static_content())),
            };

            if dry_run {
                run(settings, queue, content, LogTransport).await
            } else {
                let mailer = SmtpMailer::from_env().context("configuring SMTP from SMTP_* variables")?;
                run(settings, queue, content, mailer).await
            }
        }
        Commands::Enqueue { file } => enqueue(&queue, &file).await,
        Commands::Status => {
            let summary = queue.summary().await;
            println!("total:    {}", summary.total);
            println!("sent:     {}", summary.sent);
            println!("pending:  {}", summary.pending);
            match summary.next_run_at {
                Some(at) => println!("next run: {at}"),
                None => println!("next run: now"),
            }
            println!("notified: {}", summary.notification_sent);
            Ok(())
        }
    }
}

async fn run<T: Transport>(
    settings: Settings,
    queue: RecipientQueue<JsonFileStore>,
    content: Box<dyn ContentSource>,
    transport: T,
) -> Result<()> {
    let (handle, stop) = shutdown::channel();

    let dispatcher = Dispatcher::new(queue.clone(), content, transport)
        .notify_address(settings.notify_address.clone())
        .config(settings.dispatch_config())
        .start(handle.subscribe());

    let server = tokio::spawn(batchmail::serve(
        (Ipv4Addr::UNSPECIFIED, settings.port),
        ingest::router(queue),
        stop,
    ));

    batchmail::serve::shutdown_signal().await;
    tracing::info!("shutting down");
    handle.trigger();

    dispatcher.await.context("dispatcher task panicked")?;
    server
        .await
        .context("server task panicked")?
        .context("error running HTTP server")?;
    Ok(())
}

async fn enqueue(queue: &RecipientQueue<JsonFileStore>, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let screened = screen_addresses(input::candidates(&text));
    for rejected in &screened.rejected {
        tracing::warn!(address = %rejected, "skipping invalid address");
    }

    let received = screened.valid.len();
    let added = queue
        .enqueue_many(screened.valid)
        .await
        .context("saving recipients")?;
    println!(
        "{received} valid, {added} added, {} rejected, {} pending",
        screened.rejected.len(),
        queue.count_pending().await
    );
    Ok(())
}
