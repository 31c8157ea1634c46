//! `folio`: search scanned manuals and manage which ones stay available
//! offline.

mod error;

use crate::error::{ErrorKind, Result};
use clap::{ArgAction, Parser, Subcommand};
use folio_cache::network::{Disconnected, HttpNetwork, NetworkHandle};
use folio_cache::{Registration, Worker};
use folio_config::Config;
use folio_offline::{Coordinator, ManualCatalog, NetworkStatus, StorageMirror, Toggled, UpdateStatus};
use folio_search::{TableOfContents, highlight};
use folio_storage::BackendHandle;
use folio_storage::backend::LocalBackend;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "folio", version, about = "Search scanned manuals and keep them available offline", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, global = true, env = "FOLIO_CONFIG")]
    config: Option<PathBuf>,
    /// Treat the network as unavailable: serve only cached content and skip
    /// update checks.
    #[arg(long, global = true)]
    offline: bool,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search a manual's index.
    Search {
        manual: String,
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Make a manual available offline.
    Download { manual: String },
    /// Remove a manual from offline storage.
    Remove { manual: String },
    /// Download or remove, depending on the current state.
    Toggle { manual: String },
    /// List configured and offline manuals.
    List,
    /// Check whether a newer version is published.
    CheckUpdate,
    /// Print a manual's table of contents.
    Toc { manual: String },
}

impl Command {
    /// Whether the command needs the offline coordinator running.
    fn needs_coordinator(&self) -> bool {
        !matches!(self, Self::Search { .. } | Self::Toc { .. })
    }
}

struct App {
    config: Config,
    catalog: ManualCatalog,
    coordinator: Coordinator,
}

impl App {
    async fn new(config: Config, offline: bool) -> Result<Self> {
        let caches: BackendHandle =
            Arc::new(LocalBackend::new("caches", config.cache_dir()).map_err(ErrorKind::storage)?);
        let state: BackendHandle = Arc::new(LocalBackend::new("state", config.state_dir()).map_err(ErrorKind::storage)?);
        let network = network(&config, offline)?;
        let worker = Worker::new(config.worker_config(), caches, network);
        let catalog = ManualCatalog::new(worker.interceptor(), config.catalog_config());
        let registration = Registration::new();
        match registration.register(worker).await {
            Ok(lifecycle) => tracing::debug!(?lifecycle, "Worker registered"),
            // Searching cached manuals still works through the interceptor.
            Err(e) => tracing::warn!(error = ?e, "Worker failed to install"),
        }
        let coordinator = Coordinator::new(
            registration,
            Arc::new(catalog.clone()),
            StorageMirror::new(state),
            config.coordinator_config(),
        );
        Ok(Self {
            config,
            catalog,
            coordinator,
        })
    }

    fn title<'a>(&'a self, manual_id: &'a str) -> &'a str {
        self.config.manual(manual_id).and_then(|manual| manual.title.as_deref()).unwrap_or(manual_id)
    }

    async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Search { manual, query } => self.search(&manual, &query.join(" ")).await,
            Command::Download { manual } => {
                let files = self.coordinator.download_manual(&manual).await.map_err(ErrorKind::offline)?;
                println!("{} is available offline ({files} files)", self.title(&manual));
                Ok(())
            }
            Command::Remove { manual } => {
                if self.coordinator.remove_manual(&manual).await.map_err(ErrorKind::offline)? {
                    println!("{} removed from offline storage", self.title(&manual));
                } else {
                    println!("{} was not stored offline", self.title(&manual));
                }
                Ok(())
            }
            Command::Toggle { manual } => {
                match self.coordinator.toggle_offline_status(&manual).await.map_err(ErrorKind::offline)? {
                    Toggled::Downloaded(files) => {
                        println!("{} is available offline ({files} files)", self.title(&manual));
                    }
                    Toggled::Removed => println!("{} removed from offline storage", self.title(&manual)),
                }
                Ok(())
            }
            Command::List => {
                self.list();
                Ok(())
            }
            Command::CheckUpdate => {
                match self.coordinator.check_for_update().await.map_err(ErrorKind::offline)? {
                    UpdateStatus::Available {
                        current_version,
                        latest_version,
                    } => println!("Update available: {current_version} -> {latest_version}"),
                    UpdateStatus::UpToDate => println!("Up to date"),
                    UpdateStatus::Skipped(reason) => println!("Update check skipped ({reason:?})"),
                }
                Ok(())
            }
            Command::Toc { manual } => {
                let toc = self.catalog.table_of_contents(&manual).await.map_err(ErrorKind::offline)?;
                print_toc(&toc);
                Ok(())
            }
        }
    }

    async fn search(&self, manual: &str, query: &str) -> Result<()> {
        let index = self.catalog.search_index(manual).await.map_err(ErrorKind::offline)?;
        let results = index.search(query);
        if results.is_empty() {
            println!("No results for \"{query}\"");
            return Ok(());
        }
        for result in results {
            let location = index
                .page(result.page_id)
                .map(|page| format!("chapter {}, page {}", page.chapter, page.page))
                .unwrap_or_else(|| format!("page #{}", result.page_id));
            println!("{location} (score {})", result.score);
            println!("    {}", to_terminal(&highlight(&result.context, query)));
        }
        Ok(())
    }

    fn list(&self) {
        let snapshot = self.coordinator.offline_manuals();
        for manual in &self.config.manuals {
            let marker = if snapshot.manuals.contains(&manual.id) { "offline" } else { "online" };
            println!("{:<8} {:<16} {}", marker, manual.id, self.title(&manual.id));
        }
        for id in snapshot.manuals.iter().filter(|id| self.config.manual(id).is_none()) {
            println!("{:<8} {id}", "offline");
        }
        if !snapshot.reconciled {
            println!("(offline list may be out of date: cache worker unavailable)");
        }
    }
}

/// The worker's transport. `--offline` never touches the network.
fn network(config: &Config, offline: bool) -> Result<NetworkHandle> {
    if offline {
        return Ok(Arc::new(Disconnected));
    }
    let timeout = Duration::from_secs(config.worker.response_timeout_secs);
    Ok(Arc::new(HttpNetwork::new(&config.base_url, timeout).map_err(ErrorKind::cache)?))
}

fn print_toc(toc: &TableOfContents) {
    match toc {
        TableOfContents::Chapters(chapters) => {
            for chapter in chapters {
                println!("{}. {} (p. {})", chapter.key, chapter.name, chapter.first_page);
                for section in &chapter.sections {
                    println!("    {} {}", section.number, section.name);
                }
            }
        }
        TableOfContents::Entries(entries) => {
            for entry in entries {
                println!("{:>5}  {}", entry.page, entry.title);
            }
        }
    }
}

/// Render `<mark>` spans as bold.
fn to_terminal(html: &str) -> String {
    html.replace("<mark>", "\x1b[1m").replace("</mark>", "\x1b[0m")
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).map_err(ErrorKind::config)?;
    let app = App::new(config, cli.offline).await?;
    if cli.command.needs_coordinator() {
        if cli.offline {
            app.coordinator.set_network_status(NetworkStatus::Offline).await;
        }
        // Without a worker the mirror is still listed; operations report
        // the unavailability themselves.
        if let Err(e) = app.coordinator.start().await {
            tracing::warn!(error = ?e, "Offline support unavailable");
        }
    }
    app.run(cli.command).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("folio: {}", *e);
            ExitCode::FAILURE
        }
    }
}
