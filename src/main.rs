//! # Mixtape
//!
//! Managed playlists composed from nested sources, refreshed on a staggered
//! schedule. Everything lives in one SQLite file: account and playlist
//! definitions, the offline catalog the playlists are written to, and the
//! deferred task queue.
//!
//! ## Usage
//!
//! ```bash
//! # Seed the catalog and set up an account
//! mixtape catalog import catalog.json
//! mixtape user add alice --linked
//!
//! # Define playlists
//! mixtape playlist add alice chill --part "artist:Bill Evans"
//! mixtape playlist add alice weekly --part "album:Blue Train" --reference chill --shuffle
//!
//! # Refresh one now, or schedule everything and let the worker deliver
//! mixtape run alice weekly
//! mixtape schedule-all
//! mixtape worker start
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser};
use log::{debug, info};
use mixtape::catalog::LocalCatalog;
use mixtape::cli::{self, CatalogAction, PlaylistAction, UserAction, WorkerAction};
use mixtape::config::{OperatingMode, RuntimeConfig};
use mixtape::dispatch::Dispatcher;
use mixtape::error::RunResult;
use mixtape::manage;
use mixtape::runner::PlaylistRunner;
use mixtape::scheduler::{BulkScheduler, SystemClock};
use mixtape::store::{PlaylistStore, SqliteStore};
use mixtape::tasks::{MemoryTaskQueue, ScheduledExecution, SqliteTaskQueue, TaskQueue};
use mixtape::{completion, worker};

/// Collaborators opened on the configured database.
struct Services {
    store: SqliteStore,
    catalog: LocalCatalog,
    queue: SqliteTaskQueue,
}

impl Services {
    fn open(config: &RuntimeConfig) -> Result<Self> {
        debug!("opening database at {}", config.db_path.display());
        Ok(Self {
            store: SqliteStore::open(&config.db_path)?,
            catalog: LocalCatalog::open(&config.db_path)?,
            queue: SqliteTaskQueue::open(&config.db_path)?,
        })
    }

    fn scheduler<'a>(
        &'a self,
        queue: &'a dyn TaskQueue,
        clock: &'a SystemClock,
        config: &RuntimeConfig,
    ) -> BulkScheduler<'a> {
        BulkScheduler::new(&self.store, queue, clock)
            .with_staggers(config.user_stagger_secs, config.playlist_stagger_secs)
    }

    fn runner<'a>(&'a self, clock: &'a SystemClock) -> PlaylistRunner<'a> {
        PlaylistRunner::new(&self.store, &self.catalog, clock)
    }
}

fn print_emitted(emitted: &[ScheduledExecution]) {
    for execution in emitted {
        println!(
            "{}  +{}s  {}",
            execution.not_before.format("%Y-%m-%d %H:%M:%S"),
            execution.delay_secs,
            execution.payload
        );
    }
    println!("Scheduled {} execution(s)", emitted.len());
}

/// Emit executions with `schedule`, then deliver them on the spot in inline mode.
fn schedule<F>(services: &Services, config: &RuntimeConfig, schedule: F) -> Result<()>
where
    F: for<'a> Fn(&BulkScheduler<'a>) -> RunResult<Vec<ScheduledExecution>>,
{
    let clock = SystemClock;
    match config.operating_mode {
        OperatingMode::Deferred => {
            let scheduler = services.scheduler(&services.queue, &clock, config);
            print_emitted(&schedule(&scheduler)?);
        }
        OperatingMode::Inline => {
            let inline_queue = MemoryTaskQueue::new();
            let scheduler = services.scheduler(&inline_queue, &clock, config);
            print_emitted(&schedule(&scheduler)?);

            let dispatcher = Dispatcher::new(
                services.scheduler(&inline_queue, &clock, config),
                services.runner(&clock),
            );
            let report = dispatcher.drain(&inline_queue);
            println!(
                "Ran inline: {} succeeded, {} failed",
                report.succeeded, report.failed
            );
        }
    }
    Ok(())
}

fn run_worker(config: &RuntimeConfig) -> Result<()> {
    let services = Services::open(config)?;
    let clock = SystemClock;
    let dispatcher = Dispatcher::new(
        services.scheduler(&services.queue, &clock, config),
        services.runner(&clock),
    );
    worker::Worker::new(&services.queue, dispatcher, &clock, config).run_forever(&config.pid_file())
}

/// Main entry point for Mixtape.
///
/// Initializes logging, loads the runtime configuration and routes commands.
///
/// # Logging
///
/// Controlled via `RUST_LOG`:
/// - `RUST_LOG=info mixtape schedule-all` - Show scheduling decisions
/// - `RUST_LOG=mixtape::resolver=debug mixtape run alice weekly` - Trace resolution
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    if let cli::Command::Completion { shell } = &args.command {
        let mut cmd = cli::Args::command();
        completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        return Ok(());
    }

    let mut config = RuntimeConfig::load()?;
    if let Some(db) = &args.db {
        config = config.with_db_path(db)?;
    }
    if args.inline {
        config.operating_mode = OperatingMode::Inline;
    }

    match args.command {
        cli::Command::Completion { .. } => {}
        cli::Command::CompletePlaylists { owner } => {
            completion::print_playlist_completions(&config.db_path, &owner)?;
        }
        cli::Command::User { action } => {
            let services = Services::open(&config)?;
            match action {
                UserAction::Add { name, linked, locked } => {
                    let user = manage::add_user(&services.store, &name, linked, locked)?;
                    println!("Added user {}", user.username);
                }
                UserAction::Set { name, linked, locked } => {
                    let user = manage::set_account_flags(&services.store, &name, linked, locked)?;
                    println!(
                        "{}: linked={} locked={}",
                        user.username, user.linked, user.locked
                    );
                }
                UserAction::List => {
                    for user in services.store.list_users()? {
                        let state = if user.is_eligible() { "eligible" } else { "skipped" };
                        println!(
                            "{}\tlinked={}\tlocked={}\t{state}",
                            user.username, user.linked, user.locked
                        );
                    }
                }
            }
        }
        cli::Command::Playlist { action } => {
            let services = Services::open(&config)?;
            match action {
                PlaylistAction::Add(add) => {
                    let (owner, request) = add.into_request();
                    let playlist = manage::create_playlist(
                        &services.store,
                        &services.catalog,
                        &config,
                        &owner,
                        request,
                    )?;
                    match &playlist.target_uri {
                        Some(uri) => println!("Created {owner} / {} -> {uri}", playlist.name),
                        None => println!("Created {owner} / {} (no remote target)", playlist.name),
                    }
                }
                PlaylistAction::Update(update) => {
                    let (owner, name, update) = update.into_update();
                    manage::update_playlist(&services.store, &owner, &name, update)?;
                    println!("Updated {owner} / {name}");
                }
                PlaylistAction::Delete { owner, name } => {
                    manage::delete_playlist(&services.store, &owner, &name)?;
                    println!("Deleted {owner} / {name}");
                }
                PlaylistAction::Show { owner, name } => {
                    let playlist = services
                        .store
                        .get_playlist(&owner, &name)?
                        .ok_or_else(|| anyhow::anyhow!("playlist {owner} / {name} not found"))?;
                    println!("{}", serde_json::to_string_pretty(&playlist)?);
                }
                PlaylistAction::List { owner } => {
                    for playlist in services.store.list_playlists(&owner)? {
                        println!(
                            "{}\t{}\t{} part(s)\t{} reference(s)\t{}",
                            playlist.name,
                            playlist.kind,
                            playlist.parts.len(),
                            playlist.playlist_references.len(),
                            playlist.target_uri.as_deref().unwrap_or("-")
                        );
                    }
                }
            }
        }
        cli::Command::Catalog { action } => {
            let mut services = Services::open(&config)?;
            match action {
                CatalogAction::Import { file } => {
                    info!("Importing catalog from: {}", file.display());
                    let (tracks, playlists) = services.catalog.import_file(&file)?;
                    println!("Imported {tracks} track(s) and {playlists} playlist(s)");
                }
                CatalogAction::Show { uri } => {
                    let playlist = services
                        .catalog
                        .playlist(&uri)?
                        .ok_or_else(|| anyhow::anyhow!("catalog playlist {uri} not found"))?;
                    println!("{} ({})", playlist.name, playlist.owner);
                    println!("{}", playlist.description);
                    for id in &playlist.tracks {
                        println!("{id}");
                    }
                }
            }
        }
        cli::Command::Run { user, playlist, seed } => {
            let services = Services::open(&config)?;
            let clock = SystemClock;
            let summary = services
                .runner(&clock)
                .with_shuffle_seed(seed)
                .run_playlist(&user, &playlist)?;
            println!(
                "Wrote {} track(s) from {} source(s) to {}",
                summary.tracks, summary.sources, summary.uri
            );
            println!("{}", summary.description);
        }
        cli::Command::ScheduleUser { user } => {
            let services = Services::open(&config)?;
            schedule(&services, &config, |scheduler| scheduler.schedule_user(&user))?;
        }
        cli::Command::ScheduleAll => {
            let services = Services::open(&config)?;
            schedule(&services, &config, |scheduler| scheduler.schedule_all_users())?;
        }
        cli::Command::Worker { action } => {
            let pid_file = config.pid_file();
            match action {
                WorkerAction::Run { once } => {
                    if once {
                        let services = Services::open(&config)?;
                        let clock = SystemClock;
                        let dispatcher = Dispatcher::new(
                            services.scheduler(&services.queue, &clock, &config),
                            services.runner(&clock),
                        );
                        let report = worker::Worker::new(&services.queue, dispatcher, &clock, &config)
                            .run_once()?;
                        println!(
                            "Delivered {} task(s): {} completed, {} retried, {} dropped",
                            report.delivered(),
                            report.completed,
                            report.retried,
                            report.dropped
                        );
                    } else {
                        run_worker(&config)?;
                    }
                }
                WorkerAction::Start => {
                    if worker::is_worker_running(&pid_file)? {
                        eprintln!("Worker is already running");
                        return Ok(());
                    }

                    // Fork and run the worker loop in the child
                    match unsafe { libc::fork() } {
                        0 => {
                            run_worker(&config)?;
                            std::process::exit(0);
                        }
                        pid if pid > 0 => {
                            println!("Starting worker...");
                            std::thread::sleep(std::time::Duration::from_millis(500));

                            if worker::is_worker_running(&pid_file)? {
                                println!("Worker started successfully");
                            } else {
                                eprintln!("Failed to start worker");
                            }
                        }
                        _ => {
                            eprintln!("Failed to fork process");
                        }
                    }
                }
                WorkerAction::Stop => {
                    let pid = worker::stop_worker(&pid_file)?;
                    println!("Worker stopped (PID: {pid})");
                }
                WorkerAction::Status => {
                    if worker::is_worker_running(&pid_file)? {
                        println!("Worker is running");
                    } else {
                        println!("Worker is not running");
                    }
                    let queue = SqliteTaskQueue::open(&config.db_path)?;
                    println!("{} task(s) pending", queue.pending_count()?);
                }
            }
        }
    }

    Ok(())
}
