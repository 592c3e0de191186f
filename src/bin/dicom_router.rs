//! CLI surface (§6): `dicom-router` is a thin wrapper over the core
//! engine types — `start` boots the whole appliance (receivers,
//! assemblers, processors, destination health prober, retry manager);
//! the remaining subcommands are read-only views over `AppConfig` and
//! the Study Archive, since the admin HTTP API/web UI that would
//! otherwise serve them live outside this repo's scope (§1).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dicom_router::archive::StudyArchive;
use dicom_router::assembler::StudyAssembler;
use dicom_router::broker::{self, HonestBroker};
use dicom_router::config::AppConfig;
use dicom_router::crosswalk::CrosswalkStore;
use dicom_router::destinations::DestinationManager;
use dicom_router::error::CoreError;
use dicom_router::model::Instance;
use dicom_router::processor::RouteProcessor;
use dicom_router::receiver::DicomReceiver;
use dicom_router::retry::RetryManager;

#[derive(Parser)]
#[command(name = "dicom-router")]
#[command(about = "DICOM routing appliance: ingest, de-identify, fan out to archives")]
struct Cli {
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the receiver(s) and route processing pipeline.
    Start {
        #[arg(long, value_delimiter = ',')]
        routes: Option<Vec<String>>,
        #[arg(long)]
        admin_port: Option<u16>,
    },
    /// Print a snapshot of configured routes and their destinations.
    Status,
    #[command(subcommand)]
    Routes(RoutesCommand),
    #[command(subcommand)]
    Destinations(DestinationsCommand),
    #[command(subcommand)]
    Scripts(ScriptsCommand),
    /// Query a destination for studies (query/retrieve origination is
    /// out of scope for this engine — see spec.md §1 Non-goals).
    Query {
        #[arg(short = 'd', long)]
        destination: String,
        #[arg(long = "patient-id")]
        patient_id: Option<String>,
        #[arg(long = "study-date")]
        study_date: Option<String>,
        #[arg(long)]
        modality: Option<String>,
    },
    /// Show archived transfer history.
    History {
        #[arg(long = "ae-title")]
        ae_title: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    /// Import DICOM files from a directory into a route as if received.
    Import {
        dir: PathBuf,
        #[arg(long)]
        route: String,
        #[arg(long)]
        recursive: bool,
        #[arg(long)]
        r#move: bool,
    },
}

#[derive(Subcommand)]
enum RoutesCommand {
    List,
    Show { ae_title: String },
}

#[derive(Subcommand)]
enum DestinationsCommand {
    List,
    Test { name: String },
}

#[derive(Subcommand)]
enum ScriptsCommand {
    List,
    Show { name: String },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::from(0),
        Err(CliError::Config(msg)) => {
            error!("{msg}");
            ExitCode::from(1)
        }
        Err(CliError::Runtime(msg)) => {
            error!("{msg}");
            ExitCode::from(2)
        }
    }
}

enum CliError {
    Config(String),
    Runtime(String),
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Config(msg) => CliError::Config(msg),
            other => CliError::Runtime(other.to_string()),
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Command::Start { routes, admin_port } => cmd_start(config, routes, admin_port).await,
        Command::Status => cmd_status(config),
        Command::Routes(RoutesCommand::List) => cmd_routes_list(config),
        Command::Routes(RoutesCommand::Show { ae_title }) => cmd_routes_show(config, &ae_title),
        Command::Destinations(DestinationsCommand::List) => cmd_destinations_list(config),
        Command::Destinations(DestinationsCommand::Test { name }) => cmd_destinations_test(config, &name).await,
        Command::Scripts(ScriptsCommand::List) => cmd_scripts_list(config),
        Command::Scripts(ScriptsCommand::Show { name }) => cmd_scripts_show(config, &name),
        Command::Query { destination, .. } => {
            println!("query/retrieve origination against {destination} is out of scope for this engine (spec.md §1 Non-goals)");
            Ok(())
        }
        Command::History { ae_title, date } => cmd_history(config, ae_title, date).await,
        Command::Import { dir, route, recursive, r#move } => cmd_import(config, dir, route, recursive, r#move).await,
    }
}

/// Wires up every enabled (and, if `--routes` was given, selected)
/// route's Receiver -> Assembler -> Route Processor pipeline, plus the
/// shared Destination Manager prober and Retry Manager, and runs until
/// Ctrl-C (§5 "Cancellation": graceful shutdown closes listeners,
/// drains in-flight associations, flushes status, and exits).
async fn cmd_start(config: AppConfig, routes_filter: Option<Vec<String>>, admin_port: Option<u16>) -> Result<(), CliError> {
    if let Some(port) = admin_port {
        warn!(admin_port = port, "admin HTTP API is an external collaborator and is not implemented by this binary (spec.md §1)");
    }

    let crosswalk = Arc::new(CrosswalkStore::open(&config.crosswalk_path()).map_err(|e| CliError::Runtime(e.to_string()))?);
    let archive = Arc::new(StudyArchive::new(config.archive_dir()));

    let mut brokers: HashMap<String, Arc<dyn HonestBroker>> = HashMap::new();
    let mut broker_configs = HashMap::new();
    for cfg in &config.honest_broker {
        let b = broker::build(cfg, Arc::clone(&crosswalk))?;
        brokers.insert(cfg.name.clone(), b);
        broker_configs.insert(cfg.name.clone(), cfg.clone());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let destination_manager = Arc::new(DestinationManager::new(shutdown_rx.clone()));
    let mut destination_configs = HashMap::new();
    for dest in &config.destinations {
        if !dest.enabled() {
            continue;
        }
        destination_configs.insert(dest.name().to_string(), dest.clone());
        destination_manager.add(dest, "DICOM_ROUTER").await;
    }

    let mut routes: HashMap<String, dicom_router::config::RouteConfig> = HashMap::new();
    let active_routes: Vec<_> = config
        .routes
        .iter()
        .filter(|r| r.enabled)
        .filter(|r| routes_filter.as_ref().map(|f| f.contains(&r.ae_title)).unwrap_or(true))
        .cloned()
        .collect();

    if active_routes.is_empty() {
        return Err(CliError::Config("no enabled routes matched --routes filter (or none configured)".to_string()));
    }

    let mut join_set = tokio::task::JoinSet::new();

    for route in &active_routes {
        routes.insert(route.ae_title.clone(), route.clone());

        let route_dir = config.receiver.base_dir.join(&route.ae_title);
        let late_arrivals_dir = route_dir.join("late-arrivals");
        let (completed_tx, completed_rx) = tokio::sync::mpsc::channel(64);

        let assembler = Arc::new(StudyAssembler::new(
            route.ae_title.clone(),
            chrono::Duration::seconds(route.study_timeout_seconds as i64),
            route.max_study_age_seconds.map(|s| chrono::Duration::seconds(s as i64)),
            late_arrivals_dir,
            completed_tx,
        ));

        let receiver = Arc::new(DicomReceiver::new(route.ae_title.clone(), route_dir.clone(), route.worker_threads, Arc::clone(&assembler)));
        receiver.gc_partial_files(chrono::Duration::seconds(route.study_timeout_seconds as i64)).await;

        let processor = Arc::new(RouteProcessor::new(
            route.clone(),
            route_dir,
            config.scripts_dir(),
            Arc::clone(&archive),
            Arc::clone(&destination_manager),
            destination_configs.clone(),
            brokers.clone(),
            broker_configs.clone(),
        ));

        let recv = Arc::clone(&receiver);
        let recv_shutdown = shutdown_rx.clone();
        let port = route.port;
        join_set.spawn(async move {
            if let Err(e) = recv.start(port, recv_shutdown).await {
                error!(error = %e, "receiver exited with error");
            }
        });

        let asm = Arc::clone(&assembler);
        let asm_shutdown = shutdown_rx.clone();
        join_set.spawn(async move {
            asm.run(asm_shutdown).await;
        });

        let proc_shutdown = shutdown_rx.clone();
        join_set.spawn(async move {
            processor.run(completed_rx, proc_shutdown).await;
        });

        info!(route = %route.ae_title, port, "route online");
    }

    let prober = Arc::clone(&destination_manager);
    let health_interval = std::time::Duration::from_secs(config.resilience.health_check_interval_seconds);
    join_set.spawn(async move {
        prober.run_prober(health_interval).await;
    });

    let retry_manager = RetryManager::new(config.resilience.clone(), Arc::clone(&archive), Arc::clone(&destination_manager), routes, destination_configs, brokers, shutdown_rx.clone());
    let retry_for_run = Arc::clone(&retry_manager);
    join_set.spawn(async move {
        retry_for_run.run().await;
    });

    let cleanup_archive = Arc::clone(&archive);
    let retention_days = config.resilience.retention_days;
    let mut cleanup_shutdown = shutdown_rx.clone();
    join_set.spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(24 * 3600));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cleanup_archive.clean_expired(retention_days).await;
                    if removed > 0 {
                        info!(removed, "archive retention sweep removed expired studies");
                    }
                }
                _ = cleanup_shutdown.changed() => {
                    if *cleanup_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await.map_err(|e| CliError::Runtime(e.to_string()))?;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    let deadline = tokio::time::Duration::from_secs(30);
    let _ = tokio::time::timeout(deadline, async {
        while join_set.join_next().await.is_some() {}
    })
    .await;

    Ok(())
}

fn cmd_status(config: AppConfig) -> Result<(), CliError> {
    println!("routes: {}", config.routes.len());
    for route in &config.routes {
        println!("  {} port={} enabled={} destinations={}", route.ae_title, route.port, route.enabled, route.destinations.len());
    }
    println!("destinations: {}", config.destinations.len());
    for dest in &config.destinations {
        println!("  {} enabled={}", dest.name(), dest.enabled());
    }
    Ok(())
}

fn cmd_routes_list(config: AppConfig) -> Result<(), CliError> {
    for route in &config.routes {
        println!("{}\t{}\t{}", route.ae_title, route.port, if route.enabled { "enabled" } else { "disabled" });
    }
    Ok(())
}

fn cmd_routes_show(config: AppConfig, ae_title: &str) -> Result<(), CliError> {
    let route = config.route(ae_title).ok_or_else(|| CliError::Config(format!("no such route {ae_title}")))?;
    println!("{ae_title}");
    println!("  port: {}", route.port);
    println!("  worker_threads: {}", route.worker_threads);
    println!("  study_timeout_seconds: {}", route.study_timeout_seconds);
    println!("  enabled: {}", route.enabled);
    for binding in &route.destinations {
        println!(
            "  -> {} anonymize={} priority={} enabled={}",
            binding.destination, binding.anonymize, binding.priority, binding.enabled
        );
    }
    Ok(())
}

fn cmd_destinations_list(config: AppConfig) -> Result<(), CliError> {
    for dest in &config.destinations {
        println!("{}\t{}", dest.name(), if dest.enabled() { "enabled" } else { "disabled" });
    }
    Ok(())
}

async fn cmd_destinations_test(config: AppConfig, name: &str) -> Result<(), CliError> {
    let dest_config = config.destination(name).ok_or_else(|| CliError::Config(format!("no such destination {name}")))?;
    let (_tx, shutdown_rx) = watch::channel(false);
    let manager = DestinationManager::new(shutdown_rx);
    manager.add(dest_config, "DICOM_ROUTER").await;

    let available = manager.check(name).await;
    println!("{name}: {}", if available { "reachable" } else { "unreachable" });
    if !available {
        return Err(CliError::Runtime(format!("destination {name} failed probe")));
    }
    Ok(())
}

fn cmd_scripts_list(config: AppConfig) -> Result<(), CliError> {
    let dir = config.scripts_dir();
    println!("hipaa_standard\t(built-in)");
    println!("passthrough\t(built-in)");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        if entry.path().extension().and_then(|e| e.to_str()) == Some("descript") {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                println!("{stem}\t{}", entry.path().display());
            }
        }
    }
    Ok(())
}

fn cmd_scripts_show(config: AppConfig, name: &str) -> Result<(), CliError> {
    if name == "hipaa_standard" || name == "passthrough" {
        println!("(built-in script, composed entirely by the enhancer at runtime — see spec.md §4.B)");
        return Ok(());
    }
    let path = config.scripts_dir().join(format!("{name}.descript"));
    let text = std::fs::read_to_string(&path).map_err(|e| CliError::Config(format!("reading {}: {e}", path.display())))?;
    print!("{text}");
    Ok(())
}

async fn cmd_history(config: AppConfig, ae_title: Option<String>, date: Option<String>) -> Result<(), CliError> {
    let archive = StudyArchive::new(config.archive_dir());
    let routes: Vec<String> = match ae_title {
        Some(ae) => vec![ae],
        None => config.routes.iter().map(|r| r.ae_title.clone()).collect(),
    };

    for route_ae in routes {
        let summaries = archive.list_archived_studies(&route_ae, 100).await;
        for summary in summaries {
            if let Some(ref d) = date {
                if !summary.archived_at.format("%Y-%m-%d").to_string().eq(d) {
                    continue;
                }
            }
            println!("{}\t{}\t{}\tfiles={}", summary.route_ae, summary.study_instance_uid, summary.archived_at.to_rfc3339(), summary.file_count);
        }
    }
    Ok(())
}

/// `import DIR --route AE [--recursive] [--move]`: reads DICOM files
/// from the local filesystem and feeds them through the same
/// Instance/Archive path a C-STORE receive would, for offline backfill.
async fn cmd_import(config: AppConfig, dir: PathBuf, route_ae: String, recursive: bool, move_files: bool) -> Result<(), CliError> {
    let route = config.route(&route_ae).ok_or_else(|| CliError::Config(format!("no such route {route_ae}")))?;
    let route_dir = config.receiver.base_dir.join(&route.ae_title);
    let incoming = route_dir.join("incoming");

    let walker: Box<dyn Iterator<Item = walkdir::DirEntry>> = if recursive {
        Box::new(walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()))
    } else {
        Box::new(walkdir::WalkDir::new(&dir).max_depth(1).into_iter().filter_map(|e| e.ok()))
    };

    let entries: Vec<_> = walker.filter(|e| e.file_type().is_file()).collect();
    let progress = ProgressBar::new(entries.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("  [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut imported = 0usize;
    let mut failed = 0usize;

    for entry in entries {
        progress.inc(1);
        let instance = match Instance::from_path(entry.path()) {
            Ok(i) => i,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable file during import");
                failed += 1;
                continue;
            }
        };

        let dest = incoming.join(&instance.study_instance_uid).join(format!("{}.dcm", instance.sop_instance_uid));
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| CliError::Runtime(e.to_string()))?;
        }

        let result = if move_files {
            tokio::fs::rename(entry.path(), &dest).await
        } else {
            tokio::fs::copy(entry.path(), &dest).await.map(|_| ())
        };

        match result {
            Ok(()) => imported += 1,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "failed to import file");
                failed += 1;
            }
        }
    }

    progress.finish_and_clear();
    println!("imported {imported} file(s) into {route_ae}/incoming ({failed} failed)");
    if failed > 0 && imported == 0 {
        return Err(CliError::Runtime("import found files but none could be copied".to_string()));
    }
    Ok(())
}
