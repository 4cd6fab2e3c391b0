//! Server entrypoint: load configuration, build the shared zone table,
//! spawn one UDP and one TCP reactor per listen address (spec §4.G),
//! and the supervisor/graceful-shutdown plumbing that ties them
//! together (spec §4.K).
//!
//! Grounded on heimdall's `bin/stress_test.rs` for `clap` derive usage
//! and its `tracing_subscriber::fmt()` initialization; heimdall's own
//! `main.rs` is an abandoned early prototype (a bare `UdpSocket` loop
//! with no config and no tokio) and isn't a useful model for an
//! entrypoint, so the wiring below instead follows how heimdall's
//! `server.rs`/`http_server.rs` are assembled in spirit: build shared
//! state once, spawn one task per listener, hand every task the same
//! `Arc`'d context.

use base64::Engine as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use wyrdns::config::Config;
use wyrdns::metrics::DnsMetrics;
use wyrdns::rr::DnsClass;
use wyrdns::rrl::{RateLimiter, ResponseClass};
use wyrdns::server::{run_tcp_server, run_udp_server, ServerContext};
use wyrdns::store::ZoneTable;
use wyrdns::supervisor::{Child, Command, Supervisor};
use wyrdns::tsig::{TsigAlgorithm, TsigKey, TsigKeyring};
use wyrdns::udb::Udb;

/// Authoritative name server flags (spec §6.3).
#[derive(Parser, Debug)]
#[command(name = "wyrdnsd", version)]
struct Cli {
    /// Configuration file (TOML typed tree, spec §6.4).
    #[arg(short = 'c', long = "config", value_name = "config")]
    config: Option<PathBuf>,
    /// Run in the foreground instead of daemonizing.
    #[arg(short = 'd', long = "foreground")]
    foreground: bool,
    /// Override the udb image path.
    #[arg(short = 'f', long = "dbfile", value_name = "dbfile")]
    dbfile: Option<PathBuf>,
    /// Override the listen port on every configured address.
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
    /// Pidfile path. Accepted for compatibility; pidfile plumbing
    /// itself is out of scope (spec §1) and not written here.
    #[arg(short = 'P', long = "pidfile", value_name = "pidfile")]
    pidfile: Option<PathBuf>,
    /// Drop privileges to this user after binding. Accepted for
    /// compatibility; privilege drop is out of scope (spec §1).
    #[arg(short = 'u', long = "user")]
    user: Option<String>,
    /// Chroot directory. Accepted for compatibility; chroot plumbing is
    /// out of scope (spec §1).
    #[arg(short = 't', long = "chroot")]
    chroot: Option<PathBuf>,
    /// Log verbosity, 0-4.
    #[arg(short = 'V', long = "verbosity", default_value_t = 1)]
    verbosity: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let filter = match cli.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.foreground {
        info!("running in foreground");
    }
    for ignored in [
        cli.pidfile.as_ref().map(|_| "pidfile"),
        cli.user.as_ref().map(|_| "user"),
        cli.chroot.as_ref().map(|_| "chroot"),
    ]
    .into_iter()
    .flatten()
    {
        warn!("-{} accepted for compatibility but not applied by this core", ignored);
    }

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(StartupError::Usage(msg)) => {
            error!("{}", msg);
            std::process::exit(1);
        }
        Err(StartupError::Runtime(msg)) => {
            error!("{}", msg);
            std::process::exit(2);
        }
    }
}

enum StartupError {
    Usage(String),
    Runtime(String),
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| StartupError::Usage(format!("reading {}: {}", path.display(), e)))?;
            Config::from_toml_str(&text).map_err(|e| StartupError::Usage(e.to_string()))?
        }
        None => Config {
            server: toml::from_str("").map_err(|e| StartupError::Usage(e.to_string()))?,
            keys: Vec::new(),
            patterns: Vec::new(),
            zones: Vec::new(),
        },
    };

    if let Some(dbfile) = cli.dbfile {
        config.server.database = dbfile;
    }
    if let Some(port) = cli.port {
        for addr in &mut config.server.listen {
            addr.set_port(port);
        }
    }

    // Opened up front for its crash-recovery guarantee (spec §4.D
    // rollback window) even though serializing live zone content into
    // udb chunks is not wired up at this layer; zones are populated
    // purely by the in-memory transfer path. Closed cleanly by its
    // `Drop` impl when this function returns.
    if let Some(parent) = config.server.database.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    let _udb = Udb::open(&config.server.database)
        .map_err(|e| StartupError::Runtime(format!("opening udb image: {}", e)))?;

    let mut tsig_keyring = TsigKeyring::new();
    for key in &config.keys {
        let algorithm = TsigAlgorithm::from_config_name(&key.algorithm).ok_or_else(|| {
            StartupError::Usage(format!("unknown TSIG algorithm '{}' for key '{}'", key.algorithm, key.name))
        })?;
        let secret = base64::engine::general_purpose::STANDARD
            .decode(&key.secret_base64)
            .map_err(|e| StartupError::Usage(format!("key '{}' secret is not valid base64: {}", key.name, e)))?;
        let name = wyrdns::name::Name::make(&key.name)
            .map_err(|e| StartupError::Usage(format!("key '{}' is not a valid name: {}", key.name, e)))?;
        tsig_keyring.insert(TsigKey { name, algorithm, secret });
    }

    let mut zones = ZoneTable::new();
    let mut zone_rrl_whitelist = std::collections::HashMap::new();
    for zone_cfg in &config.zones {
        let effective = config.effective_zone(zone_cfg);
        let apex = wyrdns::name::Name::make(&effective.name)
            .map_err(|e| StartupError::Usage(format!("zone '{}' is not a valid name: {}", effective.name, e)))?;
        let whitelist: Vec<ResponseClass> = effective
            .rrl_whitelist
            .iter()
            .filter_map(|name| {
                let parsed = ResponseClass::parse(name);
                if parsed.is_none() {
                    warn!(zone = %effective.name, class = %name, "unknown rrl-whitelist class, ignoring");
                }
                parsed
            })
            .collect();
        if !whitelist.is_empty() {
            zone_rrl_whitelist.insert(apex.tree_key(), whitelist);
        }
        zones.add_zone(apex, DnsClass::In);
        info!(zone = %effective.name, "configured zone");
    }

    let rrl = RateLimiter::new(config.server.rrl.ratelimit, config.server.rrl.slip);
    let metrics = Arc::new(
        DnsMetrics::new().map_err(|e| StartupError::Runtime(format!("building metrics registry: {}", e)))?,
    );
    metrics.zone_count.set(config.zones.len() as i64);
    metrics.worker_count.set(config.server.server_count as i64);

    let ctx = Arc::new(ServerContext::new(
        zones,
        tsig_keyring,
        rrl,
        metrics.clone(),
        zone_rrl_whitelist,
    ));
    let query_semaphore = Arc::new(Semaphore::new(config.server.server_count.max(1) * 64));

    let shutdown = wyrdns::graceful_shutdown::GracefulShutdown::new();
    let mut supervisor = Supervisor::new(Duration::from_secs(config.server.tcp_timeout_secs.max(1)));

    let mut listener_handles = Vec::new();
    for addr in &config.server.listen {
        let addr = *addr;
        let ctx_udp = ctx.clone();
        let sem = query_semaphore.clone();
        let rx = shutdown.subscribe();
        listener_handles.push(tokio::spawn(async move {
            if let Err(e) = run_udp_server(addr, ctx_udp, sem, rx).await {
                error!("UDP listener on {} exited: {}", addr, e);
            }
        }));

        let ctx_tcp = ctx.clone();
        let server_config = config.server.clone();
        let rx = shutdown.subscribe();
        listener_handles.push(tokio::spawn(async move {
            if let Err(e) = run_tcp_server(addr, ctx_tcp, &server_config, rx).await {
                error!("TCP listener on {} exited: {}", addr, e);
            }
        }));
    }

    // In this task-based model the "netio worker process" collapses to
    // one tracked child whose inbox is drained but not yet acted on;
    // `Supervisor::run_reload` talks to it the same way it would a real
    // forked worker (spec §4.K).
    let (worker_tx, mut worker_rx) = tokio::sync::mpsc::channel::<Command>(8);
    supervisor.register_worker(Child {
        name: "netio".to_string(),
        commands: worker_tx,
        handle: tokio::spawn(async move { while worker_rx.recv().await.is_some() {} }),
    });

    info!("wyrdnsd listening on {} address(es)", config.server.listen.len());

    tokio::signal::ctrl_c().await.ok();
    info!("received interrupt, shutting down");

    if let Err(e) = shutdown.shutdown().await {
        warn!("shutdown reported an error: {}", e);
    }
    supervisor.reap_and_shutdown().await;
    for handle in listener_handles {
        handle.abort();
    }

    Ok(())
}
