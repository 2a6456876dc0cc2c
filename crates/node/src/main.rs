mod addr_book;
mod chain;
mod logging;
mod pool;
mod state;

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::{log_info, log_warn};
use crate::pool::Pool;

const DEFAULT_PORT: u16 = 8333;
const DEFAULT_MIN_CONNECTIONS: usize = 5;
const DEFAULT_STATE_FILE: &str = "state.bin";
const PEERS_FILE_NAME: &str = "peers.dat";
const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

struct Config {
    addr: IpAddr,
    port: u16,
    min_connections: usize,
    state_path: PathBuf,
    peers_path: PathBuf,
}

fn usage() -> String {
    [
        "usage: santitham <bootstrap-ip> [options]",
        "",
        "options:",
        "  --port <port>               peer port (default 8333)",
        "  --min-connections <count>   target number of peer sessions (default 5)",
        "  --state <path>              chain state file (default state.bin)",
        "  --peers-file <path>         peer address book file (default peers.dat",
        "                              next to the state file)",
    ]
    .join("\n")
}

fn parse_args() -> Result<Config, String> {
    let mut addr: Option<IpAddr> = None;
    let mut port = DEFAULT_PORT;
    let mut min_connections = DEFAULT_MIN_CONNECTIONS;
    let mut state_path = PathBuf::from(DEFAULT_STATE_FILE);
    let mut peers_path: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" => {
                let value = args.next().ok_or_else(|| format!("--port needs a value\n{}", usage()))?;
                port = value
                    .parse()
                    .map_err(|_| format!("invalid port {value:?}\n{}", usage()))?;
            }
            "--min-connections" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--min-connections needs a value\n{}", usage()))?;
                min_connections = value
                    .parse()
                    .map_err(|_| format!("invalid connection count {value:?}\n{}", usage()))?;
                if min_connections == 0 {
                    return Err(format!("--min-connections must be at least 1\n{}", usage()));
                }
            }
            "--state" => {
                let value = args.next().ok_or_else(|| format!("--state needs a value\n{}", usage()))?;
                state_path = PathBuf::from(value);
            }
            "--peers-file" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("--peers-file needs a value\n{}", usage()))?;
                peers_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => return Err(usage()),
            other if addr.is_none() && !other.starts_with('-') => {
                let parsed = other
                    .parse()
                    .map_err(|_| format!("invalid bootstrap address {other:?}\n{}", usage()))?;
                addr = Some(parsed);
            }
            other => return Err(format!("unknown argument {other:?}\n{}", usage())),
        }
    }

    let addr = addr.ok_or_else(|| format!("missing bootstrap address\n{}", usage()))?;
    let peers_path = peers_path.unwrap_or_else(|| state_path.with_file_name(PEERS_FILE_NAME));

    Ok(Config {
        addr,
        port,
        min_connections,
        state_path,
        peers_path,
    })
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = parse_args()?;

    log_info!("dialing bootstrap peer {}:{}", config.addr, config.port);
    let pool = Pool::new(
        config.addr,
        config.port,
        config.min_connections,
        config.state_path,
        config.peers_path,
    )
    .await?;
    log_info!("connected; pool running with {} session(s)", pool.size());

    let mut error_rx = pool.error();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log_info!("shutting down");
            shutdown_with_budget(&pool).await;
            Ok(())
        }
        changed = error_rx.changed() => {
            let message = if changed.is_ok() {
                error_rx.borrow().clone()
            } else {
                None
            };
            let message = message.unwrap_or_else(|| "pool terminated unexpectedly".to_string());
            shutdown_with_budget(&pool).await;
            Err(message)
        }
    }
}

async fn shutdown_with_budget(pool: &Pool) {
    let budget = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
    if tokio::time::timeout(budget, pool.shutdown()).await.is_err() {
        log_warn!("shutdown exceeded {SHUTDOWN_TIMEOUT_SECS}s; forcing exit");
        std::process::exit(1);
    }
}
