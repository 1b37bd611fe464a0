// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! paseod, the paseo agent daemon.

use paseo_daemon::lifecycle::{self, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct Flags {
    listen: Option<String>,
    home: Option<String>,
    log_format: LogFormat,
    no_relay: bool,
}

enum LogFormat {
    Pretty,
    Json,
}

fn parse_flags() -> Result<Flags, String> {
    let mut flags = Flags {
        listen: None,
        home: None,
        log_format: LogFormat::Pretty,
        no_relay: false,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--listen" => {
                flags.listen = Some(args.next().ok_or("--listen requires an address")?);
            }
            "--home" => {
                flags.home = Some(args.next().ok_or("--home requires a directory")?);
            }
            "--log-format" => {
                flags.log_format = match args.next().as_deref() {
                    Some("pretty") => LogFormat::Pretty,
                    Some("json") => LogFormat::Json,
                    other => return Err(format!("unknown log format {:?}", other)),
                };
            }
            "--no-relay" => flags.no_relay = true,
            "--help" | "-h" => {
                println!(
                    "paseod [--listen <addr>] [--home <dir>] [--log-format pretty|json] [--no-relay]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown flag: {}", other)),
        }
    }
    Ok(flags)
}

/// Pretty logs go to stderr; json logs stream to the daemon log file under
/// `$PASEO_HOME` through a non-blocking appender. The returned guard must
/// stay alive for the process lifetime.
fn init_tracing(
    format: &LogFormat,
    config: &Config,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,paseo_daemon=debug"));
    match format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
        LogFormat::Json => {
            let file_name = config
                .log_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "daemon.log".to_string());
            let appender = tracing_appender::rolling::never(&config.home, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(writer)
                .init();
            Some(guard)
        }
    }
}

#[tokio::main]
async fn main() {
    let flags = match parse_flags() {
        Ok(flags) => flags,
        Err(message) => {
            eprintln!("paseod: {}", message);
            std::process::exit(2);
        }
    };
    if let Some(home) = &flags.home {
        std::env::set_var("PASEO_HOME", home);
    }

    let config = match Config::load(flags.listen.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("paseod: {}", e);
            std::process::exit(1);
        }
    };
    if std::fs::create_dir_all(&config.home).is_err() {
        eprintln!("paseod: cannot create {}", config.home.display());
        std::process::exit(1);
    }
    let _log_guard = init_tracing(&flags.log_format, &config);

    let daemon = match lifecycle::startup(config).await {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(err = %e, "startup failed");
            std::process::exit(1);
        }
    };

    info!(server_id = %daemon.identity.server_id, listen = %daemon.config.listen, "paseod up");
    match daemon.pairing_url(!flags.no_relay) {
        Some(url) => info!(%url, "pairing url"),
        None => info!("pairing disabled (--no-relay)"),
    }

    let shutdown = daemon.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            shutdown.cancel();
        }
    });

    daemon.run().await;
}
