//! Demand-response service entry point: CLI wiring and component construction.

use std::path::Path;
use std::process;
use std::sync::Arc;

use tracing::{info, warn};

use microgrid_dr::audit::MemoryAuditLog;
use microgrid_dr::config::ServiceConfig;
use microgrid_dr::devices::MemoryDirectory;
use microgrid_dr::io::export::export_audit_csv;
use microgrid_dr::logging;
use microgrid_dr::runner;
use microgrid_dr::service::Services;
use microgrid_dr::transport::{self, LocalBus};

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    port_override: Option<u16>,
    audit_out: Option<String>,
}

fn print_help() {
    eprintln!("microgrid-dr: demand-response control core for a campus microgrid");
    eprintln!();
    eprintln!("Usage: microgrid-dr [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>      Load configuration from a TOML file");
    eprintln!(
        "  --preset <name>      Use a built-in preset ({})",
        ServiceConfig::PRESETS.join(", ")
    );
    #[cfg(feature = "api")]
    eprintln!("  --port <u16>         Override the API port (default: 3002)");
    eprintln!("  --audit-out <path>   Write the audit trail as CSV on shutdown");
    eprintln!("  --help               Show this help message");
    eprintln!();
    eprintln!("If neither --config nor --preset is given, the campus preset is used.");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        port_override: None,
        audit_out: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires a path argument");
                    process::exit(1);
                }
                cli.config_path = Some(args[i].clone());
            }
            "--preset" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --preset requires a name argument");
                    process::exit(1);
                }
                cli.preset = Some(args[i].clone());
            }
            #[cfg(feature = "api")]
            "--port" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --port requires a u16 argument");
                    process::exit(1);
                }
                if let Ok(p) = args[i].parse::<u16>() {
                    cli.port_override = Some(p);
                } else {
                    eprintln!("error: --port value \"{}\" is not a valid u16", args[i]);
                    process::exit(1);
                }
            }
            "--audit-out" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --audit-out requires a path argument");
                    process::exit(1);
                }
                cli.audit_out = Some(args[i].clone());
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    if cli.config_path.is_some() && cli.preset.is_some() {
        eprintln!("error: --config and --preset are mutually exclusive");
        process::exit(1);
    }

    cli
}

fn load_config(cli: &CliArgs) -> ServiceConfig {
    let loaded = if let Some(ref path) = cli.config_path {
        ServiceConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ServiceConfig::from_preset(name)
    } else {
        Ok(ServiceConfig::campus())
    };

    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(port) = cli.port_override {
        config.server.port = port;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

fn main() {
    let cli = parse_args();
    let config = load_config(&cli);
    logging::init();

    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("error: failed to create tokio runtime: {e}");
        process::exit(1);
    });

    let audit_log = Arc::new(MemoryAuditLog::new());
    rt.block_on(async {
        let bus = Arc::new(LocalBus::with_client_id(transport::client_id(
            &config.transport.client_id_prefix,
        )));
        let directory = Arc::new(MemoryDirectory::new(config.seed_devices()));
        info!(
            client_id = bus.client_id(),
            devices = config.devices.len(),
            "starting demand-response core"
        );

        let services = match Services::new(&config, directory, audit_log.clone(), bus) {
            Ok(services) => Arc::new(services),
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        };

        let runner_task = tokio::spawn(runner::run(services.clone()));

        #[cfg(feature = "api")]
        {
            use std::net::SocketAddr;

            let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
            if let Err(e) = microgrid_dr::api::serve(services, addr, shutdown_signal()).await {
                tracing::error!(error = %e, "API server failed");
            }
        }
        #[cfg(not(feature = "api"))]
        {
            drop(services);
            shutdown_signal().await;
        }

        runner_task.abort();
        info!("shutting down");
    });

    if let Some(ref path) = cli.audit_out {
        let events = rt.block_on(audit_log.snapshot());
        if let Err(e) = export_audit_csv(&events, Path::new(path)) {
            eprintln!("error: failed to write audit CSV: {e}");
            process::exit(1);
        }
        eprintln!("Audit trail ({} events) written to {path}", events.len());
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}
