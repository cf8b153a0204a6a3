// NetSnare entry point
// Parses the CLI, wires up the capture sink and runs the selected
// honeypot services until Ctrl-C

use clap::Parser;
use log::{error, info, warn};
use netsnare::capture::CaptureSink;
use netsnare::cli::Args;
use netsnare::honeypot;
use netsnare::signatures::Signatures;
use netsnare::types::ServiceType;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const BANNER: &str = r"
    =============================================================
     _  _ ___ _____ ___ _  _   _   ___ ___
    | \| | __|_   _/ __| \| | /_\ | _ \ __|
    | .` | _|  | | \__ \ .` |/ _ \|   / _|
    |_|\_|___| |_| |___/_|\_/_/ \_\_|_\___|

                Multi-Service Deception Honeypot
    =============================================================
";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    println!("{BANNER}");

    let errors = args.validate();
    if !errors.is_empty() {
        eprintln!("Argument errors:");
        for error in &errors {
            eprintln!("  - {error}");
        }
        eprintln!("\nUse --help for usage information.");
        std::process::exit(1);
    }

    let config = args.resolve();

    println!("Configuration:");
    for (service, port) in config.enabled() {
        println!("  - {service} port: {port}");
    }
    println!();

    let signatures = match Signatures::new() {
        Ok(signatures) => Arc::new(signatures),
        Err(e) => {
            error!("failed to compile signature catalog: {e:#}");
            std::process::exit(1);
        }
    };

    let sink = CaptureSink::start();
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let mut services: Vec<(ServiceType, JoinHandle<()>)> = Vec::new();

    if let Some(port) = config.ssh_port {
        let sink = Arc::clone(&sink);
        let shutdown = shutdown_tx.subscribe();
        services.push((
            ServiceType::Ssh,
            tokio::spawn(async move {
                if let Err(e) = honeypot::ssh::run(port, sink, shutdown).await {
                    error!("SSH honeypot failed: {e:#}");
                }
            }),
        ));
        info!("SSH honeypot started on port {port}");
    }

    if let Some(port) = config.http_port {
        let sink = Arc::clone(&sink);
        let signatures = Arc::clone(&signatures);
        let shutdown = shutdown_tx.subscribe();
        services.push((
            ServiceType::Http,
            tokio::spawn(async move {
                if let Err(e) = honeypot::http::run(port, sink, signatures, shutdown).await {
                    error!("HTTP honeypot failed: {e:#}");
                }
            }),
        ));
        info!("HTTP honeypot started on port {port} (fake service: WordPress)");
    }

    if let Some(port) = config.mysql_port {
        let sink = Arc::clone(&sink);
        let signatures = Arc::clone(&signatures);
        let shutdown = shutdown_tx.subscribe();
        services.push((
            ServiceType::Mysql,
            tokio::spawn(async move {
                if let Err(e) = honeypot::mysql::run(port, sink, signatures, shutdown).await {
                    error!("MySQL honeypot failed: {e:#}");
                }
            }),
        ));
        info!("MySQL honeypot started on port {port}");
    }

    if let Some(port) = config.rdp_port {
        let sink = Arc::clone(&sink);
        let signatures = Arc::clone(&signatures);
        let shutdown = shutdown_tx.subscribe();
        services.push((
            ServiceType::Rdp,
            tokio::spawn(async move {
                if let Err(e) = honeypot::rdp::run(port, sink, signatures, shutdown).await {
                    error!("RDP honeypot failed: {e:#}");
                }
            }),
        ));
        info!("RDP honeypot started on port {port}");
    }

    println!("[+] Honeypot system running. Press Ctrl+C to stop.");
    println!("[*] Check the logs/ directory for captured activity.");

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping honeypot..."),
        Err(e) => error!("failed to listen for shutdown signal: {e}"),
    }

    let _ = shutdown_tx.send(());

    for (service, handle) in services {
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{service} honeypot task failed during shutdown: {e}"),
            Err(_) => warn!("{service} honeypot shutdown timed out"),
        }
    }

    info!("Honeypot system shutdown complete");
}
