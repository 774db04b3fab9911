//! Firmware update agent - main entry point
//!
//! Wires the transport session, update coordinator, status publisher and
//! liveness task together and owns the shutdown policy: configuration
//! errors are fatal at startup, a permanently failed link stops the agent,
//! and SIGINT/SIGTERM shut it down gracefully.

use clap::{Parser, Subcommand};
use otagent::config::DeviceConfig;
use otagent::coordinator::UpdateCoordinator;
use otagent::image::{staging_path_for, FileImageSink, HttpChunkSource, LengthVerifier};
use otagent::indicator::{run_indicator, LogIndicator};
use otagent::observability::init_default_logging;
use otagent::protocol::messages::{ControlMessage, DeviceDirective, JobNotification};
use otagent::status::StatusPublisher;
use otagent::transport::{mqtt::MqttSession, Transport};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::{
    signal,
    time::{sleep, Duration},
};
use tracing::{error, info};

/// MQTT firmware update agent
#[derive(Parser)]
#[command(name = "otagent")]
#[command(about = "Firmware update agent for MQTT-connected embedded devices")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the update agent
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!(
        "Starting firmware update agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    // An inconsistent credential/endpoint combination must never run
    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Agent shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<DeviceConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(DeviceConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = vec!["device.toml", "config/device.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(DeviceConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Provide one with -c/--config or create device.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_agent(config: DeviceConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(device_id = %config.device.id, "Agent starting");

    let credentials = config.credentials()?;
    let mut session = MqttSession::new(config.clone(), credentials)?;

    let (control_tx, control_rx) = mpsc::channel::<ControlMessage>(32);
    session.set_control_sender(control_tx);

    // Bounded retries inside; exhaustion surfaces here as an error
    session.connect().await?;
    session
        .subscribe(&config.topics.control, config.topics.qos)
        .await?;
    info!(topic = %config.topics.control, "Listening for control messages");

    let link = session.link_watch().expect("session just connected");
    let transport = Arc::new(session);

    let status = Arc::new(StatusPublisher::new(
        config.device.id.clone(),
        config.topics.status.clone(),
        config.topics.qos,
        transport.clone(),
    ));

    let staging_path = staging_path_for(&config.update.staging_dir, &config.device.id);
    let coordinator = UpdateCoordinator::new(
        &config,
        link,
        Arc::new(HttpChunkSource::new()),
        Arc::new(LengthVerifier),
        Box::new(FileImageSink::new(staging_path)),
        status,
    );

    let (job_tx, job_rx) = mpsc::channel::<JobNotification>(8);
    let (directive_tx, directive_rx) = mpsc::channel::<DeviceDirective>(8);

    let dispatcher = tokio::spawn(dispatch_control(control_rx, job_tx, directive_tx));
    let liveness = tokio::spawn(run_indicator(LogIndicator::new(), directive_rx));
    let coordinator_task = tokio::spawn(coordinator.run(job_rx));

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Agent running; updates arrive over MQTT");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
        _ = monitor_link_failure(transport.clone()) => {
            notify_fault("MQTT link permanently failed");
        }
    }

    coordinator_task.abort();
    dispatcher.abort();
    liveness.abort();

    Ok(())
}

/// Route control messages to their consumers
///
/// Job notifications feed the coordinator; on/off directives feed the
/// liveness task. The two never share state beyond this fan-out.
async fn dispatch_control(
    mut control: mpsc::Receiver<ControlMessage>,
    jobs: mpsc::Sender<JobNotification>,
    directives: mpsc::Sender<DeviceDirective>,
) {
    while let Some(message) = control.recv().await {
        match message {
            ControlMessage::Job(notification) => {
                if jobs.send(notification).await.is_err() {
                    break;
                }
            }
            ControlMessage::Directive(directive) => {
                let _ = directives.send(directive).await;
            }
            ControlMessage::Unrecognized => {}
        }
    }
}

/// Watch for terminal link failure
async fn monitor_link_failure<T: Transport>(transport: Arc<T>) {
    loop {
        if transport.is_failed() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
}

/// Fault notification hook; the shutdown policy lives here, not in the core
fn notify_fault(reason: &str) {
    error!("FAULT: {} - stopping agent for supervisor restart", reason);
}

fn handle_config_command(
    config: DeviceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
