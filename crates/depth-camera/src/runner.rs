//! Process entry point: CLI, config, Zenoh session and node lifecycle.

use crate::config::{DriverConfig, NodeConfig};
use crate::context::{resolve_identity, NodeContext};
use crate::device::{open_device, DeviceDriver, DeviceSelector};
use crate::health::spawn_status_heartbeat;
use crate::node::DepthCameraNode;
use crate::publisher::{topics, ZenohFramePublisher};
use crate::reconfigure::spawn_reconfigure_queryable;
use crate::synthetic::SyntheticDriver;
use crate::zenoh_session::{open_zenoh_session, resolve_endpoint};
use argh::FromArgs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Command-line arguments of the node binary.
#[derive(FromArgs, Debug)]
#[argh(description = "Depth/RGB camera node")]
pub struct NodeArgs {
    /// path to YAML configuration file
    #[argh(option, short = 'c', default = "PathBuf::from(\"config.yaml\")")]
    pub config: PathBuf,

    /// zenoh endpoint to connect to
    #[argh(option, short = 'e')]
    pub endpoint: Option<String>,

    /// device to open (overrides `device_id` in the config file)
    #[argh(option, short = 'd')]
    pub device_id: Option<String>,
}

/// Initialize logging with env_logger.
///
/// Respects RUST_LOG environment variable. Defaults to "info" level.
pub fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Shutdown channel fired by SIGINT/SIGTERM. The sender must outlive the node.
fn shutdown_channel() -> anyhow::Result<watch::Sender<()>> {
    let (tx, _rx) = watch::channel(());
    let signal_tx = tx.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown signal received");
        let _ = signal_tx.send(());
    })?;
    Ok(tx)
}

fn build_driver(config: &DriverConfig) -> Box<dyn DeviceDriver> {
    match config {
        DriverConfig::Synthetic { devices } => {
            log::info!("Using synthetic driver with {} device(s)", devices);
            Box::new(SyntheticDriver::new(*devices))
        }
    }
}

/// Run the node until Ctrl+C.
///
/// Device enumeration problems surface here as startup errors.
pub async fn run_node(args: NodeArgs) -> anyhow::Result<()> {
    let mut config = NodeConfig::from_file(&args.config)?;
    if let Some(device_id) = args.device_id {
        config.device_id = device_id;
    }
    log::info!(
        "Camera '{}': config loaded from {}",
        config.name,
        args.config.display()
    );

    let (scope, machine_id) = resolve_identity();
    log::info!("Scope: {}, Machine ID: {}", scope, machine_id);

    let shutdown_tx = shutdown_channel()?;

    let driver = build_driver(&config.driver);
    let selector: DeviceSelector = config.device_id.parse()?;
    let device = open_device(driver.as_ref(), &selector)?;

    let endpoint = resolve_endpoint(args.endpoint.as_deref());
    let session = open_zenoh_session(&endpoint).await?;

    let ctx = NodeContext {
        session: session.clone(),
        scope,
        machine_id,
        shutdown_rx: shutdown_tx.subscribe(),
    };

    let publisher = ZenohFramePublisher::new(
        &ctx,
        &config.name,
        &config.rgb_frame_id,
        &config.depth_frame_id,
    )
    .await?;

    let camera = config.name.clone();
    let node = DepthCameraNode::new(config, device, Arc::new(publisher))?;
    let startup = node.apply_startup_modes().await?;
    log::info!("Camera '{}' startup modes: {}", camera, startup.message);

    let _reconfigure = spawn_reconfigure_queryable(
        session.clone(),
        ctx.topic(&format!("{}/{}", camera, topics::CONFIG)),
        node.controller().clone(),
        shutdown_tx.subscribe(),
    )
    .await?;

    let _status = spawn_status_heartbeat(
        session.clone(),
        ctx.topic(&format!("{}/{}", camera, topics::STATUS)),
        camera.clone(),
        node.controller().clone(),
        shutdown_tx.subscribe(),
    )
    .await?;

    node.run(ctx.shutdown_rx.clone()).await?;

    log::info!("Camera '{}' shut down", camera);
    Ok(())
}
