//! Depth camera node binary

use depth_camera::runner::{run_node, setup_logging, NodeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args: NodeArgs = argh::from_env();
    run_node(args).await
}
