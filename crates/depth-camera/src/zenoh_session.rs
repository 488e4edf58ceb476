use std::sync::Arc;

const DEFAULT_ENDPOINT: &str = "tcp/127.0.0.1:7447";

/// Pick the router endpoint.
///
/// Resolution order:
/// 1. `ZENOH_ENDPOINT` env var
/// 2. `BUBBALOOP_ZENOH_ENDPOINT` env var
/// 3. `endpoint` argument (from `-e`)
/// 4. `tcp/127.0.0.1:7447`
pub fn resolve_endpoint(endpoint: Option<&str>) -> String {
    std::env::var("ZENOH_ENDPOINT")
        .or_else(|_| std::env::var("BUBBALOOP_ZENOH_ENDPOINT"))
        .ok()
        .or_else(|| endpoint.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
}

/// Open a Zenoh session in client mode connected to `endpoint`.
pub async fn open_zenoh_session(endpoint: &str) -> anyhow::Result<Arc<zenoh::Session>> {
    log::info!("Connecting to Zenoh at: {}", endpoint);

    let mut config = zenoh::Config::default();
    // Client mode: everything routes through zenohd
    config
        .insert_json5("mode", r#""client""#)
        .map_err(|e| anyhow::anyhow!("Failed to set Zenoh mode: {}", e))?;
    config
        .insert_json5("connect/endpoints", &format!(r#"["{}"]"#, endpoint))
        .map_err(|e| anyhow::anyhow!("Failed to set Zenoh endpoint: {}", e))?;
    config
        .insert_json5("scouting/multicast/enabled", "false")
        .map_err(|e| anyhow::anyhow!("Failed to disable multicast: {}", e))?;
    config
        .insert_json5("scouting/gossip/enabled", "false")
        .map_err(|e| anyhow::anyhow!("Failed to disable gossip: {}", e))?;

    let session = zenoh::open(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;

    log::info!("Connected to Zenoh");
    Ok(Arc::new(session))
}
