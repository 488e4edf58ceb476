use std::sync::Arc;

/// Shared runtime handles passed to the node.
pub struct NodeContext {
    /// Shared Zenoh session (Arc-wrapped, safe to clone)
    pub session: Arc<zenoh::Session>,
    /// Deployment scope (from BUBBALOOP_SCOPE env, default: "local")
    pub scope: String,
    /// Machine identifier (from BUBBALOOP_MACHINE_ID env, default: hostname)
    pub machine_id: String,
    /// Shutdown signal receiver; select! on this in the main loop
    pub shutdown_rx: tokio::sync::watch::Receiver<()>,
}

impl NodeContext {
    /// Build a fully-qualified scoped topic: `bubbaloop/{scope}/{machine_id}/{suffix}`
    pub fn topic(&self, suffix: &str) -> String {
        scoped_topic(&self.scope, &self.machine_id, suffix)
    }
}

pub fn scoped_topic(scope: &str, machine_id: &str, suffix: &str) -> String {
    format!("bubbaloop/{}/{}/{}", scope, machine_id, suffix)
}

/// Resolve scope and machine id from the environment.
pub fn resolve_identity() -> (String, String) {
    let scope = std::env::var("BUBBALOOP_SCOPE").unwrap_or_else(|_| "local".to_string());
    let machine_id = std::env::var("BUBBALOOP_MACHINE_ID")
        .unwrap_or_else(|_| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        })
        .replace('-', "_");
    (scope, machine_id)
}
