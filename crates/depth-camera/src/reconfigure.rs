//! Live reconfiguration requests and their replies (JSON on the wire).

use crate::controller::{AppliedStream, ReconfigureError, StreamConfigController};
use crate::mode::CaptureMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Requested mode identifiers (see [`crate::mode::ModeId`] for values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigureRequest {
    pub image_mode: i32,
    pub depth_mode: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamReply {
    /// Identifier of the mode actually applied
    pub mode_id: Option<i32>,
    pub mode: Option<CaptureMode>,
    pub requested: Option<CaptureMode>,
    pub used_default: bool,
    pub error: Option<String>,
}

impl From<&Result<AppliedStream, ReconfigureError>> for StreamReply {
    fn from(result: &Result<AppliedStream, ReconfigureError>) -> Self {
        match result {
            Ok(applied) => Self {
                mode_id: Some(applied.config.mode_id.as_i32()),
                mode: Some(applied.config.mode),
                requested: Some(applied.requested),
                used_default: applied.used_default,
                error: None,
            },
            Err(e) => Self {
                mode_id: None,
                mode: None,
                requested: None,
                used_default: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconfigureReply {
    pub success: bool,
    pub message: String,
    pub image: Option<StreamReply>,
    pub depth: Option<StreamReply>,
}

impl ReconfigureReply {
    fn rejected(message: String) -> Self {
        Self {
            success: false,
            message,
            image: None,
            depth: None,
        }
    }
}

/// Apply a request to the controller and describe the outcome.
pub fn handle_request(
    controller: &StreamConfigController,
    request: ReconfigureRequest,
) -> ReconfigureReply {
    log::info!(
        "Reconfigure request: image_mode={}, depth_mode={}",
        request.image_mode,
        request.depth_mode
    );
    match controller.apply_config(request.image_mode, request.depth_mode) {
        Ok(applied) => {
            let success = applied.is_ok();
            let message = if success {
                "applied".to_string()
            } else {
                "one or more streams kept their previous mode".to_string()
            };
            ReconfigureReply {
                success,
                message,
                image: Some(StreamReply::from(&applied.color)),
                depth: Some(StreamReply::from(&applied.depth)),
            }
        }
        Err(e) => {
            log::warn!("Rejected reconfigure request: {}", e);
            ReconfigureReply::rejected(e.to_string())
        }
    }
}

/// Decode a JSON payload and apply it.
pub fn handle_payload(controller: &StreamConfigController, payload: &[u8]) -> ReconfigureReply {
    match serde_json::from_slice::<ReconfigureRequest>(payload) {
        Ok(request) => handle_request(controller, request),
        Err(e) => {
            log::warn!("Failed to decode reconfigure request: {}", e);
            ReconfigureReply::rejected(format!("Failed to decode request: {}", e))
        }
    }
}

/// Serve reconfigure requests on `key` until shutdown.
///
/// Requests are handled one at a time on a blocking thread; each query gets
/// a JSON [`ReconfigureReply`].
pub async fn spawn_reconfigure_queryable(
    session: Arc<zenoh::Session>,
    key: String,
    controller: Arc<StreamConfigController>,
    mut shutdown_rx: watch::Receiver<()>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let queryable = session
        .declare_queryable(key.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create reconfigure queryable: {}", e))?;
    log::info!("Reconfigure queryable: {}", key);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                query = queryable.recv_async() => {
                    let query = match query {
                        Ok(q) => q,
                        Err(e) => {
                            log::warn!("Query receive error: {}", e);
                            break;
                        }
                    };
                    let payload = query
                        .payload()
                        .map(|p| p.to_bytes().to_vec())
                        .unwrap_or_default();
                    let controller = controller.clone();
                    let reply = match tokio::task::spawn_blocking(move || {
                        handle_payload(&controller, &payload)
                    })
                    .await
                    {
                        Ok(reply) => reply,
                        Err(e) => ReconfigureReply::rejected(format!("Reconfigure task failed: {}", e)),
                    };
                    let bytes = match serde_json::to_vec(&reply) {
                        Ok(b) => b,
                        Err(e) => {
                            log::warn!("Failed to encode reconfigure reply: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = query.reply(query.key_expr().clone(), bytes).await {
                        log::warn!("Failed to send reply: {}", e);
                    }
                }
            }
        }
        log::debug!("Reconfigure queryable stopped");
    });

    Ok(handle)
}
