use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quartzviz_contracts::jobs::{ResourceHandle, UploadIntent};
use serde_json::json;
use tracing::{info, warn};

use crate::client::{parse_json, truncate_text, ServiceClient};
use crate::clock::Clock;
use crate::error::EngineError;

/// Requested lifetime of uploaded resources.
const RESOURCE_EXPIRE_SECS: u64 = 7200;

/// Write succeeded but the service could not deliver its callback.
const STATUS_CALLBACK_FAILED: u16 = 203;

/// Two-phase upload: ask the service for a write target, then PUT the bytes there.
pub struct ResourceUploader {
    client: Arc<ServiceClient>,
    clock: Arc<dyn Clock>,
    propagation_delay: Duration,
}

impl ResourceUploader {
    pub fn new(client: Arc<ServiceClient>, clock: Arc<dyn Clock>, propagation_delay: Duration) -> Self {
        Self {
            client,
            clock,
            propagation_delay,
        }
    }

    pub fn upload(&self, path: &Path) -> Result<ResourceHandle, EngineError> {
        if !path.is_file() {
            return Err(EngineError::Upload(format!(
                "file does not exist: {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path).map_err(|err| {
            EngineError::Upload(format!("failed reading {}: {err}", path.display()))
        })?;

        info!(path = %path.display(), bytes = bytes.len(), "requesting upload target");
        let reply = self.client.post_json(
            "/resource/image",
            &json!({ "expireSec": RESOURCE_EXPIRE_SECS.to_string() }),
            self.client.timeouts().metadata,
            "upload intent",
        )?;
        if !reply.is_success() {
            return Err(EngineError::Upload(format!(
                "upload intent rejected ({}): {}",
                reply.status,
                truncate_text(&reply.text(), 512)
            )));
        }
        let intent: UploadIntent = parse_json(&reply, "upload intent")
            .map_err(|err| EngineError::Upload(err.to_string()))?;
        let put_url = intent
            .put_url()
            .ok_or_else(|| EngineError::Upload("upload intent has no putUrl".to_string()))?;
        let handle = intent
            .resource_handle()
            .ok_or_else(|| EngineError::Upload("upload intent has no resourceId".to_string()))?;

        let reply = self
            .client
            .put_bytes(put_url, intent.write_headers(), bytes, "upload write")?;
        match reply.status {
            200 => {}
            STATUS_CALLBACK_FAILED => warn!(
                resource_id = %handle,
                "upload stored but callback delivery failed; continuing"
            ),
            status => {
                return Err(EngineError::Upload(format!(
                    "upload write failed ({status}): {}",
                    truncate_text(&reply.text(), 512)
                )))
            }
        }

        info!(
            resource_id = %handle,
            delay_s = self.propagation_delay.as_secs(),
            "upload complete; waiting for propagation"
        );
        self.clock.sleep(self.propagation_delay);
        Ok(handle)
    }
}
