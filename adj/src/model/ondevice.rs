//! On-device foundation-model bridge
//!
//! Talks to the platform model through a companion CLI: one JSON object on
//! stdin, one JSON object (`{"content":"…"}`) on stdout. Availability
//! needs the host platform floor plus the bridge binary on disk (or its
//! source, from which it can be built). Token counts are estimated as
//! ceil(chars / 4) since the bridge reports none.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{ModelError, ModelReply, Provider, SmallModel, estimate_tokens};
use crate::config::ModelConfig;

/// The bridge model's hard output cap
const BRIDGE_MAX_TOKENS: u32 = 4_096;

pub struct OnDeviceClient {
    bridge_path: Option<PathBuf>,
    bridge_source: Option<PathBuf>,
    timeout: Duration,
}

impl OnDeviceClient {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            bridge_path: config.ondevice.bridge_path.clone(),
            bridge_source: config.ondevice.bridge_source.clone(),
            timeout: Duration::from_secs(config.local_timeout_secs),
        }
    }

    fn platform_supported() -> bool {
        // The platform foundation-model API only exists on macOS
        cfg!(target_os = "macos")
    }
}

#[async_trait]
impl SmallModel for OnDeviceClient {
    fn provider(&self) -> Provider {
        Provider::OnDevice
    }

    async fn is_available(&self) -> bool {
        if !Self::platform_supported() {
            return false;
        }
        let binary = self.bridge_path.as_ref().map(|p| p.exists()).unwrap_or(false);
        let buildable = self.bridge_source.as_ref().map(|p| p.exists()).unwrap_or(false);
        debug!(binary, buildable, "On-device bridge probe");
        binary || buildable
    }

    async fn call(&self, prompt: &str, max_tokens: u32, instructions: Option<&str>) -> Result<ModelReply, ModelError> {
        let bridge = self
            .bridge_path
            .as_ref()
            .filter(|p| p.exists())
            .ok_or_else(|| ModelError::Unavailable("bridge binary missing".to_string()))?;

        let request = serde_json::json!({
            "prompt": prompt,
            "max_tokens": max_tokens.min(BRIDGE_MAX_TOKENS),
            "instructions": instructions,
        });

        let mut child = Command::new(bridge)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ModelError::Bridge(format!("spawn failed: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.to_string().as_bytes())
                .await
                .map_err(|e| ModelError::Bridge(format!("stdin write failed: {e}")))?;
            // Close stdin so the bridge sees EOF
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))?
            .map_err(|e| ModelError::Bridge(format!("wait failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ModelError::Bridge(format!(
                "exit {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply: BridgeReply = serde_json::from_str(stdout.trim())
            .map_err(|e| ModelError::InvalidResponse(format!("bridge output: {e}")))?;

        Ok(ModelReply {
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(&reply.content),
            content: reply.content,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    content: String,
}
