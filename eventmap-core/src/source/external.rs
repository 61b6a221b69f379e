//! Sources served by external provider binaries.
//!
//! Any executable named `eventmap-provider-<name>` on PATH that speaks the
//! [`protocol`](super::protocol) can be registered as source type `<name>`.
//! Providers manage their own upstream credentials.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::protocol::{Command, ListEvents, ProviderCommand, Request, Response};
use super::{FetchParams, SourceAdapter, SourceDescriptor, SourceFetch};
use crate::error::{EventMapError, EventMapResult};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ExternalAdapter {
    descriptor: SourceDescriptor,
    binary_path: PathBuf,
}

impl ExternalAdapter {
    pub fn binary_name(name: &str) -> String {
        format!("eventmap-provider-{}", name)
    }

    /// Locate `eventmap-provider-<name>` on PATH.
    pub fn discover(name: &str) -> EventMapResult<Self> {
        let binary_name = Self::binary_name(name);
        let binary_path = which::which(&binary_name)
            .map_err(|_| EventMapError::ProviderNotInstalled(binary_name.clone()))?;
        Ok(Self::with_binary(name, binary_path))
    }

    pub fn with_binary(name: &str, binary_path: PathBuf) -> Self {
        ExternalAdapter {
            descriptor: SourceDescriptor::new(name, &Self::binary_name(name), None),
            binary_path,
        }
    }

    /// Call a typed provider command and return the result.
    pub async fn call<C: ProviderCommand>(&self, cmd: C) -> EventMapResult<C::Response> {
        timeout(PROVIDER_TIMEOUT, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| EventMapError::ProviderTimeout(PROVIDER_TIMEOUT.as_secs()))?
    }

    /// Sends a command with params and deserializes the response.
    async fn call_raw<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> EventMapResult<R> {
        let request = Request {
            command,
            params: serde_json::to_value(params)?,
        };
        let request_json = serde_json::to_string(&request)?;

        let mut child = TokioCommand::new(&self.binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EventMapError::Source(format!(
                    "Failed to spawn {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EventMapError::Source("Provider stdin unavailable".into()))?;
        stdin
            .write_all(format!("{request_json}\n").as_bytes())
            .await?;
        drop(stdin);

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(EventMapError::Source(format!(
                "Provider exited with status: {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(EventMapError::Source("Provider returned no response".into()));
        }

        let response: Response<R> = serde_json::from_str(&response_str).map_err(|e| {
            EventMapError::Source(format!("Failed to parse provider response: {}", e))
        })?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error } => Err(EventMapError::Source(error)),
        }
    }
}

#[async_trait]
impl SourceAdapter for ExternalAdapter {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, id: &str, params: &FetchParams) -> EventMapResult<SourceFetch> {
        let mut fetch = self
            .call(ListEvents {
                source: id.to_string(),
                time_min: params.time_min,
                time_max: params.time_max,
            })
            .await?;
        fetch.retain_window(params);
        Ok(fetch)
    }
}
