//! Redis commands over HTTP (Upstash-compatible REST wire format).
//!
//! A command is POSTed as a JSON array of strings (`["SET","k","v","EX","60"]`)
//! and answered with `{"result": ...}` or `{"error": "..."}`. Several commands
//! go to `<url>/pipeline` as an array of arrays and come back as an array of
//! replies.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::backend::CacheBackend;
use crate::error::{EventMapError, EventMapResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

impl Reply {
    fn into_result(self) -> EventMapResult<Value> {
        match self.error {
            Some(error) => Err(EventMapError::Cache(error)),
            None => Ok(self.result),
        }
    }
}

pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestBackend {
    pub fn new(base_url: &str, token: &str) -> EventMapResult<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(RestBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn command(&self, args: &[String]) -> EventMapResult<Value> {
        let reply: Reply = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        reply.into_result()
    }

    async fn pipeline(&self, commands: &[Vec<String>]) -> EventMapResult<Vec<Value>> {
        let replies: Vec<Reply> = self
            .client
            .post(format!("{}/pipeline", self.base_url))
            .bearer_auth(&self.token)
            .json(commands)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        replies.into_iter().map(Reply::into_result).collect()
    }
}

fn set_command(key: &str, value: &str, ttl_secs: Option<u64>) -> Vec<String> {
    let mut args = vec!["SET".to_string(), key.to_string(), value.to_string()];
    if let Some(ttl) = ttl_secs {
        args.push("EX".to_string());
        args.push(ttl.to_string());
    }
    args
}

fn as_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

#[async_trait]
impl CacheBackend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn get(&self, key: &str) -> EventMapResult<Option<String>> {
        let result = self.command(&["GET".to_string(), key.to_string()]).await?;
        Ok(as_string(result))
    }

    async fn mget(&self, keys: &[String]) -> EventMapResult<Vec<Option<String>>> {
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push("MGET".to_string());
        args.extend(keys.iter().cloned());

        match self.command(&args).await? {
            Value::Array(values) if values.len() == keys.len() => {
                Ok(values.into_iter().map(as_string).collect())
            }
            other => Err(EventMapError::Cache(format!(
                "MGET returned unexpected reply for {} keys: {}",
                keys.len(),
                other
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> EventMapResult<()> {
        self.command(&set_command(key, value, ttl_secs)).await?;
        Ok(())
    }

    async fn mset(
        &self,
        entries: &[(String, String)],
        ttl_secs: Option<u64>,
    ) -> EventMapResult<()> {
        // MSET cannot carry a TTL, so expiring entries go through a pipeline of SETs
        match ttl_secs {
            None => {
                let mut args = vec!["MSET".to_string()];
                for (key, value) in entries {
                    args.push(key.clone());
                    args.push(value.clone());
                }
                self.command(&args).await?;
            }
            Some(_) => {
                let commands: Vec<Vec<String>> = entries
                    .iter()
                    .map(|(key, value)| set_command(key, value, ttl_secs))
                    .collect();
                self.pipeline(&commands).await?;
            }
        }
        Ok(())
    }
}
