//! How the scheduler hands due watchers to a queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::Watcher;
use crate::queue::{QueueManager, SubmitResult};

/// Submits one watcher to a named queue.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, queue: &str, watcher: &Watcher) -> Result<SubmitResult>;
}

/// Submits straight into a queue manager owned by this process.
#[derive(Debug, Clone)]
pub struct LocalSubmitter {
    queues: Arc<QueueManager>,
}

impl LocalSubmitter {
    pub fn new(queues: Arc<QueueManager>) -> Self {
        Self { queues }
    }
}

#[async_trait]
impl JobSubmitter for LocalSubmitter {
    async fn submit(&self, queue: &str, watcher: &Watcher) -> Result<SubmitResult> {
        self.queues.submit(queue, watcher.clone())
    }
}

/// Submits over HTTP: `POST {base_url}/queues/{queue}/add` with the watcher
/// as JSON body.
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    client: reqwest::Client,
    base_url: String,
}

/// Body returned by the add route. An empty or unparseable body counts as enqueued.
#[derive(Debug, Deserialize)]
struct AddResponse {
    enqueued: bool,
}

impl HttpSubmitter {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl JobSubmitter for HttpSubmitter {
    async fn submit(&self, queue: &str, watcher: &Watcher) -> Result<SubmitResult> {
        let url = format!("{}/queues/{queue}/add", self.base_url);
        let response = self.client.post(&url).json(watcher).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Distribution(format!(
                "adding job to '{queue}' failed with status {status}"
            )));
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<AddResponse>(&body) {
            Ok(AddResponse { enqueued: false }) => Ok(SubmitResult::AlreadyQueued),
            _ => Ok(SubmitResult::Enqueued),
        }
    }
}
