//! HTTP client for the coordination server's REST API.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use tacsync_domain::{Snapshot, Task, TaskStatus};

use crate::error::{RestError, Result};

pub const GLOBAL_STATE_PATH: &str = "/state/api/global-state";
pub const TASKS_PATH: &str = "/api/tasks/mog";

/// One-shot full-state fetch.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot>;
}

/// Task mutations and the task list.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn fetch_tasks(&self) -> Result<Vec<Task>>;

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<()>;

    async fn delete_task(&self, id: &str) -> Result<()>;
}

/// Holder of the bearer credential sent with every request.
pub trait Credentials: Send + Sync {
    fn set_token(&self, token: &str);
}

#[derive(Serialize)]
struct StatusBody {
    status: TaskStatus,
}

/// Bearer-authenticated REST client. Clones share the token.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl RestClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Url::parse(base_url)?;
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Replace the bearer token used by subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        let mut slot = self.token.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(token.into());
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> Result<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(RestError::MissingToken)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        debug!(%url, "GET");
        let response = self.client.get(&url).bearer_auth(self.token()?).send().await?;
        from_json(check(response).await?).await
    }
}

impl Credentials for RestClient {
    fn set_token(&self, token: &str) {
        RestClient::set_token(self, token);
    }
}

#[async_trait]
impl SnapshotSource for RestClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        self.get_json(GLOBAL_STATE_PATH).await
    }
}

#[async_trait]
impl TaskApi for RestClient {
    async fn fetch_tasks(&self) -> Result<Vec<Task>> {
        self.get_json(TASKS_PATH).await
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let url = self.endpoint(&format!("/api/tasks/{}/status", id));
        debug!(%url, %status, "PATCH");
        let response = self
            .client
            .patch(&url)
            .bearer_auth(self.token()?)
            .json(&StatusBody { status })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&format!("/api/tasks/{}", id));
        debug!(%url, "DELETE");
        let response = self.client.delete(&url).bearer_auth(self.token()?).send().await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        warn!(url = %response.url(), "Credential rejected");
        return Err(RestError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RestError::Status {
        status: status.as_u16(),
        body,
    })
}

// Response::json() drops the body on failure; keep the serde message instead.
async fn from_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| RestError::Json(e.to_string()))
}
