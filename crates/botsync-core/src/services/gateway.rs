//! Trigger gateway
//!
//! The backend job executor as seen by the tracking core: start a job for a
//! target, ask for a target's status, and reload a whole collection. The
//! [`HttpGateway`] talks to the console's REST API:
//!
//! | Operation      | Request                                                   |
//! |----------------|-----------------------------------------------------------|
//! | `trigger_now`  | `POST {base}/chatBots/{bot}/{resource}/{id}/sync_now/`    |
//! | `query_status` | `GET  {base}/chatBots/{bot}/{resource}/{id}/status/`      |
//! | `reload_all`   | `GET  {base}/chatBots/{bot}/{resource}/`                  |

use async_trait::async_trait;
use reqwest::{header, Client, Response};

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::{StatusResponse, SyncEntity, SyncEntityRecord, SyncKind, TriggerResponse};

/// Maximum number of characters of an error body kept in [`Error::Api`]
const MAX_ERROR_BODY_CHARS: usize = 2000;

/// Backend operations consumed by the tracking core
#[async_trait]
pub trait TriggerGateway: Send + Sync {
    /// Start a new job for the target. Always yields a new job id, which
    /// supersedes whatever job was tracked for the target before.
    async fn trigger_now(&self, kind: SyncKind, id: &str) -> Result<TriggerResponse>;

    /// Read the latest status of the target and its current job
    async fn query_status(&self, kind: SyncKind, id: &str) -> Result<StatusResponse>;

    /// Fetch every configured target of `kind`
    async fn reload_all(&self, kind: SyncKind) -> Result<Vec<SyncEntity>>;
}

/// [`TriggerGateway`] over the backend's REST API
pub struct HttpGateway {
    config: ApiConfig,
    client: Client,
}

impl HttpGateway {
    /// Create a gateway from config
    pub fn new(config: ApiConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        if let Some(ref token) = config.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| Error::config(format!("Invalid API token: {}", e)))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn collection_url(&self, kind: SyncKind) -> String {
        format!(
            "{}/chatBots/{}/{}/",
            self.config.base(),
            self.config.chatbot_id,
            kind.resource()
        )
    }

    fn target_url(&self, kind: SyncKind, id: &str, action: &str) -> String {
        format!("{}{}/{}/", self.collection_url(kind), id, action)
    }

    /// Turn a non-2xx response into [`Error::Api`]
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            status: status.as_u16(),
            body: truncate_body(&body),
        })
    }
}

#[async_trait]
impl TriggerGateway for HttpGateway {
    async fn trigger_now(&self, kind: SyncKind, id: &str) -> Result<TriggerResponse> {
        let url = self.target_url(kind, id, "sync_now");
        log::debug!("POST {}", url);

        let response = self.client.post(&url).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<TriggerResponse>().await?)
    }

    async fn query_status(&self, kind: SyncKind, id: &str) -> Result<StatusResponse> {
        let url = self.target_url(kind, id, "status");
        log::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<StatusResponse>().await?)
    }

    async fn reload_all(&self, kind: SyncKind) -> Result<Vec<SyncEntity>> {
        let url = self.collection_url(kind);
        log::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let response = Self::check(response).await?;
        let records = response.json::<Vec<SyncEntityRecord>>().await?;

        Ok(records
            .into_iter()
            .map(|record| SyncEntity::from_record(kind, record))
            .collect())
    }
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
