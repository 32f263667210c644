use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use pest_risk_backend::config::StoreConfig;
use pest_risk_backend::error::StoreError;
use pest_risk_backend::store::{DocumentStore, Query};

const USER_AGENT: &str = concat!("pest-risk-backend/", env!("CARGO_PKG_VERSION"));

/// Realtime Database REST client
///
/// Every node is addressed as `{database_url}/{path}.json?auth={token}`.
/// Reads of a missing node return the JSON literal `null`.
#[derive(Debug, Clone)]
pub struct FirebaseStore {
    http_client: Client,
    base_url: Url,
    auth_token: String,
}

impl FirebaseStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.database_url).map_err(|e| {
            StoreError::Transport(format!("invalid database URL '{}': {}", config.database_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "database URL '{}' cannot carry a path",
                config.database_url
            )));
        }

        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            auth_token: config.auth_token.clone(),
        })
    }

    /// REST URL for a node, with auth and query parameters
    pub fn node_url(&self, path: &str, query: Query) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        {
            let mut url_path = url.path_segments_mut().map_err(|_| {
                StoreError::Transport("database URL cannot carry a path".to_string())
            })?;
            url_path.pop_if_empty();
            match segments.split_last() {
                Some((last, parents)) => {
                    url_path.extend(parents);
                    url_path.push(&format!("{}.json", last));
                }
                None => {
                    url_path.push(".json");
                }
            }
        }

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("auth", &self.auth_token);
            match query {
                Query::Full => {}
                Query::Shallow => {
                    pairs.append_pair("shallow", "true");
                }
                Query::LastByKey(n) => {
                    pairs.append_pair("orderBy", "\"$key\"");
                    pairs.append_pair("limitToLast", &n.to_string());
                }
            }
        }

        Ok(url)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

impl DocumentStore for FirebaseStore {
    async fn get(&self, path: &str, query: Query) -> Result<Option<Value>, StoreError> {
        let url = self.node_url(path, query)?;
        debug!(path = %path, query = ?query, "GET");

        let response = self.http_client.get(url).send().await.map_err(transport)?;
        let response = check_status(response).await?;

        let value: Value = response.json().await.map_err(transport)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let url = self.node_url(path, Query::Full)?;
        debug!(path = %path, "PUT");

        let response = self
            .http_client
            .put(url)
            .json(value)
            .send()
            .await
            .map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let url = self.node_url(path, Query::Full)?;
        debug!(path = %path, "DELETE");

        let response = self.http_client.delete(url).send().await.map_err(transport)?;
        // Deleting a node that does not exist is not an error
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }
}
