/// OpenShift Cluster Manager API client
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use super::models::*;
use super::{ClusterRecord, ClusterService, ServiceError};

const CLUSTERS_PATH: &str = "api/clusters_mgmt/v1/clusters";
const TOKEN_CLIENT_ID: &str = "cloud-services";
/// Access tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Main OCM API client
#[derive(Clone)]
pub struct OcmClient {
    client: Client,
    /// Used only to probe cluster API endpoints, which serve self-signed certificates
    probe_client: Client,
    base_url: Url,
    token_url: String,
    offline_token: String,
    access_token: Arc<Mutex<Option<AccessToken>>>,
}

impl OcmClient {
    /// Create a new client from an offline token
    pub fn new(base_url: &str, token_url: &str, offline_token: String) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("Invalid OCM URL: {}", base_url))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let probe_client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create probe HTTP client")?;

        Ok(Self {
            client,
            probe_client,
            base_url,
            token_url: token_url.to_string(),
            offline_token,
            access_token: Arc::new(Mutex::new(None)),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::Other(format!("invalid endpoint {}: {}", path, e)))
    }

    fn cluster_endpoint(&self, cluster_id: &str, suffix: &str) -> Result<Url, ServiceError> {
        self.endpoint(&format!("{}/{}{}", CLUSTERS_PATH, cluster_id, suffix))
    }

    /// Exchange the offline token for a short-lived access token, cached until near expiry
    async fn bearer(&self) -> Result<String, ServiceError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("POST {}", self.token_url);
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", TOKEN_CLIENT_ID),
                ("refresh_token", self.offline_token.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let token: TokenResponse = handle_response(response).await?;
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in.unwrap_or(300));
        let value = token.access_token.clone();
        *cached = Some(AccessToken {
            value: token.access_token,
            expires_at,
        });
        Ok(value)
    }

    /// Make a GET request to the API
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ServiceError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(response).await
    }

    /// Make a POST request to the API
    async fn post<B: Serialize, T: DeserializeOwned>(&self, url: Url, body: &B) -> Result<T, ServiceError> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .bearer_auth(self.bearer().await?)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(response).await
    }

    /// Make a DELETE request to the API
    async fn delete(&self, url: Url) -> Result<(), ServiceError> {
        debug!("DELETE {}", url);
        let response = self
            .client
            .delete(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        }
    }
}

#[async_trait]
impl ClusterService for OcmClient {
    async fn submit_create(&self, payload: &ClusterPayload) -> Result<String, ServiceError> {
        let cluster: ClusterObject = self.post(self.endpoint(CLUSTERS_PATH)?, payload).await?;
        info!(cluster_id = %cluster.id, name = %cluster.name, "cluster creation accepted");
        Ok(cluster.id)
    }

    async fn get_status(&self, cluster_id: &str) -> Result<ClusterStatus, ServiceError> {
        self.get(self.cluster_endpoint(cluster_id, "/status")?).await
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<ClusterRecord, ServiceError> {
        let cluster: ClusterObject = self.get(self.cluster_endpoint(cluster_id, "")?).await?;
        Ok(cluster.into())
    }

    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterRecord>, ServiceError> {
        let mut url = self.endpoint(CLUSTERS_PATH)?;
        url.query_pairs_mut()
            .append_pair("search", &format!("name = '{}'", name))
            .append_pair("size", "1");
        let list: ClusterList = self.get(url).await?;
        Ok(list.items.into_iter().next().map(ClusterRecord::from))
    }

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ServiceError> {
        let mut url = self.cluster_endpoint(cluster_id, "")?;
        url.query_pairs_mut().append_pair("deprovision", "true");
        self.delete(url).await?;
        info!(cluster_id = %cluster_id, "cluster deletion requested");
        Ok(())
    }

    async fn probe_api(&self, api_url: &str) -> Result<bool, ServiceError> {
        let url = format!("{}/version", api_url.trim_end_matches('/'));
        debug!("GET {}", url);
        match self.probe_client.get(&url).send().await {
            // Any authenticated-endpoint answer means the API server is up
            Ok(response) => Ok(response.status().is_success()
                || response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN),
            Err(e) => {
                debug!(url = %url, error = %e, "cluster API not reachable");
                Ok(false)
            }
        }
    }
}

/// Handle API response, checking for errors
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
    let status = response.status();

    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Other(format!("failed to parse API response: {}", e)))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    ServiceError::Transient(format!("request failed: {}", err))
}

/// Map a non-success status onto the service error taxonomy
fn status_error(status: StatusCode, body: &str) -> ServiceError {
    let message = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            code: Some(code),
            reason: Some(reason),
        }) => format!("{} - {}", code, reason),
        Ok(ErrorResponse {
            reason: Some(reason),
            ..
        }) => reason,
        _ if body.is_empty() => status.to_string(),
        _ => body.to_string(),
    };

    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::PermissionDenied(message),
        StatusCode::CONFLICT => ServiceError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => ServiceError::Transient(message),
        s if s.is_server_error() => ServiceError::Transient(message),
        s if s.is_client_error() => ServiceError::Rejected {
            status: s.as_u16(),
            message,
        },
        _ => ServiceError::Other(message),
    }
}
