//! Azure Resource Manager REST client scoped to one APIM service.
//!
//! Every path handed to [`ArmClient`] is relative to
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.ApiManagement/service/{name}`.
//! Requests are sent once; failures are returned to the caller unchanged.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::azure::credential::TokenCredential;
use crate::azure::error::{ApimError, ApimResult};
use crate::config::AzureSettings;

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// One page of an ARM list response.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

/// ARM error body: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Body of an `Azure-AsyncOperation` status resource.
#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

/// HTTP client for one APIM service.
pub struct ArmClient {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    service_url: Url,
    api_version: String,
    poll_interval: Duration,
}

impl ArmClient {
    /// Creates a client for the service described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the management endpoint is not a usable base URL.
    pub fn new(
        http: reqwest::Client,
        credential: Arc<dyn TokenCredential>,
        settings: &AzureSettings,
    ) -> ApimResult<Self> {
        let mut service_url = Url::parse(&settings.management_endpoint).map_err(|e| {
            ApimError::invalid_argument("management_endpoint", format!("not a valid URL: {e}"))
        })?;

        service_url
            .path_segments_mut()
            .map_err(|()| {
                ApimError::invalid_argument("management_endpoint", "URL cannot be a base")
            })?
            .pop_if_empty()
            .extend([
                "subscriptions",
                settings.subscription_id.as_str(),
                "resourceGroups",
                settings.resource_group.as_str(),
                "providers",
                "Microsoft.ApiManagement",
                "service",
                settings.service_name.as_str(),
            ]);

        Ok(Self {
            http,
            credential,
            service_url,
            api_version: settings.api_version.clone(),
            poll_interval: settings.poll_interval,
        })
    }

    /// Builds the URL for a service-relative path.
    ///
    /// Segments are percent-encoded individually, so identifiers may not
    /// smuggle extra path components.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.service_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        url
    }

    async fn request(&self, method: Method, url: Url) -> ApimResult<RequestBuilder> {
        let token = self.credential.token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Sends a request and maps non-success statuses to [`ApimError::Api`].
    async fn send(&self, builder: RequestBuilder) -> ApimResult<Response> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_body(status, &body))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> ApimResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApimError::invalid_response(e.to_string()))
    }

    /// `GET` a single entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not match `T`.
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ApimResult<T> {
        let url = self.url(segments);
        tracing::debug!(%url, "ARM GET");
        let response = self.send(self.request(Method::GET, url).await?).await?;
        Self::read_json(response).await
    }

    /// `GET` a collection, following `nextLink` until every page is read.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn list<T: DeserializeOwned>(&self, segments: &[&str]) -> ApimResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(self.url(segments));
        let mut pages = 0_usize;

        while let Some(url) = next.take() {
            tracing::debug!(%url, "ARM GET (list)");
            let response = self.send(self.request(Method::GET, url).await?).await?;
            let page: Page<T> = Self::read_json(response).await?;
            items.extend(page.value);
            pages += 1;

            next = page
                .next_link
                .map(|link| {
                    Url::parse(&link).map_err(|e| {
                        ApimError::invalid_response(format!("malformed nextLink: {e}"))
                    })
                })
                .transpose()?;
        }

        tracing::debug!(pages, count = items.len(), "ARM list drained");
        Ok(items)
    }

    /// `PUT` an entity and wait for any long-running operation to finish.
    ///
    /// When Azure accepts the request asynchronously, the operation is polled
    /// until it reaches a terminal state and the entity is then read back.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the operation does not
    /// succeed, or the final body does not match `T`.
    pub async fn put<B, T>(&self, segments: &[&str], body: &B) -> ApimResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(segments);
        tracing::debug!(%url, "ARM PUT");
        let builder = self.request(Method::PUT, url).await?.json(body);
        let response = self.send(builder).await?;

        let status = response.status();
        if matches!(status, StatusCode::CREATED | StatusCode::ACCEPTED) {
            if let Some(poll) = PollTarget::from_headers(response.headers()) {
                let wait = retry_after(response.headers()).unwrap_or(self.poll_interval);
                self.wait_for(poll, wait).await?;
                return self.get(segments).await;
            }
        }

        if status == StatusCode::NO_CONTENT {
            return self.get(segments).await;
        }

        Self::read_json(response).await
    }

    /// `POST` an action such as `listSecrets` and decode its result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not match `T`.
    pub async fn post<T: DeserializeOwned>(&self, segments: &[&str]) -> ApimResult<T> {
        let url = self.url(segments);
        tracing::debug!(%url, "ARM POST");
        let builder = self.request(Method::POST, url).await?.json(&json!({}));
        let response = self.send(builder).await?;
        Self::read_json(response).await
    }

    async fn wait_for(&self, target: PollTarget, mut wait: Duration) -> ApimResult<()> {
        loop {
            tokio::time::sleep(wait).await;

            let url = match &target {
                PollTarget::AsyncOperation(url) | PollTarget::Location(url) => url.clone(),
            };
            let response = self.send(self.request(Method::GET, url).await?).await?;
            wait = retry_after(response.headers()).unwrap_or(self.poll_interval);

            match &target {
                PollTarget::AsyncOperation(_) => {
                    let OperationStatus { status, error } = Self::read_json(response).await?;
                    tracing::debug!(%status, "Polled async operation");
                    match status.as_str() {
                        "Succeeded" => return Ok(()),
                        "Failed" | "Canceled" | "Cancelled" => {
                            return Err(ApimError::OperationFailed {
                                status: status.clone(),
                                message: error.map_or_else(
                                    || "no error details".to_string(),
                                    |e| format!("{}: {}", e.code, e.message),
                                ),
                            });
                        }
                        _ => {}
                    }
                }
                PollTarget::Location(_) => {
                    if response.status() != StatusCode::ACCEPTED {
                        return Ok(());
                    }
                    tracing::debug!("Polled location, still accepted");
                }
            }
        }
    }
}

/// Where to poll a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollTarget {
    AsyncOperation(Url),
    Location(Url),
}

impl PollTarget {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header_url = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| Url::parse(v).ok())
        };

        header_url(AZURE_ASYNC_OPERATION)
            .map(Self::AsyncOperation)
            .or_else(|| header_url(LOCATION.as_str()).map(Self::Location))
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn error_from_body(status: StatusCode, body: &str) -> ApimError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => ApimError::Api {
            status: status.as_u16(),
            code: parsed.error.code,
            message: parsed.error.message,
        },
        Err(_) if body.trim().is_empty() => ApimError::from_status(status, "no response body"),
        Err(_) => ApimError::from_status(status, body.trim()),
    }
}
