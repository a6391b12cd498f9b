//! HttpProvider - ships events to a Loki push endpoint
//!
//! Every event becomes one log line. Events are grouped into one stream per
//! `(topic, type)` label pair merged with the configured external labels.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use contracts::duration::parse_duration;
use contracts::{ContractError, Event, LabelSet, Provider};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::{debug, instrument, warn};

const PUSH_PATH: &str = "loki/api/v1/push";
const READY_PATH: &str = "ready";
const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Configuration for HttpProvider
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Loki base URL
    pub root_url: Url,
    /// Basic auth user
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Labels added to every stream
    pub external_labels: LabelSet,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled per retry
    pub retry_backoff: Duration,
    /// Value of the `X-Scope-OrgID` header
    pub tenant_id: Option<String>,
}

impl HttpProviderConfig {
    /// Default request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default retry count
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    /// Default first retry delay
    pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

    /// Create config with defaults for everything but the URL
    pub fn new(root_url: Url) -> Self {
        Self {
            root_url,
            username: None,
            password: None,
            timeout: Self::DEFAULT_TIMEOUT,
            external_labels: LabelSet::default(),
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_backoff: Self::DEFAULT_RETRY_BACKOFF,
            tenant_id: Some("tenant-default".to_string()),
        }
    }

    /// Create config from params map
    ///
    /// Keys: `root_url` (required), `username`, `password`, `timeout`,
    /// `external_labels`, `max_retries`, `retry_backoff`, `tenant_id`.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let raw_url = params
            .get("root_url")
            .ok_or_else(|| invalid("root_url", "missing 'root_url' param"))?;
        let root_url = Url::parse(raw_url)
            .map_err(|e| invalid("root_url", format!("invalid URL '{raw_url}': {e}")))?;
        if !matches!(root_url.scheme(), "http" | "https") {
            return Err(invalid(
                "root_url",
                format!("unsupported scheme '{}'", root_url.scheme()),
            ));
        }

        let mut config = Self::new(root_url);
        config.username = non_empty(params.get("username"));
        config.password = non_empty(params.get("password"));

        if let Some(raw) = params.get("timeout") {
            config.timeout =
                parse_duration(raw).ok_or_else(|| invalid("timeout", format!("invalid duration '{raw}'")))?;
        }
        if let Some(raw) = params.get("retry_backoff") {
            config.retry_backoff = parse_duration(raw)
                .ok_or_else(|| invalid("retry_backoff", format!("invalid duration '{raw}'")))?;
        }
        if let Some(raw) = params.get("max_retries") {
            config.max_retries = raw
                .trim()
                .parse()
                .map_err(|e| invalid("max_retries", format!("invalid number '{raw}': {e}")))?;
        }
        if let Some(raw) = params.get("external_labels") {
            config.external_labels = LabelSet::parse(raw)?;
        }
        if let Some(raw) = params.get("tenant_id") {
            config.tenant_id = non_empty(Some(raw));
        }

        Ok(config)
    }

    /// Push endpoint derived from `root_url`
    pub fn push_url(&self) -> Result<Url, ContractError> {
        self.endpoint(PUSH_PATH)
    }

    /// Readiness endpoint derived from `root_url`
    pub fn ready_url(&self) -> Result<Url, ContractError> {
        self.endpoint(READY_PATH)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ContractError> {
        let mut base = self.root_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
            .map_err(|e| invalid("root_url", e.to_string()))
    }
}

fn invalid(param: &str, message: impl Into<String>) -> ContractError {
    ContractError::config_validation(format!("params.{param}"), message)
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// Loki push request body
#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct LokiPushRequest {
    streams: Vec<LokiStream>,
}

#[derive(Debug, Serialize, PartialEq)]
struct LokiStream {
    stream: BTreeMap<String, String>,
    values: Vec<[String; 2]>,
}

/// Provider that pushes events to Loki
pub struct HttpProvider {
    name: String,
    config: HttpProviderConfig,
    push_url: Url,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Create a new HttpProvider
    pub fn new(name: impl Into<String>, config: HttpProviderConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let push_url = config.push_url()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ContractError::ProviderConnection {
                provider: name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name,
            config,
            push_url,
            client,
        })
    }

    /// Create from provider `params`
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        Self::new(name, HttpProviderConfig::from_params(params)?)
    }

    /// Push endpoint
    pub fn push_url(&self) -> &Url {
        &self.push_url
    }

    /// Check that the endpoint accepts connections
    ///
    /// A transport failure is an error. A non-success status only warns:
    /// Loki answers `/ready` with 503 while it is still starting.
    #[instrument(name = "http_provider_check_ready", skip(self), fields(provider = %self.name))]
    pub async fn check_ready(&self) -> Result<(), ContractError> {
        let mut request = self.client.get(self.config.ready_url()?);
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }
        if let Some(tenant) = &self.config.tenant_id {
            request = request.header(TENANT_HEADER, tenant);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContractError::ProviderConnection {
                provider: self.name.clone(),
                message: format!("endpoint unreachable: {e}"),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(provider = %self.name, %status, "Endpoint ready");
        } else {
            warn!(provider = %self.name, %status, "Endpoint reachable but not ready");
        }
        Ok(())
    }

    /// Group events into Loki streams, keeping event order within a stream
    pub(crate) fn build_request(&self, events: &[Event], timestamp_ns: i64) -> Result<LokiPushRequest, ContractError> {
        let mut streams: BTreeMap<(&str, &str), Vec<[String; 2]>> = BTreeMap::new();
        for event in events {
            let line = serde_json::to_string(event)
                .map_err(|e| ContractError::provider_push(&self.name, e.to_string()))?;
            streams
                .entry((event.topic.as_str(), event.event_type.as_str()))
                .or_default()
                .push([timestamp_ns.to_string(), line]);
        }

        let streams = streams
            .into_iter()
            .map(|((topic, event_type), values)| {
                let mut labels = LabelSet::default();
                labels.insert("topic", topic);
                labels.insert("type", event_type);
                LokiStream {
                    stream: self.config.external_labels.merged(&labels).as_map().clone(),
                    values,
                }
            })
            .collect();

        Ok(LokiPushRequest { streams })
    }

    async fn send_once(&self, body: &LokiPushRequest) -> Result<(), SendError> {
        let mut request = self.client.post(self.push_url.clone()).json(body);
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }
        if let Some(tenant) = &self.config.tenant_id {
            request = request.header(TENANT_HEADER, tenant);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SendError::Retryable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let message = format!("status {status}: {}", text.trim());
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(SendError::Retryable(message))
        } else {
            Err(SendError::Fatal(message))
        }
    }
}

enum SendError {
    Retryable(String),
    Fatal(String),
}

impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "http_provider_push",
        skip(self, events),
        fields(provider = %self.name, events = events.len())
    )]
    async fn push(&mut self, events: &[Event]) -> Result<(), ContractError> {
        if events.is_empty() {
            return Ok(());
        }

        let timestamp_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let body = self.build_request(events, timestamp_ns)?;

        let mut delay = self.config.retry_backoff;
        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(()) => {
                    debug!(provider = %self.name, attempt, "Batch pushed");
                    return Ok(());
                }
                Err(SendError::Fatal(message)) => {
                    return Err(ContractError::provider_push(&self.name, message));
                }
                Err(SendError::Retryable(message)) if attempt >= self.config.max_retries => {
                    return Err(ContractError::provider_push(
                        &self.name,
                        format!("giving up after {} attempts: {message}", attempt + 1),
                    ));
                }
                Err(SendError::Retryable(message)) => {
                    attempt += 1;
                    warn!(
                        provider = %self.name,
                        attempt,
                        delay = ?delay,
                        error = %message,
                        "Push failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    #[instrument(name = "http_provider_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(provider = %self.name, "HttpProvider closed");
        Ok(())
    }
}
