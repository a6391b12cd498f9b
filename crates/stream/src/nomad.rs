//! Nomad HTTP event stream client
//!
//! `GET {addr}/v1/event/stream?index=N&namespace=NS&topic=T:K` returning an
//! NDJSON body.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use contracts::{FeedFrame, StreamSection};
use futures_util::{Stream, StreamExt};
use reqwest::Url;
use tracing::{debug, instrument};

use crate::client::{FeedClient, FeedSubscription, SubscribeRequest};
use crate::codec::FrameDecoder;
use crate::error::{Result, StreamError};

const STREAM_PATH: &str = "/v1/event/stream";
const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Longest silence tolerated on an open stream; Nomad sends a heartbeat
/// about every 10s
pub const DEFAULT_READ_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Nomad event stream API
#[derive(Debug, Clone)]
pub struct NomadFeedClient {
    http: reqwest::Client,
    stream_url: Url,
    token: Option<String>,
    read_idle_timeout: Duration,
}

impl NomadFeedClient {
    /// Create a client for `addr`
    ///
    /// # Errors
    /// `addr` is not a valid URL or the HTTP client cannot be built.
    pub fn new(addr: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(addr).map_err(|e| StreamError::Connect {
            message: format!("invalid nomad address '{addr}': {e}"),
        })?;
        let stream_url = base.join(STREAM_PATH).map_err(|e| StreamError::Connect {
            message: format!("invalid nomad address '{addr}': {e}"),
        })?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StreamError::Connect {
                message: format!("failed to build http client: {e}"),
            })?;

        Ok(Self {
            http,
            stream_url,
            token: token.filter(|t| !t.is_empty()),
            read_idle_timeout: DEFAULT_READ_IDLE_TIMEOUT,
        })
    }

    /// Override the read idle timeout
    pub fn with_read_idle_timeout(mut self, timeout: Duration) -> Self {
        self.read_idle_timeout = timeout;
        self
    }

    /// Create a client from the `[stream]` section
    pub fn from_config(section: &StreamSection) -> Result<Self> {
        Self::new(&section.nomad_addr, section.nomad_token.clone())
    }

    /// Full stream URL
    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    /// Query parameters for a subscription
    pub fn query(request: &SubscribeRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("index", request.start_index.to_string()),
            ("namespace", request.namespace.clone()),
        ];
        query.extend(
            request
                .topics
                .entries()
                .iter()
                .map(|entry| ("topic", entry.to_string())),
        );
        query
    }
}

impl FeedClient for NomadFeedClient {
    type Subscription = NomadSubscription;

    #[instrument(
        name = "nomad_subscribe",
        skip(self, request),
        fields(start_index = request.start_index, namespace = %request.namespace)
    )]
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<NomadSubscription> {
        let mut builder = self
            .http
            .get(self.stream_url.clone())
            .query(&Self::query(request));
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }

        let response = builder.send().await.map_err(|e| StreamError::Connect {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Connect {
                message: format!("unexpected status {status}: {}", body.trim()),
            });
        }

        debug!(%status, "event stream opened");
        Ok(NomadSubscription::new(
            Box::pin(response.bytes_stream()),
            self.read_idle_timeout,
        ))
    }
}

type BodyStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Open Nomad event stream
pub struct NomadSubscription {
    body: BodyStream,
    decoder: FrameDecoder,
    read_idle_timeout: Duration,
    eof: bool,
}

impl NomadSubscription {
    fn new(body: BodyStream, read_idle_timeout: Duration) -> Self {
        Self {
            body,
            decoder: FrameDecoder::new(),
            read_idle_timeout,
            eof: false,
        }
    }
}

impl FeedSubscription for NomadSubscription {
    async fn next_frame(&mut self) -> Result<Option<FeedFrame>> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            if self.eof {
                return self.decoder.finish();
            }

            let next = tokio::time::timeout(self.read_idle_timeout, self.body.next())
                .await
                .map_err(|_| StreamError::Connect {
                    message: format!(
                        "no data for {:?}, connection presumed dead",
                        self.read_idle_timeout
                    ),
                })?;
            match next {
                Some(Ok(chunk)) => self.decoder.extend(&chunk),
                Some(Err(e)) => {
                    return Err(StreamError::Connect {
                        message: format!("stream read failed: {e}"),
                    })
                }
                None => self.eof = true,
            }
        }
    }
}
