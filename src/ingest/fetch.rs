//! Upstream HTTP access. Adapters only ever see the [`Fetcher`] trait so the
//! throttled/cached wrapper and test fixtures can stand in for the network.

use std::time::Duration;

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Sent as `Accept`.
    pub accept: &'static str,
    pub bearer: Option<String>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, accept: &'static str, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            accept,
            bearer: None,
            timeout,
        }
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Body of a 2xx response as text.
    async fn get(&self, req: &FetchRequest) -> Result<String, FetchError>;
}

/// Plain reqwest-backed fetcher.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("feedrank/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, req: &FetchRequest) -> Result<String, FetchError> {
        let mut builder = self
            .http
            .get(&req.url)
            .header(reqwest::header::ACCEPT, req.accept);
        if let Some(token) = &req.bearer {
            builder = builder.bearer_auth(token);
        }

        let call = async {
            let resp = builder.send().await.map_err(|e| FetchError::Network {
                url: req.url.clone(),
                message: e.to_string(),
            })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: req.url.clone(),
                    status: status.as_u16(),
                });
            }
            resp.text().await.map_err(|e| FetchError::Network {
                url: req.url.clone(),
                message: e.to_string(),
            })
        };

        // The budget covers connect, headers and body.
        match tokio::time::timeout(req.timeout, call).await {
            Ok(out) => out,
            Err(_) => Err(FetchError::Timeout {
                url: req.url.clone(),
                budget: req.timeout,
            }),
        }
    }
}
