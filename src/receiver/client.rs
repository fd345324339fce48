use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("{0}")]
    Validation(String),
    #[error("{url} still failing after {attempts} attempts: {last}")]
    Unreachable {
        url: String,
        attempts: u32,
        last: Box<DeviceError>,
    },
}

/// One HTTP exchange with the receiver. Empty response bodies come back as
/// `Value::Null`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, method: Method, url: &str, body: Option<&Value>)
    -> Result<Value, DeviceError>;
}

/// reqwest-backed transport with connect/read timeouts
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(concat!("StingrayTV-Alice/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, DeviceError> {
        let transport_err = |source| DeviceError::Transport {
            url: url.to_string(),
            source,
        };

        let mut request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_err)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        let bytes = response.bytes().await.map_err(transport_err)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| DeviceError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// How hard to try before declaring the receiver unreachable
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// total attempts, the first one included
    pub max_attempts: u32,
    /// wait after the first failure, doubled after each further failure
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// `initial_delay * 2^attempt`, where attempt 0 is the first failure
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Talks to one receiver's REST API. GET and PUT are retried with
/// exponential backoff; POSTed key presses are sent once.
#[derive(Clone)]
pub struct DeviceClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    retry: RetryPolicy,
}

impl DeviceClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, retry: RetryPolicy) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeviceError> {
        let url = self.url(path);
        let value = self.with_retry(Method::GET, &url, None).await?;
        serde_json::from_value(value).map_err(|e| DeviceError::Decode {
            url,
            message: e.to_string(),
        })
    }

    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<(), DeviceError> {
        let url = self.url(path);
        let body = to_value(&url, body)?;
        self.with_retry(Method::PUT, &url, Some(&body)).await?;
        Ok(())
    }

    /// key presses toggle things on the receiver, so these are never retried
    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<(), DeviceError> {
        let url = self.url(path);
        let body = to_value(&url, body)?;
        tracing::debug!("POST {}", url);
        self.transport.send(Method::POST, &url, Some(&body)).await?;
        Ok(())
    }

    async fn with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, DeviceError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            tracing::debug!("{} {} (attempt {})", method, url, attempt + 1);

            match self.transport.send(method.clone(), url, body).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        tracing::error!(
                            "All {} attempts failed for {} request to {}: {}",
                            max_attempts,
                            method,
                            url,
                            e
                        );
                        return Err(DeviceError::Unreachable {
                            url: url.to_string(),
                            attempts: max_attempts,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    tracing::warn!(
                        "{} request to {} failed on attempt {}, retrying in {:?}: {}",
                        method,
                        url,
                        attempt,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn to_value<B: Serialize>(url: &str, body: &B) -> Result<Value, DeviceError> {
    serde_json::to_value(body).map_err(|e| DeviceError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
