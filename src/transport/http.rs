/// reqwest-backed GraphQL transport.
///
/// Transient statuses (429/502/503) and timeouts get exactly one retry
/// after a short fixed delay; everything else surfaces immediately.
/// Identical requests issued while one is already in flight share that
/// request's outcome instead of hitting the backend again.

use super::{ Endpoint, FeedTransport, GraphqlRequest, split_graphql_body };
use crate::config::PipelineConfig;
use crate::errors::{ FeedError, FeedResult, NetworkError };
use async_trait::async_trait;
use futures::future::{ BoxFuture, FutureExt, Shared };
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_millis(400);

type InFlightQuery = Shared<BoxFuture<'static, FeedResult<Value>>>;

pub struct HttpTransport {
    client: Client,
    explorer_url: String,
    swap_squid_url: String,
    timeout: Duration,
    retry_transient: bool,
    in_flight: Mutex<HashMap<String, InFlightQuery>>,
}

impl HttpTransport {
    pub fn new(config: &PipelineConfig) -> FeedResult<Self> {
        let timeout = Duration::from_secs(config.network.request_timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::transport(&config.explorer_url, e.to_string()))?;
        Ok(Self {
            client,
            explorer_url: config.explorer_url.clone(),
            swap_squid_url: config.swap_squid_url.clone(),
            timeout,
            retry_transient: config.network.retry_transient,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Explorer => &self.explorer_url,
            Endpoint::SwapSquid => &self.swap_squid_url,
        }
    }
}

async fn post_once(
    client: &Client,
    url: &str,
    timeout: Duration,
    request: &GraphqlRequest,
) -> FeedResult<Value> {
    let payload = serde_json::json!({
        "query": request.query,
        "variables": request.variables,
    });

    let response = client
        .post(url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                FeedError::Network(NetworkError::Timeout {
                    endpoint: url.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            } else {
                FeedError::transport(url, e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.ok().filter(|b| !b.is_empty());
        return Err(FeedError::http_status(url, status.as_u16(), body));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| FeedError::parse("graphql response body", e.to_string()))?;
    split_graphql_body(body)
}

async fn post_with_retry(
    client: Client,
    url: String,
    timeout: Duration,
    retry_transient: bool,
    request: GraphqlRequest,
) -> FeedResult<Value> {
    match post_once(&client, &url, timeout, &request).await {
        Err(err) if retry_transient && err.is_retryable() => {
            log::warn!("[TRANSPORT] Transient failure, retrying once: {}", err);
            tokio::time::sleep(RETRY_DELAY).await;
            post_once(&client, &url, timeout, &request).await
        }
        other => other,
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn query(&self, endpoint: Endpoint, request: GraphqlRequest) -> FeedResult<Value> {
        let url = self.url(endpoint).to_string();
        let key = format!("{}|{}|{}", url, request.query, request.variables);

        let shared = {
            let mut map = self.in_flight.lock().unwrap();
            match map.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = post_with_retry(
                        self.client.clone(),
                        url,
                        self.timeout,
                        self.retry_transient,
                        request,
                    )
                        .boxed()
                        .shared();
                    map.insert(key.clone(), fut.clone());
                    fut
                }
            }
        };

        let result = shared.await;
        self.in_flight.lock().unwrap().remove(&key);
        result
    }
}
