use super::RequestSink;
use crate::protocol::OutboundRequest;
use tracing::{debug, error, warn};

/// Posts outbound requests to the broker's HTTP API without awaiting them.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl HttpSink {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn url_for(&self, request: &OutboundRequest) -> String {
        format!("{}{}", self.api_url, request.path())
    }
}

impl RequestSink for HttpSink {
    fn dispatch(&self, request: OutboundRequest) {
        let body = match request.body() {
            Ok(body) => body,
            Err(e) => {
                error!("Dropping request for {}: {}", request.entity_id(), e);
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; dropping request for {}", request.entity_id());
            return;
        };

        let url = self.url_for(&request);
        let call = self
            .client
            .post(url.as_str())
            .header("X-Authorization", format!("Bearer {}", self.token))
            .json(&body);

        runtime.spawn(async move {
            match call.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("POST {} -> {}", url, response.status());
                }
                Ok(response) => warn!("POST {} -> {}", url, response.status()),
                Err(e) => error!("POST {} failed: {}", url, e),
            }
        });
    }
}
