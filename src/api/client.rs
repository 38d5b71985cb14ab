use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;

use crate::activity::ActivityTracker;
use crate::config::Config;

use super::transport::{ApiRequest, ApiResponse, Method, Transport, TransportError};

/// reqwest-backed transport for the inventory API
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: String,
  token: Option<String>,
  activity: ActivityTracker,
}

impl HttpTransport {
  pub fn new(config: &Config, activity: ActivityTracker) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: config.api.url.clone(),
      token: Config::get_api_token(),
      activity,
    })
  }

  fn method(method: Method) -> reqwest::Method {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

#[async_trait]
impl Transport for HttpTransport {
  fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
    let _guard = (!request.background).then(|| self.activity.begin());

    let mut builder = self
      .client
      .request(Self::method(request.method), &request.url);
    if !request.query.is_empty() {
      builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }
    if let Some(token) = &self.token {
      builder = builder.bearer_auth(token);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| TransportError::network(format!("{} {} failed: {}", request.method, request.url, e)))?;

    let status = response.status().as_u16();
    let body = response
      .bytes()
      .await
      .map_err(|e| TransportError::network(format!("Failed to read response body: {}", e)))?
      .to_vec();

    if (200..300).contains(&status) {
      Ok(ApiResponse::new(status, body))
    } else {
      Err(TransportError::status(status, serde_json::from_slice(&body).ok()))
    }
  }
}
