use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

use super::{ApiError, CreateResponse, QueryResponse, Session, ToolingApi};

/// Tooling API client authenticated with the session bearer token.
#[derive(Clone)]
pub struct HttpToolingApi {
    client: Client,
    base: Url,
    bearer: HeaderValue,
}

impl HttpToolingApi {
    pub fn new(session: &Session, timeout: Duration) -> Result<Self, ApiError> {
        let base = tooling_base_url(&session.instance_url, &session.api_version)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", session.access_token))
            .map_err(|_| ApiError::Transport("access token is not a valid header value".into()))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base, bearer })
    }

    fn request(&self, method: Method, resource: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.base.join(resource).map_err(|error| ApiError::InvalidUrl {
            url: format!("{}{resource}", self.base),
            reason: error.to_string(),
        })?;
        debug!(%method, path = url.path(), "tooling request");
        Ok(self.client.request(method, url).header(AUTHORIZATION, self.bearer.clone()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.as_u16() > 399 {
            debug!(status = status.as_u16(), body = %body, "tooling request failed");
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(body)
    }
}

fn tooling_base_url(instance_url: &str, api_version: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(instance_url).map_err(|error| ApiError::InvalidUrl {
        url: instance_url.to_string(),
        reason: error.to_string(),
    })?;
    let version = api_version.trim().trim_start_matches('v');
    url.set_path(&format!("/services/data/v{version}/tooling/"));
    url.set_query(None);
    Ok(url)
}

#[async_trait]
impl ToolingApi for HttpToolingApi {
    async fn query(&self, soql: &str) -> Result<QueryResponse<Value>, ApiError> {
        let request = self.request(Method::GET, "query")?.query(&[("q", soql)]);
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn create(&self, sobject: &str, payload: Value) -> Result<CreateResponse, ApiError> {
        let request = self.request(Method::POST, &format!("sobjects/{sobject}"))?.json(&payload);
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn update(&self, sobject: &str, id: &str, payload: Value) -> Result<(), ApiError> {
        let request =
            self.request(Method::PATCH, &format!("sobjects/{sobject}/{id}"))?.json(&payload);
        // A successful PATCH answers 204 with no body.
        self.send(request).await?;
        Ok(())
    }

    async fn fetch_body(&self, sobject: &str, id: &str) -> Result<String, ApiError> {
        let request = self.request(Method::GET, &format!("sobjects/{sobject}/{id}/Body"))?;
        self.send(request).await
    }
}
