use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    error::RequestError,
    protocol::{CollectionQuery, ErrorBody, PageResult, PagedEnvelope},
};
use url::Url;

use crate::CollectionFetcher;

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: Url,
    pub bearer_token: Option<String>,
}

impl RestConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            bearer_token: None,
        }
    }

    /// Pre-binds the credential the backend expects; the controllers never
    /// read session state from anywhere else.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// One collection endpoint (`/api/tasks`, `/api/clients`, …) spoken over
/// HTTP. Issues exactly one request per call; surfacing and retrying
/// failures is the controllers' and the user's job.
pub struct RestCollection<T> {
    http: reqwest::Client,
    config: RestConfig,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RestCollection<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(config: RestConfig, path: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            path: path.into(),
            _marker: PhantomData,
        }
    }

    fn endpoint(&self, id: Option<i64>) -> Result<Url, RequestError> {
        let path = match id {
            Some(id) => format!("{}/{id}", self.path.trim_end_matches('/')),
            None => self.path.clone(),
        };
        self.config
            .base_url
            .join(&path)
            .map_err(|err| RequestError::Transport(format!("invalid endpoint url: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.config.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, RequestError> {
        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }
        response
            .json::<R>()
            .await
            .map_err(|err| RequestError::Transport(format!("invalid response body: {err}")))
    }

    pub async fn create<B: Serialize + Sync>(&self, body: &B) -> Result<T, RequestError> {
        let url = self.endpoint(None)?;
        let response = self
            .request(Method::POST, url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    pub async fn update<B: Serialize + Sync>(&self, id: i64, body: &B) -> Result<T, RequestError> {
        let url = self.endpoint(Some(id))?;
        let response = self
            .request(Method::PUT, url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), RequestError> {
        let url = self.endpoint(Some(id))?;
        let response = self
            .request(Method::DELETE, url)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl<T> CollectionFetcher<T> for RestCollection<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn fetch(&self, query: &CollectionQuery) -> Result<PageResult<T>, RequestError> {
        let mut url = self.endpoint(None)?;
        url.query_pairs_mut().extend_pairs(query.query_pairs());
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(transport)?;
        let envelope: PagedEnvelope<T> = Self::decode(response).await?;
        let mut page = PageResult::from(envelope);
        // The envelope is untrusted input; hold the page-size invariant here
        // so the controller sees at most one page of rows.
        if page.items.len() as u64 > u64::from(query.page_size) {
            page.items.truncate(query.page_size as usize);
        }
        Ok(page)
    }
}

fn transport(err: reqwest::Error) -> RequestError {
    RequestError::Transport(err.to_string())
}

async fn rejection(status: StatusCode, response: reqwest::Response) -> RequestError {
    // The backend puts a human-readable reason under `error`; fall back to
    // the status line when the body is empty or unstructured.
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request rejected")
                .to_string()
        });
    RequestError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
#[path = "tests/rest_tests.rs"]
mod tests;
