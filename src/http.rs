//! HTTP fetchers for the gallery API.
//!
//! Both fetchers return the raw JSON body; shape validation happens
//! downstream so that a malformed page is never cached.

use imagefeed_search::{SearchError, SearchFetcher};
use serde_json::Value;
use url::Url;

use crate::config::FeedSettings;
use crate::error::{FeedError, Result};
use crate::feed::{FeedFetcher, FeedRequest};

const USER_AGENT: &str = concat!("imagefeed/", env!("CARGO_PKG_VERSION"));

/// Build the [`reqwest::Client`] shared by the fetchers.
///
/// # Errors
///
/// Returns [`FeedError::Config`] if the client cannot be constructed.
pub fn build_client(settings: &FeedSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.timeout())
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| FeedError::Config(format!("failed to build HTTP client: {e}")))
}

fn endpoint_url(base_url: &str, path: &str) -> Result<Url> {
    Url::parse(base_url)
        .and_then(|base| base.join(path))
        .map_err(|e| FeedError::Config(format!("invalid endpoint {base_url}{path}: {e}")))
}

async fn get_json(
    client: &reqwest::Client,
    url: Url,
    query: &[(&str, String)],
) -> std::result::Result<Value, SearchError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                SearchError::Network(format!("request timed out: {e}"))
            } else {
                SearchError::Network(format!("request failed: {e}"))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Network(format!("HTTP {status}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| SearchError::Validation(format!("response is not JSON: {e}")))
}

/// `GET {base_url}{search_endpoint}?q=&page=`
#[derive(Debug, Clone)]
pub struct HttpSearchFetcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpSearchFetcher {
    /// # Errors
    ///
    /// Returns [`FeedError::Config`] if the endpoint URL is invalid.
    pub fn new(client: reqwest::Client, settings: &FeedSettings) -> Result<Self> {
        Ok(Self {
            client,
            url: endpoint_url(&settings.base_url, &settings.search_endpoint)?,
        })
    }
}

impl SearchFetcher for HttpSearchFetcher {
    async fn fetch(&self, query: &str, page: u32) -> std::result::Result<Value, SearchError> {
        tracing::trace!(query = %query, page, "GET search page");
        get_json(
            &self.client,
            self.url.clone(),
            &[("q", query.to_owned()), ("page", page.to_string())],
        )
        .await
    }
}

/// `GET {base_url}{request.endpoint}?filter=&page=&tags=`
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFeedFetcher {
    /// # Errors
    ///
    /// Returns [`FeedError::Config`] if `settings.base_url` is not a URL.
    pub fn new(client: reqwest::Client, settings: &FeedSettings) -> Result<Self> {
        Url::parse(&settings.base_url)
            .map_err(|e| FeedError::Config(format!("feed.base_url: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }
}

impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, request: &FeedRequest) -> Result<Value> {
        let url = endpoint_url(&self.base_url, &request.endpoint)?;
        let mut query = vec![
            ("filter", request.filter.clone()),
            ("page", request.page.to_string()),
        ];
        if !request.tags.is_empty() {
            query.push(("tags", request.tags.join(",")));
        }
        Ok(get_json(&self.client, url, &query).await?)
    }
}
