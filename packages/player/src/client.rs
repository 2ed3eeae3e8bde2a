use async_trait::async_trait;
use common::{FeedItem, FeedResponse};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use crate::driver::ViewSink;
use crate::error::PlayerError;

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for the stories API.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl FeedClient {
    /// `base_url` is the server origin, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/stories{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// The public feed, optionally narrowed to publishers of one locale.
    pub async fn fetch_feed(&self, locale: Option<&str>) -> Result<Vec<FeedItem>, PlayerError> {
        let mut req = self.http.get(self.url(""));
        if let Some(locale) = locale {
            req = req.query(&[("locale", locale)]);
        }
        let res = check(self.authorized(req).send().await?).await?;
        let feed: FeedResponse = res.json().await?;
        debug!(items = feed.data.len(), "Fetched feed");
        Ok(feed.data)
    }

    pub async fn fetch_publisher_feed(&self, agent_id: i32) -> Result<Vec<FeedItem>, PlayerError> {
        let req = self.http.get(self.url(&format!("/publisher/{agent_id}")));
        let res = check(self.authorized(req).send().await?).await?;
        let feed: FeedResponse = res.json().await?;
        Ok(feed.data)
    }

    pub async fn record_view(&self, story_id: i32) -> Result<(), PlayerError> {
        let req = self.http.post(self.url(&format!("/{story_id}/views")));
        check(self.authorized(req).send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl ViewSink for FeedClient {
    async fn record_view(&self, story_id: i32) -> Result<(), PlayerError> {
        FeedClient::record_view(self, story_id).await
    }
}

async fn check(res: Response) -> Result<Response, PlayerError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = match res.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    Err(PlayerError::Status {
        status: status.as_u16(),
        message,
    })
}
