use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::absolute_url;
use crate::config::FetcherConfig;
use crate::error::NavigationError;
use crate::traits::ProductPageSource;

/// Fetches product detail pages over plain HTTP.
///
/// Detail pages render their description server-side, so they skip the
/// browser entirely.
#[derive(Clone)]
pub struct HttpPageClient {
    client: Client,
    base_url: String,
}

impl HttpPageClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn get(&self, url: &str) -> Result<String, NavigationError> {
        let http_error = |source| NavigationError::Http {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(http_error)?;

        if !response.status().is_success() {
            return Err(NavigationError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(http_error)
    }
}

#[async_trait]
impl ProductPageSource for HttpPageClient {
    async fn fetch_product_page(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<String, NavigationError> {
        let url = absolute_url(&self.base_url, path);
        debug!(url, "fetching product page");

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(NavigationError::Cancelled { url: url.clone() }),
            body = self.get(&url) => body,
        }
    }
}
