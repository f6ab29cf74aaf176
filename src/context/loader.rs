//! Product page retrieval through a content-extraction relay

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::validate::validate_product_url;
use crate::{Error, Result};

/// Extracted page text, kept opaque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductContext {
    /// Page the content was extracted from
    pub url: String,
    /// Extracted text, injected verbatim into chat framing
    pub content: String,
}

/// Source of product context
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Fetch the context for one product page, single attempt
    async fn load(&self, url: &str) -> Result<ProductContext>;
}

/// Fetches product pages via a relay keyed by the target URL
///
/// `GET {relay}/{url}` returns the page as plain text.
pub struct ProductContextLoader {
    client: Client,
    relay_url: String,
}

impl ProductContextLoader {
    /// Create a loader for the given relay base URL
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(relay_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("EcomVoice/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(Error::Http)?;

        Ok(Self {
            client,
            relay_url: relay_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn relay_request_url(&self, product_url: &str) -> String {
        format!("{}/{product_url}", self.relay_url)
    }
}

#[async_trait]
impl ContextSource for ProductContextLoader {
    async fn load(&self, url: &str) -> Result<ProductContext> {
        let product_url = validate_product_url(url)?;
        let request_url = self.relay_request_url(product_url.as_str());

        tracing::info!(url = %product_url, "fetching product info");

        let response = self
            .client
            .get(&request_url)
            .header("X-Base", "final")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "content relay request failed");
                Error::ContextFetch(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, url = %product_url, "content relay error");
            return Err(Error::ContextFetch(format!(
                "HTTP error! status: {}",
                status.as_u16()
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| Error::ContextFetch(format!("failed to read response body: {e}")))?;

        tracing::debug!(
            len = content.len(),
            preview = %content.chars().take(200).collect::<String>(),
            "product content fetched"
        );

        Ok(ProductContext {
            url: product_url.to_string(),
            content,
        })
    }
}
