use anyhow::Result;
use log::{debug, error, info};

const ZENROWS_ENDPOINT: &str = "https://api.zenrows.com/v1/";

/// Fetches the rendered cookie.fun page through the Zenrows proxy. The
/// page only carries the agent list after client-side rendering.
pub struct CookieScraper {
    api_key: String,
    page_url: String,
    client: reqwest::Client,
}

impl CookieScraper {
    pub fn new(api_key: &str, page_url: &str) -> Self {
        CookieScraper {
            api_key: api_key.to_string(),
            page_url: page_url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub async fn fetch_page(&self) -> Result<String> {
        info!("Fetching {} via Zenrows", self.page_url);

        let response = self
            .client
            .get(ZENROWS_ENDPOINT)
            .query(&[
                ("url", self.page_url.as_str()),
                ("js_render", "true"),
                ("premium_proxy", "true"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        debug!("Response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Error response body: {}", error_text);
            return Err(anyhow::anyhow!(
                "Scrape request failed with status: {}. Response: {}",
                status,
                error_text
            ));
        }

        let body = response.text().await?;
        info!("Fetched {} bytes of page content", body.len());
        Ok(body)
    }
}
