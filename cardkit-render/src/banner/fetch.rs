use std::time::Duration;

use cardkit_core::config::BannerSettings;
use reqwest::header::CONTENT_TYPE;

use super::BannerError;

/// Downloads banner sources with a byte cap enforced while streaming.
#[derive(Debug, Clone)]
pub struct BannerFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl BannerFetcher {
    pub fn new(settings: &BannerSettings) -> Result<Self, BannerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.fetch_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            max_bytes: settings.max_gif_size,
        })
    }

    fn parse_content_type(headers: &reqwest::header::HeaderMap) -> Option<String> {
        headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
    }

    fn too_large(&self, actual: usize) -> BannerError {
        BannerError::TooLarge {
            what: "size",
            actual: actual as u64,
            limit: self.max_bytes as u64,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, BannerError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|_| BannerError::InvalidUrl(url.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            _ => return Err(BannerError::InvalidUrl(url.to_string())),
        }

        let mut response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BannerError::Status(status.as_u16()));
        }

        let content_type = Self::parse_content_type(response.headers());
        if !content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
        {
            return Err(BannerError::ContentType(content_type));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        // Content-Length can lie or be absent; count what actually arrives.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(body.len() + chunk.len()));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
