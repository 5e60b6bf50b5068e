use std::time::Duration;

use cardkit_core::config::DispatcherSettings;
use reqwest::header::CONTENT_TYPE;

use crate::retry::{BackoffPolicy, retry_with_backoff};

/// Banner checks retry once; a slow banner host must not stall the render.
const BANNER_CHECK_RETRIES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum BannerCheckError {
    #[error("invalid banner URL: {0}")]
    InvalidUrl(String),

    #[error("banner request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("banner responded with status {0}")]
    Status(u16),

    #[error("banner content type {0:?} is not an image")]
    ContentType(Option<String>),
}

impl BannerCheckError {
    fn is_retryable(&self) -> bool {
        match self {
            BannerCheckError::Request(e) => e.is_timeout() || e.is_connect(),
            BannerCheckError::Status(status) => *status >= 500,
            BannerCheckError::InvalidUrl(_) | BannerCheckError::ContentType(_) => false,
        }
    }
}

/// Lightweight existence and content-type probe for banner URLs.
#[derive(Debug, Clone)]
pub struct BannerCheck {
    client: reqwest::Client,
    policy: BackoffPolicy,
}

impl BannerCheck {
    pub fn new(settings: &DispatcherSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.banner_check_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            policy: BackoffPolicy::new(BANNER_CHECK_RETRIES, settings.initial_delay()),
        })
    }

    /// `HEAD` the URL and require a 2xx `image/*` response.
    pub async fn verify(&self, url: &str) -> Result<(), BannerCheckError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| BannerCheckError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BannerCheckError::InvalidUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }

        retry_with_backoff(
            &self.policy,
            "banner check",
            BannerCheckError::is_retryable,
            move |_| self.probe(parsed.clone()),
        )
        .await
    }

    async fn probe(&self, url: reqwest::Url) -> Result<(), BannerCheckError> {
        let response = self.client.head(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BannerCheckError::Status(status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        match content_type {
            Some(ct) if ct.starts_with("image/") => Ok(()),
            other => Err(BannerCheckError::ContentType(other)),
        }
    }
}
