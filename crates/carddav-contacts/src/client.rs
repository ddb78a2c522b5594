//! Resource download for external photo references

use crate::error::{ContactsError, Result};
use async_trait::async_trait;
use carddav_core::HttpConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// A downloaded resource
#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Resource download capability of a collection
#[async_trait]
pub trait ResourceDownloader: Send + Sync {
    /// Fetch `uri`; any network or HTTP failure is an error
    async fn download_resource(&self, uri: &str) -> Result<Resource>;
}

/// HTTP downloader bound to one CardDAV collection
pub struct HttpDownloader {
    client: Client,
    base_url: Option<Url>,
    username: Option<String>,
    password: Option<String>,
}

impl HttpDownloader {
    /// Create a new downloader from HTTP configuration
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ContactsError::Configuration(e.to_string()))?;

        let base_url = match &config.base_url {
            Some(url) => Some(
                Url::parse(url)
                    .map_err(|e| ContactsError::Configuration(format!("Invalid base URL {}: {}", url, e)))?,
            ),
            None => None,
        };

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Absolute URL for `uri`, joining relative references onto the base
    pub fn resolve(&self, uri: &str) -> Result<Url> {
        match Url::parse(uri) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    ContactsError::Download(format!("Relative URI without base URL: {}", uri))
                })?;
                base.join(uri)
                    .map_err(|e| ContactsError::Download(format!("Invalid URI {}: {}", uri, e)))
            }
            Err(e) => Err(ContactsError::Download(format!("Invalid URI {}: {}", uri, e))),
        }
    }
}

#[async_trait]
impl ResourceDownloader for HttpDownloader {
    async fn download_resource(&self, uri: &str) -> Result<Resource> {
        let url = self.resolve(uri)?;

        debug!("Downloading resource: {}", url);

        let mut request = self.client.get(url.clone());
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContactsError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            error!("Resource download failed: {} - {}", url, status);
            return Err(ContactsError::HttpError(format!(
                "GET {} failed: {}",
                url, status
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| ContactsError::HttpError(e.to_string()))?;

        debug!("Downloaded {} bytes from {}", body.len(), url);

        Ok(Resource {
            body: body.to_vec(),
            content_type,
        })
    }
}
