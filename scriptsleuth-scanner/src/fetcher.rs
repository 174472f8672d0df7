use crate::config::ScanConfig;
use crate::error::FetchError;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Retrieves the body of a URL as text.
pub trait Fetcher: Send + Sync {
    fn get(&self, url: &Url) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// [`Fetcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    reject_error_status: bool,
}

impl HttpFetcher {
    pub fn new(config: &ScanConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            reject_error_status: config.reject_error_status,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url) -> Result<String, FetchError> {
        debug!("Fetching {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if self.reject_error_status && (status.is_client_error() || status.is_server_error()) {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        debug!("{} answered {} with {} bytes", url, status.as_u16(), body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[tokio::test]
    async fn test_error_status_body_is_returned_by_default() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.js"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&ScanConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing.js", mock_server.uri())).unwrap();

        assert_eq!(fetcher.get(&url).await.unwrap(), "not found");
    }

    #[tokio::test]
    async fn test_error_status_rejected_when_configured() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.js"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let config = ScanConfig {
            reject_error_status: true,
            ..ScanConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let url = Url::parse(&format!("{}/broken.js", mock_server.uri())).unwrap();

        assert!(matches!(fetcher.get(&url).await, Err(FetchError::Status(500))));
    }

    #[tokio::test]
    async fn test_connection_failure_is_http_error() {
        let fetcher = HttpFetcher::new(&ScanConfig {
            timeout_secs: 2,
            ..ScanConfig::default()
        })
        .unwrap();
        let url = Url::parse("http://127.0.0.1:1/unreachable.js").unwrap();

        assert!(matches!(fetcher.get(&url).await, Err(FetchError::Http(_))));
    }
}
