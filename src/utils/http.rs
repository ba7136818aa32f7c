use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::utils::url::{append_query, url_encode};

/// Default timeout for HTTP requests in seconds
pub const DEFAULT_TIMEOUT: u64 = 15;

/// A subscription source could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to create runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("HTTP error: {0}")]
    Status(StatusCode),
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// Builds the converter request that turns `subscription` into a plain list of `ss://` links.
///
/// # Examples
/// ```
/// use subrelay::utils::http::converter_request_url;
///
/// assert_eq!(
///     converter_request_url("http://127.0.0.1:25500/sub", "https://a.com/s"),
///     "http://127.0.0.1:25500/sub?target=ss&url=https%3A%2F%2Fa.com%2Fs&list=true"
/// );
/// ```
pub fn converter_request_url(api: &str, subscription: &str) -> String {
    append_query(
        api,
        &format!("target=ss&url={}&list=true", url_encode(subscription)),
    )
}

/// Makes an HTTP GET request to the specified URL
///
/// # Arguments
/// * `url` - The URL to request
/// * `timeout` - Upper bound for the whole request, body included
///
/// # Returns
/// * `Ok(String)` - The response body as a string
/// * `Err(FetchError)` - If the request failed or the status is not 200
pub async fn web_get_async(url: &str, timeout: Duration) -> Result<String, FetchError> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent("subrelay")
        .build()
        .map_err(FetchError::Client)?;

    let response = client.get(url).send().await.map_err(FetchError::Request)?;

    if response.status() != StatusCode::OK {
        return Err(FetchError::Status(response.status()));
    }

    response.text().await.map_err(FetchError::Body)
}

/// Synchronous version of web_get_async that uses a tokio runtime to run the async function
pub fn web_get(url: &str, timeout: Duration) -> Result<String, FetchError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(FetchError::Runtime)?;

    rt.block_on(web_get_async(url, timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_request_url_with_existing_query() {
        assert_eq!(
            converter_request_url("http://h/sub?token=x", "https://a.com/s?k=1"),
            "http://h/sub?token=x&target=ss&url=https%3A%2F%2Fa.com%2Fs%3Fk%3D1&list=true"
        );
    }

    #[test]
    fn test_web_get_unreachable_host_fails() {
        // port 1 on localhost is expected to refuse connections
        let result = web_get("http://127.0.0.1:1/sub", Duration::from_secs(2));
        assert!(matches!(result, Err(FetchError::Request(_))));
    }
}
