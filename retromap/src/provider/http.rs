//! HTTP client abstraction for testability

use super::types::ProviderError;

/// Default per-request timeout. No operation in the acquisition core is
/// expected to outlive a bounded per-tile network timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with the default timeout.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new ReqwestClient with a custom timeout in seconds.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ProviderError::Http(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::Http(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::Http(format!("Failed to read response: {}", e)))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Mock HTTP client returning canned responses per URL substring.
    ///
    /// Responses are matched by the first registered substring found in the
    /// requested URL; unmatched requests return an HTTP error. Requested
    /// URLs are recorded for assertion.
    pub struct MockHttpClient {
        routes: Vec<(String, Result<Vec<u8>, ProviderError>)>,
        pub requests: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self {
                routes: Vec::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Single canned response for every request.
        pub fn always(response: Result<Vec<u8>, ProviderError>) -> Self {
            let mut mock = Self::new();
            mock.routes.push((String::new(), response));
            mock
        }

        /// Register a response for URLs containing `pattern`.
        pub fn route(mut self, pattern: &str, response: Result<Vec<u8>, ProviderError>) -> Self {
            self.routes.push((pattern.to_string(), response));
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }

        /// Build a map of pattern -> hit count for assertions.
        pub fn hits(&self, pattern: &str) -> usize {
            self.requests
                .lock()
                .iter()
                .filter(|u| u.contains(pattern))
                .count()
        }
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
            self.requests.lock().push(url.to_string());
            for (pattern, response) in &self.routes {
                if url.contains(pattern.as_str()) {
                    return response.clone();
                }
            }
            Err(ProviderError::Http(format!("no mock route for {}", url)))
        }
    }

    #[test]
    fn test_mock_client_routes_by_substring() {
        let mock = MockHttpClient::new()
            .route("/a/", Ok(vec![1]))
            .route("/b/", Ok(vec![2]));

        assert_eq!(mock.get("http://x/a/1").unwrap(), vec![1]);
        assert_eq!(mock.get("http://x/b/1").unwrap(), vec![2]);
        assert!(mock.get("http://x/c/1").is_err());
        assert_eq!(mock.request_count(), 3);
    }

    #[test]
    fn test_mock_client_always() {
        let mock = MockHttpClient::always(Err(ProviderError::Http("down".into())));
        assert!(mock.get("http://anything").is_err());
    }
}
