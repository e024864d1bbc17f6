//! Shared, pooled HTTP client for request nodes.

use std::time::Duration;

use crate::error::NodeError;

#[derive(Debug, Clone)]
pub struct HttpPoolConfig {
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub default_timeout: Duration,
    pub tcp_keepalive: Option<Duration>,
}

impl Default for HttpPoolConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            default_timeout: Duration::from_secs(60),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

/// Connection-pooled client provider, safe for concurrent use. One client
/// is built up front and cloned per call (reqwest clients share their pool).
#[derive(Debug)]
pub struct HttpClientProvider {
    client: reqwest::Client,
    config: HttpPoolConfig,
}

impl Default for HttpClientProvider {
    fn default() -> Self {
        Self::new(HttpPoolConfig::default()).expect("default HTTP client")
    }
}

impl HttpClientProvider {
    pub fn new(config: HttpPoolConfig) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_keepalive(config.tcp_keepalive)
            .timeout(config.default_timeout)
            .build()
            .map_err(|e| NodeError::RequestFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub fn config(&self) -> &HttpPoolConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_builds_with_defaults() {
        let provider = HttpClientProvider::default();
        assert_eq!(provider.config().pool_max_idle_per_host, 10);
        assert_eq!(provider.config().default_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_clients_share_one_pool() {
        let provider = HttpClientProvider::default();
        let a = provider.client();
        let b = provider.client();
        // reqwest clients are cheap handles over one pool
        let _ = (a, b);
    }
}
