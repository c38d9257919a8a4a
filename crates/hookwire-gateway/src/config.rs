use hookwire_proto::{TrustedProxies, MAX_BODY_SIZE};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway configuration
#[derive(Clone)]
pub struct GatewayConfig {
    /// Address to bind the gateway
    pub bind_addr: SocketAddr,
    /// Largest accepted capture body in bytes
    pub max_body_size: usize,
    /// Upper bound on one store call
    pub store_timeout: Duration,
    /// Peers whose forwarding headers are believed
    pub trusted_proxies: TrustedProxies,
    /// Bearer token for the standalone API; `None` leaves it open
    pub api_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            max_body_size: MAX_BODY_SIZE,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            trusted_proxies: TrustedProxies::any(),
            api_token: None,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_body_size", &self.max_body_size)
            .field("store_timeout", &self.store_timeout)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.max_body_size, 100 * 1024);
        assert_eq!(config.store_timeout, Duration::from_secs(10));
        assert!(config.trusted_proxies.trusts_everyone());
    }

    #[test]
    fn test_debug_hides_token() {
        let config = GatewayConfig {
            api_token: Some("hunter2".to_string()),
            ..GatewayConfig::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
