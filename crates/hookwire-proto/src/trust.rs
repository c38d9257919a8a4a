//! Client IP resolution behind reverse proxies
//!
//! Forwarded headers (`X-Real-Ip`, then the first `X-Forwarded-For` entry) are
//! only honoured when the transport peer is a trusted proxy. Trusted proxies
//! are configured as individual addresses or CIDR ranges. An empty set trusts
//! every peer.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// Longest accepted textual IP (IPv6 with zone)
const MAX_IP_LEN: usize = 45;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Network {
    addr: IpAddr,
    prefix_len: u8,
}

impl Network {
    fn parse(s: &str) -> Result<Self, TrustError> {
        let (ip_str, prefix) = match s.split_once('/') {
            Some((ip_str, prefix_str)) => {
                let prefix = prefix_str
                    .parse::<u8>()
                    .map_err(|_| TrustError::InvalidCidr(s.to_string()))?;
                (ip_str, Some(prefix))
            }
            None => (s, None),
        };

        let addr =
            IpAddr::from_str(ip_str).map_err(|_| TrustError::InvalidIpAddress(s.to_string()))?;
        let max_prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = prefix.unwrap_or(max_prefix);
        if prefix_len > max_prefix {
            return Err(TrustError::InvalidCidr(s.to_string()));
        }

        Ok(Self { addr, prefix_len })
    }

    fn contains(&self, ip: &IpAddr) -> bool {
        if self.prefix_len == 0 {
            return matches!(
                (self.addr, ip),
                (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_))
            );
        }
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(candidate)) => {
                let mask = !0u32 << (32 - self.prefix_len);
                (u32::from(net) & mask) == (u32::from(*candidate) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(candidate)) => {
                let mask = !0u128 << (128 - self.prefix_len);
                (u128::from(net) & mask) == (u128::from(*candidate) & mask)
            }
            _ => false,
        }
    }
}

/// Set of proxies whose forwarding headers are believed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    networks: Vec<Network>,
}

impl TrustedProxies {
    /// Trust every peer
    pub fn any() -> Self {
        Self::default()
    }

    pub fn from_list<I, S>(entries: I) -> Result<Self, TrustError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = entries
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_string())
            .filter(|entry| !entry.is_empty())
            .map(|entry| Network::parse(&entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    /// Parse a comma separated list, e.g. `"10.0.0.0/8, 127.0.0.1"`
    pub fn parse(list: &str) -> Result<Self, TrustError> {
        Self::from_list(list.split(','))
    }

    pub fn trusts_everyone(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn is_trusted(&self, peer: &IpAddr) -> bool {
        if self.networks.is_empty() {
            return true;
        }
        let peer = canonical(peer);
        self.networks.iter().any(|network| network.contains(&peer))
    }

    /// Resolve the client IP of a request.
    ///
    /// `real_ip` and `forwarded_for` are the raw `X-Real-Ip` and
    /// `X-Forwarded-For` header values. They are consulted in that order when
    /// the peer is trusted; a value that fails sanitation falls back to the peer.
    pub fn resolve(
        &self,
        peer: SocketAddr,
        real_ip: Option<&str>,
        forwarded_for: Option<&str>,
    ) -> String {
        let peer_ip = canonical(&peer.ip());
        if !self.is_trusted(&peer_ip) {
            return peer_ip.to_string();
        }

        let forwarded = real_ip
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| {
                forwarded_for
                    .and_then(|v| v.split(',').next())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
            });

        match forwarded {
            Some(value) => sanitize_ip(value).unwrap_or_else(|| peer_ip.to_string()),
            None => peer_ip.to_string(),
        }
    }
}

fn canonical(ip: &IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(*v6)),
        v4 => *v4,
    }
}

/// Accept a header-supplied IP only if it is short and uses the IP alphabet
/// (hex digits, `.`, `:`, `[`, `]`, `%`)
pub fn sanitize_ip(value: &str) -> Option<String> {
    if value.is_empty() || value.len() > MAX_IP_LEN {
        return None;
    }
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_hexdigit() || matches!(c, '.' | ':' | '[' | ']' | '%'));
    allowed.then(|| value.to_string())
}
