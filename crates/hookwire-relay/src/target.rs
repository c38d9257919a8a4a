//! Local replay target

use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::RelayError;

/// Base URL captured requests are replayed against.
///
/// Accepts a bare port (`3000`), `host:port`, or a full `http(s)://` URL whose
/// path becomes a prefix for every replayed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTarget {
    base: Url,
}

impl LocalTarget {
    pub fn parse(input: &str) -> Result<Self, RelayError> {
        let input = input.trim();
        let invalid = || RelayError::InvalidTarget(input.to_string());

        let url = if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            let port: u16 = input.parse().map_err(|_| invalid())?;
            if port == 0 {
                return Err(invalid());
            }
            Url::parse(&format!("http://localhost:{}", port)).map_err(|_| invalid())?
        } else if input.contains("://") {
            Url::parse(input).map_err(|_| invalid())?
        } else {
            Url::parse(&format!("http://{}", input)).map_err(|_| invalid())?
        };

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid());
        }

        let mut base = url;
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Target URL for a captured path and query.
    ///
    /// `.` and `..` segments, percent-encoded or not, are resolved within the
    /// captured path and can never climb above the base path.
    pub fn url_for(&self, path: &str, query: &BTreeMap<String, String>) -> Url {
        let mut segments: Vec<&str> = Vec::new();
        // A backslash separates segments in http URLs too
        for segment in path.split(['/', '\\']) {
            match percent_decode_str(segment).decode_utf8_lossy().as_ref() {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                _ => segments.push(segment),
            }
        }

        let mut joined = self.base.path().trim_end_matches('/').to_string();
        for segment in &segments {
            joined.push('/');
            joined.push_str(segment);
        }
        if path.ends_with('/') || joined.is_empty() {
            joined.push('/');
        }

        let mut url = self.base.clone();
        url.set_path(&joined);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        url
    }
}

impl FromStr for LocalTarget {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LocalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str().trim_end_matches('/'))
    }
}
