//! Headers removed before a captured request is replayed
//!
//! Hop-by-hop headers belong to the original connection, and credentials
//! presented to the capture URL must not reach the local target. Operator
//! supplied headers are applied after filtering and may reintroduce either.

use crate::headers::Headers;

/// Case-insensitive set of header names dropped on replay
pub const STRIPPED_ON_REPLAY: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "x-access-token",
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

pub fn is_stripped_on_replay(name: &str) -> bool {
    STRIPPED_ON_REPLAY
        .iter()
        .any(|stripped| stripped.eq_ignore_ascii_case(name))
}

/// Captured headers minus the stripped set, then `extra` layered on top
pub fn filter_replay_headers(captured: &Headers, extra: &Headers) -> Headers {
    let mut headers: Headers = captured
        .iter()
        .filter(|(name, _)| !is_stripped_on_replay(name))
        .collect();

    for (name, value) in extra.iter() {
        headers.insert(name, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_removed_custom_kept() {
        let captured: Headers = vec![("Authorization", "x"), ("X-Custom", "y")]
            .into_iter()
            .collect();

        let replayed = filter_replay_headers(&captured, &Headers::new());

        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed.iter().next(), Some(("X-Custom", "y")));
    }

    #[test]
    fn test_every_listed_header_stripped_and_nothing_else() {
        let mut captured: Headers = STRIPPED_ON_REPLAY
            .iter()
            .map(|name| (name.to_uppercase(), "v".to_string()))
            .collect();
        captured.append("Content-Type", "application/json");
        captured.append("X-Signature", "sig");
        captured.append("Accept-Encoding", "gzip");

        let replayed = filter_replay_headers(&captured, &Headers::new());

        let names: Vec<&str> = replayed.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Content-Type", "X-Signature", "Accept-Encoding"]);
    }

    #[test]
    fn test_extra_headers_applied_after_filter() {
        let captured: Headers = vec![("Authorization", "Bearer captured"), ("X-Env", "prod")]
            .into_iter()
            .collect();
        let extra: Headers = vec![("Authorization", "Bearer local"), ("x-env", "dev")]
            .into_iter()
            .collect();

        let replayed = filter_replay_headers(&captured, &extra);

        assert_eq!(replayed.get("authorization"), Some("Bearer local"));
        assert_eq!(replayed.get("X-Env"), Some("dev"));
        assert_eq!(replayed.len(), 2);
    }
}
