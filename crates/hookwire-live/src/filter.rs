use hookwire_proto::CaptureRecord;

/// Active list filters. Filters only decide what is rendered and what may be
/// auto-selected; they never remove records from the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    method: Option<String>,
    /// Stored lowercased
    text: Option<String>,
}

impl Filter {
    pub fn new(method: Option<String>, text: Option<String>) -> Self {
        let method = method
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty());
        let text = text
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());
        Self { method, text }
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.method.is_some() || self.text.is_some()
    }

    pub fn matches(&self, record: &CaptureRecord) -> bool {
        if let Some(method) = &self.method {
            if !record.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }

        match &self.text {
            None => true,
            Some(needle) => {
                contains(&record.path, needle)
                    || contains(&record.method, needle)
                    || contains(&record.body_text(), needle)
                    || record.headers.iter().any(|(_, value)| contains(value, needle))
            }
        }
    }
}

fn contains(haystack: &str, lowered_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowered_needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use hookwire_proto::Headers;
    use std::collections::BTreeMap;

    fn record() -> CaptureRecord {
        CaptureRecord {
            id: "r1".to_string(),
            endpoint_slug: "demo".to_string(),
            method: "POST".to_string(),
            path: "/hooks/Stripe".to_string(),
            headers: vec![("X-Event", "Invoice.Paid")].into_iter().collect::<Headers>(),
            query_params: BTreeMap::new(),
            body: Bytes::from_static(b"{\"amount\":4200}"),
            ip: "127.0.0.1".to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::new(Some("  ".to_string()), Some(String::new()));
        assert!(!filter.is_active());
        assert!(filter.matches(&record()));
    }

    #[test]
    fn test_method_filter_is_exact() {
        assert!(Filter::new(Some("post".to_string()), None).matches(&record()));
        assert!(!Filter::new(Some("GET".to_string()), None).matches(&record()));
        assert!(!Filter::new(Some("PO".to_string()), None).matches(&record()));
    }

    #[test]
    fn test_text_filter_fields() {
        for needle in ["stripe", "post", "AMOUNT", "invoice.paid"] {
            let filter = Filter::new(None, Some(needle.to_string()));
            assert!(filter.matches(&record()), "{} should match", needle);
        }
        assert!(!Filter::new(None, Some("x-event".to_string())).matches(&record()));
        assert!(!Filter::new(None, Some("github".to_string())).matches(&record()));
    }

    #[test]
    fn test_filters_combine() {
        let filter = Filter::new(Some("GET".to_string()), Some("stripe".to_string()));
        assert!(!filter.matches(&record()));
    }
}
