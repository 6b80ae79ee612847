//! Cache entries and their durable encoding.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};

/// A captured preview response.
///
/// `body` is `None` when the preview URL returned "not found"; recording
/// the miss is what lets a rerun skip refetching pages known to be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub body: Option<Vec<u8>>,
    /// Published-date label of the deploy the response was captured from.
    pub published: String,
}

/// Body encodings, tried in order; the first one whose decode∘encode
/// round-trips the bytes exactly is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoding {
    Utf8,
    Base64,
}

/// On-disk form of a cache entry, one JSON document per fetched URL.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub url: String,
    encoding: Option<Encoding>,
    body: Option<String>,
    published: String,
}

impl StoredEntry {
    pub fn new(url: &str, entry: &CacheEntry) -> Self {
        let (encoding, body) = match &entry.body {
            None => (None, None),
            Some(bytes) => match std::str::from_utf8(bytes) {
                // Valid UTF-8 re-encodes to the identical bytes, so the
                // direct text encoding is always an exact round trip here.
                Ok(text) => (Some(Encoding::Utf8), Some(text.to_string())),
                Err(_) => (Some(Encoding::Base64), Some(BASE64_STANDARD.encode(bytes))),
            },
        };

        Self {
            url: url.to_string(),
            encoding,
            body,
            published: entry.published.clone(),
        }
    }

    /// Decode back into a live entry. Fails on an undecodable body, which
    /// the store treats as a cache miss.
    pub fn decode(&self) -> Result<CacheEntry, String> {
        let body = match (&self.encoding, &self.body) {
            (None, None) => None,
            (Some(Encoding::Utf8), Some(text)) => Some(text.clone().into_bytes()),
            (Some(Encoding::Base64), Some(text)) => Some(
                BASE64_STANDARD
                    .decode(text)
                    .map_err(|e| format!("invalid base64 body: {e}"))?,
            ),
            _ => return Err("inconsistent encoding/body pair".to_string()),
        };

        Ok(CacheEntry {
            body,
            published: self.published.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(entry: &CacheEntry) -> CacheEntry {
        let stored = StoredEntry::new("https://example.app/page/", entry);
        let json = serde_json::to_string(&stored).unwrap();
        let parsed: StoredEntry = serde_json::from_str(&json).unwrap();
        parsed.decode().unwrap()
    }

    #[test]
    fn test_text_body_uses_utf8_encoding() {
        let entry = CacheEntry {
            body: Some(b"<html>hello</html>".to_vec()),
            published: "2020-01-01T00:00:00Z".to_string(),
        };
        let stored = StoredEntry::new("u", &entry);
        assert_eq!(serde_json::to_value(&stored).unwrap()["encoding"], "utf8");
        assert_eq!(roundtrip(&entry), entry);
    }

    #[test]
    fn test_binary_body_falls_back_to_base64() {
        let entry = CacheEntry {
            body: Some(vec![0xff, 0xfe, 0x00, 0x89, 0x50]),
            published: "2020-01-01T00:00:00Z".to_string(),
        };
        let stored = StoredEntry::new("u", &entry);
        assert_eq!(serde_json::to_value(&stored).unwrap()["encoding"], "base64");
        assert_eq!(roundtrip(&entry), entry);
    }

    #[test]
    fn test_not_found_body_is_null() {
        let entry = CacheEntry {
            body: None,
            published: "2020-01-01T00:00:00Z".to_string(),
        };
        let stored = StoredEntry::new("u", &entry);
        let json = serde_json::to_value(&stored).unwrap();
        assert!(json["encoding"].is_null());
        assert!(json["body"].is_null());
        assert_eq!(roundtrip(&entry), entry);
    }

    #[test]
    fn test_corrupt_body_fails_to_decode() {
        let stored: StoredEntry = serde_json::from_value(serde_json::json!({
            "url": "u",
            "encoding": "base64",
            "body": "not!!valid@@base64",
            "published": "2020-01-01T00:00:00Z",
        }))
        .unwrap();
        assert!(stored.decode().is_err());

        let stored: StoredEntry = serde_json::from_value(serde_json::json!({
            "url": "u",
            "encoding": "utf8",
            "body": null,
            "published": "2020-01-01T00:00:00Z",
        }))
        .unwrap();
        assert!(stored.decode().is_err());
    }
}
