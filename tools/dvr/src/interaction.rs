//! Serializable interaction records.
//!
//! One `InteractionRecord` per captured request/response exchange. Records are
//! written to the fixture as JSON; byte fields are hex strings.

use crate::errors::DvrError;
use crate::http::{Body, HeaderMap, HttpRequest, HttpResponse, RequestUrl};
use serde::{Deserialize, Serialize};

// ── RequestRecord ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: Option<RequestUrl>,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default)]
    pub trailers: HeaderMap,
}

// ── ResponseRecord ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    #[serde(default)]
    pub headers: HeaderMap,
}

// ── InteractionRecord ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub request: Option<RequestRecord>,
    #[serde(default, with = "hex_bytes")]
    pub request_body: Vec<u8>,
    pub response: Option<ResponseRecord>,
    #[serde(default, with = "hex_bytes")]
    pub response_body: Vec<u8>,
    #[serde(default)]
    pub recorded_at_unix_ms: u64,
    /// Set once a live request has been answered from this record. Only lives
    /// in memory; every load starts with all records unconsumed.
    #[serde(skip)]
    pub consumed: bool,
}

impl InteractionRecord {
    /// Request-only record built from a live request, used for matching.
    /// Drains the request body; the request keeps a buffered copy.
    pub fn from_live_request(request: &mut HttpRequest) -> Result<Self, DvrError> {
        let request_body = request.body.read_all()?;
        Ok(Self {
            request: Some(RequestRecord {
                method: request.method.clone(),
                url: request.url.clone(),
                headers: request.headers.clone(),
                trailers: request.trailers.clone(),
            }),
            request_body,
            ..Self::default()
        })
    }

    /// Attaches the response half. Drains the response body; the response
    /// keeps a buffered copy for the caller.
    pub fn capture_response(
        &mut self,
        response: &mut HttpResponse,
        recorded_at_unix_ms: u64,
    ) -> Result<(), DvrError> {
        self.response_body = response.body.read_all()?;
        self.response = Some(ResponseRecord {
            status: response.status,
            headers: response.headers.clone(),
        });
        self.recorded_at_unix_ms = recorded_at_unix_ms;
        Ok(())
    }

    /// Rebuilds the recorded response. Records without a response half
    /// replay as an empty 200.
    pub fn to_response(&self) -> HttpResponse {
        let (status, headers) = match &self.response {
            Some(response) => (response.status, response.headers.clone()),
            None => (200, HeaderMap::new()),
        };
        HttpResponse {
            status,
            headers,
            body: Body::from_bytes(self.response_body.clone()),
        }
    }

    pub fn method(&self) -> &str {
        self.request
            .as_ref()
            .map(|r| r.method.as_str())
            .unwrap_or("")
    }

    pub fn url_string(&self) -> String {
        self.request
            .as_ref()
            .and_then(|r| r.url.as_ref())
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    /// Short stable digest of the request half, `sha256:` plus 16 hex chars.
    pub fn request_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        if let Some(request) = &self.request {
            let encoded = serde_json::to_vec(request).unwrap_or_default();
            hasher.update(&encoded);
        }
        hasher.update(&self.request_body);
        let digest = hasher.finalize();
        format!("sha256:{}", hex_bytes::encode(&digest[..8]))
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn decode(text: &str) -> Result<Vec<u8>, String> {
        if text.len() % 2 != 0 {
            return Err(format!("odd hex length {}", text.len()));
        }
        (0..text.len())
            .step_by(2)
            .map(|idx| {
                text.get(idx..idx + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .ok_or_else(|| format!("invalid hex at offset {idx}"))
            })
            .collect()
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{hex_bytes, InteractionRecord};
    use crate::http::{HttpRequest, HttpResponse};

    #[test]
    fn consumed_flag_is_not_serialized() {
        let mut record = InteractionRecord {
            request_body: b"abc".to_vec(),
            consumed: true,
            ..InteractionRecord::default()
        };
        record.recorded_at_unix_ms = 7;
        let line = serde_json::to_string(&record).expect("serialize");
        assert!(!line.contains("consumed"));
        assert!(line.contains("\"request_body\":\"616263\""));

        let parsed: InteractionRecord = serde_json::from_str(&line).expect("parse");
        assert!(!parsed.consumed);
        assert_eq!(parsed.request_body, b"abc");
        assert_eq!(parsed.recorded_at_unix_ms, 7);
    }

    #[test]
    fn hex_decode_rejects_malformed_input() {
        assert!(hex_bytes::decode("abc").is_err());
        assert!(hex_bytes::decode("zz").is_err());
        assert_eq!(hex_bytes::decode("00ff").expect("decode"), vec![0, 255]);
    }

    #[test]
    fn capture_keeps_bodies_readable_for_both_owners() {
        let mut request = HttpRequest::new("POST", "http://host/items")
            .expect("request")
            .with_body("req");
        let mut record = InteractionRecord::from_live_request(&mut request).expect("record");
        let mut response = HttpResponse::new(201).with_body("resp");
        record.capture_response(&mut response, 42).expect("capture");

        assert_eq!(record.request_body, b"req");
        assert_eq!(record.response_body, b"resp");
        assert_eq!(request.body.read_all().expect("request body"), b"req");
        assert_eq!(response.body.into_bytes().expect("response body"), b"resp");
        assert_eq!(record.status(), Some(201));
        assert_eq!(record.method(), "POST");
        assert_eq!(record.url_string(), "http://host/items");
    }

    #[test]
    fn fingerprint_tracks_request_body() {
        let base = InteractionRecord {
            request_body: b"one".to_vec(),
            ..InteractionRecord::default()
        };
        let other = InteractionRecord {
            request_body: b"two".to_vec(),
            ..InteractionRecord::default()
        };
        assert!(base.request_fingerprint().starts_with("sha256:"));
        assert_eq!(base.request_fingerprint().len(), "sha256:".len() + 16);
        assert_ne!(base.request_fingerprint(), other.request_fingerprint());
    }
}
