//! Request payload resolution.
//!
//! Given a caller payload and the operation's allowed request content
//! types, [`resolve_payload`] picks one compatible encoding, serializes the
//! payload and sets the `Content-Type` header. Candidates are tried in
//! declaration order (the contract's preference order); an explicit
//! `Content-Type` supplied by the caller narrows the candidates first.
//! Failures accumulate per candidate and surface as one aggregate
//! [`PayloadError`].

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::trace;

use crate::codec::{Payload, WireFormat};
use crate::error::{EncodeError, PayloadError};
use crate::media_type::MediaType;

/// Encodes a payload against the allowed content-type table.
///
/// With an empty table this degrades to the client-level fallback:
/// structured payloads are serialized as JSON (tagging the header when none
/// is set), raw text/bytes pass through untouched.
///
/// ## Errors
///
/// Returns [`PayloadError`] carrying one failure per candidate when no
/// candidate can encode the payload, including the case where an explicit
/// `Content-Type` header excludes every declared type.
pub fn resolve_payload(
    payload: &Payload,
    allowed: &[MediaType],
    headers: &mut HeaderMap,
) -> Result<Bytes, PayloadError> {
    if allowed.is_empty() {
        return fallback_encode(payload, headers);
    }

    let explicit = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let candidates: Vec<&MediaType> = match &explicit {
        Some(raw) => match MediaType::parse(raw) {
            Ok(header_type) => allowed.iter().filter(|mt| mt.matches(&header_type)).collect(),
            Err(_) => Vec::new(),
        },
        None => allowed.iter().collect(),
    };

    if candidates.is_empty() {
        let raw = explicit.unwrap_or_default();
        return Err(PayloadError {
            attempts: vec![(raw.clone(), EncodeError::ExcludedByHeader(raw))],
        });
    }

    let mut attempts = Vec::new();
    for candidate in candidates {
        let Some(format) = WireFormat::for_media_type(candidate) else {
            attempts.push((candidate.to_string(), EncodeError::NoEncoder(candidate.to_string())));
            continue;
        };
        match format.encode(payload) {
            Ok(body) => {
                trace!(content_type = %candidate, "request payload encoded");
                if explicit.is_none() {
                    if let Ok(value) = HeaderValue::try_from(candidate.to_string()) {
                        headers.insert(CONTENT_TYPE, value);
                    }
                }
                return Ok(body);
            }
            Err(e) => attempts.push((candidate.to_string(), e)),
        }
    }

    Err(PayloadError { attempts })
}

fn fallback_encode(payload: &Payload, headers: &mut HeaderMap) -> Result<Bytes, PayloadError> {
    match payload {
        Payload::Json(value) => {
            let body = serde_json::to_vec(value).map_err(|e| PayloadError {
                attempts: vec![("application/json".to_string(), EncodeError::Json(e))],
            })?;
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Ok(Bytes::from(body))
        }
        Payload::Text(s) => Ok(Bytes::from(s.clone())),
        Payload::Bytes(b) => Ok(b.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mt(s: &str) -> MediaType {
        MediaType::parse(s).unwrap()
    }

    fn content_type(headers: &HeaderMap) -> Option<&str> {
        headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_first_declared_type_wins() {
        let mut headers = HeaderMap::new();
        let body = resolve_payload(
            &Payload::Json(json!({"a": 1})),
            &[mt("application/json"), mt("application/xml")],
            &mut headers,
        )
        .unwrap();
        assert_eq!(&body[..], br#"{"a":1}"#);
        assert_eq!(content_type(&headers), Some("application/json"));
    }

    #[test]
    fn test_suffixed_type_routes_to_json_encoder() {
        let mut headers = HeaderMap::new();
        let body = resolve_payload(
            &Payload::Json(json!([{"op": "replace", "path": "/a", "value": 1}])),
            &[mt("application/json-patch+json")],
            &mut headers,
        )
        .unwrap();
        assert!(!body.is_empty());
        assert_eq!(content_type(&headers), Some("application/json-patch+json"));
    }

    #[test]
    fn test_falls_through_to_next_candidate() {
        let mut headers = HeaderMap::new();
        let body = resolve_payload(
            &Payload::Text("not json at all".into()),
            &[mt("application/json"), mt("text/plain")],
            &mut headers,
        )
        .unwrap();
        assert_eq!(&body[..], b"not json at all");
        assert_eq!(content_type(&headers), Some("text/plain"));
    }

    #[test]
    fn test_explicit_header_narrows_candidates() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        let err = resolve_payload(
            &Payload::Json(json!({"a": 1})),
            &[mt("application/json")],
            &mut headers,
        )
        .unwrap_err();
        assert!(matches!(
            err.attempts.as_slice(),
            [(_, EncodeError::ExcludedByHeader(_))]
        ));
    }

    #[test]
    fn test_explicit_header_is_not_overwritten() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        resolve_payload(
            &Payload::Json(json!({"a": 1})),
            &[mt("application/json")],
            &mut headers,
        )
        .unwrap();
        assert_eq!(
            content_type(&headers),
            Some("application/json; charset=utf-8")
        );
    }

    #[test]
    fn test_aggregates_every_failure() {
        let mut headers = HeaderMap::new();
        let err = resolve_payload(
            &Payload::Json(json!({"a": 1})),
            &[mt("image/png"), mt("text/plain")],
            &mut headers,
        )
        .unwrap_err();
        assert_eq!(err.attempts.len(), 2);
        assert!(matches!(err.attempts[0].1, EncodeError::NoEncoder(_)));
        assert!(matches!(
            err.attempts[1].1,
            EncodeError::Unrepresentable { .. }
        ));
    }

    #[test]
    fn test_empty_table_fallback() {
        let mut headers = HeaderMap::new();
        let body = resolve_payload(&Payload::Json(json!({"a": 1})), &[], &mut headers).unwrap();
        assert_eq!(&body[..], br#"{"a":1}"#);
        assert_eq!(content_type(&headers), Some("application/json"));

        let mut headers = HeaderMap::new();
        let body = resolve_payload(&Payload::Text("raw".into()), &[], &mut headers).unwrap();
        assert_eq!(&body[..], b"raw");
        assert_eq!(content_type(&headers), None);
    }
}
