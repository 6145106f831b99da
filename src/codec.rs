//! Wire formats: the fixed table of supported payload encodings and the
//! response-body decoder.
//!
//! [`WireFormat`] enumerates the formats the engine can put on the wire
//! (JSON, XML, plain text). Routing a declared content type such as
//! `application/json-patch+json` to its format goes through
//! [`MediaType::compatible`], so suffixed types reach the right codec.
//! Responses with content types outside the table pass through as opaque
//! bytes.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::error::{DispatchError, EncodeError};
use crate::media_type::MediaType;

/// The synthetic element wrapped around XML payloads.
const XML_ROOT: &str = "root";

/// A caller-supplied request payload before encoding.
///
/// Typed payload objects enter through [`Payload::typed`], which captures
/// their JSON representation. Raw text and bytes are validated against the
/// chosen format rather than re-encoded.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Raw text, passed through after well-formedness validation.
    Text(String),
    /// Raw bytes, passed through after well-formedness validation.
    Bytes(Bytes),
    /// A structured value, serialized by the chosen format.
    Json(Value),
}

impl Payload {
    /// Lifts any serializable value into a structured payload.
    ///
    /// ## Errors
    ///
    /// Returns an error if the value's `Serialize` impl fails.
    pub fn typed<T: Serialize>(value: &T) -> Result<Self, EncodeError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "structured",
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

/// A response body after content-type-driven decoding.
#[derive(Debug, Clone)]
pub enum DecodedBody {
    /// Decoded from a JSON-syntax content type.
    Json(Value),
    /// Decoded from an XML-syntax content type, synthetic root unwrapped.
    Xml(Value),
    /// Decoded from `text/plain`.
    Text(String),
    /// Passed through: the content type is outside the supported table.
    Bytes(Bytes),
    /// The contract entry declared no body.
    Empty,
}

impl DecodedBody {
    /// The structured view of the body: JSON/XML bodies yield their value,
    /// text becomes a string value, opaque bytes and empty bodies are null.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Json(v) | Self::Xml(v) => v.clone(),
            Self::Text(s) => Value::String(s.clone()),
            Self::Bytes(_) | Self::Empty => Value::Null,
        }
    }
}

/// The fixed table of supported wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum WireFormat {
    /// `application/json` and any `+json` suffixed type.
    #[strum(serialize = "application/json")]
    Json,
    /// `application/xml` and any `+xml` suffixed type.
    #[strum(serialize = "application/xml")]
    Xml,
    /// `text/plain`.
    #[strum(serialize = "text/plain")]
    Text,
}

impl WireFormat {
    /// The canonical media type of this format.
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Json => MediaType::from_parts("application", "json"),
            Self::Xml => MediaType::from_parts("application", "xml"),
            Self::Text => MediaType::from_parts("text", "plain"),
        }
    }

    /// Routes a declared content type to the format that can represent it,
    /// by structural compatibility rather than exact match.
    pub fn for_media_type(media_type: &MediaType) -> Option<Self> {
        Self::iter().find(|f| f.media_type().compatible(media_type))
    }

    /// Encodes a payload in this format.
    ///
    /// Raw text/bytes payloads are validated as well-formed for the format
    /// and passed through unchanged; structured payloads are serialized.
    /// XML encoding wraps structured payloads under a single synthetic
    /// `<root>` element.
    ///
    /// ## Errors
    ///
    /// Returns an [`EncodeError`] describing why the payload has no
    /// representation in this format.
    pub fn encode(&self, payload: &Payload) -> Result<Bytes, EncodeError> {
        match self {
            Self::Json => encode_json(payload),
            Self::Xml => encode_xml(payload),
            Self::Text => encode_text(payload),
        }
    }
}

fn encode_json(payload: &Payload) -> Result<Bytes, EncodeError> {
    match payload {
        Payload::Text(s) => {
            serde_json::from_str::<serde::de::IgnoredAny>(s)?;
            Ok(Bytes::from(s.clone()))
        }
        Payload::Bytes(b) => {
            serde_json::from_slice::<serde::de::IgnoredAny>(b)?;
            Ok(b.clone())
        }
        Payload::Json(v) => Ok(Bytes::from(serde_json::to_vec(v)?)),
    }
}

fn encode_xml(payload: &Payload) -> Result<Bytes, EncodeError> {
    match payload {
        Payload::Text(s) => {
            validate_xml(s)?;
            Ok(Bytes::from(s.clone()))
        }
        Payload::Bytes(b) => {
            let s = std::str::from_utf8(b).map_err(|_| EncodeError::NotText)?;
            validate_xml(s)?;
            Ok(b.clone())
        }
        Payload::Json(v) => {
            let mut out = String::new();
            let serializer = quick_xml::se::Serializer::with_root(&mut out, Some(XML_ROOT))
                .map_err(|e| EncodeError::Xml(e.to_string()))?;
            v.serialize(serializer)
                .map_err(|e| EncodeError::Xml(e.to_string()))?;
            Ok(Bytes::from(out))
        }
    }
}

fn encode_text(payload: &Payload) -> Result<Bytes, EncodeError> {
    match payload {
        Payload::Text(s) => Ok(Bytes::from(s.clone())),
        Payload::Bytes(b) => {
            std::str::from_utf8(b).map_err(|_| EncodeError::NotText)?;
            Ok(b.clone())
        }
        Payload::Json(Value::String(s)) => Ok(Bytes::from(s.clone())),
        Payload::Json(_) => Err(EncodeError::Unrepresentable {
            format: "text/plain",
            payload: payload.kind(),
        }),
    }
}

/// Checks the string is a well-formed XML document without building a tree.
fn validate_xml(s: &str) -> Result<(), EncodeError> {
    let mut reader = quick_xml::Reader::from_str(s);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(EncodeError::Xml(e.to_string())),
        }
    }
}

/// Decodes a response body according to its declared content type.
///
/// JSON-syntax types decode to a structured value, XML-syntax types decode
/// and unwrap the synthetic root, `text/plain` decodes to a string. Any
/// other (or missing) content type passes through as raw bytes with no
/// decoding at all.
///
/// ## Errors
///
/// Returns a [`DispatchError`] if the body does not parse as the syntax its
/// content type declares.
pub fn decode_body(
    content_type: Option<&MediaType>,
    body: &Bytes,
) -> Result<DecodedBody, DispatchError> {
    let format = content_type.and_then(WireFormat::for_media_type);
    match format {
        Some(WireFormat::Json) => Ok(DecodedBody::Json(serde_json::from_slice(body)?)),
        Some(WireFormat::Xml) => {
            let text = std::str::from_utf8(body).map_err(|_| DispatchError::NotText)?;
            let value: Value =
                quick_xml::de::from_str(text).map_err(|e| DispatchError::Xml(e.to_string()))?;
            Ok(DecodedBody::Xml(value))
        }
        Some(WireFormat::Text) => {
            let text =
                String::from_utf8(body.to_vec()).map_err(|_| DispatchError::NotText)?;
            Ok(DecodedBody::Text(text))
        }
        None => Ok(DecodedBody::Bytes(body.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mt(s: &str) -> MediaType {
        MediaType::parse(s).unwrap()
    }

    #[test]
    fn test_format_routing() {
        assert_eq!(
            WireFormat::for_media_type(&mt("application/json")),
            Some(WireFormat::Json)
        );
        assert_eq!(
            WireFormat::for_media_type(&mt("application/json-patch+json")),
            Some(WireFormat::Json)
        );
        assert_eq!(
            WireFormat::for_media_type(&mt("application/hal+xml")),
            Some(WireFormat::Xml)
        );
        assert_eq!(
            WireFormat::for_media_type(&mt("text/plain; charset=utf-8")),
            Some(WireFormat::Text)
        );
        assert_eq!(WireFormat::for_media_type(&mt("image/png")), None);
    }

    #[test]
    fn test_encode_json_value() {
        let body = WireFormat::Json
            .encode(&Payload::Json(json!({"a": 1})))
            .unwrap();
        assert_eq!(&body[..], br#"{"a":1}"#);
    }

    #[test]
    fn test_encode_json_validates_raw_text() {
        let ok = WireFormat::Json.encode(&Payload::Text(r#"{"a": 1}"#.into()));
        assert!(ok.is_ok());

        let err = WireFormat::Json.encode(&Payload::Text("not json".into()));
        assert!(matches!(err, Err(EncodeError::Json(_))));
    }

    #[test]
    fn test_encode_xml_wraps_root() {
        let body = WireFormat::Xml
            .encode(&Payload::Json(json!({"name": "sensor-1"})))
            .unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.starts_with("<root>"), "got: {text}");
        assert!(text.contains("<name>sensor-1</name>"), "got: {text}");
        assert!(text.ends_with("</root>"), "got: {text}");
    }

    #[test]
    fn test_encode_xml_validates_raw_text() {
        assert!(WireFormat::Xml
            .encode(&Payload::Text("<doc><a>1</a></doc>".into()))
            .is_ok());
        assert!(matches!(
            WireFormat::Xml.encode(&Payload::Text("<doc><a>1</doc>".into())),
            Err(EncodeError::Xml(_))
        ));
    }

    #[test]
    fn test_encode_text() {
        let body = WireFormat::Text.encode(&Payload::Text("hello".into())).unwrap();
        assert_eq!(&body[..], b"hello");

        let body = WireFormat::Text
            .encode(&Payload::Json(json!("hello")))
            .unwrap();
        assert_eq!(&body[..], b"hello");

        assert!(matches!(
            WireFormat::Text.encode(&Payload::Json(json!({"a": 1}))),
            Err(EncodeError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn test_decode_json() {
        let body = Bytes::from_static(br#"{"data": [1, 2]}"#);
        let decoded = decode_body(Some(&mt("application/json")), &body).unwrap();
        match decoded {
            DecodedBody::Json(v) => assert_eq!(v, json!({"data": [1, 2]})),
            other => panic!("expected JSON, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_xml_unwraps_root() {
        let body = Bytes::from_static(b"<root><name>sensor-1</name></root>");
        let decoded = decode_body(Some(&mt("application/xml")), &body).unwrap();
        match decoded {
            DecodedBody::Xml(v) => assert_eq!(v["name"], json!("sensor-1")),
            other => panic!("expected XML, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_text() {
        let body = Bytes::from_static(b"plain body");
        let decoded = decode_body(Some(&mt("text/plain")), &body).unwrap();
        match decoded {
            DecodedBody::Text(s) => assert_eq!(s, "plain body"),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_passes_through() {
        let body = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);
        let decoded = decode_body(Some(&mt("application/octet-stream")), &body).unwrap();
        assert!(matches!(decoded, DecodedBody::Bytes(b) if b == body));

        let decoded = decode_body(None, &body).unwrap();
        assert!(matches!(decoded, DecodedBody::Bytes(_)));
    }

    #[test]
    fn test_decode_invalid_json_fails() {
        let body = Bytes::from_static(b"not json");
        assert!(matches!(
            decode_body(Some(&mt("application/json")), &body),
            Err(DispatchError::Decode(_))
        ));
    }
}
