//! Response sniffing and decoding.
//!
//! Bodies are classified by their first non-whitespace byte and decoded into
//! a [`serde_json::Value`] regardless of wire format. XML elements become
//! object keys, leaf elements become strings, and repeated siblings collapse
//! into arrays.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Map, Value};

use super::TransportError;

/// Wire format detected in a response body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseFormat {
    /// Empty or whitespace-only body.
    Empty,
    /// Body starts with `<`.
    Xml,
    /// Body starts with `{` or `[`.
    Json,
    /// Anything else.
    Text,
}

impl ResponseFormat {
    const fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Xml => "XML",
            Self::Json => "JSON",
            Self::Text => "text",
        }
    }
}

/// Classifies `body` by its first non-whitespace character.
#[must_use]
pub fn sniff_format(body: &str) -> ResponseFormat {
    match body.trim_start().chars().next() {
        None => ResponseFormat::Empty,
        Some('<') => ResponseFormat::Xml,
        Some('{' | '[') => ResponseFormat::Json,
        Some(_) => ResponseFormat::Text,
    }
}

/// Decodes a response body, turning error envelopes and non-success statuses
/// into [`TransportError`]s.
///
/// Empty bodies decode to `None`.
///
/// # Errors
///
/// Returns [`TransportError::Provider`] for XML `<Error>` envelopes at any
/// status and JSON `__type` envelopes on non-success statuses,
/// [`TransportError::Http`] for any other non-success status, and
/// [`TransportError::Decode`] when a success body cannot be parsed.
pub fn decode_response(status: u16, body: &str) -> Result<Option<Value>, TransportError> {
    let success = (200..300).contains(&status);
    let format = sniff_format(body);
    let parsed = match format {
        ResponseFormat::Empty => None,
        ResponseFormat::Xml => Some(xml_to_value(body)),
        ResponseFormat::Json => Some(
            serde_json::from_str::<Value>(body).map_err(|err| TransportError::Decode {
                format: format.label(),
                message: err.to_string(),
            }),
        ),
        ResponseFormat::Text => None,
    };

    match parsed {
        Some(Ok(value)) => {
            if let Some(envelope) = error_envelope(format, status, &value) {
                return Err(envelope);
            }
            if success {
                Ok(Some(value))
            } else {
                Err(http_error(status, body))
            }
        }
        Some(Err(err)) if success => Err(err),
        Some(Err(_)) => Err(http_error(status, body)),
        None if success && format == ResponseFormat::Empty => Ok(None),
        None if success => Err(TransportError::Decode {
            format: format.label(),
            message: String::from("unrecognised response body"),
        }),
        None => Err(http_error(status, body)),
    }
}

fn http_error(status: u16, body: &str) -> TransportError {
    TransportError::Http {
        status,
        body: body.to_owned(),
    }
}

fn error_envelope(format: ResponseFormat, status: u16, value: &Value) -> Option<TransportError> {
    match format {
        ResponseFormat::Xml => find_xml_error(value).map(|(code, message)| {
            TransportError::Provider {
                status,
                code,
                message,
            }
        }),
        ResponseFormat::Json if !(200..300).contains(&status) => {
            json_error(value).map(|(code, message)| TransportError::Provider {
                status,
                code,
                message,
            })
        }
        _ => None,
    }
}

fn find_xml_error(value: &Value) -> Option<(String, String)> {
    let Value::Object(map) = value else {
        return None;
    };
    if let Some(Value::Object(error)) = map.get("Error") {
        if let Some(code) = error.get("Code").and_then(Value::as_str) {
            let message = error
                .get("Message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Some((code.to_owned(), message.to_owned()));
        }
    }
    map.values().find_map(find_xml_error)
}

fn json_error(value: &Value) -> Option<(String, String)> {
    let code = value
        .get("__type")
        .or_else(|| value.get("code"))
        .and_then(Value::as_str)?;
    let short_code = code.rsplit_once('#').map_or(code, |(_, tail)| tail);
    let message = value
        .get("message")
        .or_else(|| value.get("Message"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some((short_code.to_owned(), message.to_owned()))
}

#[derive(Default)]
struct Element {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Element {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    fn into_value(self) -> Value {
        if self.children.is_empty() {
            Value::String(self.text)
        } else {
            Value::Object(self.children)
        }
    }
}

fn insert_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

/// Parses an XML document into a value keyed by its root element.
///
/// # Errors
///
/// Returns [`TransportError::Decode`] when the document is malformed.
pub fn xml_to_value(body: &str) -> Result<Value, TransportError> {
    let decode_error = |message: String| TransportError::Decode {
        format: ResponseFormat::Xml.label(),
        message,
    };

    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = Map::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(Element::named(start.local_name().as_ref())),
            Ok(Event::Empty(empty)) => {
                let element = Element::named(empty.local_name().as_ref());
                let target = stack.last_mut().map_or(&mut root, |parent| &mut parent.children);
                insert_child(target, element.name.clone(), element.into_value());
            }
            Ok(Event::Text(text)) => {
                let unescaped = text
                    .unescape()
                    .map_err(|err| decode_error(err.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let Some(element) = stack.pop() else {
                    return Err(decode_error(String::from("unbalanced closing tag")));
                };
                let name = element.name.clone();
                let target = stack.last_mut().map_or(&mut root, |parent| &mut parent.children);
                insert_child(target, name, element.into_value());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(decode_error(err.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(decode_error(String::from("unexpected end of document")));
    }
    if root.is_empty() {
        return Err(decode_error(String::from("document has no root element")));
    }
    Ok(Value::Object(root))
}

/// Returns the entries of an XML member list as a slice-like vector.
///
/// A single `<member>` decodes to an object rather than an array; this
/// flattens both shapes.
#[must_use]
pub(crate) fn members(list: Option<&Value>) -> Vec<&Value> {
    match list.and_then(|value| value.get("member")) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item) => vec![item],
        None => Vec::new(),
    }
}
