//! # Form and Query Encoding
//!
//! Helpers shared by the parameter builder and the HTTP layer for
//! `application/x-www-form-urlencoded` bodies and query strings.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

/// Characters left unescaped by `application/x-www-form-urlencoded`
/// component encoding, matching WHATWG form encoding.
const FORM_COMPONENT: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'*').remove(b'-').remove(b'.').remove(b'_');

/// Serialize a value to a form-url-encoded string.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as key/value pairs.
pub fn to_string<T: Serialize>(value: &T) -> Result<String, serde_urlencoded::ser::Error> {
    serde_urlencoded::to_string(value)
}

/// Decode a form-url-encoded string into key/value pairs.
///
/// Malformed pairs are dropped rather than failing the whole body, matching
/// lenient form parsing.
#[must_use]
pub fn form_decode(input: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(input).unwrap_or_default()
}

/// Percent-encode a single form component, with spaces as `+`.
///
/// Used for HTTP Basic credentials, which RFC 6749 §2.3.1 requires to be
/// form-url-encoded before base64.
#[must_use]
pub fn form_component(value: &str) -> String {
    utf8_percent_encode(value, FORM_COMPONENT).to_string().replace("%20", "+")
}
