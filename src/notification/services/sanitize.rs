//! Redaction of channel errors before they are logged or stored.

use regex::Regex;
use std::sync::LazyLock;

const URL_PLACEHOLDER: &str = "[redacted-url]";

/// Webhook URLs routinely embed credentials in their path or query.
static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\b[a-z][a-z0-9+.-]*://[^\s"'<>]+"#).ok());

/// Replaces every URL in `message` with a placeholder.
///
/// ```
/// use conveyor::notification::services::sanitize_error;
///
/// assert_eq!(
///     sanitize_error("POST https://hooks.example.com/T0/secret failed"),
///     "POST [redacted-url] failed",
/// );
/// ```
#[must_use]
pub fn sanitize_error(message: &str) -> String {
    match URL_PATTERN.as_ref() {
        Some(pattern) => pattern.replace_all(message, URL_PLACEHOLDER).into_owned(),
        None => URL_PLACEHOLDER.to_owned(),
    }
}
