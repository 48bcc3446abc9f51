//! Message decoding — raw RFC 822 bytes to a normalized record.

use std::sync::LazyLock;

use mail_parser::MessageParser;
use regex::Regex;

use crate::error::ProcessError;
use crate::policy;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// One fetched mailbox entry, decoded and normalized. Immutable; built once
/// per entry and discarded after dispatch.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    /// Header-style sender string, e.g. `"Alice <alice@example.com>"`.
    pub sender: String,
    /// Decoded subject, `"(no subject)"` when the header is absent.
    pub subject: String,
    /// Concatenated non-attachment text content, tag-stripped and trimmed.
    pub body: String,
    /// Message-ID header value; empty when absent.
    pub message_id: String,
}

impl NormalizedMessage {
    /// The bare address derived from the sender string.
    pub fn bare_sender(&self) -> &str {
        policy::extract_address(&self.sender)
    }
}

/// Decode one raw mailbox entry.
///
/// Encoded-word headers and per-part charsets are handled by `mail-parser`
/// (UTF-8 fallback, undecodable bytes dropped). Parts that fail to decode
/// contribute nothing; only an unparseable entry is an error.
pub fn decode(raw: &[u8]) -> Result<NormalizedMessage, ProcessError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| ProcessError::Decode("unparseable message".to_string()))?;

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .map(|a| match (a.name(), a.address()) {
            (Some(name), Some(address)) => format!("{name} <{address}>"),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => "unknown".to_string(),
        })
        .unwrap_or_else(|| "unknown".to_string());

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    let message_id = parsed.message_id().unwrap_or_default().to_string();

    // Every non-attachment text or HTML part, concatenated in part order.
    // A part can appear on both body lists, so dedup by part id.
    let mut ids: Vec<u32> = parsed
        .text_body
        .iter()
        .chain(parsed.html_body.iter())
        .copied()
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let mut body = String::new();
    for id in ids {
        if let Some(text) = parsed.part(id).and_then(|p| p.text_contents()) {
            body.push_str(text);
        }
    }

    let body = strip_tags(&body).trim().to_string();

    Ok(NormalizedMessage {
        sender,
        subject,
        body,
        message_id,
    })
}

/// Remove `<...>` tag sequences. Simple regex stripping, not an HTML parser.
pub fn strip_tags(text: &str) -> String {
    TAG_RE.replace_all(text, "").into_owned()
}
