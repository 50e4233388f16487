//! Single-shot reply decoding
//!
//! The complete reply carries spoken audio as its body and the text of the
//! turn in percent-encoded headers.

use crate::client::think::split_complete;
use crate::{ParrotError, Result};
use reqwest::header::HeaderMap;

// Header names are case-insensitive on the wire; lowercase keeps them usable
// as static header names.
pub const TRANSCRIPT_HEADER: &str = "x-transcript";
pub const RESPONSE_HEADER: &str = "x-response";
pub const THINKING_HEADER: &str = "x-thinking";

/// Text metadata of a single-shot reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleShotReply {
    /// What the server heard (or the typed text echoed back)
    pub transcript: String,
    /// Answer with any reasoning markers removed
    pub answer: String,
    pub thinking: Option<String>,
}

/// Percent-decode a header value. Missing header decodes to empty.
pub fn decode_header(headers: &HeaderMap, name: &str) -> Result<String> {
    let Some(value) = headers.get(name) else {
        return Ok(String::new());
    };

    let raw = value
        .to_str()
        .map_err(|e| ParrotError::InvalidResponse(format!("{} is not ASCII: {}", name, e)))?;

    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ParrotError::InvalidResponse(format!("{} is not valid UTF-8: {}", name, e)))
}

/// Extract the reply text. Fails when transcript or answer is empty.
pub fn parse_reply_headers(headers: &HeaderMap) -> Result<SingleShotReply> {
    let transcript = decode_header(headers, TRANSCRIPT_HEADER)?;
    let raw_answer = decode_header(headers, RESPONSE_HEADER)?;
    let header_thinking = decode_header(headers, THINKING_HEADER)?;

    if transcript.trim().is_empty() {
        return Err(ParrotError::InvalidResponse("missing transcript".into()));
    }

    // The server should have stripped markers already; stray spans move to thinking.
    let (answer, stray_thinking) = split_complete(&raw_answer);
    if answer.is_empty() {
        return Err(ParrotError::InvalidResponse("missing answer".into()));
    }

    let thinking = match (header_thinking.trim(), stray_thinking) {
        ("", None) => None,
        ("", Some(stray)) => Some(stray),
        (header, None) => Some(header.to_string()),
        (header, Some(stray)) => Some(format!("{}\n\n{}", header, stray)),
    };

    Ok(SingleShotReply {
        transcript,
        answer,
        thinking,
    })
}
