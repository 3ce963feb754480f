//! CQ-code message codec.
//!
//! Outgoing messages are flat text with inline `[CQ:<type>,k=v,...]` tokens
//! for non-text elements (mentions, media, replies). This module encodes
//! structured segments into that form, parses it back, and exposes the
//! escaping scheme plus a few raw-text helpers that don't need a full decode.
//!
//! Parsing is a small left-to-right scanner rather than a regex so that every
//! input byte lands in exactly one segment: a malformed token opening simply
//! stays literal text.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapError};

const TOKEN_OPEN: &str = "[CQ:";

/// Placeholder shown for hidden mention tokens.
pub const MENTION_PLACEHOLDER: &str = "[提及用户]";
/// Placeholder shown for hidden image tokens.
pub const IMAGE_PLACEHOLDER: &str = "[图片]";

/// One parsed piece of a message: literal text or a markup token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    Text(String),
    Token(Token),
}

/// A `[CQ:...]` token. Attribute order is preserved so encoding a decoded
/// message reproduces it byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: String,
    pub attrs: Vec<(String, String)>,
}

impl Token {
    /// Looks up an attribute value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn valid_component(s: &str) -> bool {
    !s.is_empty() && !s.contains(|c| matches!(c, ',' | '[' | ']' | '='))
}

/// Builds a token segment from a kind and attribute pairs, rejecting kinds
/// and keys that would corrupt the grammar.
pub fn token(kind: &str, attrs: &[(&str, &str)]) -> Result<Segment> {
    if !valid_component(kind) {
        return Err(SnapError::Markup(format!("invalid token kind: {kind:?}")));
    }
    for (key, _) in attrs {
        if !valid_component(key) {
            return Err(SnapError::Markup(format!("invalid attribute key: {key:?}")));
        }
    }
    Ok(Segment::Token(Token {
        kind: kind.to_string(),
        attrs: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }))
}

/// A plain text segment.
pub fn text(content: impl Into<String>) -> Segment {
    Segment::Text(content.into())
}

/// A mention of one user.
pub fn at(user_id: &str) -> Segment {
    Segment::Token(Token {
        kind: "at".to_string(),
        attrs: vec![("qq".to_string(), user_id.to_string())],
    })
}

/// A mention of everyone in the group.
pub fn at_all() -> Segment {
    at("all")
}

/// An image reference (path or URL).
pub fn image(file: &str) -> Segment {
    Segment::Token(Token {
        kind: "image".to_string(),
        attrs: vec![("file".to_string(), file.to_string())],
    })
}

/// A voice clip reference.
pub fn record(file: &str) -> Segment {
    Segment::Token(Token {
        kind: "record".to_string(),
        attrs: vec![("file".to_string(), file.to_string())],
    })
}

/// A video reference.
pub fn video(file: &str) -> Segment {
    Segment::Token(Token {
        kind: "video".to_string(),
        attrs: vec![("file".to_string(), file.to_string())],
    })
}

/// A built-in emoji by id.
pub fn face(id: &str) -> Segment {
    Segment::Token(Token {
        kind: "face".to_string(),
        attrs: vec![("id".to_string(), id.to_string())],
    })
}

/// A reply-reference to an earlier message.
pub fn reply(message_id: &str) -> Segment {
    Segment::Token(Token {
        kind: "reply".to_string(),
        attrs: vec![("id".to_string(), message_id.to_string())],
    })
}

/// Escapes the four reserved characters in text destined for a message body.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
        .replace(',', "&#44;")
}

/// Inverts [`escape`]. Replacements run in reverse order so `&amp;` fragments
/// produced by earlier steps are not unescaped twice.
pub fn unescape(text: &str) -> String {
    text.replace("&#44;", ",")
        .replace("&#93;", "]")
        .replace("&#91;", "[")
        .replace("&amp;", "&")
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        let keep = b.is_ascii_alphanumeric()
            || matches!(b, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')');
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn hex_val(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(high * 16 + low);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn encode_token_into(out: &mut String, token: &Token) {
    out.push_str(TOKEN_OPEN);
    out.push_str(&token.kind);
    for (key, value) in &token.attrs {
        out.push(',');
        out.push_str(key);
        out.push('=');
        out.push_str(&percent_encode(value));
    }
    out.push(']');
}

/// Serializes segments into wire text. Text segments are emitted verbatim;
/// callers put reserved characters through [`escape`] first.
pub fn encode(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Token(token) => encode_token_into(&mut out, token),
        }
    }
    out
}

/// Attempts to parse one token at the start of `input`. Returns the token and
/// the number of bytes consumed.
fn parse_token(input: &str) -> Option<(Token, usize)> {
    let body_start = TOKEN_OPEN.len();
    let close = input.find(']')?;
    if close <= body_start {
        return None;
    }
    let body = &input[body_start..close];
    let mut parts = body.split(',');
    let kind = parts.next().unwrap_or("");
    if kind.is_empty() {
        return None;
    }
    let mut attrs = Vec::new();
    for pair in parts {
        let mut kv = pair.splitn(2, '=');
        let key = kv.next().unwrap_or("");
        let Some(value) = kv.next() else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        attrs.push((key.to_string(), percent_decode(value)));
    }
    Some((
        Token {
            kind: kind.to_string(),
            attrs,
        },
        close + 1,
    ))
}

/// Finds the next well-formed token at or after byte offset `from`.
fn next_token(input: &str, from: usize) -> Option<(usize, usize, Token)> {
    let mut i = from;
    while let Some(offset) = input[i..].find(TOKEN_OPEN) {
        let start = i + offset;
        if let Some((token, consumed)) = parse_token(&input[start..]) {
            return Some((start, start + consumed, token));
        }
        i = start + TOKEN_OPEN.len();
    }
    None
}

/// Parses wire text into segments. Non-overlapping left-to-right scan; every
/// character ends up in exactly one segment and runs of length zero produce
/// no empty text segments.
pub fn decode(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    while let Some((start, end, token)) = next_token(input, cursor) {
        if start > cursor {
            segments.push(Segment::Text(input[cursor..start].to_string()));
        }
        segments.push(Segment::Token(token));
        cursor = end;
    }
    if cursor < input.len() {
        segments.push(Segment::Text(input[cursor..].to_string()));
    }
    segments
}

/// Whether the message contains at least one token.
pub fn contains_token(message: &str) -> bool {
    next_token(message, 0).is_some()
}

/// Counts tokens, optionally restricted to one kind.
pub fn count_tokens(message: &str, kind: Option<&str>) -> usize {
    let mut count = 0;
    let mut cursor = 0;
    while let Some((_, end, token)) = next_token(message, cursor) {
        if kind.map_or(true, |k| token.kind == k) {
            count += 1;
        }
        cursor = end;
    }
    count
}

/// Removes every token, returning the trimmed remaining text.
pub fn strip_tokens(message: &str) -> String {
    let mut out = String::new();
    let mut cursor = 0;
    while let Some((start, end, _)) = next_token(message, cursor) {
        out.push_str(&message[cursor..start]);
        cursor = end;
    }
    out.push_str(&message[cursor..]);
    out.trim().to_string()
}

/// Whether the whole string is exactly one well-formed token.
pub fn is_token(message: &str) -> bool {
    let Some(body) = message
        .strip_prefix(TOKEN_OPEN)
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return false;
    };
    if body.contains(']') {
        return false;
    }
    let mut parts = body.splitn(2, ',');
    let kind = parts.next().unwrap_or("");
    if kind.is_empty() {
        return false;
    }
    match parts.next() {
        None => true,
        Some(params) => !params.is_empty(),
    }
}

/// Prepends one mention token per recipient, space-joined, before the body.
/// An empty recipient list leaves the body unchanged.
pub fn format_at_message(user_ids: &[String], body: &str) -> String {
    if user_ids.is_empty() {
        return body.to_string();
    }
    let mentions: Vec<String> = user_ids
        .iter()
        .map(|id| {
            let mut s = String::new();
            if let Segment::Token(token) = at(id) {
                encode_token_into(&mut s, &token);
            }
            s
        })
        .collect();
    format!("{} {}", mentions.join(" "), body)
}

/// Options for [`render_for_display`].
#[derive(Debug, Clone)]
pub struct DisplayOptions {
    pub show_mentions: bool,
    pub show_images: bool,
    pub show_others: bool,
    /// Label substituted for hidden tokens that are neither mentions nor
    /// images.
    pub placeholder: String,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_mentions: true,
            show_images: true,
            show_others: true,
            placeholder: "[不支持的消息类型]".to_string(),
        }
    }
}

/// Renders wire text for human display, substituting placeholder labels for
/// token kinds the caller chose to hide.
pub fn render_for_display(message: &str, options: &DisplayOptions) -> String {
    let mut out = String::new();
    for segment in decode(message) {
        match segment {
            Segment::Text(t) => out.push_str(&t),
            Segment::Token(token) => match token.kind.as_str() {
                "at" if !options.show_mentions => out.push_str(MENTION_PLACEHOLDER),
                "image" if !options.show_images => out.push_str(IMAGE_PLACEHOLDER),
                kind if kind != "at" && kind != "image" && !options.show_others => {
                    out.push_str(&options.placeholder)
                }
                _ => encode_token_into(&mut out, &token),
            },
        }
    }
    out
}
