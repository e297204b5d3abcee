//! Hoppie ACARS wire format: request fields, reply classification and
//! braced-record extraction.
//!
//! Replies are plain text. A successful poll looks like
//! `ok {KLM12 telex {HELLO}} {DLH4 cpdlc {/data2/1//NE/LOGON ACCEPTED}} `,
//! an empty one is just `ok`, and any failure is `error {reason}`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Destination used for mailbox polls.
pub const POLL_TARGET: &str = "SERVER";

// ─── Request ─────────────────────────────────────────────────────────

/// The five form fields of a `connect.html` request.
///
/// All fields are optional on the wire; validation happens in the runtime
/// dispatcher so that each missing field gets its own error reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoppieRequest {
    pub logon: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub packet_type: Option<String>,
    pub packet: Option<String>,
}

impl HoppieRequest {
    /// Build a mailbox poll for `callsign` carrying `logon`.
    pub fn poll(callsign: &str, logon: &str) -> Self {
        Self {
            logon: Some(logon.to_owned()),
            from: Some(callsign.to_owned()),
            to: Some(POLL_TARGET.to_owned()),
            packet_type: Some(PacketType::Poll.as_str().to_owned()),
            packet: None,
        }
    }

    /// Treat empty strings as absent, matching how clients omit fields.
    pub fn normalized(self) -> Self {
        fn non_empty(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.is_empty())
        }
        Self {
            logon: non_empty(self.logon),
            from: non_empty(self.from),
            to: non_empty(self.to),
            packet_type: non_empty(self.packet_type),
            packet: non_empty(self.packet),
        }
    }

    /// Fields present in `overlay` replace the ones in `self`.
    pub fn overlay(self, overlay: HoppieRequest) -> Self {
        Self {
            logon: overlay.logon.or(self.logon),
            from: overlay.from.or(self.from),
            to: overlay.to.or(self.to),
            packet_type: overlay.packet_type.or(self.packet_type),
            packet: overlay.packet.or(self.packet),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.logon.is_none()
            && self.from.is_none()
            && self.to.is_none()
            && self.packet_type.is_none()
            && self.packet.is_none()
    }

    /// Same request with the logon replaced by the shared upstream credential.
    pub fn with_logon(&self, logon: &str) -> Self {
        Self {
            logon: Some(logon.to_owned()),
            ..self.clone()
        }
    }

    pub fn kind(&self) -> Option<PacketType> {
        self.packet_type.as_deref().map(PacketType::parse)
    }

    /// Query pairs in upstream order, skipping absent fields.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("logon", self.logon.as_deref()),
            ("from", self.from.as_deref()),
            ("to", self.to.as_deref()),
            ("type", self.packet_type.as_deref()),
            ("packet", self.packet.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }
}

// ─── Packet type ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Consume-once mailbox read; goes through the fan-out engine.
    Poll,
    Telex,
    Cpdlc,
    /// `ping`, `progress`, `position`, `peek`, ... relayed untouched.
    Other(String),
}

impl PacketType {
    /// Case-sensitive, like upstream.
    pub fn parse(s: &str) -> Self {
        match s {
            "poll" => Self::Poll,
            "telex" => Self::Telex,
            "cpdlc" => Self::Cpdlc,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Poll => "poll",
            Self::Telex => "telex",
            Self::Cpdlc => "cpdlc",
            Self::Other(s) => s,
        }
    }

    /// Outgoing message sends that synchronized clients tend to duplicate.
    pub fn is_message_send(&self) -> bool {
        matches!(self, Self::Telex | Self::Cpdlc)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Replies ─────────────────────────────────────────────────────────

/// Coarse classification of an upstream reply body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamReply<'a> {
    /// Starts with `ok`; carries the full text.
    Ok(&'a str),
    /// Starts with `error`; carries the full text.
    Error(&'a str),
    /// Anything else.
    Unexpected(&'a str),
}

pub fn classify_reply(text: &str) -> UpstreamReply<'_> {
    let body = text.trim_start();
    if body.starts_with("error") {
        UpstreamReply::Error(body)
    } else if body.starts_with("ok") {
        UpstreamReply::Ok(body)
    } else {
        UpstreamReply::Unexpected(text)
    }
}

/// Split a reply into its top-level `{...}` records, braces included.
///
/// Text between records is ignored. An unterminated trailing record is
/// dropped rather than delivered half-formed.
pub fn extract_messages(text: &str) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for ch in text.chars() {
        match ch {
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' if depth > 0 => {
                current.push(ch);
                depth -= 1;
                if depth == 0 {
                    messages.push(std::mem::take(&mut current));
                }
            }
            _ if depth > 0 => current.push(ch),
            _ => {}
        }
    }

    messages
}

/// Render a poll reply the way upstream does.
pub fn render_poll_reply<S: AsRef<str>>(messages: &[S]) -> String {
    if messages.is_empty() {
        return "ok".to_owned();
    }
    let mut reply = String::from("ok");
    for message in messages {
        reply.push(' ');
        reply.push_str(message.as_ref());
    }
    reply.push(' ');
    reply
}

pub fn error_reply(reason: &str) -> String {
    format!("error {{{reason}}}")
}
