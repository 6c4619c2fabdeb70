//! Datagram wire format.
//!
//! Every datagram is a four byte ASCII tag followed by a UTF-8 payload that
//! runs to the end of the datagram:
//!
//! ```text
//! +----------------+----------------------------------+
//! | tag (4 bytes)  |   payload (UTF-8, remainder)     |
//! +----------------+----------------------------------+
//! ```
//!
//! Tags without a payload (`JOIN`, `JRES`, `QUIT`, `KEEP`, `RDAT`) ignore any
//! trailing bytes. `EVNT` carries an opaque string, `UDAT` a JSON
//! [`UpdateEnvelope`], and `GDAT` a JSON object mapping every record id to its
//! value.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Length of the ASCII type tag that starts every datagram.
pub const TAG_LEN: usize = 4;

/// Full-store snapshot carried by `GDAT`: record id to serialized record JSON.
pub type Snapshot = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Datagram type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// `JOIN`: client asks to join the session.
    Join,
    /// `JRES`: server accepted the join.
    JoinAccepted,
    /// `QUIT`: graceful leave, either direction.
    Quit,
    /// `KEEP`: client liveness ping.
    KeepAlive,
    /// `EVNT`: opaque application event.
    Event,
    /// `UDAT`: single record update.
    UpdateData,
    /// `GDAT`: full snapshot of every record.
    GetData,
    /// `RDAT`: client asks for a `GDAT`.
    RequestData,
}

impl Tag {
    /// Every tag, in wire-table order.
    pub const ALL: [Tag; 8] = [
        Tag::Join,
        Tag::JoinAccepted,
        Tag::Quit,
        Tag::KeepAlive,
        Tag::Event,
        Tag::UpdateData,
        Tag::GetData,
        Tag::RequestData,
    ];

    /// The four ASCII bytes written on the wire.
    pub const fn as_bytes(self) -> &'static [u8; TAG_LEN] {
        match self {
            Tag::Join => b"JOIN",
            Tag::JoinAccepted => b"JRES",
            Tag::Quit => b"QUIT",
            Tag::KeepAlive => b"KEEP",
            Tag::Event => b"EVNT",
            Tag::UpdateData => b"UDAT",
            Tag::GetData => b"GDAT",
            Tag::RequestData => b"RDAT",
        }
    }

    /// Look up the tag for four wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_bytes().as_slice() == bytes)
    }
}

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// Single record update, the JSON payload of `UDAT`.
///
/// Field names follow the wire format (`senderIp`, `sessionDataId`,
/// `sessionDataJson`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateEnvelope {
    /// Local endpoint of the peer that produced the change.
    pub sender_ip: String,
    /// Id of the record being updated.
    pub session_data_id: String,
    /// Serialized record value.
    pub session_data_json: String,
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Request to join.
    Join,
    /// Join accepted.
    JoinAccepted,
    /// Leave / peer left.
    Quit,
    /// Liveness ping.
    KeepAlive,
    /// Generic application event, forwarded verbatim.
    Event(String),
    /// Single record update.
    Update(UpdateEnvelope),
    /// Full snapshot of the server's records.
    FullSync(Snapshot),
    /// Request for a full snapshot.
    RequestSync,
}

impl Packet {
    /// The wire tag for this packet.
    pub fn tag(&self) -> Tag {
        match self {
            Packet::Join => Tag::Join,
            Packet::JoinAccepted => Tag::JoinAccepted,
            Packet::Quit => Tag::Quit,
            Packet::KeepAlive => Tag::KeepAlive,
            Packet::Event(_) => Tag::Event,
            Packet::Update(_) => Tag::UpdateData,
            Packet::FullSync(_) => Tag::GetData,
            Packet::RequestSync => Tag::RequestData,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while encoding or decoding a datagram.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The datagram is shorter than a tag.
    #[error("datagram of {0} bytes is too short for a tag")]
    Truncated(usize),

    /// The tag is not one of the defined tags.
    #[error("unknown tag {0:?}")]
    UnknownTag(String),

    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The payload is not the expected JSON.
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A `GDAT` payload that is valid JSON but not an object.
    #[error("snapshot payload is not a JSON object")]
    NotAnObject,

    /// A `UDAT` envelope without a record id.
    #[error("update envelope has an empty sessionDataId")]
    EmptyRecordId,
}

// ---------------------------------------------------------------------------
// Encoding / decoding
// ---------------------------------------------------------------------------

/// Encode a packet into a datagram.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let payload = match packet {
        Packet::Event(text) => Cow::Borrowed(text.as_str()),
        Packet::Update(envelope) => Cow::Owned(serde_json::to_string(envelope)?),
        Packet::FullSync(snapshot) => Cow::Owned(encode_snapshot(snapshot)?),
        Packet::Join
        | Packet::JoinAccepted
        | Packet::Quit
        | Packet::KeepAlive
        | Packet::RequestSync => Cow::Borrowed(""),
    };

    let mut out = Vec::with_capacity(TAG_LEN + payload.len());
    out.extend_from_slice(packet.tag().as_bytes());
    out.extend_from_slice(payload.as_bytes());
    Ok(out)
}

/// Decode a datagram into a packet.
pub fn decode(datagram: &[u8]) -> Result<Packet, CodecError> {
    if datagram.len() < TAG_LEN {
        return Err(CodecError::Truncated(datagram.len()));
    }

    let (tag_bytes, payload) = datagram.split_at(TAG_LEN);
    let tag = Tag::from_bytes(tag_bytes).ok_or_else(|| {
        CodecError::UnknownTag(String::from_utf8_lossy(tag_bytes).into_owned())
    })?;
    let payload = std::str::from_utf8(payload)?;

    let packet = match tag {
        Tag::Join => Packet::Join,
        Tag::JoinAccepted => Packet::JoinAccepted,
        Tag::Quit => Packet::Quit,
        Tag::KeepAlive => Packet::KeepAlive,
        Tag::RequestData => Packet::RequestSync,
        Tag::Event => Packet::Event(payload.to_owned()),
        Tag::UpdateData => Packet::Update(decode_update(payload)?),
        Tag::GetData => Packet::FullSync(decode_snapshot(payload)?),
    };
    Ok(packet)
}

fn decode_update(payload: &str) -> Result<UpdateEnvelope, CodecError> {
    let mut envelope: UpdateEnvelope = serde_json::from_str(payload)?;
    if envelope.session_data_id.is_empty() {
        return Err(CodecError::EmptyRecordId);
    }
    if let Cow::Owned(fixed) = normalize_record_json(&envelope.session_data_json) {
        envelope.session_data_json = fixed;
    }
    Ok(envelope)
}

fn decode_snapshot(payload: &str) -> Result<Snapshot, CodecError> {
    let Value::Object(map) = serde_json::from_str::<Value>(payload)? else {
        return Err(CodecError::NotAnObject);
    };

    let mut snapshot = Snapshot::new();
    for (id, value) in map {
        let json = serde_json::to_string(&value)?;
        let json = normalize_record_json(&json).into_owned();
        snapshot.insert(id, json);
    }
    Ok(snapshot)
}

fn encode_snapshot(snapshot: &Snapshot) -> Result<String, CodecError> {
    let map: serde_json::Map<String, Value> = snapshot
        .iter()
        .map(|(id, json)| {
            let value = serde_json::from_str(json).unwrap_or_else(|_| Value::String(json.clone()));
            (id.clone(), value)
        })
        .collect();
    Ok(serde_json::to_string(&Value::Object(map))?)
}

/// Undo a double-encoded record value.
///
/// Compatibility shim for servers whose JSON emitter serializes nested record
/// objects a second time, so a record arrives as a string literal
/// (`"{\"x\":1}"`) instead of an object. When the value starts with a quote
/// followed by an opening brace, every backslash is removed and the wrapping
/// quotes are stripped. Anything else is returned untouched.
pub fn normalize_record_json(json: &str) -> Cow<'_, str> {
    if !json.starts_with("\"{") {
        return Cow::Borrowed(json);
    }

    let mut fixed: String = json[1..].chars().filter(|c| *c != '\\').collect();
    fixed.pop();
    Cow::Owned(fixed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
