//! `CAP` negotiation and SASL authentication.
//!
//! Drives the sequence `CAP LS 302 -> (possibly multi-line LS) -> CAP REQ ->
//! ACK|NAK -> [AUTHENTICATE ...] -> CAP END`. `libtiny_client::state` owns one
//! `CapState` per connection and feeds it server lines; this module only
//! knows about capability bookkeeping and SASL payload encoding, not about
//! sockets or the rest of the client state.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// SASL responses longer than this must be split across multiple
/// `AUTHENTICATE` commands (ircv3 sasl-3.2).
pub(crate) const SASL_CHUNK_SIZE: usize = 400;

/// Capabilities we know how to make use of. We only ever `CAP REQ` caps from
/// this list that the server also advertised in `CAP LS`.
const WANTED_CAPS: &[&str] = &[
    "sasl",
    "multi-prefix",
    "extended-join",
    "account-notify",
    "away-notify",
    "chghost",
    "invite-notify",
    "userhost-in-names",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaslMechanism {
    Plain,
    External,
}

impl SaslMechanism {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::External => "EXTERNAL",
        }
    }
}

/// Where we are in the negotiation. `state.rs` drives transitions; this type
/// just remembers enough to know what to do next.
#[derive(Debug)]
pub(crate) enum CapState {
    /// `CAP LS 302` not sent yet.
    Idle,
    /// Accumulating (possibly multi-line) `CAP LS` results.
    LsPending { caps: Vec<String> },
    /// Sent `CAP REQ`, waiting for ACK/NAK.
    ReqSent { requested: Vec<String> },
    /// Negotiating SASL; `CAP END` is deferred until this resolves.
    Authenticating { mechanism: SaslMechanism },
    /// `CAP END` sent, negotiation over for this connection.
    Done,
}

impl Default for CapState {
    fn default() -> CapState {
        CapState::Idle
    }
}

/// Pick the caps to `CAP REQ` out of what the server advertised in `LS`.
/// `sasl` is only requested when the user configured SASL credentials.
pub(crate) fn select_caps(offered: &[String], sasl_configured: bool) -> Vec<String> {
    WANTED_CAPS
        .iter()
        .filter(|cap| **cap != "sasl" || sasl_configured)
        .filter(|cap| offered.iter().any(|o| o == *cap))
        .map(|cap| (*cap).to_owned())
        .collect()
}

pub(crate) fn encode_plain(username: &str, password: &str) -> String {
    let payload = format!("{}\0{}\0{}", username, username, password);
    BASE64.encode(payload.as_bytes())
}

pub(crate) fn encode_external() -> String {
    // Empty response: the server authenticates us via the TLS client cert.
    "+".to_owned()
}

/// Split a base64-encoded SASL response into `AUTHENTICATE` chunks. A
/// trailing chunk that happens to be exactly `SASL_CHUNK_SIZE` bytes must be
/// followed by an empty chunk so the server knows the response is complete.
pub(crate) fn chunk_response(encoded: &str) -> Vec<&str> {
    if encoded.is_empty() {
        return vec![""];
    }
    let mut chunks: Vec<&str> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect();
    if chunks.last().map(|c| c.len()) == Some(SASL_CHUNK_SIZE) {
        chunks.push("");
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_caps_filters_by_offer_and_sasl_config() {
        let offered = vec![
            "multi-prefix".to_owned(),
            "sasl".to_owned(),
            "server-time".to_owned(), // not in WANTED_CAPS
        ];
        assert_eq!(
            select_caps(&offered, true),
            vec!["sasl".to_owned(), "multi-prefix".to_owned()]
        );
        assert_eq!(select_caps(&offered, false), vec!["multi-prefix".to_owned()]);
    }

    #[test]
    fn encode_plain_matches_rfc4616_layout() {
        let encoded = encode_plain("alice", "hunter2");
        let decoded = BASE64.decode(&encoded).unwrap();
        assert_eq!(decoded, b"alice\0alice\0hunter2");
    }

    #[test]
    fn chunk_response_appends_empty_chunk_on_exact_boundary() {
        let long = "a".repeat(SASL_CHUNK_SIZE);
        let chunks = chunk_response(&long);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), SASL_CHUNK_SIZE);
        assert_eq!(chunks[1], "");
    }

    #[test]
    fn chunk_response_short_is_single_chunk() {
        assert_eq!(chunk_response("short"), vec!["short"]);
    }
}
