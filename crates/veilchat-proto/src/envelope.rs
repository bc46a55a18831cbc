//! Message frame and encrypted payload layout.
//!
//! One message per connection, no length prefix — the connection close
//! is the frame boundary, and readers bound the total byte count. The
//! wire layout is:
//!
//! ```text
//! <convo_id_hex>\n          cleartext header, selects the chat key
//! <ciphertext bytes...>     sealed payload, runs to connection close
//! ```
//!
//! Attribution does not depend on transport-layer addressing: the
//! sender's identity travels **inside** the sealed payload as
//! `<sender_username>\n<body>`, and the cleartext header is bound to
//! the ciphertext as AEAD associated data. A frame whose header was
//! swapped onto foreign ciphertext fails integrity before any payload
//! is trusted.

use veilchat_types::{ConvoId, Result, Username, VeilchatError};

// ---------------------------------------------------------------------------
// MessageFrame
// ---------------------------------------------------------------------------

/// The cleartext-framed message as read from or written to the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageFrame {
    /// Conversation the ciphertext belongs to.
    pub convo_id: ConvoId,
    /// Sealed payload bytes (nonce + ciphertext + tag).
    pub ciphertext: Vec<u8>,
}

impl MessageFrame {
    /// Encodes the frame for the wire.
    pub fn encode(&self) -> Vec<u8> {
        let header = format!("{}\n", self.convo_id);
        let mut out = Vec::with_capacity(header.len() + self.ciphertext.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Decodes a frame from raw connection bytes.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Protocol`] if the header line is missing, not
    /// UTF-8, or not a valid conversation id.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let newline = bytes.iter().position(|&b| b == b'\n').ok_or_else(|| {
            VeilchatError::Protocol {
                reason: "message frame missing header line".into(),
            }
        })?;

        let header =
            std::str::from_utf8(&bytes[..newline]).map_err(|_| VeilchatError::Protocol {
                reason: "message frame header is not UTF-8".into(),
            })?;
        let convo_id: ConvoId = header.trim_end_matches('\r').parse()?;

        Ok(Self {
            convo_id,
            ciphertext: bytes[newline + 1..].to_vec(),
        })
    }

    /// Associated data binding this frame's header to its ciphertext.
    pub fn aad(convo_id: &ConvoId) -> Vec<u8> {
        convo_id.to_string().into_bytes()
    }
}

// ---------------------------------------------------------------------------
// MessagePayload
// ---------------------------------------------------------------------------

/// The plaintext layout inside the sealed frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessagePayload {
    /// Sender's self-declared username. Trustworthy only insofar as it
    /// was sealed under the conversation key both parties share.
    pub sender: Username,
    /// Message body.
    pub body: Vec<u8>,
}

impl MessagePayload {
    /// Encodes the payload for sealing.
    pub fn encode(&self) -> Vec<u8> {
        let header = format!("{}\n", self.sender);
        let mut out = Vec::with_capacity(header.len() + self.body.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Decodes an opened (decrypted) payload.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Protocol`] if the sender line is missing or
    /// invalid.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let newline = bytes.iter().position(|&b| b == b'\n').ok_or_else(|| {
            VeilchatError::Protocol {
                reason: "message payload missing sender line".into(),
            }
        })?;

        let sender =
            std::str::from_utf8(&bytes[..newline]).map_err(|_| VeilchatError::Protocol {
                reason: "message payload sender is not UTF-8".into(),
            })?;

        Ok(Self {
            sender: sender.parse()?,
            body: bytes[newline + 1..].to_vec(),
        })
    }

    /// Returns the body as UTF-8 text, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
