//! Versioned authenticated-encryption tokens.
//!
//! Binary layout before text encoding:
//!
//! ```text
//! version (1) || issued_at u32 big-endian (4) || nonce (24) || ciphertext || tag (16)
//! ```
//!
//! The 29 header bytes are bound to the ciphertext as associated data, so any
//! change to the timestamp or nonce fails authentication.

use super::{Error, basen::Alphabet};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

pub const VERSION: u8 = 0xBA;
pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + 4 + NONCE_LEN;
const MIN_DECODED_LEN: usize = HEADER_LEN + TAG_LEN;
/// Largest payload accepted, far above a 26 character identity key.
pub const MAX_PAYLOAD_LEN: usize = 256;

/// A decoded, authenticated token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub payload: String,
    pub issued_at: i64,
    /// `None` when the codec has no TTL.
    pub expires_at: Option<i64>,
}

impl Token {
    /// True when the token stops being valid before `instant`.
    #[must_use]
    pub fn expires_before(&self, instant: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < instant)
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    cipher: XChaCha20Poly1305,
    alphabet: Alphabet,
    ttl_seconds: u32,
    min_text_len: usize,
    max_text_len: usize,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &"[REDACTED]")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// # Errors
    /// Returns `Error::BadKeyLength` unless the key is exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        Self::with_alphabet(key, Alphabet::base62())
    }

    /// # Errors
    /// Returns `Error::BadKeyLength` unless the key is exactly 32 bytes.
    pub fn with_alphabet(key: &[u8], alphabet: Alphabet) -> Result<Self, Error> {
        if key.len() != KEY_LEN {
            return Err(Error::BadKeyLength(key.len()));
        }
        let cipher =
            XChaCha20Poly1305::new_from_slice(key).map_err(|_| Error::BadKeyLength(key.len()))?;

        // shortest possible envelope: version byte followed by zeros
        let mut smallest = [0u8; MIN_DECODED_LEN];
        smallest[0] = VERSION;
        let min_text_len = alphabet.encode(&smallest).chars().count();
        // largest envelope: every byte 0xff with a maximal payload
        let largest = [0xffu8; MIN_DECODED_LEN + MAX_PAYLOAD_LEN];
        let max_text_len = alphabet.encode(&largest).chars().count();

        Ok(Self {
            cipher,
            alphabet,
            ttl_seconds: 0,
            min_text_len,
            max_text_len,
        })
    }

    /// Enforce a time-to-live on decode, `0` disables expiry.
    #[must_use]
    pub fn with_ttl(mut self, seconds: u32) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> u32 {
        self.ttl_seconds
    }

    /// Length of the shortest valid token text, the encoding of a version byte
    /// followed by zeros. Derived from the alphabet rather than fixed at 62,
    /// so base62 empty-payload tokens (61 symbols) still decode.
    #[must_use]
    pub fn min_text_len(&self) -> usize {
        self.min_text_len
    }

    /// Length of the longest token text `decode` will look at.
    #[must_use]
    pub fn max_text_len(&self) -> usize {
        self.max_text_len
    }

    /// Seal `payload` with a fresh random nonce.
    ///
    /// # Errors
    /// Returns an error if the payload exceeds `MAX_PAYLOAD_LEN` bytes, the
    /// timestamp does not fit in 32 bits or sealing fails.
    pub fn encode(&self, payload: &str, issued_at: i64) -> Result<String, Error> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.try_fill_bytes(&mut nonce).map_err(|_| Error::Crypto)?;
        self.encode_with_nonce(payload, issued_at, nonce)
    }

    fn encode_with_nonce(
        &self,
        payload: &str,
        issued_at: i64,
        nonce: [u8; NONCE_LEN],
    ) -> Result<String, Error> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge(payload.len()));
        }
        let timestamp =
            u32::try_from(issued_at).map_err(|_| Error::TimestampOutOfRange(issued_at))?;

        let mut envelope = Vec::with_capacity(MIN_DECODED_LEN + payload.len());
        envelope.push(VERSION);
        envelope.extend_from_slice(&timestamp.to_be_bytes());
        envelope.extend_from_slice(&nonce);

        let sealed = self
            .cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: payload.as_bytes(),
                    aad: &envelope,
                },
            )
            .map_err(|_| Error::Crypto)?;
        envelope.extend_from_slice(&sealed);

        Ok(self.alphabet.encode(&envelope))
    }

    /// Decode against the wall clock.
    ///
    /// # Errors
    /// See [`TokenCodec::decode_at`].
    pub fn decode(&self, text: &str) -> Result<Token, Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX));
        self.decode_at(text, now)
    }

    /// Decode, authenticate and check expiry relative to `now`.
    ///
    /// A token issued at `t` with TTL `d` is still valid at exactly `t + d`.
    ///
    /// # Errors
    /// `InvalidToken` for malformed, too short or too long input,
    /// `InvalidTokenVersion` for a foreign version byte, `Authentication` when
    /// the tag does not verify and `Expired` when the TTL has elapsed.
    pub fn decode_at(&self, text: &str, now: i64) -> Result<Token, Error> {
        // bound the quadratic base conversion before doing any of it
        let length = text.chars().count();
        if length < self.min_text_len || length > self.max_text_len {
            return Err(Error::InvalidToken);
        }

        let envelope = self
            .alphabet
            .decode(text)
            .map_err(|_| Error::InvalidToken)?;
        if envelope.len() < MIN_DECODED_LEN {
            return Err(Error::InvalidToken);
        }
        if envelope[0] != VERSION {
            return Err(Error::InvalidTokenVersion);
        }

        let (header, sealed) = envelope.split_at(HEADER_LEN);
        let opened = self
            .cipher
            .decrypt(
                XNonce::from_slice(&header[5..]),
                Payload {
                    msg: sealed,
                    aad: header,
                },
            )
            .map_err(|_| Error::Authentication)?;
        let payload = String::from_utf8(opened).map_err(|_| Error::InvalidToken)?;

        let issued_at = i64::from(u32::from_be_bytes([
            header[1], header[2], header[3], header[4],
        ]));
        let expires_at = (self.ttl_seconds > 0).then(|| issued_at + i64::from(self.ttl_seconds));
        if expires_at.is_some_and(|expires_at| expires_at < now) {
            return Err(Error::Expired);
        }

        Ok(Token {
            payload,
            issued_at,
            expires_at,
        })
    }
}
