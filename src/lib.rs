//! # Tessera (passwordless identity credentials)
//!
//! `tessera` proves control of an email address instead of asking for a
//! password, then hands out session tokens that authorize later requests.
//!
//! ## Tokens
//!
//! Both credential kinds share one envelope: a version byte, a big-endian
//! issue timestamp and a random nonce, followed by the `XChaCha20-Poly1305`
//! ciphertext of the payload (the identity's storage key). The header is bound
//! as associated data. The envelope is rendered as base62 text.
//!
//! - **Verifiers** are short lived (about 15 minutes), stored on the identity and
//!   accepted exactly once. Issuing a new one supersedes the previous link.
//! - **Sessions** are valid while their issue timestamp is recorded on the
//!   identity and inside a one week sliding window. Tokens that expire within
//!   48 hours are silently renewed. Logout removes the recorded timestamp.
//!
//! ## Abuse protection
//!
//! Verifier emails are rate limited per address. Callers that keep trying past
//! the quota push their own window further out, up to a configured ceiling.

pub mod api;
pub mod auth;
pub mod cli;
pub mod codec;
pub mod email;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
