use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("ambiguous alphabet, symbol {0:?} appears more than once")]
    AmbiguousAlphabet(char),
    #[error("alphabet needs at least two symbols")]
    AlphabetTooSmall,
    #[error("invalid symbol {0:?}")]
    InvalidSymbol(char),
    #[error("invalid key length {0}, expected 32 bytes")]
    BadKeyLength(usize),
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid token version")]
    InvalidTokenVersion,
    #[error("token authentication failed")]
    Authentication,
    #[error("token expired")]
    Expired,
    #[error("encryption failure")]
    Crypto,
    #[error("payload of {0} bytes is too large")]
    PayloadTooLarge(usize),
    #[error("timestamp {0} out of range")]
    TimestampOutOfRange(i64),
}
