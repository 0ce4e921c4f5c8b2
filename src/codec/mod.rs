//! Token codec: Base-N text encoding and the versioned AEAD envelope.

pub mod basen;
mod error;
pub mod token;

pub use self::basen::{Alphabet, BASE62};
pub use self::error::Error;
pub use self::token::{Token, TokenCodec};
