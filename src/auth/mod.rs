//! Passwordless credential lifecycle.
//!
//! A login mails a single-use verifier; consuming it yields a session token
//! that is validated, silently renewed and revoked by the session engine.

pub mod clock;
mod error;
pub mod rate_limit;
pub mod session;
pub mod state;
pub(crate) mod utils;
pub mod verification;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::error::AuthError;
pub use self::rate_limit::{RateLimitDecision, RateLimiter};
pub use self::session::{Authenticated, SessionEngine, ValidSession};
pub use self::state::{AuthConfig, AuthKeys, AuthState, RateLimitConfig};
pub use self::verification::{LoginOutcome, VerificationEngine};
