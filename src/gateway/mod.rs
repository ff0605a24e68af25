//! Gateway pipeline.
//!
//! # Responsibilities
//! - Sequence sanitizer, authenticator, rate limiter, cache, release source
//!   and signer into one request lifecycle
//! - Map every terminal outcome to a `GatewayError` or a served payload
//! - Audit each request exactly once
//!
//! # Design Decisions
//! - Validation runs before authentication and is not rate limited
//! - A failed authentication still consumes the caller's anonymous key; an
//!   exhausted key answers 429 rather than 401
//! - Cache writes and audit records happen only after the fetch completes,
//!   so a dropped request leaves neither behind

pub mod error;
pub mod pipeline;

pub use error::GatewayError;
pub use pipeline::{Gateway, Outcome, RequestContext, ResourceRequest, Served};
