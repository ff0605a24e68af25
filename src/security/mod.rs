//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → sanitize.rs   (path and header input validation)
//!     → rate_limit.rs (per-device / per-IP quota and lockout)
//! Outgoing response:
//!     → headers.rs    (hardening headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: anything that does not validate is rejected
//! - No trust in client input; sanitizers return owned, checked values

pub mod headers;
pub mod rate_limit;
pub mod sanitize;
