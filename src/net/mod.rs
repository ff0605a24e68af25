//! Network layer subsystem.
//!
//! Plain TCP listeners come straight from Tokio; this module only prepares
//! the optional TLS acceptor. Client certificates are not requested at the
//! TLS layer: they arrive in a request header from the terminating proxy.

pub mod tls;
