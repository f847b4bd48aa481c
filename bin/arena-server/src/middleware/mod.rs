//! HTTP middleware stack: CORS, pre-flight, per-request tracing and the
//! service-key guard for session writes.

pub mod auth;
pub mod cors;
pub mod trace;
