//! Domain layer containing the bridge's value types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (event keys, envelopes, connection state, errors)

pub mod foundation;
