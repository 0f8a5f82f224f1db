//! Application layer - The consuming-context facade.
//!
//! `RealtimeSync` wires one dispatch registry to one connection manager
//! and exposes the operations a UI or business module calls.

mod realtime_sync;

pub use realtime_sync::RealtimeSync;
