//! Realtime Sync - Client-side real-time event bridge
//!
//! This crate keeps one persistent connection to a server's event stream,
//! re-subscribes to every topic on each (re)connect, and fans inbound
//! `{type, data}` envelopes out to handlers registered by event type or
//! under the `*` wildcard.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::RealtimeSync;
