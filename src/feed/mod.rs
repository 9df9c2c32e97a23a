//! Camera event feeds: authenticated streaming HTTP, line framing, and the
//! per-camera reconnect loop.

pub mod client;
pub mod digest;
pub mod framing;
pub mod listener;


pub use client::{FeedClient, FeedStream};
pub use digest::{Challenge, DigestChallenge};
pub use framing::{LineSplitter, StreamBuffer};
pub use listener::{ListenerState, ListenerStats, ListenerStatsSnapshot, StreamListener};
