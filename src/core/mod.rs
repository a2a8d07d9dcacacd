//! # Core Module
//!
//! The `core` module contains the protocol internals: the membership table and the state
//! machine guarding it, the broadcast queue, failure detection, gossip dissemination,
//! anti-entropy, suspicion reaping, inbound message handling, the transport and cipher
//! abstractions, and the node tying them together.
pub(crate) mod broadcast;
pub(crate) mod crypto;
pub(crate) mod detection;
mod disseminate;
pub(crate) mod event;
pub(crate) mod member;
mod message;
pub(crate) mod node;
pub(crate) mod reaper;
pub(crate) mod shutdown;
pub(crate) mod state;
mod sync;
pub(crate) mod transport;
pub(crate) mod utils;
