//! TrustChain - invite-tree trust network
//!
//! Admission is by single-use invite code only, so every member traces back
//! through an unbroken chain of invites to a seed member. Members cast one
//! vote per poll and the public activity log shows participation without
//! revealing ballot content.
//!
//! Key principles:
//! - The trust graph is a forest: edges are immutable once created
//! - Every invite code is unique system-wide and redeemable once
//! - One vote per member per poll
//! - Audit records name participants, never their choices

pub mod api;
pub mod ballot;
pub mod clock;
pub mod error;
pub mod invites;
pub mod network;
pub mod persistence;
pub mod registry;

pub use error::{TrustError, TrustResult};
pub use network::{NetworkConfig, NetworkSnapshot, PollConfig, StateChange, TrustNetwork};
