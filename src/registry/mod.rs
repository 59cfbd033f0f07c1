//! Membership Registry
//!
//! Members of the trust network and the invite edges that admitted them.
//! The trust graph is a forest rooted at seed members.

pub mod graph;
pub mod member;
pub mod membership;

pub use graph::TrustGraph;
pub use member::{Member, MemberId, MemberStatus, Role};
pub use membership::MembershipRegistry;
