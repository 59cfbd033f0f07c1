//! Ballot Box
//!
//! One vote per member in the active poll, tallies, and the public
//! participation log. Vote content never reaches the audit log.

pub mod audit;
pub mod ballot_box;
pub mod poll;

pub use audit::{format_audit_log, AuditQuery, AuditRecord};
pub use ballot_box::{BallotBox, Tally, Vote};
pub use poll::{Candidate, CandidateId, Poll, PollStatus};
