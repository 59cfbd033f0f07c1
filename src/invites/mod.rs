//! Invite Issuer
//!
//! Mints batches of single-use invite codes, unique across the whole system.

pub mod code;
pub mod ledger;

#[cfg(test)]
mod proptests;

pub use code::{CodeGenerator, InviteCode, RandomCodeGenerator, SequenceCodeGenerator};
pub use ledger::{InviteLedger, MAX_DRAW_ATTEMPTS};
