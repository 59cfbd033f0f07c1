//! Invite codes and code generation.

use crate::clock::{unix_now, Timestamp};
use crate::registry::MemberId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of the random token appended to the owner prefix.
pub const TOKEN_LENGTH: usize = 6;

/// Unambiguous uppercase alphabet (no 0/O, 1/I).
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Single-use invite code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCode {
    pub code: String,
    /// Member who owns the code and may hand it out.
    pub issuer: MemberId,
    pub used: bool,
    /// Set exactly once, on redemption.
    pub redeemed_by: Option<MemberId>,
    pub issued_at: Timestamp,
}

impl InviteCode {
    pub fn new(code: String, issuer: MemberId) -> Self {
        Self {
            code,
            issuer,
            used: false,
            redeemed_by: None,
            issued_at: unix_now(),
        }
    }
}

/// Source of candidate code strings.
///
/// Generators only propose codes; uniqueness is checked by the ledger, which
/// re-draws on collision.
pub trait CodeGenerator: Send + Sync {
    fn generate(&mut self, owner: &MemberId) -> String;
}

/// Random `<OWNER>-<TOKEN>` codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&mut self, owner: &MemberId) -> String {
        let mut rng = rand::thread_rng();
        let token: String = (0..TOKEN_LENGTH)
            .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
            .collect();
        format!("{}-{}", owner.as_str().to_uppercase(), token)
    }
}

/// Replays a fixed list of codes, then repeats the last one.
///
/// Used to force collisions in tests and demos.
#[derive(Debug, Clone)]
pub struct SequenceCodeGenerator {
    codes: Vec<String>,
    next: usize,
}

impl SequenceCodeGenerator {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }
}

impl CodeGenerator for SequenceCodeGenerator {
    fn generate(&mut self, owner: &MemberId) -> String {
        let code = self
            .codes
            .get(self.next)
            .or_else(|| self.codes.last())
            .cloned()
            .unwrap_or_else(|| owner.as_str().to_uppercase());
        self.next += 1;
        code
    }
}
