//! Invite ledger: every code ever issued, keyed by code string.
//!
//! Codes are never removed, only flagged used. Batches are drawn against the
//! full ledger before anything is inserted, so a failed batch leaves the
//! ledger untouched.

use super::code::{CodeGenerator, InviteCode, RandomCodeGenerator};
use crate::error::{TrustError, TrustResult};
use crate::registry::MemberId;
use std::collections::{HashMap, HashSet};

/// Draws allowed per code before the generator is considered exhausted.
pub const MAX_DRAW_ATTEMPTS: usize = 64;

pub struct InviteLedger {
    /// Codes in issue order.
    codes: Vec<InviteCode>,
    /// code string -> position in `codes`
    index: HashMap<String, usize>,
    generator: Box<dyn CodeGenerator>,
}

impl InviteLedger {
    pub fn new(generator: Box<dyn CodeGenerator>) -> Self {
        Self {
            codes: Vec::new(),
            index: HashMap::new(),
            generator,
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&InviteCode> {
        self.index.get(code).map(|&i| &self.codes[i])
    }

    /// An existing, unused code. `InvalidCode` otherwise.
    pub fn find_unused(&self, code: &str) -> TrustResult<&InviteCode> {
        match self.get(code) {
            Some(invite) if !invite.used => Ok(invite),
            _ => Err(TrustError::InvalidCode),
        }
    }

    /// Draw `count` fresh codes for `owner` without inserting them.
    ///
    /// `reserved` are codes already staged for the same batch (seed presets).
    pub fn draw_batch(
        &mut self,
        owner: &MemberId,
        count: usize,
        reserved: &[InviteCode],
    ) -> TrustResult<Vec<InviteCode>> {
        let mut staged: HashSet<String> = reserved.iter().map(|c| c.code.clone()).collect();
        let mut batch = Vec::with_capacity(count);

        for _ in 0..count {
            let mut drawn = None;
            for _ in 0..MAX_DRAW_ATTEMPTS {
                let candidate = self.generator.generate(owner);
                if !self.contains(&candidate) && !staged.contains(&candidate) {
                    drawn = Some(candidate);
                    break;
                }
                tracing::debug!(owner = %owner, "invite code collision, re-drawing");
            }

            let code = drawn.ok_or_else(|| {
                TrustError::invariant(format!(
                    "no unique invite code for {} after {} draws",
                    owner, MAX_DRAW_ATTEMPTS
                ))
            })?;
            staged.insert(code.clone());
            batch.push(InviteCode::new(code, owner.clone()));
        }

        Ok(batch)
    }

    /// Insert a staged batch. All-or-nothing: any duplicate rejects the
    /// whole batch.
    pub fn insert_batch(&mut self, batch: Vec<InviteCode>) -> TrustResult<()> {
        self.validate_batch(&batch)?;
        for invite in batch {
            self.index.insert(invite.code.clone(), self.codes.len());
            self.codes.push(invite);
        }
        Ok(())
    }

    /// Check that `batch` may be inserted without changing anything.
    pub fn validate_batch(&self, batch: &[InviteCode]) -> TrustResult<()> {
        let mut seen = HashSet::with_capacity(batch.len());
        for invite in batch {
            if self.contains(&invite.code) || !seen.insert(invite.code.as_str()) {
                return Err(TrustError::invariant(format!(
                    "duplicate invite code {}",
                    invite.code
                )));
            }
        }
        Ok(())
    }

    /// Draw and insert `count` codes for `owner`.
    pub fn issue_batch(&mut self, owner: &MemberId, count: usize) -> TrustResult<Vec<InviteCode>> {
        let batch = self.draw_batch(owner, count, &[])?;
        self.insert_batch(batch.clone())?;
        Ok(batch)
    }

    /// Flag a code used by `member`. The `unused -> used` transition happens
    /// once; a second attempt is `InvalidCode`.
    pub fn mark_redeemed(&mut self, code: &str, member: &MemberId) -> TrustResult<InviteCode> {
        let &i = self.index.get(code).ok_or(TrustError::InvalidCode)?;
        let invite = &mut self.codes[i];
        if invite.used {
            return Err(TrustError::InvalidCode);
        }
        invite.used = true;
        invite.redeemed_by = Some(member.clone());
        Ok(invite.clone())
    }

    /// Codes owned by `member`, in issue order.
    pub fn owned_by(&self, member: &MemberId) -> Vec<InviteCode> {
        self.codes
            .iter()
            .filter(|c| &c.issuer == member)
            .cloned()
            .collect()
    }

    /// All codes in issue order, borrowed.
    pub fn codes(&self) -> &[InviteCode] {
        &self.codes
    }

    /// All codes in issue order.
    pub fn list(&self) -> Vec<InviteCode> {
        self.codes.clone()
    }

    /// Rebuild a ledger from stored codes (snapshot restore).
    pub fn from_codes(
        codes: Vec<InviteCode>,
        generator: Box<dyn CodeGenerator>,
    ) -> TrustResult<Self> {
        let mut ledger = Self::new(generator);
        for invite in &codes {
            if invite.used != invite.redeemed_by.is_some() {
                return Err(TrustError::invariant(format!(
                    "invite code {} has inconsistent redemption state",
                    invite.code
                )));
            }
        }
        ledger.insert_batch(codes)?;
        Ok(ledger)
    }
}

impl Default for InviteLedger {
    fn default() -> Self {
        Self::new(Box::new(RandomCodeGenerator))
    }
}
