//! Membership registry aggregate.
//!
//! Holds members in admission order together with the invite edge that
//! admitted each one. Edges are written once on insert and never mutated.

use super::graph::TrustGraph;
use super::member::{Member, MemberId, MemberStatus, Role};
use crate::error::{TrustError, TrustResult};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct MembershipRegistry {
    /// Members in insertion order (public trust-graph display order).
    members: Vec<Member>,
    /// member id -> position in `members`
    index: HashMap<MemberId, usize>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, id: &MemberId) -> Option<&Member> {
        self.index.get(id).map(|&i| &self.members[i])
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.index.contains_key(id)
    }

    /// Look up a member, failing with `UnknownMember`.
    pub fn require(&self, id: &MemberId) -> TrustResult<&Member> {
        self.get(id).ok_or_else(|| TrustError::UnknownMember(id.to_string()))
    }

    /// Look up a member that is allowed to act (vote, issue codes).
    pub fn require_active(&self, id: &MemberId) -> TrustResult<&Member> {
        let member = self.require(id)?;
        if !member.is_active() {
            return Err(TrustError::MemberSuspended(id.to_string()));
        }
        Ok(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// All members in insertion order.
    pub fn list(&self) -> Vec<Member> {
        self.members.clone()
    }

    /// Identifier the next admitted citizen will receive.
    ///
    /// `user-<n>` with `n` the registry size after insertion, bumped past any
    /// id already taken.
    pub fn next_citizen_id(&self) -> MemberId {
        let mut n = self.members.len() + 1;
        loop {
            let id = MemberId::citizen(n);
            if !self.contains(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Insert a member, checking the edge invariants.
    pub fn insert(&mut self, member: Member) -> TrustResult<()> {
        self.validate_new(&member)?;
        self.index.insert(member.id.clone(), self.members.len());
        self.members.push(member);
        Ok(())
    }

    /// Check that `member` may be inserted without changing anything.
    ///
    /// Seeds must have no inviter; citizens must reference an existing member.
    pub fn validate_new(&self, member: &Member) -> TrustResult<()> {
        if self.contains(&member.id) {
            return Err(TrustError::invariant(format!(
                "member id {} already registered",
                member.id
            )));
        }

        match (&member.role, &member.invited_by) {
            (Role::Seed, None) => {}
            (Role::Seed, Some(inviter)) => {
                return Err(TrustError::invariant(format!(
                    "seed {} cannot have an inviter ({})",
                    member.id, inviter
                )));
            }
            (Role::Citizen, Some(inviter)) if self.contains(inviter) => {}
            (Role::Citizen, Some(inviter)) => {
                return Err(TrustError::invariant(format!(
                    "inviter {} of {} is not registered",
                    inviter, member.id
                )));
            }
            (Role::Citizen, None) => {
                return Err(TrustError::invariant(format!(
                    "citizen {} has no inviter",
                    member.id
                )));
            }
        }

        Ok(())
    }

    /// Consume one unit of an issuer's invite quota (saturating).
    pub fn consume_quota(&mut self, id: &MemberId) -> TrustResult<u32> {
        let member = self.get_mut(id)?;
        member.remaining_invite_quota = member.remaining_invite_quota.saturating_sub(1);
        Ok(member.remaining_invite_quota)
    }

    /// Change a member's status. The only mutation allowed after insert
    /// besides quota accounting.
    pub fn set_status(&mut self, id: &MemberId, status: MemberStatus) -> TrustResult<Member> {
        let member = self.get_mut(id)?;
        member.status = status;
        Ok(member.clone())
    }

    /// Direct invitees of a member, in admission order.
    pub fn invitees(&self, id: &MemberId) -> TrustResult<Vec<Member>> {
        self.require(id)?;
        Ok(self
            .members
            .iter()
            .filter(|m| m.invited_by.as_ref() == Some(id))
            .cloned()
            .collect())
    }

    /// Path from `id` up to its seed root, starting with `id` itself.
    pub fn lineage(&self, id: &MemberId) -> TrustResult<Vec<MemberId>> {
        let mut path = vec![self.require(id)?.id.clone()];
        let mut seen: HashSet<&MemberId> = HashSet::new();
        let mut current = self.require(id)?;
        seen.insert(&current.id);

        while let Some(inviter) = &current.invited_by {
            if !seen.insert(inviter) {
                return Err(TrustError::invariant(format!(
                    "cycle in trust graph at {}",
                    inviter
                )));
            }
            current = self.get(inviter).ok_or_else(|| {
                TrustError::invariant(format!("dangling invite edge to {}", inviter))
            })?;
            path.push(current.id.clone());
        }

        if !current.is_seed() {
            return Err(TrustError::invariant(format!(
                "{} has no inviter but is not a seed",
                current.id
            )));
        }

        Ok(path)
    }

    /// Verify the trust graph is a forest rooted at seeds.
    pub fn verify_forest(&self) -> TrustResult<()> {
        TrustGraph::build(&self.members)?.verify()
    }

    /// Rebuild a registry from members in insertion order (snapshot restore).
    pub fn from_members(members: Vec<Member>) -> TrustResult<Self> {
        let mut registry = Self::new();
        for member in members {
            registry.insert(member)?;
        }
        registry.verify_forest()?;
        Ok(registry)
    }

    fn get_mut(&mut self, id: &MemberId) -> TrustResult<&mut Member> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.members[i]),
            None => Err(TrustError::UnknownMember(id.to_string())),
        }
    }
}
