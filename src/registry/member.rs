//! Member types.

use crate::clock::{unix_now, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of ids handed to members admitted by invite.
pub const CITIZEN_PREFIX: &str = "user-";

/// Opaque unique member identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for the `n`th registered member (1-based).
    pub fn citizen(n: usize) -> Self {
        Self(format!("{}{}", CITIZEN_PREFIX, n))
    }

    /// Whether `text` contains something shaped like a citizen id
    /// (`user-<digit>...`, any case).
    pub fn mentioned_in(text: &str) -> bool {
        let lowered = text.to_ascii_lowercase();
        lowered.match_indices(CITIZEN_PREFIX).any(|(i, prefix)| {
            lowered[i + prefix.len()..].starts_with(|c: char| c.is_ascii_digit())
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public fragment of this id, safe for the audit log.
    ///
    /// The portion after the first `-` followed by `***` (`user-7` -> `7***`).
    /// Ids without a `-` keep their first half. Never yields the full id.
    pub fn masked(&self) -> String {
        let visible = match self.0.split_once('-') {
            Some((_, rest)) if !rest.is_empty() => rest,
            _ => {
                let half = self.0.chars().count() / 2;
                let end = self
                    .0
                    .char_indices()
                    .nth(half)
                    .map(|(i, _)| i)
                    .unwrap_or(self.0.len());
                &self.0[..end]
            }
        };
        format!("{}***", visible)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Member role in the trust graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Root-of-trust authority provisioned at bootstrap.
    Seed,
    /// Member admitted through an invite code.
    Citizen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Suspended,
}

/// A member of the trust network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub role: Role,
    /// Admitting member. `None` only for seeds.
    pub invited_by: Option<MemberId>,
    pub remaining_invite_quota: u32,
    pub joined_at: Timestamp,
    pub status: MemberStatus,
}

impl Member {
    /// Create a seed member (no inviter).
    pub fn seed(id: MemberId, name: String, quota: u32) -> Self {
        Self {
            id,
            name,
            role: Role::Seed,
            invited_by: None,
            remaining_invite_quota: quota,
            joined_at: unix_now(),
            status: MemberStatus::Active,
        }
    }

    /// Create a citizen admitted by `inviter`.
    pub fn citizen(id: MemberId, name: String, inviter: MemberId, quota: u32) -> Self {
        Self {
            id,
            name,
            role: Role::Citizen,
            invited_by: Some(inviter),
            remaining_invite_quota: quota,
            joined_at: unix_now(),
            status: MemberStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    pub fn is_seed(&self) -> bool {
        self.role == Role::Seed
    }
}
