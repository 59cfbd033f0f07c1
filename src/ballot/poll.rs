//! Poll and candidate definitions.

use serde::{Deserialize, Serialize};

pub type CandidateId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    #[serde(default)]
    pub occupation: String,
    /// Endorsements collected before the poll opened (display only).
    #[serde(default)]
    pub endorsements: u32,
    #[serde(default)]
    pub manifesto: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Open,
    Closed,
}

/// The single active poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: u64,
    pub title: String,
    pub candidates: Vec<Candidate>,
    pub status: PollStatus,
}

impl Poll {
    pub fn new(id: u64, title: String, candidates: Vec<Candidate>) -> Self {
        Self {
            id,
            title,
            candidates,
            status: PollStatus::Open,
        }
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn is_open(&self) -> bool {
        self.status == PollStatus::Open
    }
}
