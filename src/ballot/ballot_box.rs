//! Ballot box aggregate.
//!
//! Per member: NotVoted -> Voted (terminal, no reversal). The vote and its
//! audit record are written together; a refused ballot changes nothing.

use super::audit::{query_audit_log, verify_audit_chain, AuditQuery, AuditRecord};
use super::poll::{CandidateId, Poll};
use crate::error::{TrustError, TrustResult};
use crate::registry::{Member, MemberId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cast vote. Private: only tallies and the anonymised audit log leave
/// the ballot box through public reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub poll_id: u64,
    pub member_id: MemberId,
    pub candidate_id: CandidateId,
}

/// Vote count for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub votes: u64,
}

#[derive(Debug, Clone)]
pub struct BallotBox {
    poll: Poll,
    /// member -> chosen candidate
    votes: HashMap<MemberId, CandidateId>,
    /// Voters in casting order (for stable snapshots).
    voters: Vec<MemberId>,
    /// Audit records in append order.
    audit_log: Vec<AuditRecord>,
}

impl BallotBox {
    pub fn new(poll: Poll) -> Self {
        Self {
            poll,
            votes: HashMap::new(),
            voters: Vec::new(),
            audit_log: Vec::new(),
        }
    }

    pub fn poll(&self) -> &Poll {
        &self.poll
    }

    pub fn has_voted(&self, member: &MemberId) -> bool {
        self.votes.contains_key(member)
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Record `voter`'s ballot and append its audit record.
    ///
    /// The caller has already checked that the voter is a registered, active
    /// member.
    pub fn cast_vote(&mut self, voter: &Member, candidate: CandidateId) -> TrustResult<AuditRecord> {
        let (vote, record) = self.prepare_vote(voter, candidate)?;
        self.commit_vote(vote, record.clone());
        Ok(record)
    }

    /// Check a ballot and build its vote and audit record without
    /// recording anything.
    pub fn prepare_vote(
        &self,
        voter: &Member,
        candidate: CandidateId,
    ) -> TrustResult<(Vote, AuditRecord)> {
        if !self.poll.is_open() {
            return Err(TrustError::PollClosed);
        }
        if self.has_voted(&voter.id) {
            return Err(TrustError::AlreadyVoted);
        }
        if self.poll.candidate(candidate).is_none() {
            return Err(TrustError::UnknownCandidate(candidate));
        }

        let record = AuditRecord::participation(
            voter,
            self.audit_log.len() as u64,
            self.audit_log.last(),
        );
        let vote = Vote {
            poll_id: self.poll.id,
            member_id: voter.id.clone(),
            candidate_id: candidate,
        };
        Ok((vote, record))
    }

    /// Record a ballot built by `prepare_vote` with no intervening change.
    pub fn commit_vote(&mut self, vote: Vote, record: AuditRecord) {
        self.votes.insert(vote.member_id.clone(), vote.candidate_id);
        self.voters.push(vote.member_id);
        self.audit_log.push(record);
    }

    /// Number of votes for `candidate` (0 for unknown candidates).
    pub fn tally(&self, candidate: CandidateId) -> u64 {
        self.votes.values().filter(|&&c| c == candidate).count() as u64
    }

    /// Tallies for every candidate, in poll order.
    pub fn results(&self) -> Vec<Tally> {
        self.poll
            .candidates
            .iter()
            .map(|c| Tally {
                candidate_id: c.id,
                candidate_name: c.name.clone(),
                votes: self.tally(c.id),
            })
            .collect()
    }

    /// Public audit log, newest first.
    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit_log.iter().rev().cloned().collect()
    }

    pub fn query_audit(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        query_audit_log(&self.audit_log, query)
    }

    /// Audit records in append order.
    pub fn audit_records(&self) -> &[AuditRecord] {
        &self.audit_log
    }

    pub fn verify_audit_chain(&self) -> TrustResult<()> {
        verify_audit_chain(&self.audit_log)
    }

    /// Stop accepting ballots. Tallies remain readable.
    pub fn close(&mut self) {
        self.poll.status = super::poll::PollStatus::Closed;
    }

    /// Votes in casting order.
    pub fn votes(&self) -> Vec<Vote> {
        self.voters
            .iter()
            .map(|member| Vote {
                poll_id: self.poll.id,
                member_id: member.clone(),
                candidate_id: self.votes[member],
            })
            .collect()
    }

    /// Rebuild from stored votes and audit records (snapshot restore).
    pub fn from_parts(poll: Poll, votes: Vec<Vote>, audit_log: Vec<AuditRecord>) -> TrustResult<Self> {
        verify_audit_chain(&audit_log)?;
        if votes.len() != audit_log.len() {
            return Err(TrustError::invariant(format!(
                "{} votes but {} audit records",
                votes.len(),
                audit_log.len()
            )));
        }

        let mut ballot = Self::new(poll);
        for vote in votes {
            if vote.poll_id != ballot.poll.id {
                return Err(TrustError::invariant(format!(
                    "vote by {} belongs to poll {}",
                    vote.member_id, vote.poll_id
                )));
            }
            if ballot.poll.candidate(vote.candidate_id).is_none() {
                return Err(TrustError::invariant(format!(
                    "vote by {} for unknown candidate {}",
                    vote.member_id, vote.candidate_id
                )));
            }
            if ballot.votes.insert(vote.member_id.clone(), vote.candidate_id).is_some() {
                return Err(TrustError::invariant(format!(
                    "member {} voted more than once",
                    vote.member_id
                )));
            }
            ballot.voters.push(vote.member_id);
        }
        ballot.audit_log = audit_log;

        Ok(ballot)
    }
}
