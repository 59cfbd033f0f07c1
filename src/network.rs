//! Trust network service.
//!
//! Owns the three aggregates, each behind its own `RwLock`, and composes
//! them into atomic operations. Mutations take write locks in a fixed order
//! (invite ledger -> registry -> ballot box); reads take read locks.
//!
//! With a store attached, each mutation stages a `StateChange`, writes it
//! through while still holding its locks and only then commits in memory.

use crate::ballot::{
    AuditQuery, AuditRecord, BallotBox, Candidate, CandidateId, Poll, PollStatus, Tally, Vote,
};
use crate::error::{TrustError, TrustResult};
use crate::invites::{CodeGenerator, InviteCode, InviteLedger, RandomCodeGenerator};
use crate::persistence::StateStore;
use crate::registry::{Member, MemberId, MemberStatus, MembershipRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Invite quota (and batch size) for members admitted by invite.
pub const STANDARD_QUOTA: u32 = 3;

/// Invite quota (and batch size) for seed members at bootstrap.
pub const SEED_QUOTA: u32 = 5;

/// Root-of-trust member provisioned at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedMember {
    pub id: String,
    pub name: String,
    /// Fixed codes handed out before launch. They count toward the seed's
    /// bootstrap batch; the rest is drawn at random.
    #[serde(default)]
    pub codes: Vec<String>,
}

/// Trust model parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_seed_quota")]
    pub seed_quota: u32,
    #[serde(default = "default_standard_quota")]
    pub standard_quota: u32,
    #[serde(default = "default_seeds")]
    pub seeds: Vec<SeedMember>,
}

/// The active poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_title")]
    pub title: String,
    #[serde(default = "default_candidates")]
    pub candidates: Vec<Candidate>,
}

fn default_seed_quota() -> u32 {
    SEED_QUOTA
}

fn default_standard_quota() -> u32 {
    STANDARD_QUOTA
}

fn default_seeds() -> Vec<SeedMember> {
    vec![
        SeedMember {
            id: "seed-1".to_string(),
            name: "Dr. Ahmed (physician)".to_string(),
            codes: vec!["SEED-A1".to_string(), "SEED-A2".to_string()],
        },
        SeedMember {
            id: "seed-2".to_string(),
            name: "Eng. Sara".to_string(),
            codes: vec!["SEED-B1".to_string()],
        },
    ]
}

fn default_poll_title() -> String {
    "Active ballot: Local Council".to_string()
}

fn default_candidates() -> Vec<Candidate> {
    vec![
        Candidate {
            id: 1,
            name: "Omar Al-Mukhtar".to_string(),
            occupation: "Civic activist".to_string(),
            endorsements: 120,
            manifesto: "Improve infrastructure and education.".to_string(),
        },
        Candidate {
            id: 2,
            name: "Layla Khaled".to_string(),
            occupation: "Lawyer".to_string(),
            endorsements: 105,
            manifesto: "Social justice and support for small businesses.".to_string(),
        },
    ]
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            seed_quota: SEED_QUOTA,
            standard_quota: STANDARD_QUOTA,
            seeds: default_seeds(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            title: default_poll_title(),
            candidates: default_candidates(),
        }
    }
}

impl PollConfig {
    pub fn into_poll(self) -> Poll {
        Poll::new(1, self.title, self.candidates)
    }
}

/// Full network state: the four entities plus the poll definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub poll: Poll,
    pub members: Vec<Member>,
    pub codes: Vec<InviteCode>,
    pub votes: Vec<Vote>,
    pub audit_log: Vec<AuditRecord>,
}

/// The rows one successful mutation touches.
///
/// Written through to the store before the in-memory aggregates change, so
/// a refused write leaves both sides as they were.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateChange {
    /// A code was redeemed: the code now used, the new member, the issuer
    /// with its quota consumed and the new member's code batch.
    Admission {
        redeemed: InviteCode,
        member: Member,
        issuer: Member,
        batch: Vec<InviteCode>,
    },
    CodesIssued(Vec<InviteCode>),
    /// Quota or status change of an existing member.
    MemberUpdated(Member),
    VoteCast { vote: Vote, record: AuditRecord },
    PollUpdated(Poll),
}

impl NetworkSnapshot {
    /// Apply one change in place. Rows the change updates must exist.
    pub fn apply(&mut self, change: &StateChange) -> TrustResult<()> {
        match change {
            StateChange::Admission {
                redeemed,
                member,
                issuer,
                batch,
            } => {
                self.replace_code(redeemed)?;
                self.replace_member(issuer)?;
                self.members.push(member.clone());
                self.codes.extend(batch.iter().cloned());
            }
            StateChange::CodesIssued(batch) => self.codes.extend(batch.iter().cloned()),
            StateChange::MemberUpdated(member) => self.replace_member(member)?,
            StateChange::VoteCast { vote, record } => {
                self.votes.push(vote.clone());
                self.audit_log.push(record.clone());
            }
            StateChange::PollUpdated(poll) => self.poll = poll.clone(),
        }
        Ok(())
    }

    fn replace_member(&mut self, member: &Member) -> TrustResult<()> {
        let slot = self
            .members
            .iter_mut()
            .find(|m| m.id == member.id)
            .ok_or_else(|| TrustError::invariant(format!("no stored member {}", member.id)))?;
        *slot = member.clone();
        Ok(())
    }

    fn replace_code(&mut self, invite: &InviteCode) -> TrustResult<()> {
        let slot = self
            .codes
            .iter_mut()
            .find(|c| c.code == invite.code)
            .ok_or_else(|| {
                TrustError::invariant(format!("no stored invite code {}", invite.code))
            })?;
        *slot = invite.clone();
        Ok(())
    }
}

/// Counts for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub members: usize,
    pub codes_issued: usize,
    pub votes_cast: usize,
}

pub struct TrustNetwork {
    invites: RwLock<InviteLedger>,
    registry: RwLock<MembershipRegistry>,
    ballot: RwLock<BallotBox>,
    standard_quota: u32,
    /// Receives every change before it is committed in memory.
    store: Option<Arc<dyn StateStore>>,
}

impl TrustNetwork {
    /// Provision seed members and their bootstrap code batches.
    ///
    /// A seed's preset codes count toward its `seed_quota` batch; more
    /// presets than the quota is a configuration error.
    pub fn bootstrap(
        config: &NetworkConfig,
        poll: Poll,
        generator: Box<dyn CodeGenerator>,
    ) -> TrustResult<Self> {
        let mut registry = MembershipRegistry::new();
        let mut invites = InviteLedger::new(generator);

        for seed in &config.seeds {
            if seed.codes.len() > config.seed_quota as usize {
                return Err(TrustError::invariant(format!(
                    "seed {} has {} preset codes but a quota of {}",
                    seed.id,
                    seed.codes.len(),
                    config.seed_quota
                )));
            }

            let id = MemberId::new(seed.id.clone());
            registry.insert(Member::seed(id.clone(), seed.name.clone(), config.seed_quota))?;

            let mut batch: Vec<InviteCode> = seed
                .codes
                .iter()
                .map(|code| InviteCode::new(code.clone(), id.clone()))
                .collect();
            let remaining = config.seed_quota as usize - batch.len();
            let drawn = invites.draw_batch(&id, remaining, &batch)?;
            batch.extend(drawn);
            invites.insert_batch(batch)?;

            tracing::info!(seed = %id, "seed member provisioned");
        }

        Ok(Self {
            invites: RwLock::new(invites),
            registry: RwLock::new(registry),
            ballot: RwLock::new(BallotBox::new(poll)),
            standard_quota: config.standard_quota,
            store: None,
        })
    }

    /// Bootstrap with the random code generator.
    pub fn with_defaults(config: &NetworkConfig, poll: Poll) -> TrustResult<Self> {
        Self::bootstrap(config, poll, Box::new(RandomCodeGenerator))
    }

    /// Rebuild from a stored snapshot, validating every invariant.
    pub fn restore(
        snapshot: NetworkSnapshot,
        standard_quota: u32,
        generator: Box<dyn CodeGenerator>,
    ) -> TrustResult<Self> {
        let registry = MembershipRegistry::from_members(snapshot.members)?;

        for invite in &snapshot.codes {
            if !registry.contains(&invite.issuer) {
                return Err(TrustError::invariant(format!(
                    "invite code {} issued by unknown member {}",
                    invite.code, invite.issuer
                )));
            }
        }
        check_admission_edges(&registry, &snapshot.codes)?;
        let invites = InviteLedger::from_codes(snapshot.codes, generator)?;

        for vote in &snapshot.votes {
            if !registry.contains(&vote.member_id) {
                return Err(TrustError::invariant(format!(
                    "vote cast by unknown member {}",
                    vote.member_id
                )));
            }
        }
        let ballot = BallotBox::from_parts(snapshot.poll, snapshot.votes, snapshot.audit_log)?;

        tracing::info!(
            members = registry.len() as u64,
            codes = invites.len() as u64,
            votes = ballot.vote_count() as u64,
            "trust network restored"
        );

        Ok(Self {
            invites: RwLock::new(invites),
            registry: RwLock::new(registry),
            ballot: RwLock::new(ballot),
            standard_quota,
            store: None,
        })
    }

    /// Write every subsequent change through to `store`.
    ///
    /// The store must already hold this network's current state.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Hand `change` to the store. Called with the aggregate locks held and
    /// before anything is committed in memory.
    async fn write_through(&self, change: &StateChange) -> TrustResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.apply(change).await.map_err(|e| {
            tracing::error!(error = %e, "failed to write change to the store");
            TrustError::Storage(e.to_string())
        })
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Redeem an invite code on behalf of a new applicant.
    ///
    /// Lookup, check and mark happen under both the ledger and registry
    /// locks: of any number of concurrent redemptions of one code exactly one
    /// succeeds. Every check and the store write run before the first
    /// in-memory change.
    pub async fn redeem_invite(&self, code: &str, applicant_name: &str) -> TrustResult<Member> {
        let name = applicant_name.trim();
        if name.is_empty() {
            return Err(TrustError::EmptyName);
        }
        // Names are shown next to the masked voter fragment.
        if MemberId::mentioned_in(name) {
            return Err(TrustError::InvalidName);
        }
        let code = code.trim();

        let mut invites = self.invites.write().await;
        let mut registry = self.registry.write().await;

        if registry.iter().any(|m| name.contains(m.id.as_str())) {
            return Err(TrustError::InvalidName);
        }

        let invite = match invites.find_unused(code) {
            Ok(invite) => invite.clone(),
            Err(err) => {
                tracing::debug!("invite redemption refused: unknown or used code");
                return Err(err);
            }
        };
        let issuer = registry.get(&invite.issuer).ok_or_else(|| {
            TrustError::invariant(format!(
                "invite code owned by unregistered member {}",
                invite.issuer
            ))
        })?;
        if !issuer.is_active() {
            tracing::debug!(issuer = %invite.issuer, "invite redemption refused: issuer suspended");
            return Err(TrustError::InvalidCode);
        }
        let mut issuer = issuer.clone();
        issuer.remaining_invite_quota = issuer.remaining_invite_quota.saturating_sub(1);

        let member_id = registry.next_citizen_id();
        let member = Member::citizen(
            member_id.clone(),
            name.to_string(),
            issuer.id.clone(),
            self.standard_quota,
        );
        registry.validate_new(&member)?;
        let batch = invites.draw_batch(&member_id, self.standard_quota as usize, &[])?;
        invites.validate_batch(&batch)?;

        let redeemed = InviteCode {
            used: true,
            redeemed_by: Some(member_id.clone()),
            ..invite
        };
        self.write_through(&StateChange::Admission {
            redeemed,
            member: member.clone(),
            issuer: issuer.clone(),
            batch: batch.clone(),
        })
        .await?;

        invites.mark_redeemed(code, &member_id)?;
        invites.insert_batch(batch)?;
        registry.insert(member.clone())?;
        registry.consume_quota(&issuer.id)?;

        tracing::info!(member = %member_id, inviter = %issuer.id, "invite redeemed");
        Ok(member)
    }

    /// Issue an extra batch of codes to an active member.
    pub async fn issue_batch(&self, owner: &MemberId, count: usize) -> TrustResult<Vec<InviteCode>> {
        let mut invites = self.invites.write().await;
        let registry = self.registry.read().await;
        registry.require_active(owner)?;

        let batch = invites.draw_batch(owner, count, &[])?;
        invites.validate_batch(&batch)?;
        self.write_through(&StateChange::CodesIssued(batch.clone()))
            .await?;
        invites.insert_batch(batch.clone())?;

        tracing::info!(owner = %owner, count = count as u64, "invite batch issued");
        Ok(batch)
    }

    /// A member's own codes, used and unused, in issue order.
    pub async fn list_owned_codes(&self, member: &MemberId) -> TrustResult<Vec<InviteCode>> {
        let invites = self.invites.read().await;
        let registry = self.registry.read().await;
        registry.require(member)?;
        Ok(invites.owned_by(member))
    }

    // ------------------------------------------------------------------
    // Transparency
    // ------------------------------------------------------------------

    /// All members in admission order.
    pub async fn list_members(&self) -> Vec<Member> {
        self.registry.read().await.list()
    }

    pub async fn get_member(&self, id: &MemberId) -> TrustResult<Member> {
        self.registry.read().await.require(id).cloned()
    }

    /// Path from `id` up to its seed.
    pub async fn lineage(&self, id: &MemberId) -> TrustResult<Vec<MemberId>> {
        self.registry.read().await.lineage(id)
    }

    /// Members `id` admitted directly, in admission order.
    pub async fn invitees(&self, id: &MemberId) -> TrustResult<Vec<Member>> {
        self.registry.read().await.invitees(id)
    }

    pub async fn suspend_member(&self, id: &MemberId) -> TrustResult<Member> {
        let member = self.set_member_status(id, MemberStatus::Suspended).await?;
        tracing::warn!(member = %id, "member suspended");
        Ok(member)
    }

    pub async fn reinstate_member(&self, id: &MemberId) -> TrustResult<Member> {
        let member = self.set_member_status(id, MemberStatus::Active).await?;
        tracing::info!(member = %id, "member reinstated");
        Ok(member)
    }

    async fn set_member_status(&self, id: &MemberId, status: MemberStatus) -> TrustResult<Member> {
        let mut registry = self.registry.write().await;
        let mut updated = registry.require(id)?.clone();
        updated.status = status;

        self.write_through(&StateChange::MemberUpdated(updated))
            .await?;
        registry.set_status(id, status)
    }

    // ------------------------------------------------------------------
    // Governance
    // ------------------------------------------------------------------

    /// Cast `member`'s single ballot.
    pub async fn cast_vote(
        &self,
        member: &MemberId,
        candidate: CandidateId,
    ) -> TrustResult<AuditRecord> {
        let registry = self.registry.read().await;
        let mut ballot = self.ballot.write().await;

        let voter = registry.require_active(member)?;
        let (vote, record) = ballot.prepare_vote(voter, candidate)?;
        self.write_through(&StateChange::VoteCast {
            vote: vote.clone(),
            record: record.clone(),
        })
        .await?;
        ballot.commit_vote(vote, record.clone());

        tracing::info!(voter = %record.voter_fragment, sequence = record.sequence, "vote recorded");
        Ok(record)
    }

    pub async fn has_voted(&self, member: &MemberId) -> bool {
        self.ballot.read().await.has_voted(member)
    }

    pub async fn tally(&self, candidate: CandidateId) -> u64 {
        self.ballot.read().await.tally(candidate)
    }

    pub async fn results(&self) -> Vec<Tally> {
        self.ballot.read().await.results()
    }

    pub async fn poll(&self) -> Poll {
        self.ballot.read().await.poll().clone()
    }

    /// Stop accepting ballots. Closing a closed poll changes nothing.
    pub async fn close_poll(&self) -> TrustResult<Poll> {
        let mut ballot = self.ballot.write().await;
        if !ballot.poll().is_open() {
            return Ok(ballot.poll().clone());
        }

        let mut closed = ballot.poll().clone();
        closed.status = PollStatus::Closed;
        self.write_through(&StateChange::PollUpdated(closed.clone()))
            .await?;
        ballot.close();

        tracing::info!(poll = closed.id, "poll closed");
        Ok(closed)
    }

    /// Public audit log, newest first.
    pub async fn list_audit_log(&self) -> Vec<AuditRecord> {
        self.ballot.read().await.audit_log()
    }

    pub async fn query_audit_log(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        self.ballot.read().await.query_audit(query)
    }

    // ------------------------------------------------------------------
    // Integrity
    // ------------------------------------------------------------------

    /// Re-check the trust forest, the code behind every invite edge and the
    /// audit chain.
    pub async fn verify(&self) -> TrustResult<()> {
        let invites = self.invites.read().await;
        let registry = self.registry.read().await;
        let ballot = self.ballot.read().await;

        registry.verify_forest()?;
        check_admission_edges(&registry, invites.codes())?;
        ballot.verify_audit_chain()
    }

    pub async fn stats(&self) -> NetworkStats {
        let invites = self.invites.read().await;
        let registry = self.registry.read().await;
        let ballot = self.ballot.read().await;
        NetworkStats {
            members: registry.len(),
            codes_issued: invites.len(),
            votes_cast: ballot.vote_count(),
        }
    }

    /// Consistent copy of the whole state.
    pub async fn snapshot(&self) -> NetworkSnapshot {
        let invites = self.invites.read().await;
        let registry = self.registry.read().await;
        let ballot = self.ballot.read().await;
        NetworkSnapshot {
            poll: ballot.poll().clone(),
            members: registry.list(),
            codes: invites.list(),
            votes: ballot.votes(),
            audit_log: ballot.audit_records().to_vec(),
        }
    }
}

/// Every citizen was admitted by exactly one code, issued by its recorded
/// inviter. Seeds were admitted by none.
fn check_admission_edges(registry: &MembershipRegistry, codes: &[InviteCode]) -> TrustResult<()> {
    let mut admitted_by: HashMap<&MemberId, &InviteCode> = HashMap::new();
    for invite in codes {
        let Some(redeemer) = &invite.redeemed_by else {
            continue;
        };
        if !registry.contains(redeemer) {
            return Err(TrustError::invariant(format!(
                "invite code {} redeemed by unknown member {}",
                invite.code, redeemer
            )));
        }
        if let Some(first) = admitted_by.insert(redeemer, invite) {
            return Err(TrustError::invariant(format!(
                "member {} redeemed both {} and {}",
                redeemer, first.code, invite.code
            )));
        }
    }

    for member in registry.iter() {
        match (&member.invited_by, admitted_by.get(&member.id)) {
            (None, None) => {}
            (None, Some(invite)) => {
                return Err(TrustError::invariant(format!(
                    "seed {} redeemed invite code {}",
                    member.id, invite.code
                )));
            }
            (Some(_), None) => {
                return Err(TrustError::invariant(format!(
                    "citizen {} has no redeemed invite code",
                    member.id
                )));
            }
            (Some(inviter), Some(invite)) if &invite.issuer != inviter => {
                return Err(TrustError::invariant(format!(
                    "citizen {} lists inviter {} but redeemed {} issued by {}",
                    member.id, inviter, invite.code, invite.issuer
                )));
            }
            (Some(_), Some(_)) => {}
        }
    }

    Ok(())
}
