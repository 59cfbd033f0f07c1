//! SQLite state store.
//!
//! One table per entity (`members`, `invite_codes`, `votes`, `audit_log`)
//! plus the poll definition. Primary and unique keys repeat the in-memory
//! invariants at the write path: one row per member id, per code, per
//! (poll, member) vote and per audit sequence; a member is redeemed by at
//! most one code.
//!
//! The full state is written once when the store is seeded. After that each
//! mutation touches only its own rows; appended rows take the next
//! `position` so loads keep insertion order.

use super::traits::*;
use crate::ballot::{AuditRecord, Candidate, Poll, PollStatus, Vote};
use crate::invites::InviteCode;
use crate::network::{NetworkSnapshot, StateChange};
use crate::registry::{Member, MemberId, MemberStatus, Role};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS poll (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        candidates TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS members (
        id TEXT PRIMARY KEY,
        position INTEGER NOT NULL UNIQUE,
        name TEXT NOT NULL,
        role TEXT NOT NULL,
        invited_by TEXT,
        remaining_invite_quota INTEGER NOT NULL,
        joined_at INTEGER NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS invite_codes (
        code TEXT PRIMARY KEY,
        position INTEGER NOT NULL UNIQUE,
        issuer TEXT NOT NULL,
        used INTEGER NOT NULL,
        redeemed_by TEXT UNIQUE,
        issued_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS votes (
        poll_id INTEGER NOT NULL,
        member_id TEXT NOT NULL,
        candidate_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (poll_id, member_id)
    )",
    "CREATE TABLE IF NOT EXISTS audit_log (
        sequence INTEGER PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        voter_name TEXT NOT NULL,
        voter_fragment TEXT NOT NULL,
        action TEXT NOT NULL,
        status TEXT NOT NULL,
        receipt TEXT NOT NULL
    )",
];

const TABLES: &[&str] = &["poll", "members", "invite_codes", "votes", "audit_log"];

#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Corrupt(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// Private in-memory database (tests, demos).
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn connect(options: SqliteConnectOptions) -> StoreResult<Self> {
        // Single connection: an in-memory database lives as long as it does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn load_poll(&self) -> StoreResult<Option<Poll>> {
        let row = sqlx::query("SELECT id, title, status, candidates FROM poll LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let candidates: Vec<Candidate> =
            serde_json::from_str(&row.try_get::<String, _>("candidates")?)
                .map_err(|e| StoreError::Corrupt(format!("poll candidates: {}", e)))?;
        let status = match row.try_get::<String, _>("status")?.as_str() {
            "open" => PollStatus::Open,
            "closed" => PollStatus::Closed,
            other => return Err(StoreError::Corrupt(format!("poll status {}", other))),
        };

        Ok(Some(Poll {
            id: column_u64(&row, "id")?,
            title: row.try_get("title")?,
            candidates,
            status,
        }))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Seed => "seed",
        Role::Citizen => "citizen",
    }
}

fn status_str(status: MemberStatus) -> &'static str {
    match status {
        MemberStatus::Active => "active",
        MemberStatus::Suspended => "suspended",
    }
}

fn poll_status_str(status: PollStatus) -> &'static str {
    match status {
        PollStatus::Open => "open",
        PollStatus::Closed => "closed",
    }
}

/// SQLite integers are signed; values past `i64::MAX` are refused.
fn to_sql(value: u64, column: &str) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("{} = {} does not fit a column", column, value)))
}

fn column_u64(row: &SqliteRow, column: &str) -> StoreResult<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} = {}", column, value)))
}

fn column_u32(row: &SqliteRow, column: &str) -> StoreResult<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} = {}", column, value)))
}

fn member_from_row(row: &SqliteRow) -> StoreResult<Member> {
    let role = match row.try_get::<String, _>("role")?.as_str() {
        "seed" => Role::Seed,
        "citizen" => Role::Citizen,
        other => return Err(StoreError::Corrupt(format!("member role {}", other))),
    };
    let status = match row.try_get::<String, _>("status")?.as_str() {
        "active" => MemberStatus::Active,
        "suspended" => MemberStatus::Suspended,
        other => return Err(StoreError::Corrupt(format!("member status {}", other))),
    };

    Ok(Member {
        id: MemberId::new(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        role,
        invited_by: row
            .try_get::<Option<String>, _>("invited_by")?
            .map(MemberId::new),
        remaining_invite_quota: column_u32(row, "remaining_invite_quota")?,
        joined_at: column_u64(row, "joined_at")?,
        status,
    })
}

fn code_from_row(row: &SqliteRow) -> StoreResult<InviteCode> {
    Ok(InviteCode {
        code: row.try_get("code")?,
        issuer: MemberId::new(row.try_get::<String, _>("issuer")?),
        used: row.try_get::<i64, _>("used")? != 0,
        redeemed_by: row
            .try_get::<Option<String>, _>("redeemed_by")?
            .map(MemberId::new),
        issued_at: column_u64(row, "issued_at")?,
    })
}

fn vote_from_row(row: &SqliteRow) -> StoreResult<Vote> {
    Ok(Vote {
        poll_id: column_u64(row, "poll_id")?,
        member_id: MemberId::new(row.try_get::<String, _>("member_id")?),
        candidate_id: column_u32(row, "candidate_id")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> StoreResult<AuditRecord> {
    Ok(AuditRecord {
        sequence: column_u64(row, "sequence")?,
        timestamp: column_u64(row, "timestamp")?,
        voter_name: row.try_get("voter_name")?,
        voter_fragment: row.try_get("voter_fragment")?,
        action: row.try_get("action")?,
        status: row.try_get("status")?,
        receipt: row.try_get("receipt")?,
    })
}

/// An UPDATE that must hit exactly one row.
fn expect_one_row(rows: u64, what: String) -> StoreResult<()> {
    if rows != 1 {
        return Err(StoreError::Corrupt(format!("{} matched {} rows", what, rows)));
    }
    Ok(())
}

async fn insert_poll(conn: &mut SqliteConnection, poll: &Poll) -> StoreResult<()> {
    let candidates = serde_json::to_string(&poll.candidates)
        .map_err(|e| StoreError::Corrupt(format!("poll candidates: {}", e)))?;
    sqlx::query("INSERT INTO poll (id, title, status, candidates) VALUES (?, ?, ?, ?)")
        .bind(to_sql(poll.id, "poll.id")?)
        .bind(&poll.title)
        .bind(poll_status_str(poll.status))
        .bind(candidates)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn update_poll(conn: &mut SqliteConnection, poll: &Poll) -> StoreResult<()> {
    let result = sqlx::query("UPDATE poll SET status = ? WHERE id = ?")
        .bind(poll_status_str(poll.status))
        .bind(to_sql(poll.id, "poll.id")?)
        .execute(&mut *conn)
        .await?;
    expect_one_row(result.rows_affected(), format!("poll {}", poll.id))
}

async fn insert_member(conn: &mut SqliteConnection, member: &Member) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO members (id, position, name, role, invited_by, \
         remaining_invite_quota, joined_at, status) \
         VALUES (?, (SELECT COALESCE(MAX(position), -1) + 1 FROM members), ?, ?, ?, ?, ?, ?)",
    )
    .bind(member.id.as_str())
    .bind(&member.name)
    .bind(role_str(member.role))
    .bind(member.invited_by.as_ref().map(|id| id.as_str()))
    .bind(i64::from(member.remaining_invite_quota))
    .bind(to_sql(member.joined_at, "joined_at")?)
    .bind(status_str(member.status))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Quota and status are the only member columns that change after insert.
async fn update_member(conn: &mut SqliteConnection, member: &Member) -> StoreResult<()> {
    let result =
        sqlx::query("UPDATE members SET remaining_invite_quota = ?, status = ? WHERE id = ?")
            .bind(i64::from(member.remaining_invite_quota))
            .bind(status_str(member.status))
            .bind(member.id.as_str())
            .execute(&mut *conn)
            .await?;
    expect_one_row(result.rows_affected(), format!("member {}", member.id))
}

async fn insert_code(conn: &mut SqliteConnection, invite: &InviteCode) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO invite_codes (code, position, issuer, used, redeemed_by, issued_at) \
         VALUES (?, (SELECT COALESCE(MAX(position), -1) + 1 FROM invite_codes), ?, ?, ?, ?)",
    )
    .bind(&invite.code)
    .bind(invite.issuer.as_str())
    .bind(i64::from(invite.used))
    .bind(invite.redeemed_by.as_ref().map(|id| id.as_str()))
    .bind(to_sql(invite.issued_at, "issued_at")?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Flip a stored code to used. Only an unused code matches.
async fn redeem_code(conn: &mut SqliteConnection, invite: &InviteCode) -> StoreResult<()> {
    let redeemer = invite
        .redeemed_by
        .as_ref()
        .ok_or_else(|| StoreError::Corrupt(format!("code {} has no redeemer", invite.code)))?;
    let result =
        sqlx::query("UPDATE invite_codes SET used = 1, redeemed_by = ? WHERE code = ? AND used = 0")
            .bind(redeemer.as_str())
            .bind(&invite.code)
            .execute(&mut *conn)
            .await?;
    expect_one_row(result.rows_affected(), format!("unused code {}", invite.code))
}

async fn insert_vote(conn: &mut SqliteConnection, vote: &Vote) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO votes (poll_id, member_id, candidate_id, position) \
         VALUES (?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM votes))",
    )
    .bind(to_sql(vote.poll_id, "poll_id")?)
    .bind(vote.member_id.as_str())
    .bind(i64::from(vote.candidate_id))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_audit(conn: &mut SqliteConnection, record: &AuditRecord) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO audit_log (sequence, timestamp, voter_name, voter_fragment, \
         action, status, receipt) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(to_sql(record.sequence, "sequence")?)
    .bind(to_sql(record.timestamp, "timestamp")?)
    .bind(&record.voter_name)
    .bind(&record.voter_fragment)
    .bind(&record.action)
    .bind(&record.status)
    .bind(&record.receipt)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self) -> StoreResult<Option<NetworkSnapshot>> {
        let Some(poll) = self.load_poll().await? else {
            return Ok(None);
        };

        let members = sqlx::query("SELECT * FROM members ORDER BY position")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(member_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let codes = sqlx::query("SELECT * FROM invite_codes ORDER BY position")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(code_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let votes = sqlx::query("SELECT * FROM votes ORDER BY position")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(vote_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let audit_log = sqlx::query("SELECT * FROM audit_log ORDER BY sequence")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(audit_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(NetworkSnapshot {
            poll,
            members,
            codes,
            votes,
            audit_log,
        }))
    }

    async fn save(&self, snapshot: &NetworkSnapshot) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for table in TABLES {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }

        insert_poll(&mut tx, &snapshot.poll).await?;
        for member in &snapshot.members {
            insert_member(&mut tx, member).await?;
        }
        for invite in &snapshot.codes {
            insert_code(&mut tx, invite).await?;
        }
        for vote in &snapshot.votes {
            insert_vote(&mut tx, vote).await?;
        }
        for record in &snapshot.audit_log {
            insert_audit(&mut tx, record).await?;
        }

        tx.commit().await?;
        tracing::debug!(
            members = snapshot.members.len() as u64,
            codes = snapshot.codes.len() as u64,
            "state saved"
        );
        Ok(())
    }

    async fn apply(&self, change: &StateChange) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        match change {
            StateChange::Admission {
                redeemed,
                member,
                issuer,
                batch,
            } => {
                redeem_code(&mut tx, redeemed).await?;
                update_member(&mut tx, issuer).await?;
                insert_member(&mut tx, member).await?;
                for invite in batch {
                    insert_code(&mut tx, invite).await?;
                }
            }
            StateChange::CodesIssued(batch) => {
                for invite in batch {
                    insert_code(&mut tx, invite).await?;
                }
            }
            StateChange::MemberUpdated(member) => update_member(&mut tx, member).await?,
            StateChange::VoteCast { vote, record } => {
                insert_vote(&mut tx, vote).await?;
                insert_audit(&mut tx, record).await?;
            }
            StateChange::PollUpdated(poll) => update_poll(&mut tx, poll).await?,
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkConfig, PollConfig, TrustNetwork};
    use crate::registry::MemberId;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn network() -> TrustNetwork {
        TrustNetwork::with_defaults(&NetworkConfig::default(), PollConfig::default().into_poll())
            .unwrap()
    }

    async fn populated() -> TrustNetwork {
        let network = network();
        let omar = network.redeem_invite("SEED-A1", "Omar").await.unwrap();
        network.cast_vote(&omar.id, 1).await.unwrap();
        network
    }

    #[tokio::test]
    async fn test_empty_store_loads_none() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let snapshot = populated().await.snapshot().await;

        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_state() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let network = populated().await;

        store.save(&network.snapshot().await).await.unwrap();
        network.redeem_invite("SEED-B1", "Layla").await.unwrap();
        let latest = network.snapshot().await;
        store.save(&latest).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(latest));
    }

    #[tokio::test]
    async fn test_changes_applied_in_place() {
        let store = Arc::new(SqliteStateStore::in_memory().await.unwrap());
        let network = network();
        store.save(&network.snapshot().await).await.unwrap();
        let network = network.with_store(store.clone());

        let omar = network.redeem_invite("SEED-A1", "Omar").await.unwrap();
        let layla = network.redeem_invite("SEED-A2", "Layla").await.unwrap();
        network.issue_batch(&layla.id, 2).await.unwrap();
        network.cast_vote(&omar.id, 1).await.unwrap();
        network.cast_vote(&layla.id, 2).await.unwrap();
        network.suspend_member(&omar.id).await.unwrap();
        network.close_poll().await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(network.snapshot().await));
    }

    #[tokio::test]
    async fn test_refused_change_rolls_back() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let network = populated().await;
        let saved = network.snapshot().await;
        store.save(&saved).await.unwrap();

        // The code update, issuer update and member insert succeed; the
        // batch repeats a stored code, so none of them may land.
        let newcomer = MemberId::citizen(9);
        let mut redeemed = saved.codes.iter().find(|c| c.code == "SEED-A2").unwrap().clone();
        redeemed.used = true;
        redeemed.redeemed_by = Some(newcomer.clone());
        let mut issuer = saved.members[0].clone();
        issuer.remaining_invite_quota -= 1;
        let batch = vec![InviteCode::new("SEED-B1".to_string(), newcomer.clone())];
        let change = StateChange::Admission {
            redeemed,
            member: Member::citizen(newcomer, "Late".to_string(), issuer.id.clone(), 3),
            issuer,
            batch,
        };

        assert!(matches!(store.apply(&change).await, Err(StoreError::Database(_))));
        assert_eq!(store.load().await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_used_code_cannot_be_redeemed_again() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let saved = populated().await.snapshot().await;
        store.save(&saved).await.unwrap();

        let redeemed = saved.codes.iter().find(|c| c.code == "SEED-A1").unwrap().clone();
        let change = StateChange::Admission {
            redeemed,
            member: Member::citizen(
                MemberId::citizen(9),
                "Late".to_string(),
                MemberId::new("seed-1"),
                3,
            ),
            issuer: saved.members[0].clone(),
            batch: Vec::new(),
        };

        assert!(matches!(store.apply(&change).await, Err(StoreError::Corrupt(_))));
        assert_eq!(store.load().await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_duplicate_vote_rejected_by_schema() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let snapshot = populated().await.snapshot().await;
        store.save(&snapshot).await.unwrap();

        let change = StateChange::VoteCast {
            vote: snapshot.votes[0].clone(),
            record: snapshot.audit_log[0].clone(),
        };
        assert!(matches!(store.apply(&change).await, Err(StoreError::Database(_))));
        assert_eq!(store.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_nothing_behind() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let mut snapshot = populated().await.snapshot().await;
        let duplicate = snapshot.votes[0].clone();
        snapshot.votes.push(duplicate);

        assert!(matches!(
            store.save(&snapshot).await,
            Err(StoreError::Database(_))
        ));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_negative_column_is_corrupt() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store.save(&network().snapshot().await).await.unwrap();

        sqlx::query("UPDATE members SET remaining_invite_quota = -1 WHERE id = 'seed-1'")
            .execute(&store.pool)
            .await
            .unwrap();
        assert!(matches!(store.load().await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_oversized_timestamp_is_refused() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let mut snapshot = network().snapshot().await;
        snapshot.members[0].joined_at = u64::MAX;

        assert!(matches!(store.save(&snapshot).await, Err(StoreError::Corrupt(_))));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("trustchain.db");
        let snapshot = populated().await.snapshot().await;

        {
            let store = SqliteStateStore::open(&path).await.unwrap();
            store.save(&snapshot).await.unwrap();
        }

        let reopened = SqliteStateStore::open(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), Some(snapshot));
    }
}
