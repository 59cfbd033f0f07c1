//! Public Audit Log
//!
//! - Append-only record of vote participation (never the chosen candidate)
//! - Voter shown by display name and a masked id fragment, never the full id
//! - Each record carries a receipt: SHA-256 over the previous receipt and the
//!   record's public fields, so any edit or removal breaks the chain
//! - Query interface for the transparency endpoint

use crate::clock::{unix_now, Timestamp};
use crate::error::{TrustError, TrustResult};
use crate::registry::Member;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const ACTION_VOTED: &str = "voted";
pub const STATUS_VERIFIED: &str = "digital fingerprint verified";

/// Single public audit record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Append position (0-based).
    pub sequence: u64,
    /// Unix timestamp (seconds since epoch).
    pub timestamp: Timestamp,
    pub voter_name: String,
    /// Masked member id fragment (e.g. `7***`).
    pub voter_fragment: String,
    pub action: String,
    pub status: String,
    /// Hex SHA-256 linking this record to its predecessor.
    pub receipt: String,
}

impl AuditRecord {
    /// Participation record for `voter`, chained after `previous`.
    ///
    /// A display name containing the voter's own id is replaced by the
    /// fragment.
    pub fn participation(voter: &Member, sequence: u64, previous: Option<&AuditRecord>) -> Self {
        let fragment = voter.id.masked();
        let voter_name = if voter.name.contains(voter.id.as_str()) {
            fragment.clone()
        } else {
            voter.name.clone()
        };
        let mut record = Self {
            sequence,
            timestamp: unix_now(),
            voter_name,
            voter_fragment: fragment,
            action: ACTION_VOTED.to_string(),
            status: STATUS_VERIFIED.to_string(),
            receipt: String::new(),
        };
        record.receipt = record.compute_receipt(previous.map(|p| p.receipt.as_str()));
        record
    }

    /// Receipt over the previous receipt and this record's public fields.
    pub fn compute_receipt(&self, previous: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(previous.unwrap_or("").as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        for field in [&self.voter_name, &self.voter_fragment, &self.action, &self.status] {
            hasher.update([0x1f]);
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Format timestamp as human-readable relative time.
    pub fn timestamp_display(&self) -> String {
        let now = unix_now();

        if now < self.timestamp {
            return format!("Unix: {}", self.timestamp);
        }

        match now - self.timestamp {
            0..=60 => "Just now".to_string(),
            elapsed @ 61..=3600 => format!("{} min ago", elapsed / 60),
            elapsed @ 3601..=86400 => format!("{} hours ago", elapsed / 3600),
            elapsed @ 86401..=604800 => format!("{} days ago", elapsed / 86400),
            _ => format!("Unix: {}", self.timestamp),
        }
    }
}

/// Check receipts of records given in append order.
pub fn verify_audit_chain(records: &[AuditRecord]) -> TrustResult<()> {
    let mut previous: Option<&str> = None;
    for (position, record) in records.iter().enumerate() {
        if record.sequence != position as u64 {
            return Err(TrustError::invariant(format!(
                "audit record at position {} has sequence {}",
                position, record.sequence
            )));
        }
        if record.compute_receipt(previous) != record.receipt {
            return Err(TrustError::invariant(format!(
                "audit receipt mismatch at sequence {}",
                record.sequence
            )));
        }
        previous = Some(record.receipt.as_str());
    }
    Ok(())
}

/// Query options for the audit log.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    /// Limit number of results (most recent first).
    pub limit: Option<usize>,
    /// Only show entries after this timestamp.
    #[serde(rename = "after")]
    pub after_timestamp: Option<Timestamp>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            limit: Some(50),
            after_timestamp: None,
        }
    }
}

/// Filter records, most recent first.
pub fn query_audit_log(records: &[AuditRecord], query: &AuditQuery) -> Vec<AuditRecord> {
    let mut filtered: Vec<AuditRecord> = records
        .iter()
        .filter(|record| match query.after_timestamp {
            Some(after) => record.timestamp > after,
            None => true,
        })
        .cloned()
        .collect();

    filtered.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then(b.sequence.cmp(&a.sequence))
    });

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }

    filtered
}

/// Format the public log for plain-text display.
pub fn format_audit_log(records: &[AuditRecord]) -> String {
    if records.is_empty() {
        return "// Waiting for voting to begin...".to_string();
    }

    let mut output = String::from("Public Activity Log\n\n");
    for record in records {
        output.push_str(&format!(
            "[{}] {} ({}) --> {} [{}] #{}\n",
            record.timestamp_display(),
            record.voter_name,
            record.voter_fragment,
            record.action,
            record.status,
            &record.receipt[..record.receipt.len().min(8)],
        ));
    }

    output.trim_end().to_string()
}
