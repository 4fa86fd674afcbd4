//! Registration and payment data models.

use crate::participant::{ParticipantId, StaffId, TournamentId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registration ID type
pub type RegistrationId = Uuid;

/// Payment ID type
pub type PaymentId = Uuid;

/// Registration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Holds a slot, entry fee outstanding
    Pending,
    /// Holds a slot
    Confirmed,
    /// Queued for a slot
    Waitlisted,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Waitlisted => "waitlisted",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RegistrationStatus::Pending),
            "confirmed" => Some(RegistrationStatus::Confirmed),
            "waitlisted" => Some(RegistrationStatus::Waitlisted),
            "cancelled" => Some(RegistrationStatus::Cancelled),
            _ => None,
        }
    }

    /// Counts against tournament capacity
    pub fn holds_slot(&self) -> bool {
        matches!(self, RegistrationStatus::Pending | RegistrationStatus::Confirmed)
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Submitted,
    Verified,
    Rejected,
    Expired,
    Waived,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Submitted => "submitted",
            PaymentStatus::Verified => "verified",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Waived => "waived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(PaymentStatus::Submitted),
            "verified" => Some(PaymentStatus::Verified),
            "rejected" => Some(PaymentStatus::Rejected),
            "expired" => Some(PaymentStatus::Expired),
            "waived" => Some(PaymentStatus::Waived),
            _ => None,
        }
    }

    /// At most one active payment may exist per registration
    pub fn is_active(&self) -> bool {
        !matches!(self, PaymentStatus::Rejected | PaymentStatus::Expired)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tournament registration rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentPolicy {
    pub tournament_id: TournamentId,
    /// Maximum PENDING + CONFIRMED registrations
    pub capacity: u32,
    /// Entry fee in minor currency units; 0 is free
    pub entry_fee: i64,
    /// Hours a submitted payment may stay unverified
    pub payment_deadline_hours: Option<u32>,
}

impl TournamentPolicy {
    pub fn is_free(&self) -> bool {
        self.entry_fee <= 0
    }

    /// Deadline as a duration, if the tournament enforces one
    pub fn payment_deadline(&self) -> Option<Duration> {
        self.payment_deadline_hours
            .filter(|&h| h > 0)
            .map(|h| Duration::hours(i64::from(h)))
    }

    /// Status a registration takes when it gets a slot
    pub fn admitted_status(&self) -> RegistrationStatus {
        if self.is_free() {
            RegistrationStatus::Confirmed
        } else {
            RegistrationStatus::Pending
        }
    }
}

/// Tournament registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub tournament_id: TournamentId,
    pub participant_id: ParticipantId,
    pub status: RegistrationStatus,
    /// 1-based, set only while WAITLISTED
    pub waitlist_position: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entry-fee payment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub registration_id: RegistrationId,
    pub tournament_id: TournamentId,
    pub status: PaymentStatus,
    pub amount: i64,
    pub submitted_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    pub reviewed_by: Option<StaffId>,
    /// Audit note: who changed the status, why and when
    pub note: Option<String>,
}

/// Result of expiring one payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryOutcome {
    pub payment_id: PaymentId,
    pub cancelled_registration: RegistrationId,
    pub promoted_registration: Option<RegistrationId>,
}

/// Counts from one payment expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired_count: usize,
    pub promoted_count: usize,
    /// Payments another unit of work already handled
    pub skipped_count: usize,
    pub failed_count: usize,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.expired_count += other.expired_count;
        self.promoted_count += other.promoted_count;
        self.skipped_count += other.skipped_count;
        self.failed_count += other.failed_count;
    }
}
