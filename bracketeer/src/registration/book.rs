//! Registration aggregate for one tournament.
//!
//! A `RegistrationBook` holds every registration and payment of a
//! tournament. Stores lock the whole set before handing it out, so slot
//! counting, waitlist ordering and promotion all see a stable view.

use super::models::{
    ExpiryOutcome, Payment, PaymentId, PaymentStatus, Registration, RegistrationId,
    RegistrationStatus, TournamentPolicy,
};
use crate::{
    error::{CoreError, CoreResult},
    participant::{ParticipantId, StaffId},
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// Rows a unit of work touched
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BookChanges {
    pub registrations: BTreeSet<RegistrationId>,
    pub payments: BTreeSet<PaymentId>,
}

impl BookChanges {
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.payments.is_empty()
    }
}

/// Registrations and payments of one tournament
#[derive(Debug, Clone)]
pub struct RegistrationBook {
    policy: TournamentPolicy,
    registrations: Vec<Registration>,
    payments: Vec<Payment>,
    changes: BookChanges,
}

impl RegistrationBook {
    pub fn from_parts(
        policy: TournamentPolicy,
        mut registrations: Vec<Registration>,
        payments: Vec<Payment>,
    ) -> Self {
        registrations.sort_by_key(|r| (r.waitlist_position.unwrap_or(0), r.created_at));
        Self {
            policy,
            registrations,
            payments,
            changes: BookChanges::default(),
        }
    }

    pub fn policy(&self) -> &TournamentPolicy {
        &self.policy
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn registration(&self, id: RegistrationId) -> CoreResult<&Registration> {
        self.registrations
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| CoreError::not_found("registration", id))
    }

    pub fn payment(&self, id: PaymentId) -> CoreResult<&Payment> {
        self.payments
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::not_found("payment", id))
    }

    fn registration_mut(&mut self, id: RegistrationId) -> CoreResult<&mut Registration> {
        let r = self
            .registrations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CoreError::not_found("registration", id))?;
        self.changes.registrations.insert(r.id);
        Ok(r)
    }

    fn payment_mut(&mut self, id: PaymentId) -> CoreResult<&mut Payment> {
        let p = self
            .payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::not_found("payment", id))?;
        self.changes.payments.insert(p.id);
        Ok(p)
    }

    pub fn take_changes(&mut self) -> BookChanges {
        std::mem::take(&mut self.changes)
    }

    /// Registrations currently holding a slot
    pub fn slots_taken(&self) -> usize {
        self.registrations
            .iter()
            .filter(|r| r.status.holds_slot())
            .count()
    }

    pub fn has_open_slot(&self) -> bool {
        self.slots_taken() < self.policy.capacity as usize
    }

    /// Waitlisted registrations, next in line first
    pub fn waitlist(&self) -> Vec<&Registration> {
        let mut waiting: Vec<&Registration> = self
            .registrations
            .iter()
            .filter(|r| r.status == RegistrationStatus::Waitlisted)
            .collect();
        waiting.sort_by_key(|r| (r.waitlist_position, r.created_at));
        waiting
    }

    fn active_payment(&self, registration_id: RegistrationId) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|p| p.registration_id == registration_id && p.status.is_active())
    }

    /// Register `participant`, taking a slot or joining the waitlist
    ///
    /// # Errors
    ///
    /// * `CoreError::Conflict` - the participant already has an active registration
    pub fn register(
        &mut self,
        participant: ParticipantId,
        now: DateTime<Utc>,
    ) -> CoreResult<Registration> {
        if self
            .registrations
            .iter()
            .any(|r| r.participant_id == participant && r.status != RegistrationStatus::Cancelled)
        {
            return Err(CoreError::conflict(format!(
                "participant {participant} is already registered for tournament {}",
                self.policy.tournament_id
            )));
        }

        let (status, waitlist_position) = if self.has_open_slot() {
            (self.policy.admitted_status(), None)
        } else {
            let next = self.waitlist().len() as u32 + 1;
            (RegistrationStatus::Waitlisted, Some(next))
        };

        let registration = Registration {
            id: Uuid::new_v4(),
            tournament_id: self.policy.tournament_id,
            participant_id: participant,
            status,
            waitlist_position,
            created_at: now,
            updated_at: now,
        };

        log::info!(
            "Participant {} registered for tournament {} as {}",
            participant,
            self.policy.tournament_id,
            status
        );
        self.changes.registrations.insert(registration.id);
        self.registrations.push(registration.clone());
        Ok(registration)
    }

    /// Cancel a registration; a vacated slot goes to the next waitlisted entrant
    ///
    /// # Errors
    ///
    /// * `CoreError::NotFound` - unknown registration
    /// * `CoreError::Conflict` - already cancelled
    pub fn withdraw(
        &mut self,
        registration_id: RegistrationId,
        now: DateTime<Utc>,
    ) -> CoreResult<Registration> {
        let vacated = self.cancel_registration(registration_id, now)?;

        if vacated {
            self.promote_next(now)?;
        } else {
            self.compact_waitlist(now);
        }
        self.check_invariants()?;
        self.registration(registration_id).cloned()
    }

    /// Returns whether the cancelled registration held a slot
    fn cancel_registration(
        &mut self,
        registration_id: RegistrationId,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let r = self.registration_mut(registration_id)?;
        if r.status == RegistrationStatus::Cancelled {
            return Err(CoreError::conflict(format!(
                "registration {registration_id} is already cancelled"
            )));
        }

        let vacated = r.status.holds_slot();
        r.status = RegistrationStatus::Cancelled;
        r.waitlist_position = None;
        r.updated_at = now;
        Ok(vacated)
    }

    /// Admit the lowest-positioned waitlisted registration if a slot is free
    fn promote_next(&mut self, now: DateTime<Utc>) -> CoreResult<Option<RegistrationId>> {
        if !self.has_open_slot() {
            return Ok(None);
        }

        let Some(next) = self.waitlist().first().map(|r| r.id) else {
            return Ok(None);
        };

        let status = self.policy.admitted_status();
        let r = self.registration_mut(next)?;
        r.status = status;
        r.waitlist_position = None;
        r.updated_at = now;

        log::info!(
            "Promoted registration {} (participant {}) from waitlist to {}",
            r.id,
            r.participant_id,
            status
        );
        self.compact_waitlist(now);
        Ok(Some(next))
    }

    /// Renumber waitlisted registrations 1..=k, keeping their order
    fn compact_waitlist(&mut self, now: DateTime<Utc>) {
        let order: Vec<RegistrationId> = self.waitlist().iter().map(|r| r.id).collect();
        for (position, id) in (1u32..).zip(order) {
            let Some(r) = self.registrations.iter_mut().find(|r| r.id == id) else {
                continue;
            };
            if r.waitlist_position != Some(position) {
                r.waitlist_position = Some(position);
                r.updated_at = now;
                self.changes.registrations.insert(id);
            }
        }
    }

    /// Record a submitted entry-fee payment
    ///
    /// # Errors
    ///
    /// * `CoreError::Conflict` - registration not PENDING, or it already has an active payment
    /// * `CoreError::Validation` - the tournament is free
    pub fn submit_payment(
        &mut self,
        registration_id: RegistrationId,
        now: DateTime<Utc>,
    ) -> CoreResult<Payment> {
        if self.policy.is_free() {
            return Err(CoreError::validation(format!(
                "tournament {} has no entry fee",
                self.policy.tournament_id
            )));
        }
        self.ensure_pending(registration_id)?;
        if let Some(active) = self.active_payment(registration_id) {
            return Err(CoreError::conflict(format!(
                "registration {registration_id} already has payment {} ({})",
                active.id, active.status
            )));
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            registration_id,
            tournament_id: self.policy.tournament_id,
            status: PaymentStatus::Submitted,
            amount: self.policy.entry_fee,
            submitted_at: now,
            status_changed_at: now,
            reviewed_by: None,
            note: None,
        };

        self.changes.payments.insert(payment.id);
        self.payments.push(payment.clone());
        Ok(payment)
    }

    /// Accept a submitted payment and confirm its registration
    ///
    /// # Errors
    ///
    /// * `CoreError::Conflict` - payment is not SUBMITTED or its registration is not PENDING
    pub fn verify_payment(
        &mut self,
        payment_id: PaymentId,
        staff: StaffId,
        now: DateTime<Utc>,
    ) -> CoreResult<Payment> {
        let registration_id = self.ensure_submitted(payment_id)?;
        self.ensure_pending(registration_id)?;

        let p = self.payment_mut(payment_id)?;
        p.status = PaymentStatus::Verified;
        p.status_changed_at = now;
        p.reviewed_by = Some(staff);
        p.note = Some(format!("verified by staff {staff} at {now}"));
        let payment = p.clone();

        self.confirm(registration_id, now)?;
        Ok(payment)
    }

    /// Refuse a submitted payment; the registration keeps its slot and may pay again
    ///
    /// # Errors
    ///
    /// * `CoreError::Validation` - blank reason
    /// * `CoreError::Conflict` - payment is not SUBMITTED
    pub fn reject_payment(
        &mut self,
        payment_id: PaymentId,
        staff: StaffId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Payment> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::validation("rejecting a payment needs a reason"));
        }
        self.ensure_submitted(payment_id)?;

        let p = self.payment_mut(payment_id)?;
        p.status = PaymentStatus::Rejected;
        p.status_changed_at = now;
        p.reviewed_by = Some(staff);
        p.note = Some(format!("rejected by staff {staff} at {now}: {reason}"));
        Ok(p.clone())
    }

    /// Confirm a PENDING registration without payment
    ///
    /// # Errors
    ///
    /// * `CoreError::Conflict` - registration not PENDING or it already has an active payment
    pub fn waive_payment(
        &mut self,
        registration_id: RegistrationId,
        staff: StaffId,
        now: DateTime<Utc>,
    ) -> CoreResult<Payment> {
        self.ensure_pending(registration_id)?;
        if let Some(active) = self.active_payment(registration_id) {
            return Err(CoreError::conflict(format!(
                "registration {registration_id} already has payment {} ({})",
                active.id, active.status
            )));
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            registration_id,
            tournament_id: self.policy.tournament_id,
            status: PaymentStatus::Waived,
            amount: 0,
            submitted_at: now,
            status_changed_at: now,
            reviewed_by: Some(staff),
            note: Some(format!("waived by staff {staff} at {now}")),
        };
        self.changes.payments.insert(payment.id);
        self.payments.push(payment.clone());

        self.confirm(registration_id, now)?;
        Ok(payment)
    }

    fn confirm(&mut self, registration_id: RegistrationId, now: DateTime<Utc>) -> CoreResult<()> {
        let r = self.registration_mut(registration_id)?;
        r.status = RegistrationStatus::Confirmed;
        r.updated_at = now;
        Ok(())
    }

    /// SUBMITTED payments whose deadline passed before `now`
    pub fn overdue_payments(&self, now: DateTime<Utc>) -> Vec<PaymentId> {
        let Some(deadline) = self.policy.payment_deadline() else {
            return Vec::new();
        };
        let cutoff = now - deadline;
        self.payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Submitted && p.submitted_at < cutoff)
            .map(|p| p.id)
            .collect()
    }

    /// Expire an overdue payment, cancel its registration and hand the slot on.
    ///
    /// # Errors
    ///
    /// * `CoreError::Conflict` - the payment is no longer SUBMITTED or not yet overdue
    pub fn expire_payment(
        &mut self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> CoreResult<ExpiryOutcome> {
        let registration_id = self.ensure_submitted(payment_id)?;
        let Some(deadline) = self.policy.payment_deadline() else {
            return Err(CoreError::conflict(format!(
                "tournament {} has no payment deadline",
                self.policy.tournament_id
            )));
        };
        let submitted_at = self.payment(payment_id)?.submitted_at;
        if submitted_at >= now - deadline {
            return Err(CoreError::conflict(format!(
                "payment {payment_id} is still inside its deadline"
            )));
        }

        let hours = deadline.num_hours();
        let p = self.payment_mut(payment_id)?;
        p.status = PaymentStatus::Expired;
        p.status_changed_at = now;
        p.note = Some(format!(
            "expired by payment deadline monitor at {now}: submitted {submitted_at}, not verified within {hours}h"
        ));

        let vacated = match self.registration(registration_id)?.status {
            RegistrationStatus::Cancelled => false,
            _ => self.cancel_registration(registration_id, now)?,
        };
        let promoted = if vacated {
            self.promote_next(now)?
        } else {
            None
        };

        self.check_invariants()?;
        log::info!(
            "Expired payment {} of registration {} in tournament {}; promoted {:?}",
            payment_id,
            registration_id,
            self.policy.tournament_id,
            promoted
        );

        Ok(ExpiryOutcome {
            payment_id,
            cancelled_registration: registration_id,
            promoted_registration: promoted,
        })
    }

    fn ensure_submitted(&self, payment_id: PaymentId) -> CoreResult<RegistrationId> {
        let p = self.payment(payment_id)?;
        if p.status != PaymentStatus::Submitted {
            return Err(CoreError::conflict(format!(
                "payment {payment_id} is {}",
                p.status
            )));
        }
        Ok(p.registration_id)
    }

    fn ensure_pending(&self, registration_id: RegistrationId) -> CoreResult<()> {
        let r = self.registration(registration_id)?;
        if r.status != RegistrationStatus::Pending {
            return Err(CoreError::conflict(format!(
                "registration {registration_id} is {}",
                r.status
            )));
        }
        Ok(())
    }

    /// Waitlist positions are exactly 1..=k, only waitlisted rows carry one,
    /// and no registration has two active payments.
    ///
    /// # Errors
    ///
    /// * `CoreError::Corrupt` - an invariant does not hold
    pub fn check_invariants(&self) -> CoreResult<()> {
        let mut positions: Vec<u32> = Vec::new();
        for r in &self.registrations {
            match (r.status, r.waitlist_position) {
                (RegistrationStatus::Waitlisted, Some(p)) => positions.push(p),
                (RegistrationStatus::Waitlisted, None) => {
                    return Err(CoreError::Corrupt(format!(
                        "waitlisted registration {} has no position",
                        r.id
                    )));
                }
                (_, Some(_)) => {
                    return Err(CoreError::Corrupt(format!(
                        "registration {} is {} but has a waitlist position",
                        r.id, r.status
                    )));
                }
                (_, None) => {}
            }
        }
        positions.sort_unstable();
        if positions.iter().copied().ne(1..=positions.len() as u32) {
            return Err(CoreError::Corrupt(format!(
                "waitlist of tournament {} is not contiguous: {positions:?}",
                self.policy.tournament_id
            )));
        }

        let mut with_active = HashSet::new();
        for p in self.payments.iter().filter(|p| p.status.is_active()) {
            if !with_active.insert(p.registration_id) {
                return Err(CoreError::Corrupt(format!(
                    "registration {} has two active payments",
                    p.registration_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn book(capacity: u32, entry_fee: i64) -> RegistrationBook {
        RegistrationBook::from_parts(
            TournamentPolicy {
                tournament_id: 42,
                capacity,
                entry_fee,
                payment_deadline_hours: Some(24),
            },
            vec![],
            vec![],
        )
    }

    fn positions(b: &RegistrationBook) -> Vec<(ParticipantId, u32)> {
        b.waitlist()
            .iter()
            .map(|r| (r.participant_id, r.waitlist_position.unwrap_or(0)))
            .collect()
    }

    #[test]
    fn test_register_fills_then_waitlists() {
        let mut b = book(2, 1000);
        let now = Utc::now();
        assert_eq!(b.register(1, now).unwrap().status, RegistrationStatus::Pending);
        assert_eq!(b.register(2, now).unwrap().status, RegistrationStatus::Pending);
        let third = b.register(3, now).unwrap();
        assert_eq!(third.status, RegistrationStatus::Waitlisted);
        assert_eq!(third.waitlist_position, Some(1));
        assert_eq!(b.register(4, now).unwrap().waitlist_position, Some(2));

        let err = b.register(2, now).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        b.check_invariants().unwrap();
    }

    #[test]
    fn test_free_tournament_confirms_directly() {
        let mut b = book(4, 0);
        let r = b.register(1, Utc::now()).unwrap();
        assert_eq!(r.status, RegistrationStatus::Confirmed);
        let err = b.submit_payment(r.id, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_expire_promotes_lowest_waitlisted() {
        let mut b = book(1, 1000);
        let t0 = Utc::now();
        let holder = b.register(1, t0).unwrap();
        let first = b.register(2, t0 + Duration::minutes(1)).unwrap();
        let second = b.register(3, t0 + Duration::minutes(2)).unwrap();
        let payment = b.submit_payment(holder.id, t0).unwrap();

        let t25 = t0 + Duration::hours(25);
        assert_eq!(b.overdue_payments(t25), vec![payment.id]);
        let outcome = b.expire_payment(payment.id, t25).unwrap();
        assert_eq!(outcome.promoted_registration, Some(first.id));

        assert_eq!(b.payment(payment.id).unwrap().status, PaymentStatus::Expired);
        assert!(b.payment(payment.id).unwrap().note.as_deref().unwrap().contains("expired"));
        assert_eq!(b.registration(holder.id).unwrap().status, RegistrationStatus::Cancelled);

        let promoted = b.registration(first.id).unwrap();
        assert_eq!(promoted.status, RegistrationStatus::Pending);
        assert_eq!(promoted.waitlist_position, None);
        assert_eq!(b.registration(second.id).unwrap().waitlist_position, Some(1));

        let err = b.expire_payment(payment.id, t25).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_expire_refuses_fresh_payment() {
        let mut b = book(1, 1000);
        let t0 = Utc::now();
        let r = b.register(1, t0).unwrap();
        let p = b.submit_payment(r.id, t0).unwrap();
        assert!(b.overdue_payments(t0 + Duration::hours(23)).is_empty());
        let err = b.expire_payment(p.id, t0 + Duration::hours(23)).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(b.payment(p.id).unwrap().status, PaymentStatus::Submitted);
        assert_eq!(b.registration(r.id).unwrap().status, RegistrationStatus::Pending);
    }

    #[test]
    fn test_withdraw_from_waitlist_compacts() {
        let mut b = book(1, 0);
        let now = Utc::now();
        b.register(1, now).unwrap();
        let w1 = b.register(2, now).unwrap();
        b.register(3, now + Duration::seconds(1)).unwrap();
        b.register(4, now + Duration::seconds(2)).unwrap();

        b.withdraw(w1.id, now).unwrap();
        assert_eq!(positions(&b), vec![(3, 1), (4, 2)]);
        b.check_invariants().unwrap();
    }

    #[test]
    fn test_withdraw_slot_holder_promotes() {
        let mut b = book(1, 0);
        let now = Utc::now();
        let holder = b.register(1, now).unwrap();
        let next = b.register(2, now).unwrap();
        b.withdraw(holder.id, now).unwrap();
        assert_eq!(
            b.registration(next.id).unwrap().status,
            RegistrationStatus::Confirmed
        );
        assert!(b.waitlist().is_empty());

        let err = b.withdraw(holder.id, now).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_payment_review_flow() {
        let mut b = book(2, 1000);
        let now = Utc::now();
        let r = b.register(1, now).unwrap();
        let p = b.submit_payment(r.id, now).unwrap();
        assert!(matches!(b.submit_payment(r.id, now), Err(CoreError::Conflict(_))));

        let rejected = b.reject_payment(p.id, 9, "blurry receipt", now).unwrap();
        assert_eq!(rejected.status, PaymentStatus::Rejected);
        assert_eq!(b.registration(r.id).unwrap().status, RegistrationStatus::Pending);

        let p2 = b.submit_payment(r.id, now).unwrap();
        b.verify_payment(p2.id, 9, now).unwrap();
        assert_eq!(b.registration(r.id).unwrap().status, RegistrationStatus::Confirmed);
        assert!(matches!(b.verify_payment(p2.id, 9, now), Err(CoreError::Conflict(_))));
    }

    #[test]
    fn test_waive_confirms() {
        let mut b = book(2, 1000);
        let now = Utc::now();
        let r = b.register(1, now).unwrap();
        let waived = b.waive_payment(r.id, 9, now).unwrap();
        assert_eq!(waived.status, PaymentStatus::Waived);
        assert_eq!(b.registration(r.id).unwrap().status, RegistrationStatus::Confirmed);
        b.check_invariants().unwrap();
    }
}
