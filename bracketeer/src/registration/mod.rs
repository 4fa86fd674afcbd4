//! Registrations, entry-fee payments, the waitlist and the payment deadline
//! monitor.

pub mod book;
pub mod models;
pub mod monitor;

pub use book::{BookChanges, RegistrationBook};
pub use models::{
    ExpiryOutcome, Payment, PaymentId, PaymentStatus, Registration, RegistrationId,
    RegistrationStatus, SweepReport, TournamentPolicy,
};
pub use monitor::{DEFAULT_SWEEP_INTERVAL, PaymentDeadlineMonitor};
