//! # Bracketeer
//!
//! Single-elimination tournament engine: seeding, bracket generation with
//! byes, the match result lifecycle, staff dispute resolution, winner
//! propagation, and registration with entry-fee deadlines and a waitlist.
//!
//! ## Architecture
//!
//! Brackets and registration books are aggregates. Every mutation runs as one
//! unit of work on an aggregate the store has locked exclusively: the domain
//! code changes an in-memory copy and the store persists exactly the rows it
//! touched, or nothing at all when the operation fails.
//!
//! - [`bracket`]: geometry, builder, the match tree and winner propagation
//! - [`lifecycle`]: result submission, confirmation, disputes, auto-confirm
//! - [`dispute`]: staff resolutions and their audit records
//! - [`registration`]: registrations, payments, waitlist, deadline monitor
//! - [`db`]: repository traits with PostgreSQL and in-memory stores
//! - [`engine`]: [`TournamentEngine`], the operation surface
//!
//! ## Example
//!
//! ```
//! use bracketeer::{MemoryStore, LogNotifier, Participant, SeedingMode, TournamentEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> bracketeer::CoreResult<()> {
//! let engine = TournamentEngine::new(Arc::new(MemoryStore::new()), Arc::new(LogNotifier));
//! let players: Vec<Participant> = (1..=5)
//!     .map(|i| Participant::solo(i, format!("player{i}")))
//!     .collect();
//!
//! let tree = engine
//!     .generate_bracket(1, &players, &SeedingMode::SlotOrder, false)
//!     .await?;
//! assert_eq!(tree.bracket_size(), 8);
//! # Ok(())
//! # }
//! ```

/// Bracket geometry, construction and progression.
pub mod bracket;
/// Storage backends and repository traits.
pub mod db;
pub mod dispute;
pub mod engine;
pub mod error;
/// Match result lifecycle.
pub mod lifecycle;
pub mod notify;
pub mod participant;
/// Registrations, payments and the payment deadline monitor.
pub mod registration;
pub mod seeding;

pub use bracket::{
    Bracket, BracketFormat, BracketGeometry, BracketId, BracketTree, Match, MatchId, MatchStatus,
};
pub use db::{MemoryStore, PgStore, TournamentStore};
pub use dispute::{DisputeResolution, ResolutionRequest, ResolutionType};
pub use engine::{AutoConfirmReport, TournamentEngine};
pub use error::{CoreError, CoreResult};
pub use lifecycle::{ResultPayload, ResultSubmission, SubmissionId, SubmissionStatus};
pub use notify::{ChannelNotifier, LogNotifier, Notifier, TournamentEvent};
pub use participant::{Competitor, Participant, ParticipantId, StaffId, TournamentId};
pub use registration::{
    Payment, PaymentDeadlineMonitor, PaymentId, PaymentStatus, Registration, RegistrationId,
    RegistrationStatus, SweepReport, TournamentPolicy,
};
pub use seeding::{SeededParticipant, SeedingMode, apply_seeding};
