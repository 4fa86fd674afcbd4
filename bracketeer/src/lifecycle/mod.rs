//! Match lifecycle: result submissions, confirmation, disputes and
//! auto-confirmation.

pub mod models;
pub mod state_machine;

pub use models::{
    AUTO_CONFIRM_WINDOW_HOURS, MatchOutcome, ResultPayload, ResultSubmission, SubmissionId,
    SubmissionStatus, auto_confirm_window,
};
