//! Tournament entrants.
//!
//! An entrant is either a team or a single player. Both come from the external
//! identity/roster source and only carry an id and a display name here.

use serde::{Deserialize, Serialize};

/// Participant ID type (owned by the identity source)
pub type ParticipantId = i64;

/// Tournament ID type
pub type TournamentId = i64;

/// Staff member ID type (resolvers, payment reviewers)
pub type StaffId = i64;

/// Uniform view over anything that can occupy a bracket slot
pub trait Competitor {
    fn id(&self) -> ParticipantId;
    fn display_name(&self) -> &str;
}

/// Team entrant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamParticipant {
    pub id: ParticipantId,
    pub name: String,
}

/// Individual entrant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoloParticipant {
    pub id: ParticipantId,
    pub username: String,
}

/// Bracket entrant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Participant {
    Team(TeamParticipant),
    Solo(SoloParticipant),
}

impl Participant {
    pub fn team(id: ParticipantId, name: impl Into<String>) -> Self {
        Participant::Team(TeamParticipant {
            id,
            name: name.into(),
        })
    }

    pub fn solo(id: ParticipantId, username: impl Into<String>) -> Self {
        Participant::Solo(SoloParticipant {
            id,
            username: username.into(),
        })
    }

    /// Storage tag for the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Participant::Team(_) => "team",
            Participant::Solo(_) => "solo",
        }
    }

    /// Rebuild a participant from its storage tag
    pub fn from_parts(kind: &str, id: ParticipantId, display_name: String) -> Option<Self> {
        match kind {
            "team" => Some(Participant::team(id, display_name)),
            "solo" => Some(Participant::solo(id, display_name)),
            _ => None,
        }
    }
}

impl Competitor for TeamParticipant {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Competitor for SoloParticipant {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn display_name(&self) -> &str {
        &self.username
    }
}

impl Competitor for Participant {
    fn id(&self) -> ParticipantId {
        match self {
            Participant::Team(t) => t.id(),
            Participant::Solo(s) => s.id(),
        }
    }

    fn display_name(&self) -> &str {
        match self {
            Participant::Team(t) => t.display_name(),
            Participant::Solo(s) => s.display_name(),
        }
    }
}
