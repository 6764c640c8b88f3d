use std::fmt;

use serde::{Deserialize, Serialize};

/// The four deliberation roles on a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Architect,
    Lorekeeper,
    Contrarian,
    Synthesizer,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Architect,
        Role::Lorekeeper,
        Role::Contrarian,
        Role::Synthesizer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Architect => "ARCHITECT",
            Role::Lorekeeper => "LOREKEEPER",
            Role::Contrarian => "CONTRARIAN",
            Role::Synthesizer => "SYNTHESIZER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of contribution a turn makes within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnType {
    Proposal,
    Objection,
    Response,
    Resolution,
    Vote,
}

impl TurnType {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnType::Proposal => "PROPOSAL",
            TurnType::Objection => "OBJECTION",
            TurnType::Response => "RESPONSE",
            TurnType::Resolution => "RESOLUTION",
            TurnType::Vote => "VOTE",
        }
    }
}

impl fmt::Display for TurnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ballot cast at the end of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteChoice {
    Accept,
    Amend,
    Reject,
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteChoice::Accept => f.write_str("ACCEPT"),
            VoteChoice::Amend => f.write_str("AMEND"),
            VoteChoice::Reject => f.write_str("REJECT"),
        }
    }
}
