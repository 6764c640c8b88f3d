use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two independent deliberation teams in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamId {
    A,
    B,
}

impl TeamId {
    pub const BOTH: [TeamId; 2] = [TeamId::A, TeamId::B];

    /// The other team in the same match.
    pub fn other(self) -> TeamId {
        match self {
            TeamId::A => TeamId::B,
            TeamId::B => TeamId::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TeamId::A => "A",
            TeamId::B => "B",
        }
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
