extern crate self as worldbuild_domain;

pub mod canon;
pub mod challenge;
pub mod events;
pub mod hash;
pub mod ids;
pub mod patch;
pub mod prompt_pack;
pub mod role;
pub mod team;
pub mod turn;

pub use canon::*;
pub use challenge::Challenge;
pub use events::*;
pub use hash::{canonical_json, content_hash};
pub use ids::*;
pub use patch::{apply_patch, PatchError, PatchOp};
pub use prompt_pack::{ImagePrompt, PromptPack};
pub use role::{Role, TurnType, VoteChoice};
pub use team::TeamId;
pub use turn::{TurnOutput, TurnVote};
