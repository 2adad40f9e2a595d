//! Verification results.

use serde::{Deserialize, Serialize};
use crate::id::BlockerId;
use crate::Time;

/// Which side of a resolution is confirming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmingParty {
    /// The person who reported the blocker
    Reporter,
    /// The person who resolved it
    Resolver,
}

impl std::str::FromStr for ConfirmingParty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reporter" => Ok(ConfirmingParty::Reporter),
            "resolver" => Ok(ConfirmingParty::Resolver),
            other => Err(format!("unknown party: {other}")),
        }
    }
}

/// Outcome of one verification round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Blocker verified
    pub blocker_id: BlockerId,

    /// Reporter confirmed the blocker is gone
    pub reporter_confirmed: bool,

    /// Resolver confirmed the fix
    pub resolver_confirmed: bool,

    /// When the round concluded
    pub verified_at: Time,

    /// The blocker came back
    pub returned: bool,

    /// Free-form notes
    pub notes: String,
}

impl VerificationResult {
    /// Passed when both parties confirmed and the blocker did not return.
    pub fn passed(&self) -> bool {
        self.reporter_confirmed && self.resolver_confirmed && !self.returned
    }
}
