//! Global governance parameters

use crate::{Error, Result};
use ledger_core::{Amount, Percent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rules every proposal is evaluated against. Mutable only through an
/// executed governance-parameters proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceParameters {
    /// Voting power required to activate a proposal
    pub proposal_threshold: Amount,
    /// Voting window, seconds
    pub voting_period: u64,
    /// Delay between voting end and execution, seconds
    pub execution_delay: u64,
    /// For-ratio required to pass
    pub passing_threshold: Percent,
    /// Participation required to pass
    pub quorum_threshold: Percent,
    /// For-ratio required for emergency proposals
    pub emergency_threshold: Percent,
    /// Execution delay for emergency proposals, seconds
    pub emergency_execution_delay: u64,
    /// Maximum concurrently active proposals
    pub max_proposals: u32,
    /// Minimum seconds between activations by one proposer
    pub proposal_cooldown: u64,
}

impl Default for GovernanceParameters {
    fn default() -> Self {
        let pct = |v: u32| Percent::new(Decimal::from(v)).unwrap_or(Percent::HUNDRED);
        Self {
            proposal_threshold: Amount::new(100),
            voting_period: 3 * 24 * 3600,
            execution_delay: 2 * 24 * 3600,
            passing_threshold: pct(50),
            quorum_threshold: pct(10),
            emergency_threshold: pct(67),
            emergency_execution_delay: 3600,
            max_proposals: 10,
            proposal_cooldown: 24 * 3600,
        }
    }
}

impl GovernanceParameters {
    /// Check ranges
    pub fn validate(&self) -> Result<()> {
        if self.voting_period == 0 {
            return Err(Error::InvalidParameters("voting period must be positive".to_string()));
        }
        if self.passing_threshold == Percent::ZERO {
            return Err(Error::InvalidParameters("passing threshold must be positive".to_string()));
        }
        if self.emergency_threshold == Percent::ZERO {
            return Err(Error::InvalidParameters(
                "emergency threshold must be positive".to_string(),
            ));
        }
        if self.max_proposals == 0 {
            return Err(Error::InvalidParameters("max proposals must be at least 1".to_string()));
        }
        if self.emergency_execution_delay > self.execution_delay {
            return Err(Error::InvalidParameters(format!(
                "emergency delay {}s exceeds regular delay {}s",
                self.emergency_execution_delay, self.execution_delay
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        GovernanceParameters::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_voting_period() {
        let params = GovernanceParameters {
            voting_period: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(GovernanceParameters::default()).unwrap();
        assert!(json.get("quorumThreshold").is_some());
        assert!(json.get("emergencyExecutionDelay").is_some());
        assert_eq!(json["proposalThreshold"], "100");
    }

    #[test]
    fn test_json_round_trip() {
        let params = GovernanceParameters {
            passing_threshold: Percent::new(Decimal::new(665, 1)).unwrap(),
            ..Default::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(serde_json::from_str::<GovernanceParameters>(&json).unwrap(), params);
    }

    #[test]
    fn test_json_rejects_threshold_over_hundred() {
        let mut json = serde_json::to_value(GovernanceParameters::default()).unwrap();
        json["quorumThreshold"] = serde_json::json!("101");
        assert!(serde_json::from_value::<GovernanceParameters>(json).is_err());
    }
}
