//! Type definitions for the event bus

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Pool creation, fee adjustments, reconfiguration
    PoolUpdates,
    /// Proposal status changes
    ProposalUpdates,
    /// Votes and delegation changes
    VoteUpdates,
    /// Liquidity position changes
    LiquidityUpdates,
    /// Market samples and treasury movements
    AnalyticsUpdates,
}

impl Channel {
    /// Every channel
    pub const ALL: [Channel; 5] = [
        Channel::PoolUpdates,
        Channel::ProposalUpdates,
        Channel::VoteUpdates,
        Channel::LiquidityUpdates,
        Channel::AnalyticsUpdates,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::PoolUpdates => "pool_updates",
            Channel::ProposalUpdates => "proposal_updates",
            Channel::VoteUpdates => "vote_updates",
            Channel::LiquidityUpdates => "liquidity_updates",
            Channel::AnalyticsUpdates => "analytics_updates",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Channel::PoolUpdates => 0,
            Channel::ProposalUpdates => 1,
            Channel::VoteUpdates => 2,
            Channel::LiquidityUpdates => 3,
            Channel::AnalyticsUpdates => 4,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| crate::Error::UnknownChannel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::PoolUpdates.as_str(), "pool_updates");
        assert_eq!(
            serde_json::to_string(&Channel::AnalyticsUpdates).unwrap(),
            "\"analytics_updates\""
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
            assert_eq!(Channel::ALL[channel.index()], channel);
        }
        assert!("trades".parse::<Channel>().is_err());
    }
}
