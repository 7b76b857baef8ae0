use crate::error::ReconcileError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a collection as reported by the payment provider.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum CollectionStatus {
    Initiated,
    Pending,
    Processing,
    Success,
    Failed,
}

impl CollectionStatus {
    pub const ALL: [CollectionStatus; 5] = [
        Self::Initiated,
        Self::Pending,
        Self::Processing,
        Self::Success,
        Self::Failed,
    ];

    /// Position in the forward-only hierarchy. Both terminal statuses share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Initiated => 1,
            Self::Pending => 2,
            Self::Processing => 3,
            Self::Success | Self::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionStatus {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == upper)
            .ok_or_else(|| ReconcileError::ValidationError(format!("Unknown status: {}", s)))
    }
}

/// Decides whether moving a collection from `current` to `proposed` is safe.
///
/// Rules, first match wins:
/// 1. same status: always applies, so identical redeliveries never error
/// 2. `allow_override`: operator escape hatch
/// 3. strictly higher rank: forward progression
/// 4. anything else is blocked, including every exit from a terminal status
pub fn should_apply(
    current: CollectionStatus,
    proposed: CollectionStatus,
    allow_override: bool,
) -> bool {
    if proposed == current {
        return true;
    }
    if allow_override {
        return true;
    }
    proposed.rank() > current.rank()
}

#[cfg(test)]
mod tests {
    use super::*;
    use CollectionStatus::*;

    #[test]
    fn test_same_status_always_applies() {
        for status in CollectionStatus::ALL {
            assert!(should_apply(status, status, false), "{status} -> {status}");
        }
    }

    #[test]
    fn test_forward_progression() {
        assert!(should_apply(Initiated, Pending, false));
        assert!(should_apply(Initiated, Success, false));
        assert!(should_apply(Pending, Processing, false));
        assert!(should_apply(Processing, Failed, false));
    }

    #[test]
    fn test_no_regression_without_override() {
        for current in CollectionStatus::ALL {
            for proposed in CollectionStatus::ALL {
                if proposed != current && proposed.rank() < current.rank() {
                    assert!(!should_apply(current, proposed, false), "{current} -> {proposed}");
                    assert!(should_apply(current, proposed, true), "{current} -> {proposed}");
                }
            }
        }
    }

    #[test]
    fn test_terminal_statuses_are_locked() {
        for current in [Success, Failed] {
            for proposed in CollectionStatus::ALL {
                if proposed != current {
                    assert!(!should_apply(current, proposed, false), "{current} -> {proposed}");
                }
            }
        }
        assert!(should_apply(Success, Failed, true));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("success".parse::<CollectionStatus>().unwrap(), Success);
        assert_eq!(" Processing ".parse::<CollectionStatus>().unwrap(), Processing);
        assert!(matches!(
            "settled".parse::<CollectionStatus>(),
            Err(ReconcileError::ValidationError(_))
        ));
    }
}
