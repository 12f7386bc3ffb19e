//! Trust scoring.

use serde::{Deserialize, Serialize};

use crate::result::RiskScore;

/// Coarse trust grade for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    #[default]
    Unknown,
    Trusted,
    Verified,
    Suspicious,
    /// Set by operators only; never produced by [`score`]
    Blocked,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Trusted => "trusted",
            Self::Verified => "verified",
            Self::Suspicious => "suspicious",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "trusted" => Ok(Self::Trusted),
            "verified" => Ok(Self::Verified),
            "suspicious" => Ok(Self::Suspicious),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown trust level: {other}")),
        }
    }
}

/// Map an outcome and its history to a trust level. First match wins.
pub fn score(verified: bool, risk: RiskScore, verification_count: u32) -> TrustLevel {
    let risk = risk.value();
    if !verified || risk >= 80 {
        TrustLevel::Suspicious
    } else if risk >= 50 {
        TrustLevel::Unknown
    } else if verification_count > 5 && risk < 20 {
        TrustLevel::Verified
    } else {
        TrustLevel::Trusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(value: u8) -> RiskScore {
        RiskScore::new(value)
    }

    #[test]
    fn test_unverified_is_always_suspicious() {
        for risk in [0, 5, 50, 100] {
            assert_eq!(score(false, r(risk), 100), TrustLevel::Suspicious);
        }
    }

    #[test]
    fn test_risk_ladder() {
        assert_eq!(score(true, r(80), 10), TrustLevel::Suspicious);
        assert_eq!(score(true, r(79), 10), TrustLevel::Unknown);
        assert_eq!(score(true, r(50), 10), TrustLevel::Unknown);
        assert_eq!(score(true, r(49), 10), TrustLevel::Trusted);
        assert_eq!(score(true, r(20), 10), TrustLevel::Trusted);
    }

    #[test]
    fn test_verified_requires_history_and_low_risk() {
        for count in 0..20u32 {
            for risk in 0..=100u8 {
                let level = score(true, r(risk), count);
                let expected = risk < 20 && count > 5;
                assert_eq!(level == TrustLevel::Verified, expected, "risk {risk} count {count}");
            }
        }
    }

    #[test]
    fn test_blocked_is_never_scored() {
        for risk in 0..=100u8 {
            assert_ne!(score(true, r(risk), 50), TrustLevel::Blocked);
            assert_ne!(score(false, r(risk), 50), TrustLevel::Blocked);
        }
    }

    #[test]
    fn test_round_trips_names() {
        for level in [
            TrustLevel::Unknown,
            TrustLevel::Trusted,
            TrustLevel::Verified,
            TrustLevel::Suspicious,
            TrustLevel::Blocked,
        ] {
            assert_eq!(level.as_str().parse::<TrustLevel>().unwrap(), level);
        }
        assert!("trusty".parse::<TrustLevel>().is_err());
    }
}
