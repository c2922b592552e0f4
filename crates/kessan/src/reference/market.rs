//! Market tiers and index groups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tokyo Stock Exchange market tiers and the Nikkei 225 index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketGroup {
    /// TSE Prime
    Prime,

    /// TSE Standard
    Standard,

    /// TSE Growth
    Growth,

    /// Nikkei 225 constituents
    Nikkei225,
}

impl MarketGroup {
    /// Returns all groups.
    pub fn all() -> Vec<Self> {
        vec![Self::Prime, Self::Standard, Self::Growth, Self::Nikkei225]
    }

    /// Returns the group name, as stored in `master_company.group_name` for
    /// index groups.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Prime => "Prime",
            Self::Standard => "Standard",
            Self::Growth => "Growth",
            Self::Nikkei225 => "Nikkei225",
        }
    }

    /// Whether this is an index rather than a market tier.
    pub const fn is_index(&self) -> bool {
        matches!(self, Self::Nikkei225)
    }

    /// Map a market label (`プライム（内国株式）`, `Prime Market`, ...) to a tier.
    pub fn from_market_label(label: &str) -> Option<Self> {
        if label.contains("プライム") || label.contains("Prime") {
            Some(Self::Prime)
        } else if label.contains("スタンダード") || label.contains("Standard") {
            Some(Self::Standard)
        } else if label.contains("グロース") || label.contains("Growth") {
            Some(Self::Growth)
        } else {
            None
        }
    }

    /// Map a stored group label back to a group.
    pub fn from_group_label(label: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|g| g.name().eq_ignore_ascii_case(label.trim()))
    }
}

impl FromStr for MarketGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prime" => Ok(Self::Prime),
            "standard" => Ok(Self::Standard),
            "growth" => Ok(Self::Growth),
            "nikkei225" | "nikkei" | "n225" => Ok(Self::Nikkei225),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for MarketGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
