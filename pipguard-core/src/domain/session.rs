//! Trading sessions as a flag set, and the session gate predicate.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Set of market sessions.
///
/// Serialized as a list of names, e.g. `["london", "new_york"]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct MarketSession(u8);

impl MarketSession {
    pub const NONE: Self = Self(0);
    pub const SYDNEY: Self = Self(1);
    pub const TOKYO: Self = Self(1 << 1);
    pub const LONDON: Self = Self(1 << 2);
    pub const NEW_YORK: Self = Self(1 << 3);

    const NAMED: [(&'static str, MarketSession); 4] = [
        ("sydney", Self::SYDNEY),
        ("tokyo", Self::TOKYO),
        ("london", Self::LONDON),
        ("new_york", Self::NEW_YORK),
    ];

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is also set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sessions open at `time`, using fixed UTC hours (no DST adjustment).
    ///
    /// Sydney 21–06, Tokyo 00–09, London 07–16, New York 12–21.
    pub fn active_at(time: DateTime<Utc>) -> Self {
        let h = time.hour();
        let mut active = Self::NONE;
        if !(6..21).contains(&h) {
            active = active | Self::SYDNEY;
        }
        if h < 9 {
            active = active | Self::TOKYO;
        }
        if (7..16).contains(&h) {
            active = active | Self::LONDON;
        }
        if (12..21).contains(&h) {
            active = active | Self::NEW_YORK;
        }
        active
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for MarketSession {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl FromStr for MarketSession {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::NAMED
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, flag)| *flag)
            .ok_or_else(|| format!("unknown market session: {s}"))
    }
}

impl TryFrom<Vec<String>> for MarketSession {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        names
            .iter()
            .try_fold(Self::NONE, |acc, name| Ok(acc | name.parse::<Self>()?))
    }
}

impl From<MarketSession> for Vec<String> {
    fn from(session: MarketSession) -> Self {
        session.names().into_iter().map(String::from).collect()
    }
}

impl fmt::Display for MarketSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.names().join("|"))
        }
    }
}

/// Is the market currently inside the configured session?
///
/// An empty configured set is always in session.
pub fn in_session(current: MarketSession, configured: MarketSession) -> bool {
    current.contains(configured)
}
