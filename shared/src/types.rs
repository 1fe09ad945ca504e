//! Common types used across the clinic inventory

use serde::{Deserialize, Serialize};

/// Service region of a client or a prosthesis price list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Region {
    #[serde(rename = "Moscow")]
    Moscow,
    #[serde(rename = "Moscow region")]
    MoscowRegion,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Moscow => "Moscow",
            Region::MoscowRegion => "Moscow region",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Region {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Moscow" => Ok(Region::Moscow),
            "Moscow region" => Ok(Region::MoscowRegion),
            _ => Err("Unknown region"),
        }
    }
}
