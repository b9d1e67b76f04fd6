use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the seven tracked roster slots.
///
/// Declaration order is the fixed processing order, and `Ord` follows it so
/// maps keyed by position iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Qb,
    Rb,
    Wr,
    Te,
    Flex,
    Def,
    K,
}

impl Position {
    pub const ALL: [Position; 7] = [
        Position::Qb,
        Position::Rb,
        Position::Wr,
        Position::Te,
        Position::Flex,
        Position::Def,
        Position::K,
    ];

    /// Lowercase key used in the published artifact (`qb`, `flex`, ...).
    pub fn key(self) -> &'static str {
        match self {
            Position::Qb => "qb",
            Position::Rb => "rb",
            Position::Wr => "wr",
            Position::Te => "te",
            Position::Flex => "flex",
            Position::Def => "def",
            Position::K => "k",
        }
    }

    /// Uppercase tag used in labels and logs (`QB`, `FLEX`, ...).
    pub fn tag(self) -> &'static str {
        match self {
            Position::Qb => "QB",
            Position::Rb => "RB",
            Position::Wr => "WR",
            Position::Te => "TE",
            Position::Flex => "FLEX",
            Position::Def => "DEF",
            Position::K => "K",
        }
    }

    /// Name of the environment variable holding this position's candidate URLs.
    pub fn env_var(self) -> String {
        format!("{}_URLS", self.tag())
    }

    pub fn is_flex(self) -> bool {
        matches!(self, Position::Flex)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Position::ALL
            .into_iter()
            .find(|p| p.key().eq_ignore_ascii_case(needle))
            .ok_or_else(|| format!("unknown position tag: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_case_insensitively() {
        assert_eq!("qb".parse::<Position>().unwrap(), Position::Qb);
        assert_eq!("FLEX".parse::<Position>().unwrap(), Position::Flex);
        assert_eq!(" Def ".parse::<Position>().unwrap(), Position::Def);
        assert!("LB".parse::<Position>().is_err());
    }

    #[test]
    fn ordering_follows_processing_order() {
        let mut shuffled = vec![Position::K, Position::Flex, Position::Qb, Position::Te];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Position::Qb, Position::Te, Position::Flex, Position::K]
        );
    }

    #[test]
    fn serializes_as_lowercase_key() {
        let json = serde_json::to_string(&Position::Def).unwrap();
        assert_eq!(json, "\"def\"");
        assert_eq!(Position::Wr.env_var(), "WR_URLS");
    }
}
