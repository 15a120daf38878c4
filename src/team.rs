use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::match_id::MatchId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Yb,
    Enemy,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::Yb, Team::Enemy];

    /// Short code used on the command line and in snapshot names.
    pub fn code(self) -> &'static str {
        match self {
            Team::Yb => "yb",
            Team::Enemy => "enemy",
        }
    }

    /// Human-readable label written to snapshot rows.
    pub fn label(self) -> &'static str {
        match self {
            Team::Yb => "YoungBuffalo",
            Team::Enemy => "Enemy",
        }
    }

    pub fn master_table(self) -> &'static str {
        match self {
            Team::Yb => "youngbuffalo_stats",
            Team::Enemy => "enemy_all_stats",
        }
    }

    pub fn latest_view(self) -> &'static str {
        match self {
            Team::Yb => "yb_stats",
            Team::Enemy => "enemy_stats",
        }
    }

    /// Prefix for the master table's index names.
    pub(crate) fn index_prefix(self) -> &'static str {
        match self {
            Team::Yb => "idx_yb",
            Team::Enemy => "idx_enemy",
        }
    }

    pub fn snapshot_table(self, id: &MatchId) -> String {
        format!("{}_stats_{}", self.code(), id.key())
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Team {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yb" | "youngbuffalo" => Ok(Team::Yb),
            "enemy" => Ok(Team::Enemy),
            other => Err(anyhow!("unknown team {other:?}; expected yb or enemy")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_follow_convention() {
        let id = MatchId::parse("20260119_203000").unwrap();
        assert_eq!(Team::Yb.snapshot_table(&id), "yb_stats_20260119_203000");
        assert_eq!(Team::Enemy.snapshot_table(&id), "enemy_stats_20260119_203000");
        assert_eq!(Team::Yb.master_table(), "youngbuffalo_stats");
        assert_eq!(Team::Enemy.latest_view(), "enemy_stats");
    }

    #[test]
    fn parses_codes() {
        assert_eq!("YB".parse::<Team>().unwrap(), Team::Yb);
        assert_eq!("enemy".parse::<Team>().unwrap(), Team::Enemy);
        assert!("ally".parse::<Team>().is_err());
    }
}
