use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::match_id::MatchId;
use crate::record::PlayerRecord;
use crate::team::Team;

/// JSON shape accepted by `ingest` for hand-entered scoreboards.
#[derive(Debug, Clone, Serialize)]
pub struct MatchTemplate {
    pub match_id: MatchId,
    pub team: Team,
    pub players: Vec<PlayerRecord>,
}

impl MatchTemplate {
    pub fn blank(match_id: MatchId, team: Team, players: usize) -> Self {
        Self {
            match_id,
            team,
            players: vec![PlayerRecord::default(); players],
        }
    }
}

pub fn default_template_path(export_dir: &Path, match_id: &MatchId, team: Team) -> PathBuf {
    export_dir
        .join("templates")
        .join(format!("{}_{}.json", match_id.key(), team.code()))
}

pub fn write_template(path: &Path, template: &MatchTemplate) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(template).context("encode template")?;
    fs::write(path, json).with_context(|| format!("write template {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::decode_json;

    #[test]
    fn blank_template_decodes_as_input() {
        let id = MatchId::parse("20260118_203000").unwrap();
        let template = MatchTemplate::blank(id, Team::Enemy, 3);
        let json = serde_json::to_string(&template).unwrap();
        let input = decode_json(&json).unwrap();
        assert_eq!(input.match_id, Some(id));
        assert_eq!(input.team, Some(Team::Enemy));
        assert_eq!(input.players.len(), 3);
        assert!(input.players.iter().all(|p| p.damage == 0));
    }

    #[test]
    fn default_path_names_match_and_team() {
        let id = MatchId::parse("20260118").unwrap();
        let path = default_template_path(Path::new("outputs"), &id, Team::Yb);
        assert_eq!(path, Path::new("outputs/templates/20260118_yb.json"));
    }
}
