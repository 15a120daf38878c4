use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::match_id::MatchId;
use crate::team::Team;

/// Integer metric columns, in storage order.
pub const METRIC_COLUMNS: [&str; 8] = [
    "defeated",
    "assist",
    "defeated_2",
    "fun_coin",
    "damage",
    "tank",
    "heal",
    "siege_damage",
];

/// One player's line of a match scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_name: String,
    pub defeated: i64,
    pub assist: i64,
    pub defeated_2: i64,
    pub fun_coin: i64,
    pub damage: i64,
    pub tank: i64,
    pub heal: i64,
    pub siege_damage: i64,
}

impl PlayerRecord {
    pub fn named(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            ..Self::default()
        }
    }

    /// Metric values in [`METRIC_COLUMNS`] order.
    pub fn metrics(&self) -> [i64; 8] {
        [
            self.defeated,
            self.assist,
            self.defeated_2,
            self.fun_coin,
            self.damage,
            self.tank,
            self.heal,
            self.siege_damage,
        ]
    }

    fn set_metric(&mut self, idx: usize, value: i64) {
        match idx {
            0 => self.defeated = value,
            1 => self.assist = value,
            2 => self.defeated_2 = value,
            3 => self.fun_coin = value,
            4 => self.damage = value,
            5 => self.tank = value,
            6 => self.heal = value,
            _ => self.siege_damage = value,
        }
    }

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            player_name: row.get("player_name")?,
            defeated: row.get("defeated")?,
            assist: row.get("assist")?,
            defeated_2: row.get("defeated_2")?,
            fun_coin: row.get("fun_coin")?,
            damage: row.get("damage")?,
            tank: row.get("tank")?,
            heal: row.get("heal")?,
            siege_damage: row.get("siege_damage")?,
        })
    }
}

/// Player rows plus whatever match metadata the source file carried.
#[derive(Debug, Clone, Default)]
pub struct PlayerInput {
    pub match_id: Option<MatchId>,
    pub team: Option<Team>,
    pub players: Vec<PlayerRecord>,
}

/// Decodes a scoreboard CSV. The header must name `player_name` and every
/// metric column; other columns are ignored.
pub fn decode_csv<R: Read>(reader: R) -> Result<Vec<PlayerRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers().context("read csv header")?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);

    let mut missing = Vec::new();
    let name_idx = position("player_name");
    if name_idx.is_none() {
        missing.push("player_name".to_string());
    }
    let mut metric_idx = [0usize; 8];
    for (slot, column) in METRIC_COLUMNS.into_iter().enumerate() {
        match position(column) {
            Some(idx) => metric_idx[slot] = idx,
            None => missing.push(column.to_string()),
        }
    }
    let Some(name_idx) = name_idx.filter(|_| missing.is_empty()) else {
        return Err(InputError::MissingColumns(missing).into());
    };

    let extra: Vec<&str> = headers
        .iter()
        .filter(|h| *h != "player_name" && !METRIC_COLUMNS.contains(h))
        .collect();
    if !extra.is_empty() {
        tracing::warn!(columns = ?extra, "ignoring unknown csv columns");
    }

    let mut out = Vec::new();
    for row in rdr.records() {
        let row = row.context("read csv row")?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        let mut record = PlayerRecord::named(row.get(name_idx).unwrap_or_default());
        if record.player_name.is_empty() {
            return Err(InputError::BlankPlayer { line }.into());
        }
        for (slot, column) in METRIC_COLUMNS.into_iter().enumerate() {
            let raw = row.get(metric_idx[slot]).unwrap_or_default();
            let value = raw.parse::<i64>().map_err(|_| InputError::InvalidNumber {
                line,
                column,
                value: raw.to_string(),
            })?;
            record.set_metric(slot, value);
        }
        out.push(record);
    }
    Ok(out)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonPayload {
    Bare(Vec<PlayerRecord>),
    Wrapped {
        #[serde(default)]
        match_id: Option<String>,
        #[serde(default)]
        team: Option<String>,
        players: Vec<PlayerRecord>,
    },
}

/// Decodes either a bare array of players or a template-shaped object.
pub fn decode_json(raw: &str) -> Result<PlayerInput> {
    let payload: JsonPayload = serde_json::from_str(raw).context("decode player json")?;
    match payload {
        JsonPayload::Bare(players) => Ok(PlayerInput {
            players,
            ..PlayerInput::default()
        }),
        JsonPayload::Wrapped {
            match_id,
            team,
            players,
        } => {
            let match_id = match match_id.as_deref().map(str::trim) {
                Some(raw) if !raw.is_empty() => Some(MatchId::parse(raw)?),
                _ => None,
            };
            let team = match team.as_deref().map(str::trim) {
                Some(raw) if !raw.is_empty() => Some(raw.parse::<Team>()?),
                _ => None,
            };
            Ok(PlayerInput {
                match_id,
                team,
                players,
            })
        }
    }
}

/// Reads a `.csv` or `.json` player file.
pub fn read_input_file(path: &Path) -> Result<PlayerInput> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => {
            let file =
                fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
            let players = decode_csv(file).with_context(|| format!("decode {}", path.display()))?;
            Ok(PlayerInput {
                players,
                ..PlayerInput::default()
            })
        }
        "json" => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            decode_json(&raw).with_context(|| format!("decode {}", path.display()))
        }
        _ => Err(InputError::UnsupportedFormat(path.display().to_string()).into()),
    }
}

/// Checks the rows as a whole: at least one player, no blank or repeated
/// names.
pub fn validate(records: &[PlayerRecord]) -> Result<(), InputError> {
    if records.is_empty() {
        return Err(InputError::Empty);
    }
    let mut seen = HashSet::new();
    for (idx, record) in records.iter().enumerate() {
        let name = record.player_name.trim();
        if name.is_empty() {
            return Err(InputError::BlankPlayer {
                line: idx as u64 + 2,
            });
        }
        if !seen.insert(name) {
            return Err(InputError::DuplicatePlayer(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "player_name,defeated,assist,defeated_2,fun_coin,damage,tank,heal,siege_damage\n";

    #[test]
    fn decodes_rows_in_any_column_order() {
        let raw = "damage,player_name,defeated,assist,defeated_2,fun_coin,tank,heal,siege_damage,guild\n\
                   6896682, Ztee ,16,121,3,0,2071659,0,773143,YB\n";
        let rows = decode_csv(raw.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].player_name, "Ztee");
        assert_eq!(rows[0].damage, 6_896_682);
        assert_eq!(rows[0].siege_damage, 773_143);
    }

    #[test]
    fn reports_every_missing_column() {
        let raw = "player_name,defeated,assist,defeated_2,fun_coin,tank,heal\nA,1,1,1,1,1,1\n";
        let err = decode_csv(raw.as_bytes()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<InputError>(),
            Some(&InputError::MissingColumns(vec![
                "damage".to_string(),
                "siege_damage".to_string()
            ]))
        );
    }

    #[test]
    fn rejects_non_integer_cells() {
        let raw = format!("{HEADER}A,1,2,3,4,5,6,7,8\nB,1,2,3,4,5.5,6,7,8\n");
        let err = decode_csv(raw.as_bytes()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<InputError>(),
            Some(&InputError::InvalidNumber {
                line: 3,
                column: "damage",
                value: "5.5".to_string()
            })
        );
    }

    #[test]
    fn validate_flags_duplicates_and_empty() {
        assert_eq!(validate(&[]), Err(InputError::Empty));
        let rows = vec![PlayerRecord::named("A"), PlayerRecord::named("A")];
        assert_eq!(
            validate(&rows),
            Err(InputError::DuplicatePlayer("A".to_string()))
        );
    }

    #[test]
    fn json_accepts_bare_and_wrapped() {
        let bare = r#"[{"player_name":"A","defeated":1,"assist":0,"defeated_2":0,"fun_coin":0,"damage":10,"tank":0,"heal":0,"siege_damage":0}]"#;
        let input = decode_json(bare).unwrap();
        assert_eq!(input.players.len(), 1);
        assert!(input.match_id.is_none());

        let wrapped = format!(r#"{{"match_id":"20260118_203000","team":"YoungBuffalo","players":{bare}}}"#);
        let input = decode_json(&wrapped).unwrap();
        assert_eq!(input.team, Some(Team::Yb));
        assert_eq!(input.match_id.unwrap().key(), "20260118_203000");
    }
}
