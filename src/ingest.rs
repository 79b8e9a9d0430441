//! Game data ingestion.
//!
//! Accepts either a top-level JSON array of game records or an object with
//! a `games` array. The whole file is validated before anything is written:
//! one bad record rejects the file.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::index::{GameIndex, UpsertStats};
use crate::models::GameRecord;

/// Read and validate every game record in `path`.
pub fn load_game_records(path: &Path) -> Result<Vec<GameRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read games file: {}", path.display()))?;
    parse_game_records(&content).with_context(|| format!("Invalid games file: {}", path.display()))
}

/// Parse a games JSON document.
pub fn parse_game_records(content: &str) -> Result<Vec<GameRecord>> {
    let payload: serde_json::Value =
        serde_json::from_str(content).context("Failed to parse JSON")?;

    let rows = match payload {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(mut map) => match map.remove("games") {
            Some(serde_json::Value::Array(rows)) => rows,
            Some(_) => bail!("'games' must be a list of game records"),
            None => Vec::new(),
        },
        _ => bail!("Expected a list of game records or an object with a 'games' list"),
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| -> Result<GameRecord> {
            let record: GameRecord = serde_json::from_value(row)
                .with_context(|| format!("game record #{} is invalid", i))?;
            if record.id.trim().is_empty() {
                bail!("game record #{} has an empty id", i);
            }
            Ok(record)
        })
        .collect()
}

/// Load `path` and upsert every record into `index`.
pub async fn ingest_file(index: &GameIndex, path: &Path) -> Result<UpsertStats> {
    let records = load_game_records(path)?;
    if records.is_empty() {
        tracing::warn!(path = %path.display(), "games file contains no records");
        return Ok(UpsertStats::default());
    }
    index.upsert_games(&records).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_top_level_list() {
        let records = parse_game_records(
            r#"[
                {"id": "001", "title": "Gran Turismo", "description": "Racing", "genre": ["Racing"]},
                {"id": "002", "title": "Pokemon Gold", "description": "RPG", "platforms": ["Game Boy Color"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].genre, vec!["Racing".to_string()]);
        assert_eq!(records[1].platforms, vec!["Game Boy Color".to_string()]);
    }

    #[test]
    fn test_parse_games_object() {
        let records = parse_game_records(
            r#"{"games": [{"id": "001", "title": "Tetris", "description": "Blocks", "publisher": "Nintendo", "release_date": "1989-06-14"}]}"#,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].publisher.as_deref(), Some("Nintendo"));
    }

    #[test]
    fn test_object_without_games_is_empty() {
        let records = parse_game_records(r#"{"other": []}"#).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_missing_required_field_is_fatal() {
        let err = parse_game_records(
            r#"[
                {"id": "001", "title": "Ok", "description": "Fine"},
                {"id": "002", "title": "No description"}
            ]"#,
        )
        .unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("game record #1"), "unexpected error: {}", msg);
        assert!(msg.contains("description"), "unexpected error: {}", msg);
    }

    #[test]
    fn test_empty_id_is_rejected() {
        let err = parse_game_records(r#"[{"id": " ", "title": "T", "description": "D"}]"#)
            .unwrap_err();
        assert!(err.to_string().contains("empty id"));
    }

    #[test]
    fn test_unparsable_json_is_fatal() {
        assert!(parse_game_records("[{not json").is_err());
        assert!(parse_game_records("42").is_err());
        assert!(parse_game_records(r#"{"games": "nope"}"#).is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = load_game_records(Path::new("/nonexistent/games.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read games file"));
    }
}
