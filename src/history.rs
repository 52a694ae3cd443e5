use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::Result;
use crate::session::{Modality, RoundSummary};

/// Log of finished rounds
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open (or create) the database at `path`, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS rounds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                modality TEXT NOT NULL,
                n_back INTEGER NOT NULL,
                total_events INTEGER NOT NULL,
                score INTEGER NOT NULL,
                possible_matches INTEGER NOT NULL,
                new_high_score BOOLEAN NOT NULL,
                finished_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_rounds_mode ON rounds(modality, n_back)",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn record(&self, summary: &RoundSummary) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO rounds
            (modality, n_back, total_events, score, possible_matches, new_high_score, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                modality_key(summary.modality),
                summary.n_back as i64,
                summary.total_events as i64,
                summary.score,
                summary.possible_matches,
                summary.new_high_score,
                summary.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent rounds first
    pub fn recent(&self, limit: usize) -> Result<Vec<RoundSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT modality, n_back, total_events, score, possible_matches, new_high_score, finished_at
            FROM rounds
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let modality: String = row.get(0)?;
            let finished_at: String = row.get(6)?;
            let finished_at = DateTime::parse_from_rfc3339(&finished_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        6,
                        "finished_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);

            Ok(RoundSummary {
                modality: parse_modality(&modality).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(
                        0,
                        "modality".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?,
                n_back: row.get::<_, i64>(1)? as usize,
                total_events: row.get::<_, i64>(2)? as usize,
                score: row.get(3)?,
                possible_matches: row.get(4)?,
                new_high_score: row.get(5)?,
                finished_at,
            })
        })?;

        let mut summaries = Vec::new();
        for summary in rows {
            summaries.push(summary?);
        }
        Ok(summaries)
    }

    /// Best score recorded for a modality at a given N
    pub fn best_score(&self, modality: Modality, n_back: usize) -> Result<Option<u32>> {
        let best = self
            .conn
            .query_row(
                "SELECT MAX(score) FROM rounds WHERE modality = ?1 AND n_back = ?2",
                params![modality_key(modality), n_back as i64],
                |row| row.get::<_, Option<u32>>(0),
            )
            .optional()?;
        Ok(best.flatten())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM rounds", [])?;
        Ok(())
    }
}

fn modality_key(modality: Modality) -> &'static str {
    match modality {
        Modality::Visual => "visual",
        Modality::Audio => "audio",
        Modality::AudioVisual => "audio_visual",
    }
}

fn parse_modality(key: &str) -> Option<Modality> {
    match key {
        "visual" => Some(Modality::Visual),
        "audio" => Some(Modality::Audio),
        "audio_visual" => Some(Modality::AudioVisual),
        _ => None,
    }
}
