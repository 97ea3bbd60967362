use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::StoreError;
use crate::match_store::{MatchRecord, MatchRecordStore, MoneylinePrices};

const CACHE_DIR: &str = "matchday_edge";
const DB_FILE: &str = "historical_matches.sqlite";
const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str = r#"
    SELECT
        match_id, match_date, season, home_team, away_team,
        home_goals, away_goals, home_goals_ht, away_goals_ht,
        home_corners, away_corners, home_corners_ht, away_corners_ht,
        corners_ht_estimated, price_home, price_draw, price_away
    FROM matches
"#;

/// `HIST_DB_PATH`, else the per-user cache directory.
pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HIST_DB_PATH")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}

pub fn open_db(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS matches (
            match_id INTEGER PRIMARY KEY,
            match_date TEXT NOT NULL,
            season TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NOT NULL,
            away_goals INTEGER NOT NULL,
            home_goals_ht INTEGER NOT NULL,
            away_goals_ht INTEGER NOT NULL,
            home_corners INTEGER NOT NULL,
            away_corners INTEGER NOT NULL,
            home_corners_ht INTEGER NOT NULL,
            away_corners_ht INTEGER NOT NULL,
            corners_ht_estimated INTEGER NOT NULL,
            price_home REAL NULL,
            price_draw REAL NULL,
            price_away REAL NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(match_date);
        CREATE INDEX IF NOT EXISTS idx_matches_home ON matches(home_team, match_date);
        CREATE INDEX IF NOT EXISTS idx_matches_away ON matches(away_team, match_date);
        "#,
    )?;
    Ok(())
}

fn upsert_match(tx: &rusqlite::Transaction<'_>, m: &MatchRecord) -> Result<(), StoreError> {
    let prices = m.moneyline_prices;
    let id = i64::try_from(m.id).map_err(|_| StoreError::InvalidRow {
        id: m.id,
        reason: "id does not fit a sqlite integer".to_string(),
    })?;
    tx.execute(
        r#"
        INSERT INTO matches (
            match_id, match_date, season, home_team, away_team,
            home_goals, away_goals, home_goals_ht, away_goals_ht,
            home_corners, away_corners, home_corners_ht, away_corners_ht,
            corners_ht_estimated, price_home, price_draw, price_away, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15, ?16, ?17, ?18
        )
        ON CONFLICT(match_id) DO UPDATE SET
            match_date = excluded.match_date,
            season = excluded.season,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            home_goals_ht = excluded.home_goals_ht,
            away_goals_ht = excluded.away_goals_ht,
            home_corners = excluded.home_corners,
            away_corners = excluded.away_corners,
            home_corners_ht = excluded.home_corners_ht,
            away_corners_ht = excluded.away_corners_ht,
            corners_ht_estimated = excluded.corners_ht_estimated,
            price_home = excluded.price_home,
            price_draw = excluded.price_draw,
            price_away = excluded.price_away,
            updated_at = excluded.updated_at
        "#,
        params![
            id,
            m.date.format(DATE_FORMAT).to_string(),
            m.season,
            m.home_team,
            m.away_team,
            m.home_goals,
            m.away_goals,
            m.home_goals_ht,
            m.away_goals_ht,
            m.home_corners,
            m.away_corners,
            m.home_corners_ht,
            m.away_corners_ht,
            m.corners_ht_estimated as i64,
            prices.map(|p| p.home),
            prices.map(|p| p.draw),
            prices.map(|p| p.away),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get::<_, i64>(0)?,
        date: row.get(1)?,
        season: row.get(2)?,
        home_team: row.get(3)?,
        away_team: row.get(4)?,
        counts: [
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
            row.get(10)?,
            row.get(11)?,
            row.get(12)?,
        ],
        corners_ht_estimated: row.get::<_, i64>(13)? != 0,
        prices: [row.get(14)?, row.get(15)?, row.get(16)?],
    })
}

struct RawRow {
    id: i64,
    date: String,
    season: String,
    home_team: String,
    away_team: String,
    counts: [i64; 8],
    corners_ht_estimated: bool,
    prices: [Option<f64>; 3],
}

impl RawRow {
    fn into_record(self) -> Result<MatchRecord, StoreError> {
        let id = u64::try_from(self.id).map_err(|_| StoreError::InvalidRow {
            id: 0,
            reason: format!("negative match id {}", self.id),
        })?;
        let invalid = |reason: String| StoreError::InvalidRow { id, reason };
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|err| invalid(format!("match_date {:?}: {err}", self.date)))?;
        let mut counts = [0u8; 8];
        for (slot, raw) in counts.iter_mut().zip(self.counts) {
            *slot = u8::try_from(raw).map_err(|_| invalid(format!("count {raw} out of range")))?;
        }
        let moneyline_prices = match self.prices {
            [Some(home), Some(draw), Some(away)] => Some(MoneylinePrices { home, draw, away }),
            _ => None,
        };
        Ok(MatchRecord {
            id,
            date,
            season: self.season,
            home_team: self.home_team,
            away_team: self.away_team,
            home_goals: counts[0],
            away_goals: counts[1],
            home_goals_ht: counts[2],
            away_goals_ht: counts[3],
            home_corners: counts[4],
            away_corners: counts[5],
            home_corners_ht: counts[6],
            away_corners_ht: counts[7],
            corners_ht_estimated: self.corners_ht_estimated,
            moneyline_prices,
        })
    }
}

/// SQLite-backed [`MatchRecordStore`]. Dates are stored as ISO `YYYY-MM-DD`
/// text, so string comparison orders them chronologically.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace by match id, in one transaction.
    pub fn upsert_matches(&self, matches: &[MatchRecord]) -> Result<usize, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for m in matches {
            upsert_match(&tx, m)?;
        }
        tx.commit()?;
        Ok(matches.len())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    pub fn date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>, StoreError> {
        let row: Option<(Option<String>, Option<String>)> = self
            .lock()
            .query_row(
                "SELECT MIN(match_date), MAX(match_date) FROM matches",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((Some(lo), Some(hi))) = row else {
            return Ok(None);
        };
        let parse = |s: &str| NaiveDate::parse_from_str(s, DATE_FORMAT).ok();
        Ok(parse(&lo).zip(parse(&hi)))
    }

    fn query(
        &self,
        where_clause: &str,
        order: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<MatchRecord>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE {where_clause} ORDER BY {order}");
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(args, decode_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_record()?);
        }
        Ok(out)
    }
}

fn iso(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Lower bound for optional `since`; the empty string sorts before any date.
fn iso_since(since: Option<NaiveDate>) -> String {
    since.map(iso).unwrap_or_default()
}

impl MatchRecordStore for SqliteStore {
    fn team_matches(
        &self,
        team: &str,
        before: NaiveDate,
        since: Option<NaiveDate>,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        self.query(
            "(home_team = ?1 OR away_team = ?1) AND match_date < ?2 AND match_date >= ?3",
            "match_date ASC, match_id ASC",
            &[&team, &iso(before), &iso_since(since)],
        )
    }

    fn head_to_head(
        &self,
        team_a: &str,
        team_b: &str,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        let mut rows = self.query(
            "((home_team = ?1 AND away_team = ?2) OR (home_team = ?2 AND away_team = ?1))
             AND match_date < ?3",
            "match_date DESC, match_id DESC LIMIT ?4",
            &[&team_a, &team_b, &iso(before), &(limit as i64)],
        )?;
        rows.reverse();
        Ok(rows)
    }

    fn matches_between(
        &self,
        since: Option<NaiveDate>,
        before: NaiveDate,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        self.query(
            "match_date < ?1 AND match_date >= ?2",
            "match_date ASC, match_id ASC",
            &[&iso(before), &iso_since(since)],
        )
    }
}
