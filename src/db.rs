// SQLite persistence layer for leagues, drafts, rosters, and trades.
//
// All multi-row state transitions run inside explicit transactions, and
// every transition on a Draft or Trade is conditioned on the expected prior
// value (current_pick, status, is_available) so a losing concurrent writer
// observes a conflict — StaleWrite, NotYourTurn, PlayerUnavailable — instead
// of corrupting state. The (draft_id, pick_number) primary key is the
// exactly-once backstop for pick commits.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::draft::order;
use crate::error::CoreError;
use crate::model::{
    Draft, DraftPick, DraftStatus, League, LeagueDraftStatus, Player, Sport, Team, Trade,
    TradeStatus,
};

/// SQLite-backed store for league, draft, roster, and trade records.
pub struct Database {
    conn: Mutex<Connection>,
}

/// The result of a committed pick: the pick itself plus what the caller
/// needs to re-arm the clock and notify subscribers.
#[derive(Debug, Clone)]
pub struct PickCommit {
    pub pick: DraftPick,
    pub completed: bool,
    pub next_team: Option<String>,
    pub pick_time_limit: Option<u32>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS leagues (
                id            TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                sport         TEXT NOT NULL,
                commissioner  TEXT NOT NULL,
                max_teams     INTEGER NOT NULL,
                current_teams INTEGER NOT NULL DEFAULT 0,
                draft_status  TEXT NOT NULL DEFAULT 'pending',
                CHECK (current_teams <= max_teams)
            );

            CREATE TABLE IF NOT EXISTS teams (
                id             TEXT PRIMARY KEY,
                league_id      TEXT NOT NULL REFERENCES leagues(id),
                owner          TEXT NOT NULL,
                name           TEXT NOT NULL,
                draft_position INTEGER,
                UNIQUE (league_id, draft_position)
            );

            CREATE TABLE IF NOT EXISTS players (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                sport        TEXT NOT NULL,
                position     TEXT NOT NULL,
                rank         INTEGER NOT NULL DEFAULT 9999,
                is_available INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS rosters (
                team_id     TEXT NOT NULL REFERENCES teams(id),
                player_id   TEXT NOT NULL REFERENCES players(id),
                league_id   TEXT NOT NULL REFERENCES leagues(id),
                is_starter  INTEGER NOT NULL DEFAULT 0,
                acquired_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (team_id, player_id),
                UNIQUE (league_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS drafts (
                id              TEXT PRIMARY KEY,
                league_id       TEXT NOT NULL UNIQUE REFERENCES leagues(id),
                status          TEXT NOT NULL DEFAULT 'pending',
                current_pick    INTEGER NOT NULL DEFAULT 1,
                total_picks     INTEGER NOT NULL,
                rounds          INTEGER NOT NULL,
                pick_time_limit INTEGER,
                draft_order     TEXT,
                paused          INTEGER NOT NULL DEFAULT 0,
                clock_deadline  TEXT,
                started_at      TEXT,
                completed_at    TEXT
            );

            CREATE TABLE IF NOT EXISTS draft_picks (
                draft_id    TEXT NOT NULL REFERENCES drafts(id),
                pick_number INTEGER NOT NULL,
                team_id     TEXT NOT NULL REFERENCES teams(id),
                player_id   TEXT NOT NULL REFERENCES players(id),
                auto_pick   INTEGER NOT NULL DEFAULT 0,
                made_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (draft_id, pick_number)
            );

            CREATE TABLE IF NOT EXISTS trades (
                id            TEXT PRIMARY KEY,
                league_id     TEXT NOT NULL REFERENCES leagues(id),
                team1_id      TEXT NOT NULL,
                team2_id      TEXT NOT NULL,
                team1_players TEXT NOT NULL,
                team2_players TEXT NOT NULL,
                proposed_by   TEXT NOT NULL,
                status        TEXT NOT NULL DEFAULT 'pending',
                expires_at    TEXT NOT NULL,
                resolved_at   TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_teams_league ON teams(league_id);
            CREATE INDEX IF NOT EXISTS idx_trades_league ON trades(league_id);
            CREATE INDEX IF NOT EXISTS idx_players_pool ON players(sport, is_available, rank, id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Generate a new unique draft ID based on the current UTC timestamp.
    pub fn generate_draft_id() -> String {
        chrono::Utc::now().format("draft_%Y%m%d_%H%M%S_%3f").to_string()
    }

    /// Generate a new unique trade ID based on the current UTC timestamp.
    pub fn generate_trade_id() -> String {
        chrono::Utc::now().format("trade_%Y%m%d_%H%M%S_%3f").to_string()
    }

    // ------------------------------------------------------------------
    // Seeding surface (stands in for the out-of-scope league/player CRUD
    // services; not exposed over the wire)
    // ------------------------------------------------------------------

    pub fn create_league(&self, league: &League) -> Result<(), CoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO leagues (id, name, sport, commissioner, max_teams, current_teams, draft_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                league.id,
                league.name,
                league.sport.as_str(),
                league.commissioner,
                league.max_teams,
                league.current_teams,
                league.draft_status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Register a team in its league. The league's `current_teams` counter
    /// is incremented with a guard against exceeding `max_teams`.
    pub fn add_team(&self, team: &Team) -> Result<(), CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let n = tx.execute(
            "UPDATE leagues SET current_teams = current_teams + 1
             WHERE id = ?1 AND current_teams < max_teams",
            params![team.league_id],
        )?;
        if n == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM leagues WHERE id = ?1)",
                params![team.league_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(CoreError::NotFound(format!("league {}", team.league_id)));
            }
            return Err(CoreError::InvalidState(format!(
                "league {} is full",
                team.league_id
            )));
        }
        tx.execute(
            "INSERT INTO teams (id, league_id, owner, name, draft_position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                team.id,
                team.league_id,
                team.owner,
                team.name,
                team.draft_position,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Assign (or clear) a team's seat in the draft order.
    pub fn set_draft_position(
        &self,
        team_id: &str,
        position: Option<u32>,
    ) -> Result<(), CoreError> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE teams SET draft_position = ?2 WHERE id = ?1",
            params![team_id, position],
        )?;
        if n == 0 {
            return Err(CoreError::NotFound(format!("team {team_id}")));
        }
        Ok(())
    }

    /// Insert a player or update their record if the id already exists.
    /// Availability is never overwritten by a re-import: a drafted player
    /// stays drafted.
    pub fn upsert_player(&self, player: &Player) -> Result<(), CoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO players (id, name, sport, position, rank, is_available)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name     = excluded.name,
                sport    = excluded.sport,
                position = excluded.position,
                rank     = excluded.rank",
            params![
                player.id,
                player.name,
                player.sport.as_str(),
                player.position,
                player.rank,
                player.is_available,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_league(&self, id: &str) -> Result<League, CoreError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, sport, commissioner, max_teams, current_teams, draft_status
             FROM leagues WHERE id = ?1",
            params![id],
            league_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("league {id}")))
    }

    pub fn get_team(&self, id: &str) -> Result<Team, CoreError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, league_id, owner, name, draft_position FROM teams WHERE id = ?1",
            params![id],
            team_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("team {id}")))
    }

    pub fn get_player(&self, id: &str) -> Result<Player, CoreError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, sport, position, rank, is_available FROM players WHERE id = ?1",
            params![id],
            player_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("player {id}")))
    }

    pub fn get_draft(&self, id: &str) -> Result<Draft, CoreError> {
        let conn = self.conn();
        draft_row(&conn, id)?.ok_or_else(|| CoreError::NotFound(format!("draft {id}")))
    }

    pub fn draft_for_league(&self, league_id: &str) -> Result<Option<Draft>, CoreError> {
        let conn = self.conn();
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM drafts WHERE league_id = ?1",
                params![league_id],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => draft_row(&conn, &id),
            None => Ok(None),
        }
    }

    pub fn get_trade(&self, id: &str) -> Result<Trade, CoreError> {
        let conn = self.conn();
        trade_row(&conn, id)?.ok_or_else(|| CoreError::NotFound(format!("trade {id}")))
    }

    /// Teams of a league ordered by draft position (unseated teams last).
    pub fn list_league_teams(&self, league_id: &str) -> Result<Vec<Team>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, league_id, owner, name, draft_position FROM teams
             WHERE league_id = ?1
             ORDER BY draft_position IS NULL, draft_position, id",
        )?;
        let teams = stmt
            .query_map(params![league_id], team_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    /// Player ids currently on a team's roster.
    pub fn team_roster(&self, team_id: &str) -> Result<Vec<String>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT player_id FROM rosters WHERE team_id = ?1 ORDER BY player_id",
        )?;
        let players = stmt
            .query_map(params![team_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(players)
    }

    /// The team currently holding a player within a league, if any.
    pub fn roster_owner(
        &self,
        league_id: &str,
        player_id: &str,
    ) -> Result<Option<String>, CoreError> {
        let conn = self.conn();
        roster_owner_tx(&conn, league_id, player_id)
    }

    /// All picks committed for a draft, ordered by pick number.
    pub fn picks_for_draft(&self, draft_id: &str) -> Result<Vec<DraftPick>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT draft_id, pick_number, team_id, player_id, auto_pick, made_at
             FROM draft_picks WHERE draft_id = ?1 ORDER BY pick_number",
        )?;
        let picks = stmt
            .query_map(params![draft_id], pick_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(picks)
    }

    /// Drafts that were mid-flight when the process last stopped. Used at
    /// startup to re-arm pick clocks.
    pub fn in_progress_drafts(&self) -> Result<Vec<Draft>, CoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id FROM drafts WHERE status = 'in_progress' ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut drafts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(draft) = draft_row(&conn, &id)? {
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }

    // ------------------------------------------------------------------
    // Draft lifecycle commits
    // ------------------------------------------------------------------

    /// Insert a freshly scheduled draft. A league can have at most one
    /// draft; a second insert surfaces as InvalidState.
    pub fn insert_draft(&self, draft: &Draft) -> Result<(), CoreError> {
        let conn = self.conn();
        let order_json = match &draft.draft_order {
            Some(order) => Some(serde_json::to_string(order)?),
            None => None,
        };
        let result = conn.execute(
            "INSERT INTO drafts
                (id, league_id, status, current_pick, total_picks, rounds,
                 pick_time_limit, draft_order, paused, clock_deadline, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                draft.id,
                draft.league_id,
                draft.status.as_str(),
                draft.current_pick,
                draft.total_picks,
                draft.rounds,
                draft.pick_time_limit,
                order_json,
                draft.paused,
                draft.clock_deadline.map(|d| d.to_rfc3339()),
                draft.started_at,
                draft.completed_at,
            ],
        );
        if let Err(e) = result {
            if is_constraint(&e) {
                return Err(CoreError::InvalidState(format!(
                    "league {} already has a draft",
                    draft.league_id
                )));
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Transition a pending draft to in_progress, snapshotting the order.
    /// Conditioned on `status = 'pending'` so a concurrent start loses
    /// cleanly. `total_picks` is re-derived from the snapshot size so teams
    /// seated after scheduling are counted.
    pub fn start_draft_commit(
        &self,
        draft_id: &str,
        draft_order: &[String],
        started_at: DateTime<Utc>,
    ) -> Result<Draft, CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let order_json = serde_json::to_string(draft_order)?;
        let n = tx.execute(
            "UPDATE drafts SET status = 'in_progress', current_pick = 1,
                 draft_order = ?2, started_at = ?3, total_picks = rounds * ?4
             WHERE id = ?1 AND status = 'pending'",
            params![draft_id, order_json, started_at.to_rfc3339(), draft_order.len() as u32],
        )?;
        if n == 0 {
            let draft = draft_row(&tx, draft_id)?
                .ok_or_else(|| CoreError::NotFound(format!("draft {draft_id}")))?;
            return Err(CoreError::InvalidState(format!(
                "draft {draft_id} is {}, not pending",
                draft.status.as_str()
            )));
        }
        tx.execute(
            "UPDATE leagues SET draft_status = 'in_progress'
             WHERE id = (SELECT league_id FROM drafts WHERE id = ?1)",
            params![draft_id],
        )?;
        let draft = draft_row(&tx, draft_id)?
            .ok_or_else(|| CoreError::NotFound(format!("draft {draft_id}")))?;
        tx.commit()?;
        Ok(draft)
    }

    /// Commit a pick submitted by a team. Validates turn order against the
    /// live pick counter and performs the full atomic commit: availability
    /// flip, pick row, roster row, counter advance, completion check.
    pub fn commit_submitted_pick(
        &self,
        draft_id: &str,
        team_id: &str,
        player_id: &str,
    ) -> Result<PickCommit, CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let draft = draft_row(&tx, draft_id)?
            .ok_or_else(|| CoreError::NotFound(format!("draft {draft_id}")))?;
        require_accepting_picks(&draft)?;
        let order = draft
            .draft_order
            .as_deref()
            .ok_or_else(|| CoreError::InvalidState("draft order not snapshotted".into()))?;
        let on_clock = order::team_on_clock(order, draft.current_pick, draft.total_picks)
            .ok_or_else(|| CoreError::InvalidState("no picks remaining".into()))?;
        if on_clock != team_id {
            return Err(CoreError::NotYourTurn {
                team: team_id.to_string(),
                pick: draft.current_pick,
            });
        }
        let commit = apply_pick(&tx, &draft, team_id, player_id, false)?;
        tx.commit()?;
        Ok(commit)
    }

    /// Commit an autopick for `expected_pick`. Returns Ok(None) — a no-op,
    /// never an error — when the draft has moved on, is paused, or is no
    /// longer in progress; duplicate timer firings land here.
    pub fn commit_autopick(
        &self,
        draft_id: &str,
        expected_pick: u32,
    ) -> Result<Option<PickCommit>, CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let draft = draft_row(&tx, draft_id)?
            .ok_or_else(|| CoreError::NotFound(format!("draft {draft_id}")))?;
        if draft.status != DraftStatus::InProgress
            || draft.paused
            || draft.current_pick != expected_pick
        {
            return Ok(None);
        }
        let order = draft
            .draft_order
            .as_deref()
            .ok_or_else(|| CoreError::InvalidState("draft order not snapshotted".into()))?;
        let on_clock = order::team_on_clock(order, draft.current_pick, draft.total_picks)
            .ok_or_else(|| CoreError::InvalidState("no picks remaining".into()))?
            .to_string();
        let sport: String = tx.query_row(
            "SELECT sport FROM leagues WHERE id = ?1",
            params![draft.league_id],
            |row| row.get(0),
        )?;
        // Best available by default ranking; ties broken by lexicographic id.
        let candidate: Option<String> = tx
            .query_row(
                "SELECT id FROM players WHERE sport = ?1 AND is_available = 1
                 ORDER BY rank ASC, id ASC LIMIT 1",
                params![sport],
                |row| row.get(0),
            )
            .optional()?;
        let player_id = candidate.ok_or_else(|| {
            CoreError::InvalidState(format!(
                "no available {sport} players for autopick in draft {draft_id}"
            ))
        })?;
        let commit = apply_pick(&tx, &draft, &on_clock, &player_id, true)?;
        tx.commit()?;
        Ok(Some(commit))
    }

    /// Pause or unpause an in-progress draft. Pausing clears the stored
    /// clock deadline; the pick counter is untouched either way.
    pub fn set_paused(&self, draft_id: &str, paused: bool) -> Result<Draft, CoreError> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE drafts SET paused = ?2,
                 clock_deadline = CASE WHEN ?2 THEN NULL ELSE clock_deadline END
             WHERE id = ?1 AND status = 'in_progress' AND paused = ?3",
            params![draft_id, paused, !paused],
        )?;
        if n == 0 {
            let draft = draft_row(&conn, draft_id)?
                .ok_or_else(|| CoreError::NotFound(format!("draft {draft_id}")))?;
            if draft.status != DraftStatus::InProgress {
                return Err(CoreError::InvalidState(format!(
                    "draft {draft_id} is {}, not in progress",
                    draft.status.as_str()
                )));
            }
            return Err(CoreError::InvalidState(if paused {
                format!("draft {draft_id} is already paused")
            } else {
                format!("draft {draft_id} is not paused")
            }));
        }
        draft_row(&conn, draft_id)?
            .ok_or_else(|| CoreError::NotFound(format!("draft {draft_id}")))
    }

    /// Record (or clear) the armed pick-clock deadline for status reads.
    pub fn set_clock_deadline(
        &self,
        draft_id: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE drafts SET clock_deadline = ?2 WHERE id = ?1",
            params![draft_id, deadline.map(|d| d.to_rfc3339())],
        )?;
        Ok(())
    }

    /// Cancel a pending or in-progress draft: restore availability for every
    /// drafted player, drop the picks and the roster rows they created, and
    /// return the league to its pre-draft state.
    pub fn cancel_draft_commit(&self, draft_id: &str) -> Result<Draft, CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let draft = draft_row(&tx, draft_id)?
            .ok_or_else(|| CoreError::NotFound(format!("draft {draft_id}")))?;
        if !matches!(draft.status, DraftStatus::Pending | DraftStatus::InProgress) {
            return Err(CoreError::InvalidState(format!(
                "draft {draft_id} is {}, cannot cancel",
                draft.status.as_str()
            )));
        }
        tx.execute(
            "UPDATE players SET is_available = 1
             WHERE id IN (SELECT player_id FROM draft_picks WHERE draft_id = ?1)",
            params![draft_id],
        )?;
        tx.execute(
            "DELETE FROM rosters WHERE (team_id, player_id) IN
                 (SELECT team_id, player_id FROM draft_picks WHERE draft_id = ?1)",
            params![draft_id],
        )?;
        tx.execute(
            "DELETE FROM draft_picks WHERE draft_id = ?1",
            params![draft_id],
        )?;
        tx.execute(
            "UPDATE drafts SET status = 'cancelled', paused = 0, clock_deadline = NULL
             WHERE id = ?1",
            params![draft_id],
        )?;
        tx.execute(
            "UPDATE leagues SET draft_status = 'pending' WHERE id = ?1",
            params![draft.league_id],
        )?;
        let draft = draft_row(&tx, draft_id)?
            .ok_or_else(|| CoreError::NotFound(format!("draft {draft_id}")))?;
        tx.commit()?;
        Ok(draft)
    }

    /// Remove a team from its league: cascade its roster and pick rows,
    /// decrement the league's team count, scrub it from any stored draft
    /// order, and shrink a still-pending draft's total pick count. Returns the
    /// league's new team count. State gating (pre-draft only, commissioner
    /// only) is the coordinator's job.
    pub fn remove_team_commit(
        &self,
        league_id: &str,
        team_id: &str,
    ) -> Result<u32, CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM rosters WHERE team_id = ?1", params![team_id])?;
        tx.execute(
            "DELETE FROM draft_picks WHERE team_id = ?1",
            params![team_id],
        )?;
        let n = tx.execute(
            "DELETE FROM teams WHERE id = ?1 AND league_id = ?2",
            params![team_id, league_id],
        )?;
        if n == 0 {
            return Err(CoreError::NotFound(format!(
                "team {team_id} in league {league_id}"
            )));
        }
        let n = tx.execute(
            "UPDATE leagues SET current_teams = current_teams - 1
             WHERE id = ?1 AND current_teams > 0",
            params![league_id],
        )?;
        if n == 0 {
            return Err(CoreError::StaleWrite(format!(
                "league {league_id} team count already zero"
            )));
        }
        let remaining: u32 = tx.query_row(
            "SELECT current_teams FROM leagues WHERE id = ?1",
            params![league_id],
            |row| row.get(0),
        )?;
        // Keep any scheduled draft consistent with the shrunken league.
        let draft_id: Option<String> = tx
            .query_row(
                "SELECT id FROM drafts WHERE league_id = ?1",
                params![league_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(draft_id) = draft_id {
            if let Some(draft) = draft_row(&tx, &draft_id)? {
                if let Some(order) = &draft.draft_order {
                    let scrubbed: Vec<String> = order
                        .iter()
                        .filter(|t| t.as_str() != team_id)
                        .cloned()
                        .collect();
                    tx.execute(
                        "UPDATE drafts SET draft_order = ?2 WHERE id = ?1",
                        params![draft_id, serde_json::to_string(&scrubbed)?],
                    )?;
                }
                if draft.status == DraftStatus::Pending {
                    tx.execute(
                        "UPDATE drafts SET total_picks = rounds * ?2 WHERE id = ?1",
                        params![draft_id, remaining],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(remaining)
    }

    // ------------------------------------------------------------------
    // Trade commits
    // ------------------------------------------------------------------

    pub fn insert_trade(&self, trade: &Trade) -> Result<(), CoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO trades
                (id, league_id, team1_id, team2_id, team1_players, team2_players,
                 proposed_by, status, expires_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                trade.id,
                trade.league_id,
                trade.team1_id,
                trade.team2_id,
                serde_json::to_string(&trade.team1_players)?,
                serde_json::to_string(&trade.team2_players)?,
                trade.proposed_by,
                trade.status.as_str(),
                trade.expires_at.to_rfc3339(),
                trade.resolved_at,
            ],
        )?;
        Ok(())
    }

    /// Accept a pending trade: re-validate every listed asset against the
    /// live rosters (never the proposal-time snapshot), then swap ownership
    /// in both directions. All-or-nothing — any failed validation rolls the
    /// whole transaction back and the trade stays pending.
    pub fn commit_trade_accept(
        &self,
        trade_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Trade, CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let trade = trade_row(&tx, trade_id)?
            .ok_or_else(|| CoreError::NotFound(format!("trade {trade_id}")))?;
        if trade.status != TradeStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "trade {trade_id} already {}",
                trade.status.as_str()
            )));
        }
        if now >= trade.expires_at {
            return Err(CoreError::TradeExpired(trade_id.to_string()));
        }
        for player_id in &trade.team1_players {
            require_owner(&tx, &trade.league_id, player_id, &trade.team1_id)?;
        }
        for player_id in &trade.team2_players {
            require_owner(&tx, &trade.league_id, player_id, &trade.team2_id)?;
        }
        let now_s = now.to_rfc3339();
        swap_assets(&tx, &trade, &trade.team1_players, &trade.team1_id, &trade.team2_id, &now_s)?;
        swap_assets(&tx, &trade, &trade.team2_players, &trade.team2_id, &trade.team1_id, &now_s)?;
        let n = tx.execute(
            "UPDATE trades SET status = 'accepted', resolved_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![trade_id, now_s],
        )?;
        if n == 0 {
            return Err(CoreError::StaleWrite(format!(
                "trade {trade_id} resolved concurrently"
            )));
        }
        let trade = trade_row(&tx, trade_id)?
            .ok_or_else(|| CoreError::NotFound(format!("trade {trade_id}")))?;
        tx.commit()?;
        Ok(trade)
    }

    /// Move a pending trade to rejected or cancelled. Conditioned on the
    /// pending status; a trade that was resolved concurrently surfaces as
    /// InvalidState.
    pub fn resolve_trade(
        &self,
        trade_id: &str,
        status: TradeStatus,
        now: DateTime<Utc>,
    ) -> Result<Trade, CoreError> {
        debug_assert!(status.is_terminal());
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE trades SET status = ?2, resolved_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![trade_id, status.as_str(), now.to_rfc3339()],
        )?;
        if n == 0 {
            let trade = trade_row(&conn, trade_id)?
                .ok_or_else(|| CoreError::NotFound(format!("trade {trade_id}")))?;
            return Err(CoreError::InvalidState(format!(
                "trade {trade_id} already {}",
                trade.status.as_str()
            )));
        }
        trade_row(&conn, trade_id)?
            .ok_or_else(|| CoreError::NotFound(format!("trade {trade_id}")))
    }
}

// ---------------------------------------------------------------------------
// Collaborator interface consumed by external services
// ---------------------------------------------------------------------------

/// Read-only lookups other services (and the trade negotiator) consume.
/// Implemented locally by [`Database`]; a remote deployment would back this
/// with its own store.
#[async_trait]
pub trait LeagueDirectory: Send + Sync {
    async fn is_player_available(&self, player_id: &str) -> Result<bool, CoreError>;
    async fn get_team_roster(&self, team_id: &str) -> Result<HashSet<String>, CoreError>;
    async fn get_league_commissioner(&self, league_id: &str) -> Result<String, CoreError>;
}

#[async_trait]
impl LeagueDirectory for Database {
    async fn is_player_available(&self, player_id: &str) -> Result<bool, CoreError> {
        Ok(self.get_player(player_id)?.is_available)
    }

    async fn get_team_roster(&self, team_id: &str) -> Result<HashSet<String>, CoreError> {
        Ok(self.team_roster(team_id)?.into_iter().collect())
    }

    async fn get_league_commissioner(&self, league_id: &str) -> Result<String, CoreError> {
        Ok(self.get_league(league_id)?.commissioner)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// The shared body of submitted picks and autopicks. Runs inside the
/// caller's transaction; every mutation is guarded so a lost race rolls the
/// whole commit back.
fn apply_pick(
    tx: &Transaction<'_>,
    draft: &Draft,
    team_id: &str,
    player_id: &str,
    auto: bool,
) -> Result<PickCommit, CoreError> {
    // Exactly one committing writer may flip a player to unavailable.
    let flipped = tx.execute(
        "UPDATE players SET is_available = 0 WHERE id = ?1 AND is_available = 1",
        params![player_id],
    )?;
    if flipped == 0 {
        return Err(CoreError::PlayerUnavailable(player_id.to_string()));
    }

    let made_at = Utc::now().to_rfc3339();
    // The (draft_id, pick_number) primary key is the exactly-once guard.
    if let Err(e) = tx.execute(
        "INSERT INTO draft_picks (draft_id, pick_number, team_id, player_id, auto_pick, made_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![draft.id, draft.current_pick, team_id, player_id, auto, made_at],
    ) {
        if is_constraint(&e) {
            return Err(CoreError::StaleWrite(format!(
                "pick {} already committed for draft {}",
                draft.current_pick, draft.id
            )));
        }
        return Err(e.into());
    }

    if let Err(e) = tx.execute(
        "INSERT INTO rosters (team_id, player_id, league_id, acquired_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![team_id, player_id, draft.league_id, made_at],
    ) {
        if is_constraint(&e) {
            return Err(CoreError::PlayerUnavailable(player_id.to_string()));
        }
        return Err(e.into());
    }

    let advanced = tx.execute(
        "UPDATE drafts SET current_pick = current_pick + 1, clock_deadline = NULL
         WHERE id = ?1 AND current_pick = ?2 AND status = 'in_progress'",
        params![draft.id, draft.current_pick],
    )?;
    if advanced == 0 {
        return Err(CoreError::StaleWrite(format!(
            "draft {} advanced past pick {} concurrently",
            draft.id, draft.current_pick
        )));
    }

    let next_pick = draft.current_pick + 1;
    let completed = next_pick > draft.total_picks;
    if completed {
        tx.execute(
            "UPDATE drafts SET status = 'completed', completed_at = ?2 WHERE id = ?1",
            params![draft.id, made_at],
        )?;
        tx.execute(
            "UPDATE leagues SET draft_status = 'completed' WHERE id = ?1",
            params![draft.league_id],
        )?;
    }

    let order = draft.draft_order.as_deref().unwrap_or(&[]);
    let next_team = if completed {
        None
    } else {
        order::team_on_clock(order, next_pick, draft.total_picks).map(str::to_string)
    };

    Ok(PickCommit {
        pick: DraftPick {
            draft_id: draft.id.clone(),
            pick_number: draft.current_pick,
            team_id: team_id.to_string(),
            player_id: player_id.to_string(),
            auto,
            made_at,
        },
        completed,
        next_team,
        pick_time_limit: draft.pick_time_limit,
    })
}

fn require_accepting_picks(draft: &Draft) -> Result<(), CoreError> {
    match draft.status {
        DraftStatus::InProgress if draft.paused => Err(CoreError::InvalidState(format!(
            "draft {} is paused",
            draft.id
        ))),
        DraftStatus::InProgress => Ok(()),
        other => Err(CoreError::InvalidState(format!(
            "draft {} is {}, not accepting picks",
            draft.id,
            other.as_str()
        ))),
    }
}

fn require_owner(
    conn: &Connection,
    league_id: &str,
    player_id: &str,
    team_id: &str,
) -> Result<(), CoreError> {
    let owner = roster_owner_tx(conn, league_id, player_id)?;
    if owner.as_deref() != Some(team_id) {
        return Err(CoreError::InvalidAsset(format!(
            "player {player_id} is not on team {team_id}'s roster"
        )));
    }
    Ok(())
}

/// Move one side's assets to the other team. Each update is guarded on the
/// current owner; a miss means the roster shifted under us.
fn swap_assets(
    tx: &Transaction<'_>,
    trade: &Trade,
    players: &[String],
    from_team: &str,
    to_team: &str,
    now_s: &str,
) -> Result<(), CoreError> {
    for player_id in players {
        let n = tx.execute(
            "UPDATE rosters SET team_id = ?1, is_starter = 0, acquired_at = ?2
             WHERE league_id = ?3 AND player_id = ?4 AND team_id = ?5",
            params![to_team, now_s, trade.league_id, player_id, from_team],
        )?;
        if n != 1 {
            return Err(CoreError::StaleWrite(format!(
                "player {player_id} left team {from_team} during trade {}",
                trade.id
            )));
        }
    }
    Ok(())
}

fn roster_owner_tx(
    conn: &Connection,
    league_id: &str,
    player_id: &str,
) -> Result<Option<String>, CoreError> {
    let owner = conn
        .query_row(
            "SELECT team_id FROM rosters WHERE league_id = ?1 AND player_id = ?2",
            params![league_id, player_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

fn is_constraint(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn bad_column(idx: usize, what: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized {what}").into(),
    )
}

fn parse_utc(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn league_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<League> {
    let sport_s: String = row.get(2)?;
    let status_s: String = row.get(6)?;
    Ok(League {
        id: row.get(0)?,
        name: row.get(1)?,
        sport: Sport::from_str_tag(&sport_s).ok_or_else(|| bad_column(2, "sport"))?,
        commissioner: row.get(3)?,
        max_teams: row.get(4)?,
        current_teams: row.get(5)?,
        draft_status: LeagueDraftStatus::from_str_tag(&status_s)
            .ok_or_else(|| bad_column(6, "league draft status"))?,
    })
}

fn team_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        league_id: row.get(1)?,
        owner: row.get(2)?,
        name: row.get(3)?,
        draft_position: row.get(4)?,
    })
}

fn player_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Player> {
    let sport_s: String = row.get(2)?;
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
        sport: Sport::from_str_tag(&sport_s).ok_or_else(|| bad_column(2, "sport"))?,
        position: row.get(3)?,
        rank: row.get(4)?,
        is_available: row.get(5)?,
    })
}

fn pick_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftPick> {
    Ok(DraftPick {
        draft_id: row.get(0)?,
        pick_number: row.get(1)?,
        team_id: row.get(2)?,
        player_id: row.get(3)?,
        auto: row.get(4)?,
        made_at: row.get(5)?,
    })
}

fn draft_row(conn: &Connection, id: &str) -> Result<Option<Draft>, CoreError> {
    let draft = conn
        .query_row(
            "SELECT id, league_id, status, current_pick, total_picks, rounds,
                    pick_time_limit, draft_order, paused, clock_deadline,
                    started_at, completed_at
             FROM drafts WHERE id = ?1",
            params![id],
            |row| {
                let status_s: String = row.get(2)?;
                let order_json: Option<String> = row.get(7)?;
                let deadline_s: Option<String> = row.get(9)?;
                let draft_order = match order_json {
                    Some(json) => Some(
                        serde_json::from_str(&json)
                            .map_err(|_| bad_column(7, "draft order"))?,
                    ),
                    None => None,
                };
                let clock_deadline = match deadline_s {
                    Some(s) => Some(parse_utc(9, &s)?),
                    None => None,
                };
                Ok(Draft {
                    id: row.get(0)?,
                    league_id: row.get(1)?,
                    status: DraftStatus::from_str_tag(&status_s)
                        .ok_or_else(|| bad_column(2, "draft status"))?,
                    current_pick: row.get(3)?,
                    total_picks: row.get(4)?,
                    rounds: row.get(5)?,
                    pick_time_limit: row.get(6)?,
                    draft_order,
                    paused: row.get(8)?,
                    clock_deadline,
                    started_at: row.get(10)?,
                    completed_at: row.get(11)?,
                })
            },
        )
        .optional()?;
    Ok(draft)
}

fn trade_row(conn: &Connection, id: &str) -> Result<Option<Trade>, CoreError> {
    let trade = conn
        .query_row(
            "SELECT id, league_id, team1_id, team2_id, team1_players, team2_players,
                    proposed_by, status, expires_at, resolved_at
             FROM trades WHERE id = ?1",
            params![id],
            |row| {
                let team1_json: String = row.get(4)?;
                let team2_json: String = row.get(5)?;
                let status_s: String = row.get(7)?;
                let expires_s: String = row.get(8)?;
                Ok(Trade {
                    id: row.get(0)?,
                    league_id: row.get(1)?,
                    team1_id: row.get(2)?,
                    team2_id: row.get(3)?,
                    team1_players: serde_json::from_str(&team1_json)
                        .map_err(|_| bad_column(4, "trade players"))?,
                    team2_players: serde_json::from_str(&team2_json)
                        .map_err(|_| bad_column(5, "trade players"))?,
                    proposed_by: row.get(6)?,
                    status: TradeStatus::from_str_tag(&status_s)
                        .ok_or_else(|| bad_column(7, "trade status"))?,
                    expires_at: parse_utc(8, &expires_s)?,
                    resolved_at: row.get(9)?,
                })
            },
        )
        .optional()?;
    Ok(trade)
}
