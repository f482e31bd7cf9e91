// Core record types and status enums for leagues, drafts, and trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::draft::order;

// ---------------------------------------------------------------------------
// Sports and advisory position tables
// ---------------------------------------------------------------------------

/// Sports supported by the service. Each sport carries its own table of
/// recognized position codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Baseball,
    Football,
    Basketball,
    Hockey,
}

impl Sport {
    /// Parse a sport tag string (as stored in the database).
    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "baseball" => Some(Sport::Baseball),
            "football" => Some(Sport::Football),
            "basketball" => Some(Sport::Basketball),
            "hockey" => Some(Sport::Hockey),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Baseball => "baseball",
            Sport::Football => "football",
            Sport::Basketball => "basketball",
            Sport::Hockey => "hockey",
        }
    }

    /// Position codes recognized for this sport.
    pub fn valid_positions(&self) -> &'static [&'static str] {
        match self {
            Sport::Baseball => &[
                "C", "1B", "2B", "3B", "SS", "LF", "CF", "RF", "OF", "DH", "SP", "RP", "P", "UTIL",
            ],
            Sport::Football => &["QB", "RB", "WR", "TE", "K", "DST", "FLEX"],
            Sport::Basketball => &["PG", "SG", "SF", "PF", "C", "G", "F", "UTIL"],
            Sport::Hockey => &["C", "LW", "RW", "D", "G", "F", "UTIL"],
        }
    }

    /// Advisory position check. Unknown codes are tolerated (leagues define
    /// custom positions) but logged so misconfigured imports are visible.
    /// Returns whether the code was recognized.
    pub fn check_position(&self, code: &str) -> bool {
        let known = self
            .valid_positions()
            .iter()
            .any(|p| p.eq_ignore_ascii_case(code));
        if !known {
            warn!(
                "unrecognized {} position '{}' (custom league position?)",
                self.as_str(),
                code
            );
        }
        known
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// League-level draft status. Mirrors the subset of `DraftStatus` visible on
/// the league record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeagueDraftStatus {
    Pending,
    InProgress,
    Completed,
}

impl LeagueDraftStatus {
    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl DraftStatus {
    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Stored trade status. Terminal states are accepted/rejected/cancelled;
/// expiry is derived from `expires_at` at read time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl TradeStatus {
    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A responding party's decision on a pending trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDecision {
    Accept,
    Reject,
    Cancel,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: String,
    pub name: String,
    pub sport: Sport,
    /// User id of the league commissioner. Immutable here; transfer is an
    /// out-of-scope admin operation.
    pub commissioner: String,
    pub max_teams: u32,
    pub current_teams: u32,
    pub draft_status: LeagueDraftStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub league_id: String,
    /// User id of the team owner.
    pub owner: String,
    pub name: String,
    /// 1-based seat in the draft order, assigned before the draft starts.
    /// Unique per league.
    pub draft_position: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub sport: Sport,
    /// Sport-scoped position code (e.g. "SS", "QB"). Validated advisorily.
    pub position: String,
    /// Default ranking used by autopick; lower is better.
    pub rank: u32,
    pub is_available: bool,
}

/// A (team, player) roster membership entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub team_id: String,
    pub player_id: String,
    pub league_id: String,
    pub is_starter: bool,
    pub acquired_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub league_id: String,
    pub status: DraftStatus,
    /// 1-based pick counter; advances exactly once per committed pick.
    pub current_pick: u32,
    /// teams × rounds, fixed when the draft is scheduled.
    pub total_picks: u32,
    pub rounds: u32,
    /// Pick clock duration in seconds. None means no clock.
    pub pick_time_limit: Option<u32>,
    /// Ordered team ids, snapshotted when the draft starts. None before.
    pub draft_order: Option<Vec<String>>,
    pub paused: bool,
    /// Deadline of the armed pick clock, if one is running.
    pub clock_deadline: Option<DateTime<Utc>>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl Draft {
    /// The team whose turn it is, per the snake-order sequencer. None when
    /// the draft is not in progress or the pick counter has run past the end.
    pub fn on_clock_team(&self) -> Option<&str> {
        if self.status != DraftStatus::InProgress {
            return None;
        }
        let order = self.draft_order.as_deref()?;
        order::team_on_clock(order, self.current_pick, self.total_picks)
    }
}

/// A committed draft pick. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftPick {
    pub draft_id: String,
    pub pick_number: u32,
    pub team_id: String,
    pub player_id: String,
    /// Whether the pick was made by the clock-expiry autopick path.
    pub auto: bool,
    pub made_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub league_id: String,
    pub team1_id: String,
    pub team2_id: String,
    /// Players team1 gives to team2. Disjoint from `team2_players`.
    pub team1_players: Vec<String>,
    /// Players team2 gives to team1.
    pub team2_players: Vec<String>,
    /// The team id that proposed the trade (one of the two teams).
    pub proposed_by: String,
    pub status: TradeStatus,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<String>,
}

impl Trade {
    /// Whether this trade is expired as of `now`: still pending in storage
    /// but past its deadline. Terminal trades are never expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TradeStatus::Pending && now >= self.expires_at
    }

    /// The team expected to answer the proposal.
    pub fn responding_team(&self) -> &str {
        if self.proposed_by == self.team1_id {
            &self.team2_id
        } else {
            &self.team1_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_trade(status: TradeStatus) -> Trade {
        Trade {
            id: "trade_1".into(),
            league_id: "league_1".into(),
            team1_id: "team_a".into(),
            team2_id: "team_b".into(),
            team1_players: vec!["p1".into()],
            team2_players: vec!["p2".into()],
            proposed_by: "team_a".into(),
            status,
            expires_at: Utc::now() + Duration::hours(1),
            resolved_at: None,
        }
    }

    #[test]
    fn sport_tag_round_trip() {
        for sport in [
            Sport::Baseball,
            Sport::Football,
            Sport::Basketball,
            Sport::Hockey,
        ] {
            assert_eq!(Sport::from_str_tag(sport.as_str()), Some(sport));
        }
        assert_eq!(Sport::from_str_tag("cricket"), None);
    }

    #[test]
    fn sport_tag_case_insensitive() {
        assert_eq!(Sport::from_str_tag("Baseball"), Some(Sport::Baseball));
        assert_eq!(Sport::from_str_tag("HOCKEY"), Some(Sport::Hockey));
    }

    #[test]
    fn check_position_recognizes_sport_codes() {
        assert!(Sport::Baseball.check_position("SS"));
        assert!(Sport::Baseball.check_position("ss"));
        assert!(Sport::Football.check_position("QB"));
        assert!(Sport::Basketball.check_position("PG"));
        assert!(Sport::Hockey.check_position("LW"));
    }

    #[test]
    fn check_position_tolerates_unknown_codes() {
        // Advisory only: returns false but never errors.
        assert!(!Sport::Football.check_position("SS"));
        assert!(!Sport::Baseball.check_position("CAPTAIN"));
    }

    #[test]
    fn draft_status_round_trip() {
        for status in [
            DraftStatus::Pending,
            DraftStatus::InProgress,
            DraftStatus::Completed,
            DraftStatus::Cancelled,
        ] {
            assert_eq!(DraftStatus::from_str_tag(status.as_str()), Some(status));
        }
        assert_eq!(DraftStatus::from_str_tag("paused"), None);
    }

    #[test]
    fn trade_status_terminality() {
        assert!(!TradeStatus::Pending.is_terminal());
        assert!(TradeStatus::Accepted.is_terminal());
        assert!(TradeStatus::Rejected.is_terminal());
        assert!(TradeStatus::Cancelled.is_terminal());
    }

    #[test]
    fn trade_expiry_is_derived() {
        let mut trade = sample_trade(TradeStatus::Pending);
        assert!(!trade.is_expired_at(Utc::now()));
        assert!(trade.is_expired_at(trade.expires_at));
        assert!(trade.is_expired_at(trade.expires_at + Duration::seconds(1)));

        // A resolved trade is never reported as expired.
        trade.status = TradeStatus::Accepted;
        assert!(!trade.is_expired_at(trade.expires_at + Duration::hours(2)));
    }

    #[test]
    fn responding_team_is_the_other_side() {
        let mut trade = sample_trade(TradeStatus::Pending);
        assert_eq!(trade.responding_team(), "team_b");
        trade.proposed_by = "team_b".into();
        assert_eq!(trade.responding_team(), "team_a");
    }

    #[test]
    fn on_clock_team_requires_in_progress_and_order() {
        let mut draft = Draft {
            id: "draft_1".into(),
            league_id: "league_1".into(),
            status: DraftStatus::Pending,
            current_pick: 1,
            total_picks: 8,
            rounds: 2,
            pick_time_limit: None,
            draft_order: None,
            paused: false,
            clock_deadline: None,
            started_at: None,
            completed_at: None,
        };
        assert_eq!(draft.on_clock_team(), None);

        draft.status = DraftStatus::InProgress;
        assert_eq!(draft.on_clock_team(), None); // no snapshot yet

        draft.draft_order = Some(vec![
            "a".into(),
            "b".into(),
            "c".into(),
            "d".into(),
        ]);
        assert_eq!(draft.on_clock_team(), Some("a"));

        draft.current_pick = 5; // round 2 reverses
        assert_eq!(draft.on_clock_team(), Some("d"));

        draft.current_pick = 9; // past the end
        assert_eq!(draft.on_clock_team(), None);
    }
}
