// Trade negotiator: proposal lifecycle and atomic roster swaps.
//
// State machine over Trade.status: pending -> {accepted | rejected |
// cancelled}, a single terminal transition. Expiry is derived: a pending
// trade past its deadline answers TradeExpired at respond time and is
// never reaped in the background.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::{Database, LeagueDirectory};
use crate::error::CoreError;
use crate::events::{Event, EventBus};
use crate::model::{Trade, TradeDecision, TradeStatus};

/// Inputs for a new trade proposal.
#[derive(Debug, Clone)]
pub struct TradeProposal {
    pub league_id: String,
    pub team1_id: String,
    pub team2_id: String,
    /// Players team1 offers to team2.
    pub team1_players: Vec<String>,
    /// Players team2 would send back.
    pub team2_players: Vec<String>,
    pub proposed_by: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TradeNegotiator {
    db: Arc<Database>,
    events: EventBus,
}

impl TradeNegotiator {
    pub fn new(db: Arc<Database>, events: EventBus) -> Self {
        TradeNegotiator { db, events }
    }

    /// Validate and create a pending trade.
    ///
    /// Ownership is checked against live rosters here so obviously bad
    /// proposals fail fast, and checked again inside the accept commit —
    /// rosters may change between proposal and response.
    pub async fn propose_trade(&self, proposal: TradeProposal) -> Result<Trade, CoreError> {
        if proposal.team1_id == proposal.team2_id {
            return Err(CoreError::InvalidAsset(
                "a team cannot trade with itself".into(),
            ));
        }
        if proposal.proposed_by != proposal.team1_id && proposal.proposed_by != proposal.team2_id {
            return Err(CoreError::PermissionDenied(format!(
                "team {} is not a party to this trade",
                proposal.proposed_by
            )));
        }
        if proposal.team1_players.is_empty() && proposal.team2_players.is_empty() {
            return Err(CoreError::InvalidAsset("trade lists no players".into()));
        }
        let side1: HashSet<&str> = proposal.team1_players.iter().map(String::as_str).collect();
        let side2: HashSet<&str> = proposal.team2_players.iter().map(String::as_str).collect();
        if side1.len() != proposal.team1_players.len()
            || side2.len() != proposal.team2_players.len()
        {
            return Err(CoreError::InvalidAsset(
                "a player is listed twice on the same side".into(),
            ));
        }
        if let Some(player) = side1.intersection(&side2).next() {
            return Err(CoreError::InvalidAsset(format!(
                "player {player} appears on both sides of the trade"
            )));
        }
        if proposal.expires_at <= Utc::now() {
            return Err(CoreError::InvalidState(
                "trade expiry deadline is in the past".into(),
            ));
        }
        let team1 = self.db.get_team(&proposal.team1_id)?;
        let team2 = self.db.get_team(&proposal.team2_id)?;
        if team1.league_id != proposal.league_id || team2.league_id != proposal.league_id {
            return Err(CoreError::InvalidAsset(format!(
                "both teams must belong to league {}",
                proposal.league_id
            )));
        }

        let roster1 = self.db.get_team_roster(&proposal.team1_id).await?;
        for player in &proposal.team1_players {
            if !roster1.contains(player) {
                return Err(CoreError::InvalidAsset(format!(
                    "player {player} is not on team {}'s roster",
                    proposal.team1_id
                )));
            }
        }
        let roster2 = self.db.get_team_roster(&proposal.team2_id).await?;
        for player in &proposal.team2_players {
            if !roster2.contains(player) {
                return Err(CoreError::InvalidAsset(format!(
                    "player {player} is not on team {}'s roster",
                    proposal.team2_id
                )));
            }
        }

        let trade = Trade {
            id: Database::generate_trade_id(),
            league_id: proposal.league_id,
            team1_id: proposal.team1_id,
            team2_id: proposal.team2_id,
            team1_players: proposal.team1_players,
            team2_players: proposal.team2_players,
            proposed_by: proposal.proposed_by,
            status: TradeStatus::Pending,
            expires_at: proposal.expires_at,
            resolved_at: None,
        };
        self.db.insert_trade(&trade)?;
        info!(
            "trade {} proposed by {} ({} <-> {})",
            trade.id, trade.proposed_by, trade.team1_id, trade.team2_id
        );
        Ok(trade)
    }

    /// Respond to a pending trade. Accept and reject belong to the
    /// non-proposing team; cancel belongs to the proposer. Accept performs
    /// the all-or-nothing roster swap.
    pub fn respond_trade(
        &self,
        trade_id: &str,
        acting_team: &str,
        decision: TradeDecision,
    ) -> Result<Trade, CoreError> {
        let trade = self.db.get_trade(trade_id)?;
        if trade.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "trade {trade_id} already {}",
                trade.status.as_str()
            )));
        }
        let now = Utc::now();
        if trade.is_expired_at(now) {
            return Err(CoreError::TradeExpired(trade_id.to_string()));
        }

        let resolved = match decision {
            TradeDecision::Accept | TradeDecision::Reject => {
                if acting_team != trade.responding_team() {
                    return Err(CoreError::PermissionDenied(format!(
                        "team {acting_team} cannot answer trade {trade_id}"
                    )));
                }
                if decision == TradeDecision::Accept {
                    self.db.commit_trade_accept(trade_id, now)?
                } else {
                    self.db.resolve_trade(trade_id, TradeStatus::Rejected, now)?
                }
            }
            TradeDecision::Cancel => {
                if acting_team != trade.proposed_by {
                    return Err(CoreError::PermissionDenied(format!(
                        "only the proposing team may cancel trade {trade_id}"
                    )));
                }
                self.db.resolve_trade(trade_id, TradeStatus::Cancelled, now)?
            }
        };

        info!("trade {trade_id} {}", resolved.status.as_str());
        self.events.emit(Event::TradeResolved {
            trade_id: trade_id.to_string(),
            league_id: resolved.league_id.clone(),
            status: resolved.status,
        });
        Ok(resolved)
    }
}
