// Wire protocol: tagged JSON requests and responses.
//
// Every message is `{"type": "...", "payload": {...}}`. Requests carry the
// acting user or team explicitly — authentication happens upstream and is
// out of scope here. Server-pushed events (after SUBSCRIBE) use the same
// envelope shape; see `events::Event`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::draft::coordinator::{DraftStateView, RemovedTeam};
use crate::model::{Draft, DraftPick, Trade, TradeDecision};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    StartDraft {
        draft_id: String,
        actor: String,
    },
    SubmitPick {
        draft_id: String,
        team_id: String,
        player_id: String,
    },
    GetDraftState {
        draft_id: String,
    },
    PauseDraft {
        draft_id: String,
        actor: String,
    },
    ResumeDraft {
        draft_id: String,
        actor: String,
    },
    CancelDraft {
        draft_id: String,
        actor: String,
    },
    ProposeTrade {
        league_id: String,
        team1_id: String,
        team2_id: String,
        team1_players: Vec<String>,
        team2_players: Vec<String>,
        proposed_by: String,
        expires_at: DateTime<Utc>,
    },
    RespondTrade {
        trade_id: String,
        team_id: String,
        decision: TradeDecision,
    },
    RemoveTeam {
        draft_id: String,
        team_id: String,
        actor: String,
    },
    /// Attach this connection to the event stream.
    Subscribe,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Draft(Draft),
    Pick(DraftPick),
    DraftState(DraftStateView),
    Trade(Trade),
    TeamRemoved(RemovedTeam),
    Subscribed,
    Error { kind: String, message: String },
}
