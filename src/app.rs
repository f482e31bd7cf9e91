// Request dispatch: the bridge between the wire protocol and the core.
//
// `dispatch` is transport-agnostic so protocol handling can be tested
// without opening sockets; the WebSocket layer owns connection state
// (including event subscriptions) and calls in here for everything else.

use std::sync::Arc;

use crate::db::Database;
use crate::draft::coordinator::DraftCoordinator;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::protocol::{Request, Response};
use crate::trade::{TradeNegotiator, TradeProposal};

/// Shared application state handed to every connection.
pub struct AppState {
    pub db: Arc<Database>,
    pub coordinator: Arc<DraftCoordinator>,
    pub negotiator: TradeNegotiator,
    pub events: EventBus,
}

impl AppState {
    pub fn new(db: Arc<Database>) -> Self {
        let events = EventBus::default();
        let coordinator = DraftCoordinator::new(Arc::clone(&db), events.clone());
        let negotiator = TradeNegotiator::new(Arc::clone(&db), events.clone());
        AppState {
            db,
            coordinator,
            negotiator,
            events,
        }
    }
}

/// Dispatch one request to the core and shape the outcome for the wire.
/// SUBSCRIBE is connection state handled by the transport; it is answered
/// here uniformly so the dispatcher stays total over `Request`.
pub async fn dispatch(state: &AppState, request: Request) -> Response {
    match request {
        Request::StartDraft { draft_id, actor } => respond(
            state
                .coordinator
                .start_draft(&draft_id, &actor)
                .map(Response::Draft),
        ),
        Request::SubmitPick {
            draft_id,
            team_id,
            player_id,
        } => respond(
            state
                .coordinator
                .submit_pick(&draft_id, &team_id, &player_id)
                .map(Response::Pick),
        ),
        Request::GetDraftState { draft_id } => respond(
            state
                .coordinator
                .draft_state(&draft_id)
                .map(Response::DraftState),
        ),
        Request::PauseDraft { draft_id, actor } => respond(
            state
                .coordinator
                .pause_draft(&draft_id, &actor)
                .map(Response::Draft),
        ),
        Request::ResumeDraft { draft_id, actor } => respond(
            state
                .coordinator
                .resume_draft(&draft_id, &actor)
                .map(Response::Draft),
        ),
        Request::CancelDraft { draft_id, actor } => respond(
            state
                .coordinator
                .cancel_draft(&draft_id, &actor)
                .map(Response::Draft),
        ),
        Request::ProposeTrade {
            league_id,
            team1_id,
            team2_id,
            team1_players,
            team2_players,
            proposed_by,
            expires_at,
        } => respond(
            state
                .negotiator
                .propose_trade(TradeProposal {
                    league_id,
                    team1_id,
                    team2_id,
                    team1_players,
                    team2_players,
                    proposed_by,
                    expires_at,
                })
                .await
                .map(Response::Trade),
        ),
        Request::RespondTrade {
            trade_id,
            team_id,
            decision,
        } => respond(
            state
                .negotiator
                .respond_trade(&trade_id, &team_id, decision)
                .map(Response::Trade),
        ),
        Request::RemoveTeam {
            draft_id,
            team_id,
            actor,
        } => respond(
            state
                .coordinator
                .remove_team(&draft_id, &team_id, &actor)
                .map(Response::TeamRemoved),
        ),
        Request::Subscribe => Response::Subscribed,
    }
}

fn respond(result: Result<Response, CoreError>) -> Response {
    result.unwrap_or_else(|e| Response::Error {
        kind: e.kind().to_string(),
        message: e.to_string(),
    })
}
