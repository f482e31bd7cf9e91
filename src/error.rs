// Domain errors shared by the draft coordinator and trade negotiator.
//
// Every operation failure surfaces synchronously to the caller as one of
// these variants; storage-level conflicts are translated (StaleWrite,
// NotYourTurn, PlayerUnavailable) rather than propagated raw. Nothing here
// is fatal to the process — a failed request leaves the draft or trade in
// its previously committed state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not your turn: team {team} is not on the clock for pick {pick}")]
    NotYourTurn { team: String, pick: u32 },

    #[error("player {0} is not available")]
    PlayerUnavailable(String),

    #[error("invalid trade asset: {0}")]
    InvalidAsset(String),

    #[error("trade {0} has expired")]
    TradeExpired(String),

    #[error("stale write: {0}")]
    StaleWrite(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("corrupt stored record: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl CoreError {
    /// Stable machine-readable kind string used by the wire protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::PermissionDenied(_) => "PERMISSION_DENIED",
            CoreError::InvalidState(_) => "INVALID_STATE",
            CoreError::NotYourTurn { .. } => "NOT_YOUR_TURN",
            CoreError::PlayerUnavailable(_) => "PLAYER_UNAVAILABLE",
            CoreError::InvalidAsset(_) => "INVALID_ASSET",
            CoreError::TradeExpired(_) => "TRADE_EXPIRED",
            CoreError::StaleWrite(_) => "STALE_WRITE",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Storage(_) => "STORAGE",
            CoreError::Encoding(_) => "STORAGE",
        }
    }
}
