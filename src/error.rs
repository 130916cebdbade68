use thiserror::Error;

/// Business-rule violations. The `Display` text is the user-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    // Lifecycle
    #[error("Auction already started")]
    AlreadyStarted,

    #[error("Auction not started yet")]
    NotStarted,

    #[error("Auction is parked")]
    Parked,

    // Player on the block
    #[error("No players remaining")]
    NoPlayersRemaining,

    #[error("Player already selected")]
    PlayerAlreadySelected,

    #[error("No player selected")]
    NoPlayerSelected,

    // Sale
    #[error("Invalid team selected")]
    InvalidTeam,

    #[error("Invalid selling price")]
    InvalidPrice,

    #[error("Not enough points")]
    NotEnoughPoints,

    #[error("No slots remaining")]
    NoSlotsRemaining,

    #[error("Icon round: every team must buy before a repeat purchase")]
    IconRoundRestricted,

    // Undo
    #[error("No action to undo")]
    NothingToUndo,

    #[error("Only SOLD actions can be undone")]
    NotUndoable,

    // Stages
    #[error("Invalid stage transition: from {from} to {to}")]
    InvalidStageTransition { from: String, to: String },

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Auction already completed")]
    AuctionCompleted,

    // Registry
    #[error("Unknown player role: {0}")]
    UnknownRole(String),

    #[error("Team name already exists: {0}")]
    DuplicateTeamName(String),

    #[error("Serial number already exists: {0}")]
    DuplicateSerialNumber(i32),

    #[error("Invalid team: {0}")]
    InvalidTeamConfig(String),

    #[error("Invalid player: {0}")]
    InvalidPlayerConfig(String),

    #[error("Team not found: {0}")]
    TeamNotFound(i64),

    #[error("Player not found: {0}")]
    PlayerNotFound(i64),

    #[error("Team still owns sold players")]
    TeamHasPlayers,

    #[error("Player is sold; undo the sale first")]
    PlayerIsSold,
}

/// Infrastructure failures raised by a store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization failure or deadlock; safe to retry the whole transaction
    #[error("Transient contention: {0}")]
    Contention(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Contention(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // 40001 serialization_failure, 40P01 deadlock_detected
        if let sqlx::Error::Database(db) = &err {
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
                return StoreError::Contention(db.message().to_string());
            }
        }
        if matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) {
            return StoreError::Unavailable(err.to_string());
        }
        StoreError::Database(err)
    }
}

/// Error returned by every engine operation
#[derive(Error, Debug)]
pub enum AuctionError {
    /// Caller input was wrong; surfaced verbatim
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The system is broken; details were logged where detected
    #[error("{message}")]
    Engine {
        operation: &'static str,
        message: String,
    },
}

impl AuctionError {
    /// Build the generic engine failure for an operation, e.g. "Failed to sell player".
    pub fn engine(operation: &'static str, message: impl Into<String>) -> Self {
        AuctionError::Engine {
            operation,
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AuctionError::Validation(_))
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            AuctionError::Validation(v) => Some(v),
            AuctionError::Engine { .. } => None,
        }
    }

    /// HTTP-style classification for callers that map onto a request/response surface
    pub fn status_code(&self) -> u16 {
        match self {
            AuctionError::Validation(_) => 400,
            AuctionError::Engine { .. } => 500,
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AuctionError>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_are_verbatim() {
        let err: AuctionError = ValidationError::NotEnoughPoints.into();
        assert_eq!(err.to_string(), "Not enough points");
        assert!(err.is_validation());
        assert_eq!(err.status_code(), 400);

        let err: AuctionError = ValidationError::InvalidStageTransition {
            from: "BAT".into(),
            to: "AR".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid stage transition: from BAT to AR");
    }

    #[test]
    fn test_engine_error_hides_details() {
        let err = AuctionError::engine("sell", "Failed to sell player");
        assert_eq!(err.to_string(), "Failed to sell player");
        assert!(!err.is_validation());
        assert!(err.validation().is_none());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_store_error_transient() {
        assert!(StoreError::Contention("deadlock".into()).is_transient());
        assert!(!StoreError::Unavailable("down".into()).is_transient());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_transient());
    }
}
