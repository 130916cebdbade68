//! Entity store
//!
//! The engine talks to persistence only through [`AuctionStore`] (lock-free
//! reads plus `begin`) and [`AuctionTx`] (one serialized read-modify-write unit).
//! Dropping an `AuctionTx` without calling `commit` discards every change made
//! through it.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::domain::{
    AuctionControl, AuctionLog, AuctionStage, LogId, NewLogEntry, NewPlayer, NewTeam, Player,
    PlayerId, Team, TeamId,
};
use crate::error::StoreResult;

/// Names the engine operation a transaction belongs to, for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionScope {
    Control,
    Start,
    Pick,
    Sell,
    MarkUnsold,
    MarkNotPlaying,
    Undo,
    StageChange,
    Rebid,
    Park,
    Reset,
    ManualEdit,
    Registry,
}

impl TransactionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Start => "start",
            Self::Pick => "pick",
            Self::Sell => "sell",
            Self::MarkUnsold => "mark_unsold",
            Self::MarkNotPlaying => "mark_not_playing",
            Self::Undo => "undo",
            Self::StageChange => "stage_change",
            Self::Rebid => "rebid",
            Self::Park => "park",
            Self::Reset => "reset",
            Self::ManualEdit => "manual_edit",
            Self::Registry => "registry",
        }
    }
}

impl std::fmt::Display for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage backend shared by every engine call
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuctionStore: Send + Sync {
    /// Open a write transaction. Writers are serialized.
    async fn begin(&self, scope: TransactionScope) -> StoreResult<Box<dyn AuctionTx>>;

    /// Committed control record, `None` before first creation
    async fn load_control(&self) -> StoreResult<Option<AuctionControl>>;

    async fn list_teams(&self) -> StoreResult<Vec<Team>>;

    async fn list_players(&self) -> StoreResult<Vec<Player>>;

    async fn find_player(&self, id: PlayerId) -> StoreResult<Option<Player>>;

    /// Newest first
    async fn recent_logs(&self, limit: usize) -> StoreResult<Vec<AuctionLog>>;
}

/// One atomic unit of work
#[async_trait]
pub trait AuctionTx: Send {
    fn scope(&self) -> TransactionScope;

    /// Get-or-create the control singleton and hold it for the rest of the transaction
    async fn control(&mut self) -> StoreResult<AuctionControl>;

    async fn save_control(&mut self, control: &AuctionControl) -> StoreResult<()>;

    // ==================== Teams ====================

    async fn team(&mut self, id: TeamId) -> StoreResult<Option<Team>>;

    async fn team_by_name(&mut self, name: &str) -> StoreResult<Option<Team>>;

    async fn teams(&mut self) -> StoreResult<Vec<Team>>;

    async fn insert_team(&mut self, team: &NewTeam) -> StoreResult<Team>;

    async fn save_team(&mut self, team: &Team) -> StoreResult<()>;

    /// Delete a team and null weak references to it. Returns false if absent.
    async fn delete_team(&mut self, id: TeamId) -> StoreResult<bool>;

    // ==================== Players ====================

    async fn player(&mut self, id: PlayerId) -> StoreResult<Option<Player>>;

    async fn player_by_serial(&mut self, serial_number: i32) -> StoreResult<Option<Player>>;

    async fn players(&mut self) -> StoreResult<Vec<Player>>;

    async fn insert_player(&mut self, player: &NewPlayer) -> StoreResult<Player>;

    async fn save_player(&mut self, player: &Player) -> StoreResult<()>;

    /// Delete a player and null weak references to it (control, log). Returns false if absent.
    async fn delete_player(&mut self, id: PlayerId) -> StoreResult<bool>;

    // ==================== Log ====================

    async fn append_log(&mut self, entry: &NewLogEntry) -> StoreResult<AuctionLog>;

    /// Most recent entry of any kind
    async fn latest_log(&mut self) -> StoreResult<Option<AuctionLog>>;

    /// Stamp a SOLD entry as reversed
    async fn mark_log_undone(&mut self, id: LogId) -> StoreResult<()>;

    /// Stamp every SOLD entry that has not been undone. Returns how many were stamped.
    async fn void_active_sales(&mut self) -> StoreResult<u64>;

    /// SOLD entries of `stage` that have not been undone
    async fn active_sales_in_stage(&mut self, stage: AuctionStage) -> StoreResult<Vec<AuctionLog>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
