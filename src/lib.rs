pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod rules;
pub mod store;

pub use config::{AppConfig, AuctionConfig};
pub use domain::{
    ActionType, AuctionControl, AuctionLog, AuctionStage, NewPlayer, NewTeam, Player, PlayerRole,
    PlayerStatus, Team,
};
pub use engine::{AuctionEngine, AuctionStatus};
pub use error::{AuctionError, Result, StoreError, ValidationError};
pub use store::{AuctionStore, AuctionTx, MemoryStore, PostgresStore, TransactionScope};
