//! In-process store
//!
//! Readers take the snapshot read lock only. A writer holds the writer gate
//! for its whole transaction and edits a private copy of the snapshot, which
//! replaces the committed one at commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use super::{AuctionStore, AuctionTx, TransactionScope};
use crate::domain::{
    AuctionControl, AuctionLog, AuctionStage, LogId, NewLogEntry, NewPlayer, NewTeam, Player,
    PlayerId, Team, TeamId,
};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct Snapshot {
    control: Option<AuctionControl>,
    teams: BTreeMap<TeamId, Team>,
    players: BTreeMap<PlayerId, Player>,
    /// Insertion order; ids ascend
    logs: Vec<AuctionLog>,
    next_team_id: TeamId,
    next_player_id: PlayerId,
    next_log_id: LogId,
}

impl Snapshot {
    fn allocate_team_id(&mut self) -> TeamId {
        self.next_team_id += 1;
        self.next_team_id
    }

    fn allocate_player_id(&mut self) -> PlayerId {
        self.next_player_id += 1;
        self.next_player_id
    }

    fn allocate_log_id(&mut self) -> LogId {
        self.next_log_id += 1;
        self.next_log_id
    }
}

/// Store backed by process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    committed: Arc<RwLock<Snapshot>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuctionStore for MemoryStore {
    async fn begin(&self, scope: TransactionScope) -> StoreResult<Box<dyn AuctionTx>> {
        let guard = self.writer.clone().lock_owned().await;
        let working = self.committed.read().await.clone();
        debug!("Started memory transaction for scope: {}", scope);
        Ok(Box::new(MemoryTx {
            _guard: guard,
            committed: self.committed.clone(),
            working,
            scope,
            finished: false,
        }))
    }

    async fn load_control(&self) -> StoreResult<Option<AuctionControl>> {
        Ok(self.committed.read().await.control.clone())
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        Ok(self.committed.read().await.teams.values().cloned().collect())
    }

    async fn list_players(&self) -> StoreResult<Vec<Player>> {
        Ok(self.committed.read().await.players.values().cloned().collect())
    }

    async fn find_player(&self, id: PlayerId) -> StoreResult<Option<Player>> {
        Ok(self.committed.read().await.players.get(&id).cloned())
    }

    async fn recent_logs(&self, limit: usize) -> StoreResult<Vec<AuctionLog>> {
        let snapshot = self.committed.read().await;
        Ok(snapshot.logs.iter().rev().take(limit).cloned().collect())
    }
}

struct MemoryTx {
    _guard: OwnedMutexGuard<()>,
    committed: Arc<RwLock<Snapshot>>,
    working: Snapshot,
    scope: TransactionScope,
    finished: bool,
}

impl MemoryTx {
    fn missing(kind: &str, id: i64) -> StoreError {
        StoreError::Corrupt(format!("{} {} does not exist", kind, id))
    }
}

#[async_trait]
impl AuctionTx for MemoryTx {
    fn scope(&self) -> TransactionScope {
        self.scope
    }

    async fn control(&mut self) -> StoreResult<AuctionControl> {
        Ok(self
            .working
            .control
            .get_or_insert_with(AuctionControl::default)
            .clone())
    }

    async fn save_control(&mut self, control: &AuctionControl) -> StoreResult<()> {
        self.working.control = Some(control.clone());
        Ok(())
    }

    async fn team(&mut self, id: TeamId) -> StoreResult<Option<Team>> {
        Ok(self.working.teams.get(&id).cloned())
    }

    async fn team_by_name(&mut self, name: &str) -> StoreResult<Option<Team>> {
        Ok(self
            .working
            .teams
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn teams(&mut self) -> StoreResult<Vec<Team>> {
        Ok(self.working.teams.values().cloned().collect())
    }

    async fn insert_team(&mut self, team: &NewTeam) -> StoreResult<Team> {
        let id = self.working.allocate_team_id();
        let team = team.clone().into_team(id);
        self.working.teams.insert(id, team.clone());
        Ok(team)
    }

    async fn save_team(&mut self, team: &Team) -> StoreResult<()> {
        match self.working.teams.get_mut(&team.id) {
            Some(slot) => {
                *slot = team.clone();
                Ok(())
            }
            None => Err(Self::missing("team", team.id)),
        }
    }

    async fn delete_team(&mut self, id: TeamId) -> StoreResult<bool> {
        if self.working.teams.remove(&id).is_none() {
            return Ok(false);
        }
        for player in self.working.players.values_mut() {
            if player.team_id == Some(id) {
                player.team_id = None;
            }
        }
        for log in self.working.logs.iter_mut() {
            if log.team_id == Some(id) {
                log.team_id = None;
            }
        }
        Ok(true)
    }

    async fn player(&mut self, id: PlayerId) -> StoreResult<Option<Player>> {
        Ok(self.working.players.get(&id).cloned())
    }

    async fn player_by_serial(&mut self, serial_number: i32) -> StoreResult<Option<Player>> {
        Ok(self
            .working
            .players
            .values()
            .find(|p| p.serial_number == serial_number)
            .cloned())
    }

    async fn players(&mut self) -> StoreResult<Vec<Player>> {
        Ok(self.working.players.values().cloned().collect())
    }

    async fn insert_player(&mut self, player: &NewPlayer) -> StoreResult<Player> {
        let id = self.working.allocate_player_id();
        let player = player.clone().into_player(id);
        self.working.players.insert(id, player.clone());
        Ok(player)
    }

    async fn save_player(&mut self, player: &Player) -> StoreResult<()> {
        match self.working.players.get_mut(&player.id) {
            Some(slot) => {
                *slot = player.clone();
                Ok(())
            }
            None => Err(Self::missing("player", player.id)),
        }
    }

    async fn delete_player(&mut self, id: PlayerId) -> StoreResult<bool> {
        if self.working.players.remove(&id).is_none() {
            return Ok(false);
        }
        if let Some(control) = self.working.control.as_mut() {
            if control.current_player_id == Some(id) {
                control.current_player_id = None;
            }
        }
        for log in self.working.logs.iter_mut() {
            if log.player_id == Some(id) {
                log.player_id = None;
            }
        }
        Ok(true)
    }

    async fn append_log(&mut self, entry: &NewLogEntry) -> StoreResult<AuctionLog> {
        let id = self.working.allocate_log_id();
        let log = entry.clone().into_log(id, Utc::now());
        self.working.logs.push(log.clone());
        Ok(log)
    }

    async fn latest_log(&mut self) -> StoreResult<Option<AuctionLog>> {
        Ok(self.working.logs.last().cloned())
    }

    async fn mark_log_undone(&mut self, id: LogId) -> StoreResult<()> {
        let log = self
            .working
            .logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Self::missing("log entry", id))?;
        log.undone_at = Some(Utc::now());
        Ok(())
    }

    async fn void_active_sales(&mut self) -> StoreResult<u64> {
        let now = Utc::now();
        let mut voided = 0;
        for log in self.working.logs.iter_mut().filter(|l| l.is_active_sale()) {
            log.undone_at = Some(now);
            voided += 1;
        }
        Ok(voided)
    }

    async fn active_sales_in_stage(&mut self, stage: AuctionStage) -> StoreResult<Vec<AuctionLog>> {
        Ok(self
            .working
            .logs
            .iter()
            .filter(|l| l.is_active_sale() && l.stage == Some(stage))
            .cloned()
            .collect())
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        let working = std::mem::take(&mut self.working);
        *self.committed.write().await = working;
        self.finished = true;
        debug!("Committed memory transaction for scope: {}", self.scope);
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Transaction for scope {} was dropped without commit - rolling back",
                self.scope
            );
        }
    }
}
