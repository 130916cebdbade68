use std::sync::Arc;

use async_trait::async_trait;
use auctioneer::domain::{LogId, NewLogEntry, PlayerId, TeamId};
use auctioneer::error::StoreResult;
use auctioneer::{
    AuctionConfig, AuctionControl, AuctionEngine, AuctionLog, AuctionStage, AuctionStore,
    AuctionTx, MemoryStore, NewPlayer, NewTeam, Player, PlayerRole, PlayerStatus, StoreError,
    Team, TransactionScope, ValidationError,
};

/// Two sells racing for the same player: exactly one wins, the other sees an empty block.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sells_resolve_to_one_sale() {
    let engine = Arc::new(AuctionEngine::new(
        Arc::new(MemoryStore::new()),
        AuctionConfig::default(),
    ));
    let lions = engine.register_team(NewTeam::new("Lions")).await.unwrap();
    let tigers = engine.register_team(NewTeam::new("Tigers")).await.unwrap();
    engine
        .register_player(NewPlayer::new(1, "Contested", PlayerRole::Bat))
        .await
        .unwrap();
    engine.start_auction().await.unwrap();
    engine.pick_random_player().await.unwrap();

    let handles: Vec<_> = [lions.id, tigers.id]
        .into_iter()
        .map(|team_id| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sell_current_player(team_id, 1000, None).await })
        })
        .collect();

    let mut wins = 0;
    let mut losses = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(err) => losses.push(err),
        }
    }
    assert_eq!(wins, 1, "exactly one sale must commit");
    assert_eq!(losses.len(), 1);
    assert_eq!(
        losses[0].validation(),
        Some(&ValidationError::NoPlayerSelected)
    );

    let spent: i64 = engine
        .teams()
        .await
        .unwrap()
        .iter()
        .map(|t| t.spent_points())
        .sum();
    assert_eq!(spent, 1000, "only one team may be charged");
}

/// Many concurrent picks put exactly one player on the block.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_picks_select_one_player() {
    let engine = Arc::new(AuctionEngine::new(
        Arc::new(MemoryStore::new()),
        AuctionConfig::default(),
    ));
    for serial in 1..=6 {
        engine
            .register_player(NewPlayer::new(serial, format!("B{serial}"), PlayerRole::Bat))
            .await
            .unwrap();
    }
    engine.start_auction().await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.pick_random_player().await })
        })
        .collect();

    let mut picked = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(player) => picked.push(player.id),
            Err(err) => assert_eq!(
                err.validation(),
                Some(&ValidationError::PlayerAlreadySelected)
            ),
        }
    }
    assert_eq!(picked.len(), 1);

    let status = engine.status().await.unwrap();
    assert_eq!(status.current_player.map(|p| p.id), Some(picked[0]));
}

/// Store that fails every log append, to prove sales are all-or-nothing.
#[derive(Clone)]
struct BrokenLogStore {
    inner: MemoryStore,
}

#[async_trait]
impl AuctionStore for BrokenLogStore {
    async fn begin(&self, scope: TransactionScope) -> StoreResult<Box<dyn AuctionTx>> {
        let inner = self.inner.begin(scope).await?;
        Ok(Box::new(BrokenLogTx { inner }))
    }

    async fn load_control(&self) -> StoreResult<Option<AuctionControl>> {
        self.inner.load_control().await
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        self.inner.list_teams().await
    }

    async fn list_players(&self) -> StoreResult<Vec<Player>> {
        self.inner.list_players().await
    }

    async fn find_player(&self, id: PlayerId) -> StoreResult<Option<Player>> {
        self.inner.find_player(id).await
    }

    async fn recent_logs(&self, limit: usize) -> StoreResult<Vec<AuctionLog>> {
        self.inner.recent_logs(limit).await
    }
}

struct BrokenLogTx {
    inner: Box<dyn AuctionTx>,
}

#[async_trait]
impl AuctionTx for BrokenLogTx {
    fn scope(&self) -> TransactionScope {
        self.inner.scope()
    }

    async fn control(&mut self) -> StoreResult<AuctionControl> {
        self.inner.control().await
    }

    async fn save_control(&mut self, control: &AuctionControl) -> StoreResult<()> {
        self.inner.save_control(control).await
    }

    async fn team(&mut self, id: TeamId) -> StoreResult<Option<Team>> {
        self.inner.team(id).await
    }

    async fn team_by_name(&mut self, name: &str) -> StoreResult<Option<Team>> {
        self.inner.team_by_name(name).await
    }

    async fn teams(&mut self) -> StoreResult<Vec<Team>> {
        self.inner.teams().await
    }

    async fn insert_team(&mut self, team: &NewTeam) -> StoreResult<Team> {
        self.inner.insert_team(team).await
    }

    async fn save_team(&mut self, team: &Team) -> StoreResult<()> {
        self.inner.save_team(team).await
    }

    async fn delete_team(&mut self, id: TeamId) -> StoreResult<bool> {
        self.inner.delete_team(id).await
    }

    async fn player(&mut self, id: PlayerId) -> StoreResult<Option<Player>> {
        self.inner.player(id).await
    }

    async fn player_by_serial(&mut self, serial_number: i32) -> StoreResult<Option<Player>> {
        self.inner.player_by_serial(serial_number).await
    }

    async fn players(&mut self) -> StoreResult<Vec<Player>> {
        self.inner.players().await
    }

    async fn insert_player(&mut self, player: &NewPlayer) -> StoreResult<Player> {
        self.inner.insert_player(player).await
    }

    async fn save_player(&mut self, player: &Player) -> StoreResult<()> {
        self.inner.save_player(player).await
    }

    async fn delete_player(&mut self, id: PlayerId) -> StoreResult<bool> {
        self.inner.delete_player(id).await
    }

    async fn append_log(&mut self, _entry: &NewLogEntry) -> StoreResult<AuctionLog> {
        Err(StoreError::Unavailable("audit table is read-only".into()))
    }

    async fn latest_log(&mut self) -> StoreResult<Option<AuctionLog>> {
        self.inner.latest_log().await
    }

    async fn mark_log_undone(&mut self, id: LogId) -> StoreResult<()> {
        self.inner.mark_log_undone(id).await
    }

    async fn void_active_sales(&mut self) -> StoreResult<u64> {
        self.inner.void_active_sales().await
    }

    async fn active_sales_in_stage(&mut self, stage: AuctionStage) -> StoreResult<Vec<AuctionLog>> {
        self.inner.active_sales_in_stage(stage).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }
}

/// A sale whose audit write fails leaves no trace: budget, player and block are unchanged.
#[tokio::test]
async fn failed_audit_write_rolls_back_sale() {
    let memory = MemoryStore::new();
    let engine = AuctionEngine::new(
        Arc::new(BrokenLogStore {
            inner: memory.clone(),
        }),
        AuctionConfig::default(),
    );
    let lions = engine.register_team(NewTeam::new("Lions")).await.unwrap();
    engine
        .register_player(NewPlayer::new(1, "Arjun", PlayerRole::Bat))
        .await
        .unwrap();
    engine.start_auction().await.unwrap();
    let picked = engine.pick_random_player().await.unwrap();

    let err = engine
        .sell_current_player(lions.id, 1000, None)
        .await
        .unwrap_err();
    assert!(!err.is_validation());
    assert_eq!(err.to_string(), "Failed to sell player");

    let team = &memory.list_teams().await.unwrap()[0];
    assert_eq!(team.remaining_points, 10_000);
    assert_eq!(team.auction_slots, lions.auction_slots);

    let player = memory.find_player(picked.id).await.unwrap().unwrap();
    assert_eq!(player.status, PlayerStatus::Unsold);
    assert_eq!(player.team_id, None);

    let control = memory.load_control().await.unwrap().unwrap();
    assert_eq!(control.current_player_id, Some(picked.id));
    assert!(memory.recent_logs(10).await.unwrap().is_empty());
}
