use std::sync::Arc;

use auctioneer::domain::TeamId;
use auctioneer::{
    AuctionConfig, AuctionEngine, MemoryStore, NewPlayer, NewTeam, PlayerRole, ValidationError,
};

async fn setup(teams: usize, bat_players: i32) -> (AuctionEngine, Vec<TeamId>) {
    let engine = AuctionEngine::new(Arc::new(MemoryStore::new()), AuctionConfig::default());
    let mut ids = Vec::new();
    for i in 0..teams {
        let team = engine
            .register_team(NewTeam::new(format!("Team {i}")))
            .await
            .unwrap();
        ids.push(team.id);
    }
    for serial in 1..=bat_players {
        engine
            .register_player(NewPlayer::new(serial, format!("Icon {serial}"), PlayerRole::Bat))
            .await
            .unwrap();
    }
    engine.start_auction().await.unwrap();
    (engine, ids)
}

async fn pick_and_sell(engine: &AuctionEngine, team: TeamId) -> auctioneer::Result<()> {
    engine.pick_random_player().await?;
    engine.sell_current_player(team, 500, None).await.map(|_| ())
}

/// Two teams, two icons: the first buyer must wait for the other team.
#[tokio::test]
async fn repeat_buyer_blocked_until_every_team_buys() {
    let (engine, teams) = setup(2, 2).await;

    pick_and_sell(&engine, teams[0]).await.unwrap();
    let err = pick_and_sell(&engine, teams[0]).await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::IconRoundRestricted));

    // the player stays on the block for the next bid
    let status = engine.status().await.unwrap();
    assert!(status.current_player.is_some());
    engine.sell_current_player(teams[1], 500, None).await.unwrap();
}

/// Rebid mode suspends the round-robin rule.
#[tokio::test]
async fn rebid_allows_repeat_purchase() {
    let (engine, teams) = setup(2, 2).await;
    engine.enable_rebid().await.unwrap();

    pick_and_sell(&engine, teams[0]).await.unwrap();
    pick_and_sell(&engine, teams[0]).await.unwrap();
}

/// Fewer icons than teams: no restriction at all.
#[tokio::test]
async fn small_icon_pool_is_unrestricted() {
    let (engine, teams) = setup(3, 2).await;

    pick_and_sell(&engine, teams[0]).await.unwrap();
    pick_and_sell(&engine, teams[0]).await.unwrap();
}

/// Once every team has one icon the second round opens.
#[tokio::test]
async fn second_round_opens_after_full_round() {
    let (engine, teams) = setup(2, 4).await;

    pick_and_sell(&engine, teams[0]).await.unwrap();
    pick_and_sell(&engine, teams[1]).await.unwrap();
    pick_and_sell(&engine, teams[0]).await.unwrap();

    let err = engine.sell_current_player(teams[0], 500, None).await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::NoPlayerSelected));
    let err = pick_and_sell(&engine, teams[0]).await.unwrap_err();
    assert_eq!(err.validation(), Some(&ValidationError::IconRoundRestricted));
}

/// An undone icon purchase no longer counts toward the round.
#[tokio::test]
async fn undone_purchase_does_not_count() {
    let (engine, teams) = setup(2, 2).await;

    pick_and_sell(&engine, teams[0]).await.unwrap();
    engine.undo_last_action(None).await.unwrap();

    pick_and_sell(&engine, teams[1]).await.unwrap();
    pick_and_sell(&engine, teams[0]).await.unwrap();
}
