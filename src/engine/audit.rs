//! Audit trail access inside a write transaction

use std::collections::HashMap;

use tracing::debug;

use super::TxError;
use crate::domain::{ActionType, AuctionLog, AuctionStage, NewLogEntry, TeamId};
use crate::error::ValidationError;
use crate::store::AuctionTx;

/// Append one entry to the log
pub async fn record(tx: &mut dyn AuctionTx, entry: NewLogEntry) -> Result<AuctionLog, TxError> {
    let log = tx.append_log(&entry).await?;
    debug!(
        log_id = log.id,
        action = %log.action_type,
        scope = %tx.scope(),
        "Appended audit entry"
    );
    Ok(log)
}

/// The SOLD entry the next undo would reverse.
///
/// Only the single most recent entry is considered; anything logged after a
/// sale (including a previous undo) makes it unreachable.
pub async fn reversible_sale(tx: &mut dyn AuctionTx) -> Result<AuctionLog, TxError> {
    let latest = tx
        .latest_log()
        .await?
        .ok_or(ValidationError::NothingToUndo)?;

    if !latest.is_active_sale() {
        return Err(ValidationError::NotUndoable.into());
    }
    Ok(latest)
}

/// Stamp `sale` as reversed and append the UNDO entry describing it
pub async fn consume(
    tx: &mut dyn AuctionTx,
    sale: &AuctionLog,
    admin_user: Option<&str>,
) -> Result<AuctionLog, TxError> {
    tx.mark_log_undone(sale.id).await?;

    let mut entry = NewLogEntry::new(ActionType::Undo)
        .admin(admin_user)
        .notes(format!("undo of entry {}", sale.id));
    if let Some(player_id) = sale.player_id {
        entry = entry.player(player_id);
    }
    if let Some(team_id) = sale.team_id {
        entry = entry.team(team_id);
    }
    if let Some(price) = sale.sold_price {
        entry = entry.price(price);
    }
    if let Some(stage) = sale.stage {
        entry = entry.stage(stage);
    }

    record(tx, entry).await
}

/// Active purchases per team during `stage`
pub async fn stage_purchases(
    tx: &mut dyn AuctionTx,
    stage: AuctionStage,
) -> Result<HashMap<TeamId, usize>, TxError> {
    let mut purchases = HashMap::new();
    for sale in tx.active_sales_in_stage(stage).await? {
        if let Some(team_id) = sale.team_id {
            *purchases.entry(team_id).or_insert(0) += 1;
        }
    }
    Ok(purchases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AuctionStore, MemoryStore, TransactionScope};

    #[tokio::test]
    async fn test_reversible_sale_requires_latest_sold() {
        let store = MemoryStore::new();
        let mut tx = store.begin(TransactionScope::Undo).await.unwrap();

        let err = reversible_sale(tx.as_mut()).await.unwrap_err();
        assert!(matches!(err, TxError::Validation(ValidationError::NothingToUndo)));

        record(tx.as_mut(), NewLogEntry::new(ActionType::Unsold).player(1))
            .await
            .unwrap();
        let err = reversible_sale(tx.as_mut()).await.unwrap_err();
        assert!(matches!(err, TxError::Validation(ValidationError::NotUndoable)));

        let sale = record(
            tx.as_mut(),
            NewLogEntry::new(ActionType::Sold)
                .player(1)
                .team(2)
                .price(400)
                .stage(AuctionStage::Bat),
        )
        .await
        .unwrap();
        assert_eq!(reversible_sale(tx.as_mut()).await.unwrap().id, sale.id);
    }

    #[tokio::test]
    async fn test_consume_blocks_second_undo() {
        let store = MemoryStore::new();
        let mut tx = store.begin(TransactionScope::Undo).await.unwrap();

        let sale = record(
            tx.as_mut(),
            NewLogEntry::new(ActionType::Sold)
                .player(1)
                .team(2)
                .price(400)
                .stage(AuctionStage::Bat),
        )
        .await
        .unwrap();

        let undo = consume(tx.as_mut(), &sale, Some("admin")).await.unwrap();
        assert_eq!(undo.action_type, ActionType::Undo);
        assert_eq!(undo.player_id, Some(1));
        assert_eq!(undo.sold_price, Some(400));
        assert_eq!(undo.admin_user.as_deref(), Some("admin"));

        let err = reversible_sale(tx.as_mut()).await.unwrap_err();
        assert!(matches!(err, TxError::Validation(ValidationError::NotUndoable)));
        assert!(stage_purchases(tx.as_mut(), AuctionStage::Bat)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_stage_purchases_counts_per_team() {
        let store = MemoryStore::new();
        let mut tx = store.begin(TransactionScope::Sell).await.unwrap();

        for (team, stage) in [
            (1, AuctionStage::Bat),
            (1, AuctionStage::Bat),
            (2, AuctionStage::Bat),
            (2, AuctionStage::Bowl),
        ] {
            record(
                tx.as_mut(),
                NewLogEntry::new(ActionType::Sold)
                    .team(team)
                    .price(100)
                    .stage(stage),
            )
            .await
            .unwrap();
        }

        let purchases = stage_purchases(tx.as_mut(), AuctionStage::Bat).await.unwrap();
        assert_eq!(purchases.get(&1), Some(&2));
        assert_eq!(purchases.get(&2), Some(&1));
    }
}
