use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Postgres, Row, Transaction};
use tracing::{debug, info, instrument, warn};

use super::{AuctionStore, AuctionTx, TransactionScope};
use crate::domain::{
    ActionType, AuctionControl, AuctionLog, AuctionStage, LogId, NewLogEntry, NewPlayer, NewTeam,
    Player, PlayerId, PlayerRole, PlayerStatus, Team, TeamId,
};
use crate::error::{StoreError, StoreResult};

const TEAM_COLUMNS: &str =
    "id, name, total_points, remaining_points, max_players, auction_slots";
const PLAYER_COLUMNS: &str =
    "id, serial_number, name, role, base_price, status, sold_price, team_id, notes";
const LOG_COLUMNS: &str =
    "id, timestamp, action_type, player_id, team_id, sold_price, stage, admin_user, notes, undone_at";

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl AuctionStore for PostgresStore {
    #[instrument(skip(self))]
    async fn begin(&self, scope: TransactionScope) -> StoreResult<Box<dyn AuctionTx>> {
        let tx = self.pool.begin().await?;
        debug!("Started transaction for scope: {}", scope);
        Ok(Box::new(PgTx {
            tx: Some(tx),
            scope,
        }))
    }

    async fn load_control(&self) -> StoreResult<Option<AuctionControl>> {
        let row = sqlx::query(
            r#"
            SELECT is_started, current_stage, current_player_id, is_rebid, is_parked
            FROM auction_control WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(control_from_row).transpose()
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        let rows = sqlx::query(&format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(team_from_row).collect()
    }

    async fn list_players(&self) -> StoreResult<Vec<Player>> {
        let rows = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(player_from_row).collect()
    }

    async fn find_player(&self, id: PlayerId) -> StoreResult<Option<Player>> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(player_from_row).transpose()
    }

    async fn recent_logs(&self, limit: usize) -> StoreResult<Vec<AuctionLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM auction_log ORDER BY id DESC LIMIT $1"
        ))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }
}

/// Transaction over a pooled connection. The control row is locked with
/// `FOR UPDATE` on first access, which serializes every writer.
struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
    scope: TransactionScope,
}

impl PgTx {
    fn executor(&mut self) -> StoreResult<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(StoreError::Unavailable(format!(
                "transaction for scope {} already consumed",
                self.scope
            ))),
        }
    }
}

#[async_trait]
impl AuctionTx for PgTx {
    fn scope(&self) -> TransactionScope {
        self.scope
    }

    async fn control(&mut self) -> StoreResult<AuctionControl> {
        let conn = self.executor()?;

        sqlx::query("INSERT INTO auction_control (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
            .execute(&mut *conn)
            .await?;

        let row = sqlx::query(
            r#"
            SELECT is_started, current_stage, current_player_id, is_rebid, is_parked
            FROM auction_control WHERE id = 1
            FOR UPDATE
            "#,
        )
        .fetch_one(&mut *conn)
        .await?;

        control_from_row(&row)
    }

    async fn save_control(&mut self, control: &AuctionControl) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE auction_control SET
                is_started = $1,
                current_stage = $2,
                current_player_id = $3,
                is_rebid = $4,
                is_parked = $5
            WHERE id = 1
            "#,
        )
        .bind(control.is_started)
        .bind(control.current_stage.as_str())
        .bind(control.current_player_id)
        .bind(control.is_rebid)
        .bind(control.is_parked)
        .execute(self.executor()?)
        .await?;

        Ok(())
    }

    // ==================== Teams ====================

    async fn team(&mut self, id: TeamId) -> StoreResult<Option<Team>> {
        let row = sqlx::query(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.executor()?)
        .await?;

        row.as_ref().map(team_from_row).transpose()
    }

    async fn team_by_name(&mut self, name: &str) -> StoreResult<Option<Team>> {
        let row = sqlx::query(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE name = $1"))
            .bind(name)
            .fetch_optional(self.executor()?)
            .await?;

        row.as_ref().map(team_from_row).transpose()
    }

    async fn teams(&mut self) -> StoreResult<Vec<Team>> {
        let rows = sqlx::query(&format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY id"))
            .fetch_all(self.executor()?)
            .await?;

        rows.iter().map(team_from_row).collect()
    }

    async fn insert_team(&mut self, team: &NewTeam) -> StoreResult<Team> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO teams (name, total_points, remaining_points, max_players, auction_slots)
            VALUES ($1, $2, $2, $3, $4)
            RETURNING {TEAM_COLUMNS}
            "#
        ))
        .bind(&team.name)
        .bind(team.total_points)
        .bind(team.max_players)
        .bind(team.auction_slots)
        .fetch_one(self.executor()?)
        .await?;

        team_from_row(&row)
    }

    async fn save_team(&mut self, team: &Team) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE teams SET
                name = $2,
                total_points = $3,
                remaining_points = $4,
                max_players = $5,
                auction_slots = $6
            WHERE id = $1
            "#,
        )
        .bind(team.id)
        .bind(&team.name)
        .bind(team.total_points)
        .bind(team.remaining_points)
        .bind(team.max_players)
        .bind(team.auction_slots)
        .execute(self.executor()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("team {} does not exist", team.id)));
        }
        Ok(())
    }

    async fn delete_team(&mut self, id: TeamId) -> StoreResult<bool> {
        // Weak references are cleared by ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(self.executor()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== Players ====================

    async fn player(&mut self, id: PlayerId) -> StoreResult<Option<Player>> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(self.executor()?)
        .await?;

        row.as_ref().map(player_from_row).transpose()
    }

    async fn player_by_serial(&mut self, serial_number: i32) -> StoreResult<Option<Player>> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE serial_number = $1"
        ))
        .bind(serial_number)
        .fetch_optional(self.executor()?)
        .await?;

        row.as_ref().map(player_from_row).transpose()
    }

    async fn players(&mut self) -> StoreResult<Vec<Player>> {
        let rows = sqlx::query(&format!("SELECT {PLAYER_COLUMNS} FROM players ORDER BY id"))
            .fetch_all(self.executor()?)
            .await?;

        rows.iter().map(player_from_row).collect()
    }

    async fn insert_player(&mut self, player: &NewPlayer) -> StoreResult<Player> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO players (serial_number, name, role, base_price, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PLAYER_COLUMNS}
            "#
        ))
        .bind(player.serial_number)
        .bind(&player.name)
        .bind(player.role.as_str())
        .bind(player.base_price)
        .bind(&player.notes)
        .fetch_one(self.executor()?)
        .await?;

        player_from_row(&row)
    }

    async fn save_player(&mut self, player: &Player) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE players SET
                serial_number = $2,
                name = $3,
                role = $4,
                base_price = $5,
                status = $6,
                sold_price = $7,
                team_id = $8,
                notes = $9
            WHERE id = $1
            "#,
        )
        .bind(player.id)
        .bind(player.serial_number)
        .bind(&player.name)
        .bind(player.role.as_str())
        .bind(player.base_price)
        .bind(player.status.as_str())
        .bind(player.sold_price)
        .bind(player.team_id)
        .bind(&player.notes)
        .execute(self.executor()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!(
                "player {} does not exist",
                player.id
            )));
        }
        Ok(())
    }

    async fn delete_player(&mut self, id: PlayerId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM players WHERE id = $1")
            .bind(id)
            .execute(self.executor()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== Log ====================

    async fn append_log(&mut self, entry: &NewLogEntry) -> StoreResult<AuctionLog> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO auction_log (
                action_type, player_id, team_id, sold_price, stage, admin_user, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(entry.action_type.as_str())
        .bind(entry.player_id)
        .bind(entry.team_id)
        .bind(entry.sold_price)
        .bind(entry.stage.map(|s| s.as_str()))
        .bind(&entry.admin_user)
        .bind(&entry.notes)
        .fetch_one(self.executor()?)
        .await?;

        log_from_row(&row)
    }

    async fn latest_log(&mut self) -> StoreResult<Option<AuctionLog>> {
        let row = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM auction_log ORDER BY id DESC LIMIT 1"
        ))
        .fetch_optional(self.executor()?)
        .await?;

        row.as_ref().map(log_from_row).transpose()
    }

    async fn mark_log_undone(&mut self, id: LogId) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE auction_log SET undone_at = NOW() WHERE id = $1 AND undone_at IS NULL",
        )
        .bind(id)
        .execute(self.executor()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!(
                "log entry {} missing or already undone",
                id
            )));
        }
        Ok(())
    }

    async fn void_active_sales(&mut self) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE auction_log SET undone_at = NOW() WHERE action_type = 'SOLD' AND undone_at IS NULL",
        )
        .execute(self.executor()?)
        .await?;

        Ok(result.rows_affected())
    }

    async fn active_sales_in_stage(&mut self, stage: AuctionStage) -> StoreResult<Vec<AuctionLog>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM auction_log
            WHERE action_type = 'SOLD' AND undone_at IS NULL AND stage = $1
            ORDER BY id
            "#
        ))
        .bind(stage.as_str())
        .fetch_all(self.executor()?)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!("Committed transaction for scope: {}", self.scope);
        }
        Ok(())
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls back on drop
            warn!(
                "Transaction for scope {} was dropped without commit - rolling back",
                self.scope
            );
        }
    }
}

/// LIMIT argument for a row count, saturating at `i64::MAX`
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ==================== Row mapping ====================

fn corrupt(column: &str, err: String) -> StoreError {
    StoreError::Corrupt(format!("{}: {}", column, err))
}

fn control_from_row(row: &PgRow) -> StoreResult<AuctionControl> {
    let stage: String = row.try_get("current_stage")?;
    Ok(AuctionControl {
        is_started: row.try_get("is_started")?,
        current_stage: AuctionStage::try_from(stage.as_str())
            .map_err(|e| corrupt("current_stage", e))?,
        current_player_id: row.try_get("current_player_id")?,
        is_rebid: row.try_get("is_rebid")?,
        is_parked: row.try_get("is_parked")?,
    })
}

fn team_from_row(row: &PgRow) -> StoreResult<Team> {
    Ok(Team {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        total_points: row.try_get("total_points")?,
        remaining_points: row.try_get("remaining_points")?,
        max_players: row.try_get("max_players")?,
        auction_slots: row.try_get("auction_slots")?,
    })
}

fn player_from_row(row: &PgRow) -> StoreResult<Player> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;
    Ok(Player {
        id: row.try_get("id")?,
        serial_number: row.try_get("serial_number")?,
        name: row.try_get("name")?,
        role: PlayerRole::try_from(role.as_str()).map_err(|e| corrupt("role", e))?,
        base_price: row.try_get("base_price")?,
        status: PlayerStatus::try_from(status.as_str()).map_err(|e| corrupt("status", e))?,
        sold_price: row.try_get("sold_price")?,
        team_id: row.try_get("team_id")?,
        notes: row.try_get("notes")?,
    })
}

fn log_from_row(row: &PgRow) -> StoreResult<AuctionLog> {
    let action: String = row.try_get("action_type")?;
    let stage: Option<String> = row.try_get("stage")?;
    let stage = stage
        .map(|s| AuctionStage::try_from(s.as_str()))
        .transpose()
        .map_err(|e| corrupt("stage", e))?;

    Ok(AuctionLog {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        action_type: ActionType::try_from(action.as_str())
            .map_err(|e| corrupt("action_type", e))?,
        player_id: row.try_get("player_id")?,
        team_id: row.try_get("team_id")?,
        sold_price: row.try_get("sold_price")?,
        stage,
        admin_user: row.try_get("admin_user")?,
        notes: row.try_get("notes")?,
        undone_at: row.try_get("undone_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_limit_saturates() {
        assert_eq!(sql_limit(20), 20);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }
}
