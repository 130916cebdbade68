use serde::{Deserialize, Serialize};

pub type TeamId = i64;

pub const DEFAULT_TOTAL_POINTS: i64 = 10_000;
pub const DEFAULT_MAX_PLAYERS: i32 = 15;
pub const DEFAULT_AUCTION_SLOTS: i32 = 11;

/// A bidding team and its budget/roster bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Initial budget
    pub total_points: i64,
    /// Budget left; never negative, never above `total_points`
    pub remaining_points: i64,
    pub max_players: i32,
    /// Remaining roster capacity for auction purchases
    pub auction_slots: i32,
}

impl Team {
    pub fn spent_points(&self) -> i64 {
        self.total_points - self.remaining_points
    }

    pub fn can_afford(&self, price: i64) -> bool {
        self.remaining_points >= price
    }

    pub fn has_slot(&self) -> bool {
        self.auction_slots > 0
    }

    /// Charge a purchase. Callers validate budget and slots first.
    pub fn debit(&mut self, price: i64) {
        self.remaining_points -= price;
        self.auction_slots -= 1;
    }

    /// Exact inverse of [`Team::debit`]
    pub fn refund(&mut self, price: i64) {
        self.remaining_points += price;
        self.auction_slots += 1;
    }
}

/// Fields for registering a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeam {
    pub name: String,
    pub total_points: i64,
    pub max_players: i32,
    pub auction_slots: i32,
}

impl NewTeam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total_points: DEFAULT_TOTAL_POINTS,
            max_players: DEFAULT_MAX_PLAYERS,
            auction_slots: DEFAULT_AUCTION_SLOTS,
        }
    }

    pub fn with_points(mut self, total_points: i64) -> Self {
        self.total_points = total_points;
        self
    }

    pub fn with_max_players(mut self, max_players: i32) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn with_slots(mut self, auction_slots: i32) -> Self {
        self.auction_slots = auction_slots;
        self
    }

    pub fn into_team(self, id: TeamId) -> Team {
        Team {
            id,
            name: self.name,
            total_points: self.total_points,
            remaining_points: self.total_points,
            max_players: self.max_players,
            auction_slots: self.auction_slots,
        }
    }
}
