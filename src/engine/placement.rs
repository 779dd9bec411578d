//! Bet placement service.
//!
//! Validates a wager against the platform settings and the authoritative
//! number range, then records it against the currently open round inside
//! a single transaction: the balance debit and the bet insert commit
//! together or not at all. Placement never creates rounds — if none is
//! open it fails and the lifecycle manager (or an admin) must open one.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::store::{self, Store};
use crate::types::{Bet, BetResult, LedgerError};

use super::with_conflict_retry;

/// Result of a successful placement.
#[derive(Debug, Clone)]
pub struct PlacedBet {
    pub bet: Bet,
    pub new_balance: Decimal,
}

pub struct PlacementService {
    store: Store,
    game: GameConfig,
}

impl PlacementService {
    pub fn new(store: Store, game: GameConfig) -> Self {
        Self { store, game }
    }

    /// Place a wager for `account_id` on `number`.
    ///
    /// Atomic as a unit: on any rejection the account balance is
    /// untouched and no bet record exists.
    pub async fn place_bet(
        &self,
        account_id: &str,
        number: i64,
        amount: Decimal,
    ) -> Result<PlacedBet, LedgerError> {
        with_conflict_retry("place_bet", || self.try_place(account_id, number, amount)).await
    }

    async fn try_place(
        &self,
        account_id: &str,
        number: i64,
        amount: Decimal,
    ) -> Result<PlacedBet, LedgerError> {
        if !self.game.number_in_range(number) {
            return Err(LedgerError::Validation(format!(
                "Number must be between {} and {}",
                self.game.number_min, self.game.number_max,
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation("Bet amount must be positive".into()));
        }

        let mut tx = self.store.begin().await?;

        let settings = store::settings(&mut tx).await?;
        if settings.maintenance_mode {
            return Err(LedgerError::Maintenance);
        }
        if !settings.is_active {
            return Err(LedgerError::PlatformInactive);
        }
        if amount < settings.min_bet {
            return Err(LedgerError::Validation(format!(
                "Minimum bet is ₹{}",
                settings.min_bet,
            )));
        }
        if amount > settings.max_bet {
            return Err(LedgerError::Validation(format!(
                "Maximum bet is ₹{}",
                settings.max_bet,
            )));
        }

        let round = store::current_round(&mut tx)
            .await?
            .filter(|r| r.is_open())
            .ok_or(LedgerError::NoOpenRound)?;

        let new_balance = store::debit_balance(&mut tx, account_id, amount).await?;

        let bet = Bet {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            round_id: round.id.clone(),
            number,
            amount,
            result: BetResult::Pending,
            payout: Decimal::ZERO,
            created_at: Utc::now(),
        };
        store::insert_bet(&mut tx, &bet).await?;

        tx.commit().await?;

        info!(
            bet_id = %bet.id,
            account_id,
            round_id = %bet.round_id,
            number,
            amount = %amount,
            new_balance = %new_balance,
            "Bet placed"
        );

        Ok(PlacedBet { bet, new_balance })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
