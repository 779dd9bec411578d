//! Round lifecycle manager.
//!
//! Opens the next betting round. If a round is still open (an abandoned
//! round the admin is overriding), its pending bets are voided with a
//! full stake refund before the round closes — never silently dropped —
//! and only then is the new round created and the current-round pointer
//! moved. The whole transition is one transaction, so the at-most-one-
//! open-round invariant holds at every commit point.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{self, Store};
use crate::types::{BetResult, LedgerError, Round, RoundStatus};

use super::with_conflict_retry;

/// Result of opening a round.
#[derive(Debug, Clone)]
pub struct RoundOpened {
    pub round: Round,
    /// Pending bets of the previous round that were voided and refunded.
    pub voided_bets: usize,
    /// Total stake refunded to bettors.
    pub refunded: Decimal,
}

pub struct RoundLifecycle {
    store: Store,
}

impl RoundLifecycle {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Close any open round (voiding and refunding its pending bets) and
    /// open a fresh one.
    pub async fn open_new_round(&self) -> Result<RoundOpened, LedgerError> {
        with_conflict_retry("open_new_round", || self.try_open()).await
    }

    async fn try_open(&self) -> Result<RoundOpened, LedgerError> {
        let mut tx = self.store.begin().await?;
        let now = Utc::now();

        let mut voided_bets = 0usize;
        let mut refunded = Decimal::ZERO;

        if let Some(previous) = store::current_round(&mut tx).await?.filter(|r| r.is_open()) {
            let bets = store::bets_for_round(&mut tx, &previous.id).await?;
            for bet in bets.iter().filter(|b| b.result == BetResult::Pending) {
                store::update_bet_result(&mut tx, &bet.id, BetResult::Voided, Decimal::ZERO)
                    .await?;
                if store::credit_balance(&mut tx, &bet.account_id, bet.amount).await? {
                    refunded += bet.amount;
                } else {
                    warn!(
                        bet_id = %bet.id,
                        account_id = %bet.account_id,
                        amount = %bet.amount,
                        "Stake refund failed: account not found"
                    );
                }
                voided_bets += 1;
            }
            store::close_round(&mut tx, &previous.id, None, now).await?;
            store::set_current_round(&mut tx, None).await?;

            if voided_bets > 0 {
                warn!(
                    round_id = %previous.id,
                    voided_bets,
                    refunded = %refunded,
                    "Force-closed round with pending bets; stakes refunded"
                );
            }
        }

        let round = Round {
            id: Uuid::new_v4().to_string(),
            status: RoundStatus::Open,
            winning_number: None,
            created_at: now,
            closed_at: None,
        };
        store::insert_round(&mut tx, &round).await?;
        store::set_current_round(&mut tx, Some(&round.id)).await?;

        tx.commit().await?;

        info!(round_id = %round.id, voided_bets, "New round opened");
        Ok(RoundOpened {
            round,
            voided_bets,
            refunded,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
