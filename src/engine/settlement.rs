//! Round settlement engine.
//!
//! Closing a round, resolving every bet exactly once, and crediting
//! winners all happen inside one transaction on the store's single
//! connection. Once settlement begins, no placement can observe the
//! round as open: the round close and the current-round pointer clear
//! commit atomically with the bet resolutions, so a concurrent second
//! announce (admin double-click, scheduler firing at the same moment)
//! finds no open round instead of double-crediting.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info};

use crate::config::GameConfig;
use crate::store::{self, Store};
use crate::types::{BetResult, FailedCredit, LedgerError, SettlementReport};

use super::with_conflict_retry;

pub struct SettlementEngine {
    store: Store,
    game: GameConfig,
}

impl SettlementEngine {
    pub fn new(store: Store, game: GameConfig) -> Self {
        Self { store, game }
    }

    /// Announce the winning number for the open round and settle it.
    ///
    /// Every bet in the round moves from `pending` to `win` or `lose`;
    /// winners are credited `amount × payout_multiplier`. A winner whose
    /// account no longer exists does not abort the rest of the round —
    /// the miss is recorded in the report and logged as unresolved
    /// money. Fails with `NoOpenRound` if the round was already settled.
    pub async fn announce_result(
        &self,
        winning_number: i64,
    ) -> Result<SettlementReport, LedgerError> {
        with_conflict_retry("announce_result", || self.try_announce(winning_number)).await
    }

    async fn try_announce(&self, winning_number: i64) -> Result<SettlementReport, LedgerError> {
        if !self.game.number_in_range(winning_number) {
            return Err(LedgerError::Validation(format!(
                "Winning number must be between {} and {}",
                self.game.number_min, self.game.number_max,
            )));
        }

        let mut tx = self.store.begin().await?;

        let round = store::current_round(&mut tx)
            .await?
            .filter(|r| r.is_open())
            .ok_or(LedgerError::NoOpenRound)?;

        let settings = store::settings(&mut tx).await?;
        let multiplier = settings.payout_multiplier;

        let bets = store::bets_for_round(&mut tx, &round.id).await?;

        let mut total_bets = Decimal::ZERO;
        let mut total_payout = Decimal::ZERO;
        let mut winners = 0usize;
        let mut failed_credits = Vec::new();

        for bet in &bets {
            total_bets += bet.amount;

            if bet.number == winning_number {
                let payout = bet.amount * multiplier;
                total_payout += payout;
                winners += 1;
                store::update_bet_result(&mut tx, &bet.id, BetResult::Win, payout).await?;

                if !store::credit_balance(&mut tx, &bet.account_id, payout).await? {
                    failed_credits.push(FailedCredit {
                        bet_id: bet.id.clone(),
                        account_id: bet.account_id.clone(),
                        amount: payout,
                        reason: "account not found".into(),
                    });
                }
            } else {
                store::update_bet_result(&mut tx, &bet.id, BetResult::Lose, Decimal::ZERO).await?;
            }
        }

        let now = Utc::now();
        store::close_round(&mut tx, &round.id, Some(winning_number), now).await?;
        store::set_current_round(&mut tx, None).await?;

        tx.commit().await?;

        let report = SettlementReport {
            round_id: round.id,
            winning_number,
            bets_settled: bets.len(),
            winners,
            total_bets,
            total_payout,
            profit: total_bets - total_payout,
            failed_credits,
        };

        info!(
            round_id = %report.round_id,
            winning_number,
            bets = report.bets_settled,
            winners = report.winners,
            total_bets = %report.total_bets,
            total_payout = %report.total_payout,
            profit = %report.profit,
            "Round settled"
        );
        for failed in &report.failed_credits {
            error!(
                bet_id = %failed.bet_id,
                account_id = %failed.account_id,
                amount = %failed.amount,
                reason = %failed.reason,
                "Winner credit failed — unresolved money"
            );
        }

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Account, Bet, Round, RoundStatus};
    use rust_decimal_macros::dec;

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    fn engine(store: &Store) -> SettlementEngine {
        SettlementEngine::new(store.clone(), GameConfig::default())
    }

    async fn seed_account(store: &Store, id: &str, balance: Decimal) {
        let mut tx = store.begin().await.unwrap();
        store::insert_account(
            &mut tx,
            &Account {
                id: id.into(),
                name: format!("user-{id}"),
                mobile: None,
                balance,
                referral_code: format!("code-{id}"),
                referred_by: None,
                is_admin: false,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    async fn seed_round(store: &Store, id: &str) {
        let mut tx = store.begin().await.unwrap();
        store::insert_round(
            &mut tx,
            &Round {
                id: id.into(),
                status: RoundStatus::Open,
                winning_number: None,
                created_at: Utc::now(),
                closed_at: None,
            },
        )
        .await
        .unwrap();
        store::set_current_round(&mut tx, Some(id)).await.unwrap();
        tx.commit().await.unwrap();
    }

    async fn seed_bet(store: &Store, id: &str, account_id: &str, number: i64, amount: Decimal) {
        let mut tx = store.begin().await.unwrap();
        store::insert_bet(
            &mut tx,
            &Bet {
                id: id.into(),
                account_id: account_id.into(),
                round_id: "r1".into(),
                number,
                amount,
                result: BetResult::Pending,
                payout: Decimal::ZERO,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    /// The worked example: bets 100@4, 50@7, 200@4, multiplier 10,
    /// announce 4 → totals 350 / 3000 / −2650.
    #[tokio::test]
    async fn test_settlement_worked_example() {
        let store = memory_store().await;
        seed_account(&store, "a", dec!(0)).await;
        seed_account(&store, "b", dec!(0)).await;
        seed_account(&store, "c", dec!(0)).await;
        seed_round(&store, "r1").await;
        seed_bet(&store, "b1", "a", 4, dec!(100)).await;
        seed_bet(&store, "b2", "b", 7, dec!(50)).await;
        seed_bet(&store, "b3", "c", 4, dec!(200)).await;

        let report = engine(&store).announce_result(4).await.unwrap();

        assert_eq!(report.total_bets, dec!(350));
        assert_eq!(report.total_payout, dec!(3000));
        assert_eq!(report.profit, dec!(-2650));
        assert_eq!(report.winners, 2);
        assert_eq!(report.bets_settled, 3);
        assert!(report.failed_credits.is_empty());

        assert_eq!(store.account("a").await.unwrap().unwrap().balance, dec!(1000));
        assert_eq!(store.account("b").await.unwrap().unwrap().balance, dec!(0));
        assert_eq!(store.account("c").await.unwrap().unwrap().balance, dec!(2000));

        let bets = store.bets_for_round("r1").await.unwrap();
        let by_id = |id: &str| bets.iter().find(|b| b.id == id).unwrap();
        assert_eq!(by_id("b1").result, BetResult::Win);
        assert_eq!(by_id("b1").payout, dec!(1000));
        assert_eq!(by_id("b2").result, BetResult::Lose);
        assert_eq!(by_id("b2").payout, Decimal::ZERO);
        assert_eq!(by_id("b3").result, BetResult::Win);
        assert_eq!(by_id("b3").payout, dec!(2000));
    }

    #[tokio::test]
    async fn test_exhaustive_resolution_no_pending_left() {
        let store = memory_store().await;
        seed_account(&store, "a", dec!(0)).await;
        seed_round(&store, "r1").await;
        for i in 0..10 {
            seed_bet(&store, &format!("b{i}"), "a", i, dec!(10)).await;
        }

        engine(&store).announce_result(3).await.unwrap();

        let bets = store.bets_for_round("r1").await.unwrap();
        assert_eq!(bets.len(), 10);
        assert!(bets.iter().all(|b| b.result.is_settled()));
        assert_eq!(bets.iter().filter(|b| b.result == BetResult::Win).count(), 1);
    }

    #[tokio::test]
    async fn test_round_closed_and_pointer_cleared() {
        let store = memory_store().await;
        seed_round(&store, "r1").await;

        engine(&store).announce_result(5).await.unwrap();

        assert!(store.current_round().await.unwrap().is_none());
        let round = store.round("r1").await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Closed);
        assert_eq!(round.winning_number, Some(5));
        assert!(round.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_second_announce_fails_no_double_credit() {
        let store = memory_store().await;
        seed_account(&store, "a", dec!(0)).await;
        seed_round(&store, "r1").await;
        seed_bet(&store, "b1", "a", 4, dec!(100)).await;

        let engine = engine(&store);
        engine.announce_result(4).await.unwrap();
        let err = engine.announce_result(4).await.unwrap_err();
        assert!(matches!(err, LedgerError::NoOpenRound));

        // credited exactly once
        assert_eq!(store.account("a").await.unwrap().unwrap().balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_no_open_round_rejected() {
        let store = memory_store().await;
        let err = engine(&store).announce_result(4).await.unwrap_err();
        assert!(matches!(err, LedgerError::NoOpenRound));
    }

    #[tokio::test]
    async fn test_winning_number_out_of_range_rejected() {
        let store = memory_store().await;
        seed_round(&store, "r1").await;
        let err = engine(&store).announce_result(10).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        // round untouched
        assert!(store.current_round().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_account_isolated_per_bet() {
        let store = memory_store().await;
        seed_account(&store, "a", dec!(0)).await;
        seed_round(&store, "r1").await;
        // b1 belongs to an account that no longer exists
        seed_bet(&store, "b1", "ghost", 4, dec!(100)).await;
        seed_bet(&store, "b2", "a", 4, dec!(50)).await;
        seed_bet(&store, "b3", "a", 9, dec!(25)).await;

        let report = engine(&store).announce_result(4).await.unwrap();

        // the remaining bets still settled and the round still closed
        assert_eq!(report.bets_settled, 3);
        assert_eq!(report.failed_credits.len(), 1);
        assert_eq!(report.failed_credits[0].bet_id, "b1");
        assert_eq!(report.failed_credits[0].amount, dec!(1000));
        assert_eq!(store.account("a").await.unwrap().unwrap().balance, dec!(500));
        assert!(store.current_round().await.unwrap().is_none());

        // totals still include the uncredited payout
        assert_eq!(report.total_payout, dec!(1500));
        assert_eq!(report.profit, dec!(-1325));
    }

    #[tokio::test]
    async fn test_empty_round_settles_to_zero_totals() {
        let store = memory_store().await;
        seed_round(&store, "r1").await;

        let report = engine(&store).announce_result(7).await.unwrap();
        assert_eq!(report.bets_settled, 0);
        assert_eq!(report.total_bets, Decimal::ZERO);
        assert_eq!(report.total_payout, Decimal::ZERO);
        assert_eq!(report.profit, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_multiplier_from_settings() {
        let store = memory_store().await;
        store
            .update_settings(&crate::types::SettingsUpdate {
                payout_multiplier: Some(dec!(5)),
                ..Default::default()
            })
            .await
            .unwrap();
        seed_account(&store, "a", dec!(0)).await;
        seed_round(&store, "r1").await;
        seed_bet(&store, "b1", "a", 2, dec!(40)).await;

        let report = engine(&store).announce_result(2).await.unwrap();
        assert_eq!(report.total_payout, dec!(200));
        assert_eq!(store.account("a").await.unwrap().unwrap().balance, dec!(200));
    }

    /// Concurrent double announce: exactly one succeeds, each bet is
    /// settled exactly once.
    #[tokio::test]
    async fn test_concurrent_announce_settles_once() {
        let store = memory_store().await;
        seed_account(&store, "a", dec!(0)).await;
        seed_round(&store, "r1").await;
        seed_bet(&store, "b1", "a", 4, dec!(100)).await;

        let e1 = SettlementEngine::new(store.clone(), GameConfig::default());
        let e2 = SettlementEngine::new(store.clone(), GameConfig::default());
        let (r1, r2) = tokio::join!(e1.announce_result(4), e2.announce_result(4));

        let successes = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert_eq!(store.account("a").await.unwrap().unwrap().balance, dec!(1000));
    }
}
