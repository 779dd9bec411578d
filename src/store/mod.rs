//! Persistence layer.
//!
//! SQLite via sqlx. The pool is capped at a single connection: SQLite is
//! single-writer, and the cap makes every ledger transaction serialize,
//! which is what the engines rely on for mutual exclusion. Monetary
//! values are stored as canonical decimal strings and all arithmetic
//! stays in `Decimal` on the Rust side.
//!
//! Transaction-scoped primitives are free functions taking a
//! `&mut SqliteConnection`; the engines compose them inside a single
//! transaction. `Store` adds pool-level read conveniences on top.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::types::{
    Account, Bet, BetResult, DepositRequest, LedgerError, PlatformSettings, RequestStatus, Round,
    RoundStatus, SettingsUpdate, WithdrawRequest,
};

/// Schema, applied idempotently at startup. The partial unique index on
/// open rounds backs the at-most-one-open-round invariant; the `runtime`
/// singleton row holds the authoritative current-round pointer.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        mobile TEXT UNIQUE,
        balance TEXT NOT NULL,
        referral_code TEXT NOT NULL UNIQUE,
        referred_by TEXT,
        is_admin INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS rounds (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        winning_number INTEGER,
        created_at TEXT NOT NULL,
        closed_at TEXT
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_rounds_single_open
        ON rounds (status) WHERE status = 'open'",
    "CREATE TABLE IF NOT EXISTS bets (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        round_id TEXT NOT NULL,
        number INTEGER NOT NULL,
        amount TEXT NOT NULL,
        result TEXT NOT NULL,
        payout TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_bets_round ON bets (round_id)",
    "CREATE INDEX IF NOT EXISTS idx_bets_account ON bets (account_id)",
    "CREATE TABLE IF NOT EXISTS settings (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        is_active INTEGER NOT NULL,
        min_bet TEXT NOT NULL,
        max_bet TEXT NOT NULL,
        payout_multiplier TEXT NOT NULL,
        maintenance_mode INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS runtime (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        current_round_id TEXT
    )",
    "INSERT OR IGNORE INTO runtime (id, current_round_id) VALUES (1, NULL)",
    "CREATE TABLE IF NOT EXISTS deposit_requests (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        amount TEXT NOT NULL,
        utr TEXT NOT NULL,
        status TEXT NOT NULL,
        admin_note TEXT,
        created_at TEXT NOT NULL,
        processed_at TEXT,
        UNIQUE (account_id, utr)
    )",
    "CREATE TABLE IF NOT EXISTS withdraw_requests (
        id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        holder_name TEXT NOT NULL,
        account_number TEXT NOT NULL,
        ifsc TEXT NOT NULL,
        amount TEXT NOT NULL,
        status TEXT NOT NULL,
        admin_note TEXT,
        created_at TEXT NOT NULL,
        processed_at TEXT
    )",
];

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // One connection: ledger transactions serialize structurally.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(url, "Ledger store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Begin a ledger transaction. All multi-step mutation goes through
    /// one of these.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, LedgerError> {
        Ok(self.pool.begin().await?)
    }

    // -- read conveniences ------------------------------------------------

    pub async fn account(&self, id: &str) -> Result<Option<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        account_by_id(&mut conn, id).await
    }

    pub async fn account_by_mobile(&self, mobile: &str) -> Result<Option<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT * FROM accounts WHERE mobile = ?1")
            .bind(mobile)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|r| map_account(&r)).transpose()
    }

    pub async fn account_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        account_by_referral(&mut conn, code).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY created_at DESC")
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(map_account).collect()
    }

    pub async fn round(&self, id: &str) -> Result<Option<Round>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT * FROM rounds WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|r| map_round(&r)).transpose()
    }

    pub async fn current_round(&self) -> Result<Option<Round>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        current_round(&mut conn).await
    }

    pub async fn list_rounds(&self, limit: i64) -> Result<Vec<Round>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT * FROM rounds ORDER BY created_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(map_round).collect()
    }

    pub async fn bets_for_round(&self, round_id: &str) -> Result<Vec<Bet>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        bets_for_round(&mut conn, round_id).await
    }

    pub async fn bets_for_account(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<Bet>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            "SELECT * FROM bets WHERE account_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(map_bet).collect()
    }

    /// Read the settings row, creating it with defaults on first read.
    pub async fn settings(&self) -> Result<PlatformSettings, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        settings(&mut conn).await
    }

    /// Apply a partial admin update to the settings row.
    pub async fn update_settings(
        &self,
        update: &SettingsUpdate,
    ) -> Result<PlatformSettings, LedgerError> {
        let mut tx = self.begin().await?;
        let current = settings(&mut tx).await?;
        let next = current.apply(update)?;
        write_settings(&mut tx, &next).await?;
        tx.commit().await?;
        info!(
            is_active = next.is_active,
            min_bet = %next.min_bet,
            max_bet = %next.max_bet,
            payout_multiplier = %next.payout_multiplier,
            maintenance_mode = next.maintenance_mode,
            "Platform settings updated"
        );
        Ok(next)
    }

    pub async fn deposit(&self, id: &str) -> Result<Option<DepositRequest>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT * FROM deposit_requests WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|r| map_deposit(&r)).transpose()
    }

    pub async fn deposits_for_account(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<DepositRequest>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            "SELECT * FROM deposit_requests WHERE account_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(map_deposit).collect()
    }

    pub async fn list_deposits(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<DepositRequest>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    "SELECT * FROM deposit_requests WHERE status = ?1 ORDER BY created_at DESC",
                )
                .bind(s.as_str())
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM deposit_requests ORDER BY created_at DESC")
                    .fetch_all(&mut *conn)
                    .await?
            }
        };
        rows.iter().map(map_deposit).collect()
    }

    pub async fn withdrawal(&self, id: &str) -> Result<Option<WithdrawRequest>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT * FROM withdraw_requests WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|r| map_withdrawal(&r)).transpose()
    }

    pub async fn withdrawals_for_account(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<WithdrawRequest>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            "SELECT * FROM withdraw_requests WHERE account_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(map_withdrawal).collect()
    }

    pub async fn list_withdrawals(&self) -> Result<Vec<WithdrawRequest>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT * FROM withdraw_requests ORDER BY created_at DESC")
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(map_withdrawal).collect()
    }

    // -- reporting --------------------------------------------------------

    /// Per-round financial summary for the admin round history.
    pub async fn round_summaries(&self, limit: i64) -> Result<Vec<RoundSummary>, LedgerError> {
        let rounds = self.list_rounds(limit).await?;
        let mut summaries = Vec::with_capacity(rounds.len());
        for round in rounds {
            let bets = self.bets_for_round(&round.id).await?;
            let mut total_bets = Decimal::ZERO;
            let mut total_payout = Decimal::ZERO;
            for bet in &bets {
                total_bets += bet.amount;
                total_payout += bet.payout;
            }
            summaries.push(RoundSummary {
                id: round.id,
                status: round.status,
                winning_number: round.winning_number,
                created_at: round.created_at,
                bet_count: bets.len(),
                total_bets,
                total_payout,
                profit: total_bets - total_payout,
            });
        }
        Ok(summaries)
    }

    /// Platform-wide counters and financials.
    pub async fn platform_stats(&self) -> Result<PlatformStats, LedgerError> {
        let mut conn = self.pool.acquire().await?;

        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&mut *conn)
            .await?;
        let total_bets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bets")
            .fetch_one(&mut *conn)
            .await?;
        let total_rounds: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rounds")
            .fetch_one(&mut *conn)
            .await?;
        let open_rounds: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rounds WHERE status = 'open'")
                .fetch_one(&mut *conn)
                .await?;

        let mut total_revenue = Decimal::ZERO;
        let mut total_payouts = Decimal::ZERO;
        let rows = sqlx::query("SELECT amount, payout, result FROM bets")
            .fetch_all(&mut *conn)
            .await?;
        for row in &rows {
            total_revenue += parse_decimal(&row.try_get::<String, _>("amount")?)?;
            let result: String = row.try_get("result")?;
            if result == "win" {
                total_payouts += parse_decimal(&row.try_get::<String, _>("payout")?)?;
            }
        }

        let total_profit = total_revenue - total_payouts;
        let profit_margin = if total_revenue > Decimal::ZERO {
            total_profit / total_revenue * Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        let settings = settings(&mut conn).await?;

        Ok(PlatformStats {
            total_users,
            total_bets,
            total_rounds,
            active_rounds: open_rounds,
            completed_rounds: total_rounds - open_rounds,
            total_revenue,
            total_payouts,
            total_profit,
            profit_margin,
            settings,
        })
    }
}

/// Per-round totals for the admin round history.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub id: String,
    pub status: RoundStatus,
    pub winning_number: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub bet_count: usize,
    pub total_bets: Decimal,
    pub total_payout: Decimal,
    pub profit: Decimal,
}

/// Platform-wide counters and financials for the admin stats screen.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_bets: i64,
    pub total_rounds: i64,
    pub active_rounds: i64,
    pub completed_rounds: i64,
    pub total_revenue: Decimal,
    pub total_payouts: Decimal,
    pub total_profit: Decimal,
    pub profit_margin: Decimal,
    pub settings: PlatformSettings,
}

// ---------------------------------------------------------------------------
// Transaction-scoped primitives
// ---------------------------------------------------------------------------

pub async fn account_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Account>, LedgerError> {
    let row = sqlx::query("SELECT * FROM accounts WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| map_account(&r)).transpose()
}

pub async fn account_by_referral(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Option<Account>, LedgerError> {
    let row = sqlx::query("SELECT * FROM accounts WHERE referral_code = ?1")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| map_account(&r)).transpose()
}

pub async fn insert_account(
    conn: &mut SqliteConnection,
    account: &Account,
) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO accounts \
         (id, name, mobile, balance, referral_code, referred_by, is_admin, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&account.id)
    .bind(&account.name)
    .bind(&account.mobile)
    .bind(account.balance.to_string())
    .bind(&account.referral_code)
    .bind(&account.referred_by)
    .bind(account.is_admin as i64)
    .bind(account.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Credit an account. Returns false if the account does not exist —
/// callers decide whether that is an error or a recorded failure.
pub async fn credit_balance(
    conn: &mut SqliteConnection,
    account_id: &str,
    amount: Decimal,
) -> Result<bool, LedgerError> {
    let Some(account) = account_by_id(&mut *conn, account_id).await? else {
        return Ok(false);
    };
    let new_balance = account.balance + amount;
    sqlx::query("UPDATE accounts SET balance = ?1 WHERE id = ?2")
        .bind(new_balance.to_string())
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Debit an account, failing before any mutation if the balance is
/// insufficient. Returns the new balance.
pub async fn debit_balance(
    conn: &mut SqliteConnection,
    account_id: &str,
    amount: Decimal,
) -> Result<Decimal, LedgerError> {
    let Some(account) = account_by_id(&mut *conn, account_id).await? else {
        return Err(LedgerError::AccountNotFound(account_id.to_string()));
    };
    if account.balance < amount {
        return Err(LedgerError::InsufficientBalance {
            needed: amount,
            available: account.balance,
        });
    }
    let new_balance = account.balance - amount;
    sqlx::query("UPDATE accounts SET balance = ?1 WHERE id = ?2")
        .bind(new_balance.to_string())
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    Ok(new_balance)
}

/// The round the singleton pointer designates, if any.
pub async fn current_round(conn: &mut SqliteConnection) -> Result<Option<Round>, LedgerError> {
    let row = sqlx::query(
        "SELECT r.id, r.status, r.winning_number, r.created_at, r.closed_at \
         FROM runtime rt JOIN rounds r ON r.id = rt.current_round_id \
         WHERE rt.id = 1",
    )
    .fetch_optional(&mut *conn)
    .await?;
    row.map(|r| map_round(&r)).transpose()
}

pub async fn set_current_round(
    conn: &mut SqliteConnection,
    round_id: Option<&str>,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE runtime SET current_round_id = ?1 WHERE id = 1")
        .bind(round_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn insert_round(conn: &mut SqliteConnection, round: &Round) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO rounds (id, status, winning_number, created_at, closed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&round.id)
    .bind(round.status.as_str())
    .bind(round.winning_number)
    .bind(round.created_at.to_rfc3339())
    .bind(round.closed_at.map(|t| t.to_rfc3339()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Flip a round to `closed`, recording the winning number when settled
/// (None for voided rounds).
pub async fn close_round(
    conn: &mut SqliteConnection,
    round_id: &str,
    winning_number: Option<i64>,
    closed_at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    sqlx::query(
        "UPDATE rounds SET status = 'closed', winning_number = ?1, closed_at = ?2 \
         WHERE id = ?3 AND status = 'open'",
    )
    .bind(winning_number)
    .bind(closed_at.to_rfc3339())
    .bind(round_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_bet(conn: &mut SqliteConnection, bet: &Bet) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO bets (id, account_id, round_id, number, amount, result, payout, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&bet.id)
    .bind(&bet.account_id)
    .bind(&bet.round_id)
    .bind(bet.number)
    .bind(bet.amount.to_string())
    .bind(bet.result.as_str())
    .bind(bet.payout.to_string())
    .bind(bet.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn bets_for_round(
    conn: &mut SqliteConnection,
    round_id: &str,
) -> Result<Vec<Bet>, LedgerError> {
    let rows = sqlx::query("SELECT * FROM bets WHERE round_id = ?1 ORDER BY created_at")
        .bind(round_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(map_bet).collect()
}

pub async fn update_bet_result(
    conn: &mut SqliteConnection,
    bet_id: &str,
    result: BetResult,
    payout: Decimal,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE bets SET result = ?1, payout = ?2 WHERE id = ?3")
        .bind(result.as_str())
        .bind(payout.to_string())
        .bind(bet_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Read the settings row, inserting the defaults on first read.
pub async fn settings(conn: &mut SqliteConnection) -> Result<PlatformSettings, LedgerError> {
    let row = sqlx::query("SELECT * FROM settings WHERE id = 1")
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => map_settings(&row),
        None => {
            let defaults = PlatformSettings::default();
            write_settings(&mut *conn, &defaults).await?;
            Ok(defaults)
        }
    }
}

pub async fn write_settings(
    conn: &mut SqliteConnection,
    settings: &PlatformSettings,
) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT OR REPLACE INTO settings \
         (id, is_active, min_bet, max_bet, payout_multiplier, maintenance_mode) \
         VALUES (1, ?1, ?2, ?3, ?4, ?5)",
    )
    .bind(settings.is_active as i64)
    .bind(settings.min_bet.to_string())
    .bind(settings.max_bet.to_string())
    .bind(settings.payout_multiplier.to_string())
    .bind(settings.maintenance_mode as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_deposit(
    conn: &mut SqliteConnection,
    request: &DepositRequest,
) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO deposit_requests \
         (id, account_id, amount, utr, status, admin_note, created_at, processed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&request.id)
    .bind(&request.account_id)
    .bind(request.amount.to_string())
    .bind(&request.utr)
    .bind(request.status.as_str())
    .bind(&request.admin_note)
    .bind(request.created_at.to_rfc3339())
    .bind(request.processed_at.map(|t| t.to_rfc3339()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn deposit_utr_exists(
    conn: &mut SqliteConnection,
    account_id: &str,
    utr: &str,
) -> Result<bool, LedgerError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM deposit_requests WHERE account_id = ?1 AND utr = ?2",
    )
    .bind(account_id)
    .bind(utr)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

pub async fn deposit_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<DepositRequest>, LedgerError> {
    let row = sqlx::query("SELECT * FROM deposit_requests WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| map_deposit(&r)).transpose()
}

pub async fn set_deposit_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: RequestStatus,
    admin_note: Option<&str>,
    processed_at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    sqlx::query(
        "UPDATE deposit_requests SET status = ?1, admin_note = ?2, processed_at = ?3 \
         WHERE id = ?4",
    )
    .bind(status.as_str())
    .bind(admin_note)
    .bind(processed_at.to_rfc3339())
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_withdrawal(
    conn: &mut SqliteConnection,
    request: &WithdrawRequest,
) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO withdraw_requests \
         (id, account_id, holder_name, account_number, ifsc, amount, status, admin_note, \
          created_at, processed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(&request.id)
    .bind(&request.account_id)
    .bind(&request.holder_name)
    .bind(&request.account_number)
    .bind(&request.ifsc)
    .bind(request.amount.to_string())
    .bind(request.status.as_str())
    .bind(&request.admin_note)
    .bind(request.created_at.to_rfc3339())
    .bind(request.processed_at.map(|t| t.to_rfc3339()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn withdrawal_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<WithdrawRequest>, LedgerError> {
    let row = sqlx::query("SELECT * FROM withdraw_requests WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| map_withdrawal(&r)).transpose()
}

pub async fn set_withdrawal_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: RequestStatus,
    admin_note: Option<&str>,
    processed_at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    sqlx::query(
        "UPDATE withdraw_requests SET status = ?1, admin_note = ?2, processed_at = ?3 \
         WHERE id = ?4",
    )
    .bind(status.as_str())
    .bind(admin_note)
    .bind(processed_at.to_rfc3339())
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_decimal(s: &str) -> Result<Decimal, LedgerError> {
    s.parse()
        .map_err(|e| LedgerError::Corrupt(format!("bad decimal {s:?}: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>, LedgerError> {
    s.as_deref().map(parse_timestamp).transpose()
}

fn map_account(row: &SqliteRow) -> Result<Account, LedgerError> {
    Ok(Account {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        mobile: row.try_get("mobile")?,
        balance: parse_decimal(&row.try_get::<String, _>("balance")?)?,
        referral_code: row.try_get("referral_code")?,
        referred_by: row.try_get("referred_by")?,
        is_admin: row.try_get::<i64, _>("is_admin")? != 0,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn map_round(row: &SqliteRow) -> Result<Round, LedgerError> {
    Ok(Round {
        id: row.try_get("id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        winning_number: row.try_get("winning_number")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        closed_at: parse_optional_timestamp(row.try_get("closed_at")?)?,
    })
}

fn map_bet(row: &SqliteRow) -> Result<Bet, LedgerError> {
    Ok(Bet {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        round_id: row.try_get("round_id")?,
        number: row.try_get("number")?,
        amount: parse_decimal(&row.try_get::<String, _>("amount")?)?,
        result: row.try_get::<String, _>("result")?.parse()?,
        payout: parse_decimal(&row.try_get::<String, _>("payout")?)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn map_settings(row: &SqliteRow) -> Result<PlatformSettings, LedgerError> {
    Ok(PlatformSettings {
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        min_bet: parse_decimal(&row.try_get::<String, _>("min_bet")?)?,
        max_bet: parse_decimal(&row.try_get::<String, _>("max_bet")?)?,
        payout_multiplier: parse_decimal(&row.try_get::<String, _>("payout_multiplier")?)?,
        maintenance_mode: row.try_get::<i64, _>("maintenance_mode")? != 0,
    })
}

fn map_deposit(row: &SqliteRow) -> Result<DepositRequest, LedgerError> {
    Ok(DepositRequest {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: parse_decimal(&row.try_get::<String, _>("amount")?)?,
        utr: row.try_get("utr")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        admin_note: row.try_get("admin_note")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        processed_at: parse_optional_timestamp(row.try_get("processed_at")?)?,
    })
}

fn map_withdrawal(row: &SqliteRow) -> Result<WithdrawRequest, LedgerError> {
    Ok(WithdrawRequest {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        holder_name: row.try_get("holder_name")?,
        account_number: row.try_get("account_number")?,
        ifsc: row.try_get("ifsc")?,
        amount: parse_decimal(&row.try_get::<String, _>("amount")?)?,
        status: row.try_get::<String, _>("status")?.parse()?,
        admin_note: row.try_get("admin_note")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        processed_at: parse_optional_timestamp(row.try_get("processed_at")?)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_account(id: &str, balance: Decimal) -> Account {
        Account {
            id: id.to_string(),
            name: format!("user-{id}"),
            mobile: None,
            balance,
            referral_code: format!("ref-{id}"),
            referred_by: None,
            is_admin: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = memory_store().await;
        // Re-applying the schema must not fail.
        store.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_account_roundtrip() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        insert_account(&mut tx, &sample_account("a1", dec!(25))).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = store.account("a1").await.unwrap().unwrap();
        assert_eq!(loaded.balance, dec!(25));
        assert_eq!(loaded.name, "user-a1");
        assert!(!loaded.is_admin);
        assert!(store.account("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credit_and_debit() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        insert_account(&mut tx, &sample_account("a1", dec!(100))).await.unwrap();

        assert!(credit_balance(&mut tx, "a1", dec!(50)).await.unwrap());
        let new_balance = debit_balance(&mut tx, "a1", dec!(30)).await.unwrap();
        assert_eq!(new_balance, dec!(120));
        tx.commit().await.unwrap();

        let account = store.account("a1").await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(120));
    }

    #[tokio::test]
    async fn test_debit_insufficient_fails_before_mutation() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        insert_account(&mut tx, &sample_account("a1", dec!(10))).await.unwrap();

        let err = debit_balance(&mut tx, "a1", dec!(11)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        // balance untouched
        let account = account_by_id(&mut tx, "a1").await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(10));
    }

    #[tokio::test]
    async fn test_credit_missing_account_reports_false() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        assert!(!credit_balance(&mut tx, "ghost", dec!(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_settings_created_lazily_with_defaults() {
        let store = memory_store().await;
        let settings = store.settings().await.unwrap();
        assert_eq!(settings, PlatformSettings::default());
        // second read returns the persisted row
        assert_eq!(store.settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_update_settings_partial() {
        let store = memory_store().await;
        let updated = store
            .update_settings(&SettingsUpdate {
                payout_multiplier: Some(dec!(9.5)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.payout_multiplier, dec!(9.5));
        assert_eq!(store.settings().await.unwrap().payout_multiplier, dec!(9.5));
    }

    #[tokio::test]
    async fn test_current_round_pointer() {
        let store = memory_store().await;
        assert!(store.current_round().await.unwrap().is_none());

        let round = Round {
            id: "r1".into(),
            status: RoundStatus::Open,
            winning_number: None,
            created_at: Utc::now(),
            closed_at: None,
        };
        let mut tx = store.begin().await.unwrap();
        insert_round(&mut tx, &round).await.unwrap();
        set_current_round(&mut tx, Some("r1")).await.unwrap();
        tx.commit().await.unwrap();

        let current = store.current_round().await.unwrap().unwrap();
        assert_eq!(current.id, "r1");
        assert!(current.is_open());

        let mut tx = store.begin().await.unwrap();
        set_current_round(&mut tx, None).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.current_round().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_only_one_open_round_allowed() {
        let store = memory_store().await;
        let open = |id: &str| Round {
            id: id.into(),
            status: RoundStatus::Open,
            winning_number: None,
            created_at: Utc::now(),
            closed_at: None,
        };
        let mut tx = store.begin().await.unwrap();
        insert_round(&mut tx, &open("r1")).await.unwrap();
        // unique partial index rejects a second open round
        assert!(insert_round(&mut tx, &open("r2")).await.is_err());
    }

    #[tokio::test]
    async fn test_bet_roundtrip_and_update() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        insert_account(&mut tx, &sample_account("a1", dec!(100))).await.unwrap();
        insert_round(
            &mut tx,
            &Round {
                id: "r1".into(),
                status: RoundStatus::Open,
                winning_number: None,
                created_at: Utc::now(),
                closed_at: None,
            },
        )
        .await
        .unwrap();
        let bet = Bet {
            id: "b1".into(),
            account_id: "a1".into(),
            round_id: "r1".into(),
            number: 4,
            amount: dec!(100),
            result: BetResult::Pending,
            payout: Decimal::ZERO,
            created_at: Utc::now(),
        };
        insert_bet(&mut tx, &bet).await.unwrap();
        update_bet_result(&mut tx, "b1", BetResult::Win, dec!(1000)).await.unwrap();
        tx.commit().await.unwrap();

        let bets = store.bets_for_round("r1").await.unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].result, BetResult::Win);
        assert_eq!(bets[0].payout, dec!(1000));
    }

    #[tokio::test]
    async fn test_deposit_utr_uniqueness() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        insert_account(&mut tx, &sample_account("a1", dec!(0))).await.unwrap();
        let request = DepositRequest {
            id: "d1".into(),
            account_id: "a1".into(),
            amount: dec!(500),
            utr: "UTR123456".into(),
            status: RequestStatus::Pending,
            admin_note: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        insert_deposit(&mut tx, &request).await.unwrap();
        assert!(deposit_utr_exists(&mut tx, "a1", "UTR123456").await.unwrap());
        assert!(!deposit_utr_exists(&mut tx, "a1", "UTR999999").await.unwrap());
    }

    #[tokio::test]
    async fn test_platform_stats_empty() {
        let store = memory_store().await;
        let stats = store.platform_stats().await.unwrap();
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.total_bets, 0);
        assert_eq!(stats.total_revenue, Decimal::ZERO);
        assert_eq!(stats.profit_margin, Decimal::ZERO);
    }
}
