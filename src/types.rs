//! Shared types for the SattaWala ledger.
//!
//! These types form the data model used across all modules: accounts,
//! rounds, bets, platform settings, and the wallet request records.
//! They are designed to be stable so that store, engine, and API modules
//! can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A user's wallet. Balance must never go negative as a result of a
/// ledger operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub mobile: Option<String>,
    pub balance: Decimal,
    /// Short code other users can register with to credit this account.
    pub referral_code: String,
    /// Account id of the referrer, if registered via a referral code.
    pub referred_by: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) balance=₹{}", self.name, self.id, self.balance)
    }
}

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

/// Round state machine. A round transitions `open → closed` exactly once
/// and is never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Open,
    Closed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Open => "open",
            RoundStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoundStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RoundStatus::Open),
            "closed" => Ok(RoundStatus::Closed),
            other => Err(LedgerError::Corrupt(format!("unknown round status: {other}"))),
        }
    }
}

/// One betting period with a single winning number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: String,
    pub status: RoundStatus,
    /// Unset while the round is open; set exactly once at close time.
    /// Remains unset on rounds closed without settlement (voided).
    pub winning_number: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn is_open(&self) -> bool {
        self.status == RoundStatus::Open
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.winning_number {
            Some(n) => write!(f, "round {} [{}] winner={n}", self.id, self.status),
            None => write!(f, "round {} [{}]", self.id, self.status),
        }
    }
}

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// Bet outcome state machine. Starts `pending`, set exactly once, never
/// reverted. `voided` marks bets refunded when a round was force-closed
/// without settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    Pending,
    Win,
    Lose,
    Voided,
}

impl BetResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetResult::Pending => "pending",
            BetResult::Win => "win",
            BetResult::Lose => "lose",
            BetResult::Voided => "voided",
        }
    }

    /// Whether this is a terminal state.
    pub fn is_settled(&self) -> bool {
        !matches!(self, BetResult::Pending)
    }
}

impl fmt::Display for BetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BetResult {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BetResult::Pending),
            "win" => Ok(BetResult::Win),
            "lose" => Ok(BetResult::Lose),
            "voided" => Ok(BetResult::Voided),
            other => Err(LedgerError::Corrupt(format!("unknown bet result: {other}"))),
        }
    }
}

/// A single wager by one account against one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub account_id: String,
    pub round_id: String,
    pub number: i64,
    pub amount: Decimal,
    pub result: BetResult,
    /// 0 unless the bet won, in which case `amount × payout_multiplier`.
    pub payout: Decimal,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bet {} ₹{} on {} [{}] payout=₹{}",
            self.id, self.amount, self.number, self.result, self.payout,
        )
    }
}

// ---------------------------------------------------------------------------
// Platform settings
// ---------------------------------------------------------------------------

/// Singleton platform configuration record. Read by placement (bounds)
/// and settlement (multiplier); mutated only by admin action. Created
/// lazily with defaults on first read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub is_active: bool,
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    pub payout_multiplier: Decimal,
    pub maintenance_mode: bool,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            is_active: true,
            min_bet: Decimal::from(10),
            max_bet: Decimal::from(10_000),
            payout_multiplier: Decimal::from(10),
            maintenance_mode: false,
        }
    }
}

/// Partial settings update. Recognized keys only; absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub is_active: Option<bool>,
    pub min_bet: Option<Decimal>,
    pub max_bet: Option<Decimal>,
    pub payout_multiplier: Option<Decimal>,
    pub maintenance_mode: Option<bool>,
}

impl PlatformSettings {
    /// Apply a partial update, validating the resulting record.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<PlatformSettings, LedgerError> {
        let next = PlatformSettings {
            is_active: update.is_active.unwrap_or(self.is_active),
            min_bet: update.min_bet.unwrap_or(self.min_bet),
            max_bet: update.max_bet.unwrap_or(self.max_bet),
            payout_multiplier: update.payout_multiplier.unwrap_or(self.payout_multiplier),
            maintenance_mode: update.maintenance_mode.unwrap_or(self.maintenance_mode),
        };
        if next.min_bet <= Decimal::ZERO {
            return Err(LedgerError::Validation("min_bet must be positive".into()));
        }
        if next.min_bet > next.max_bet {
            return Err(LedgerError::Validation("min_bet cannot exceed max_bet".into()));
        }
        if next.payout_multiplier <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "payout_multiplier must be positive".into(),
            ));
        }
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Wallet request records
// ---------------------------------------------------------------------------

/// Deposit/withdraw request state machine. Terminal states are reached
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(LedgerError::Corrupt(format!("unknown request status: {other}"))),
        }
    }
}

/// A manually-verified UPI deposit: the user transfers money out of band
/// and submits the transaction reference for admin approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub id: String,
    pub account_id: String,
    pub amount: Decimal,
    /// Bank UTR / transaction reference the user claims to have paid with.
    pub utr: String,
    pub status: RequestStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A withdrawal to a bank account. The amount is debited when the
/// request is submitted and refunded if it is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub id: String,
    pub account_id: String,
    pub holder_name: String,
    pub account_number: String,
    pub ifsc: String,
    pub amount: Decimal,
    pub status: RequestStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Settlement report
// ---------------------------------------------------------------------------

/// A winner whose balance could not be credited during settlement.
/// Represents unresolved money; always logged at error level.
#[derive(Debug, Clone, Serialize)]
pub struct FailedCredit {
    pub bet_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub reason: String,
}

/// Aggregate outcome of settling one round.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub round_id: String,
    pub winning_number: i64,
    pub bets_settled: usize,
    pub winners: usize,
    /// Σ amount over all bets in the round.
    pub total_bets: Decimal,
    /// Σ payout over winning bets.
    pub total_payout: Decimal,
    /// total_bets − total_payout. Negative when the house lost.
    pub profit: Decimal,
    pub failed_credits: Vec<FailedCredit>,
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {} winner={} bets={} winners={} in=₹{} out=₹{} profit=₹{}",
            self.round_id,
            self.winning_number,
            self.bets_settled,
            self.winners,
            self.total_bets,
            self.total_payout,
            self.profit,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("Insufficient balance: need ₹{needed}, have ₹{available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("No open round found")]
    NoOpenRound,

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Platform is currently inactive")]
    PlatformInactive,

    #[error("Platform is under maintenance")]
    Maintenance,

    #[error("Conflicting concurrent operation: {0}")]
    Conflict(String),

    #[error("Corrupt ledger record: {0}")]
    Corrupt(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl LedgerError {
    /// Whether the underlying storage error is a transient write conflict
    /// (SQLite busy/locked) worth one retry.
    pub fn is_transient_conflict(&self) -> bool {
        match self {
            LedgerError::Storage(sqlx::Error::Database(db)) => {
                let msg = db.message().to_ascii_lowercase();
                msg.contains("locked") || msg.contains("busy")
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
