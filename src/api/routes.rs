//! API route handlers.
//!
//! Thin JSON adapters over the engines. Identity arrives as
//! `x-user-id` / `x-user-role` headers set by the upstream auth gateway;
//! token issuance and verification live outside this service.

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::store::{PlatformStats, RoundSummary};
use crate::types::{
    Account, Bet, DepositRequest, LedgerError, PlatformSettings, RequestStatus, Round,
    SettingsUpdate, SettlementReport, WithdrawRequest,
};

use super::SharedState;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The authenticated caller, as forwarded by the auth gateway.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub account_id: String,
    pub is_admin: bool,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ApiError::Unauthorized)?;
        let is_admin = parts
            .headers
            .get("x-user-role")
            .and_then(|v| v.to_str().ok())
            .map(|role| role.eq_ignore_ascii_case("admin"))
            .unwrap_or(false);
        Ok(AuthedUser { account_id, is_admin })
    }
}

/// An authenticated caller with the admin flag set.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthedUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthedUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    Ledger(LedgerError),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Admin only".to_string()),
            ApiError::Ledger(e) => match &e {
                LedgerError::Validation(_)
                | LedgerError::InsufficientBalance { .. }
                | LedgerError::NoOpenRound => (StatusCode::BAD_REQUEST, e.to_string()),
                LedgerError::AccountNotFound(_) | LedgerError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, e.to_string())
                }
                LedgerError::PlatformInactive | LedgerError::Maintenance => {
                    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
                }
                LedgerError::Conflict(_) => (StatusCode::CONFLICT, e.to_string()),
                LedgerError::Corrupt(_) | LedgerError::Storage(_) => {
                    error!(error = %e, "Internal error serving request");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub mobile: Option<String>,
    /// Referral code of an existing account.
    #[serde(rename = "ref")]
    pub referral: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub account: Account,
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub number: i64,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PlaceBetResponse {
    pub message: String,
    pub bet: Bet,
    pub new_balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AnnounceRequest {
    pub winning_number: i64,
}

#[derive(Debug, Serialize)]
pub struct AnnounceResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: SettlementReport,
}

#[derive(Debug, Serialize)]
pub struct OpenRoundResponse {
    pub message: String,
    pub round: Round,
    pub voided_bets: usize,
    pub refunded: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CurrentRoundResponse {
    pub round: Option<Round>,
}

#[derive(Debug, Serialize)]
pub struct BetsResponse {
    pub bets: Vec<Bet>,
}

#[derive(Debug, Serialize)]
pub struct BetStatsResponse {
    pub bets: Vec<Bet>,
    pub total_bets: usize,
    pub total_amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct RoundsResponse {
    pub rounds: Vec<RoundSummary>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<Account>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account: Account,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub message: String,
    pub settings: PlatformSettings,
}

#[derive(Debug, Deserialize)]
pub struct DepositSubmitRequest {
    pub amount: Decimal,
    pub utr: String,
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub request: DepositRequest,
}

#[derive(Debug, Serialize)]
pub struct DepositsResponse {
    pub requests: Vec<DepositRequest>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawSubmitRequest {
    pub name: String,
    pub account_number: String,
    pub re_account_number: String,
    pub ifsc: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub request: WithdrawRequest,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalsResponse {
    pub requests: Vec<WithdrawRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub admin_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Public handlers
// ---------------------------------------------------------------------------

/// GET /
pub async fn root() -> &'static str {
    "SattaWala API is running!"
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<SharedState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .wallet
        .register(&body.name, body.mobile.as_deref(), body.referral.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".into(),
            account,
        }),
    ))
}

// ---------------------------------------------------------------------------
// User handlers
// ---------------------------------------------------------------------------

/// GET /api/auth/me
pub async fn me(
    State(state): State<SharedState>,
    user: AuthedUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .account(&user.account_id)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(user.account_id.clone()))?;
    Ok(Json(AccountResponse { account }))
}

/// POST /api/bet/place
pub async fn place_bet(
    State(state): State<SharedState>,
    user: AuthedUser,
    Json(body): Json<PlaceBetRequest>,
) -> Result<Json<PlaceBetResponse>, ApiError> {
    let placed = state
        .placement
        .place_bet(&user.account_id, body.number, body.amount)
        .await?;
    Ok(Json(PlaceBetResponse {
        message: "Bet placed successfully".into(),
        bet: placed.bet,
        new_balance: placed.new_balance,
    }))
}

/// GET /api/bet/current-round
pub async fn current_round(
    State(state): State<SharedState>,
    _user: AuthedUser,
) -> Result<Json<CurrentRoundResponse>, ApiError> {
    let round = state.store.current_round().await?;
    Ok(Json(CurrentRoundResponse { round }))
}

/// GET /api/bet/history
pub async fn bet_history(
    State(state): State<SharedState>,
    user: AuthedUser,
) -> Result<Json<BetsResponse>, ApiError> {
    let bets = state.store.bets_for_account(&user.account_id, 50).await?;
    Ok(Json(BetsResponse { bets }))
}

/// POST /api/payment/deposit
pub async fn submit_deposit(
    State(state): State<SharedState>,
    user: AuthedUser,
    Json(body): Json<DepositSubmitRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    let request = state
        .wallet
        .submit_deposit(&user.account_id, body.amount, &body.utr)
        .await?;
    Ok(Json(DepositResponse { request }))
}

/// GET /api/payment/deposits
pub async fn my_deposits(
    State(state): State<SharedState>,
    user: AuthedUser,
) -> Result<Json<DepositsResponse>, ApiError> {
    let requests = state.store.deposits_for_account(&user.account_id, 50).await?;
    Ok(Json(DepositsResponse { requests }))
}

/// POST /api/payment/withdraw
pub async fn submit_withdrawal(
    State(state): State<SharedState>,
    user: AuthedUser,
    Json(body): Json<WithdrawSubmitRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let request = state
        .wallet
        .submit_withdrawal(
            &user.account_id,
            &body.name,
            &body.account_number,
            &body.re_account_number,
            &body.ifsc,
            body.amount,
        )
        .await?;
    Ok(Json(WithdrawResponse { request }))
}

/// GET /api/payment/withdrawals
pub async fn my_withdrawals(
    State(state): State<SharedState>,
    user: AuthedUser,
) -> Result<Json<WithdrawalsResponse>, ApiError> {
    let requests = state
        .store
        .withdrawals_for_account(&user.account_id, 50)
        .await?;
    Ok(Json(WithdrawalsResponse { requests }))
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

/// GET /api/admin/bets
pub async fn current_round_bets(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<Json<BetsResponse>, ApiError> {
    let bets = match state.store.current_round().await? {
        Some(round) => state.store.bets_for_round(&round.id).await?,
        None => Vec::new(),
    };
    Ok(Json(BetsResponse { bets }))
}

/// GET /api/admin/current-round-bet-stats
pub async fn current_round_bet_stats(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<Json<BetStatsResponse>, ApiError> {
    let bets = match state.store.current_round().await? {
        Some(round) => state.store.bets_for_round(&round.id).await?,
        None => Vec::new(),
    };
    let total_amount = bets.iter().map(|b| b.amount).sum();
    Ok(Json(BetStatsResponse {
        total_bets: bets.len(),
        total_amount,
        bets,
    }))
}

/// POST /api/admin/announce
pub async fn announce_result(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Json(body): Json<AnnounceRequest>,
) -> Result<Json<AnnounceResponse>, ApiError> {
    let report = state.settlement.announce_result(body.winning_number).await?;
    Ok(Json(AnnounceResponse {
        message: "Result announced successfully".into(),
        report,
    }))
}

/// POST /api/admin/rounds
pub async fn open_round(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<Json<OpenRoundResponse>, ApiError> {
    let opened = state.lifecycle.open_new_round().await?;
    Ok(Json(OpenRoundResponse {
        message: "New round created successfully".into(),
        round: opened.round,
        voided_bets: opened.voided_bets,
        refunded: opened.refunded,
    }))
}

/// GET /api/admin/rounds
pub async fn list_rounds(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<Json<RoundsResponse>, ApiError> {
    let rounds = state.store.round_summaries(50).await?;
    Ok(Json(RoundsResponse { rounds }))
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<Json<UsersResponse>, ApiError> {
    let users = state.store.list_accounts().await?;
    Ok(Json(UsersResponse { users }))
}

/// GET /api/admin/stats
pub async fn platform_stats(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<Json<PlatformStats>, ApiError> {
    Ok(Json(state.store.platform_stats().await?))
}

/// PUT /api/admin/settings
pub async fn update_settings(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Json(body): Json<SettingsUpdate>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state.store.update_settings(&body).await?;
    Ok(Json(SettingsResponse {
        message: "Settings updated successfully".into(),
        settings,
    }))
}

/// GET /api/admin/deposits
pub async fn list_deposits(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<DepositsResponse>, ApiError> {
    let status = match filter.status.as_deref() {
        Some(s) => Some(s.parse::<RequestStatus>().map_err(|_| {
            LedgerError::Validation("Unknown status filter".into())
        })?),
        None => None,
    };
    let requests = state.store.list_deposits(status).await?;
    Ok(Json(DepositsResponse { requests }))
}

/// POST /api/admin/deposits/:id/approve
pub async fn approve_deposit(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<DepositResponse>, ApiError> {
    let request = state.wallet.approve_deposit(&id).await?;
    Ok(Json(DepositResponse { request }))
}

/// POST /api/admin/deposits/:id/reject
pub async fn reject_deposit(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    body: Option<Json<RejectBody>>,
) -> Result<Json<DepositResponse>, ApiError> {
    let note = body.and_then(|Json(b)| b.admin_note);
    let request = state.wallet.reject_deposit(&id, note.as_deref()).await?;
    Ok(Json(DepositResponse { request }))
}

/// GET /api/admin/withdrawals
pub async fn list_withdrawals(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<Json<WithdrawalsResponse>, ApiError> {
    let requests = state.store.list_withdrawals().await?;
    Ok(Json(WithdrawalsResponse { requests }))
}

/// POST /api/admin/withdrawals/:id/approve
pub async fn approve_withdrawal(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let request = state.wallet.approve_withdrawal(&id).await?;
    Ok(Json(WithdrawResponse { request }))
}

/// POST /api/admin/withdrawals/:id/reject
pub async fn reject_withdrawal(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    body: Option<Json<RejectBody>>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let note = body.and_then(|Json(b)| b.admin_note);
    let request = state.wallet.reject_withdrawal(&id, note.as_deref()).await?;
    Ok(Json(WithdrawResponse { request }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
