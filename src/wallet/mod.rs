//! Wallet operations around the account ledger.
//!
//! Registration (starting bonus + referral credit) and the manual
//! deposit/withdraw request flows. These are plain credit/debit calls
//! into the account abstraction: deposits credit on admin approval,
//! withdrawals debit at submit time and refund on rejection.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::engine::with_conflict_retry;
use crate::store::{self, Store};
use crate::types::{Account, DepositRequest, LedgerError, RequestStatus, WithdrawRequest};

/// Minimum deposit amount (₹1) and UTR reference length accepted from
/// the payment form.
const MIN_DEPOSIT: Decimal = Decimal::ONE;
const MIN_UTR_LEN: usize = 6;

pub struct WalletService {
    store: Store,
    game: GameConfig,
}

impl WalletService {
    pub fn new(store: Store, game: GameConfig) -> Self {
        Self { store, game }
    }

    // -- registration -----------------------------------------------------

    /// Create an account with the starting bonus. A valid referral code
    /// credits the referrer; an unknown code is ignored.
    pub async fn register(
        &self,
        name: &str,
        mobile: Option<&str>,
        referral: Option<&str>,
    ) -> Result<Account, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("Name is required".into()));
        }

        let mut tx = self.store.begin().await?;

        let mut referred_by = None;
        if let Some(code) = referral {
            if let Some(referrer) = store::account_by_referral(&mut tx, code).await? {
                store::credit_balance(&mut tx, &referrer.id, self.game.referral_bonus).await?;
                referred_by = Some(referrer.id);
            }
        }

        let account = Account {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            mobile: mobile.map(str::to_string),
            balance: self.game.starting_bonus,
            referral_code: generate_referral_code(),
            referred_by,
            is_admin: false,
            created_at: Utc::now(),
        };

        match store::insert_account(&mut tx, &account).await {
            Err(LedgerError::Storage(sqlx::Error::Database(db)))
                if db.message().contains("accounts.mobile") =>
            {
                return Err(LedgerError::Validation(
                    "An account with this mobile number already exists".into(),
                ));
            }
            other => other?,
        }

        tx.commit().await?;

        info!(
            account_id = %account.id,
            bonus = %self.game.starting_bonus,
            referred = account.referred_by.is_some(),
            "Account registered"
        );
        Ok(account)
    }

    // -- deposits ---------------------------------------------------------

    /// Record a UPI deposit claim for admin verification. No balance
    /// change until approval.
    pub async fn submit_deposit(
        &self,
        account_id: &str,
        amount: Decimal,
        utr: &str,
    ) -> Result<DepositRequest, LedgerError> {
        if amount < MIN_DEPOSIT {
            return Err(LedgerError::Validation("Invalid amount".into()));
        }
        let utr = utr.trim();
        if utr.len() < MIN_UTR_LEN {
            return Err(LedgerError::Validation("Invalid UTR/Transaction ID".into()));
        }

        let mut tx = self.store.begin().await?;
        if store::account_by_id(&mut tx, account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }
        if store::deposit_utr_exists(&mut tx, account_id, utr).await? {
            return Err(LedgerError::Validation(
                "This UTR has already been submitted".into(),
            ));
        }

        let request = DepositRequest {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            amount,
            utr: utr.to_string(),
            status: RequestStatus::Pending,
            admin_note: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        store::insert_deposit(&mut tx, &request).await?;
        tx.commit().await?;

        info!(request_id = %request.id, account_id, amount = %amount, "Deposit request submitted");
        Ok(request)
    }

    /// Approve a pending deposit, crediting the account.
    pub async fn approve_deposit(&self, request_id: &str) -> Result<DepositRequest, LedgerError> {
        with_conflict_retry("approve_deposit", || self.try_approve_deposit(request_id)).await
    }

    async fn try_approve_deposit(&self, request_id: &str) -> Result<DepositRequest, LedgerError> {
        let mut tx = self.store.begin().await?;
        let request = store::deposit_by_id(&mut tx, request_id)
            .await?
            .ok_or(LedgerError::NotFound("Deposit request"))?;
        if request.status != RequestStatus::Pending {
            return Err(LedgerError::Validation("Request already processed".into()));
        }
        if !store::credit_balance(&mut tx, &request.account_id, request.amount).await? {
            return Err(LedgerError::AccountNotFound(request.account_id));
        }
        let now = Utc::now();
        store::set_deposit_status(&mut tx, request_id, RequestStatus::Approved, None, now).await?;
        tx.commit().await?;

        info!(
            request_id,
            account_id = %request.account_id,
            amount = %request.amount,
            "Deposit approved and credited"
        );
        Ok(DepositRequest {
            status: RequestStatus::Approved,
            processed_at: Some(now),
            ..request
        })
    }

    /// Reject a pending deposit. No balance change.
    pub async fn reject_deposit(
        &self,
        request_id: &str,
        admin_note: Option<&str>,
    ) -> Result<DepositRequest, LedgerError> {
        let mut tx = self.store.begin().await?;
        let request = store::deposit_by_id(&mut tx, request_id)
            .await?
            .ok_or(LedgerError::NotFound("Deposit request"))?;
        if request.status != RequestStatus::Pending {
            return Err(LedgerError::Validation("Request already processed".into()));
        }
        let now = Utc::now();
        store::set_deposit_status(&mut tx, request_id, RequestStatus::Rejected, admin_note, now)
            .await?;
        tx.commit().await?;

        info!(request_id, "Deposit request rejected");
        Ok(DepositRequest {
            status: RequestStatus::Rejected,
            admin_note: admin_note.map(str::to_string),
            processed_at: Some(now),
            ..request
        })
    }

    // -- withdrawals ------------------------------------------------------

    /// Submit a withdrawal. The amount is debited immediately; rejection
    /// refunds it.
    pub async fn submit_withdrawal(
        &self,
        account_id: &str,
        holder_name: &str,
        account_number: &str,
        re_account_number: &str,
        ifsc: &str,
        amount: Decimal,
    ) -> Result<WithdrawRequest, LedgerError> {
        if holder_name.trim().is_empty() || account_number.trim().is_empty() || ifsc.trim().is_empty()
        {
            return Err(LedgerError::Validation("All fields are required".into()));
        }
        if account_number != re_account_number {
            return Err(LedgerError::Validation("Account numbers do not match".into()));
        }
        if amount < self.game.min_withdrawal {
            return Err(LedgerError::Validation(format!(
                "Minimum withdrawal amount is ₹{}",
                self.game.min_withdrawal,
            )));
        }

        with_conflict_retry("submit_withdrawal", || {
            self.try_submit_withdrawal(account_id, holder_name, account_number, ifsc, amount)
        })
        .await
    }

    async fn try_submit_withdrawal(
        &self,
        account_id: &str,
        holder_name: &str,
        account_number: &str,
        ifsc: &str,
        amount: Decimal,
    ) -> Result<WithdrawRequest, LedgerError> {
        let mut tx = self.store.begin().await?;
        store::debit_balance(&mut tx, account_id, amount).await?;

        let request = WithdrawRequest {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            holder_name: holder_name.to_string(),
            account_number: account_number.to_string(),
            ifsc: ifsc.to_string(),
            amount,
            status: RequestStatus::Pending,
            admin_note: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        store::insert_withdrawal(&mut tx, &request).await?;
        tx.commit().await?;

        info!(request_id = %request.id, account_id, amount = %amount, "Withdrawal submitted");
        Ok(request)
    }

    /// Approve a pending withdrawal. The money was debited at submit.
    pub async fn approve_withdrawal(
        &self,
        request_id: &str,
    ) -> Result<WithdrawRequest, LedgerError> {
        let mut tx = self.store.begin().await?;
        let request = store::withdrawal_by_id(&mut tx, request_id)
            .await?
            .ok_or(LedgerError::NotFound("Withdraw request"))?;
        if request.status != RequestStatus::Pending {
            return Err(LedgerError::Validation("Request already processed".into()));
        }
        let now = Utc::now();
        store::set_withdrawal_status(&mut tx, request_id, RequestStatus::Approved, None, now)
            .await?;
        tx.commit().await?;

        info!(request_id, amount = %request.amount, "Withdrawal approved");
        Ok(WithdrawRequest {
            status: RequestStatus::Approved,
            processed_at: Some(now),
            ..request
        })
    }

    /// Reject a pending withdrawal and refund the held amount.
    pub async fn reject_withdrawal(
        &self,
        request_id: &str,
        admin_note: Option<&str>,
    ) -> Result<WithdrawRequest, LedgerError> {
        with_conflict_retry("reject_withdrawal", || {
            self.try_reject_withdrawal(request_id, admin_note)
        })
        .await
    }

    async fn try_reject_withdrawal(
        &self,
        request_id: &str,
        admin_note: Option<&str>,
    ) -> Result<WithdrawRequest, LedgerError> {
        let mut tx = self.store.begin().await?;
        let request = store::withdrawal_by_id(&mut tx, request_id)
            .await?
            .ok_or(LedgerError::NotFound("Withdraw request"))?;
        if request.status != RequestStatus::Pending {
            return Err(LedgerError::Validation("Request already processed".into()));
        }
        if !store::credit_balance(&mut tx, &request.account_id, request.amount).await? {
            return Err(LedgerError::AccountNotFound(request.account_id));
        }
        let now = Utc::now();
        store::set_withdrawal_status(&mut tx, request_id, RequestStatus::Rejected, admin_note, now)
            .await?;
        tx.commit().await?;

        info!(request_id, amount = %request.amount, "Withdrawal rejected and refunded");
        Ok(WithdrawRequest {
            status: RequestStatus::Rejected,
            admin_note: admin_note.map(str::to_string),
            processed_at: Some(now),
            ..request
        })
    }
}

fn generate_referral_code() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(8);
    code
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn service() -> (Store, WalletService) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let wallet = WalletService::new(store.clone(), GameConfig::default());
        (store, wallet)
    }

    #[tokio::test]
    async fn test_register_grants_starting_bonus() {
        let (store, wallet) = service().await;
        let account = wallet.register("Asha", Some("9876543210"), None).await.unwrap();

        assert_eq!(account.balance, dec!(25));
        assert_eq!(account.referral_code.len(), 8);
        assert!(account.referred_by.is_none());
        assert!(!account.is_admin);

        let loaded = store.account(&account.id).await.unwrap().unwrap();
        assert_eq!(loaded.balance, dec!(25));
    }

    #[tokio::test]
    async fn test_register_with_referral_credits_referrer() {
        let (store, wallet) = service().await;
        let referrer = wallet.register("Referrer", None, None).await.unwrap();
        let referred = wallet
            .register("Friend", None, Some(&referrer.referral_code))
            .await
            .unwrap();

        assert_eq!(referred.referred_by.as_deref(), Some(referrer.id.as_str()));
        // 25 starting + 25 referral credit
        assert_eq!(store.account(&referrer.id).await.unwrap().unwrap().balance, dec!(50));
    }

    #[tokio::test]
    async fn test_register_unknown_referral_ignored() {
        let (_store, wallet) = service().await;
        let account = wallet.register("Solo", None, Some("nope1234")).await.unwrap();
        assert!(account.referred_by.is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_mobile_rejected() {
        let (_store, wallet) = service().await;
        wallet.register("First", Some("9000000001"), None).await.unwrap();
        let err = wallet
            .register("Second", Some("9000000001"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_blank_name_rejected() {
        let (_store, wallet) = service().await;
        assert!(matches!(
            wallet.register("  ", None, None).await.unwrap_err(),
            LedgerError::Validation(_),
        ));
    }

    #[tokio::test]
    async fn test_deposit_credits_only_on_approval() {
        let (store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();

        let request = wallet
            .submit_deposit(&account.id, dec!(500), "UTR123456")
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        // no credit yet
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(25));

        let approved = wallet.approve_deposit(&request.id).await.unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert!(approved.processed_at.is_some());
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(525));
    }

    #[tokio::test]
    async fn test_deposit_approve_twice_rejected() {
        let (store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();
        let request = wallet
            .submit_deposit(&account.id, dec!(100), "UTR777777")
            .await
            .unwrap();

        wallet.approve_deposit(&request.id).await.unwrap();
        let err = wallet.approve_deposit(&request.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        // credited exactly once
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(125));
    }

    #[tokio::test]
    async fn test_deposit_duplicate_utr_rejected() {
        let (_store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();
        wallet.submit_deposit(&account.id, dec!(100), "UTR555555").await.unwrap();
        let err = wallet
            .submit_deposit(&account.id, dec!(200), "UTR555555")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_deposit_reject_leaves_balance() {
        let (store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();
        let request = wallet
            .submit_deposit(&account.id, dec!(100), "UTR888888")
            .await
            .unwrap();

        let rejected = wallet
            .reject_deposit(&request.id, Some("unverifiable"))
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.admin_note.as_deref(), Some("unverifiable"));
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(25));
    }

    #[tokio::test]
    async fn test_withdrawal_debits_at_submit() {
        let (store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();
        wallet
            .submit_deposit(&account.id, dec!(500), "UTR222222")
            .await
            .unwrap();
        let deposits = store.deposits_for_account(&account.id, 10).await.unwrap();
        wallet.approve_deposit(&deposits[0].id).await.unwrap();

        let request = wallet
            .submit_withdrawal(&account.id, "Asha K", "1234567890", "1234567890", "HDFC0001", dec!(200))
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(325));
    }

    #[tokio::test]
    async fn test_withdrawal_insufficient_balance_rejected() {
        let (store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();

        let err = wallet
            .submit_withdrawal(&account.id, "Asha K", "1234567890", "1234567890", "HDFC0001", dec!(100))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(25));
        assert!(store.withdrawals_for_account(&account.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_withdrawal_below_minimum_rejected() {
        let (_store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();
        let err = wallet
            .submit_withdrawal(&account.id, "Asha K", "1234567890", "1234567890", "HDFC0001", dec!(50))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_withdrawal_account_number_mismatch_rejected() {
        let (_store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();
        let err = wallet
            .submit_withdrawal(&account.id, "Asha K", "1234567890", "0987654321", "HDFC0001", dec!(200))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_withdrawal_reject_refunds() {
        let (store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();
        let deposit = wallet
            .submit_deposit(&account.id, dec!(500), "UTR333333")
            .await
            .unwrap();
        wallet.approve_deposit(&deposit.id).await.unwrap();

        let request = wallet
            .submit_withdrawal(&account.id, "Asha K", "1234567890", "1234567890", "HDFC0001", dec!(300))
            .await
            .unwrap();
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(225));

        let rejected = wallet.reject_withdrawal(&request.id, Some("bad IFSC")).await.unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(525));

        // terminal: rejecting again fails, no second refund
        let err = wallet.reject_withdrawal(&request.id, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(525));
    }

    #[tokio::test]
    async fn test_withdrawal_approve_is_terminal() {
        let (store, wallet) = service().await;
        let account = wallet.register("Asha", None, None).await.unwrap();
        let deposit = wallet
            .submit_deposit(&account.id, dec!(500), "UTR444444")
            .await
            .unwrap();
        wallet.approve_deposit(&deposit.id).await.unwrap();
        let request = wallet
            .submit_withdrawal(&account.id, "Asha K", "1234567890", "1234567890", "HDFC0001", dec!(100))
            .await
            .unwrap();

        let approved = wallet.approve_withdrawal(&request.id).await.unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        // approval moves no money; rejection afterwards is refused
        assert_eq!(store.account(&account.id).await.unwrap().unwrap().balance, dec!(425));
        assert!(wallet.reject_withdrawal(&request.id, None).await.is_err());
    }
}
