//! The credit ledger and balance reservations (`spec.md` §4.4).
//!
//! All balance mutations go through [`Ledger::adjust_balance`], an atomic
//! `UPDATE ... WHERE balance + delta >= 0 RETURNING ...` (no read-then-write),
//! per the invariant that a decrement never produces a negative balance.
//! Winston amounts are stored as `TEXT` (`gateway_types::money::Winston`'s
//! wire form) but the comparison happens in SQL by casting to `numeric`, so
//! the check-and-decrement stays a single round trip.

use gateway_types::ans104::SignatureType;
use gateway_types::money::Winston;
use gateway_types::user::{BalanceReservation, ChangeReason, User, UserAddressType};
use sqlx::PgPool;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("no reservation exists for data item {0}")]
    NoReservation(String),
}

#[derive(Debug, Clone)]
pub struct CheckBalanceResult {
    pub sufficient: bool,
    pub bytes_cost_in_winc: Winston,
    pub user_balance_in_winc: Winston,
}

#[derive(Debug, Clone)]
pub struct ReserveResult {
    pub is_reserved: bool,
    pub cost_of_data_item: Winston,
    pub wallet_exists: bool,
}

#[derive(Clone)]
pub struct Ledger {
    pool: PgPool,
}

impl Ledger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `bytesCostInWinc = gatewayQuotedPrice(byteCount + perSigTypeOverhead)`
    /// with a zero cost for size <= `freeUploadLimitBytes` and allow-listed
    /// addresses bypassing the check entirely (`spec.md` §4.4).
    fn price_for(byte_count: u64, sig_type: SignatureType, free_upload_limit_bytes: u64) -> Winston {
        if byte_count <= free_upload_limit_bytes {
            return Winston::ZERO;
        }
        gateway_pricing::gateway_quoted_price(byte_count, sig_type)
    }

    async fn get_or_create_user(
        &self,
        user_address: &str,
        user_address_type: UserAddressType,
    ) -> Result<User, LedgerError> {
        if let Some(user) = self.get_user(user_address).await? {
            return Ok(user);
        }
        let address_type_str = serde_json::to_value(user_address_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "arweave".to_string());
        sqlx::query(
            "INSERT INTO users (user_address, user_address_type, winston_credit_balance, promotional_info)
             VALUES ($1, $2, '0', '{}') ON CONFLICT (user_address) DO NOTHING",
        )
        .bind(user_address)
        .bind(&address_type_str)
        .execute(&self.pool)
        .await?;
        Ok(self
            .get_user(user_address)
            .await?
            .expect("row was just inserted or already existed"))
    }

    pub async fn get_user(&self, user_address: &str) -> Result<Option<User>, LedgerError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_address = $1")
            .bind(user_address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn check_balance_for_data(
        &self,
        user_address: &str,
        user_address_type: UserAddressType,
        byte_count: u64,
        sig_type: SignatureType,
        allow_listed: bool,
        free_upload_limit_bytes: u64,
    ) -> Result<CheckBalanceResult, LedgerError> {
        let cost = Self::price_for(byte_count, sig_type, free_upload_limit_bytes);
        if allow_listed || cost == Winston::ZERO {
            return Ok(CheckBalanceResult {
                sufficient: true,
                bytes_cost_in_winc: Winston::ZERO,
                user_balance_in_winc: Winston::ZERO,
            });
        }
        let user = self.get_or_create_user(user_address, user_address_type).await?;
        Ok(CheckBalanceResult {
            sufficient: user.winston_credit_balance >= cost,
            bytes_cost_in_winc: cost,
            user_balance_in_winc: user.winston_credit_balance,
        })
    }

    /// Reservation creation is atomic with the balance decrement
    /// (`spec.md` §4.4): a single transaction does the conditional decrement
    /// and the reservation insert, or neither.
    #[instrument(skip(self))]
    pub async fn reserve_balance_for_data(
        &self,
        data_item_id: &str,
        user_address: &str,
        user_address_type: UserAddressType,
        byte_count: u64,
        sig_type: SignatureType,
        allow_listed: bool,
        free_upload_limit_bytes: u64,
    ) -> Result<ReserveResult, LedgerError> {
        let cost = Self::price_for(byte_count, sig_type, free_upload_limit_bytes);
        if allow_listed || cost == Winston::ZERO {
            return Ok(ReserveResult {
                is_reserved: false,
                cost_of_data_item: Winston::ZERO,
                wallet_exists: self.get_user(user_address).await?.is_some(),
            });
        }

        self.get_or_create_user(user_address, user_address_type).await?;

        let mut tx = self.pool.begin().await?;
        let delta = format!("-{cost}");
        let row = sqlx::query(
            "UPDATE users
             SET winston_credit_balance = (winston_credit_balance::numeric + $2::numeric)::text
             WHERE user_address = $1
               AND (winston_credit_balance::numeric + $2::numeric) >= 0
             RETURNING winston_credit_balance",
        )
        .bind(user_address)
        .bind(&delta)
        .fetch_optional(&mut *tx)
        .await?;

        if row.is_none() {
            tx.rollback().await?;
            return Ok(ReserveResult {
                is_reserved: false,
                cost_of_data_item: cost,
                wallet_exists: true,
            });
        }

        sqlx::query(
            "INSERT INTO balance_ledger (user_address, delta, change_reason) VALUES ($1, $2, 'reservation')",
        )
        .bind(user_address)
        .bind(&delta)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO balance_reservations
                (data_item_id, user_address, reserved_winc, network_fee, service_fee, signature_type, byte_count)
             VALUES ($1, $2, $3, '0', '0', $4, $5)",
        )
        .bind(data_item_id)
        .bind(user_address)
        .bind(cost.to_string())
        .bind(format!("{sig_type:?}"))
        .bind(byte_count as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ReserveResult {
            is_reserved: true,
            cost_of_data_item: cost,
            wallet_exists: true,
        })
    }

    pub async fn get_reservation(&self, data_item_id: &str) -> Result<Option<BalanceReservation>, LedgerError> {
        let reservation = sqlx::query_as::<_, BalanceReservation>(
            "SELECT * FROM balance_reservations WHERE data_item_id = $1",
        )
        .bind(data_item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reservation)
    }

    /// Consumes the reservation on bundle persistence: the reservation row
    /// is simply deleted, the balance stays decremented (`spec.md` §4.4).
    #[instrument(skip(self))]
    pub async fn finalize_reservation(&self, data_item_id: &str) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM balance_reservations WHERE data_item_id = $1")
            .bind(data_item_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::NoReservation(data_item_id.to_string()));
        }
        Ok(())
    }

    /// Cancels a reservation and credits the reserved amount back to the
    /// user (`spec.md` §3: "destroyed ... on cancellation (credit back)").
    #[instrument(skip(self))]
    pub async fn cancel_reservation(&self, data_item_id: &str) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let reservation = sqlx::query_as::<_, BalanceReservation>(
            "DELETE FROM balance_reservations WHERE data_item_id = $1 RETURNING *",
        )
        .bind(data_item_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(reservation) = reservation else {
            tx.rollback().await?;
            return Err(LedgerError::NoReservation(data_item_id.to_string()));
        };
        let delta = reservation.reserved_winc.to_string();
        sqlx::query(
            "UPDATE users SET winston_credit_balance = (winston_credit_balance::numeric + $2::numeric)::text
             WHERE user_address = $1",
        )
        .bind(&reservation.user_address)
        .bind(&delta)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO balance_ledger (user_address, delta, change_reason) VALUES ($1, $2, 'reservation_refund')",
        )
        .bind(&reservation.user_address)
        .bind(&delta)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// `adjustUserWinstonBalance` (`spec.md` §4.4): the single ledger
    /// function every balance mutation funnels through. `delta` may be
    /// negative; the atomic `WHERE` clause returns no row (and this errors)
    /// rather than letting the balance go negative.
    #[instrument(skip(self))]
    pub async fn adjust_balance(
        &self,
        user_address: &str,
        user_address_type: UserAddressType,
        delta: i128,
        reason: ChangeReason,
    ) -> Result<Winston, LedgerError> {
        self.get_or_create_user(user_address, user_address_type).await?;
        let delta_str = delta.to_string();
        let reason_str = serde_json::to_value(&reason)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "admin_credit".to_string());
        let row: Option<(String,)> = sqlx::query_as(
            "UPDATE users
             SET winston_credit_balance = (winston_credit_balance::numeric + $2::numeric)::text
             WHERE user_address = $1
               AND (winston_credit_balance::numeric + $2::numeric) >= 0
             RETURNING winston_credit_balance",
        )
        .bind(user_address)
        .bind(&delta_str)
        .fetch_optional(&self.pool)
        .await?;
        let Some((new_balance,)) = row else {
            return Err(LedgerError::InsufficientBalance);
        };
        sqlx::query(
            "INSERT INTO balance_ledger (user_address, delta, change_reason) VALUES ($1, $2, $3)",
        )
        .bind(user_address)
        .bind(&delta_str)
        .bind(&reason_str)
        .execute(&self.pool)
        .await?;
        Ok(new_balance.parse().expect("balance column always holds a valid Winston"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_upload_limit_zeroes_the_price() {
        let cost = Ledger::price_for(1_000, SignatureType::Arweave, 10_000);
        assert_eq!(cost, Winston::ZERO);
    }

    #[test]
    fn above_the_limit_charges_the_gateway_price() {
        let cost = Ledger::price_for(1_000_000, SignatureType::Arweave, 10_000);
        assert!(cost > Winston::ZERO);
    }
}
