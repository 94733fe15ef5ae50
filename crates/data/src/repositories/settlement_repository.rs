//! Settlement history repository.

use chrono::{DateTime, Utc};
use clmm_keeper_domain::{OperationKind, Protocol};
use clmm_keeper_engine::settle::SettlementSummary;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Database record for one settled transaction.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    /// Transaction signature, base58.
    pub signature: String,
    /// Slot the transaction landed in.
    pub slot: i64,
    /// Operation that produced the transaction.
    pub operation: String,
    /// Pool protocol.
    pub protocol: String,
    /// Position address; absent for opens, where it is not known ahead
    /// of submission.
    pub position: Option<String>,
    /// Pool address, when the operation targeted one.
    pub pool: Option<String>,
    /// Total fee paid, lamports.
    pub fee: i64,
    /// Priority-fee portion, lamports.
    pub priority_fee: i64,
    /// Compute units consumed, when reported.
    pub compute_units: Option<i64>,
    /// Signed raw token deltas keyed by mint.
    pub per_mint_deltas: BTreeMap<String, i128>,
    /// Fiat value of the deltas.
    pub usd_delta: Decimal,
    /// Mints that moved but could not be priced.
    pub unpriced_mints: Vec<String>,
    /// True when the summary may be missing inner movements.
    pub partial: bool,
    /// On-chain error string when the transaction landed but failed;
    /// such rows carry the fee and no deltas.
    pub error: Option<String>,
    /// Record creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Raw deltas exceed JSON's safe integer range, so they travel as
/// decimal strings inside the jsonb column.
fn deltas_to_json(deltas: &BTreeMap<String, i128>) -> serde_json::Value {
    serde_json::Value::Object(
        deltas
            .iter()
            .map(|(mint, delta)| (mint.clone(), serde_json::Value::String(delta.to_string())))
            .collect(),
    )
}

fn json_to_deltas(value: &serde_json::Value) -> Result<BTreeMap<String, i128>, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "per_mint_deltas is not an object".to_string())?;
    let mut deltas = BTreeMap::new();
    for (mint, delta) in object {
        let raw = delta
            .as_str()
            .ok_or_else(|| format!("delta for {mint} is not a string"))?;
        let parsed: i128 = raw
            .parse()
            .map_err(|e| format!("delta for {mint}: {e}"))?;
        deltas.insert(mint.clone(), parsed);
    }
    Ok(deltas)
}

impl SettlementRecord {
    /// Creates a SettlementRecord from a database row.
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let deltas_json: serde_json::Value = row.try_get("per_mint_deltas")?;
        let per_mint_deltas =
            json_to_deltas(&deltas_json).map_err(|e| sqlx::Error::ColumnDecode {
                index: "per_mint_deltas".to_string(),
                source: e.into(),
            })?;
        let unpriced_json: serde_json::Value = row.try_get("unpriced_mints")?;
        let unpriced_mints = serde_json::from_value(unpriced_json).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "unpriced_mints".to_string(),
                source: Box::new(e),
            }
        })?;
        Ok(Self {
            signature: row.try_get("signature")?,
            slot: row.try_get("slot")?,
            operation: row.try_get("operation")?,
            protocol: row.try_get("protocol")?,
            position: row.try_get("position")?,
            pool: row.try_get("pool")?,
            fee: row.try_get("fee")?,
            priority_fee: row.try_get("priority_fee")?,
            compute_units: row.try_get("compute_units")?,
            per_mint_deltas,
            usd_delta: row.try_get("usd_delta")?,
            unpriced_mints,
            partial: row.try_get("partial")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Repository for settlement history.
#[derive(Clone)]
pub struct SettlementRepository {
    pool: Arc<PgPool>,
}

impl SettlementRepository {
    /// Creates a new SettlementRepository.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Saves a settlement summary. Re-saving the same signature updates
    /// the row, so re-summarizing after a partial is safe.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn save(
        &self,
        operation: OperationKind,
        protocol: Protocol,
        position: Option<&str>,
        pool: Option<&str>,
        summary: &SettlementSummary,
    ) -> Result<SettlementRecord, sqlx::Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO settlements (signature, slot, operation, protocol, position, pool,
                                     fee, priority_fee, compute_units, per_mint_deltas,
                                     usd_delta, unpriced_mints, partial, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (signature) DO UPDATE SET
                per_mint_deltas = EXCLUDED.per_mint_deltas,
                usd_delta = EXCLUDED.usd_delta,
                unpriced_mints = EXCLUDED.unpriced_mints,
                partial = EXCLUDED.partial,
                error = EXCLUDED.error
            RETURNING *
            "#,
        )
        .bind(summary.signature.to_string())
        .bind(summary.slot as i64)
        .bind(operation.to_string())
        .bind(protocol.to_string())
        .bind(position)
        .bind(pool)
        .bind(summary.fee as i64)
        .bind(summary.priority_fee as i64)
        .bind(summary.compute_units_consumed.map(|cu| cu as i64))
        .bind(deltas_to_json(&summary.per_mint_deltas))
        .bind(summary.usd_delta)
        .bind(serde_json::json!(summary.unpriced_mints))
        .bind(summary.partial)
        .bind(summary.error.as_deref())
        .fetch_one(self.pool.as_ref())
        .await?;
        SettlementRecord::from_row(&row)
    }

    /// Finds a settlement by signature.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_signature(
        &self,
        signature: &str,
    ) -> Result<Option<SettlementRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM settlements WHERE signature = $1")
            .bind(signature)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(SettlementRecord::from_row).transpose()
    }

    /// Finds the most recent settlements, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_recent(&self, limit: i64) -> Result<Vec<SettlementRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM settlements
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(SettlementRecord::from_row).collect()
    }

    /// Sums fees paid over settlements recorded after `since`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn total_fees_since(&self, since: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let total: (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(fee)::BIGINT FROM settlements WHERE created_at >= $1",
        )
        .bind(since)
        .fetch_one(self.pool.as_ref())
        .await?;
        Ok(total.0.unwrap_or(0))
    }

    /// Deletes settlements recorded before `before`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn delete_before(&self, before: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM settlements WHERE created_at < $1")
            .bind(before)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
