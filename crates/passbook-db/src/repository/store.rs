//! # Store Repository
//!
//! Per-store invoicing configuration: prefix, issuer tax id, VAT rate,
//! compliance system and timezone. Soft-deleted stores are invisible.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use passbook_core::{StoreConfig, TaxRate};

use crate::error::DbResult;

const STORE_SELECT: &str = r#"
    SELECT id, store_name, invoice_prefix, tax_id, default_vat_rate_bps,
           billing_system, timezone
    FROM stores
    WHERE id = ?1 AND deleted_at IS NULL
"#;

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: i64,
    store_name: String,
    invoice_prefix: String,
    tax_id: String,
    default_vat_rate_bps: i64,
    billing_system: String,
    timezone: String,
}

impl From<StoreRow> for StoreConfig {
    fn from(row: StoreRow) -> Self {
        StoreConfig {
            id: row.id,
            name: row.store_name,
            invoice_prefix: row.invoice_prefix,
            tax_id: row.tax_id,
            // CHECK keeps the column within 0..=10000
            default_vat_rate: TaxRate::from_bps(row.default_vat_rate_bps.clamp(0, 10_000) as u32),
            billing_system: row.billing_system,
            timezone: row.timezone,
        }
    }
}

/// Repository for store configuration.
#[derive(Debug, Clone)]
pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    /// Creates a new StoreRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StoreRepository { pool }
    }

    /// Gets a live store by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<StoreConfig>> {
        let row: Option<StoreRow> = sqlx::query_as(STORE_SELECT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(StoreConfig::from))
    }

    /// Inserts a store with an explicit ID (stores are provisioned elsewhere).
    pub async fn insert(&self, store: &StoreConfig) -> DbResult<()> {
        debug!(id = store.id, prefix = %store.invoice_prefix, "Inserting store");

        sqlx::query(
            r#"
            INSERT INTO stores (
                id, store_name, invoice_prefix, tax_id,
                default_vat_rate_bps, billing_system, timezone
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(store.id)
        .bind(&store.name)
        .bind(&store.invoice_prefix)
        .bind(&store.tax_id)
        .bind(store.default_vat_rate.bps() as i64)
        .bind(&store.billing_system)
        .bind(&store.timezone)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads a store inside the caller's transaction.
    pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<StoreConfig>> {
        let row: Option<StoreRow> = sqlx::query_as(STORE_SELECT)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(StoreConfig::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn store() -> StoreConfig {
        StoreConfig {
            id: 1,
            name: "Centro".to_string(),
            invoice_prefix: "S1".to_string(),
            tax_id: "B12345678".to_string(),
            default_vat_rate: TaxRate::from_bps(1000),
            billing_system: "VERIFACTU".to_string(),
            timezone: "Europe/Madrid".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stores().insert(&store()).await.unwrap();

        let loaded = db.stores().get_by_id(1).await.unwrap().unwrap();
        assert_eq!(loaded.invoice_prefix, "S1");
        assert_eq!(loaded.default_vat_rate.bps(), 1000);
        assert!(db.stores().get_by_id(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_soft_deleted_store_is_hidden() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stores().insert(&store()).await.unwrap();
        sqlx::query("UPDATE stores SET deleted_at = '2025-01-01T00:00:00.000000Z' WHERE id = 1")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(db.stores().get_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_store_is_unique_violation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stores().insert(&store()).await.unwrap();
        let err = db.stores().insert(&store()).await.unwrap_err();
        assert!(matches!(err, crate::DbError::UniqueViolation { .. }));
    }
}
