//! Persisted catalog access.
//!
//! The reconciler talks to the catalog through [`CatalogStore`] so the diff
//! and bulkhead logic can be exercised against an in-memory store in tests
//! while production runs on Postgres. The Pg implementation uses plain
//! runtime-bound queries; all upsert targets match the unique keys declared
//! in `migrations/0001_catalog_schema.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::debug;

use crate::catalog::model::{Brand, Product, ProductVariant, Supplier, VariantDraft};
use crate::error::SupplierError;
use crate::util::db::Db;
use crate::vas::{NetworkScope, ProductStatus, TransactionType, VasType};

fn pe(err: sqlx::Error) -> SupplierError {
    SupplierError::Persistence(err.to_string())
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Find-or-create a supplier row by its immutable code.
    async fn ensure_supplier(
        &self,
        code: &str,
        name: &str,
        api_base: &str,
        priority: i32,
    ) -> Result<Supplier, SupplierError>;

    async fn list_suppliers(&self) -> Result<Vec<Supplier>, SupplierError>;

    /// Brands are created lazily on first encounter during reconciliation.
    async fn find_or_create_brand(&self, name: &str) -> Result<Brand, SupplierError>;

    /// Products are unique on (supplier, name, vas type).
    async fn find_or_create_product(
        &self,
        supplier_id: i64,
        brand_id: i64,
        name: &str,
        vas_type: VasType,
        supplier_product_id: &str,
    ) -> Result<Product, SupplierError>;

    /// Persisted variants for one supplier + VAS type (reconciliation input).
    async fn variants_for_supplier(
        &self,
        supplier_id: i64,
        vas_type: VasType,
    ) -> Result<Vec<ProductVariant>, SupplierError>;

    /// Active variants across all active suppliers (best-deal input).
    async fn active_variants(&self, vas_type: VasType) -> Result<Vec<ProductVariant>, SupplierError>;

    async fn insert_variant(
        &self,
        product_id: i64,
        supplier_id: i64,
        draft: &VariantDraft,
        synced_at: DateTime<Utc>,
    ) -> Result<i64, SupplierError>;

    /// Refresh a variant from a draft, re-pointing it at `product_id` (the
    /// product may have been re-resolved under a new display name).
    async fn update_variant(
        &self,
        variant_id: i64,
        product_id: i64,
        draft: &VariantDraft,
        synced_at: DateTime<Utc>,
    ) -> Result<(), SupplierError>;

    /// Best-effort sync-run bookkeeping; callers treat failures as non-fatal.
    async fn record_sync_run(
        &self,
        supplier_code: &str,
        dry_run: bool,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: &str,
        summary: &Value,
    ) -> Result<(), SupplierError>;
}

#[derive(Clone)]
pub struct PgCatalogStore {
    db: Db,
}

impl PgCatalogStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn supplier_from_row(row: &PgRow) -> Supplier {
        Supplier {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            active: row.get("active"),
            api_base: row.get("api_base"),
            priority: row.get("priority"),
        }
    }

    fn variant_from_row(row: &PgRow) -> Result<ProductVariant, SupplierError> {
        let vas_raw: String = row.get("vas_type");
        let vas_type = VasType::canonicalize(&vas_raw).ok_or_else(|| {
            SupplierError::Persistence(format!("unknown vas_type in catalog row: {vas_raw}"))
        })?;

        let tx_raw: String = row.get("transaction_type");
        let transaction_type = match tx_raw.as_str() {
            "topup" => TransactionType::Topup,
            "voucher" => TransactionType::Voucher,
            "direct" => TransactionType::Direct,
            other => {
                return Err(SupplierError::Persistence(format!(
                    "unknown transaction_type in catalog row: {other}"
                )))
            }
        };

        let scope_raw: String = row.get("network_scope");
        let network_scope = match scope_raw.as_str() {
            "local" => NetworkScope::Local,
            "international" => NetworkScope::International,
            other => {
                return Err(SupplierError::Persistence(format!(
                    "unknown network_scope in catalog row: {other}"
                )))
            }
        };

        let status_raw: String = row.get("status");
        let status = if status_raw == "active" {
            ProductStatus::Active
        } else {
            ProductStatus::Inactive
        };

        let denominations: Option<Vec<i64>> = row
            .get::<Option<Value>, _>("denominations")
            .and_then(|v| serde_json::from_value(v).ok());

        Ok(ProductVariant {
            id: row.get("id"),
            product_id: row.get("product_id"),
            supplier_id: row.get("supplier_id"),
            supplier_product_id: row.get("supplier_product_id"),
            product_name: row.get("product_name"),
            vas_type,
            transaction_type,
            network_scope,
            provider: row.get("provider"),
            min_amount: row.get("min_amount"),
            max_amount: row.get("max_amount"),
            denominations,
            commission: row.get("commission"),
            fixed_fee: row.get("fixed_fee"),
            is_promotional: row.get("is_promotional"),
            discount_percent: row.get("discount_percent"),
            priority: row.get("priority"),
            status,
            metadata: row.get("metadata"),
            last_synced_at: row.get("last_synced_at"),
            sort_order: row.get("sort_order"),
            is_preferred: row.get("is_preferred"),
        })
    }
}

const VARIANT_SELECT: &str = "SELECT v.id, v.product_id, v.supplier_id, v.supplier_product_id, \
     p.name AS product_name, v.vas_type, v.transaction_type, v.network_scope, v.provider, \
     v.min_amount, v.max_amount, v.denominations, v.commission, v.fixed_fee, \
     v.is_promotional, v.discount_percent, v.priority, v.status, v.metadata, \
     v.last_synced_at, v.sort_order, v.is_preferred \
     FROM product_variants v JOIN products p ON p.id = v.product_id";

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn ensure_supplier(
        &self,
        code: &str,
        name: &str,
        api_base: &str,
        priority: i32,
    ) -> Result<Supplier, SupplierError> {
        if let Some(row) = sqlx::query(
            "SELECT id, code, name, active, api_base, priority FROM suppliers WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.db.pool)
        .await
        .map_err(pe)?
        {
            return Ok(Self::supplier_from_row(&row));
        }

        let row = sqlx::query(
            "INSERT INTO suppliers (code, name, active, api_base, priority) \
             VALUES ($1, $2, TRUE, $3, $4) \
             ON CONFLICT (code) DO UPDATE SET api_base = EXCLUDED.api_base \
             RETURNING id, code, name, active, api_base, priority",
        )
        .bind(code)
        .bind(name)
        .bind(api_base)
        .bind(priority)
        .fetch_one(&self.db.pool)
        .await
        .map_err(pe)?;
        debug!(supplier = code, "supplier provisioned");
        Ok(Self::supplier_from_row(&row))
    }

    async fn list_suppliers(&self) -> Result<Vec<Supplier>, SupplierError> {
        let rows = sqlx::query(
            "SELECT id, code, name, active, api_base, priority FROM suppliers ORDER BY priority, id",
        )
        .fetch_all(&self.db.pool)
        .await
        .map_err(pe)?;
        Ok(rows.iter().map(Self::supplier_from_row).collect())
    }

    async fn find_or_create_brand(&self, name: &str) -> Result<Brand, SupplierError> {
        if let Some(row) = sqlx::query("SELECT id, name FROM brands WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.db.pool)
            .await
            .map_err(pe)?
        {
            return Ok(Brand {
                id: row.get("id"),
                name: row.get("name"),
            });
        }

        let row = sqlx::query(
            "INSERT INTO brands (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.db.pool)
        .await
        .map_err(pe)?;
        debug!(brand = name, "brand created");
        Ok(Brand {
            id: row.get("id"),
            name: row.get("name"),
        })
    }

    async fn find_or_create_product(
        &self,
        supplier_id: i64,
        brand_id: i64,
        name: &str,
        vas_type: VasType,
        supplier_product_id: &str,
    ) -> Result<Product, SupplierError> {
        if let Some(row) = sqlx::query(
            "SELECT id, supplier_id, brand_id, name, vas_type, supplier_product_id, status \
             FROM products WHERE supplier_id = $1 AND name = $2 AND vas_type = $3",
        )
        .bind(supplier_id)
        .bind(name)
        .bind(vas_type.as_str())
        .fetch_optional(&self.db.pool)
        .await
        .map_err(pe)?
        {
            let status_raw: String = row.get("status");
            return Ok(Product {
                id: row.get("id"),
                supplier_id: row.get("supplier_id"),
                brand_id: row.get("brand_id"),
                name: row.get("name"),
                vas_type,
                supplier_product_id: row.get("supplier_product_id"),
                status: if status_raw == "active" {
                    ProductStatus::Active
                } else {
                    ProductStatus::Inactive
                },
            });
        }

        let row = sqlx::query(
            "INSERT INTO products (supplier_id, brand_id, name, vas_type, supplier_product_id, status) \
             VALUES ($1, $2, $3, $4, $5, 'active') \
             ON CONFLICT (supplier_id, name, vas_type) DO UPDATE SET brand_id = EXCLUDED.brand_id \
             RETURNING id",
        )
        .bind(supplier_id)
        .bind(brand_id)
        .bind(name)
        .bind(vas_type.as_str())
        .bind(supplier_product_id)
        .fetch_one(&self.db.pool)
        .await
        .map_err(pe)?;
        debug!(product = name, vas = %vas_type, "product created");
        Ok(Product {
            id: row.get("id"),
            supplier_id,
            brand_id,
            name: name.to_string(),
            vas_type,
            supplier_product_id: supplier_product_id.to_string(),
            status: ProductStatus::Active,
        })
    }

    async fn variants_for_supplier(
        &self,
        supplier_id: i64,
        vas_type: VasType,
    ) -> Result<Vec<ProductVariant>, SupplierError> {
        let sql = format!("{VARIANT_SELECT} WHERE v.supplier_id = $1 AND v.vas_type = $2 ORDER BY v.id");
        let rows = sqlx::query(&sql)
            .bind(supplier_id)
            .bind(vas_type.as_str())
            .fetch_all(&self.db.pool)
            .await
            .map_err(pe)?;
        rows.iter().map(Self::variant_from_row).collect()
    }

    async fn active_variants(&self, vas_type: VasType) -> Result<Vec<ProductVariant>, SupplierError> {
        let sql = format!(
            "{VARIANT_SELECT} JOIN suppliers s ON s.id = v.supplier_id \
             WHERE v.vas_type = $1 AND v.status = 'active' AND s.active \
             ORDER BY v.sort_order, v.id"
        );
        let rows = sqlx::query(&sql)
            .bind(vas_type.as_str())
            .fetch_all(&self.db.pool)
            .await
            .map_err(pe)?;
        rows.iter().map(Self::variant_from_row).collect()
    }

    async fn insert_variant(
        &self,
        product_id: i64,
        supplier_id: i64,
        draft: &VariantDraft,
        synced_at: DateTime<Utc>,
    ) -> Result<i64, SupplierError> {
        let denominations = draft
            .denominations
            .as_ref()
            .map(|d| serde_json::to_value(d).unwrap_or(Value::Null));
        let row = sqlx::query(
            "INSERT INTO product_variants \
             (product_id, supplier_id, supplier_product_id, vas_type, transaction_type, \
              network_scope, provider, min_amount, max_amount, denominations, commission, \
              fixed_fee, is_promotional, discount_percent, priority, status, metadata, \
              last_synced_at, sort_order, is_preferred) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20) \
             ON CONFLICT (product_id, supplier_id, supplier_product_id) DO UPDATE SET \
               provider = EXCLUDED.provider, metadata = EXCLUDED.metadata, \
               last_synced_at = EXCLUDED.last_synced_at \
             RETURNING id",
        )
        .bind(product_id)
        .bind(supplier_id)
        .bind(&draft.supplier_product_id)
        .bind(draft.vas_type.as_str())
        .bind(draft.transaction_type.as_str())
        .bind(draft.network_scope.as_str())
        .bind(&draft.provider)
        .bind(draft.min_amount)
        .bind(draft.max_amount)
        .bind(denominations)
        .bind(draft.commission)
        .bind(draft.fixed_fee)
        .bind(draft.is_promotional)
        .bind(draft.discount_percent)
        .bind(draft.priority)
        .bind(draft.status.as_str())
        .bind(&draft.metadata)
        .bind(synced_at)
        .bind(draft.sort_order)
        .bind(draft.is_preferred)
        .fetch_one(&self.db.pool)
        .await
        .map_err(pe)?;
        Ok(row.get("id"))
    }

    async fn update_variant(
        &self,
        variant_id: i64,
        product_id: i64,
        draft: &VariantDraft,
        synced_at: DateTime<Utc>,
    ) -> Result<(), SupplierError> {
        let denominations = draft
            .denominations
            .as_ref()
            .map(|d| serde_json::to_value(d).unwrap_or(Value::Null));
        sqlx::query(
            "UPDATE product_variants SET \
               product_id = $2, transaction_type = $3, network_scope = $4, provider = $5, \
               min_amount = $6, max_amount = $7, denominations = $8, commission = $9, \
               fixed_fee = $10, priority = $11, status = $12, metadata = $13, \
               last_synced_at = $14, sort_order = $15, is_preferred = $16, updated_at = now() \
             WHERE id = $1",
        )
        .bind(variant_id)
        .bind(product_id)
        .bind(draft.transaction_type.as_str())
        .bind(draft.network_scope.as_str())
        .bind(&draft.provider)
        .bind(draft.min_amount)
        .bind(draft.max_amount)
        .bind(denominations)
        .bind(draft.commission)
        .bind(draft.fixed_fee)
        .bind(draft.priority)
        .bind(draft.status.as_str())
        .bind(&draft.metadata)
        .bind(synced_at)
        .bind(draft.sort_order)
        .bind(draft.is_preferred)
        .execute(&self.db.pool)
        .await
        .map_err(pe)?;
        Ok(())
    }

    async fn record_sync_run(
        &self,
        supplier_code: &str,
        dry_run: bool,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: &str,
        summary: &Value,
    ) -> Result<(), SupplierError> {
        sqlx::query(
            "INSERT INTO sync_runs (supplier_code, dry_run, started_at, finished_at, status, summary) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(supplier_code)
        .bind(dry_run)
        .bind(started_at)
        .bind(finished_at)
        .bind(status)
        .bind(summary)
        .execute(&self.db.pool)
        .await
        .map_err(pe)?;
        Ok(())
    }
}
