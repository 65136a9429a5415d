//! Canonical catalog data model.
//!
//! `ExternalProductRecord` is the ephemeral as-received supplier payload
//! (fetch → normalize → discard). `VariantDraft` is the normalizer output,
//! and `ProductVariant` the persisted purchasable unit. Amounts are stored
//! in integer minor currency units throughout; supplier payloads arrive in
//! major units and are converted exactly once during normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::vas::{NetworkScope, ProductStatus, TransactionType, VasType};

/// A provisioned VAS supplier integration. The `code` is the immutable
/// unique key (`MOBILEMART`); `priority` ranks integrations, lower number =
/// preferred on ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub active: bool,
    pub api_base: String,
    pub priority: i32,
}

/// Content/network grouping used for catalog browsing; created lazily on
/// first encounter during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brand {
    pub id: i64,
    pub name: String,
}

/// Supplier-scoped logical product. Unique on (supplier, name, vas type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub supplier_id: i64,
    pub brand_id: i64,
    pub name: String,
    pub vas_type: VasType,
    pub supplier_product_id: String,
    pub status: ProductStatus,
}

/// The purchasable unit and canonical output of normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub supplier_id: i64,
    pub supplier_product_id: String,
    /// Display name of the owning product, denormalized for diffing and
    /// purchase display.
    pub product_name: String,
    pub vas_type: VasType,
    pub transaction_type: TransactionType,
    pub network_scope: NetworkScope,
    pub provider: String,
    /// Inclusive bounds, minor currency units.
    pub min_amount: i64,
    pub max_amount: i64,
    /// Fixed denominations in minor units; non-empty when present, values
    /// inside `[min_amount, max_amount]`.
    pub denominations: Option<Vec<i64>>,
    /// Commission percentage.
    pub commission: f64,
    /// Minor currency units.
    pub fixed_fee: i64,
    pub is_promotional: bool,
    pub discount_percent: Option<f64>,
    /// Tie-break rank; lower wins.
    pub priority: i32,
    pub status: ProductStatus,
    /// Supplier-specific provenance; never interpreted by ranking logic.
    pub metadata: Value,
    pub last_synced_at: DateTime<Utc>,
    pub sort_order: i32,
    pub is_preferred: bool,
}

impl ProductVariant {
    /// Price used by best-deal ranking: the lowest fixed denomination when
    /// present, otherwise the minimum amount.
    pub fn effective_price(&self) -> i64 {
        self.denominations
            .as_ref()
            .and_then(|d| d.iter().copied().min())
            .unwrap_or(self.min_amount)
    }
}

/// As-received supplier payload for one product. Never persisted as-is;
/// amounts are in the supplier's native major currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalProductRecord {
    pub merchant_product_id: String,
    pub product_name: String,
    pub content_creator: Option<String>,
    /// pinned = yields a printed/returned PIN; pinless = direct top-up.
    pub pinned: bool,
    pub fixed_amount: bool,
    pub amount: Option<f64>,
    pub minimum_amount: Option<f64>,
    pub maximum_amount: Option<f64>,
    /// Some suppliers include commercial terms inline; passed through when
    /// present, defaulted otherwise.
    pub commission: Option<f64>,
    pub fixed_fee: Option<f64>,
}

/// Normalizer output: a `ProductVariant` minus the persistence identifiers,
/// plus the brand/product labels reconciliation needs for find-or-create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDraft {
    pub supplier_product_id: String,
    pub product_name: String,
    pub brand_name: String,
    pub vas_type: VasType,
    pub transaction_type: TransactionType,
    pub network_scope: NetworkScope,
    pub provider: String,
    pub min_amount: i64,
    pub max_amount: i64,
    pub denominations: Option<Vec<i64>>,
    pub commission: f64,
    pub fixed_fee: i64,
    pub is_promotional: bool,
    pub discount_percent: Option<f64>,
    pub priority: i32,
    pub status: ProductStatus,
    pub metadata: Value,
    pub sort_order: i32,
    pub is_preferred: bool,
}

impl VariantDraft {
    /// Amount invariant: non-negative bounds, min ≤ max, denominations (when
    /// present) non-empty and inside the bounds.
    pub fn amounts_valid(&self) -> bool {
        if self.min_amount < 0 || self.max_amount < 0 || self.min_amount > self.max_amount {
            return false;
        }
        match &self.denominations {
            None => true,
            Some(denoms) => {
                !denoms.is_empty()
                    && denoms
                        .iter()
                        .all(|d| *d >= self.min_amount && *d <= self.max_amount)
            }
        }
    }
}
