//! Pure mapping from one external supplier record to a canonical variant
//! draft. No I/O; the sync timestamp and supplier rank are passed in so the
//! function stays deterministic under test.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::catalog::model::{ExternalProductRecord, VariantDraft};
use crate::error::SupplierError;
use crate::vas::{NetworkScope, ProductStatus, TransactionType, VasType};

/// Commercial floor applied when a supplier omits a minimum, minor units.
pub const DEFAULT_MIN_AMOUNT_MINOR: i64 = 500;
/// Commercial ceiling applied when a supplier omits a maximum, minor units.
pub const DEFAULT_MAX_AMOUNT_MINOR: i64 = 100_000;

/// Tag recorded in variant provenance metadata.
const SYNC_SOURCE: &str = "catalog_sync";

#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub supplier_code: &'a str,
    /// Supplier integration rank; becomes the variant's default priority.
    pub supplier_priority: i32,
    pub synced_at: DateTime<Utc>,
}

/// Convert a major-unit supplier amount to minor units.
fn to_minor(major: f64, field: &str, key: &str) -> Result<i64, SupplierError> {
    if !major.is_finite() || major < 0.0 {
        return Err(SupplierError::Normalization(format!(
            "record {key}: {field} must be a non-negative amount, got {major}"
        )));
    }
    Ok((major * 100.0).round() as i64)
}

/// Map one filtered external record into a [`VariantDraft`].
pub fn normalize(
    record: &ExternalProductRecord,
    vas_type: VasType,
    ctx: &NormalizeContext<'_>,
) -> Result<VariantDraft, SupplierError> {
    let key = record.merchant_product_id.as_str();

    // Bill-payment must always yield a presentable voucher/PIN; the
    // supplier's own pinned flag for this category is unreliable.
    let pinned = record.pinned || vas_type == VasType::BillPayment;
    let pinned_overridden = pinned != record.pinned;

    let transaction_type = if pinned {
        TransactionType::Voucher
    } else if matches!(vas_type, VasType::Airtime | VasType::Data) {
        TransactionType::Topup
    } else {
        TransactionType::Direct
    };

    let (min_amount, max_amount, denominations) =
        if record.fixed_amount && vas_type != VasType::BillPayment {
            let amount = record.amount.ok_or_else(|| {
                SupplierError::Normalization(format!(
                    "record {key}: fixedAmount set but amount missing"
                ))
            })?;
            let minor = to_minor(amount, "amount", key)?;
            (minor, minor, Some(vec![minor]))
        } else {
            let min = match record.minimum_amount {
                Some(v) => to_minor(v, "minimumAmount", key)?,
                None => DEFAULT_MIN_AMOUNT_MINOR,
            };
            let max = match record.maximum_amount {
                Some(v) => to_minor(v, "maximumAmount", key)?,
                None => DEFAULT_MAX_AMOUNT_MINOR,
            };
            (min, max, None)
        };

    let provider = record
        .content_creator
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let (source, _ok) = safe_encode(record);
    let metadata = json!({
        "source": source,
        "pinned_overridden": pinned_overridden,
        "synced_at": ctx.synced_at,
        "sync_source": SYNC_SOURCE,
        "supplier": ctx.supplier_code,
    });

    let draft = VariantDraft {
        supplier_product_id: record.merchant_product_id.clone(),
        product_name: record.product_name.clone(),
        brand_name: provider.clone(),
        vas_type,
        transaction_type,
        network_scope: NetworkScope::Local,
        provider,
        min_amount,
        max_amount,
        denominations,
        commission: record.commission.unwrap_or(0.0),
        fixed_fee: match record.fixed_fee {
            Some(v) => to_minor(v, "fixedFee", key)?,
            None => 0,
        },
        is_promotional: false,
        discount_percent: None,
        priority: ctx.supplier_priority,
        status: ProductStatus::Active,
        metadata,
        // Pinned (or force-pinned) products sort first in catalog browsing.
        sort_order: if pinned { 0 } else { 1 },
        is_preferred: pinned,
    };

    if !draft.amounts_valid() {
        return Err(SupplierError::Normalization(format!(
            "record {key}: invalid amount bounds min={} max={}",
            draft.min_amount, draft.max_amount
        )));
    }

    Ok(draft)
}

/// Defensive serializer: degrades to an empty JSON object with a logged
/// warning instead of raising, so one malformed upstream field cannot halt
/// catalog sync. Returns whether encoding succeeded so callers can count
/// fallbacks.
pub fn safe_encode<T: Serialize>(value: &T) -> (Value, bool) {
    match serde_json::to_value(value) {
        Ok(v) => (v, true),
        Err(err) => {
            warn!(error = %err, "metadata not serializable; storing empty object");
            (json!({}), false)
        }
    }
}
