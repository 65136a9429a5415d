//! Catalog listing fetch plus the platform's pinned/pinless business filter.
//!
//! Supplier APIs sometimes violate commercial policy (e.g. returning pinned
//! airtime vouchers on a pinless-only platform), so records are filtered
//! against a documented policy table before they leave this component:
//!
//! | VAS type     | rule                                             |
//! |--------------|--------------------------------------------------|
//! | airtime/data | keep `pinned == false` only (pinless top-ups)    |
//! | electricity  | keep `pinned == true` only                       |
//! | bill_payment | keep all; normalization forces pinned to `true`  |
//! | voucher      | keep all, unfiltered                             |

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::model::ExternalProductRecord;
use crate::error::SupplierError;
use crate::suppliers::SupplierClient;
use crate::vas::VasType;

pub struct CatalogFetcher<'a> {
    client: &'a SupplierClient,
}

/// Listing result plus how many records the business filter dropped and how
/// many entries never parsed at all.
#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<ExternalProductRecord>,
    pub fetched: usize,
    pub filtered_out: usize,
    pub malformed: usize,
}

impl<'a> CatalogFetcher<'a> {
    pub fn new(client: &'a SupplierClient) -> Self {
        Self { client }
    }

    /// Fetch the listing for one VAS type and apply the business filter.
    pub async fn fetch(&self, vas_type: VasType) -> Result<FetchOutcome, SupplierError> {
        let path = format!("{}/products", vas_type.endpoint_segment());
        let body = self.client.get(&path).await?;

        let items = extract_product_array(&body).ok_or_else(|| SupplierError::RequestFailed {
            status: 200,
            body: "unexpected listing shape (no bare array, 'products', or 'data')".to_string(),
        })?;

        let fetched = items.len();
        let mut records = Vec::with_capacity(items.len());
        let mut malformed = 0usize;
        for item in items {
            match parse_record(item) {
                Ok(record) => records.push(record),
                Err(err) => {
                    // Dropped here rather than poisoning the reconcile batch
                    // downstream; counted into the per-type failure total.
                    malformed += 1;
                    warn!(
                        supplier = self.client.supplier_code(),
                        vas = %vas_type,
                        error = %err,
                        "skipping malformed listing record"
                    );
                }
            }
        }

        let parsed = records.len();
        records.retain(|r| passes_business_filter(vas_type, r));
        let filtered_out = parsed - records.len();
        debug!(
            supplier = self.client.supplier_code(),
            vas = %vas_type,
            fetched,
            kept = records.len(),
            dropped_by_filter = filtered_out,
            malformed,
            "catalog listing fetched"
        );

        Ok(FetchOutcome {
            records,
            fetched,
            filtered_out,
            malformed,
        })
    }
}

/// Accept the listing as a bare array or an object exposing the array under
/// `products` or `data`.
fn extract_product_array(body: &Value) -> Option<&Vec<Value>> {
    if let Some(arr) = body.as_array() {
        return Some(arr);
    }
    for key in ["products", "data"] {
        if let Some(arr) = body.get(key).and_then(|v| v.as_array()) {
            return Some(arr);
        }
    }
    None
}

fn value_as_f64(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    if let Some(n) = v.as_i64() {
        return Some(n as f64);
    }
    if let Some(s) = v.as_str() {
        return s.trim().parse::<f64>().ok();
    }
    None
}

fn value_as_string(v: &Value) -> Option<String> {
    if let Some(s) = v.as_str() {
        let t = s.trim();
        if t.is_empty() {
            return None;
        }
        return Some(t.to_string());
    }
    if let Some(n) = v.as_i64() {
        return Some(n.to_string());
    }
    None
}

/// Map one raw listing entry onto [`ExternalProductRecord`].
///
/// Suppliers are loose with types (numeric ids, stringified amounts), so
/// every field is extracted defensively; only the product id and name are
/// hard requirements.
pub fn parse_record(item: &Value) -> Result<ExternalProductRecord, SupplierError> {
    let merchant_product_id = item
        .get("merchantProductId")
        .and_then(value_as_string)
        .ok_or_else(|| SupplierError::Normalization("record missing merchantProductId".into()))?;
    let product_name = item
        .get("productName")
        .and_then(value_as_string)
        .ok_or_else(|| {
            SupplierError::Normalization(format!(
                "record {merchant_product_id} missing productName"
            ))
        })?;

    Ok(ExternalProductRecord {
        merchant_product_id,
        product_name,
        content_creator: item.get("contentCreator").and_then(value_as_string),
        pinned: item.get("pinned").and_then(|v| v.as_bool()).unwrap_or(false),
        fixed_amount: item
            .get("fixedAmount")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        amount: item.get("amount").and_then(value_as_f64),
        minimum_amount: item.get("minimumAmount").and_then(value_as_f64),
        maximum_amount: item.get("maximumAmount").and_then(value_as_f64),
        commission: item.get("commission").and_then(value_as_f64),
        fixed_fee: item.get("fixedFee").and_then(value_as_f64),
    })
}

/// The pinned/pinless commercial policy table. Pure so it can be tested
/// independently of any HTTP plumbing.
pub fn passes_business_filter(vas_type: VasType, record: &ExternalProductRecord) -> bool {
    match vas_type {
        // Pinless top-ups only.
        VasType::Airtime | VasType::Data => !record.pinned,
        // Prepaid tokens must come back as a printable voucher.
        VasType::Electricity => record.pinned,
        // Supplier pinned flags are unreliable here; normalization forces
        // the flag to true regardless.
        VasType::BillPayment => true,
        VasType::Voucher => true,
    }
}
