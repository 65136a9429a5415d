//! Three-way diff between a freshly fetched (normalized) catalog and the
//! persisted catalog, with idempotent per-record writes.
//!
//! Per-record failures are caught, counted, and logged with the offending
//! record's key; they never abort the rest of the batch. "Extra" (DB-only)
//! variants are reported but deliberately left untouched.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, warn};

use crate::catalog::model::{ProductVariant, Supplier, VariantDraft};
use crate::catalog::store::CatalogStore;
use crate::error::SupplierError;
use crate::vas::VasType;

/// Diff + write outcome for one supplier/VAS-type batch. The vectors carry
/// supplier-native product ids.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconciliationResult {
    /// External records actually written as new variants (live mode only).
    pub created: Vec<String>,
    /// Persisted variants actually refreshed (live mode only).
    pub updated: Vec<String>,
    /// External keys with no persisted counterpart.
    pub missing: Vec<String>,
    /// Persisted keys no longer present upstream; reported, never deleted.
    pub extra: Vec<String>,
    /// Present on both sides but display name or provider differs.
    pub mismatched: Vec<String>,
    /// Per-record write failures (bulkhead).
    pub failed: usize,
}

pub struct CatalogReconciler<'a, S: CatalogStore + ?Sized> {
    store: &'a S,
    /// Compute the diff but perform no writes.
    dry_run: bool,
}

impl<'a, S: CatalogStore + ?Sized> CatalogReconciler<'a, S> {
    pub fn new(store: &'a S, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    pub async fn reconcile(
        &self,
        supplier: &Supplier,
        vas_type: VasType,
        drafts: Vec<VariantDraft>,
        persisted: Vec<ProductVariant>,
        synced_at: DateTime<Utc>,
    ) -> ReconciliationResult {
        let mut result = ReconciliationResult::default();

        // Insertion-ordered so write ordering against the catalog stays
        // deterministic run over run.
        let mut external: IndexMap<String, VariantDraft> = IndexMap::with_capacity(drafts.len());
        for draft in drafts {
            if external.contains_key(&draft.supplier_product_id) {
                warn!(
                    supplier = %supplier.code,
                    vas = %vas_type,
                    key = %draft.supplier_product_id,
                    "duplicate supplier product id in listing; keeping first occurrence"
                );
                continue;
            }
            external.insert(draft.supplier_product_id.clone(), draft);
        }

        let by_key: HashMap<&str, &ProductVariant> = persisted
            .iter()
            .map(|v| (v.supplier_product_id.as_str(), v))
            .collect();

        for (key, draft) in &external {
            match by_key.get(key.as_str()).copied() {
                None => {
                    result.missing.push(key.clone());
                    if self.dry_run {
                        continue;
                    }
                    match self.apply(supplier, draft, None, synced_at).await {
                        Ok(()) => result.created.push(key.clone()),
                        Err(err) => {
                            result.failed += 1;
                            error!(
                                supplier = %supplier.code,
                                vas = %vas_type,
                                key = %key,
                                error = %err,
                                "failed to create variant; continuing with next record"
                            );
                        }
                    }
                }
                Some(existing) => {
                    if existing.product_name == draft.product_name
                        && existing.provider == draft.provider
                    {
                        continue;
                    }
                    result.mismatched.push(key.clone());
                    if self.dry_run {
                        continue;
                    }
                    match self.apply(supplier, draft, Some(existing), synced_at).await {
                        Ok(()) => result.updated.push(key.clone()),
                        Err(err) => {
                            result.failed += 1;
                            error!(
                                supplier = %supplier.code,
                                vas = %vas_type,
                                key = %key,
                                error = %err,
                                "failed to update variant; continuing with next record"
                            );
                        }
                    }
                }
            }
        }

        let mut extra: Vec<String> = persisted
            .iter()
            .filter(|v| !external.contains_key(v.supplier_product_id.as_str()))
            .map(|v| v.supplier_product_id.clone())
            .collect();
        extra.sort();
        result.extra = extra;

        debug!(
            supplier = %supplier.code,
            vas = %vas_type,
            missing = result.missing.len(),
            extra = result.extra.len(),
            mismatched = result.mismatched.len(),
            created = result.created.len(),
            updated = result.updated.len(),
            failed = result.failed,
            dry_run = self.dry_run,
            "reconciliation complete"
        );
        result
    }

    /// Write one record: find-or-create the brand, then the product, then
    /// insert or refresh the variant. All writes are local to this record.
    async fn apply(
        &self,
        supplier: &Supplier,
        draft: &VariantDraft,
        existing: Option<&ProductVariant>,
        synced_at: DateTime<Utc>,
    ) -> Result<(), SupplierError> {
        let brand = self.store.find_or_create_brand(&draft.brand_name).await?;
        let product = self
            .store
            .find_or_create_product(
                supplier.id,
                brand.id,
                &draft.product_name,
                draft.vas_type,
                &draft.supplier_product_id,
            )
            .await?;

        match existing {
            None => {
                self.store
                    .insert_variant(product.id, supplier.id, draft, synced_at)
                    .await?;
            }
            Some(variant) => {
                self.store
                    .update_variant(variant.id, product.id, draft, synced_at)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::mem::MemoryCatalogStore;
    use crate::vas::{NetworkScope, ProductStatus, TransactionType};
    use serde_json::json;

    fn draft(key: &str, name: &str, provider: &str) -> VariantDraft {
        VariantDraft {
            supplier_product_id: key.into(),
            product_name: name.into(),
            brand_name: provider.into(),
            vas_type: VasType::Airtime,
            transaction_type: TransactionType::Topup,
            network_scope: NetworkScope::Local,
            provider: provider.into(),
            min_amount: 500,
            max_amount: 100_000,
            denominations: None,
            commission: 3.0,
            fixed_fee: 0,
            is_promotional: false,
            discount_percent: None,
            priority: 10,
            status: ProductStatus::Active,
            metadata: json!({}),
            sort_order: 1,
            is_preferred: false,
        }
    }

    async fn supplier(store: &MemoryCatalogStore) -> Supplier {
        store
            .ensure_supplier("MOBILEMART", "Mobilemart", "https://api.test", 10)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn diff_reports_missing_extra_and_skips_unchanged() {
        let store = MemoryCatalogStore::new();
        let sup = supplier(&store).await;
        let now = Utc::now();
        store.seed_variant(&sup, &draft("P1", "One", "NetA"), now).await;
        store.seed_variant(&sup, &draft("P2", "Two", "NetA"), now).await;

        let persisted = store
            .variants_for_supplier(sup.id, VasType::Airtime)
            .await
            .unwrap();
        let reconciler = CatalogReconciler::new(&store, false);
        let result = reconciler
            .reconcile(
                &sup,
                VasType::Airtime,
                vec![draft("P2", "Two", "NetA"), draft("P3", "Three", "NetA")],
                persisted,
                now,
            )
            .await;

        assert_eq!(result.missing, vec!["P3".to_string()]);
        assert_eq!(result.extra, vec!["P1".to_string()]);
        assert!(result.mismatched.is_empty());
        assert_eq!(result.created, vec!["P3".to_string()]);
        assert!(result.updated.is_empty());
        assert_eq!(result.failed, 0);
        // extras are reported, never deleted
        assert_eq!(store.variant_count(), 3);
    }

    #[tokio::test]
    async fn mismatch_on_name_or_provider_updates_in_place() {
        let store = MemoryCatalogStore::new();
        let sup = supplier(&store).await;
        let now = Utc::now();
        store.seed_variant(&sup, &draft("P1", "Old Name", "NetA"), now).await;

        let persisted = store
            .variants_for_supplier(sup.id, VasType::Airtime)
            .await
            .unwrap();
        let reconciler = CatalogReconciler::new(&store, false);
        let result = reconciler
            .reconcile(
                &sup,
                VasType::Airtime,
                vec![draft("P1", "New Name", "NetA")],
                persisted,
                now,
            )
            .await;

        assert_eq!(result.mismatched, vec!["P1".to_string()]);
        assert_eq!(result.updated, vec!["P1".to_string()]);
        assert!(result.missing.is_empty());
        assert_eq!(store.variant_count(), 1);
        let variants = store.all_variants();
        assert_eq!(variants[0].product_name, "New Name");
    }

    #[tokio::test]
    async fn second_run_with_unchanged_catalog_is_a_no_op() {
        let store = MemoryCatalogStore::new();
        let sup = supplier(&store).await;
        let now = Utc::now();

        let listing = vec![draft("P1", "One", "NetA"), draft("P2", "Two", "NetB")];
        let reconciler = CatalogReconciler::new(&store, false);

        let first = reconciler
            .reconcile(&sup, VasType::Airtime, listing.clone(), Vec::new(), now)
            .await;
        assert_eq!(first.created.len(), 2);

        let persisted = store
            .variants_for_supplier(sup.id, VasType::Airtime)
            .await
            .unwrap();
        let second = reconciler
            .reconcile(&sup, VasType::Airtime, listing, persisted, now)
            .await;
        assert!(second.created.is_empty());
        assert!(second.updated.is_empty());
        assert!(second.missing.is_empty());
        assert!(second.mismatched.is_empty());
        assert_eq!(second.failed, 0);
        assert_eq!(store.variant_count(), 2);
    }

    #[tokio::test]
    async fn dry_run_computes_diff_without_writing() {
        let store = MemoryCatalogStore::new();
        let sup = supplier(&store).await;
        let now = Utc::now();

        let reconciler = CatalogReconciler::new(&store, true);
        let result = reconciler
            .reconcile(
                &sup,
                VasType::Airtime,
                vec![draft("P1", "One", "NetA")],
                Vec::new(),
                now,
            )
            .await;

        assert_eq!(result.missing, vec!["P1".to_string()]);
        assert!(result.created.is_empty());
        assert_eq!(store.variant_count(), 0);
    }

    #[tokio::test]
    async fn poisoned_record_does_not_stop_the_batch() {
        let store = MemoryCatalogStore::new();
        let sup = supplier(&store).await;
        let now = Utc::now();
        store.poison("P2");

        let reconciler = CatalogReconciler::new(&store, false);
        let result = reconciler
            .reconcile(
                &sup,
                VasType::Airtime,
                vec![
                    draft("P1", "One", "NetA"),
                    draft("P2", "Two", "NetA"),
                    draft("P3", "Three", "NetA"),
                ],
                Vec::new(),
                now,
            )
            .await;

        assert_eq!(result.failed, 1);
        assert_eq!(result.created, vec!["P1".to_string(), "P3".to_string()]);
        assert_eq!(store.variant_count(), 2);
    }

    #[tokio::test]
    async fn duplicate_listing_keys_keep_first_occurrence() {
        let store = MemoryCatalogStore::new();
        let sup = supplier(&store).await;
        let now = Utc::now();

        let reconciler = CatalogReconciler::new(&store, false);
        let result = reconciler
            .reconcile(
                &sup,
                VasType::Airtime,
                vec![draft("P1", "First", "NetA"), draft("P1", "Second", "NetA")],
                Vec::new(),
                now,
            )
            .await;

        assert_eq!(result.created, vec!["P1".to_string()]);
        let variants = store.all_variants();
        assert_eq!(variants[0].product_name, "First");
    }
}
