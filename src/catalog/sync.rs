//! Drives fetch → normalize → reconcile across the configured VAS types for
//! one supplier and emits a structured summary report.
//!
//! Failure policy: an authentication failure ends the run (every later VAS
//! type would fail the same way); a fetch failure ends only the current VAS
//! type; per-record failures are absorbed by the reconciler's bulkhead. The
//! report always reflects exactly the work done.

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::fetch::{CatalogFetcher, FetchOutcome};
use crate::catalog::model::Supplier;
use crate::catalog::normalize::{normalize, NormalizeContext};
use crate::catalog::reconcile::CatalogReconciler;
use crate::catalog::store::CatalogStore;
use crate::error::SupplierError;
use crate::suppliers::{SupplierClient, SupplierConfig};
use crate::vas::VasType;

#[derive(Debug, Clone, Serialize)]
pub struct VasTypeSummary {
    pub vas_type: VasType,
    pub fetched: usize,
    pub filtered_out: usize,
    pub created: usize,
    pub updated: usize,
    pub missing: usize,
    pub extra: usize,
    pub mismatched: usize,
    pub failed: usize,
    /// Fetch/auth failure message; set when this VAS type never reached
    /// reconciliation.
    pub fatal_error: Option<String>,
}

impl VasTypeSummary {
    fn empty(vas_type: VasType) -> Self {
        Self {
            vas_type,
            fetched: 0,
            filtered_out: 0,
            created: 0,
            updated: 0,
            missing: 0,
            extra: 0,
            mismatched: 0,
            failed: 0,
            fatal_error: None,
        }
    }

    fn fatal(vas_type: VasType, err: &SupplierError) -> Self {
        let mut s = Self::empty(vas_type);
        s.fatal_error = Some(err.to_string());
        s
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub supplier_code: String,
    pub dry_run: bool,
    pub started_at: chrono::DateTime<Utc>,
    pub finished_at: chrono::DateTime<Utc>,
    pub summaries: Vec<VasTypeSummary>,
    /// Total per-record failures across all VAS types.
    pub record_errors: usize,
}

impl SyncReport {
    /// Total fetch failure is unrecoverable; partial catalog drift is not.
    pub fn is_fatal(&self) -> bool {
        self.summaries.iter().any(|s| s.fatal_error.is_some())
    }

    pub fn status(&self) -> &'static str {
        if self.is_fatal() {
            "failed"
        } else if self.record_errors > 0 {
            "partial"
        } else {
            "ok"
        }
    }
}

pub struct SyncOrchestrator<'a, S: CatalogStore + ?Sized> {
    store: &'a S,
    config: &'a SupplierConfig,
    dry_run: bool,
    vas_types: Vec<VasType>,
}

impl<'a, S: CatalogStore + ?Sized> SyncOrchestrator<'a, S> {
    pub fn new(store: &'a S, config: &'a SupplierConfig, dry_run: bool, vas_types: Vec<VasType>) -> Self {
        Self {
            store,
            config,
            dry_run,
            vas_types,
        }
    }

    /// Run the full pipeline for this supplier and persist the run report
    /// (best-effort) to `sync_runs`.
    pub async fn run(&self, client: &SupplierClient) -> anyhow::Result<SyncReport> {
        let started_at = Utc::now();
        let supplier = self
            .store
            .ensure_supplier(
                &self.config.code,
                &self.config.display_name,
                &self.config.api_url,
                self.config.priority,
            )
            .await?;

        let fetcher = CatalogFetcher::new(client);
        let mut summaries = Vec::with_capacity(self.vas_types.len());
        let mut record_errors = 0usize;

        for vas_type in self.vas_types.iter().copied() {
            match fetcher.fetch(vas_type).await {
                Ok(outcome) => {
                    let summary = self.apply_listing(&supplier, vas_type, outcome).await;
                    record_errors += summary.failed;
                    summaries.push(summary);
                }
                Err(err) => {
                    error!(
                        supplier = %supplier.code,
                        vas = %vas_type,
                        error = %err,
                        "catalog fetch failed"
                    );
                    let run_fatal = err.is_fatal_for_run();
                    summaries.push(VasTypeSummary::fatal(vas_type, &err));
                    if run_fatal {
                        // Re-authentication is broken; later types would
                        // fail identically.
                        warn!(
                            supplier = %supplier.code,
                            "authentication failure; aborting remaining VAS types"
                        );
                        break;
                    }
                }
            }
        }

        let report = SyncReport {
            supplier_code: supplier.code.clone(),
            dry_run: self.dry_run,
            started_at,
            finished_at: Utc::now(),
            summaries,
            record_errors,
        };

        match serde_json::to_value(&report) {
            Ok(summary_json) => {
                if let Err(err) = self
                    .store
                    .record_sync_run(
                        &report.supplier_code,
                        report.dry_run,
                        report.started_at,
                        report.finished_at,
                        report.status(),
                        &summary_json,
                    )
                    .await
                {
                    warn!(error = %err, "failed to record sync run; continuing");
                }
            }
            Err(err) => warn!(error = %err, "sync report not serializable; run not recorded"),
        }

        info!(
            supplier = %report.supplier_code,
            status = report.status(),
            dry_run = report.dry_run,
            record_errors = report.record_errors,
            "sync run complete"
        );
        Ok(report)
    }

    /// Normalize a fetched listing and reconcile it against the persisted
    /// catalog for one VAS type. Split out from [`run`] so the pipeline can
    /// be exercised without HTTP plumbing.
    pub async fn apply_listing(
        &self,
        supplier: &Supplier,
        vas_type: VasType,
        outcome: FetchOutcome,
    ) -> VasTypeSummary {
        let mut summary = VasTypeSummary::empty(vas_type);
        summary.fetched = outcome.fetched;
        summary.filtered_out = outcome.filtered_out;
        // Unparseable listing entries count as record failures.
        summary.failed = outcome.malformed;

        let synced_at = Utc::now();
        let ctx = NormalizeContext {
            supplier_code: &supplier.code,
            supplier_priority: supplier.priority,
            synced_at,
        };

        let mut drafts = Vec::with_capacity(outcome.records.len());
        for record in &outcome.records {
            match normalize(record, vas_type, &ctx) {
                Ok(draft) => drafts.push(draft),
                Err(err) => {
                    summary.failed += 1;
                    error!(
                        supplier = %supplier.code,
                        vas = %vas_type,
                        key = %record.merchant_product_id,
                        error = %err,
                        "record failed normalization; continuing with next record"
                    );
                }
            }
        }

        let persisted = match self
            .store
            .variants_for_supplier(supplier.id, vas_type)
            .await
        {
            Ok(v) => v,
            Err(err) => {
                // Without the persisted side there is no diff to compute.
                error!(
                    supplier = %supplier.code,
                    vas = %vas_type,
                    error = %err,
                    "failed to load persisted variants"
                );
                summary.fatal_error = Some(err.to_string());
                return summary;
            }
        };

        let reconciler = CatalogReconciler::new(self.store, self.dry_run);
        let result = reconciler
            .reconcile(supplier, vas_type, drafts, persisted, synced_at)
            .await;

        summary.created = result.created.len();
        summary.updated = result.updated.len();
        summary.missing = result.missing.len();
        summary.extra = result.extra.len();
        summary.mismatched = result.mismatched.len();
        summary.failed += result.failed;

        info!(
            supplier = %supplier.code,
            vas = %vas_type,
            fetched = summary.fetched,
            filtered_out = summary.filtered_out,
            created = summary.created,
            updated = summary.updated,
            missing = summary.missing,
            extra = summary.extra,
            mismatched = summary.mismatched,
            failed = summary.failed,
            dry_run = self.dry_run,
            "vas type synced"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::ExternalProductRecord;
    use crate::catalog::store::mem::MemoryCatalogStore;

    fn config() -> SupplierConfig {
        SupplierConfig {
            code: "MOBILEMART".into(),
            display_name: "Mobilemart".into(),
            api_url: "https://api.test".into(),
            token_url: "https://auth.test/token".into(),
            client_id: None,
            client_secret: None,
            live_integration: false,
            priority: 10,
        }
    }

    fn record(key: &str, name: &str) -> ExternalProductRecord {
        ExternalProductRecord {
            merchant_product_id: key.into(),
            product_name: name.into(),
            content_creator: Some("TestNet".into()),
            pinned: false,
            fixed_amount: true,
            amount: Some(10.0),
            minimum_amount: None,
            maximum_amount: None,
            commission: Some(2.0),
            fixed_fee: None,
        }
    }

    fn outcome(records: Vec<ExternalProductRecord>) -> FetchOutcome {
        let fetched = records.len();
        FetchOutcome {
            records,
            fetched,
            filtered_out: 0,
            malformed: 0,
        }
    }

    #[tokio::test]
    async fn listing_flows_through_normalize_and_reconcile() {
        let store = MemoryCatalogStore::new();
        let cfg = config();
        let orchestrator = SyncOrchestrator::new(&store, &cfg, false, vec![VasType::Airtime]);
        let supplier = store
            .ensure_supplier(&cfg.code, &cfg.display_name, &cfg.api_url, cfg.priority)
            .await
            .unwrap();

        let summary = orchestrator
            .apply_listing(
                &supplier,
                VasType::Airtime,
                outcome(vec![record("P1", "R10 Airtime"), record("P2", "R20 Airtime")]),
            )
            .await;

        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.failed, 0);
        assert!(summary.fatal_error.is_none());
        assert_eq!(store.variant_count(), 2);
        let variants = store.all_variants();
        assert!(variants.iter().all(|v| v.min_amount == 1000));
    }

    #[tokio::test]
    async fn malformed_record_is_counted_not_fatal() {
        let store = MemoryCatalogStore::new();
        let cfg = config();
        let orchestrator = SyncOrchestrator::new(&store, &cfg, false, vec![VasType::Airtime]);
        let supplier = store
            .ensure_supplier(&cfg.code, &cfg.display_name, &cfg.api_url, cfg.priority)
            .await
            .unwrap();

        let mut bad = record("P1", "Broken");
        bad.amount = None; // fixedAmount with no amount fails normalization
        let summary = orchestrator
            .apply_listing(
                &supplier,
                VasType::Airtime,
                outcome(vec![bad, record("P2", "Fine")]),
            )
            .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
        assert!(summary.fatal_error.is_none());
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let store = MemoryCatalogStore::new();
        let cfg = config();
        let orchestrator = SyncOrchestrator::new(&store, &cfg, true, vec![VasType::Airtime]);
        let supplier = store
            .ensure_supplier(&cfg.code, &cfg.display_name, &cfg.api_url, cfg.priority)
            .await
            .unwrap();

        let summary = orchestrator
            .apply_listing(&supplier, VasType::Airtime, outcome(vec![record("P1", "A")]))
            .await;

        assert_eq!(summary.missing, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(store.variant_count(), 0);
    }

    #[tokio::test]
    async fn sync_run_bookkeeping_stores_the_report() {
        let store = MemoryCatalogStore::new();
        let report = SyncReport {
            supplier_code: "MOBILEMART".into(),
            dry_run: true,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            summaries: vec![VasTypeSummary::empty(VasType::Airtime)],
            record_errors: 0,
        };
        let summary_json = serde_json::to_value(&report).unwrap();
        store
            .record_sync_run(
                &report.supplier_code,
                report.dry_run,
                report.started_at,
                report.finished_at,
                report.status(),
                &summary_json,
            )
            .await
            .unwrap();
        assert_eq!(store.sync_run_count(), 1);
    }

    #[test]
    fn report_status_reflects_failure_classes() {
        let base = SyncReport {
            supplier_code: "MOBILEMART".into(),
            dry_run: false,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            summaries: vec![VasTypeSummary::empty(VasType::Airtime)],
            record_errors: 0,
        };
        assert_eq!(base.status(), "ok");
        assert!(!base.is_fatal());

        let mut partial = base.clone();
        partial.record_errors = 3;
        assert_eq!(partial.status(), "partial");
        assert!(!partial.is_fatal());

        let mut failed = base.clone();
        failed.summaries = vec![VasTypeSummary::fatal(
            VasType::Airtime,
            &SupplierError::RequestFailed {
                status: 503,
                body: "upstream down".into(),
            },
        )];
        assert_eq!(failed.status(), "failed");
        assert!(failed.is_fatal());
    }
}
