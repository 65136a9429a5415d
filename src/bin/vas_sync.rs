use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{error, info, warn};

use vas_catalog::catalog::best_deal::select_best;
use vas_catalog::catalog::model::Supplier;
use vas_catalog::catalog::store::{CatalogStore, PgCatalogStore};
use vas_catalog::catalog::sync::SyncOrchestrator;
use vas_catalog::suppliers::{SupplierClient, SupplierConfig};
use vas_catalog::util::db::Db;
use vas_catalog::util::env as env_util;
use vas_catalog::vas::VasType;

#[derive(Parser, Debug)]
#[command(name = "vas_sync", version, about = "VAS supplier catalog sync CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // Allow `vas_sync --dry-run` without the explicit `run` subcommand.
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync supplier catalogs (default when no command supplied)
    Run(RunArgs),
    /// Pick the best-priced variant for a VAS type from the persisted catalog
    BestDeal(BestDealArgs),
    /// List configured supplier integrations
    Suppliers,
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Restrict to the specified supplier codes (comma-separated).
    /// Defaults to the VAS_SUPPLIERS env list.
    #[arg(long, value_delimiter = ',')]
    supplier: Vec<String>,
    /// Restrict to the specified VAS types (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    only: Vec<VasType>,
    /// Compute and report the diff without writing
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Run continuously with the specified delay in seconds between passes
    #[arg(long)]
    loop_secs: Option<u64>,
    /// Run a single pass (default)
    #[arg(long = "once", action = ArgAction::SetTrue)]
    once: bool,
}

#[derive(Debug, Args)]
struct BestDealArgs {
    /// VAS type to resolve
    #[arg(long, value_enum)]
    vas: VasType,
    /// Only consider variants able to fulfil this amount (minor units)
    #[arg(long)]
    amount: Option<i64>,
}

#[derive(Clone, Copy, Debug)]
enum LoopMode {
    Once,
    Continuous { sleep_secs: u64 },
}

const LOOP_SECS_ENV: &str = "VAS_SYNC_LOOP_SECS";

fn resolve_loop_mode(args: &RunArgs) -> LoopMode {
    if args.once {
        return LoopMode::Once;
    }
    if let Some(secs) = args.loop_secs {
        return LoopMode::Continuous { sleep_secs: secs };
    }
    if let Some(secs) = env_util::env_opt(LOOP_SECS_ENV).and_then(|raw| raw.trim().parse().ok()) {
        return LoopMode::Continuous { sleep_secs: secs };
    }
    // This is a batch reconciliation job; single pass unless asked otherwise.
    LoopMode::Once
}

fn configured_supplier_codes(args: &RunArgs) -> Result<Vec<String>> {
    let codes: Vec<String> = if !args.supplier.is_empty() {
        args.supplier.clone()
    } else {
        env_util::env_opt("VAS_SUPPLIERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };
    if codes.is_empty() {
        anyhow::bail!("no suppliers selected; pass --supplier or set VAS_SUPPLIERS");
    }
    Ok(codes.iter().map(|c| c.to_ascii_uppercase()).collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    vas_catalog::tracing::init_tracing("info")?;

    let cli = Cli::parse();
    let run_args = match cli.command {
        Some(Command::Run(args)) => args,
        Some(Command::BestDeal(args)) => return best_deal(args).await,
        Some(Command::Suppliers) => return list_suppliers(),
        None => cli.run,
    };

    env_util::preflight_check(
        "vas_sync",
        &["DATABASE_URL"],
        &["DATABASE_URL", "DB_MAX_CONNS", "VAS_SUPPLIERS", "PREFERRED_SUPPLIER"],
    )
    .ok();
    let database_url = env_util::db_url().context("no database URL configured for vas_sync")?;
    let max_conns: u32 = env_util::env_parse("DB_MAX_CONNS", 8u32);
    let db = Db::connect(&database_url, max_conns).await?;
    let store = PgCatalogStore::new(db);

    let codes = configured_supplier_codes(&run_args)?;
    let vas_types: Vec<VasType> = if run_args.only.is_empty() {
        VasType::ALL.to_vec()
    } else {
        run_args.only.clone()
    };

    let loop_mode = resolve_loop_mode(&run_args);
    let mut iteration = 0u64;
    loop {
        iteration += 1;
        info!(
            suppliers = %codes.join(","),
            vas_types = %vas_types.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(","),
            dry_run = run_args.dry_run,
            iteration,
            "sync pass start"
        );
        let pass_start = Instant::now();
        let mut any_fatal = false;

        for code in &codes {
            let config = match SupplierConfig::from_env(code) {
                Ok(cfg) => cfg,
                Err(err) => {
                    error!(supplier = %code, error = %err, "supplier misconfigured; skipping");
                    any_fatal = true;
                    continue;
                }
            };
            let client = match SupplierClient::new(&config) {
                Ok(c) => c,
                Err(err) => {
                    error!(supplier = %code, error = %err, "supplier client setup failed");
                    any_fatal = true;
                    continue;
                }
            };

            let orchestrator =
                SyncOrchestrator::new(&store, &config, run_args.dry_run, vas_types.clone());
            match orchestrator.run(&client).await {
                Ok(report) => {
                    for s in &report.summaries {
                        match &s.fatal_error {
                            Some(msg) => error!(
                                supplier = %report.supplier_code,
                                vas = %s.vas_type,
                                error = %msg,
                                "vas type failed"
                            ),
                            None => info!(
                                supplier = %report.supplier_code,
                                vas = %s.vas_type,
                                fetched = s.fetched,
                                filtered_out = s.filtered_out,
                                created = s.created,
                                updated = s.updated,
                                missing = s.missing,
                                extra = s.extra,
                                mismatched = s.mismatched,
                                failed = s.failed,
                                "vas type summary"
                            ),
                        }
                    }
                    if report.is_fatal() {
                        any_fatal = true;
                    }
                }
                Err(err) => {
                    error!(supplier = %code, error = %err, "sync run errored");
                    any_fatal = true;
                }
            }
        }

        info!(
            total_ms = pass_start.elapsed().as_millis() as u64,
            iteration,
            fatal = any_fatal,
            "sync pass complete"
        );

        match loop_mode {
            LoopMode::Once => {
                if any_fatal {
                    // Partial per-record drift is recoverable; a failed fetch
                    // or misconfigured supplier is not.
                    std::process::exit(1);
                }
                break;
            }
            LoopMode::Continuous { sleep_secs } => {
                let secs = sleep_secs.max(1);
                info!(sleep_secs = secs, "sleeping before next pass");
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
        }
    }

    Ok(())
}

/// Resolve the platform's designated preferred supplier: PREFERRED_SUPPLIER
/// code when set, otherwise the lowest integration priority.
fn resolve_preferred(suppliers: &[Supplier]) -> Option<i64> {
    if let Some(code) = env_util::env_opt("PREFERRED_SUPPLIER") {
        let code = code.to_ascii_uppercase();
        if let Some(s) = suppliers.iter().find(|s| s.code == code) {
            return Some(s.id);
        }
        warn!(code = %code, "PREFERRED_SUPPLIER does not match a provisioned supplier");
    }
    suppliers
        .iter()
        .min_by_key(|s| (s.priority, s.id))
        .map(|s| s.id)
}

async fn best_deal(args: BestDealArgs) -> Result<()> {
    let database_url = env_util::db_url().context("no database URL configured for vas_sync")?;
    let max_conns: u32 = env_util::env_parse("DB_MAX_CONNS", 4u32);
    let db = Db::connect_no_migrate(&database_url, max_conns).await?;
    let store = PgCatalogStore::new(db);

    let suppliers = store.list_suppliers().await?;
    let preferred = resolve_preferred(&suppliers);

    let mut variants = store.active_variants(args.vas).await?;
    if let Some(amount) = args.amount {
        variants.retain(|v| {
            let in_bounds = amount >= v.min_amount && amount <= v.max_amount;
            match &v.denominations {
                Some(denoms) => in_bounds && denoms.contains(&amount),
                None => in_bounds,
            }
        });
    }

    match select_best(&variants, preferred) {
        Some(winner) => {
            let supplier_code = suppliers
                .iter()
                .find(|s| s.id == winner.supplier_id)
                .map(|s| s.code.as_str())
                .unwrap_or("?");
            println!(
                "{} | {} | supplier={} | commission={}% | price_minor={} | priority={}",
                winner.supplier_product_id,
                winner.product_name,
                supplier_code,
                winner.commission,
                winner.effective_price(),
                winner.priority
            );
            Ok(())
        }
        None => {
            warn!(vas = %args.vas, "no eligible variants");
            std::process::exit(1);
        }
    }
}

fn list_suppliers() -> Result<()> {
    let codes = env_util::env_opt("VAS_SUPPLIERS").unwrap_or_default();
    let codes: Vec<&str> = codes
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if codes.is_empty() {
        println!("No suppliers configured (set VAS_SUPPLIERS).");
        return Ok(());
    }
    println!("Configured suppliers:");
    for (idx, code) in codes.iter().enumerate() {
        match SupplierConfig::from_env(code) {
            Ok(cfg) => println!(
                "  {:>2}. {:<12} api={} live={} priority={}",
                idx + 1,
                cfg.code,
                cfg.api_url,
                cfg.live_integration,
                cfg.priority
            ),
            Err(err) => println!("  {:>2}. {:<12} (misconfigured: {err})", idx + 1, code),
        }
    }
    Ok(())
}
