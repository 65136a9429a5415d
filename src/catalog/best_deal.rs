//! Best-deal resolution across competing suppliers for one VAS type.
//!
//! Pure and deterministic so it can be property-tested independently of any
//! I/O. Strict tie-break cascade:
//! 1. highest commission;
//! 2. lowest effective price (lowest denomination, else min amount);
//! 3. the designated preferred supplier;
//! 4. lowest numeric priority;
//! 5. stable first-seen order.

use std::cmp::Ordering;

use crate::catalog::model::ProductVariant;

/// Pick the single winning variant, or `None` for an empty slate.
///
/// `preferred_supplier` is the platform-designated supplier id used at
/// tie-break step 3; callers resolve it from configuration (lowest
/// integration priority unless overridden).
pub fn select_best<'a>(
    variants: &'a [ProductVariant],
    preferred_supplier: Option<i64>,
) -> Option<&'a ProductVariant> {
    let mut best: Option<&ProductVariant> = None;
    for candidate in variants {
        match best {
            None => best = Some(candidate),
            // Strictly-better only, so the first-seen variant wins full ties.
            Some(incumbent) => {
                if beats(candidate, incumbent, preferred_supplier) {
                    best = Some(candidate);
                }
            }
        }
    }
    best
}

fn beats(challenger: &ProductVariant, incumbent: &ProductVariant, preferred: Option<i64>) -> bool {
    // NaN commissions rank as equal so one poisoned value cannot dominate.
    match challenger
        .commission
        .partial_cmp(&incumbent.commission)
        .unwrap_or(Ordering::Equal)
    {
        Ordering::Greater => return true,
        Ordering::Less => return false,
        Ordering::Equal => {}
    }

    match challenger.effective_price().cmp(&incumbent.effective_price()) {
        Ordering::Less => return true,
        Ordering::Greater => return false,
        Ordering::Equal => {}
    }

    if let Some(preferred) = preferred {
        let challenger_preferred = challenger.supplier_id == preferred;
        let incumbent_preferred = incumbent.supplier_id == preferred;
        if challenger_preferred != incumbent_preferred {
            return challenger_preferred;
        }
    }

    challenger.priority < incumbent.priority
}
