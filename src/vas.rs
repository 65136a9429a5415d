//! Closed VAS type enumeration and the single canonicalization path.
//!
//! Supplier APIs and legacy call sites use a handful of spellings for the
//! same categories (`utility`, `billpayment`, ...). Everything inside this
//! crate works with [`VasType`]; raw strings are converted exactly once at
//! the edges via [`VasType::canonicalize`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VasType {
    Airtime,
    Data,
    Electricity,
    #[value(name = "bill_payment", alias = "billpayment")]
    BillPayment,
    Voucher,
}

impl VasType {
    /// Fixed sync order for a full catalog run.
    pub const ALL: [VasType; 5] = [
        VasType::Airtime,
        VasType::Data,
        VasType::Electricity,
        VasType::BillPayment,
        VasType::Voucher,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VasType::Airtime => "airtime",
            VasType::Data => "data",
            VasType::Electricity => "electricity",
            VasType::BillPayment => "bill_payment",
            VasType::Voucher => "voucher",
        }
    }

    /// Path segment used by the supplier listing/purchase endpoints.
    pub fn endpoint_segment(self) -> &'static str {
        match self {
            VasType::BillPayment => "billpayment",
            other => other.as_str(),
        }
    }

    /// Map a raw supplier/legacy spelling onto the closed enum.
    ///
    /// `utility` is the legacy alias for electricity; `billpayment` and
    /// `bill-payment` collapse onto `bill_payment`. Unknown labels are an
    /// error rather than a silent pass-through.
    pub fn canonicalize(raw: &str) -> Option<VasType> {
        let v = raw.trim().to_ascii_lowercase();
        match v.as_str() {
            "airtime" => Some(VasType::Airtime),
            "data" => Some(VasType::Data),
            "electricity" | "utility" => Some(VasType::Electricity),
            "bill_payment" | "billpayment" | "bill-payment" => Some(VasType::BillPayment),
            "voucher" => Some(VasType::Voucher),
            _ => None,
        }
    }
}

impl fmt::Display for VasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VasType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VasType::canonicalize(s).ok_or_else(|| anyhow::anyhow!("unknown VAS type: {s}"))
    }
}

/// How a purchased variant is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Direct account/number top-up (pinless airtime/data).
    Topup,
    /// Yields a redeemable PIN/voucher code.
    Voucher,
    /// Direct fulfilment without a PIN (bill settlement and similar).
    Direct,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Topup => "topup",
            TransactionType::Voucher => "voucher",
            TransactionType::Direct => "direct",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkScope {
    Local,
    International,
}

impl NetworkScope {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkScope::Local => "local",
            NetworkScope::International => "international",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }
}
