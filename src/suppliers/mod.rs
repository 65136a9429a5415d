pub mod client;
pub mod config;
pub mod token;

pub use client::SupplierClient;
pub use config::SupplierConfig;
pub use token::TokenManager;
