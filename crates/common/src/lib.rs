pub mod codec;
pub mod config;
pub mod observability;
pub mod solana;
pub mod store;
pub mod types;
