//! Credit-gated product photo generation: upload a product shot, run it
//! through a vendor generative-image backend, and get watermarked marketing
//! images plus ad copy, with a per-session credit ledger and run history.

pub mod api;
pub mod assets;
pub mod backend;
pub mod config;
pub mod credits;
pub mod error;
pub mod history;
pub mod image_ops;
pub mod payments;
pub mod session;
pub mod settings;
pub mod studio;

pub use error::StudioError;
pub use studio::Studio;
