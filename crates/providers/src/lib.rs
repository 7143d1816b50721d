//! Completion and embedding providers for RelayDesk.
//!
//! All providers implement the `relaydesk_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod router;
pub mod unconfigured;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
pub use unconfigured::UnconfiguredProvider;
