// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Palaver messaging pipeline.
//!
//! This crate provides the error type, the domain types (tenants,
//! conversations, messages, agents, bookings), and the adapter traits that
//! the storage, provider, and channel crates implement.

pub mod error;
pub mod phone;
pub mod traits;
pub mod types;

pub use error::PalaverError;
pub use phone::normalize_phone;
pub use types::*;

pub use traits::{ChannelAdapter, PluginAdapter, ProviderAdapter, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_provider_adapter<T: ProviderAdapter>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_channel_adapter<T: ChannelAdapter>() {}
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;
        for variant in [AdapterType::Provider, AdapterType::Storage, AdapterType::Channel] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }
}
