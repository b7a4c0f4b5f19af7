//! Provider fetcher implementations.
//!
//! Each provider lives in its own module and implements the
//! [`Fetcher`](crate::traits::Fetcher) trait. Providers are independent;
//! new registries plug in by adding a module here and registering the
//! fetcher at startup.

pub mod conda;

pub use conda::CondaFetcher;
