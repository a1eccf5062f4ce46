//! Single module boundary over the pure domain crate.

pub use remedy_core::contract;
pub use remedy_core::identity;
pub use remedy_core::registry;
