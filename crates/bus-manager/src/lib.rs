#![no_std]
//! Bus lifecycle manager for shared peripheral access.
//!
//! A bus is opened by name on first acquisition and shared by every handle
//! until it is explicitly released. Release tears the bus down and hands the
//! underlying resources back to the manager, so a later acquisition can open
//! it again.

mod error;
mod factory;
mod handle;
mod manager;

pub use error::BusError;
pub use factory::BusFactory;
pub use handle::BusHandle;
pub use manager::{BusManager, MAX_BUS_ID_LEN};
