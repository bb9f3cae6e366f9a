// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Storage subsystem — series log + index + the store built on them.

pub mod index;
pub mod series_log;
pub mod store;

pub use store::LocalStore;
