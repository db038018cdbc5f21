// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Storage subsystem: metadata index + blob directory + store façade.

pub mod blob;
pub mod handle;
pub mod index;
pub mod store;

pub use handle::FileHandle;
pub use index::{Entry, WILDCARD_MIME};
pub use store::{FileStat, ReconcileReport, TempStore};
