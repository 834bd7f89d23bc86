pub mod cache;
pub mod cart;
pub mod engine;
pub mod error;
pub mod identity;
pub mod memory;
pub mod model;
pub mod number;
pub mod pg;
pub mod reconciler;
pub mod storage;
