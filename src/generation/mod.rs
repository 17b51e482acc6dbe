//! Generations module split into submodules:
//! - handle.rs: GenRecord (reader counter + weak handle slot) and GenHandle (shared pin token).
//! - table.rs: GenTable (live/committed/floor generations, pin/pin_at, reclamation).

mod handle;
mod table;

pub use handle::{GenHandle, GenRecord};
pub use table::GenTable;
