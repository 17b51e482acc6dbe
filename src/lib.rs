#![allow(non_snake_case)]

// Базовые модули
pub mod config;
pub mod metrics;

// Цепочки версий и поколения
pub mod chain;      // src/chain/{mod,node}.rs
pub mod generation; // src/generation/{mod,handle,table}.rs

// Хранилище: чтение, сессии записи, снапшоты, сборка мусора
pub mod store;      // src/store/{mod,read,write,snapshot,collect}.rs

// Фоновый сборщик
pub mod scavenger;

// Удобные реэкспорты
pub use chain::{Link, VersionNode};
pub use config::{CacheConfig, StoreBuilder};
pub use generation::{GenHandle, GenRecord, GenTable};
pub use scavenger::Scavenger;
pub use store::{CollectReport, ContentStore, Snapshot, StoreStats, WriteSession};
