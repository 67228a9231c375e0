// libs/availability-cell/src/services/mod.rs
pub mod slot_store;

pub use slot_store::SlotStore;
