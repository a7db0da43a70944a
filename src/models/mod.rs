pub mod cart_snapshot;

pub use cart_snapshot::{Address, CartSnapshot, SnapshotLine};
