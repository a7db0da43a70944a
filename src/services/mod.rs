pub mod cart;
pub mod checkout;
pub mod materializer;
pub mod orders;
pub mod payments;
pub mod snapshot;
pub mod sweeper;
