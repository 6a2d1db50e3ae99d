pub mod core;
pub mod factory;
pub mod mock;
pub mod observability;
pub mod persistence;
pub mod quotes;
