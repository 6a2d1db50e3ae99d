// Ledger entities and views
pub mod ledger;

// Pure settlement rules (funds, holdings, FIFO)
pub mod settlement;

// Portfolio valuation types
pub mod valuation;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
