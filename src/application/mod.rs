// Composition root wiring
pub mod bootstrap;

// Trade settlement
pub mod settlement;

// Daily portfolio valuation
pub mod valuation;

// System orchestrator
pub mod system;
