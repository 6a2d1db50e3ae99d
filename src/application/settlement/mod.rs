pub mod engine;

pub use engine::{SettlementEngine, apply_buy, apply_sell};
