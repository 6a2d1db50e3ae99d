use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the settlement engine for a single buy or sell.
///
/// Every variant except `PersistenceFailure` and `LedgerViewUnavailable` is
/// detected before any ledger mutation, so the ledger is untouched when one
/// of them is returned.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Student {student_id} has no balance for class {class_id}")]
    NotFound { student_id: Uuid, class_id: Uuid },

    #[error("Quote unavailable for {symbol}: {source}")]
    QuoteUnavailable {
        symbol: String,
        #[source]
        source: QuoteError,
    },

    #[error("Insufficient funds: need ${need}, available ${available}")]
    InsufficientFunds { need: Decimal, available: Decimal },

    #[error("Insufficient holdings of {symbol}: requested {requested}, held {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// The balance, lot and transaction writes did not commit. The trade is not settled.
    #[error("Trade not settled, ledger write failed: {0:#}")]
    PersistenceFailure(#[source] anyhow::Error),

    /// The trade committed but the refreshed ledger view could not be read back.
    #[error("Trade {transaction_id} settled but the ledger view could not be loaded: {source:#}")]
    LedgerViewUnavailable {
        transaction_id: Uuid,
        #[source]
        source: anyhow::Error,
    },
}

impl SettlementError {
    /// Stable machine-readable reason, one per variant.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SettlementError::NotFound { .. } => "not_found",
            SettlementError::QuoteUnavailable { .. } => "quote_unavailable",
            SettlementError::InsufficientFunds { .. } => "insufficient_funds",
            SettlementError::InsufficientHoldings { .. } => "insufficient_holdings",
            SettlementError::InvalidOrder { .. } => "invalid_order",
            SettlementError::PersistenceFailure(_) => "persistence_failure",
            SettlementError::LedgerViewUnavailable { .. } => "ledger_view_unavailable",
        }
    }

    /// HTTP status an outer surface should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            SettlementError::NotFound { .. } => 404,
            SettlementError::QuoteUnavailable { .. } => 503,
            SettlementError::InsufficientFunds { .. }
            | SettlementError::InsufficientHoldings { .. }
            | SettlementError::InvalidOrder { .. } => 400,
            SettlementError::PersistenceFailure(_)
            | SettlementError::LedgerViewUnavailable { .. } => 500,
        }
    }

    /// True when the trade was applied to the ledger despite the error.
    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementError::LedgerViewUnavailable { .. })
    }
}

/// Errors from the upstream quote provider
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Quote provider answered HTTP {status}")]
    Http { status: u16 },

    #[error("Quote for {symbol} carried no usable price")]
    MissingPrice { symbol: String },

    #[error("Quote request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Quote request failed: {0}")]
    Transport(String),

    #[error("Quote response could not be decoded: {0}")]
    Decode(String),
}

/// Errors raised while enrolling a student into a class
#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("Class {class_id} not found")]
    ClassNotFound { class_id: Uuid },

    #[error("Student {student_id} already joined class {class_id}")]
    AlreadyEnrolled { student_id: Uuid, class_id: Uuid },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
