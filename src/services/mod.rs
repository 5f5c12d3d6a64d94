pub mod audit;
pub mod ledger;

pub use audit::AuditService;
pub use ledger::{BalanceSummary, LedgerService};
