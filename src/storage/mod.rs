pub mod ledger;

pub use ledger::{AppState, Ledger, DEFAULT_LIST_LIMIT};
