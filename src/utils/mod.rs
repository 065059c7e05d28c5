pub mod errors;
pub mod i18n;
pub mod output;
pub mod paths;
pub mod tasks;

pub use errors::*;
pub use output::*;
pub use paths::*;
