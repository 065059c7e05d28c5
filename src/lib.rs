pub mod app;
pub mod ca;
pub mod cert;
pub mod chain;
pub mod cli;
pub mod genesis;
pub mod names;
pub mod node;
pub mod request;
pub mod storage;
pub mod utils;

// Re-export specific items to avoid conflicts
pub use cert::{CaRecord, CertificateParser, SigningKey, Template};
pub use chain::ChainClient;
pub use cli::{args, commands};
pub use names::DistinguishedName;
pub use request::RequestForm;
pub use utils::{errors, paths};
