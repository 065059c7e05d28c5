pub mod dn;
pub mod hierarchy;

pub use dn::{can_issue, DistinguishedName, Rdn};
pub use hierarchy::Hierarchy;
