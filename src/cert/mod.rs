pub mod builder;
pub mod keys;
pub mod metadata;
pub mod parser;
pub mod serial;
pub mod template;

pub use builder::{apply_csr, create_csr, parse_date, self_sign};
pub use keys::{PublicKey, SigningKey};
pub use metadata::{CaColumn, CaRecord, CertEntity, CertRole};
pub use parser::{CertificateParser, ParsedCertificate, ParsedCsr};
pub use serial::SerialNumber;
pub use template::{ExtensionProfile, Template, TemplateOptions};
