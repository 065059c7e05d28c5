//! Certificate requests: the CA selection form and CSR submission.

pub mod form;
pub mod submit;

pub use form::{CaOption, RequestForm};
pub use submit::{prepare_request, submit_request, CertificateRequest, PreparedRequest};
