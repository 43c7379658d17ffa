//! Remote FHIR server access.

mod http;

pub use http::HttpDataSource;
