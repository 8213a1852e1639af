//! Typed access to the phishing scanner service.

pub mod apicall;
pub mod models;
pub mod queries;

pub use apicall::ScannerApi;
pub use queries::DashboardQueries;
