//! Transport layer for the Dooray SDK.

pub mod http;

pub use http::HttpTransport;
