//! # Dooray SDK
//!
//! Async Rust client for the Dooray collaboration REST API: wiki, projects,
//! messenger and calendar.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dooray_sdk::{DoorayClient, DoorayResult, Paging};
//!
//! #[tokio::main]
//! async fn main() -> DoorayResult<()> {
//!     let client = DoorayClient::builder()
//!         .api_key("your-dooray-api-token")
//!         .build()?;
//!
//!     let wikis = client.wiki().list(Paging::new(0, 20)).await?;
//!     println!("Found {} wikis", wikis.len());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod types;

pub use client::{DoorayClient, DoorayClientBuilder, API_KEY_ENV, BASE_URL_ENV};
pub use config::{ClientConfig, RetryConfig, DEFAULT_BASE_URL};
pub use error::{DoorayError, DoorayResult};
pub use types::{Body, DoorayResponse, Page, Paging, ResponseHeader};
