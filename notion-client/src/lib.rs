//! Rust client for the Notion REST API
//!
//! Wraps every call with the same policy:
//! - Bearer token + `Notion-Version` headers
//! - Fixed-interval throttling (default 2.5 requests/second)
//! - Exponential-backoff retry on 429/500/502/503 and transport errors
//!
//! The deploy engine talks to the API only through the [`NotionApi`] trait,
//! implemented here by the real [`NotionClient`], the network-free
//! [`DryRunApi`] and the recording [`MockApi`].
//!
//! # Example
//!
//! ```rust,no_run
//! use notion_client::{ClientConfig, NotionApi, NotionClient, ObjectKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NotionClient::new(ClientConfig {
//!     token: std::env::var("NOTION_TOKEN")?,
//!     ..Default::default()
//! })?;
//!
//! if let Some(id) = client.find_by_title(ObjectKind::Page, "Handbook").await? {
//!     println!("Handbook already exists: {}", id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod dry_run;
pub mod error;
pub mod mock;
pub mod retry;
pub mod throttle;
pub mod types;

// Re-export main types
pub use api::NotionApi;
pub use client::NotionClient;
pub use dry_run::DryRunApi;
pub use error::{NotionError, Result};
pub use mock::{MockApi, MockCall};
pub use retry::RetryPolicy;
pub use throttle::Throttle;
pub use types::*;
