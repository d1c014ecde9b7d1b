//! Gmail filter manager
//!
//! Command-line tooling that keeps a Gmail account's server-side filters in
//! sync with a declarative configuration file.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 authorization-code flow over a loopback
//!   redirect, with a per-installation token cache
//! - **Labels**: listing, and translation of label names to label IDs
//! - **Filters**: listing, bulk deletion and bulk creation
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_filters::{auth, client::ProductionGmailClient, FilterManager, FiltersConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FiltersConfig::load("filters.yaml".as_ref()).await?;
//!
//!     // Uses the cached token, or walks the user through the browser flow
//!     let hub = auth::authenticate("me", &auth::AuthOptions::default()).await?;
//!     let client = ProductionGmailClient::new(hub, "me");
//!
//!     let report = FilterManager::new(&client).upload_filters(config.filters).await?;
//!     println!("created {} filters", report.succeeded);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - Client credentials, authorization flow, token exchange
//! - [`cache`] - Local token cache
//! - [`callback`] - Loopback listener for the OAuth redirect
//! - [`client`] - Gmail API client trait and production implementation
//! - [`cli`] - Command-line interface and command dispatch
//! - [`config`] - Filter configuration file
//! - [`error`] - Error types and result aliases
//! - [`filter_manager`] - Bulk filter operations
//! - [`label_manager`] - Label listing and name resolution
//! - [`models`] - Core data structures

pub mod auth;
pub mod cache;
pub mod callback;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod filter_manager;
pub mod label_manager;
pub mod models;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

pub use models::{FilterAction, FilterCriteria, FilterSpec, OAuthToken, TokenMap};

pub use auth::{AuthOptions, AuthorizationFlow, TokenEndpoint};
pub use cache::TokenCache;
pub use callback::CallbackListener;
pub use client::{ExistingFilter, GmailClient, LabelInfo, ProductionGmailClient};
pub use config::FiltersConfig;
pub use filter_manager::{BatchReport, FilterManager};
pub use label_manager::{LabelManager, LabelMap};

pub use cli::{Cli, Commands};
