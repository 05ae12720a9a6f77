//! Private admin console for grant requests.
//!
//! An authenticated operator creates grant requests, has a report generator ("Grant-Forge")
//! produce a PDF for each, downloads the report, and marks it delivered once it has been mailed
//! to the recipient. Each request moves through a forward-only lifecycle:
//!
//! ```text
//! created -> running -> generated -> delivered
//!    (any) -> archived
//! ```
//!
//! [`GrantConsole`] drives the lifecycle over a [`RequestStore`] (Postgres or in-memory), a
//! [`ReportGenerator`] and a [`Mailer`]; [`web::router`] exposes it over HTTP behind a single
//! operator credential.

pub mod config;
pub mod console;
pub mod domain;
pub mod error;
pub mod generator;
pub mod mailer;
pub mod request;
pub mod server;
pub mod storage;
pub mod web;

// Re-export commonly used types
pub use config::ConsoleConfig;
pub use console::GrantConsole;
pub use error::{ConsoleError, GenerationError, Result, SendError};
pub use generator::{MockReportGenerator, ReportGenerator};
pub use mailer::{Mailer, MockMailer};
pub use request::*;
pub use server::{build_console, start_server};
pub use storage::RequestStore;
pub use storage::memory::InMemoryRequestStore;
#[cfg(feature = "postgres")]
pub use storage::postgres::{PoolProvider, PostgresRequestStore, TestDbPools};

/// Get the grant console database migrator
///
/// Returns a migrator that can be run against a connection pool.
#[cfg(feature = "postgres")]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
