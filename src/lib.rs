//! Keeps a local library of items from subscribed online playlists.
//!
//! [`App`] is the entry point. It combines the SQLite backed
//! [`Repository`], an [`Extractor`] that reads remote playlists and the
//! [`Updater`] that synchronizes the two.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod models;
pub mod player;
pub mod subscriptions;
pub mod sync;

pub use app::App;
pub use config::Config;
pub use db::Repository;
pub use error::{AppError, Result};
pub use extract::{Entry, Extractor, Metadata};
pub use sync::{UpdateOptions, UpdateReport, Updater};
