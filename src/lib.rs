//! Archives photos, image/video documents and video records from a messaging
//! account's conversations into one folder per conversation.

pub mod api;
pub mod archive;
pub mod auth;
pub mod classify;
pub mod config;
pub mod conversations;
pub mod download;
pub mod error;
pub mod history;
pub mod model;
pub mod prompt;
pub mod selection;
pub mod walk;

pub use error::{ArchiveError, Result};
