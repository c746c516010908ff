// ABOUTME: Library root for mygitops - exposes the release pipeline and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod batch;
pub mod config;
pub mod deploy;
pub mod error;
pub mod fanout;
pub mod git;
pub mod helm;
pub mod manifest;
pub mod notification;
pub mod release;
pub mod server;
pub mod sync;
pub mod types;
pub mod waitlist;
