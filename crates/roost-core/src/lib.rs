//! Core library for Roost.
//!
//! Roost bootstraps an AI-companion workspace (rendered identity, profile and
//! memory documents plus one JSON configuration document), installs and
//! manages the dashboard service, and owns the embedded user database the
//! dashboard authenticates against.
//!
//! The modules map onto the bootstrap pipeline:
//!
//! - [`install`] — prerequisite checks and the clone → deps → build →
//!   record sequence.
//! - [`launch`] — detached dashboard process lifecycle with a pid file and a
//!   bounded HTTP readiness poll.
//! - [`users`] — SQLite user/session store with argon2-hashed generated
//!   passwords.
//! - [`workspace`] — template rendering and the on-disk workspace file set.
//! - [`doctor`] — read-only diagnostics over all of the above.
//! - [`update`] — release lookup and in-place dashboard update.

pub mod config;
pub mod doctor;
pub mod error;
pub mod install;
pub mod launch;
pub mod update;
pub mod users;
pub mod workspace;
