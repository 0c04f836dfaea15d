//! Guild Tracker Server
//!
//! Resolves which in-game guilds a Discord user can reach and which
//! management actions they hold inside each one.

pub mod access;
pub mod api;
pub mod config;
pub mod db;
pub mod identity;
