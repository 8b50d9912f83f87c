//! dcmon — a scriptable `docker-compose` log monitor.
//!
//! The host tails container logs and statuses; a user-supplied Lua
//! script (`dcmon.lua`) filters, rewrites, and groups the lines at run
//! time.  The [`script`] module is the embedding bridge between the two
//! worlds; everything else is the plumbing around it.

pub mod cli;
pub mod config;
pub mod fileutil;
pub mod filter;
pub mod history;
pub mod logline;
pub mod logstream;
pub mod script;
pub mod status;
