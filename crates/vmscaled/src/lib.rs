//! vmscaled: the vmscale daemon and administration CLI.
//!
//! `vmscaled run` opens the store and drives one tick task per enabled VM
//! group. The remaining subcommands create and inspect the records the
//! engine evaluates, acting as the local root admin.

pub mod backends;
pub mod commands;
pub mod logging;
