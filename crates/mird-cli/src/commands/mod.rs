//! Subcommands of the `mird` binary.

pub mod checksum;
pub mod fetch;
pub mod list;
pub mod verify;
