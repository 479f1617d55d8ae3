//! Agent command protocol (ACP): slash-free commands typed as instructions.
//!
//! This module provides:
//! - [`AcpCommand`], the trait commands implement
//! - [`AcpCommandDescriptor`] with triggers, argument bounds and regex gates
//! - [`AcpCommandRegistry`] for registration and lookup
//! - [`AcpCommandRouter`], which matches an instruction to commands
//! - [`ChangeModeCommand`], a built-in `mode <key>` command

mod commands;
mod registry;
mod router;

pub use commands::ChangeModeCommand;
pub use registry::{
    AcpArgRule, AcpCommand, AcpCommandDescriptor, AcpCommandRegistry, AcpPriority,
    AcpRegistrationError,
};
pub use router::{parse_args, AcpCommandRouter, AcpRoute};

#[cfg(test)]
pub(crate) use registry::tests::command as test_command;
