//! agentflow CLI library: the command implementations behind the
//! `agentflow` binary, exposed so they can be tested without a process.

pub mod commands;
