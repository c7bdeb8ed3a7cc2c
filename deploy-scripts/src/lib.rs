//! Scripts for deploying compiled contracts to a network.
//!
//! Configuration is resolved from the environment and a git-ignored secrets
//! file, and the targets of a deployment manifest are deployed in order, each
//! reported as deployed, failed or skipped.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod artifacts;
pub mod calldata;
pub mod cli;
pub mod client;
mod commands;
pub mod config;
pub mod constants;
pub mod deployer;
pub mod errors;
pub mod manifest;
pub mod report;
pub mod retry;
