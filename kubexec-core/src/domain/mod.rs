//! Core domain types
//!
//! This module contains the core domain structures used across kubexec crates.
//! Tasks are handed in by the calling scheduler; jobs are what the cluster runs
//! on their behalf.

pub mod job;
pub mod task;
