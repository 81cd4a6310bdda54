//! Data Transfer Objects for cluster communication
//!
//! This module contains the documents exchanged with the cluster batch API
//! and the task submissions read by the runner binary.

pub mod job;
pub mod manifest;
pub mod task;
