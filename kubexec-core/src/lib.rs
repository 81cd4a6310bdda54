//! Kubexec Core
//!
//! Core types and abstractions for the kubexec job executor.
//!
//! This crate contains:
//! - Domain types: tasks, job identifiers, job statuses and outcomes
//! - DTOs: cluster job documents exchanged with the batch API

pub mod domain;
pub mod dto;
