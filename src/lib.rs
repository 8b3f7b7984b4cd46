//! Policyhub - RBAC to ABAC policy compiler and engine distribution service
//!
//! This library provides the core functionality for the policyhub service.
//! It exposes all modules for testing purposes.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod jobs;
pub mod settings;
pub mod storage;
pub mod web;
