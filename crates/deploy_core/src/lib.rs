//! Deployment domain primitives.
//!
//! This crate owns naming, ownership tags, handler definitions, resource
//! specs with their diff rules, permission templates, and the dependency
//! package closure. It performs no provider calls and runs no async code;
//! `deploy_engine` drives these contracts against a provider.

pub mod arn;
pub mod config;
pub mod error;
pub mod handler;
pub mod inventory;
pub mod naming;
pub mod outcome;
pub mod packages;
pub mod permissions;
pub mod resolver;
pub mod resources;
pub mod tags;
