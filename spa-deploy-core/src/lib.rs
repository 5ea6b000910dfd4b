#![doc = "spa-deploy-core: sync planning and execution for static single-page app deploys."]

//! This crate holds the reconciliation engine behind `spa-deploy`: it scans a local build
//! directory, lists the target bucket, derives a per-key sync plan, injects runtime
//! globals into index pages, applies the plan and invalidates the CDN.
//!
//! Backends (object store, CDN) are reached only through the traits in [`contract`], so
//! every step can run against the mocks generated by `mockall`.
//!
//! # Usage
//! The CLI crate wires AWS clients into [`deploy::prepare_deploy`] and
//! [`deploy::apply_deploy`]; tests drive the same functions with `MockObjectStore`.

pub mod config;
pub mod contract;
pub mod deploy;
pub mod error;
pub mod execute;
pub mod glob;
pub mod inject;
pub mod invalidate;
pub mod plan;
pub mod remote;
pub mod scan;
