//! SchoolHub - school administration backend
//!
//! This library provides the core functionality for the SchoolHub service:
//! users and roles, the academic structure, enrollments, a hierarchical
//! grading engine, bulk roster import and per-role reporting.
//!
//! # Architecture
//! - `storage`: SeaORM storage backend and enum columns
//! - `grading`: weighted grade arithmetic and the recalculation engine
//! - `import`: CSV/XLSX roster parsing
//! - `services`: business operations with role checks
//! - `api`: HTTP handlers, routes and middleware
//! - `interfaces`: maintenance CLI
//! - `config`: Configuration management
//! - `runtime`: Application lifecycle and execution modes
//! - `system`: Logging initialization

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod grading;
pub mod import;
pub mod interfaces;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
