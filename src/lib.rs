//! Community playlist catalog with incrementally regenerated pages and a
//! deduplicating, revalidating request cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod regen;
