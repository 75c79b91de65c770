//! Application services layer.

pub mod catalog;
pub mod error;
pub mod pages;
pub mod provider;
pub mod repos;
pub mod search;
pub mod session;
