pub mod access;
pub mod blob;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod state;
pub mod store;
pub mod vault;
pub mod web;
