pub mod models;
pub mod statistics;
pub mod validation;
