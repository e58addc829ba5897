pub mod backend;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod drime;
pub mod slots;
