#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate log;

pub mod auth;
pub mod errors;
pub mod routes;
pub mod state;
pub mod templates;

pub use state::Server;
