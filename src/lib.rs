#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod sources;

mod render;
mod transform;
mod utils;
