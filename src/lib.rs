#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod lock;
pub mod logging;
pub mod output;
pub mod select;
pub mod shell;
pub mod term;
