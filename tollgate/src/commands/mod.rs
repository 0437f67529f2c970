pub mod access;
pub mod check;
pub mod cleanup;
mod common;
pub mod import;
pub mod run;
