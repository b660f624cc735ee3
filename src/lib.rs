//! Opal optimizer middle-end.
//!
//! The continuation-passing-style IR ([`ir`]) and the optimization passes
//! that run over it ([`opt`]).

pub mod ir;
pub mod opt;

pub use ir::{ClassWorld, CpsBuilder, CpsGraph};
pub use opt::sccp::Sccp;
