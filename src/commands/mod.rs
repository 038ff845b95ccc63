//! Host Commands Module

pub mod update;

pub use update::*;
