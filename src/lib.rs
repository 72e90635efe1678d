//! tarules: trading rules over memoized indicators, with a portable
//! descriptor form for whole rule graphs.
//!
//! Hexagonal layout: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
