//! Typed row storage with constraint enforcement and slot reuse.

#[allow(clippy::module_inception)]
mod table;

#[cfg(test)]
mod tests;

pub use table::{Column, Row, SelectOptions, Table};
