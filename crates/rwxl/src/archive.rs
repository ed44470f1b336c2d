//! Component D — archive (un)packing over the ZIP family (spec §4.5).

pub mod zip_container;

pub use zip_container::{extract, pack};
