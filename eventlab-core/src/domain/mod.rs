//! Domain types shared by every component.

pub mod bar;

pub use bar::{Bar, BarField};
