//! Tempo change without pitch change (WSOLA) and its tuning parameters.

pub mod params;
pub mod wsola;

pub use params::{StretchSettings, WsolaParams};
pub use wsola::Wsola;
