//! Fixed-tick microstructural signal derivation.

pub mod processor;

pub use processor::SignalProcessor;
