//! Report producers for scan results.

pub mod json;
pub mod sarif;
pub mod terminal;

use crate::pipeline::ScanResult;

pub use json::JsonReporter;
pub use sarif::SarifReporter;
pub use terminal::TerminalReporter;

pub trait Reporter {
    fn report(&self, result: &ScanResult) -> String;
}
