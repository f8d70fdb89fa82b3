//! Facade over the faultline crates: the translation/injection/redirection
//! engine is always available, the process-external target locator sits
//! behind the `locate` feature.

pub use faultline_core::*;

#[cfg(feature = "locate")]
pub mod locate {
    pub use faultline_locate::*;
}
