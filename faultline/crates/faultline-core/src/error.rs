use thiserror::Error;

/// Failures the engine reports to its immediate caller. None of these are
/// retried internally: a `NotMapped` address may become mapped later, but
/// waiting for that is the caller's business.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// The target process or its address space could not be resolved.
    #[error("no such process")]
    NoSuchProcess,
    /// A page-table level or leaf entry was absent at the requested address,
    /// or a frame read/write fell outside the provider's arena.
    #[error("address not mapped")]
    NotMapped,
    /// The requested bit position exceeds the operand width.
    #[error("target bit out of range")]
    OutOfRange,
}

impl EngineError {
    /// The negative integer status the device boundary replies with.
    pub fn status(self) -> i32 {
        match self {
            EngineError::NoSuchProcess => -libc::ESRCH,
            EngineError::NotMapped => -libc::EFAULT,
            EngineError::OutOfRange => -libc::EINVAL,
        }
    }
}
