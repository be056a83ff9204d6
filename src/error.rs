use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The caller handed in a value the engine cannot map, such as a block
    /// number past the last supported epoch.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Allocating a cache or dataset buffer failed.
    #[error("failed to allocate {bytes} bytes for the {what}")]
    Allocation { what: &'static str, bytes: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
