use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("invalid handle")]
    InvalidHandle,

    #[error("out of memory")]
    OutOfMemory,

    /// Native failure code (`VkResult` or `HRESULT`).
    #[error("native call failed with {0:#x}")]
    Native(i32),

    #[error("device lost")]
    DeviceLost,
}

pub type Result<T> = std::result::Result<T, Error>;
