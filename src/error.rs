use thiserror::Error;

/// Errors that the conformance core can throw.
#[derive(Error, Debug)]
pub enum CtsError {
    /// A std::ffi::NulError.
    #[error(transparent)]
    NulError(#[from] std::ffi::NulError),
    /// A std::str::Utf8Error.
    #[error(transparent)]
    Utf8Error(#[from] std::str::Utf8Error),
    /// A std::io::Error.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// A std::num::TryFromIntError.
    #[error(transparent)]
    TryFromIntError(#[from] std::num::TryFromIntError),
    /// A erupt::LoaderError.
    #[error(transparent)]
    LoaderError(#[from] erupt::LoaderError),
    /// A erupt::vk::Result.
    #[error("vulkan error: {0}")]
    VkResult(#[from] erupt::vk::Result),
    /// A vk_alloc::AllocatorError.
    #[error(transparent)]
    VkAllocError(#[from] vk_alloc::AllocatorError),

    /// The device or the case configuration doesn't support the requested case.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A shader couldn't be compiled.
    #[error("can't compile shader '{name}': {log}")]
    ShaderCompilation {
        /// Name of the shader.
        name: String,
        /// The diagnostic output of the compiler.
        log: String,
    },

    /// A deferred operation finished without any worker observing a successful completion.
    #[error("deferred operation didn't report success on any worker")]
    DeferredOperationFailed,

    /// The implementation reported a maximal concurrency of zero for a deferred operation.
    #[error("deferred operation reported a maximal concurrency of zero")]
    DeferredOperationNoConcurrency,

    /// A handle into an acceleration structure arena is stale or was never issued.
    #[error("stale or unknown acceleration structure handle")]
    InvalidHandle,

    /// A top level structure references a bottom level structure that wasn't built yet.
    #[error("instanced bottom level acceleration structure is not built")]
    NotBuilt,

    /// The vertex or scratch memory of an acceleration structure was already released.
    #[error("acceleration structure build resources were released")]
    BuildResourcesReleased,

    /// A buffer that must be host visible has no mapped memory.
    #[error("buffer memory is not host visible")]
    BufferNotMapped,

    /// A worker thread panicked.
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// The requested device type couldn't be found.
    #[error("can't find device with requested capabilities")]
    RequestDeviceError,

    /// The requested queue family couldn't be found.
    #[error("can't find queue family: {0}")]
    QueueFamilyNotFound(String),
}

impl CtsError {
    /// Returns true if the error describes a missing capability and not a failure.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, CtsError::NotSupported(_))
    }
}
