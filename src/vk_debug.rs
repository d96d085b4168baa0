//! Forwards validation layer messages into the log.

use std::sync::atomic::{AtomicU64, Ordering};

use erupt::vk;
#[cfg(feature = "tracing")]
use tracing1::{debug, error, info, warn};

static VALIDATION_ERRORS: AtomicU64 = AtomicU64::new(0);

/// Number of error messages the validation layers reported since the process started.
pub(crate) fn validation_error_count() -> u64 {
    VALIDATION_ERRORS.load(Ordering::Relaxed)
}

/// Callback function for the debug utils logging.
pub(crate) unsafe extern "system" fn debug_utils_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagBitsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if std::thread::panicking() {
        return vk::FALSE;
    }

    if message_severity == vk::DebugUtilsMessageSeverityFlagBitsEXT::ERROR_EXT {
        VALIDATION_ERRORS.fetch_add(1, Ordering::Relaxed);
    }

    let message = std::ffi::CStr::from_ptr((*p_callback_data).p_message);
    let ty = format!("{:?}", message_types);

    #[cfg(feature = "tracing")]
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagBitsEXT::ERROR_EXT => {
            error!("{} - {:?}", ty, message)
        }
        vk::DebugUtilsMessageSeverityFlagBitsEXT::WARNING_EXT => {
            warn!("{} - {:?}", ty, message)
        }
        vk::DebugUtilsMessageSeverityFlagBitsEXT::INFO_EXT => {
            info!("{} - {:?}", ty, message)
        }
        vk::DebugUtilsMessageSeverityFlagBitsEXT::VERBOSE_EXT => {
            debug!("{} - {:?}", ty, message)
        }
        _ => {
            warn!("{} - {:?}", ty, message);
        }
    }

    #[cfg(not(feature = "tracing"))]
    if message_severity == vk::DebugUtilsMessageSeverityFlagBitsEXT::ERROR_EXT {
        eprintln!("ERROR: {} - {:?}", ty, message);
    }

    vk::FALSE
}
