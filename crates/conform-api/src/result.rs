// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

/// Result codes a runtime may return. Non-negative values are successes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Success = 0,
    TimeoutExpired = 1,
    SessionLossPending = 3,
    ErrorValidationFailure = -1,
    ErrorRuntimeFailure = -2,
    ErrorOutOfMemory = -3,
    ErrorLimitReached = -10,
    ErrorSizeInsufficient = -11,
    ErrorHandleInvalid = -12,
    ErrorSessionLost = -17,
    ErrorSwapchainFormatUnsupported = -26,
    ErrorCallOrderInvalid = -37,
}

/// `Err` carries the failure code; success codes other than
/// [`ResultCode::Success`] are expressed in the `Ok` type where they matter.
pub type XrResult<T> = Result<T, ResultCode>;

impl ResultCode {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn succeeded(self) -> bool {
        self.as_raw() >= 0
    }

    pub fn name(self) -> &'static str {
        match self {
            ResultCode::Success => "XR_SUCCESS",
            ResultCode::TimeoutExpired => "XR_TIMEOUT_EXPIRED",
            ResultCode::SessionLossPending => "XR_SESSION_LOSS_PENDING",
            ResultCode::ErrorValidationFailure => "XR_ERROR_VALIDATION_FAILURE",
            ResultCode::ErrorRuntimeFailure => "XR_ERROR_RUNTIME_FAILURE",
            ResultCode::ErrorOutOfMemory => "XR_ERROR_OUT_OF_MEMORY",
            ResultCode::ErrorLimitReached => "XR_ERROR_LIMIT_REACHED",
            ResultCode::ErrorSizeInsufficient => "XR_ERROR_SIZE_INSUFFICIENT",
            ResultCode::ErrorHandleInvalid => "XR_ERROR_HANDLE_INVALID",
            ResultCode::ErrorSessionLost => "XR_ERROR_SESSION_LOST",
            ResultCode::ErrorSwapchainFormatUnsupported => "XR_ERROR_SWAPCHAIN_FORMAT_UNSUPPORTED",
            ResultCode::ErrorCallOrderInvalid => "XR_ERROR_CALL_ORDER_INVALID",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::error::Error for ResultCode {}
