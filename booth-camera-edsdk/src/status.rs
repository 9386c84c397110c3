//! EDSDK status codes and their mapping onto `CameraError`.
//!
//! Kept free of FFI so the mapping is testable on every platform.

use booth_camera_core::models::error::CameraError;

pub const EDS_ERR_OK: u32 = 0x0000_0000;
pub const EDS_ERR_INTERNAL_ERROR: u32 = 0x0000_0002;
pub const EDS_ERR_OPERATION_CANCELLED: u32 = 0x0000_0005;
pub const EDS_ERR_NOT_SUPPORTED: u32 = 0x0000_0007;
pub const EDS_ERR_INVALID_PARAMETER: u32 = 0x0000_0060;
pub const EDS_ERR_INVALID_HANDLE: u32 = 0x0000_0061;
pub const EDS_ERR_DEVICE_NOT_FOUND: u32 = 0x0000_0080;
pub const EDS_ERR_DEVICE_BUSY: u32 = 0x0000_0081;
pub const EDS_ERR_COMM_DISCONNECTED: u32 = 0x0000_00C1;
pub const EDS_ERR_SESSION_NOT_OPEN: u32 = 0x0000_2003;
pub const EDS_ERR_TAKE_PICTURE_AF_NG: u32 = 0x0000_8D01;
pub const EDS_ERR_TAKE_PICTURE_NO_CARD_NG: u32 = 0x0000_8D06;
pub const EDS_ERR_TAKE_PICTURE_NO_LENS_NG: u32 = 0x0000_8D0B;
pub const EDS_ERR_LOW_BATTERY: u32 = 0x0000_A101;
pub const EDS_ERR_OBJECT_NOTREADY: u32 = 0x0000_A102;

/// Human-readable name of an EDSDK status code.
pub fn describe(code: u32) -> &'static str {
    match code {
        EDS_ERR_OK => "OK",
        EDS_ERR_INTERNAL_ERROR => "internal error",
        EDS_ERR_OPERATION_CANCELLED => "operation cancelled",
        EDS_ERR_NOT_SUPPORTED => "not supported",
        EDS_ERR_INVALID_PARAMETER => "invalid parameter",
        EDS_ERR_INVALID_HANDLE => "invalid handle",
        EDS_ERR_DEVICE_NOT_FOUND => "device not found",
        EDS_ERR_DEVICE_BUSY => "device busy",
        EDS_ERR_COMM_DISCONNECTED => "communication disconnected",
        EDS_ERR_SESSION_NOT_OPEN => "session not open",
        EDS_ERR_TAKE_PICTURE_AF_NG => "auto-focus failed",
        EDS_ERR_TAKE_PICTURE_NO_CARD_NG => "no memory card",
        EDS_ERR_TAKE_PICTURE_NO_LENS_NG => "no lens attached",
        EDS_ERR_LOW_BATTERY => "low battery",
        EDS_ERR_OBJECT_NOTREADY => "object not ready",
        _ => "unknown error",
    }
}

/// Map a non-OK status returned by `operation` to a `CameraError`.
///
/// Unplug-like codes become `DeviceNotFound` so the sequencer's presence
/// check takes over. Codes with no specific meaning fall back to `fallback`,
/// typically the variant that matches the operation.
pub fn to_camera_error(code: u32, operation: &str, fallback: fn(String) -> CameraError) -> CameraError {
    let message = format!("{}: {} (0x{:08X})", operation, describe(code), code);
    match code {
        EDS_ERR_DEVICE_NOT_FOUND | EDS_ERR_COMM_DISCONNECTED => CameraError::DeviceNotFound(message),
        EDS_ERR_DEVICE_BUSY | EDS_ERR_OBJECT_NOTREADY => CameraError::DeviceBusy(message),
        EDS_ERR_SESSION_NOT_OPEN | EDS_ERR_INVALID_HANDLE => CameraError::InvalidState(message),
        EDS_ERR_TAKE_PICTURE_AF_NG
        | EDS_ERR_TAKE_PICTURE_NO_CARD_NG
        | EDS_ERR_TAKE_PICTURE_NO_LENS_NG
        | EDS_ERR_LOW_BATTERY => CameraError::CaptureFailed(message),
        EDS_ERR_OPERATION_CANCELLED => CameraError::Cancelled,
        _ => fallback(message),
    }
}

/// `Ok(())` for `EDS_ERR_OK`, the mapped error otherwise.
pub fn check(code: u32, operation: &str, fallback: fn(String) -> CameraError) -> Result<(), CameraError> {
    if code == EDS_ERR_OK {
        Ok(())
    } else {
        Err(to_camera_error(code, operation, fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_passes() {
        assert!(check(EDS_ERR_OK, "open session", CameraError::DeviceBusy).is_ok());
    }

    #[test]
    fn unplug_codes_map_to_device_not_found() {
        assert!(matches!(
            to_camera_error(EDS_ERR_DEVICE_NOT_FOUND, "connect", CameraError::DeviceBusy),
            CameraError::DeviceNotFound(_)
        ));
        assert!(matches!(
            to_camera_error(EDS_ERR_COMM_DISCONNECTED, "download evf", CameraError::LiveViewUnavailable),
            CameraError::DeviceNotFound(_)
        ));
    }

    #[test]
    fn shutter_refusals_are_retryable() {
        let err = to_camera_error(EDS_ERR_TAKE_PICTURE_AF_NG, "take picture", CameraError::CaptureFailed);
        assert!(matches!(err, CameraError::CaptureFailed(_)));
        assert!(!err.is_terminal());
        assert!(matches!(
            to_camera_error(EDS_ERR_DEVICE_BUSY, "take picture", CameraError::CaptureFailed),
            CameraError::DeviceBusy(_)
        ));
    }

    #[test]
    fn message_carries_operation_and_code() {
        let err = to_camera_error(EDS_ERR_SESSION_NOT_OPEN, "get property", CameraError::CaptureFailed);
        assert_eq!(
            err.to_string(),
            "invalid session state: get property: session not open (0x00002003)"
        );
    }

    #[test]
    fn unspecific_codes_use_the_fallback() {
        assert!(matches!(
            to_camera_error(EDS_ERR_INTERNAL_ERROR, "initialize", CameraError::SdkUnavailable),
            CameraError::SdkUnavailable(_)
        ));
        assert!(matches!(
            to_camera_error(0xDEAD, "start live view", CameraError::LiveViewUnavailable),
            CameraError::LiveViewUnavailable(_)
        ));
        assert_eq!(describe(0xDEAD), "unknown error");
    }
}
