//! Raw EDSDK types and the dynamically loaded function table.
//!
//! `EDSDK.dll` is not linked at build time. [`EdsApi::load`] resolves every
//! entry point once with `LoadLibraryA`/`GetProcAddress`; a missing export
//! fails the load instead of failing later at call time.

#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

use std::ffi::{c_char, c_void, CString};
use std::path::Path;
use std::sync::OnceLock;

use windows::core::PCSTR;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryA, SetDllDirectoryA};

use crate::dll_path::LoadError;

pub type EdsError = u32;
pub type EdsPropertyID = u32;
pub type EdsDataType = u32;

pub type EdsBaseRef = *mut c_void;
pub type EdsCameraListRef = EdsBaseRef;
pub type EdsCameraRef = EdsBaseRef;
pub type EdsDirectoryItemRef = EdsBaseRef;
pub type EdsStreamRef = EdsBaseRef;
pub type EdsEvfImageRef = EdsBaseRef;

pub const kEdsPropID_BatteryLevel: EdsPropertyID = 0x0000_0008;
pub const kEdsPropID_SaveTo: EdsPropertyID = 0x0000_000B;
pub const kEdsPropID_AvailableShots: EdsPropertyID = 0x0000_040A;
pub const kEdsPropID_Evf_OutputDevice: EdsPropertyID = 0x0000_0500;

pub const kEdsCameraCommand_TakePicture: u32 = 0x0000_0000;

pub const kEdsObjectEvent_All: u32 = 0x0000_0200;
pub const kEdsObjectEvent_DirItemRequestTransfer: u32 = 0x0000_0208;
pub const kEdsStateEvent_All: u32 = 0x0000_0300;
pub const kEdsStateEvent_Shutdown: u32 = 0x0000_0301;

pub const kEdsSaveTo_Host: u32 = 2;
pub const kEdsEvfOutputDevice_Off: u32 = 0;
pub const kEdsEvfOutputDevice_PC: u32 = 2;

pub const EDS_MAX_NAME: usize = 256;

#[repr(C)]
#[derive(Clone)]
pub struct EdsDeviceInfo {
    pub port_name: [c_char; EDS_MAX_NAME],
    pub device_description: [c_char; EDS_MAX_NAME],
    pub device_sub_type: u32,
    pub reserved: u32,
}

impl Default for EdsDeviceInfo {
    fn default() -> Self {
        Self {
            port_name: [0; EDS_MAX_NAME],
            device_description: [0; EDS_MAX_NAME],
            device_sub_type: 0,
            reserved: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EdsCapacity {
    pub number_of_free_clusters: i32,
    pub bytes_per_sector: i32,
    pub reset: i32,
}

#[repr(C)]
#[derive(Clone)]
pub struct EdsDirectoryItemInfo {
    pub size: u64,
    pub is_folder: i32,
    pub group_id: u32,
    pub option: u32,
    pub file_name: [c_char; EDS_MAX_NAME],
    pub format: u32,
    pub date_time: u32,
}

impl Default for EdsDirectoryItemInfo {
    fn default() -> Self {
        Self {
            size: 0,
            is_folder: 0,
            group_id: 0,
            option: 0,
            file_name: [0; EDS_MAX_NAME],
            format: 0,
            date_time: 0,
        }
    }
}

pub type EdsObjectEventHandler =
    Option<unsafe extern "system" fn(event: u32, object: EdsBaseRef, context: *mut c_void) -> EdsError>;

pub type EdsStateEventHandler =
    Option<unsafe extern "system" fn(event: u32, parameter: u32, context: *mut c_void) -> EdsError>;

/// Entry points of `EDSDK.dll`.
pub struct EdsApi {
    pub initialize_sdk: unsafe extern "system" fn() -> EdsError,
    pub terminate_sdk: unsafe extern "system" fn() -> EdsError,
    pub retain: unsafe extern "system" fn(EdsBaseRef) -> u32,
    pub release: unsafe extern "system" fn(EdsBaseRef) -> u32,
    pub get_camera_list: unsafe extern "system" fn(*mut EdsCameraListRef) -> EdsError,
    pub get_child_count: unsafe extern "system" fn(EdsBaseRef, *mut u32) -> EdsError,
    pub get_child_at_index: unsafe extern "system" fn(EdsBaseRef, i32, *mut EdsBaseRef) -> EdsError,
    pub get_device_info: unsafe extern "system" fn(EdsCameraRef, *mut EdsDeviceInfo) -> EdsError,
    pub open_session: unsafe extern "system" fn(EdsCameraRef) -> EdsError,
    pub close_session: unsafe extern "system" fn(EdsCameraRef) -> EdsError,
    pub send_command: unsafe extern "system" fn(EdsCameraRef, u32, i32) -> EdsError,
    pub get_property_size:
        unsafe extern "system" fn(EdsBaseRef, EdsPropertyID, i32, *mut EdsDataType, *mut u32) -> EdsError,
    pub get_property_data: unsafe extern "system" fn(EdsBaseRef, EdsPropertyID, i32, u32, *mut c_void) -> EdsError,
    pub set_property_data:
        unsafe extern "system" fn(EdsBaseRef, EdsPropertyID, i32, u32, *const c_void) -> EdsError,
    pub set_capacity: unsafe extern "system" fn(EdsCameraRef, EdsCapacity) -> EdsError,
    pub get_directory_item_info: unsafe extern "system" fn(EdsDirectoryItemRef, *mut EdsDirectoryItemInfo) -> EdsError,
    pub download: unsafe extern "system" fn(EdsDirectoryItemRef, u64, EdsStreamRef) -> EdsError,
    pub download_complete: unsafe extern "system" fn(EdsDirectoryItemRef) -> EdsError,
    pub download_cancel: unsafe extern "system" fn(EdsDirectoryItemRef) -> EdsError,
    pub create_memory_stream: unsafe extern "system" fn(u64, *mut EdsStreamRef) -> EdsError,
    pub get_pointer: unsafe extern "system" fn(EdsStreamRef, *mut *mut c_void) -> EdsError,
    pub get_length: unsafe extern "system" fn(EdsStreamRef, *mut u64) -> EdsError,
    pub create_evf_image_ref: unsafe extern "system" fn(EdsStreamRef, *mut EdsEvfImageRef) -> EdsError,
    pub download_evf_image: unsafe extern "system" fn(EdsCameraRef, EdsEvfImageRef) -> EdsError,
    pub set_object_event_handler:
        unsafe extern "system" fn(EdsCameraRef, u32, EdsObjectEventHandler, *mut c_void) -> EdsError,
    pub set_state_event_handler:
        unsafe extern "system" fn(EdsCameraRef, u32, EdsStateEventHandler, *mut c_void) -> EdsError,
    pub get_event: unsafe extern "system" fn() -> EdsError,
}

static API: OnceLock<EdsApi> = OnceLock::new();

/// The process-wide function table, loading `dll` on first use.
pub fn api(dll: &Path) -> Result<&'static EdsApi, LoadError> {
    if let Some(api) = API.get() {
        return Ok(api);
    }
    // SAFETY: the resolved symbols are the documented EDSDK entry points with
    // the signatures declared on `EdsApi`.
    let loaded = unsafe { EdsApi::load(dll)? };
    Ok(API.get_or_init(|| loaded))
}

macro_rules! resolve {
    ($module:expr, $name:literal) => {{
        let proc = GetProcAddress($module, PCSTR::from_raw(concat!($name, "\0").as_ptr()))
            .ok_or(LoadError::MissingSymbol($name))?;
        std::mem::transmute(proc)
    }};
}

impl EdsApi {
    /// Load `dll` and resolve every entry point.
    ///
    /// The DLL directory is added to the search path for the duration of the
    /// load so its sibling DLLs resolve. The library is never unloaded.
    unsafe fn load(dll: &Path) -> Result<Self, LoadError> {
        let library_error = |reason: String| LoadError::Library {
            path: dll.to_path_buf(),
            reason,
        };
        let path = CString::new(dll.to_string_lossy().as_bytes()).map_err(|e| library_error(e.to_string()))?;

        let dir = dll.parent().and_then(|p| CString::new(p.to_string_lossy().as_bytes()).ok());
        if let Some(ref dir) = dir {
            if let Err(e) = SetDllDirectoryA(PCSTR::from_raw(dir.as_ptr().cast())) {
                log::warn!("SetDllDirectoryA failed: {}", e);
            }
        }
        let module = LoadLibraryA(PCSTR::from_raw(path.as_ptr().cast()));
        let _ = SetDllDirectoryA(PCSTR::null());
        let module = module.map_err(|e| library_error(e.to_string()))?;

        Ok(Self {
            initialize_sdk: resolve!(module, "EdsInitializeSDK"),
            terminate_sdk: resolve!(module, "EdsTerminateSDK"),
            retain: resolve!(module, "EdsRetain"),
            release: resolve!(module, "EdsRelease"),
            get_camera_list: resolve!(module, "EdsGetCameraList"),
            get_child_count: resolve!(module, "EdsGetChildCount"),
            get_child_at_index: resolve!(module, "EdsGetChildAtIndex"),
            get_device_info: resolve!(module, "EdsGetDeviceInfo"),
            open_session: resolve!(module, "EdsOpenSession"),
            close_session: resolve!(module, "EdsCloseSession"),
            send_command: resolve!(module, "EdsSendCommand"),
            get_property_size: resolve!(module, "EdsGetPropertySize"),
            get_property_data: resolve!(module, "EdsGetPropertyData"),
            set_property_data: resolve!(module, "EdsSetPropertyData"),
            set_capacity: resolve!(module, "EdsSetCapacity"),
            get_directory_item_info: resolve!(module, "EdsGetDirectoryItemInfo"),
            download: resolve!(module, "EdsDownload"),
            download_complete: resolve!(module, "EdsDownloadComplete"),
            download_cancel: resolve!(module, "EdsDownloadCancel"),
            create_memory_stream: resolve!(module, "EdsCreateMemoryStream"),
            get_pointer: resolve!(module, "EdsGetPointer"),
            get_length: resolve!(module, "EdsGetLength"),
            create_evf_image_ref: resolve!(module, "EdsCreateEvfImageRef"),
            download_evf_image: resolve!(module, "EdsDownloadEvfImage"),
            set_object_event_handler: resolve!(module, "EdsSetObjectEventHandler"),
            set_state_event_handler: resolve!(module, "EdsSetStateEventHandler"),
            get_event: resolve!(module, "EdsGetEvent"),
        })
    }
}

/// An EDSDK reference released on drop.
pub struct OwnedRef {
    api: &'static EdsApi,
    raw: EdsBaseRef,
}

impl OwnedRef {
    /// Take ownership of `raw`. Returns `None` for a null reference.
    ///
    /// # Safety
    /// `raw` must be a live EDSDK reference whose release the caller hands over.
    pub unsafe fn new(api: &'static EdsApi, raw: EdsBaseRef) -> Option<Self> {
        if raw.is_null() {
            None
        } else {
            Some(Self { api, raw })
        }
    }

    pub fn raw(&self) -> EdsBaseRef {
        self.raw
    }
}

impl Drop for OwnedRef {
    fn drop(&mut self) {
        // SAFETY: `raw` is non-null and owned by this wrapper.
        unsafe {
            (self.api.release)(self.raw);
        }
    }
}

/// Convert a NUL-terminated fixed-size C string field.
pub fn fixed_cstr(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
