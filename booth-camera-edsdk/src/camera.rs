//! Canon DSLR/mirrorless backend over EDSDK.
//!
//! Stills are delivered by the SDK through an object event after the
//! shutter command; the handler downloads the file into memory and hands it
//! to the waiting `capture` call. Windows builds without a message loop get
//! their events by polling `EdsGetEvent`, which every blocking call here does.

use std::ffi::c_void;
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use booth_camera_core::models::camera_models::{CameraInfo, CameraProperty, DeviceType};
use booth_camera_core::models::error::CameraError;
use booth_camera_core::traits::camera_backend::CameraBackend;

use crate::dll_path::resolve_dll_path;
use crate::sdk::*;
use crate::status::{check, to_camera_error, EDS_ERR_OBJECT_NOTREADY, EDS_ERR_OK};

/// How long `capture` waits for the image transfer (default: 30 s).
const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between `EdsGetEvent` polls while waiting for a transfer.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// State shared with the SDK callbacks. Boxed so its address stays fixed
/// while registered as the handler context.
struct EventContext {
    api: &'static EdsApi,
    expecting_transfer: AtomicBool,
    transfer: Mutex<Option<Result<Vec<u8>, CameraError>>>,
    shutdown: AtomicBool,
}

struct OpenCamera {
    camera: OwnedRef,
    events: Box<EventContext>,
}

/// EDSDK-backed camera.
pub struct CanonCamera {
    dll_override: Option<PathBuf>,
    api: Option<&'static EdsApi>,
    sdk_initialized: bool,
    open: Option<OpenCamera>,
    live_view: bool,
    capture_timeout: Duration,
}

// SAFETY: EDSDK references are only touched through `&mut self`, and the
// session manager serializes every call behind its device lock. Callbacks
// run on the thread that polls `EdsGetEvent`, which is always the caller.
unsafe impl Send for CanonCamera {}

impl Default for CanonCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonCamera {
    /// Camera that locates `EDSDK.dll` with the standard search.
    pub fn new() -> Self {
        Self {
            dll_override: None,
            api: None,
            sdk_initialized: false,
            open: None,
            live_view: false,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }

    /// Camera that loads the SDK from `dll`.
    pub fn with_dll(dll: PathBuf) -> Self {
        Self {
            dll_override: Some(dll),
            ..Self::new()
        }
    }

    pub fn set_capture_timeout(&mut self, timeout: Duration) {
        self.capture_timeout = timeout;
    }

    fn api(&self) -> Result<&'static EdsApi, CameraError> {
        match self.api {
            Some(api) if self.sdk_initialized => Ok(api),
            _ => Err(CameraError::SdkUnavailable("EDSDK not initialized".into())),
        }
    }

    /// The open camera, or the reason there is none.
    fn session(&self) -> Result<&OpenCamera, CameraError> {
        let open = self
            .open
            .as_ref()
            .ok_or_else(|| CameraError::InvalidState("no open camera session".into()))?;
        if open.events.shutdown.load(Ordering::SeqCst) {
            return Err(CameraError::DeviceNotFound("camera shut down or was unplugged".into()));
        }
        Ok(open)
    }

    fn camera_list(&self, api: &'static EdsApi) -> Result<(OwnedRef, u32), CameraError> {
        let mut list: EdsCameraListRef = ptr::null_mut();
        // SAFETY: out-pointers are valid locals; the list is released by `OwnedRef`.
        unsafe {
            check((api.get_camera_list)(&mut list), "get camera list", CameraError::SdkUnavailable)?;
            let list = OwnedRef::new(api, list)
                .ok_or_else(|| CameraError::DeviceNotFound("no camera list".into()))?;
            let mut count = 0u32;
            check((api.get_child_count)(list.raw(), &mut count), "count cameras", CameraError::SdkUnavailable)?;
            Ok((list, count))
        }
    }

    fn camera_at(api: &'static EdsApi, list: &OwnedRef, index: u32) -> Result<(OwnedRef, EdsDeviceInfo), CameraError> {
        let mut raw: EdsCameraRef = ptr::null_mut();
        let mut info = EdsDeviceInfo::default();
        // SAFETY: `list` is live for the call; the child is owned by `OwnedRef`.
        unsafe {
            check(
                (api.get_child_at_index)(list.raw(), index as i32, &mut raw),
                "get camera",
                CameraError::DeviceNotFound,
            )?;
            let camera = OwnedRef::new(api, raw)
                .ok_or_else(|| CameraError::DeviceNotFound(format!("no camera at index {}", index)))?;
            check(
                (api.get_device_info)(camera.raw(), &mut info),
                "get device info",
                CameraError::DeviceNotFound,
            )?;
            Ok((camera, info))
        }
    }

    fn set_u32(api: &'static EdsApi, camera: EdsCameraRef, property: EdsPropertyID, value: u32) -> u32 {
        // SAFETY: `value` outlives the call and its size is passed alongside.
        unsafe {
            (api.set_property_data)(
                camera,
                property,
                0,
                std::mem::size_of::<u32>() as u32,
                &value as *const u32 as *const c_void,
            )
        }
    }

    fn pump_events(api: &'static EdsApi) {
        // SAFETY: no arguments; dispatches pending callbacks on this thread.
        unsafe {
            (api.get_event)();
        }
    }

    fn unregister_handlers(api: &'static EdsApi, camera: EdsCameraRef) {
        // SAFETY: clearing handlers on a live camera reference.
        unsafe {
            (api.set_object_event_handler)(camera, kEdsObjectEvent_All, None, ptr::null_mut());
            (api.set_state_event_handler)(camera, kEdsStateEvent_All, None, ptr::null_mut());
        }
    }
}

impl CameraBackend for CanonCamera {
    fn device_type(&self) -> DeviceType {
        DeviceType::Dslr
    }

    fn initialize(&mut self) -> Result<(), CameraError> {
        if self.sdk_initialized {
            return Ok(());
        }
        let dll = match self.dll_override {
            Some(ref dll) => dll.clone(),
            None => resolve_dll_path()?,
        };
        let api = crate::sdk::api(&dll)?;
        // SAFETY: no arguments; balanced by `terminate_sdk` in `release`.
        unsafe {
            check((api.initialize_sdk)(), "initialize SDK", CameraError::SdkUnavailable)?;
        }
        self.api = Some(api);
        self.sdk_initialized = true;
        log::info!("EDSDK initialized from {}", dll.display());
        Ok(())
    }

    fn list_devices(&mut self) -> Result<Vec<CameraInfo>, CameraError> {
        let api = self.api()?;
        let (list, count) = self.camera_list(api)?;
        let mut cameras = Vec::with_capacity(count as usize);
        for index in 0..count {
            match Self::camera_at(api, &list, index) {
                Ok((_camera, info)) => cameras.push(camera_info(index, &info)),
                Err(e) => log::warn!("skipping camera {}: {}", index, e),
            }
        }
        log::info!("found {} Canon camera(s)", cameras.len());
        Ok(cameras)
    }

    fn connect(&mut self, index: u32) -> Result<CameraInfo, CameraError> {
        let api = self.api()?;
        if self.open.is_some() {
            return Err(CameraError::DeviceBusy("session already open".into()));
        }

        let (list, count) = self.camera_list(api)?;
        if index >= count {
            return Err(CameraError::DeviceNotFound(format!(
                "no camera at index {} ({} attached)",
                index, count
            )));
        }
        let (camera, info) = Self::camera_at(api, &list, index)?;
        drop(list);

        let events = Box::new(EventContext {
            api,
            expecting_transfer: AtomicBool::new(false),
            transfer: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        });
        let context = &*events as *const EventContext as *mut c_void;

        // SAFETY: `camera` is live; `context` points into `events`, which is
        // kept alive in `self.open` until the handlers are cleared in `close`.
        unsafe {
            check((api.open_session)(camera.raw()), "open session", CameraError::DeviceBusy)?;

            let code = Self::set_u32(api, camera.raw(), kEdsPropID_SaveTo, kEdsSaveTo_Host);
            if code != EDS_ERR_OK {
                log::warn!("failed to route captures to host: 0x{:08X}", code);
            }
            let capacity = EdsCapacity {
                number_of_free_clusters: 0x7FFF_FFFF,
                bytes_per_sector: 512,
                reset: 1,
            };
            let code = (api.set_capacity)(camera.raw(), capacity);
            if code != EDS_ERR_OK {
                log::warn!("failed to set host capacity: 0x{:08X}", code);
            }

            let registered = check(
                (api.set_object_event_handler)(camera.raw(), kEdsObjectEvent_All, Some(object_event_handler), context),
                "register object handler",
                CameraError::DeviceBusy,
            )
            .and_then(|_| {
                check(
                    (api.set_state_event_handler)(camera.raw(), kEdsStateEvent_All, Some(state_event_handler), context),
                    "register state handler",
                    CameraError::DeviceBusy,
                )
            });
            if let Err(e) = registered {
                Self::unregister_handlers(api, camera.raw());
                (api.close_session)(camera.raw());
                return Err(e);
            }
        }

        let info = camera_info(index, &info);
        log::info!("opened session with {} on {}", info.name, info.port_name);
        self.open = Some(OpenCamera { camera, events });
        Ok(info)
    }

    fn start_live_view(&mut self) -> Result<(), CameraError> {
        let api = self.api()?;
        let camera = self.session()?.camera.raw();
        check(
            Self::set_u32(api, camera, kEdsPropID_Evf_OutputDevice, kEdsEvfOutputDevice_PC),
            "start live view",
            CameraError::LiveViewUnavailable,
        )?;
        self.live_view = true;
        Ok(())
    }

    fn stop_live_view(&mut self) -> Result<(), CameraError> {
        let api = self.api()?;
        let camera = self.session()?.camera.raw();
        self.live_view = false;
        check(
            Self::set_u32(api, camera, kEdsPropID_Evf_OutputDevice, kEdsEvfOutputDevice_Off),
            "stop live view",
            CameraError::LiveViewUnavailable,
        )
    }

    fn get_frame(&mut self) -> Result<Option<Vec<u8>>, CameraError> {
        let api = self.api()?;
        Self::pump_events(api);
        let camera = self.session()?.camera.raw();
        if !self.live_view {
            return Err(CameraError::LiveViewUnavailable("live view is off".into()));
        }

        // SAFETY: stream and image refs are owned locally and released on drop;
        // the stream buffer is copied before they are released.
        unsafe {
            let mut stream: EdsStreamRef = ptr::null_mut();
            check((api.create_memory_stream)(0, &mut stream), "create evf stream", CameraError::LiveViewUnavailable)?;
            let stream = OwnedRef::new(api, stream)
                .ok_or_else(|| CameraError::LiveViewUnavailable("null evf stream".into()))?;

            let mut image: EdsEvfImageRef = ptr::null_mut();
            check(
                (api.create_evf_image_ref)(stream.raw(), &mut image),
                "create evf image",
                CameraError::LiveViewUnavailable,
            )?;
            let image = OwnedRef::new(api, image)
                .ok_or_else(|| CameraError::LiveViewUnavailable("null evf image".into()))?;

            match (api.download_evf_image)(camera, image.raw()) {
                EDS_ERR_OK => {}
                // The camera has no new frame yet.
                EDS_ERR_OBJECT_NOTREADY => return Ok(None),
                code => return Err(to_camera_error(code, "download evf image", CameraError::LiveViewUnavailable)),
            }

            let data = stream_bytes(api, &stream)?;
            Ok(if data.is_empty() { None } else { Some(data) })
        }
    }

    fn capture(&mut self) -> Result<Vec<u8>, CameraError> {
        let api = self.api()?;
        let timeout = self.capture_timeout;
        let open = self.session()?;

        *open.events.transfer.lock() = None;
        open.events.expecting_transfer.store(true, Ordering::SeqCst);
        let result = (|| {
            // SAFETY: live camera reference.
            let code = unsafe { (api.send_command)(open.camera.raw(), kEdsCameraCommand_TakePicture, 0) };
            check(code, "take picture", CameraError::CaptureFailed)?;

            let deadline = Instant::now() + timeout;
            loop {
                Self::pump_events(api);
                if let Some(transfer) = open.events.transfer.lock().take() {
                    return transfer;
                }
                if open.events.shutdown.load(Ordering::SeqCst) {
                    return Err(CameraError::DeviceNotFound("camera shut down during capture".into()));
                }
                if Instant::now() >= deadline {
                    return Err(CameraError::CaptureFailed(format!(
                        "no image received within {} s",
                        timeout.as_secs()
                    )));
                }
                thread::sleep(EVENT_POLL_INTERVAL);
            }
        })();
        open.events.expecting_transfer.store(false, Ordering::SeqCst);

        if let Ok(ref data) = result {
            log::info!("captured {} bytes", data.len());
        }
        result
    }

    fn is_connected(&mut self) -> bool {
        if let Some(api) = self.api {
            if self.sdk_initialized {
                Self::pump_events(api);
            }
        }
        self.session().is_ok()
    }

    fn property(&mut self, property: CameraProperty) -> Result<Option<u32>, CameraError> {
        let api = self.api()?;
        let camera = self.session()?.camera.raw();
        let id = match property {
            CameraProperty::BatteryLevel => kEdsPropID_BatteryLevel,
            CameraProperty::AvailableShots => kEdsPropID_AvailableShots,
        };

        let mut data_type: EdsDataType = 0;
        let mut size = 0u32;
        // SAFETY: out-pointers are valid locals sized to what the SDK reports.
        unsafe {
            check(
                (api.get_property_size)(camera, id, 0, &mut data_type, &mut size),
                "get property size",
                CameraError::DeviceBusy,
            )?;
            if size as usize != std::mem::size_of::<u32>() {
                return Ok(None);
            }
            let mut value = 0u32;
            check(
                (api.get_property_data)(camera, id, 0, size, &mut value as *mut u32 as *mut c_void),
                "get property",
                CameraError::DeviceBusy,
            )?;
            Ok(Some(value))
        }
    }

    fn close(&mut self) -> Result<(), CameraError> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        self.live_view = false;
        let api = open.events.api;
        Self::unregister_handlers(api, open.camera.raw());
        if open.events.shutdown.load(Ordering::SeqCst) {
            log::info!("camera already gone, dropping session");
            return Ok(());
        }
        // SAFETY: live camera reference, released when `open` drops.
        let code = unsafe { (api.close_session)(open.camera.raw()) };
        log::info!("camera session closed");
        check(code, "close session", CameraError::DeviceBusy)
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if !self.sdk_initialized {
            return Ok(());
        }
        self.sdk_initialized = false;
        let api = self.api.ok_or_else(|| CameraError::SdkUnavailable("EDSDK never loaded".into()))?;
        // SAFETY: balances the `initialize_sdk` call.
        let code = unsafe { (api.terminate_sdk)() };
        log::info!("EDSDK terminated");
        check(code, "terminate SDK", CameraError::SdkUnavailable)
    }
}

impl Drop for CanonCamera {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close camera on drop: {}", e);
        }
        if let Err(e) = self.release() {
            log::warn!("failed to release EDSDK on drop: {}", e);
        }
    }
}

fn camera_info(index: u32, info: &EdsDeviceInfo) -> CameraInfo {
    CameraInfo {
        index,
        name: fixed_cstr(&info.device_description),
        port_name: fixed_cstr(&info.port_name),
        device_sub_type: info.device_sub_type,
        device_type: DeviceType::Dslr,
    }
}

/// Copy the contents of a memory stream.
///
/// # Safety
/// `stream` must be a live EDSDK memory stream.
unsafe fn stream_bytes(api: &'static EdsApi, stream: &OwnedRef) -> Result<Vec<u8>, CameraError> {
    let mut data: *mut c_void = ptr::null_mut();
    check((api.get_pointer)(stream.raw(), &mut data), "read stream", CameraError::CaptureFailed)?;
    let mut length = 0u64;
    check((api.get_length)(stream.raw(), &mut length), "read stream length", CameraError::CaptureFailed)?;
    if data.is_null() || length == 0 {
        return Ok(Vec::new());
    }
    Ok(std::slice::from_raw_parts(data as *const u8, length as usize).to_vec())
}

/// Download a directory item announced by the camera into memory.
///
/// # Safety
/// `item` must be the live directory item passed to the object handler.
unsafe fn download_item(api: &'static EdsApi, item: EdsDirectoryItemRef) -> Result<Vec<u8>, CameraError> {
    let mut info = EdsDirectoryItemInfo::default();
    check((api.get_directory_item_info)(item, &mut info), "get item info", CameraError::CaptureFailed)?;

    let mut stream: EdsStreamRef = ptr::null_mut();
    check((api.create_memory_stream)(info.size, &mut stream), "create stream", CameraError::CaptureFailed)?;
    let stream = OwnedRef::new(api, stream).ok_or_else(|| CameraError::CaptureFailed("null stream".into()))?;

    check((api.download)(item, info.size, stream.raw()), "download image", CameraError::CaptureFailed)?;
    check((api.download_complete)(item), "complete download", CameraError::CaptureFailed)?;

    let data = stream_bytes(api, &stream)?;
    if data.is_empty() {
        return Err(CameraError::CaptureFailed("camera transferred an empty file".into()));
    }
    Ok(data)
}

unsafe extern "system" fn object_event_handler(event: u32, object: EdsBaseRef, context: *mut c_void) -> u32 {
    if context.is_null() {
        return EDS_ERR_OK;
    }
    // SAFETY: `context` is the boxed `EventContext` registered in `connect`,
    // alive until the handler is cleared.
    let events = &*(context as *const EventContext);
    let Some(object) = OwnedRef::new(events.api, object) else {
        return EDS_ERR_OK;
    };
    if event != kEdsObjectEvent_DirItemRequestTransfer {
        return EDS_ERR_OK;
    }

    if !events.expecting_transfer.load(Ordering::SeqCst) {
        log::warn!("discarding unexpected transfer from camera");
        (events.api.download_cancel)(object.raw());
        return EDS_ERR_OK;
    }

    let result = download_item(events.api, object.raw());
    if result.is_err() {
        (events.api.download_cancel)(object.raw());
    }
    *events.transfer.lock() = Some(result);
    EDS_ERR_OK
}

unsafe extern "system" fn state_event_handler(event: u32, _parameter: u32, context: *mut c_void) -> u32 {
    if context.is_null() || event != kEdsStateEvent_Shutdown {
        return EDS_ERR_OK;
    }
    // SAFETY: see `object_event_handler`.
    let events = &*(context as *const EventContext);
    log::warn!("camera reported shutdown or disconnect");
    events.shutdown.store(true, Ordering::SeqCst);
    EDS_ERR_OK
}
