use anyhow::{anyhow, Result};
use core::slice;
use image::RgbaImage;
use log::{debug, error, info, warn};
use ndk_sys::{
    acamera_metadata_tag, camera_status_t, media_status_t, ACameraCaptureSession,
    ACameraCaptureSession_close, ACameraCaptureSession_setRepeatingRequest,
    ACameraCaptureSession_stateCallbacks, ACameraCaptureSession_stopRepeating, ACameraDevice,
    ACameraDevice_StateCallbacks, ACameraDevice_close, ACameraDevice_createCaptureRequest,
    ACameraDevice_createCaptureSession, ACameraDevice_getId, ACameraDevice_request_template,
    ACameraManager, ACameraManager_create, ACameraManager_delete,
    ACameraManager_deleteCameraIdList, ACameraManager_getCameraCharacteristics,
    ACameraManager_getCameraIdList, ACameraManager_openCamera, ACameraMetadata,
    ACameraMetadata_const_entry, ACameraMetadata_free, ACameraMetadata_getConstEntry,
    ACameraOutputTarget, ACameraOutputTarget_create, ACameraOutputTarget_free, ACaptureRequest,
    ACaptureRequest_addTarget, ACaptureRequest_free, ACaptureSessionOutput,
    ACaptureSessionOutputContainer, ACaptureSessionOutputContainer_add,
    ACaptureSessionOutputContainer_create, ACaptureSessionOutputContainer_free,
    ACaptureSessionOutput_create, ACaptureSessionOutput_free, AImage, AImageReader,
    AImageReader_ImageListener, AImageReader_acquireLatestImage, AImageReader_delete,
    AImageReader_getWindow, AImageReader_new, AImageReader_setImageListener, AImage_delete,
    AImage_getHeight, AImage_getPlaneData, AImage_getPlanePixelStride, AImage_getPlaneRowStride,
    AImage_getWidth, ANativeWindow, AIMAGE_FORMATS,
};
use slint::{Rgba8Pixel, SharedPixelBuffer};
use std::{
    ffi::{c_int, c_void, CStr, CString},
    mem::zeroed,
    ptr::null_mut,
    sync::mpsc::Sender,
    time::Instant,
};

use super::{closest_size, publish_frame, yuv, CameraCatalog, CameraEntry, LatestFrame, LensFacing};

#[link(name = "camera2ndk")]
extern "C" {}

#[link(name = "mediandk")]
extern "C" {}

// ACAMERA_LENS_FACING values
const LENS_FACING_FRONT: u8 = 0;
const LENS_FACING_BACK: u8 = 1;

/// Lists camera ids with their facing. External cameras are skipped.
pub fn enumerate_cameras() -> Result<CameraCatalog> {
    unsafe {
        let camera_manager = ACameraManager_create();
        let res = enumerate_with(camera_manager);
        ACameraManager_delete(camera_manager);
        res
    }
}

unsafe fn enumerate_with(camera_manager: *mut ACameraManager) -> Result<CameraCatalog> {
    let mut camera_id_list_raw = null_mut();
    check_camera(
        ACameraManager_getCameraIdList(camera_manager, &mut camera_id_list_raw),
        "Getting the camera id list",
    )?;
    if camera_id_list_raw.is_null() {
        return Err(anyhow!(
            "Failed to get camera id list (reason: camera_id_list is null)"
        ));
    }

    let camera_id_list = &*camera_id_list_raw;
    let camera_ids = if camera_id_list.numCameras < 1 {
        &[][..]
    } else {
        slice::from_raw_parts(camera_id_list.cameraIds, camera_id_list.numCameras as usize)
    };

    let mut cameras = vec![];
    for raw_id in camera_ids {
        let Some(id) = get_cstr(*raw_id) else {
            continue;
        };
        let mut camera_metadata = null_mut();
        let camera_status =
            ACameraManager_getCameraCharacteristics(camera_manager, *raw_id, &mut camera_metadata);
        if camera_status != camera_status_t::ACAMERA_OK {
            warn!("no characteristics for camera {id}: {:?}", camera_status);
            continue;
        }
        let lens_facing = const_entry_u8(camera_metadata, acamera_metadata_tag::ACAMERA_LENS_FACING.0);
        let sensor_orientation =
            const_entry_i32(camera_metadata, acamera_metadata_tag::ACAMERA_SENSOR_ORIENTATION.0)
                .unwrap_or(0);
        ACameraMetadata_free(camera_metadata);

        let lens = match lens_facing {
            Some(LENS_FACING_BACK) => LensFacing::Back,
            Some(LENS_FACING_FRONT) => LensFacing::Front,
            other => {
                debug!("skipping camera {id} with facing {other:?}");
                continue;
            }
        };
        info!("camera {id}: {lens:?}, sensor orientation {sensor_orientation}");
        cameras.push(CameraEntry {
            id: id.to_string(),
            lens,
            sensor_orientation,
        });
    }
    ACameraManager_deleteCameraIdList(camera_id_list_raw);

    if cameras.is_empty() {
        return Err(anyhow!("No camera device detected."));
    }
    Ok(CameraCatalog::new(cameras))
}

fn check_camera(status: camera_status_t, what: &str) -> Result<()> {
    if status != camera_status_t::ACAMERA_OK {
        return Err(anyhow!("{what} failed (reason: {:?})", status));
    }
    Ok(())
}

fn check_media(status: media_status_t, what: &str) -> Result<()> {
    if status != media_status_t::AMEDIA_OK {
        return Err(anyhow!("{what} failed (reason: {:?})", status));
    }
    Ok(())
}

/// Output sizes the sensor offers for YUV_420_888 streams.
unsafe fn yuv_stream_sizes(metadata: *const ACameraMetadata) -> Vec<(u32, u32)> {
    let mut entry: ACameraMetadata_const_entry = zeroed();
    let tag = acamera_metadata_tag::ACAMERA_SCALER_AVAILABLE_STREAM_CONFIGURATIONS.0;
    if ACameraMetadata_getConstEntry(metadata, tag, &mut entry) != camera_status_t::ACAMERA_OK
        || entry.data.i32_.is_null()
    {
        return vec![];
    }
    // (format, width, height, is_input) quadruples
    let data = slice::from_raw_parts(entry.data.i32_, entry.count as usize);
    data.chunks_exact(4)
        .filter(|c| c[3] == 0 && c[0] == AIMAGE_FORMATS::AIMAGE_FORMAT_YUV_420_888.0 as i32)
        .filter(|c| c[1] > 0 && c[2] > 0)
        .map(|c| (c[1] as u32, c[2] as u32))
        .collect()
}

unsafe fn const_entry_u8(metadata: *const ACameraMetadata, tag: u32) -> Option<u8> {
    let mut entry: ACameraMetadata_const_entry = zeroed();
    if ACameraMetadata_getConstEntry(metadata, tag, &mut entry) != camera_status_t::ACAMERA_OK
        || entry.count < 1
    {
        return None;
    }
    Some(*entry.data.u8_)
}

unsafe fn const_entry_i32(metadata: *const ACameraMetadata, tag: u32) -> Option<i32> {
    let mut entry: ACameraMetadata_const_entry = zeroed();
    if ACameraMetadata_getConstEntry(metadata, tag, &mut entry) != camera_status_t::ACAMERA_OK
        || entry.count < 1
    {
        return None;
    }
    Some(*entry.data.i32_)
}

/// Receives image reader frames on the NDK callback thread.
struct PreviewSink {
    frame_sender: Sender<SharedPixelBuffer<Rgba8Pixel>>,
    latest: LatestFrame,
    rgba: RgbaImage,
    sensor_orientation: i32,
    lens: LensFacing,
    timer: Instant,
    frame_count: i32,
}

impl PreviewSink {
    unsafe fn on_image_available(&mut self, image_reader: *mut AImageReader) -> Result<()> {
        let mut image = null_mut();
        let media_status = AImageReader_acquireLatestImage(image_reader, &mut image);
        if media_status != media_status_t::AMEDIA_OK {
            let msg = if media_status == media_status_t::AMEDIA_IMGREADER_NO_BUFFER_AVAILABLE {
                "An image reader frame was discarded".to_string()
            } else {
                format!(
                    "Failed to acquire latest image from image reader, error: {:?}.",
                    media_status
                )
            };
            return Err(anyhow!("{msg}"));
        }
        let res = self.convert(image);
        AImage_delete(image);
        res
    }

    unsafe fn convert(&mut self, image: *mut AImage) -> Result<()> {
        let mut width = 0;
        let mut height = 0;
        AImage_getWidth(image, &mut width);
        AImage_getHeight(image, &mut height);

        let mut planes: [(*mut u8, c_int); 3] = [(null_mut(), 0); 3];
        for (idx, plane) in planes.iter_mut().enumerate() {
            let res = AImage_getPlaneData(image, idx as c_int, &mut plane.0, &mut plane.1);
            if res != media_status_t::AMEDIA_OK || plane.0.is_null() {
                return Err(anyhow!("AImage_getPlaneData({idx}) error res={:?}.", res));
            }
        }
        let mut y_stride = 0;
        let mut uv_stride = 0;
        let mut uv_pixel_stride = 0;
        AImage_getPlaneRowStride(image, 0, &mut y_stride);
        AImage_getPlaneRowStride(image, 1, &mut uv_stride);
        AImage_getPlanePixelStride(image, 1, &mut uv_pixel_stride);

        let frame = yuv::Yuv420Frame {
            width: width as u32,
            height: height as u32,
            y: slice::from_raw_parts(planes[0].0, planes[0].1 as usize),
            u: slice::from_raw_parts(planes[1].0, planes[1].1 as usize),
            v: slice::from_raw_parts(planes[2].0, planes[2].1 as usize),
            y_row_stride: y_stride as usize,
            uv_row_stride: uv_stride as usize,
            uv_pixel_stride: uv_pixel_stride.max(1) as usize,
        };
        frame.to_rgba(&mut self.rgba)?;

        let upright = yuv::orient(self.rgba.clone(), self.sensor_orientation, false);
        publish_frame(upright, self.lens.mirrored(), &self.latest, &self.frame_sender)?;

        self.frame_count += 1;
        if self.timer.elapsed().as_millis() > 1000 {
            debug!("preview FPS:{}", self.frame_count);
            self.timer = Instant::now();
            self.frame_count = 0;
        }
        Ok(())
    }
}

/// One opened camera2 device streaming preview frames.
///
/// Callback structs live inside this value and the image listener points at
/// the boxed sink, so the camera is kept boxed while open.
pub struct AndroidCamera {
    camera_manager: *mut ACameraManager,
    camera_device: *mut ACameraDevice,
    capture_request: *mut ACaptureRequest,
    camera_output_target: *mut ACameraOutputTarget,
    session_output: *mut ACaptureSessionOutput,
    capture_session_output_container: *mut ACaptureSessionOutputContainer,
    capture_session: *mut ACameraCaptureSession,
    image_reader: *mut AImageReader,
    camera_id: Option<String>,
    stream_sizes: Vec<(u32, u32)>,
    image_listener: AImageReader_ImageListener,
    capture_session_state_callbacks: ACameraCaptureSession_stateCallbacks,
    device_state_callbacks: ACameraDevice_StateCallbacks,
    sink: Box<PreviewSink>,
}

impl AndroidCamera {
    pub fn new(
        frame_sender: Sender<SharedPixelBuffer<Rgba8Pixel>>,
        latest: LatestFrame,
    ) -> Self {
        Self {
            camera_manager: null_mut(),
            camera_device: null_mut(),
            capture_request: null_mut(),
            camera_output_target: null_mut(),
            session_output: null_mut(),
            capture_session_output_container: null_mut(),
            capture_session: null_mut(),
            image_reader: null_mut(),
            camera_id: None,
            stream_sizes: vec![],
            image_listener: AImageReader_ImageListener {
                context: null_mut(),
                onImageAvailable: None,
            },
            capture_session_state_callbacks: unsafe { zeroed() },
            device_state_callbacks: unsafe { zeroed() },
            sink: Box::new(PreviewSink {
                frame_sender,
                latest,
                rgba: RgbaImage::new(0, 0),
                sensor_orientation: 0,
                lens: LensFacing::Back,
                timer: Instant::now(),
                frame_count: 0,
            }),
        }
    }

    pub fn open(&mut self, entry: &CameraEntry) -> Result<()> {
        let camera_id = CString::new(entry.id.as_str())?;
        self.sink.lens = entry.lens;
        self.sink.sensor_orientation = entry.sensor_orientation;
        unsafe {
            unsafe extern "C" fn on_disconnected(_data: *mut c_void, device: *mut ACameraDevice) {
                info!("Camera(id: {:?}) is disconnected.", get_cstr(ACameraDevice_getId(device)));
            }

            unsafe extern "C" fn on_error(
                _data: *mut c_void,
                device: *mut ACameraDevice,
                error: c_int,
            ) {
                error!("Error(code: {}) on Camera(id: {:?}).", error, get_cstr(ACameraDevice_getId(device)));
            }

            self.device_state_callbacks.onDisconnected = Some(on_disconnected);
            self.device_state_callbacks.onError = Some(on_error);

            self.camera_manager = ACameraManager_create();
            let mut metadata = null_mut();
            if ACameraManager_getCameraCharacteristics(
                self.camera_manager,
                camera_id.as_ptr(),
                &mut metadata,
            ) == camera_status_t::ACAMERA_OK
            {
                self.stream_sizes = yuv_stream_sizes(metadata);
                ACameraMetadata_free(metadata);
            }
            debug!("YUV stream sizes of camera {}: {:?}", entry.id, self.stream_sizes);

            check_camera(
                ACameraManager_openCamera(
                    self.camera_manager,
                    camera_id.as_ptr(),
                    &mut self.device_state_callbacks,
                    &mut self.camera_device,
                ),
                &format!("Opening camera {}", entry.id),
            )?;
        }
        self.camera_id = Some(entry.id.clone());
        info!("opened camera {} ({:?})", entry.id, entry.lens);
        Ok(())
    }

    pub fn start_preview(&mut self, width: u32, height: u32) -> Result<()> {
        let (width, height) = closest_size(&self.stream_sizes, (width, height)).unwrap_or((width, height));
        self.create_image_reader(width, height, AIMAGE_FORMATS::AIMAGE_FORMAT_YUV_420_888)?;
        unsafe {
            let mut native_window: *mut ANativeWindow = null_mut();
            check_media(
                AImageReader_getWindow(self.image_reader, &mut native_window),
                "AImageReader_getWindow",
            )?;
            self.create_request(native_window)?;
            self.create_session(native_window)?;
            check_camera(
                ACameraCaptureSession_setRepeatingRequest(
                    self.capture_session,
                    null_mut(),
                    1,
                    &mut self.capture_request,
                    null_mut(),
                ),
                "Setting the repeating request",
            )?;
        }
        info!("preview {width}x{height} started on camera {:?}", self.camera_id);
        Ok(())
    }

    /// Preview request targeting the image reader window.
    unsafe fn create_request(&mut self, native_window: *mut ANativeWindow) -> Result<()> {
        check_camera(
            ACameraDevice_createCaptureRequest(
                self.camera_device,
                ACameraDevice_request_template::TEMPLATE_PREVIEW,
                &mut self.capture_request,
            ),
            "Creating the preview capture request",
        )?;
        check_camera(
            ACameraOutputTarget_create(native_window, &mut self.camera_output_target),
            "ACameraOutputTarget_create",
        )?;
        check_camera(
            ACaptureRequest_addTarget(self.capture_request, self.camera_output_target),
            "ACaptureRequest_addTarget",
        )
    }

    unsafe fn create_session(&mut self, native_window: *mut ANativeWindow) -> Result<()> {
        unsafe extern "C" fn on_ready(_context: *mut c_void, session: *mut ACameraCaptureSession) {
            debug!("Session is ready. {:?}", session);
        }

        unsafe extern "C" fn on_active(_context: *mut c_void, session: *mut ACameraCaptureSession) {
            debug!("Session is activated. {:?}", session);
        }

        unsafe extern "C" fn on_closed(_context: *mut c_void, session: *mut ACameraCaptureSession) {
            debug!("Session is closed. {:?}", session);
        }

        check_camera(
            ACaptureSessionOutput_create(native_window, &mut self.session_output),
            "ACaptureSessionOutput_create",
        )?;
        check_camera(
            ACaptureSessionOutputContainer_create(&mut self.capture_session_output_container),
            "ACaptureSessionOutputContainer_create",
        )?;
        check_camera(
            ACaptureSessionOutputContainer_add(
                self.capture_session_output_container,
                self.session_output,
            ),
            "ACaptureSessionOutputContainer_add",
        )?;

        self.capture_session_state_callbacks.onReady = Some(on_ready);
        self.capture_session_state_callbacks.onActive = Some(on_active);
        self.capture_session_state_callbacks.onClosed = Some(on_closed);
        check_camera(
            ACameraDevice_createCaptureSession(
                self.camera_device,
                self.capture_session_output_container,
                &self.capture_session_state_callbacks,
                &mut self.capture_session,
            ),
            "Creating the capture session",
        )
    }

    fn create_image_reader(
        &mut self,
        width: u32,
        height: u32,
        image_format: AIMAGE_FORMATS,
    ) -> Result<()> {
        unsafe {
            check_media(
                AImageReader_new(
                    width as i32,
                    height as i32,
                    image_format.0 as i32,
                    2,
                    &mut self.image_reader,
                ),
                "AImageReader_new",
            )?;

            unsafe extern "C" fn on_image_available(
                context: *mut c_void,
                image_reader: *mut AImageReader,
            ) {
                let sink = &mut *(context as *mut PreviewSink);
                if let Err(err) = sink.on_image_available(image_reader) {
                    debug!("preview frame dropped: {err}");
                }
            }

            let sink_ptr: *mut PreviewSink = &mut *self.sink;
            self.image_listener.context = sink_ptr as *mut c_void;
            self.image_listener.onImageAvailable = Some(on_image_available);

            check_media(
                AImageReader_setImageListener(self.image_reader, &mut self.image_listener),
                "AImageReader_setImageListener",
            )
        }
    }

    pub fn close(&mut self) {
        unsafe {
            if !self.capture_session.is_null() {
                ACameraCaptureSession_stopRepeating(self.capture_session);
                ACameraCaptureSession_close(self.capture_session);
                self.capture_session = null_mut();
            }

            if !self.capture_request.is_null() {
                ACaptureRequest_free(self.capture_request);
                self.capture_request = null_mut();
            }

            if !self.camera_output_target.is_null() {
                ACameraOutputTarget_free(self.camera_output_target);
                self.camera_output_target = null_mut();
            }

            if !self.camera_device.is_null() {
                let camera_status = ACameraDevice_close(self.camera_device);
                if camera_status != camera_status_t::ACAMERA_OK {
                    error!("Failed to close CameraDevice.");
                }
                self.camera_device = null_mut();
            }

            if !self.session_output.is_null() {
                ACaptureSessionOutput_free(self.session_output);
                self.session_output = null_mut();
            }

            if !self.capture_session_output_container.is_null() {
                ACaptureSessionOutputContainer_free(self.capture_session_output_container);
                self.capture_session_output_container = null_mut();
            }

            if !self.image_reader.is_null() {
                AImageReader_delete(self.image_reader);
                self.image_reader = null_mut();
            }

            if !self.camera_manager.is_null() {
                ACameraManager_delete(self.camera_manager);
                self.camera_manager = null_mut();
            }
        }
        info!("Close Camera {:?}", self.camera_id.take());
    }
}

impl Drop for AndroidCamera {
    fn drop(&mut self) {
        self.close();
    }
}

pub unsafe fn get_cstr<'a>(s: *const ::std::os::raw::c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}
