use std::{
    path::PathBuf,
    sync::{mpsc::Sender, Arc, Mutex},
};

#[cfg(target_os = "android")]
use self::camera2::AndroidCamera;
use anyhow::{anyhow, Result};
use image::RgbaImage;
use log::{error, info};
use serde::{Deserialize, Serialize};
use slint::{Rgba8Pixel, SharedPixelBuffer};

use crate::{
    config::Config,
    controller::{CameraBackend, Event, SavedPhoto},
    storage,
    worker::Executor,
};

#[cfg(target_os = "android")]
mod camera2;

#[cfg(not(target_os = "android"))]
mod pcam;

pub mod yuv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LensFacing {
    #[default]
    Back,
    Front,
}

impl LensFacing {
    pub fn toggled(self) -> Self {
        match self {
            LensFacing::Back => LensFacing::Front,
            LensFacing::Front => LensFacing::Back,
        }
    }

    /// Front lenses preview mirrored, like a looking glass.
    pub fn mirrored(self) -> bool {
        self == LensFacing::Front
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraEntry {
    pub id: String,
    pub lens: LensFacing,
    /// Clockwise degrees the sensor image must turn to be upright
    pub sensor_orientation: i32,
}

/// Cameras the provider can bind, in platform order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraCatalog {
    pub cameras: Vec<CameraEntry>,
}

impl CameraCatalog {
    pub fn new(cameras: Vec<CameraEntry>) -> Self {
        Self { cameras }
    }

    /// First camera facing `lens`.
    pub fn find(&self, lens: LensFacing) -> Option<&CameraEntry> {
        self.cameras.iter().find(|camera| camera.lens == lens)
    }

    /// Desktop webcams carry no facing information, so lenses map to
    /// configured device indices.
    pub fn from_device_indices(back: usize, front: usize) -> Self {
        Self::new(vec![
            CameraEntry {
                id: back.to_string(),
                lens: LensFacing::Back,
                sensor_orientation: 0,
            },
            CameraEntry {
                id: front.to_string(),
                lens: LensFacing::Front,
                sensor_orientation: 0,
            },
        ])
    }
}

/// Most recent upright preview frame, the capture source. Never mirrored.
pub type LatestFrame = Arc<Mutex<Option<RgbaImage>>>;

/// Publishes an upright frame: the viewfinder gets it mirrored when `mirror`
/// is set, the capture slot always keeps it as the sensor saw it.
pub fn publish_frame(
    frame: RgbaImage,
    mirror: bool,
    latest: &LatestFrame,
    frame_sender: &Sender<SharedPixelBuffer<Rgba8Pixel>>,
) -> Result<()> {
    let buf = if mirror {
        let shown = image::imageops::flip_horizontal(&frame);
        SharedPixelBuffer::clone_from_slice(shown.as_raw(), shown.width(), shown.height())
    } else {
        SharedPixelBuffer::clone_from_slice(frame.as_raw(), frame.width(), frame.height())
    };
    if let Ok(mut slot) = latest.lock() {
        *slot = Some(frame);
    }
    frame_sender.send(buf).map_err(|err| anyhow!("{:?}", err))
}

/// Picks the stream size to ask the sensor for: the largest supported size
/// that fits inside `wanted`, else the smallest supported one.
pub fn closest_size(supported: &[(u32, u32)], wanted: (u32, u32)) -> Option<(u32, u32)> {
    let area = |&(w, h): &(u32, u32)| u64::from(w) * u64::from(h);
    supported
        .iter()
        .filter(|(w, h)| *w <= wanted.0 && *h <= wanted.1)
        .max_by_key(|size| area(size))
        .or_else(|| supported.iter().min_by_key(|size| area(size)))
        .copied()
}

/// Encodes `frame` to `output` and decodes the written file for display.
fn save_photo(frame: &RgbaImage, output: PathBuf, quality: u8) -> Result<SavedPhoto> {
    storage::save_jpeg(frame, &output, quality)?;
    let image = storage::load_rgba(&output)?;
    Ok(SavedPhoto { path: output, image })
}

/// Platform camera behind the controller's provider/bind/capture calls.
pub struct Camera {
    #[cfg(target_os = "android")]
    camera: Option<Box<AndroidCamera>>,
    #[cfg(not(target_os = "android"))]
    camera: pcam::Camera,
    #[cfg_attr(not(target_os = "android"), allow(dead_code))]
    frame_sender: Sender<SharedPixelBuffer<Rgba8Pixel>>,
    latest: LatestFrame,
    events: Sender<Event>,
    executor: Executor,
    config: Config,
}

impl Camera {
    pub fn new(
        frame_sender: Sender<SharedPixelBuffer<Rgba8Pixel>>,
        events: Sender<Event>,
        executor: Executor,
        config: Config,
    ) -> Self {
        let latest: LatestFrame = Arc::new(Mutex::new(None));
        Camera {
            #[cfg(target_os = "android")]
            camera: None,
            #[cfg(not(target_os = "android"))]
            camera: pcam::Camera::new(frame_sender.clone(), latest.clone()),
            frame_sender,
            latest,
            events,
            executor,
            config,
        }
    }

    fn enumerate(config: &Config) -> Result<CameraCatalog> {
        #[cfg(target_os = "android")]
        {
            let _ = config;
            camera2::enumerate_cameras()
        }
        #[cfg(not(target_os = "android"))]
        {
            Ok(CameraCatalog::from_device_indices(
                config.back_device,
                config.front_device,
            ))
        }
    }

    fn post(events: &Sender<Event>, event: Event) {
        if events.send(event).is_err() {
            error!("event loop is gone");
        }
    }
}

impl CameraBackend for Camera {
    fn acquire_provider(&mut self) {
        let events = self.events.clone();
        let config = self.config.clone();
        let res = self.executor.execute(move || {
            let result = Camera::enumerate(&config).map_err(|err| err.to_string());
            Camera::post(&events, Event::ProviderReady(result));
        });
        if let Err(err) = res {
            Camera::post(&self.events, Event::ProviderReady(Err(err.to_string())));
        }
    }

    fn bind(&mut self, catalog: &CameraCatalog, lens: LensFacing) -> Result<()> {
        let entry = catalog
            .find(lens)
            .ok_or_else(|| anyhow!("No {lens:?} camera available"))?;
        info!("binding camera {} ({lens:?})", entry.id);
        let (width, height) = (self.config.preview_width, self.config.preview_height);
        #[cfg(target_os = "android")]
        {
            let mut camera = Box::new(AndroidCamera::new(
                self.frame_sender.clone(),
                self.latest.clone(),
            ));
            camera.open(entry)?;
            camera.start_preview(width, height)?;
            self.camera = Some(camera);
        }
        #[cfg(not(target_os = "android"))]
        {
            let index: usize = entry
                .id
                .parse()
                .map_err(|_| anyhow!("bad device index {}", entry.id))?;
            self.camera.start_preview(index, lens, width, height)?;
        }
        Ok(())
    }

    fn unbind_all(&mut self) {
        #[cfg(target_os = "android")]
        {
            // Drop closes the device
            self.camera = None;
        }
        #[cfg(not(target_os = "android"))]
        self.camera.stop_preview();
        if let Ok(mut slot) = self.latest.lock() {
            *slot = None;
        }
    }

    fn take_picture(&mut self, output: PathBuf) {
        let frame = self.latest.lock().ok().and_then(|slot| slot.clone());
        let Some(frame) = frame else {
            Camera::post(
                &self.events,
                Event::PhotoFailed("No frame available for capture".to_string()),
            );
            return;
        };
        let events = self.events.clone();
        let quality = self.config.jpeg_quality;
        let res = self.executor.execute(move || {
            let event = match save_photo(&frame, output, quality) {
                Ok(photo) => Event::PhotoSaved(photo),
                Err(err) => Event::PhotoFailed(err.to_string()),
            };
            Camera::post(&events, event);
        });
        if let Err(err) = res {
            Camera::post(&self.events, Event::PhotoFailed(err.to_string()));
        }
    }
}
