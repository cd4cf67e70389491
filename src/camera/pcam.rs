use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use image::RgbaImage;
use kamera::Camera as KCamera;
use log::{debug, info, warn};
use slint::{Rgba8Pixel, SharedPixelBuffer};

use super::{publish_frame, yuv, LatestFrame, LensFacing};
use crate::worker::join_within;

/// How long a stop waits for the capture thread before leaving it behind.
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Desktop webcam preview on its own thread.
pub struct Camera {
    running: Option<Arc<AtomicBool>>,
    camera_task: Option<(JoinHandle<Result<()>>, Receiver<()>)>,
    frame_sender: Sender<SharedPixelBuffer<Rgba8Pixel>>,
    latest: LatestFrame,
}

impl Camera {
    pub fn new(frame_sender: Sender<SharedPixelBuffer<Rgba8Pixel>>, latest: LatestFrame) -> Self {
        Self {
            running: None,
            camera_task: None,
            frame_sender,
            latest,
        }
    }

    /// The webcam picks its own resolution, `width`/`height` are a hint only.
    pub fn start_preview(&mut self, index: usize, lens: LensFacing, width: u32, height: u32) -> Result<()> {
        self.stop_preview();
        debug!("requested preview {width}x{height}");
        let running = Arc::new(AtomicBool::new(true));
        let frame_sender = self.frame_sender.clone();
        let latest = self.latest.clone();
        let (opened_sender, opened) = channel();
        let task_running = running.clone();
        let (exited, task_exited) = channel::<()>();
        let task = std::thread::spawn(move || {
            // dropped on every exit path, including panics
            let _exited = exited;
            let running = task_running;
            let camera = match KCamera::new_device(index) {
                None => {
                    let _ = opened_sender.send(false);
                    return Err(anyhow!("Camera {index} not found"));
                }
                Some(v) => v,
            };
            let _ = opened_sender.send(true);
            camera.start();
            let mut count = 0;
            let mut timer = Instant::now();
            let mut rgba_buffer = vec![];
            while running.load(Ordering::Acquire) {
                let frame = match camera.wait_for_frame() {
                    Some(f) => f,
                    None => {
                        warn!("no frame from camera {index}");
                        std::thread::sleep(Duration::from_millis(10));
                        continue;
                    }
                };
                if !running.load(Ordering::Acquire) {
                    break;
                }

                let (width, height) = frame.size_u32();
                yuv::bgra_to_rgba(frame.data().data_u8(), &mut rgba_buffer);
                let Some(image) = RgbaImage::from_raw(width, height, rgba_buffer.clone()) else {
                    continue;
                };
                if publish_frame(image, lens.mirrored(), &latest, &frame_sender).is_err() {
                    break;
                }

                count += 1;
                if timer.elapsed().as_millis() > 1000 {
                    debug!("preview FPS:{count} {width}x{height}");
                    count = 0;
                    timer = Instant::now();
                }
            }
            camera.stop();
            Ok(())
        });
        if !opened.recv().unwrap_or(false) {
            return match task.join() {
                Ok(Err(err)) => Err(err),
                _ => Err(anyhow!("Camera {index} failed to open")),
            };
        }
        self.running = Some(running);
        self.camera_task = Some((task, task_exited));
        info!("camera {index} preview started");
        Ok(())
    }

    pub fn stop_preview(&mut self) {
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::Release);
        }
        if let Some((handle, exited)) = self.camera_task.take() {
            match join_within(handle, &exited, STOP_TIMEOUT) {
                Some(res) => info!("stop preview: {:?}", res),
                None => warn!("camera thread still waiting for a frame, left behind"),
            }
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.stop_preview();
    }
}
