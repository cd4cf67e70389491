//! Screen controller: permission gate, camera binding, flip and capture.
//!
//! Everything here runs on the UI thread. Slow or asynchronous work is
//! started through [`CameraBackend`] and comes back later as an [`Event`].

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use chrono::Local;
use image::RgbaImage;
use log::{debug, error, info, warn};

use crate::{
    camera::{CameraCatalog, LensFacing},
    storage,
    worker::Executor,
};

pub const CAMERA_PERMISSION: &str = "android.permission.CAMERA";
pub const REQUIRED_PERMISSIONS: &[&str] = &[CAMERA_PERMISSION];
pub const PERMISSION_DENIED_MESSAGE: &str = "Permissions not granted";

/// A written photo, decoded back from disk for the overlay.
#[derive(Clone, PartialEq)]
pub struct SavedPhoto {
    pub path: PathBuf,
    pub image: RgbaImage,
}

impl fmt::Debug for SavedPhoto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedPhoto")
            .field("path", &self.path)
            .field("size", &self.image.dimensions())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Window focus changes; the permission dialog steals focus while shown.
    FocusChanged(bool),
    /// Screen visibility; the binding follows it.
    Visible(bool),
    /// Reads an outstanding permission request that never showed a dialog.
    PermissionCheck,
    ProviderReady(Result<CameraCatalog, String>),
    FlipCamera,
    TakePhoto,
    PhotoSaved(SavedPhoto),
    PhotoFailed(String),
    /// Hide the overlay if it still shows the capture with this generation.
    HidePhoto(u64),
    Destroy,
}

pub trait CameraBackend {
    /// Starts provider acquisition, answered by [`Event::ProviderReady`].
    fn acquire_provider(&mut self);
    fn bind(&mut self, catalog: &CameraCatalog, lens: LensFacing) -> Result<()>;
    fn unbind_all(&mut self);
    /// Answered by [`Event::PhotoSaved`] or [`Event::PhotoFailed`].
    fn take_picture(&mut self, output: PathBuf);
}

pub trait Screen {
    fn show_message(&mut self, text: &str);
    fn show_photo(&mut self, photo: &SavedPhoto);
    fn hide_photo(&mut self);
    fn post_delayed(&mut self, delay: Duration, event: Event);
    fn finish(&mut self);
}

pub trait Permissions {
    fn is_granted(&self, permission: &str) -> bool;
    fn request(&mut self, permissions: &[&str]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unknown,
    /// Request issued; `dialog_shown` flips once focus or visibility has
    /// been lost to the system dialog.
    Requested { dialog_shown: bool },
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Acquiring,
    Bound(LensFacing),
}

pub struct ScreenSettings {
    pub output_dir: PathBuf,
    pub default_lens: LensFacing,
    pub photo_display: Duration,
    pub permission_settle: Duration,
}

pub struct CameraScreen<B, S, P> {
    backend: B,
    screen: S,
    permissions: P,
    executor: Executor,
    settings: ScreenSettings,
    lens: LensFacing,
    catalog: Option<CameraCatalog>,
    binding: Binding,
    permission: PermissionState,
    overlay: Option<u64>,
    captures: u64,
    hidden: bool,
    finished: bool,
}

impl<B, S, P> CameraScreen<B, S, P>
where
    B: CameraBackend,
    S: Screen,
    P: Permissions,
{
    pub fn new(backend: B, screen: S, permissions: P, executor: Executor, settings: ScreenSettings) -> Self {
        let lens = settings.default_lens;
        Self {
            backend,
            screen,
            permissions,
            executor,
            settings,
            lens,
            catalog: None,
            binding: Binding::Unbound,
            permission: PermissionState::Unknown,
            overlay: None,
            captures: 0,
            hidden: false,
            finished: false,
        }
    }

    pub fn lens(&self) -> LensFacing {
        self.lens
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn output_dir(&self) -> &Path {
        &self.settings.output_dir
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn screen(&self) -> &S {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    fn all_granted(&self) -> bool {
        REQUIRED_PERMISSIONS
            .iter()
            .all(|permission| self.permissions.is_granted(permission))
    }

    pub fn activate(&mut self) {
        if self.all_granted() {
            self.permission = PermissionState::Granted;
            self.start_camera(self.lens);
            return;
        }
        info!("requesting {:?}", REQUIRED_PERMISSIONS);
        match self.permissions.request(REQUIRED_PERMISSIONS) {
            Ok(()) => {
                self.permission = PermissionState::Requested { dialog_shown: false };
                self.screen
                    .post_delayed(self.settings.permission_settle, Event::PermissionCheck);
            }
            Err(err) => {
                error!("permission request failed: {err:?}");
                self.deny();
            }
        }
    }

    pub fn handle(&mut self, event: Event) {
        if self.finished && event != Event::Destroy {
            debug!("screen finished, dropping {event:?}");
            return;
        }
        match event {
            Event::FocusChanged(focused) => self.on_focus(focused),
            Event::Visible(visible) => self.on_visible(visible),
            Event::PermissionCheck => {
                // a request answered without any dialog
                if self.permission == (PermissionState::Requested { dialog_shown: false }) {
                    info!("no permission dialog appeared, reading the result");
                    self.decide_permission();
                }
            }
            Event::ProviderReady(result) => self.on_provider(result),
            Event::FlipCamera => self.switch_camera(),
            Event::TakePhoto => self.take_photo(),
            Event::PhotoSaved(photo) => self.on_photo_saved(photo),
            Event::PhotoFailed(msg) => {
                error!("capture failed: {msg}");
                self.screen.show_message(&msg);
            }
            Event::HidePhoto(generation) => {
                if self.overlay == Some(generation) {
                    self.overlay = None;
                    self.screen.hide_photo();
                }
            }
            Event::Destroy => self.destroy(),
        }
    }

    fn on_focus(&mut self, focused: bool) {
        let PermissionState::Requested { dialog_shown } = self.permission else {
            return;
        };
        if !focused {
            self.permission = PermissionState::Requested { dialog_shown: true };
        } else if dialog_shown || self.all_granted() {
            self.decide_permission();
        }
    }

    fn decide_permission(&mut self) {
        if self.all_granted() {
            info!("permission granted");
            self.permission = PermissionState::Granted;
            self.start_camera(self.lens);
        } else {
            self.deny();
        }
    }

    fn on_visible(&mut self, visible: bool) {
        if self.hidden == !visible {
            return;
        }
        self.hidden = !visible;
        if let PermissionState::Requested { dialog_shown } = self.permission {
            if !visible {
                self.permission = PermissionState::Requested { dialog_shown: true };
            } else if dialog_shown {
                self.decide_permission();
            }
            return;
        }
        if self.permission != PermissionState::Granted {
            return;
        }
        if visible {
            info!("screen visible, rebinding {:?}", self.lens);
            self.start_camera(self.lens);
        } else if matches!(self.binding, Binding::Bound(_)) {
            info!("screen hidden, releasing camera");
            self.backend.unbind_all();
            self.binding = Binding::Unbound;
        }
    }

    fn deny(&mut self) {
        warn!("permission denied, closing");
        self.permission = PermissionState::Denied;
        self.screen.show_message(PERMISSION_DENIED_MESSAGE);
        self.finished = true;
        self.screen.finish();
    }

    fn start_camera(&mut self, lens: LensFacing) {
        self.lens = lens;
        match self.catalog.take() {
            Some(catalog) => {
                self.bind(&catalog);
                self.catalog = Some(catalog);
            }
            None => {
                if self.binding != Binding::Acquiring {
                    self.binding = Binding::Acquiring;
                    self.backend.acquire_provider();
                }
            }
        }
    }

    fn on_provider(&mut self, result: Result<CameraCatalog, String>) {
        match result {
            Ok(catalog) => {
                info!("camera provider ready: {catalog:?}");
                self.bind(&catalog);
                self.catalog = Some(catalog);
            }
            Err(msg) => {
                error!("camera provider failed: {msg}");
                self.binding = Binding::Unbound;
                self.screen.show_message(&msg);
            }
        }
    }

    fn bind(&mut self, catalog: &CameraCatalog) {
        self.backend.unbind_all();
        self.binding = Binding::Unbound;
        if self.hidden {
            debug!("screen hidden, binding deferred");
            return;
        }
        match self.backend.bind(catalog, self.lens) {
            Ok(()) => {
                info!("bound {:?} camera", self.lens);
                self.binding = Binding::Bound(self.lens);
            }
            Err(err) => {
                error!("bind {:?} failed: {err:?}", self.lens);
                self.screen.show_message(&err.to_string());
            }
        }
    }

    pub fn switch_camera(&mut self) {
        let lens = self.lens.toggled();
        if self.permission == PermissionState::Granted {
            self.start_camera(lens);
        } else {
            self.lens = lens;
        }
    }

    pub fn take_photo(&mut self) {
        if !matches!(self.binding, Binding::Bound(_)) {
            debug!("no camera bound, ignoring capture");
            return;
        }
        let path = storage::photo_path(&self.settings.output_dir, &Local::now());
        info!("capturing to {}", path.display());
        self.backend.take_picture(path);
    }

    fn on_photo_saved(&mut self, photo: SavedPhoto) {
        info!("photo saved {}", photo.path.display());
        self.captures += 1;
        let generation = self.captures;
        self.overlay = Some(generation);
        self.screen.show_photo(&photo);
        self.screen
            .post_delayed(self.settings.photo_display, Event::HidePhoto(generation));
    }

    fn destroy(&mut self) {
        info!("screen destroyed");
        self.backend.unbind_all();
        self.binding = Binding::Unbound;
        self.executor.shutdown();
        self.finished = true;
    }
}
