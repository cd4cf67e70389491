//! Drives the camera screen controller through fake platform pieces.

use std::{
    cell::Cell,
    path::PathBuf,
    rc::Rc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use image::{Rgba, RgbaImage};
use snap_camera::{
    controller::{Binding, PermissionState, PERMISSION_DENIED_MESSAGE},
    storage, worker::Executor, CameraBackend, CameraCatalog, CameraEntry, CameraScreen, Event,
    LensFacing, Permissions, SavedPhoto, Screen, ScreenSettings,
};
use tempfile::TempDir;

#[derive(Default)]
struct FakeBackend {
    acquisitions: usize,
    binds: Vec<LensFacing>,
    unbinds: usize,
    /// Frame the capture pipeline would snapshot
    frame: Option<RgbaImage>,
    /// Completions waiting to be delivered to the controller
    pending: Vec<Event>,
}

impl CameraBackend for FakeBackend {
    fn acquire_provider(&mut self) {
        self.acquisitions += 1;
    }

    fn bind(&mut self, catalog: &CameraCatalog, lens: LensFacing) -> Result<()> {
        if catalog.find(lens).is_none() {
            return Err(anyhow!("No {lens:?} camera available"));
        }
        self.binds.push(lens);
        Ok(())
    }

    fn unbind_all(&mut self) {
        self.unbinds += 1;
    }

    fn take_picture(&mut self, output: PathBuf) {
        let event = match &self.frame {
            None => Event::PhotoFailed("No frame available for capture".to_string()),
            Some(frame) => match storage::save_jpeg(frame, &output, 90) {
                Ok(()) => Event::PhotoSaved(SavedPhoto {
                    path: output,
                    image: frame.clone(),
                }),
                Err(err) => Event::PhotoFailed(err.to_string()),
            },
        };
        self.pending.push(event);
    }
}

#[derive(Default)]
struct FakeScreen {
    messages: Vec<String>,
    shown: Vec<PathBuf>,
    photo_visible: bool,
    delayed: Vec<(Duration, Event)>,
    finished: bool,
}

impl Screen for FakeScreen {
    fn show_message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }

    fn show_photo(&mut self, photo: &SavedPhoto) {
        self.shown.push(photo.path.clone());
        self.photo_visible = true;
    }

    fn hide_photo(&mut self) {
        self.photo_visible = false;
    }

    fn post_delayed(&mut self, delay: Duration, event: Event) {
        self.delayed.push((delay, event));
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

#[derive(Clone, Default)]
struct FakePermissions {
    granted: Rc<Cell<bool>>,
    requests: Rc<Cell<usize>>,
    fail_request: bool,
}

impl Permissions for FakePermissions {
    fn is_granted(&self, _permission: &str) -> bool {
        self.granted.get()
    }

    fn request(&mut self, _permissions: &[&str]) -> Result<()> {
        self.requests.set(self.requests.get() + 1);
        if self.fail_request {
            return Err(anyhow!("no activity"));
        }
        Ok(())
    }
}

type Controller = CameraScreen<FakeBackend, FakeScreen, FakePermissions>;

const SETTLE: Duration = Duration::from_millis(1500);

fn catalog() -> CameraCatalog {
    CameraCatalog::new(vec![
        CameraEntry {
            id: "0".to_string(),
            lens: LensFacing::Back,
            sensor_orientation: 90,
        },
        CameraEntry {
            id: "1".to_string(),
            lens: LensFacing::Front,
            sensor_orientation: 270,
        },
    ])
}

fn controller(permissions: FakePermissions, dir: &TempDir) -> Controller {
    let backend = FakeBackend {
        frame: Some(RgbaImage::from_pixel(8, 6, Rgba([10, 120, 200, 255]))),
        ..FakeBackend::default()
    };
    CameraScreen::new(
        backend,
        FakeScreen::default(),
        permissions,
        Executor::new("test-executor").unwrap(),
        ScreenSettings {
            output_dir: dir.path().to_path_buf(),
            default_lens: LensFacing::Back,
            photo_display: Duration::from_secs(2),
            permission_settle: SETTLE,
        },
    )
}

fn granted() -> FakePermissions {
    let permissions = FakePermissions::default();
    permissions.granted.set(true);
    permissions
}

/// Activates with the permission already granted and delivers the provider.
fn bound_controller(dir: &TempDir) -> Controller {
    let mut screen = controller(granted(), dir);
    screen.activate();
    screen.handle(Event::ProviderReady(Ok(catalog())));
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Back));
    screen
}

fn deliver_pending(screen: &mut Controller) {
    // backend completions arrive through the event loop
    let pending = std::mem::take(&mut screen.backend_mut().pending);
    for event in pending {
        screen.handle(event);
    }
}

fn photos(dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn granting_permission_binds_back_camera() {
    let dir = TempDir::new().unwrap();
    let permissions = FakePermissions::default();
    let mut screen = controller(permissions.clone(), &dir);

    screen.activate();
    assert_eq!(permissions.requests.get(), 1);
    assert_eq!(
        screen.permission(),
        PermissionState::Requested { dialog_shown: false }
    );
    assert_eq!(screen.backend().acquisitions, 0);

    // the dialog takes focus, the user grants, focus comes back
    screen.handle(Event::FocusChanged(false));
    permissions.granted.set(true);
    screen.handle(Event::FocusChanged(true));
    assert_eq!(screen.permission(), PermissionState::Granted);
    assert_eq!(screen.binding(), Binding::Acquiring);
    assert_eq!(screen.backend().acquisitions, 1);

    screen.handle(Event::ProviderReady(Ok(catalog())));
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Back));
    assert_eq!(screen.backend().binds, vec![LensFacing::Back]);
    assert!(screen.screen().messages.is_empty());
}

#[test]
fn focus_before_dialog_does_not_decide() {
    let dir = TempDir::new().unwrap();
    let permissions = FakePermissions::default();
    let mut screen = controller(permissions.clone(), &dir);

    screen.activate();
    screen.handle(Event::FocusChanged(true));
    assert_eq!(
        screen.permission(),
        PermissionState::Requested { dialog_shown: false }
    );
    assert!(!screen.is_finished());
}

#[test]
fn request_without_dialog_is_read_after_settle() {
    let dir = TempDir::new().unwrap();
    let mut screen = controller(FakePermissions::default(), &dir);

    // blocked by policy: no dialog, no focus or visibility change
    screen.activate();
    assert_eq!(
        screen.screen().delayed,
        vec![(SETTLE, Event::PermissionCheck)]
    );
    screen.handle(Event::FocusChanged(true));
    assert!(!screen.is_finished());

    screen.handle(Event::PermissionCheck);
    assert_eq!(screen.permission(), PermissionState::Denied);
    assert!(screen.screen().finished);
    assert_eq!(screen.screen().messages, vec![PERMISSION_DENIED_MESSAGE]);
}

#[test]
fn settle_check_waits_for_open_dialog() {
    let dir = TempDir::new().unwrap();
    let permissions = FakePermissions::default();
    let mut screen = controller(permissions.clone(), &dir);

    screen.activate();
    screen.handle(Event::FocusChanged(false));
    screen.handle(Event::PermissionCheck);
    assert_eq!(
        screen.permission(),
        PermissionState::Requested { dialog_shown: true }
    );

    permissions.granted.set(true);
    screen.handle(Event::FocusChanged(true));
    assert_eq!(screen.permission(), PermissionState::Granted);
    assert_eq!(screen.binding(), Binding::Acquiring);
}

#[test]
fn resume_after_dialog_decides() {
    let dir = TempDir::new().unwrap();
    let permissions = FakePermissions::default();
    let mut screen = controller(permissions.clone(), &dir);

    // the permission activity pauses the screen without a focus event
    screen.activate();
    screen.handle(Event::Visible(false));
    permissions.granted.set(true);
    screen.handle(Event::Visible(true));

    assert_eq!(screen.permission(), PermissionState::Granted);
    assert_eq!(screen.backend().acquisitions, 1);
    screen.handle(Event::ProviderReady(Ok(catalog())));
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Back));
}

#[test]
fn denying_permission_closes_with_one_message() {
    let dir = TempDir::new().unwrap();
    let mut screen = controller(FakePermissions::default(), &dir);

    screen.activate();
    screen.handle(Event::FocusChanged(false));
    screen.handle(Event::FocusChanged(true));

    assert_eq!(screen.permission(), PermissionState::Denied);
    assert!(screen.is_finished());
    assert!(screen.screen().finished);
    assert_eq!(screen.screen().messages, vec![PERMISSION_DENIED_MESSAGE]);

    // nothing else happens once finished
    screen.handle(Event::FocusChanged(false));
    screen.handle(Event::FocusChanged(true));
    screen.handle(Event::TakePhoto);
    screen.handle(Event::FlipCamera);
    assert_eq!(screen.screen().messages.len(), 1);
    assert_eq!(screen.backend().acquisitions, 0);
}

#[test]
fn failed_request_counts_as_denial() {
    let dir = TempDir::new().unwrap();
    let permissions = FakePermissions {
        fail_request: true,
        ..FakePermissions::default()
    };
    let mut screen = controller(permissions, &dir);

    screen.activate();
    assert!(screen.is_finished());
    assert_eq!(screen.screen().messages, vec![PERMISSION_DENIED_MESSAGE]);
}

#[test]
fn flipping_twice_restores_selector() {
    let dir = TempDir::new().unwrap();
    let mut screen = bound_controller(&dir);
    let unbinds = screen.backend().unbinds;

    screen.handle(Event::FlipCamera);
    assert_eq!(screen.lens(), LensFacing::Front);
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Front));

    screen.handle(Event::FlipCamera);
    assert_eq!(screen.lens(), LensFacing::Back);
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Back));

    // each flip is a full rebind on the cached provider
    assert_eq!(
        screen.backend().binds,
        vec![LensFacing::Back, LensFacing::Front, LensFacing::Back]
    );
    assert_eq!(screen.backend().unbinds, unbinds + 2);
    assert_eq!(screen.backend().acquisitions, 1);
}

#[test]
fn flip_before_permission_only_toggles() {
    let dir = TempDir::new().unwrap();
    let mut screen = controller(FakePermissions::default(), &dir);
    screen.activate();

    screen.handle(Event::FlipCamera);
    assert_eq!(screen.lens(), LensFacing::Front);
    assert_eq!(screen.binding(), Binding::Unbound);
    assert_eq!(screen.backend().acquisitions, 0);
}

#[test]
fn capture_without_binding_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let mut screen = controller(FakePermissions::default(), &dir);
    screen.activate();

    screen.handle(Event::TakePhoto);
    deliver_pending(&mut screen);

    assert!(photos(&dir).is_empty());
    assert!(screen.screen().messages.is_empty());
    assert!(screen.screen().shown.is_empty());
}

#[test]
fn capture_writes_one_file_and_hides_overlay() {
    let dir = TempDir::new().unwrap();
    let mut screen = bound_controller(&dir);

    screen.handle(Event::TakePhoto);
    deliver_pending(&mut screen);

    let files = photos(&dir);
    assert_eq!(files.len(), 1);
    let stem = files[0].strip_suffix(".jpg").unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(stem, storage::FILENAME_FORMAT).is_ok());

    assert_eq!(screen.screen().shown, vec![dir.path().join(&files[0])]);
    assert!(screen.screen().photo_visible);
    let (delay, hide) = screen.screen().delayed[0].clone();
    assert_eq!(delay, Duration::from_secs(2));

    screen.handle(hide);
    assert!(!screen.screen().photo_visible);
}

#[test]
fn earlier_timer_does_not_hide_later_photo() {
    let dir = TempDir::new().unwrap();
    let mut screen = bound_controller(&dir);

    for name in ["a.jpg", "b.jpg"] {
        screen.handle(Event::PhotoSaved(SavedPhoto {
            path: dir.path().join(name),
            image: RgbaImage::new(4, 3),
        }));
    }
    let delayed = screen.screen().delayed.clone();
    assert_eq!(delayed.len(), 2);

    screen.handle(delayed[0].1.clone());
    assert!(screen.screen().photo_visible);
    screen.handle(delayed[1].1.clone());
    assert!(!screen.screen().photo_visible);
}

#[test]
fn capture_error_leaves_overlay_alone() {
    let dir = TempDir::new().unwrap();
    let mut screen = bound_controller(&dir);
    screen.backend_mut().frame = None;

    screen.handle(Event::TakePhoto);
    deliver_pending(&mut screen);

    assert!(screen.screen().shown.is_empty());
    assert!(!screen.screen().photo_visible);
    assert!(screen.screen().delayed.is_empty());
    assert_eq!(
        screen.screen().messages,
        vec!["No frame available for capture".to_string()]
    );
    assert!(photos(&dir).is_empty());
}

#[test]
fn provider_failure_is_reported_and_retried() {
    let dir = TempDir::new().unwrap();
    let mut screen = controller(granted(), &dir);
    screen.activate();

    screen.handle(Event::ProviderReady(Err("camera service unavailable".to_string())));
    assert_eq!(screen.binding(), Binding::Unbound);
    assert_eq!(screen.screen().messages, vec!["camera service unavailable"]);

    screen.handle(Event::FlipCamera);
    assert_eq!(screen.backend().acquisitions, 2);
    screen.handle(Event::ProviderReady(Ok(catalog())));
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Front));
}

#[test]
fn missing_lens_leaves_screen_unbound() {
    let dir = TempDir::new().unwrap();
    let mut screen = controller(granted(), &dir);
    screen.activate();

    let back_only = CameraCatalog::new(vec![catalog().cameras[0].clone()]);
    screen.handle(Event::ProviderReady(Ok(back_only)));
    screen.handle(Event::FlipCamera);

    assert_eq!(screen.binding(), Binding::Unbound);
    assert_eq!(screen.screen().messages, vec!["No Front camera available"]);

    screen.handle(Event::TakePhoto);
    deliver_pending(&mut screen);
    assert!(photos(&dir).is_empty());
}

#[test]
fn hidden_screen_releases_and_rebinds() {
    let dir = TempDir::new().unwrap();
    let mut screen = bound_controller(&dir);

    screen.handle(Event::Visible(false));
    assert_eq!(screen.binding(), Binding::Unbound);

    screen.handle(Event::Visible(true));
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Back));
    assert_eq!(screen.backend().acquisitions, 1);
}

#[test]
fn bind_while_hidden_waits_for_show() {
    let dir = TempDir::new().unwrap();
    let mut screen = controller(granted(), &dir);
    screen.activate();
    assert_eq!(screen.binding(), Binding::Acquiring);

    screen.handle(Event::Visible(false));
    screen.handle(Event::ProviderReady(Ok(catalog())));
    assert_eq!(screen.binding(), Binding::Unbound);
    assert!(screen.backend().binds.is_empty());

    screen.handle(Event::Visible(true));
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Back));
    assert_eq!(screen.backend().acquisitions, 1);
}

#[test]
fn flip_during_acquisition_binds_new_lens() {
    let dir = TempDir::new().unwrap();
    let mut screen = controller(granted(), &dir);
    screen.activate();

    screen.handle(Event::FlipCamera);
    assert_eq!(screen.lens(), LensFacing::Front);
    assert_eq!(screen.binding(), Binding::Acquiring);
    assert_eq!(screen.backend().acquisitions, 1);

    screen.handle(Event::ProviderReady(Ok(catalog())));
    assert_eq!(screen.binding(), Binding::Bound(LensFacing::Front));
    assert_eq!(screen.backend().binds, vec![LensFacing::Front]);
}

#[test]
fn destroy_shuts_down_executor() {
    let dir = TempDir::new().unwrap();
    let executor = Executor::new("test-destroy").unwrap();
    let mut screen = CameraScreen::new(
        FakeBackend::default(),
        FakeScreen::default(),
        granted(),
        executor.clone(),
        ScreenSettings {
            output_dir: dir.path().to_path_buf(),
            default_lens: LensFacing::Front,
            photo_display: Duration::from_secs(2),
            permission_settle: SETTLE,
        },
    );
    screen.activate();
    assert_eq!(screen.lens(), LensFacing::Front);

    screen.handle(Event::Destroy);
    assert!(executor.is_shutdown());
    assert!(screen.is_finished());
}
