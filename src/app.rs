use std::{
    cell::RefCell,
    path::PathBuf,
    rc::Rc,
    sync::mpsc::{channel, Receiver, Sender},
    time::Duration,
};

use anyhow::Result;
use log::{error, info};
use slint::{Image, SharedPixelBuffer, Timer, TimerMode};

#[cfg(target_os = "android")]
use crate::android;
use crate::{
    camera::Camera,
    config::Config,
    controller::{CameraScreen, Event, SavedPhoto, Screen, ScreenSettings},
    storage,
    worker::Executor,
};

slint::slint! {
    import { Button } from "std-widgets.slint";
    export component MainWindow inherits Window {
        in-out property <image> camera-texture <=> viewfinder.source;
        in-out property <image> photo;
        in-out property <bool> photo-visible: false;
        in-out property <string> message;
        in-out property <bool> message-visible: false;
        callback flip-camera();
        callback take-photo();

        preferred-width: 480px;
        preferred-height: 800px;
        background: black;

        viewfinder := Image {
            x: 0px;
            y: 0px;
            width: parent.width;
            height: parent.height;
            image-fit: contain;
        }

        if root.photo-visible: Rectangle {
            x: parent.width / 6;
            y: parent.height / 6;
            width: parent.width * 2 / 3;
            height: parent.height * 2 / 3;
            background: #000000c0;
            border-color: white;
            border-width: 2px;
            Image {
                width: parent.width;
                height: parent.height;
                source: root.photo;
                image-fit: contain;
            }
        }

        if root.message-visible: Rectangle {
            x: 16px;
            y: 24px;
            width: parent.width - 32px;
            height: 48px;
            border-radius: 8px;
            background: #303030e0;
            Text {
                width: parent.width;
                height: parent.height;
                text: root.message;
                color: white;
                wrap: word-wrap;
                horizontal-alignment: center;
                vertical-alignment: center;
            }
        }

        HorizontalLayout {
            x: 0px;
            y: parent.height - 96px;
            width: parent.width;
            height: 72px;
            padding: 12px;
            spacing: 24px;
            alignment: center;
            Button {
                text: "Flip";
                clicked => {
                    root.flip-camera();
                }
            }
            Button {
                text: "Capture";
                clicked => {
                    root.take-photo();
                }
            }
        }
    }
}

/// The controller's view of the slint window.
struct SlintScreen {
    window: slint::Weak<MainWindow>,
    events: Sender<Event>,
    message_timer: Timer,
    message_display: Duration,
    #[cfg(target_os = "android")]
    android_app: slint::android::AndroidApp,
}

impl Screen for SlintScreen {
    fn show_message(&mut self, text: &str) {
        info!("message: {text}");
        if let Some(window) = self.window.upgrade() {
            window.set_message(text.into());
            window.set_message_visible(true);
        }
        let window = self.window.clone();
        self.message_timer
            .start(TimerMode::SingleShot, self.message_display, move || {
                if let Some(window) = window.upgrade() {
                    window.set_message_visible(false);
                }
            });
    }

    fn show_photo(&mut self, photo: &SavedPhoto) {
        if let Some(window) = self.window.upgrade() {
            let image = &photo.image;
            let buf = SharedPixelBuffer::clone_from_slice(image.as_raw(), image.width(), image.height());
            window.set_photo(Image::from_rgba8(buf));
            window.set_photo_visible(true);
        }
    }

    fn hide_photo(&mut self) {
        if let Some(window) = self.window.upgrade() {
            window.set_photo_visible(false);
        }
    }

    fn post_delayed(&mut self, delay: Duration, event: Event) {
        let events = self.events.clone();
        Timer::single_shot(delay, move || {
            let _ = events.send(event);
        });
    }

    /// Leaves the last message up for its display time before closing.
    fn finish(&mut self) {
        #[cfg(target_os = "android")]
        let android_app = self.android_app.clone();
        Timer::single_shot(self.message_display, move || {
            #[cfg(target_os = "android")]
            let res = android::finish_activity(&android_app);
            #[cfg(not(target_os = "android"))]
            let res = slint::quit_event_loop().map_err(anyhow::Error::from);
            if let Err(err) = res {
                error!("finish failed: {err:?}");
            }
        });
    }
}

#[cfg(not(target_os = "android"))]
struct DesktopPermissions;

#[cfg(not(target_os = "android"))]
impl crate::controller::Permissions for DesktopPermissions {
    fn is_granted(&self, _permission: &str) -> bool {
        true
    }

    fn request(&mut self, _permissions: &[&str]) -> Result<()> {
        Ok(())
    }
}

/// Config and photo directory from the app's files dir and media dirs.
#[cfg(target_os = "android")]
fn storage_setup(android_app: &slint::android::AndroidApp) -> (Config, PathBuf) {
    let files_dir = android::files_dir(android_app).unwrap_or_else(|err| {
        error!("getFilesDir failed: {err:?}");
        android_app
            .internal_data_path()
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let config = Config::load_or_default(&Config::in_dir(&files_dir));
    let external = android::external_media_dir(android_app).unwrap_or_else(|err| {
        error!("getExternalMediaDirs failed: {err:?}");
        None
    });
    let output_dir = storage::resolve_output_dir(external.as_deref(), &config.app_name, &files_dir);
    (config, output_dir)
}

#[cfg(not(target_os = "android"))]
fn storage_setup() -> (Config, PathBuf) {
    let config = Config::load_or_default(&Config::desktop_path());
    let output_dir = storage::desktop_output_dir(&config.app_name);
    (config, output_dir)
}

pub fn run(
    #[cfg(target_os = "android")]
    android_app: slint::android::AndroidApp,
    event_sender: Sender<Event>,
    event_receiver: Receiver<Event>,
) -> Result<()> {
    let app = MainWindow::new()?;

    #[cfg(target_os = "android")]
    let (config, output_dir) = storage_setup(&android_app);
    #[cfg(not(target_os = "android"))]
    let (config, output_dir) = storage_setup();
    info!("photos are saved to {}", output_dir.display());

    let (frame_sender, frame_receiver) = channel();
    let executor = Executor::new("camera-executor")?;

    let camera = Camera::new(frame_sender, event_sender.clone(), executor.clone(), config.clone());
    let screen = SlintScreen {
        window: app.as_weak(),
        events: event_sender.clone(),
        message_timer: Timer::default(),
        message_display: config.message_display(),
        #[cfg(target_os = "android")]
        android_app: android_app.clone(),
    };
    #[cfg(target_os = "android")]
    let permissions = android::AndroidPermissions::new(android_app);
    #[cfg(not(target_os = "android"))]
    let permissions = DesktopPermissions;
    let settings = ScreenSettings {
        output_dir,
        default_lens: config.default_lens,
        photo_display: config.photo_display(),
        permission_settle: config.permission_settle(),
    };
    let controller = Rc::new(RefCell::new(CameraScreen::new(
        camera,
        screen,
        permissions,
        executor,
        settings,
    )));

    let sender = event_sender.clone();
    app.on_flip_camera(move || {
        let _ = sender.send(Event::FlipCamera);
    });
    let sender = event_sender;
    app.on_take_photo(move || {
        let _ = sender.send(Event::TakePhoto);
    });

    let app_weak = app.as_weak();
    let pump = controller.clone();
    let timer = Timer::default();
    timer.start(TimerMode::Repeated, Duration::from_millis(10), move || {
        if let (Some(buffer), Some(app)) = (frame_receiver.try_iter().last(), app_weak.upgrade()) {
            app.set_camera_texture(Image::from_rgba8(buffer));
        }
        for event in event_receiver.try_iter() {
            pump.borrow_mut().handle(event);
        }
    });

    controller.borrow_mut().activate();
    app.run()?;
    timer.stop();
    controller.borrow_mut().handle(Event::Destroy);
    Ok(())
}
