//! Snap Camera: a single screen that previews the camera, flips between the
//! front and back lens and saves still photos.

#[cfg(target_os = "android")]
mod android;
mod app;

pub mod camera;
pub mod config;
pub mod controller;
pub mod storage;
pub mod worker;

pub use camera::{CameraCatalog, CameraEntry, LensFacing};
pub use config::Config;
pub use controller::{
    CameraBackend, CameraScreen, Event, Permissions, SavedPhoto, Screen, ScreenSettings,
};

#[cfg(target_os = "android")]
#[no_mangle]
fn android_main(app: slint::android::AndroidApp) {
    use slint::android::android_activity::{MainEvent, PollEvent};

    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag("snap_camera"),
    );

    let (event_sender, event_receiver) = std::sync::mpsc::channel();
    let lifecycle = event_sender.clone();
    let res = slint::android::init_with_event_listener(app.clone(), move |event| {
        let event = match event {
            PollEvent::Main(MainEvent::GainedFocus) => Event::FocusChanged(true),
            PollEvent::Main(MainEvent::LostFocus) => Event::FocusChanged(false),
            PollEvent::Main(MainEvent::Resume { .. }) => Event::Visible(true),
            PollEvent::Main(MainEvent::Pause) => Event::Visible(false),
            _ => return,
        };
        let _ = lifecycle.send(event);
    });
    if let Err(err) = res {
        log::error!("slint init failed: {err:?}");
        return;
    }
    if let Err(err) = app::run(app, event_sender, event_receiver) {
        log::error!("{err:?}");
    }
}

/// Desktop entry point, used by the `snap_camera` binary.
#[cfg(not(target_os = "android"))]
pub fn run_desktop() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let (event_sender, event_receiver) = std::sync::mpsc::channel();
    app::run(event_sender, event_receiver)
}
