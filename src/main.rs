use anyhow::Result;

#[cfg(not(target_os = "android"))]
fn main() -> Result<()> {
    snap_camera::run_desktop()
}

#[cfg(target_os = "android")]
fn main() -> Result<()> {
    // The activity enters through `android_main` in the library.
    Ok(())
}
