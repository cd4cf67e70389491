//! Where photos go and how they are written.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone};
use image::{codecs::jpeg::JpegEncoder, ColorType, DynamicImage, RgbaImage};
use log::{info, warn};

/// File stem format, one file per second.
pub const FILENAME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
pub const PHOTO_EXTENSION: &str = "jpg";

pub fn photo_file_name<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}.{PHOTO_EXTENSION}", time.format(FILENAME_FORMAT))
}

pub fn photo_path<Tz>(dir: &Path, time: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    dir.join(photo_file_name(time))
}

/// `<external>/<app_name>` when it can be created, otherwise `internal`.
pub fn resolve_output_dir(external: Option<&Path>, app_name: &str, internal: &Path) -> PathBuf {
    if let Some(external) = external {
        let media_dir = external.join(app_name);
        if let Err(err) = fs::create_dir_all(&media_dir) {
            warn!("cannot create {}: {err}", media_dir.display());
        }
        if media_dir.is_dir() {
            return media_dir;
        }
    }
    info!("using internal storage {}", internal.display());
    internal.to_path_buf()
}

/// Desktop stand-ins for the external media dir and internal storage.
#[cfg(not(target_os = "android"))]
pub fn desktop_output_dir(app_name: &str) -> PathBuf {
    let internal = dirs::data_local_dir()
        .map(|dir| dir.join(app_name))
        .unwrap_or_else(|| PathBuf::from("."));
    if let Err(err) = fs::create_dir_all(&internal) {
        warn!("cannot create {}: {err}", internal.display());
    }
    resolve_output_dir(dirs::picture_dir().as_deref(), app_name, &internal)
}

/// Encodes `image` as JPEG at `path`.
///
/// Bytes go to `<path>.part` first and are renamed into place, so `path`
/// either holds a complete photo or does not exist.
pub fn save_jpeg(image: &RgbaImage, path: &Path, quality: u8) -> Result<()> {
    let part = part_path(path);
    let res = write_jpeg(image, &part, quality).and_then(|_| {
        fs::rename(&part, path)
            .map_err(|err| anyhow!("failed to move photo into {}: {err}", path.display()))
    });
    if res.is_err() {
        let _ = fs::remove_file(&part);
    }
    res
}

fn write_jpeg(image: &RgbaImage, path: &Path, quality: u8) -> Result<()> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let file = File::create(path)
        .map_err(|err| anyhow!("failed to create {}: {err}", path.display()))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100))
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|err| anyhow!("JPEG encoding failed: {err}"))?;
    writer.flush()?;
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

pub fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).map_err(|err| anyhow!("failed to open {}: {err}", path.display()))?;
    Ok(image.to_rgba8())
}
