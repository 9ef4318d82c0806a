// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Decoding barcodes from image files
//! - Running a scanning session against the virtual camera
//! - Inspecting settings

use chrono::Local;
use scancam::app::frame_processor::{Decoder, LuminanceFrame, QrDecoder, Symbol};
use scancam::app::session::DisplayOrientationTracker;
use scancam::backends::camera::{CameraInfo, Facing, Size};
use scancam::backends::virtual_camera::{FrameDelivery, VirtualCameraProvider, load_luma_frame};
use scancam::{CameraSession, OffscreenSurface, PictureInfo, PictureRequest, Settings};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

/// Arguments of the `simulate` command
pub struct SimulateOptions {
    pub image: PathBuf,
    pub view: String,
    pub display_rotation: u32,
    pub orientation: u32,
    pub settings: Option<PathBuf>,
    pub photo: Option<Option<PathBuf>>,
    pub timeout: u64,
}

fn print_symbol(symbol: &Symbol) {
    match symbol.region {
        Some(region) => println!(
            "{}\t{}\t({:.3}, {:.3}, {:.3}x{:.3})",
            symbol.format, symbol.text, region.x, region.y, region.width, region.height
        ),
        None => println!("{}\t{}", symbol.format, symbol.text),
    }
}

/// Decode symbols from an image file
pub fn decode_image(path: &Path, multiple: bool) -> Result<(), Box<dyn std::error::Error>> {
    let image = load_luma_frame(path)?;
    let frame = LuminanceFrame::new(image.size.width, image.size.height, image.data)
        .ok_or("Image has no pixels")?;

    let mut decoder = QrDecoder::new();
    let symbols = if multiple {
        decoder.decode_multiple(&frame)
    } else {
        decoder.decode(&frame).into_iter().collect()
    };

    if symbols.is_empty() {
        println!("No symbol found.");
        return Ok(());
    }
    for symbol in &symbols {
        print_symbol(symbol);
    }
    Ok(())
}

/// Run a scanning session against the virtual camera
pub fn simulate(options: SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let view: Size = options
        .view
        .parse()
        .map_err(|e| format!("Invalid view size '{}': {}", options.view, e))?;
    let settings = match options.settings.as_deref() {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let timeout = Duration::from_secs(options.timeout);

    let provider = VirtualCameraProvider::with_camera(
        CameraInfo {
            id: "virtual".to_string(),
            facing: Facing::Back,
            orientation: options.orientation % 360,
        },
        Some(scancam::backends::virtual_camera::default_parameters()),
    );
    let control = provider.control();
    control.set_delivery(FrameDelivery::Immediate);
    control.set_image(load_luma_frame(&options.image)?);

    let display = Arc::new(DisplayOrientationTracker::new(Some(options.display_rotation)));
    let surface = Arc::new(OffscreenSurface::available(view));
    let session = CameraSession::builder(provider, surface)
        .display(display)
        .settings(settings)
        .build();
    println!("Session {} started", session.id());

    session.on_view_sized(view.width, view.height);
    session.on_surface_available(view.width, view.height);
    let result = session.scan_once();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let scanned = runtime.block_on(async move { tokio::time::timeout(timeout, result).await });

    match scanned {
        Ok(Ok(symbol)) => print_symbol(&symbol),
        Ok(Err(_)) => println!("Scan cancelled (session state: {}).", session.state()),
        Err(_) => println!(
            "No symbol within {}s (session state: {}).",
            options.timeout,
            session.state()
        ),
    }

    if let Some(photo) = options.photo {
        let (jpeg, info) = take_picture(&session, timeout)?;
        let path = photo_path(photo);
        std::fs::write(&path, &jpeg)?;
        println!(
            "Photo saved: {} ({} bytes, rotate {}°)",
            path.display(),
            jpeg.len(),
            info.capture_rotation
        );
    }

    session.destroy();
    println!(
        "Frames served: {}, camera opens: {}",
        control.frames_delivered(),
        control.open_count()
    );
    Ok(())
}

fn take_picture(
    session: &CameraSession,
    timeout: Duration,
) -> Result<(Vec<u8>, PictureInfo), Box<dyn std::error::Error>> {
    let (tx, rx) = mpsc::channel();
    let error_tx = tx.clone();
    session.take_picture(
        PictureRequest::new()
            .auto_restart_preview(true)
            .on_jpeg(move |jpeg, info| {
                let _ = tx.send(Ok((jpeg, info)));
            })
            .on_error(move |e| {
                let _ = error_tx.send(Err(e));
            }),
    );
    let picture = rx
        .recv_timeout(timeout)
        .map_err(|_| "Timed out waiting for the picture")??;
    Ok(picture)
}

/// Resolve the output file, defaulting to `photo_<timestamp>.jpg`
fn photo_path(requested: Option<PathBuf>) -> PathBuf {
    let filename = format!("photo_{}.jpg", Local::now().format("%Y%m%d_%H%M%S"));
    match requested {
        Some(path) if path.is_dir() => path.join(filename),
        Some(path) => path,
        None => PathBuf::from(filename),
    }
}

/// Print the effective settings as JSON
pub fn print_settings(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = match path.or_else(Settings::default_path) {
        Some(path) => Settings::load_or_default(&path)?,
        None => Settings::default(),
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
