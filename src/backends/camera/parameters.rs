// SPDX-License-Identifier: GPL-3.0-only

//! Capture parameter negotiation
//!
//! Negotiation picks the preview and photo sizes that best fit the container,
//! then writes the user's settings to the hardware in two phases:
//!
//! 1. **Full**: focus mode, torch, colour effect, scene mode, preview size and
//!    photo size.
//! 2. **Safe**: only focus mode and preview size, tried when the hardware
//!    rejected the full set.
//!
//! The outcome is tagged with the phase that succeeded.

use super::CameraHardware;
use super::geometry::{self, PreviewTransform};
use super::types::{
    BackendError, BackendResult, CameraParameters, ColorEffect, FlashMode, FocusArea,
    HwFocusMode, PixelFormat, Rect, SceneMode, Size,
};
use crate::config::{FocusMode, Settings};
use crate::constants::{exposure, focus_area};
use tracing::{debug, info, warn};

/// Everything negotiation needs to know about the container and the user
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationRequest {
    /// Size of the view the preview is laid out in
    pub container_size: Size,
    pub display_rotation: u32,
    /// Rotation the hardware applies to the preview
    pub camera_display_orientation: u32,
    pub settings: Settings,
    /// Crop region in container pixels, if any
    pub crop_rect: Option<Rect>,
}

impl NegotiationRequest {
    pub fn is_camera_rotated(&self) -> bool {
        geometry::is_perpendicular(self.camera_display_orientation)
    }

    /// Container size expressed in the sensor's orientation
    pub fn desired_preview_size(&self) -> Size {
        if self.is_camera_rotated() {
            self.container_size.rotated()
        } else {
            self.container_size
        }
    }
}

/// Why negotiation produced no parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NegotiationFailure {
    #[error("camera exposes no parameters")]
    NoParameters,
    #[error("camera reports no usable preview size")]
    NoPreviewSize,
    #[error("camera rejected both full and safe parameters: {0}")]
    Rejected(BackendError),
}

/// Tagged result of [`negotiate`]
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationOutcome {
    /// Every setting was applied
    Full(NegotiatedParameters),
    /// Only focus mode and preview size were applied
    SafeOnly(NegotiatedParameters),
    Failed(NegotiationFailure),
}

impl NegotiationOutcome {
    pub fn into_result(self) -> Result<NegotiatedParameters, NegotiationFailure> {
        match self {
            NegotiationOutcome::Full(p) | NegotiationOutcome::SafeOnly(p) => Ok(p),
            NegotiationOutcome::Failed(e) => Err(e),
        }
    }

    pub fn is_safe_only(&self) -> bool {
        matches!(self, NegotiationOutcome::SafeOnly(_))
    }
}

/// Parameters in effect for one open camera
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedParameters {
    pub container_size: Size,
    pub display_rotation: u32,
    pub camera_display_orientation: u32,
    /// Preview size in sensor orientation
    pub preview_size: Size,
    pub photo_size: Option<Size>,
    pub focus_mode: Option<HwFocusMode>,
    pub torch: bool,
    pub invert_color: bool,
    pub barcode_scene_mode: bool,
    /// Only the safe phase was applied
    pub safe_mode: bool,
    pub preview_format: PixelFormat,
    pub settings: Settings,
}

impl NegotiatedParameters {
    /// The preview is perpendicular to the display
    pub fn is_camera_rotated(&self) -> bool {
        geometry::is_perpendicular(self.camera_display_orientation)
    }

    /// Preview size as it appears on the display
    pub fn rotated_preview_size(&self) -> Size {
        if self.is_camera_rotated() {
            self.preview_size.rotated()
        } else {
            self.preview_size
        }
    }

    /// Transform to hand to the view so the preview fills the container
    pub fn preview_transform(&self) -> PreviewTransform {
        geometry::preview_center_crop_transform(
            self.container_size,
            self.preview_size,
            self.is_camera_rotated(),
        )
    }

    /// Map a crop region in container pixels into the upright preview frame
    pub fn crop_preview_rect(&self, crop: Option<Rect>) -> Option<Rect> {
        let crop = crop?;
        if crop.is_empty() {
            debug!(%crop, "Ignoring empty crop region");
            return None;
        }
        let preview = self.rotated_preview_size();
        let scaled = geometry::scale_preview(preview, self.container_size);
        geometry::crop_rect_to_preview_space(crop, scaled, preview)
    }

    /// The periodic auto-focus loop applies to this configuration
    pub fn wants_auto_focus_loop(&self) -> bool {
        self.settings.auto_focus_enabled()
            && self
                .focus_mode
                .is_some_and(|mode| mode.needs_auto_focus_calls())
    }
}

/// Settings that ended up written by one negotiation phase
struct Applied {
    focus_mode: Option<HwFocusMode>,
    photo_size: Option<Size>,
}

/// Negotiate and apply parameters on an opened camera
pub fn negotiate(
    device: &mut dyn CameraHardware,
    request: &NegotiationRequest,
) -> NegotiationOutcome {
    let Some(parameters) = device.parameters() else {
        warn!("Camera exposes no parameters");
        return NegotiationOutcome::Failed(NegotiationFailure::NoParameters);
    };

    let desired = request.desired_preview_size();
    let Some(preview_size) = best_preview_size(
        &parameters.supported_preview_sizes,
        parameters.preview_size,
        desired,
    ) else {
        warn!("Camera reports no preview size");
        return NegotiationOutcome::Failed(NegotiationFailure::NoPreviewSize);
    };
    debug!(%desired, best = %preview_size, "Selected preview size");

    if let Err(e) = device.set_display_orientation(request.camera_display_orientation) {
        warn!(error = %e, "Failed to set display orientation");
    }

    let mut full = parameters.clone();
    let applied = apply_settings(&mut full, preview_size, &request.settings, false);
    match device.set_parameters(&full) {
        Ok(()) => {
            let negotiated = finish(request, &full, preview_size, applied, false);
            info!(
                preview = %negotiated.preview_size,
                photo = ?negotiated.photo_size,
                focus = ?negotiated.focus_mode,
                "Camera parameters applied"
            );
            log_crop(&negotiated, request.crop_rect);
            NegotiationOutcome::Full(negotiated)
        }
        Err(e) => {
            warn!(error = %e, "Full parameters rejected, retrying in safe mode");
            let mut safe = device.parameters().unwrap_or(parameters);
            let applied = apply_settings(&mut safe, preview_size, &request.settings, true);
            match device.set_parameters(&safe) {
                Ok(()) => {
                    let negotiated = finish(request, &safe, preview_size, applied, true);
                    info!(
                        preview = %negotiated.preview_size,
                        focus = ?negotiated.focus_mode,
                        "Safe camera parameters applied"
                    );
                    log_crop(&negotiated, request.crop_rect);
                    NegotiationOutcome::SafeOnly(negotiated)
                }
                Err(e) => {
                    warn!(error = %e, "Safe parameters rejected");
                    NegotiationOutcome::Failed(NegotiationFailure::Rejected(e))
                }
            }
        }
    }
}

fn log_crop(negotiated: &NegotiatedParameters, crop: Option<Rect>) {
    if let Some(mapped) = negotiated.crop_preview_rect(crop) {
        debug!(crop = %mapped, "Crop region in preview space");
    }
}

fn finish(
    request: &NegotiationRequest,
    written: &CameraParameters,
    preview_size: Size,
    applied: Applied,
    safe_mode: bool,
) -> NegotiatedParameters {
    NegotiatedParameters {
        container_size: request.container_size,
        display_rotation: request.display_rotation,
        camera_display_orientation: request.camera_display_orientation,
        preview_size,
        photo_size: applied.photo_size,
        focus_mode: applied.focus_mode,
        torch: is_torch_on(written),
        invert_color: written.color_effect == Some(ColorEffect::Negative),
        barcode_scene_mode: written.scene_mode == Some(SceneMode::Barcode),
        safe_mode,
        preview_format: written.preview_format,
        settings: request.settings.clone(),
    }
}

fn apply_settings(
    parameters: &mut CameraParameters,
    preview_size: Size,
    settings: &Settings,
    safe_mode: bool,
) -> Applied {
    let focus_mode = select_focus_mode(&parameters.supported_focus_modes, settings.focus_mode, safe_mode);
    if let Some(mode) = focus_mode {
        parameters.focus_mode = Some(mode);
    }

    if !safe_mode {
        apply_torch(parameters, settings.torch);
        if settings.invert_color {
            apply_invert_color(parameters);
        }
        if settings.barcode_scene_mode_enabled {
            apply_barcode_scene_mode(parameters);
        }
    }

    parameters.preview_size = Some(preview_size);

    let mut photo_size = None;
    if !safe_mode {
        photo_size = best_photo_size(
            &parameters.supported_picture_sizes,
            parameters.picture_size,
            preview_size,
            settings.min_photo_size,
        );
        if let Some(size) = photo_size {
            parameters.picture_size = Some(size);
        }
    }

    Applied {
        focus_mode: parameters.focus_mode,
        photo_size,
    }
}

/// First desired value present in the supported list
pub fn find_settable_value<T: Copy + PartialEq + std::fmt::Debug>(
    name: &str,
    supported: &[T],
    desired: &[T],
) -> Option<T> {
    let found = desired.iter().copied().find(|d| supported.contains(d));
    if found.is_none() {
        debug!(setting = name, ?desired, ?supported, "No settable value");
    }
    found
}

/// Pick the hardware focus mode for a user setting
pub fn select_focus_mode(
    supported: &[HwFocusMode],
    setting: FocusMode,
    safe_mode: bool,
) -> Option<HwFocusMode> {
    let preferred: &[HwFocusMode] = if safe_mode {
        &[HwFocusMode::Auto]
    } else {
        match setting {
            FocusMode::Auto => &[HwFocusMode::Auto],
            FocusMode::Continuous => &[
                HwFocusMode::ContinuousPicture,
                HwFocusMode::ContinuousVideo,
                HwFocusMode::Auto,
            ],
            FocusMode::Infinity => &[HwFocusMode::Infinity],
            FocusMode::Macro => &[HwFocusMode::Macro],
        }
    };

    let mode = find_settable_value("focus mode", supported, preferred);
    if mode.is_none() && !safe_mode {
        // The requested mode may be unavailable, fall through
        return find_settable_value(
            "focus mode",
            supported,
            &[HwFocusMode::Macro, HwFocusMode::Edof],
        );
    }
    mode
}

pub fn is_torch_on(parameters: &CameraParameters) -> bool {
    matches!(parameters.flash_mode, Some(FlashMode::On | FlashMode::Torch))
}

/// Select the torch flash mode (or off); leaves the mode untouched when
/// nothing suitable is supported
pub fn apply_torch(parameters: &mut CameraParameters, on: bool) {
    let desired: &[FlashMode] = if on {
        &[FlashMode::Torch, FlashMode::On]
    } else {
        &[FlashMode::Off]
    };
    if let Some(mode) = find_settable_value("flash mode", &parameters.supported_flash_modes, desired)
    {
        if parameters.flash_mode != Some(mode) {
            parameters.flash_mode = Some(mode);
        }
    }
}

/// Exposure compensation suited to the light state
pub fn apply_best_exposure(parameters: &mut CameraParameters, light_on: bool) {
    let min = parameters.min_exposure_compensation;
    let max = parameters.max_exposure_compensation;
    let step = parameters.exposure_compensation_step;
    if (min == 0 && max == 0) || step <= 0.0 {
        debug!("Camera does not support exposure compensation");
        return;
    }
    let target = if light_on {
        exposure::TORCH_ON_EV
    } else {
        exposure::TORCH_OFF_EV
    };
    let steps = ((target / step).round() as i32).clamp(min, max);
    if parameters.exposure_compensation != steps {
        debug!(steps, actual_ev = steps as f32 * step, "Setting exposure compensation");
        parameters.exposure_compensation = steps;
    }
}

pub fn apply_invert_color(parameters: &mut CameraParameters) {
    if parameters.color_effect == Some(ColorEffect::Negative) {
        return;
    }
    if let Some(effect) = find_settable_value(
        "color effect",
        &parameters.supported_color_effects,
        &[ColorEffect::Negative],
    ) {
        parameters.color_effect = Some(effect);
    }
}

pub fn apply_barcode_scene_mode(parameters: &mut CameraParameters) {
    if parameters.scene_mode == Some(SceneMode::Barcode) {
        return;
    }
    if let Some(scene) = find_settable_value(
        "scene mode",
        &parameters.supported_scene_modes,
        &[SceneMode::Barcode],
    ) {
        parameters.scene_mode = Some(scene);
    }
}

/// Covering-crop fitness of `size` for `desired`, 1.0 being a perfect match
pub fn preview_score(size: Size, desired: Size) -> f32 {
    if size.is_empty() || desired.is_empty() {
        return 0.0;
    }
    let scaled = size.scale_crop(desired);
    let scale_ratio = scaled.width as f32 / size.width as f32;
    // Upscaling is penalized a bit more than downscaling
    let scale_score = if scale_ratio > 1.0 {
        (1.0 / scale_ratio).powf(1.1)
    } else {
        scale_ratio
    };
    let crop_ratio =
        scaled.width as f32 / desired.width as f32 + scaled.height as f32 / desired.height as f32;
    let crop_score = 1.0 / (crop_ratio * crop_ratio * crop_ratio);
    scale_score * crop_score
}

/// Candidates ordered best first; ties keep their reported order
fn ranked(candidates: &[Size], current: Option<Size>, desired: Size) -> Vec<Size> {
    let mut sizes: Vec<Size> = if candidates.is_empty() {
        current.into_iter().collect()
    } else {
        candidates.to_vec()
    };
    sizes.sort_by(|a, b| {
        preview_score(*b, desired)
            .partial_cmp(&preview_score(*a, desired))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sizes
}

/// Best preview size for `desired` (in sensor orientation)
///
/// Walks the sizes in ranking order three times: first for a size whose
/// integer multiple of `desired` is the same on both axes, then for one
/// covering `desired`, and finally takes the top-ranked size. Falls back to
/// the current size when the supported list is empty.
pub fn best_preview_size(supported: &[Size], current: Option<Size>, desired: Size) -> Option<Size> {
    let ordered = ranked(supported, current, desired);
    if desired.is_empty() {
        return ordered.first().copied();
    }
    let same_multiple = |size: &&Size| {
        size.width / desired.width == size.height / desired.height
    };
    let covering = |size: &&Size| size.width >= desired.width && size.height >= desired.height;
    ordered
        .iter()
        .find(same_multiple)
        .or_else(|| ordered.iter().find(covering))
        .or_else(|| ordered.first())
        .copied()
}

/// Best photo size for `preview` that reaches `min` on both sides
pub fn best_photo_size(
    supported: &[Size],
    current: Option<Size>,
    preview: Size,
    min: Size,
) -> Option<Size> {
    let ordered = ranked(supported, current, preview);
    ordered
        .iter()
        .copied()
        .find(|s| s.width >= min.width && s.height >= min.height)
        .or_else(|| ordered.first().copied())
}

/// Parameters lighting or dimming the torch, or `None` when already there
pub fn torch_parameters(
    current: &CameraParameters,
    on: bool,
    exposure_enabled: bool,
) -> Option<CameraParameters> {
    if is_torch_on(current) == on {
        return None;
    }
    let mut parameters = current.clone();
    apply_torch(&mut parameters, on);
    if exposure_enabled {
        apply_best_exposure(&mut parameters, on);
    }
    Some(parameters)
}

/// Zoom index for a magnification factor, `None` when zoom is unsupported
pub fn zoom_index(parameters: &CameraParameters, factor: f32) -> Option<u32> {
    if !parameters.zoom_supported || parameters.zoom_ratios.is_empty() {
        return None;
    }
    let wanted = factor * 100.0;
    let last = parameters.zoom_ratios.len() as u32 - 1;
    let index = parameters
        .zoom_ratios
        .iter()
        .position(|&ratio| ratio as f32 >= wanted)
        .map(|i| i as u32)
        .unwrap_or(last);
    Some(index.min(parameters.max_zoom))
}

/// Write the zoom for `factor`
///
/// `Ok(false)` when the camera cannot zoom.
pub fn set_zoom(device: &mut dyn CameraHardware, factor: f32) -> BackendResult<bool> {
    let mut parameters = device
        .parameters()
        .ok_or_else(|| BackendError::NotSupported("parameters".into()))?;
    let Some(index) = zoom_index(&parameters, factor) else {
        return Ok(false);
    };
    parameters.zoom = index;
    device.set_parameters(&parameters)?;
    debug!(factor, index, "Zoom set");
    Ok(true)
}

/// Point focus at `area` and switch to macro focus
///
/// Returns the focus mode in effect before the change so it can be restored
/// once the focus run completes.
pub fn begin_manual_focus(
    device: &mut dyn CameraHardware,
    area: Rect,
) -> BackendResult<Option<HwFocusMode>> {
    let mut parameters = device
        .parameters()
        .ok_or_else(|| BackendError::NotSupported("parameters".into()))?;
    device.cancel_auto_focus()?;

    if parameters.max_num_focus_areas > 0 {
        parameters.focus_areas = vec![FocusArea {
            rect: area,
            weight: focus_area::WEIGHT,
        }];
    }
    let previous = parameters.focus_mode;
    if let Some(mode) = find_settable_value(
        "focus mode",
        &parameters.supported_focus_modes,
        &[HwFocusMode::Macro, HwFocusMode::Auto],
    ) {
        parameters.focus_mode = Some(mode);
    }
    device.set_parameters(&parameters)?;
    Ok(previous)
}

/// Put back the focus mode saved by [`begin_manual_focus`]
pub fn restore_focus_mode(
    device: &mut dyn CameraHardware,
    mode: Option<HwFocusMode>,
) -> BackendResult<()> {
    let Some(mode) = mode else {
        return Ok(());
    };
    let mut parameters = device
        .parameters()
        .ok_or_else(|| BackendError::NotSupported("parameters".into()))?;
    if parameters.focus_mode != Some(mode) {
        parameters.focus_mode = Some(mode);
        device.set_parameters(&parameters)?;
    }
    Ok(())
}
