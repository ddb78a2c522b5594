//! Contact photo handling
//!
//! Two independent steps run on a card's `PHOTO`:
//!
//! 1. An external reference (`VALUE=uri`) is downloaded through the
//!    collection and re-embedded inline as base64. A failed download is
//!    logged and leaves both sides untouched.
//! 2. A crop hint (`X-ABCROP-RECTANGLE`) is applied to the inline image if a
//!    [`PhotoCropper`] is installed. The cropped image replaces the local
//!    photo value; the card keeps the original image and hint.

use crate::client::ResourceDownloader;
use crate::error::Result;
use crate::models::{FieldValue, LocalRecord, keys};
use crate::vcard::VCard;
use tracing::{debug, info, warn};

/// Default edge limit for cropped photos
pub const MAX_PHOTO_SIZE: u32 = 256;

/// Parameter carrying the crop hint
pub const CROP_PARAM: &str = "X-ABCROP-RECTANGLE";

const PHOTO_PROPERTY: &str = "PHOTO";

/// Crop rectangle; `y` is measured from the bottom edge of the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl CropRect {
    /// Parse `ABClipRect_1&<x>&<y>&<w>&<h>&<checksum>`
    ///
    /// Missing or non-numeric parts become zero.
    pub fn parse(hint: &str) -> Self {
        let parts: Vec<&str> = hint.split('&').collect();
        let part = |idx: usize| parts.get(idx).map_or(0, |s| coerce_int(s));
        Self {
            x: part(1),
            y: part(2),
            width: part(3),
            height: part(4),
        }
    }

    /// Top edge of the region in top-left image coordinates
    pub fn top(&self, source_height: u32) -> i64 {
        i64::from(source_height)
            .saturating_sub(self.y)
            .saturating_sub(self.height)
    }

    /// Output size, each side capped at `max_size`
    pub fn output_size(&self, max_size: u32) -> (u32, u32) {
        let cap = |v: i64| v.clamp(0, i64::from(max_size)) as u32;
        (cap(self.width), cap(self.height))
    }
}

/// Leading-integer coercion: `" 12px"` → 12, `"abc"` → 0
fn coerce_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value = digits[..end].parse::<i64>().unwrap_or(0);
    if negative { -value } else { value }
}

/// Image processing capability used for crop hints
pub trait PhotoCropper: Send + Sync {
    /// Resample the `rect` region of `image` to at most `max_size` per side
    /// and return it as a lossless raster image
    fn crop(&self, image: &[u8], rect: &CropRect, max_size: u32) -> Result<Vec<u8>>;
}

#[cfg(feature = "image")]
pub use raster::RasterCropper;

#[cfg(feature = "image")]
mod raster {
    use super::{CropRect, PhotoCropper};
    use crate::error::{ContactsError, Result};
    use image::imageops::{self, FilterType};
    use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
    use std::io::Cursor;

    /// [`PhotoCropper`] backed by the `image` crate (Lanczos3, PNG output)
    ///
    /// Only the part of the region that overlaps the source is decoded into
    /// memory; the rest of the output stays transparent.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RasterCropper;

    impl PhotoCropper for RasterCropper {
        fn crop(&self, data: &[u8], rect: &CropRect, max_size: u32) -> Result<Vec<u8>> {
            if rect.width <= 0 || rect.height <= 0 {
                return Err(ContactsError::Image(format!(
                    "unusable crop region {}x{}",
                    rect.width, rect.height
                )));
            }

            let source = image::load_from_memory(data).map_err(|e| ContactsError::Image(e.to_string()))?;
            let (source_width, source_height) = source.dimensions();
            let top = rect.top(source_height);

            let left = rect.x.clamp(0, i64::from(source_width));
            let right = rect.x.saturating_add(rect.width).clamp(0, i64::from(source_width));
            let upper = top.clamp(0, i64::from(source_height));
            let lower = top.saturating_add(rect.height).clamp(0, i64::from(source_height));
            if left >= right || upper >= lower {
                return Err(ContactsError::Image("crop region lies outside the image".to_string()));
            }

            let (dw, dh) = rect.output_size(max_size);
            let (dw, dh) = (dw.max(1), dh.max(1));
            let scale_x = f64::from(dw) / rect.width as f64;
            let scale_y = f64::from(dh) / rect.height as f64;

            let visible = source.crop_imm(
                left as u32,
                upper as u32,
                (right - left) as u32,
                (lower - upper) as u32,
            );
            let piece_width = (((right - left) as f64 * scale_x).round() as u32).clamp(1, dw);
            let piece_height = (((lower - upper) as f64 * scale_y).round() as u32).clamp(1, dh);
            let piece = imageops::resize(&visible.to_rgba8(), piece_width, piece_height, FilterType::Lanczos3);

            let offset_x = (((left as f64 - rect.x as f64) * scale_x).floor() as i64)
                .clamp(0, i64::from(dw - piece_width));
            let offset_y = (((upper as f64 - top as f64) * scale_y).floor() as i64)
                .clamp(0, i64::from(dh - piece_height));
            let mut canvas = RgbaImage::new(dw, dh);
            imageops::overlay(&mut canvas, &piece, offset_x, offset_y);

            let mut out = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(canvas)
                .write_to(&mut out, ImageFormat::Png)
                .map_err(|e| ContactsError::Image(e.to_string()))?;
            Ok(out.into_inner())
        }
    }
}

/// Downloads and crops contact photos
pub struct PhotoHandler {
    cropper: Option<Box<dyn PhotoCropper>>,
    max_size: u32,
}

impl Default for PhotoHandler {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PhotoHandler {
    pub fn new(cropper: Option<Box<dyn PhotoCropper>>) -> Self {
        Self {
            cropper,
            max_size: MAX_PHOTO_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn set_cropper(&mut self, cropper: Option<Box<dyn PhotoCropper>>) {
        self.cropper = cropper;
    }

    pub fn can_crop(&self) -> bool {
        self.cropper.is_some()
    }

    /// Run both photo steps; `true` when the card was rewritten and needs
    /// to be stored back
    pub async fn materialize(
        &self,
        record: &mut LocalRecord,
        card: &mut VCard,
        downloader: &dyn ResourceDownloader,
    ) -> bool {
        let modified = self.download(record, card, downloader).await;
        self.apply_crop(record, card);
        modified
    }

    async fn download(
        &self,
        record: &mut LocalRecord,
        card: &mut VCard,
        downloader: &dyn ResourceDownloader,
    ) -> bool {
        let uri = match card.get(PHOTO_PROPERTY) {
            Some(photo)
                if photo
                    .param_value("VALUE")
                    .is_some_and(|v| v.eq_ignore_ascii_case("uri")) =>
            {
                photo.text_value()
            }
            _ => return false,
        };

        let resource = match downloader.download_resource(&uri).await {
            Ok(resource) => resource,
            Err(e) => {
                warn!("Failed to download contact photo from {}: {}", uri, e);
                return false;
            }
        };

        let Some(photo) = card.get_mut(PHOTO_PROPERTY) else {
            return false;
        };
        photo.remove_param("VALUE");
        photo.set_binary(&resource.body);

        info!("Embedded contact photo from {} ({} bytes)", uri, resource.body.len());
        record.set(keys::PHOTO, FieldValue::Binary(resource.body));
        true
    }

    fn apply_crop(&self, record: &mut LocalRecord, card: &VCard) {
        let Some(cropper) = &self.cropper else {
            return;
        };
        let Some(photo) = card.get(PHOTO_PROPERTY) else {
            return;
        };
        let Some(hint) = photo.param_value(CROP_PARAM) else {
            return;
        };
        let Some(image) = photo.binary() else {
            debug!("Crop hint present but photo is not inline, skipping crop");
            return;
        };

        let rect = CropRect::parse(hint);
        match cropper.crop(&image, &rect, self.max_size) {
            Ok(cropped) => record.set(keys::PHOTO, FieldValue::Binary(cropped)),
            Err(e) => debug!("Photo crop skipped: {}", e),
        }
    }
}
