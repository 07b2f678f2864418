//! Character segmentation of a rectified plate.

use image::{ imageops, imageops::FilterType, GrayImage, RgbImage };
use imageproc::contours::{ find_contours, BorderType };
use imageproc::distance_transform::Norm;
use imageproc::{ filter, morphology };
use log::debug;

use crate::image_process;
use crate::utils;

/// Equivalent of a 7x7 Gaussian kernel.
pub const BLUR_SIGMA: f32 = 1.4;
/// Accepted height/width range of a character box.
pub const MIN_ASPECT: f32 = 1.0;
pub const MAX_ASPECT: f32 = 3.5;
/// A character box must span at least this share of the plate height.
pub const MIN_HEIGHT_FRACTION: f32 = 0.5;
pub const GLYPH_WIDTH: u32 = 30;
pub const GLYPH_HEIGHT: u32 = 60;
/// Threshold for glyph crops that are a single colour after resizing.
pub const GLYPH_CUTOFF: u8 = 220;

/// One binarized character, white strokes on black.
#[derive(Clone, Debug)]
pub struct CharacterGlyph {
    image: GrayImage,
    bounds: [u32; 4],
}

impl CharacterGlyph {

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Left edge of the character on the plate.
    pub fn x(&self) -> u32 {
        self.bounds[0]
    }

    /// `[x, y, width, height]` of the character on the plate.
    pub fn bounds(&self) -> [u32; 4] {
        self.bounds
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmenterConfig {
    pub blur_sigma: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub min_height_fraction: f32,
    pub glyph_width: u32,
    pub glyph_height: u32,
    pub glyph_cutoff: u8,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            blur_sigma: BLUR_SIGMA,
            min_aspect: MIN_ASPECT,
            max_aspect: MAX_ASPECT,
            min_height_fraction: MIN_HEIGHT_FRACTION,
            glyph_width: GLYPH_WIDTH,
            glyph_height: GLYPH_HEIGHT,
            glyph_cutoff: GLYPH_CUTOFF,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CharacterSegmenter {
    config: SegmenterConfig,
}

impl CharacterSegmenter {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Cut a plate into glyphs, left to right.
    /// A plate without anything character shaped gives an empty vector.
    pub fn segment(&self, plate: &RgbImage) -> Vec<CharacterGlyph> {
        let gray = imageops::grayscale(plate);
        let blur = filter::gaussian_blur_f32(&gray, self.config.blur_sigma);
        let binary = match image_process::binarize_inverted(&blur) {
            Some(binary) => binary,
            None => {
                debug!("plate is a single colour, no characters");
                return Vec::new();
            }
        };
        let dilated = morphology::dilate(&binary, Norm::LInf, 1);

        // only the outermost borders, holes and anything nested in them are ignored
        let mut boxes: Vec<[u32; 4]> = find_contours::<i32>(&binary)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| utils::bounding_rect(&c.points))
            .collect();
        boxes.sort_by_key(|b| b[0]);

        let plate_height = plate.height();
        let glyphs: Vec<CharacterGlyph> = boxes
            .into_iter()
            .filter(|b| self.accepts(b, plate_height))
            .map(|bounds| self.crop(&dilated, bounds))
            .collect();
        debug!("segmented {} characters", glyphs.len());
        glyphs
    }

    /// Whether a box has the proportions of a character on a plate `plate_height` tall.
    pub fn accepts(&self, bounds: &[u32; 4], plate_height: u32) -> bool {
        let [_, _, width, height] = *bounds;
        if width == 0 || plate_height == 0 {
            return false;
        }
        let ratio = height as f32 / width as f32;
        let fraction = height as f32 / plate_height as f32;
        ratio >= self.config.min_aspect
            && ratio <= self.config.max_aspect
            && fraction >= self.config.min_height_fraction
    }

    fn crop(&self, dilated: &GrayImage, bounds: [u32; 4]) -> CharacterGlyph {
        let [x, y, width, height] = bounds;
        let crop = imageops::crop_imm(dilated, x, y, width, height).to_image();
        let resized = imageops::resize(&crop, self.config.glyph_width, self.config.glyph_height, FilterType::Triangle);
        let image = image_process::binarize(&resized, self.config.glyph_cutoff);
        CharacterGlyph { image, bounds }
    }
}
