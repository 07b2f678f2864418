//! Plate localization on top of a WPOD style network.
//!
//! The network sees the vehicle photo scaled so that its shorter side matches a bound derived
//! from the aspect ratio, and answers with a coarse map: one cell per 16x16 input block, each
//! holding a plate probability and an affine transform of a unit square. Cells above threshold
//! become plate quadrilaterals, overlapping ones are suppressed, and the survivors are warped
//! into frontal plate images.

use image::{ imageops, imageops::FilterType, Rgb, Rgb32FImage, RgbImage };
use imageproc::geometric_transformations::{ warp_into, Interpolation, Projection };
use log::{ debug, warn };

use crate::error::LprError;
use crate::image_process;
use crate::utils;

pub const MAX_DIM: u32 = 608;
pub const MIN_DIM: u32 = 256;
pub const DETECTION_THRESHOLD: f32 = 0.5;
pub const NMS_IOU: f32 = 0.1;

/// Four 2x2 max pools in the network.
pub const NET_STRIDE: u32 = 16;
/// Side of the reference plate, in map cells.
pub const ANCHOR_SIDE: f32 = ((208.0 + 40.0) / 2.0) / NET_STRIDE as f32;
/// Values per map cell: object, non object, then a row major 2x3 affine.
pub const MAP_CHANNELS: usize = 8;

/// Frontal width/height below which a plate is read as a two line plate.
pub const TWO_LINE_ASPECT: f32 = 1.7;
pub const ONE_LINE_SIZE: (u32, u32) = (470, 110);
pub const TWO_LINE_SIZE: (u32, u32) = (280, 200);

// corners of the unit square, TL TR BR BL
const UNIT_SQUARE: [(f32, f32); 4] = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];

/// Raw output of the localization network, `rows x cols x MAP_CHANNELS` row major.
#[derive(Clone, Debug)]
pub struct PlateMap {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl PlateMap {

    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, LprError> {
        if data.len() != rows * cols * MAP_CHANNELS {
            return Err(LprError::inference(format!(
                "plate map of {}x{} needs {} values, got {}",
                rows, cols, rows * cols * MAP_CHANNELS, data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn cell(&self, row: usize, col: usize) -> &[f32] {
        let start = (row * self.cols + col) * MAP_CHANNELS;
        &self.data[start..start + MAP_CHANNELS]
    }
}

/// A pretrained plate localization network.
pub trait LocalizationNetwork {
    /// Run on an RGB image with samples in `[0, 1]` whose sides are multiples of `NET_STRIDE`.
    fn predict(&self, input: &Rgb32FImage) -> Result<PlateMap, LprError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlateLayout {
    OneLine,
    TwoLines,
}

impl PlateLayout {

    /// Size of the rectified plate image, width then height.
    pub fn size(self) -> (u32, u32) {
        match self {
            PlateLayout::OneLine => ONE_LINE_SIZE,
            PlateLayout::TwoLines => TWO_LINE_SIZE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlateCandidate {
    image: RgbImage,
    corners: [(f32, f32); 4],
    confidence: f32,
    layout: PlateLayout,
}

impl PlateCandidate {

    /// The rectified plate.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// TL, TR, BR, BL in pixels of the original photo.
    pub fn corners(&self) -> [(f32, f32); 4] {
        self.corners
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn layout(&self) -> PlateLayout {
        self.layout
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorConfig {
    pub max_dim: u32,
    pub min_dim: u32,
    pub threshold: f32,
    pub nms_iou: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_dim: MAX_DIM,
            min_dim: MIN_DIM,
            threshold: DETECTION_THRESHOLD,
            nms_iou: NMS_IOU,
        }
    }
}

pub struct PlateDetector<N> {
    network: N,
    config: DetectorConfig,
}

impl<N: LocalizationNetwork> PlateDetector<N> {

    pub fn new(network: N) -> Self {
        Self::with_config(network, DetectorConfig::default())
    }

    pub fn with_config(network: N, config: DetectorConfig) -> Self {
        Self { network, config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Shorter side the photo is scaled to before inference.
    /// Elongated photos get more pixels, capped at `max_dim`.
    pub fn bound_dim(&self, width: u32, height: u32) -> u32 {
        let ratio = width.max(height) as f32 / width.min(height) as f32;
        let side = (ratio * self.config.min_dim as f32) as u32;
        side.min(self.config.max_dim)
    }

    /// Find plates in a vehicle photo, most confident first.
    /// An empty result means no plate, not a failure.
    pub fn detect(&self, vehicle: &Rgb32FImage) -> Result<Vec<PlateCandidate>, LprError> {
        let (width, height) = vehicle.dimensions();
        if width == 0 || height == 0 {
            debug!("empty image, nothing to detect");
            return Ok(Vec::new());
        }
        let bound_dim = self.bound_dim(width, height);
        let (input_width, input_height) = input_size(width, height, bound_dim);
        debug!("detecting on {}x{} input (bound {})", input_width, input_height, bound_dim);

        let input = imageops::resize(vehicle, input_width, input_height, FilterType::Triangle);
        let map = self.network.predict(&input)?;
        let map_size = (
            input_width as f32 / NET_STRIDE as f32,
            input_height as f32 / NET_STRIDE as f32,
        );

        let labels = decode(&map, self.config.threshold, map_size);
        let labels = suppress(labels, self.config.nms_iou);
        debug!("{} plate labels after suppression", labels.len());
        let top = match labels.first() {
            Some(top) => top,
            None => return Ok(Vec::new()),
        };

        let (frontal_width, frontal_height) = top.frontal;
        let layout = if frontal_width / frontal_height < TWO_LINE_ASPECT {
            PlateLayout::TwoLines
        } else {
            PlateLayout::OneLine
        };

        let source = image_process::to_rgb8(vehicle);
        let mut candidates = Vec::with_capacity(labels.len());
        for label in &labels {
            let corners = label.pts.map(|(x, y)| (x * width as f32, y * height as f32));
            match rectify(&source, &corners, layout) {
                Some(image) => candidates.push(PlateCandidate {
                    image,
                    corners,
                    confidence: label.prob,
                    layout,
                }),
                None => warn!("dropping degenerate plate quadrilateral {:?}", corners),
            }
        }
        Ok(candidates)
    }
}

/// Scale so the shorter side is `bound_dim`, then round both sides up to the network stride.
fn input_size(width: u32, height: u32, bound_dim: u32) -> (u32, u32) {
    let factor = bound_dim as f64 / width.min(height) as f64;
    let round_up = |side: f64| ((side as u32).max(1)).div_ceil(NET_STRIDE) * NET_STRIDE;
    (round_up(width as f64 * factor), round_up(height as f64 * factor))
}

/// Plate hypothesis in coordinates relative to the image size.
#[derive(Clone, Debug)]
struct Label {
    pts: [(f32, f32); 4],
    /// width and height of the same cell with rotation and shear removed
    frontal: (f32, f32),
    prob: f32,
}

impl Label {

    fn top_left(&self) -> (f32, f32) {
        self.pts.iter().fold((f32::MAX, f32::MAX), |(x, y), p| (x.min(p.0), y.min(p.1)))
    }

    fn bottom_right(&self) -> (f32, f32) {
        self.pts.iter().fold((f32::MIN, f32::MIN), |(x, y), p| (x.max(p.0), y.max(p.1)))
    }

    fn area(&self) -> f32 {
        let (x0, y0) = self.top_left();
        let (x1, y1) = self.bottom_right();
        (x1 - x0) * (y1 - y0)
    }

    fn iou(&self, other: &Label) -> f32 {
        let (ax0, ay0) = self.top_left();
        let (ax1, ay1) = self.bottom_right();
        let (bx0, by0) = other.top_left();
        let (bx1, by1) = other.bottom_right();
        let inter_w = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
        let inter_h = (ay1.min(by1) - ay0.max(by0)).max(0.0);
        let intersection = inter_w * inter_h;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

fn decode(map: &PlateMap, threshold: f32, map_size: (f32, f32)) -> Vec<Label> {
    let (map_width, map_height) = map_size;
    let mut labels = Vec::new();
    for row in 0..map.rows() {
        for col in 0..map.cols() {
            let cell = map.cell(row, col);
            let prob = cell[0];
            if prob <= threshold {
                continue;
            }
            let a = [cell[2].max(0.0), cell[3], cell[4], cell[5], cell[6].max(0.0), cell[7]];
            let centre = (col as f32 + 0.5, row as f32 + 0.5);
            let pts = UNIT_SQUARE.map(|(u, v)| {
                let x = a[0] * u + a[1] * v + a[2];
                let y = a[3] * u + a[4] * v + a[5];
                (
                    (x * ANCHOR_SIDE + centre.0) / map_width,
                    (y * ANCHOR_SIDE + centre.1) / map_height,
                )
            });
            let frontal = (a[0] * ANCHOR_SIDE / map_width, a[4] * ANCHOR_SIDE / map_height);
            labels.push(Label { pts, frontal, prob });
        }
    }
    labels
}

fn suppress(mut labels: Vec<Label>, iou_threshold: f32) -> Vec<Label> {
    labels.sort_by(|a, b| b.prob.total_cmp(&a.prob));
    let mut kept: Vec<Label> = Vec::new();
    for label in labels {
        if kept.iter().all(|k| label.iou(k) <= iou_threshold) {
            kept.push(label);
        }
    }
    kept
}

fn rectify(source: &RgbImage, corners: &[(f32, f32); 4], layout: PlateLayout) -> Option<RgbImage> {
    if !utils::is_convex(corners) {
        return None;
    }
    let (out_w, out_h) = layout.size();
    let (w, h) = (out_w as f32, out_h as f32);
    let projection = Projection::from_control_points(*corners, [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)])?;
    let mut out = RgbImage::new(out_w, out_h);
    warp_into(source, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Some(out)
}
