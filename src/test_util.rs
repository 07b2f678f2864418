//! Synthetic plates and stand-in networks for the unit tests.

use image::{ imageops, DynamicImage, Luma, GrayImage, Rgb, Rgb32FImage, RgbImage };
use imageproc::{ drawing, rect::Rect };

use std::sync::Mutex;

use crate::classify::CharacterNetwork;
use crate::detect::{ LocalizationNetwork, PlateMap, ANCHOR_SIDE, MAP_CHANNELS, NET_STRIDE };
use crate::error::LprError;

pub const FACE: u8 = 235;
pub const INK: u8 = 15;

/// Plate position in `vehicle_with_plate`, relative `[xmin, ymin, xmax, ymax]`.
pub const PLATE_RECT: [f32; 4] = [140.0 / 640.0, 190.0 / 480.0, 500.0 / 640.0, 280.0 / 480.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// solid stroke, classified as "1" by `FillNetwork`
    Bar,
    /// hollow frame, classified as "0" by `FillNetwork`
    Ring,
}

/// A light plate face with dark glyphs centred in equal slots.
pub fn plate_face(width: u32, height: u32, shapes: &[Shape]) -> GrayImage {
    let mut face = GrayImage::from_pixel(width, height, Luma([FACE]));
    if shapes.is_empty() {
        return face;
    }
    let glyph_h = height * 2 / 3;
    let glyph_w = glyph_h * 2 / 5;
    let stroke = (glyph_w / 4).max(2);
    let pitch = width / shapes.len() as u32;
    let y = (height - glyph_h) / 2;
    for (i, shape) in shapes.iter().enumerate() {
        let x = pitch * i as u32 + (pitch - glyph_w) / 2;
        let outer = Rect::at(x as i32, y as i32).of_size(glyph_w, glyph_h);
        drawing::draw_filled_rect_mut(&mut face, outer, Luma([INK]));
        if *shape == Shape::Ring {
            let inner = Rect::at((x + stroke) as i32, (y + stroke) as i32)
                .of_size(glyph_w - 2 * stroke, glyph_h - 2 * stroke);
            drawing::draw_filled_rect_mut(&mut face, inner, Luma([FACE]));
        }
    }
    face
}

/// A 640x480 grey scene with a plate whose glyph area is exactly `PLATE_RECT`.
pub fn vehicle_with_plate(shapes: &[Shape]) -> RgbImage {
    let mut vehicle = RgbImage::from_pixel(640, 480, Rgb([120, 120, 120]));
    // light margin around the readable area
    drawing::draw_filled_rect_mut(&mut vehicle, Rect::at(130, 180).of_size(380, 110), Rgb([FACE; 3]));
    let face = DynamicImage::ImageLuma8(plate_face(360, 90, shapes)).to_rgb8();
    imageops::replace(&mut vehicle, &face, 140, 190);
    vehicle
}

pub fn as_float(img: &RgbImage) -> Rgb32FImage {
    DynamicImage::ImageRgb8(img.clone()).to_rgb32f()
}

/// Answers with the plates it was told about, each placed in the map cell under its centre.
pub struct FakeLocalizer {
    pub plates: Vec<([f32; 4], f32)>,
}

impl FakeLocalizer {

    pub fn none() -> Self {
        Self { plates: Vec::new() }
    }

    pub fn single(rect: [f32; 4], prob: f32) -> Self {
        Self { plates: vec![(rect, prob)] }
    }
}

impl LocalizationNetwork for FakeLocalizer {
    fn predict(&self, input: &Rgb32FImage) -> Result<PlateMap, LprError> {
        let (width, height) = input.dimensions();
        assert_eq!(width % NET_STRIDE, 0);
        assert_eq!(height % NET_STRIDE, 0);
        let cols = (width / NET_STRIDE) as usize;
        let rows = (height / NET_STRIDE) as usize;
        let mut data = vec![0.0; rows * cols * MAP_CHANNELS];
        for &([x0, y0, x1, y1], prob) in &self.plates {
            let cx = (x0 + x1) / 2.0 * cols as f32;
            let cy = (y0 + y1) / 2.0 * rows as f32;
            let col = (cx as usize).min(cols - 1);
            let row = (cy as usize).min(rows - 1);
            let start = (row * cols + col) * MAP_CHANNELS;
            let cell = &mut data[start..start + MAP_CHANNELS];
            cell[0] = prob;
            cell[1] = 1.0 - prob;
            cell[2] = (x1 - x0) * cols as f32 / ANCHOR_SIDE;
            cell[4] = (cx - (col as f32 + 0.5)) / ANCHOR_SIDE;
            cell[6] = (y1 - y0) * rows as f32 / ANCHOR_SIDE;
            cell[7] = (cy - (row as f32 + 0.5)) / ANCHOR_SIDE;
        }
        PlateMap::new(rows, cols, data)
    }
}

/// Two classes: mostly white input is "1", anything else "0".
pub struct FillNetwork;

pub const FILL_LABELS: [&str; 2] = ["0", "1"];

impl CharacterNetwork for FillNetwork {
    fn num_classes(&self) -> usize {
        2
    }

    fn predict(&self, input: &[f32]) -> Result<Vec<f32>, LprError> {
        let fill = input.iter().sum::<f32>() / (input.len() as f32 * 255.0);
        if fill > 0.85 {
            Ok(vec![0.1, 0.9])
        } else {
            Ok(vec![0.9, 0.1])
        }
    }
}

/// Replays a fixed sequence of class indices, one per call.
pub struct ScriptedNetwork {
    classes: usize,
    script: Vec<usize>,
    calls: Mutex<usize>,
}

impl ScriptedNetwork {

    pub fn new(classes: usize, script: Vec<usize>) -> Self {
        Self { classes, script, calls: Mutex::new(0) }
    }
}

impl CharacterNetwork for ScriptedNetwork {
    fn num_classes(&self) -> usize {
        self.classes
    }

    fn predict(&self, _input: &[f32]) -> Result<Vec<f32>, LprError> {
        let mut calls = self.calls.lock().unwrap();
        let class = self.script[*calls % self.script.len()];
        *calls += 1;
        let mut scores = vec![0.0; self.classes];
        scores[class] = 1.0;
        Ok(scores)
    }
}
