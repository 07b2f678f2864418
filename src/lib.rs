//! Automatic license plate recognition.
//!
//! A photo goes through four stages: [`detect`] finds and rectifies the plate,
//! [`segment`] cuts it into characters, [`classify`] names each character, and [`Lpr`]
//! strings the labels together.

use image::Rgb32FImage;
use log::debug;

use std::path::Path;

use error::{ LprError, LprErrorKind };

pub mod utils;
pub mod error;
pub mod image_process;
pub mod detect;
pub mod segment;
pub mod classify;
#[cfg(feature = "tensorflow")]
pub mod tf;
#[cfg(test)]
mod test_util;

pub use classify::{ CharacterClassifier, CharacterNetwork, LabelSet };
pub use detect::{ DetectorConfig, LocalizationNetwork, PlateCandidate, PlateDetector, PlateLayout, PlateMap };
pub use segment::{ CharacterGlyph, CharacterSegmenter, SegmenterConfig };


/// Outcome of reading one plate.
#[derive(Clone, Debug, PartialEq)]
pub struct Recognition {
    corners: [(f32, f32); 4],
    confidence: f32,
    layout: PlateLayout,
    labels: Vec<String>,
    text: String,
}

impl Recognition {

    /// Plate corners in the photo, TL TR BR BL.
    pub fn corners(&self) -> [(f32, f32); 4] {
        self.corners
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn layout(&self) -> PlateLayout {
        self.layout
    }

    /// Per character labels, left to right.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// A plate was found but no character could be read from it.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The recognition pipeline. Holds the loaded networks; recognizing never mutates it,
/// so one instance can serve any number of photos, from several threads if the
/// networks allow it.
pub struct Lpr<L, C> {
    detector: PlateDetector<L>,
    segmenter: CharacterSegmenter,
    classifier: CharacterClassifier<C>,
}

impl<L: LocalizationNetwork, C: CharacterNetwork> Lpr<L, C> {

    pub fn new(detector: PlateDetector<L>, segmenter: CharacterSegmenter, classifier: CharacterClassifier<C>) -> Self {
        Lpr { detector, segmenter, classifier }
    }

    pub fn detector(&self) -> &PlateDetector<L> {
        &self.detector
    }

    pub fn segmenter(&self) -> &CharacterSegmenter {
        &self.segmenter
    }

    pub fn classifier(&self) -> &CharacterClassifier<C> {
        &self.classifier
    }

    /// Recognize the plate in an image file.
    pub fn recognize(&self, path: impl AsRef<Path>) -> Result<Recognition, LprError> {
        let vehicle = image_process::load_image(path)?;
        self.recognize_image(&vehicle)
    }

    /// Recognize the plate in a decoded photo with samples in `[0, 1]`.
    ///
    /// Fails with a plate-not-found error when the detector sees nothing. Only the most
    /// confident plate is read. A plate without readable characters gives an empty result.
    pub fn recognize_image(&self, vehicle: &Rgb32FImage) -> Result<Recognition, LprError> {
        let candidates = self.detector.detect(vehicle)?;
        let plate = match candidates.into_iter().next() {
            Some(plate) => plate,
            None => {
                debug!("no plate detected");
                return Err(LprErrorKind::PlateNotFound.into());
            },
        };
        debug!("detected plate at {:?} ({:.3})", plate.corners(), plate.confidence());

        let glyphs = self.segmenter.segment(plate.image());
        let labels = glyphs.iter()
            .map(|glyph| self.classifier.classify(glyph).map(String::from))
            .collect::<Result<Vec<String>, LprError>>()?;
        let text = labels.concat();
        debug!("classified {} characters: {:?}", labels.len(), text);

        Ok(Recognition {
            corners: plate.corners(),
            confidence: plate.confidence(),
            layout: plate.layout(),
            labels,
            text,
        })
    }
}
