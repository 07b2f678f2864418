//! Character classification and the label set that names the network's classes.

use image::{ imageops, imageops::FilterType, GrayImage };
use log::info;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{ LprError, LprErrorKind };
use crate::segment::CharacterGlyph;
use crate::utils;

/// The classifier looks at `INPUT_SIDE x INPUT_SIDE` pixels.
pub const INPUT_SIDE: u32 = 80;
pub const INPUT_CHANNELS: usize = 3;

/// A pretrained character classification network.
pub trait CharacterNetwork {
    /// Width of the score vector `predict` returns.
    fn num_classes(&self) -> usize;

    /// Scores for one `INPUT_SIDE x INPUT_SIDE x INPUT_CHANNELS` row major image,
    /// samples in `[0, 255]`.
    fn predict(&self, input: &[f32]) -> Result<Vec<f32>, LprError>;
}

/// Class index to label mapping, fixed once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {

    pub fn new(labels: Vec<String>) -> Result<Self, LprError> {
        check(&labels).map_err(|reason| LprError::model_load("label set", reason))?;
        Ok(Self { labels })
    }

    /// Read a `.npy` string array, or any other file as one label per line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LprError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| LprError::model_load(path, e))?;
        let is_npy = path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("npy"));
        let labels = if is_npy {
            parse_npy(&bytes)
        } else {
            String::from_utf8(bytes)
                .map(|text| parse_lines(&text))
                .map_err(|e| e.to_string())
        };
        let labels = labels.and_then(|labels| check(&labels).map(|_| labels))
            .map_err(|reason| LprError::model_load(path, reason))?;
        info!("loaded {} labels from {}", labels.len(), path.display());
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

fn check(labels: &[String]) -> Result<(), String> {
    if labels.is_empty() {
        return Err("label set is empty".to_string());
    }
    if labels.iter().any(String::is_empty) {
        return Err("label set contains an empty label".to_string());
    }
    let mut seen = HashSet::new();
    if let Some(dup) = labels.iter().find(|l| !seen.insert(l.as_str())) {
        return Err(format!("label {:?} appears twice", dup));
    }
    Ok(())
}

fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

// one dimensional array of fixed width strings, `<Un`/`>Un` (UTF-32) or `|Sn` (bytes)
fn parse_npy(bytes: &[u8]) -> Result<Vec<String>, String> {
    const MAGIC: &[u8] = b"\x93NUMPY";
    if bytes.len() < 10 || !bytes.starts_with(MAGIC) {
        return Err("not a .npy file".to_string());
    }
    let (header_len, header_start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12),
        v => return Err(format!("unsupported .npy version {}", v)),
    };
    let body_start = header_start + header_len;
    let header = bytes.get(header_start..body_start).ok_or("truncated .npy header")?;
    let header = std::str::from_utf8(header).map_err(|e| e.to_string())?;

    let descr = header_value(header, "descr").ok_or("missing descr")?.trim_matches('\'');
    let shape = header_value(header, "shape").ok_or("missing shape")?;
    let dims: Vec<usize> = shape.trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.parse::<usize>().map_err(|e| e.to_string()))
        .collect::<Result<_, _>>()?;
    let count = match dims.as_slice() {
        [count] => *count,
        _ => return Err(format!("expected a one dimensional array, got shape {}", shape)),
    };

    let (kind, width) = match (descr.get(..2), descr.get(2..)) {
        (Some(kind), Some(width)) => (kind, width),
        _ => return Err(format!("unsupported dtype {}", descr)),
    };
    let width: usize = width.parse().map_err(|_| format!("unsupported dtype {}", descr))?;
    let item_size = match kind {
        "<U" | ">U" => width.checked_mul(4),
        "|S" => Some(width),
        _ => return Err(format!("unsupported dtype {}", descr)),
    };
    let item_size = item_size.ok_or(format!("unsupported dtype {}", descr))?;
    let body_len = count.checked_mul(item_size)
        .ok_or(format!("{} items of {} bytes do not fit in memory", count, item_size))?;
    let body = &bytes[body_start..];
    if item_size == 0 || body.len() < body_len {
        return Err(format!("expected {} items of {} bytes, body has {} bytes", count, item_size, body.len()));
    }

    body.chunks_exact(item_size).take(count).map(|item| match kind {
        "|S" => {
            let end = item.iter().position(|b| *b == 0).unwrap_or(item.len());
            String::from_utf8(item[..end].to_vec()).map_err(|e| e.to_string())
        },
        _ => item.chunks_exact(4)
            .map(|c| {
                let c = [c[0], c[1], c[2], c[3]];
                if kind == "<U" { u32::from_le_bytes(c) } else { u32::from_be_bytes(c) }
            })
            .take_while(|code| *code != 0)
            .map(|code| char::from_u32(code).ok_or(format!("invalid code point {:#x}", code)))
            .collect(),
    }).collect()
}

/// Raw text of one entry of the header dict, e.g. `'<U1'` or `(36,)`.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let start = header.find(&pattern)? + pattern.len();
    let rest = header[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else if let Some(quoted) = rest.strip_prefix('\'') {
        quoted.find('\'')? + 2
    } else {
        rest.find(|c| c == ',' || c == '}')?
    };
    Some(&rest[..end])
}

pub struct CharacterClassifier<N> {
    network: N,
    labels: LabelSet,
}

impl<N: CharacterNetwork> CharacterClassifier<N> {

    /// Pair a network with its labels. Fails unless there is exactly one label per output.
    pub fn new(network: N, labels: LabelSet) -> Result<Self, LprError> {
        let outputs = network.num_classes();
        if outputs != labels.len() {
            return Err(LprErrorKind::LabelMismatch { labels: labels.len(), outputs }.into());
        }
        Ok(Self { network, labels })
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// The most likely label of a glyph.
    pub fn classify(&self, glyph: &CharacterGlyph) -> Result<&str, LprError> {
        let input = network_input(glyph.image());
        let scores = self.network.predict(&input)?;
        if scores.len() != self.labels.len() {
            return Err(LprError::inference(format!(
                "classifier returned {} scores for {} labels", scores.len(), self.labels.len()
            )));
        }
        let index = utils::argmax(&scores).ok_or_else(|| LprError::inference("no scores"))?;
        Ok(&self.labels.labels[index])
    }
}

/// Resize a glyph to the network input and repeat its single channel three times.
pub fn network_input(glyph: &GrayImage) -> Vec<f32> {
    let resized = imageops::resize(glyph, INPUT_SIDE, INPUT_SIDE, FilterType::Triangle);
    resized.pixels()
        .flat_map(|p| [p[0] as f32; INPUT_CHANNELS])
        .collect()
}


#[cfg(test)]
mod test {

    use image::{ GrayImage, Luma, RgbImage };

    use super::*;
    use crate::segment::CharacterSegmenter;
    use crate::test_util::{ plate_face, FillNetwork, ScriptedNetwork, Shape, FILL_LABELS };

    fn labels(names: &[&str]) -> LabelSet {
        LabelSet::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn npy_v1(descr: &str, count: usize, body: &[u8]) -> Vec<u8> {
        let mut header = format!("{{'descr': '{}', 'fortran_order': False, 'shape': ({},), }}", descr, count);
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn reads_unicode_npy() -> Result<(), Box<dyn std::error::Error>> {
        let names = ["0", "1", "A", "B", "Đ"];
        let body: Vec<u8> = names.iter()
            .flat_map(|n| (n.chars().next().unwrap() as u32).to_le_bytes())
            .collect();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("classes.npy");
        std::fs::write(&path, npy_v1("<U1", names.len(), &body))?;

        let set = LabelSet::load(&path)?;
        assert_eq!(set.iter().collect::<Vec<_>>(), names);
        assert_eq!(set.get(4), Some("Đ"));
        assert_eq!(set.get(5), None);
        Ok(())
    }

    #[test]
    fn reads_padded_byte_npy() {
        // `|S2` pads shorter entries with NUL
        let body = b"A\0BC9\0";
        let parsed = parse_npy(&npy_v1("|S2", 3, body)).unwrap();
        assert_eq!(parsed, vec!["A", "BC", "9"]);
    }

    #[test]
    fn rejects_bad_npy() {
        assert!(parse_npy(b"not numpy at all").is_err());
        assert!(parse_npy(&npy_v1("<f4", 2, &[0; 8])).is_err());
        // body shorter than the shape says
        assert!(parse_npy(&npy_v1("<U1", 3, &[0x41, 0, 0, 0])).is_err());
    }

    #[test]
    fn oversized_npy_shape_is_model_load_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let huge = dir.path().join("huge.npy");
        std::fs::write(&huge, npy_v1("<U4", usize::MAX / 2, &[0x41, 0, 0, 0]))?;
        let wide = dir.path().join("wide.npy");
        std::fs::write(&wide, npy_v1(&format!("<U{}", usize::MAX / 2), 1, &[0x41, 0, 0, 0]))?;

        for path in [huge, wide] {
            let err = LabelSet::load(&path).unwrap_err();
            assert!(matches!(err.kind(), LprErrorKind::ModelLoad { .. }), "{}", err);
        }
        Ok(())
    }

    #[test]
    fn reads_text_labels() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("classes.txt");
        std::fs::write(&path, "0\n1\n\n A \nB\n")?;
        let set = LabelSet::load(&path)?;
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["0", "1", "A", "B"]);
        Ok(())
    }

    #[test]
    fn invalid_label_sets_fail_to_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "\n\n")?;
        let dup = dir.path().join("dup.txt");
        std::fs::write(&dup, "A\nB\nA\n")?;

        for path in [empty, dup, dir.path().join("missing.npy")] {
            let err = LabelSet::load(&path).unwrap_err();
            assert!(matches!(err.kind(), LprErrorKind::ModelLoad { .. }), "{}", err);
        }
        Ok(())
    }

    #[test]
    fn cardinality_is_checked_when_built() {
        let err = CharacterClassifier::new(FillNetwork, labels(&["0", "1", "2"])).err().unwrap();
        assert!(matches!(err.kind(), LprErrorKind::LabelMismatch { labels: 3, outputs: 2 }));
        assert!(CharacterClassifier::new(FillNetwork, labels(&FILL_LABELS)).is_ok());
    }

    #[test]
    fn input_is_three_identical_channels() {
        let mut glyph = GrayImage::new(30, 60);
        glyph.put_pixel(0, 0, Luma([255]));
        let input = network_input(&glyph);
        assert_eq!(input.len(), (INPUT_SIDE * INPUT_SIDE) as usize * INPUT_CHANNELS);
        assert!(input.chunks(3).all(|px| px[0] == px[1] && px[1] == px[2]));
        assert!(input.iter().all(|v| (0.0..=255.0).contains(v)));
    }

    #[test]
    fn classification_is_deterministic() -> Result<(), LprError> {
        let plate: RgbImage = image::DynamicImage::ImageLuma8(
            plate_face(240, 80, &[Shape::Ring, Shape::Bar])
        ).to_rgb8();
        let glyphs = CharacterSegmenter::new().segment(&plate);
        assert_eq!(glyphs.len(), 2);

        let classifier = CharacterClassifier::new(FillNetwork, labels(&FILL_LABELS))?;
        assert_eq!(classifier.classify(&glyphs[0])?, "0");
        assert_eq!(classifier.classify(&glyphs[1])?, "1");
        for glyph in &glyphs {
            assert_eq!(classifier.classify(glyph)?, classifier.classify(glyph)?);
        }
        Ok(())
    }

    #[test]
    fn short_score_vector_is_an_error() {
        struct Liar;
        impl CharacterNetwork for Liar {
            fn num_classes(&self) -> usize { 3 }
            fn predict(&self, _input: &[f32]) -> Result<Vec<f32>, LprError> { Ok(vec![0.5, 0.5]) }
        }
        let plate = image::DynamicImage::ImageLuma8(plate_face(240, 80, &[Shape::Bar])).to_rgb8();
        let glyphs = CharacterSegmenter::new().segment(&plate);
        let classifier = CharacterClassifier::new(Liar, labels(&["a", "b", "c"])).unwrap();
        let err = classifier.classify(&glyphs[0]).unwrap_err();
        assert!(matches!(err.kind(), LprErrorKind::Inference(_)));
    }

    #[test]
    fn scripted_network_maps_indices_to_labels() -> Result<(), LprError> {
        let plate = image::DynamicImage::ImageLuma8(plate_face(240, 80, &[Shape::Bar])).to_rgb8();
        let glyphs = CharacterSegmenter::new().segment(&plate);
        let classifier = CharacterClassifier::new(ScriptedNetwork::new(3, vec![2, 0]), labels(&["x", "y", "z"]))?;
        assert_eq!(classifier.classify(&glyphs[0])?, "z");
        assert_eq!(classifier.classify(&glyphs[0])?, "x");
        Ok(())
    }
}
