#[cfg(feature = "tensorflow")]
use tensorflow::Status;
use image::ImageError;

use std::error::Error;
use std::fmt;
use std::io::Error as IOError;
use std::path::Path;

#[derive(Debug)]
pub struct LprError(LprErrorKind);

#[derive(Debug)]
pub enum LprErrorKind {
    IOError(IOError),
    /// the input photo is missing or cannot be decoded
    ImageLoad(ImageError),
    /// a network graph or the label set could not be loaded
    ModelLoad { path: String, reason: String },
    /// the label set and the classifier output width disagree
    LabelMismatch { labels: usize, outputs: usize },
    /// a network returned something of the wrong shape
    Inference(String),
    #[cfg(feature = "tensorflow")]
    TensorflowError(Status),
    /// the detector found no plate in the image
    PlateNotFound,
}

impl LprError {

    pub fn kind(&self) -> &LprErrorKind {
        &self.0
    }

    pub fn is_plate_not_found(&self) -> bool {
        matches!(self.0, LprErrorKind::PlateNotFound)
    }

    pub(crate) fn model_load(path: impl AsRef<Path>, reason: impl fmt::Display) -> Self {
        Self(LprErrorKind::ModelLoad {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        })
    }

    pub(crate) fn inference(reason: impl Into<String>) -> Self {
        Self(LprErrorKind::Inference(reason.into()))
    }
}

impl<T> From<T> for LprError
where T:  Into<LprErrorKind>
{
    fn from(e: T) -> Self {
        Self(e.into())
    }
}

impl fmt::Display for LprError {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            LprErrorKind::IOError(e) => e.fmt(f),
            LprErrorKind::ImageLoad(e) => write!(f, "failed to load image: {}", e),
            LprErrorKind::ModelLoad { path, reason } => write!(f, "failed to load model artifact {}: {}", path, reason),
            LprErrorKind::LabelMismatch { labels, outputs } => {
                write!(f, "label set has {} entries but the classifier outputs {} classes", labels, outputs)
            },
            LprErrorKind::Inference(reason) => write!(f, "inference failed: {}", reason),
            #[cfg(feature = "tensorflow")]
            LprErrorKind::TensorflowError(e) => e.fmt(f),
            LprErrorKind::PlateNotFound => f.write_str("no license plate found"),
        }
    }
}

impl Error for LprError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.kind() {
            LprErrorKind::IOError(e) => Some(e),
            LprErrorKind::ImageLoad(e) => Some(e),
            #[cfg(feature = "tensorflow")]
            LprErrorKind::TensorflowError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IOError> for LprErrorKind {
    fn from(e: IOError) -> Self {
        Self::IOError(e)
    }
}

impl From<ImageError> for LprErrorKind {
    fn from(e: ImageError) -> Self {
        Self::ImageLoad(e)
    }
}

#[cfg(feature = "tensorflow")]
impl From<Status> for LprErrorKind {
    fn from(e: Status) -> Self {
        Self::TensorflowError(e)
    }
}
