//! TensorFlow backed networks, loaded from frozen `GraphDef` protobufs.

use image::Rgb32FImage;
use log::info;
use tensorflow::{ Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor };

use std::fs::File;
use std::io::prelude::*;
use std::path::{ Path, PathBuf };

use crate::classify::{ CharacterClassifier, CharacterNetwork, LabelSet, INPUT_CHANNELS, INPUT_SIDE };
use crate::detect::{ DetectorConfig, LocalizationNetwork, PlateDetector, PlateMap, MAP_CHANNELS };
use crate::error::LprError;
use crate::segment::CharacterSegmenter;
use crate::Lpr;

/// Where the model artifacts live and how their graphs name inputs and outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
    pub plate_graph: PathBuf,
    pub plate_input: String,
    pub plate_output: String,
    pub char_graph: PathBuf,
    pub char_input: String,
    pub char_output: String,
    pub labels: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            plate_graph: PathBuf::from("./models/wpod-net.pb"),
            plate_input: "input".to_string(),
            plate_output: "concatenate_1/concat".to_string(),
            char_graph: PathBuf::from("./models/character_recognition.pb"),
            char_input: "input_1".to_string(),
            char_output: "dense_2/Softmax".to_string(),
            labels: PathBuf::from("./models/license_character_classes.npy"),
        }
    }
}

pub type TfLpr = Lpr<TfPlateNetwork, TfCharacterNetwork>;

/// Load both networks and the label set, failing on anything missing or inconsistent.
pub fn load_pipeline(models: &ModelConfig, detector: DetectorConfig) -> Result<TfLpr, LprError> {
    let plate = TfPlateNetwork::new(&models.plate_graph, &models.plate_input, &models.plate_output)?;
    let character = TfCharacterNetwork::new(&models.char_graph, &models.char_input, &models.char_output)?;
    let labels = LabelSet::load(&models.labels)?;
    let classifier = CharacterClassifier::new(character, labels)?;
    Ok(Lpr::new(PlateDetector::with_config(plate, detector), CharacterSegmenter::new(), classifier))
}

/// One frozen graph with a single input and a single output.
pub struct FrozenGraph {
    graph: Graph,
    session: Session,
    input_name: String,
    output_name: String,
}

impl FrozenGraph {

    pub fn new(pb_file: impl AsRef<Path>, input_name: &str, output_name: &str) -> Result<Self, LprError> {
        let pb_path = pb_file.as_ref();
        let mut pb = Vec::new();
        File::open(pb_path)
            .and_then(|mut f| f.read_to_end(&mut pb))
            .map_err(|e| LprError::model_load(pb_path, e))?;
        // import graph def
        let mut graph = Graph::new();
        let graph_def_options = ImportGraphDefOptions::new();
        graph.import_graph_def(&pb, &graph_def_options)
            .map_err(|e| LprError::model_load(pb_path, e))?;
        for name in [input_name, output_name] {
            graph.operation_by_name_required(name)
                .map_err(|e| LprError::model_load(pb_path, e))?;
        }
        // new session
        let session_option = SessionOptions::new();
        let session = Session::new(&session_option, &graph)
            .map_err(|e| LprError::model_load(pb_path, e))?;
        info!("loaded graph {}", pb_path.display());
        Ok(Self { graph, session, input_name: input_name.to_string(), output_name: output_name.to_string() })
    }

    pub fn run(&self, input: &Tensor<f32>) -> Result<Tensor<f32>, LprError> {
        let graph = &self.graph;
        let mut args = SessionRunArgs::new();
        args.add_feed(&graph.operation_by_name_required(&self.input_name)?, 0, input);
        let res = args.request_fetch(&graph.operation_by_name_required(&self.output_name)?, 0);
        self.session.run(&mut args)?;
        let res: Tensor<f32> = args.fetch(res)?;
        Ok(res)
    }
}

pub struct TfPlateNetwork(FrozenGraph);

impl TfPlateNetwork {

    pub fn new(pb_file: impl AsRef<Path>, input_name: &str, output_name: &str) -> Result<Self, LprError> {
        Ok(Self(FrozenGraph::new(pb_file, input_name, output_name)?))
    }
}

impl LocalizationNetwork for TfPlateNetwork {
    fn predict(&self, input: &Rgb32FImage) -> Result<PlateMap, LprError> {
        let (width, height) = input.dimensions();
        let tensor = Tensor::new(&[1, height as u64, width as u64, 3]).with_values(input.as_raw())?;
        let res = self.0.run(&tensor)?;
        match *res.dims() {
            [1, rows, cols, channels] if channels as usize == MAP_CHANNELS => {
                PlateMap::new(rows as usize, cols as usize, res.to_vec())
            },
            ref dims => Err(LprError::inference(format!("unexpected plate map shape {:?}", dims))),
        }
    }
}

pub struct TfCharacterNetwork {
    graph: FrozenGraph,
    classes: usize,
}

impl TfCharacterNetwork {

    /// Load the graph and learn its output width from one blank image.
    pub fn new(pb_file: impl AsRef<Path>, input_name: &str, output_name: &str) -> Result<Self, LprError> {
        let pb_path = pb_file.as_ref();
        let graph = FrozenGraph::new(pb_path, input_name, output_name)?;
        let blank = vec![0.0; (INPUT_SIDE * INPUT_SIDE) as usize * INPUT_CHANNELS];
        let probe = graph.run(&input_tensor(&blank)?)
            .map_err(|e| LprError::model_load(pb_path, e))?;
        let classes = match *probe.dims() {
            [1, classes] if classes > 0 => classes as usize,
            ref dims => return Err(LprError::model_load(pb_path, format!("unexpected output shape {:?}", dims))),
        };
        Ok(Self { graph, classes })
    }
}

impl CharacterNetwork for TfCharacterNetwork {
    fn num_classes(&self) -> usize {
        self.classes
    }

    fn predict(&self, input: &[f32]) -> Result<Vec<f32>, LprError> {
        let res = self.graph.run(&input_tensor(input)?)?;
        Ok(res.to_vec())
    }
}

fn input_tensor(input: &[f32]) -> Result<Tensor<f32>, LprError> {
    let side = INPUT_SIDE as u64;
    let tensor = Tensor::new(&[1, side, side, INPUT_CHANNELS as u64]).with_values(input)?;
    Ok(tensor)
}
