use clap::{ value_parser, Arg, Command };
use env_logger::Env;
use log::{ error, info, warn };

use std::error::Error;
use std::path::{ Path, PathBuf };
use std::process;

use lpr_pipeline::tf::{ self, ModelConfig };
use lpr_pipeline::DetectorConfig;


fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let models = ModelConfig::default();
    let detector = DetectorConfig::default();
    let matches = Command::new("lpr")
                    .version(env!("CARGO_PKG_VERSION"))
                    .about("Reads the license plate of a vehicle photo")
                    .arg(Arg::new("INPUT")
                        .help("image file with license plate")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .index(1))
                    .arg(path_arg("plate-model", "frozen plate localization graph", &models.plate_graph))
                    .arg(name_arg("plate-input", "input operation of the localization graph", &models.plate_input))
                    .arg(name_arg("plate-output", "output operation of the localization graph", &models.plate_output))
                    .arg(path_arg("char-model", "frozen character classification graph", &models.char_graph))
                    .arg(name_arg("char-input", "input operation of the classification graph", &models.char_input))
                    .arg(name_arg("char-output", "output operation of the classification graph", &models.char_output))
                    .arg(path_arg("labels", "character labels, .npy or one per line", &models.labels))
                    .arg(Arg::new("threshold")
                        .long("threshold")
                        .help("minimum plate probability")
                        .value_parser(value_parser!(f32))
                        .default_value(detector.threshold.to_string()))
                    .arg(Arg::new("max-dim")
                        .long("max-dim")
                        .help("upper bound of the detector input's shorter side")
                        .value_parser(value_parser!(u32))
                        .default_value(detector.max_dim.to_string()))
                    .arg(Arg::new("min-dim")
                        .long("min-dim")
                        .help("detector input side for a square photo")
                        .value_parser(value_parser!(u32))
                        .default_value(detector.min_dim.to_string()))
                    .get_matches();

    let input = matches.get_one::<PathBuf>("INPUT").ok_or("image is required")?;
    let path = |id: &str| matches.get_one::<PathBuf>(id).cloned().ok_or(format!("--{} is required", id));
    let op_name = |id: &str| matches.get_one::<String>(id).cloned().ok_or(format!("--{} is required", id));
    let models = ModelConfig {
        plate_graph: path("plate-model")?,
        plate_input: op_name("plate-input")?,
        plate_output: op_name("plate-output")?,
        char_graph: path("char-model")?,
        char_input: op_name("char-input")?,
        char_output: op_name("char-output")?,
        labels: path("labels")?,
    };
    let detector = DetectorConfig {
        threshold: *matches.get_one::<f32>("threshold").ok_or("--threshold is required")?,
        max_dim: *matches.get_one::<u32>("max-dim").ok_or("--max-dim is required")?,
        min_dim: *matches.get_one::<u32>("min-dim").ok_or("--min-dim is required")?,
        ..detector
    };

    let lpr = match tf::load_pipeline(&models, detector) {
        Ok(lpr) => lpr,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    match lpr.recognize(input) {
        Ok(res) => {
            info!("plate at {:?}, confidence {:.3}", res.corners(), res.confidence());
            if res.is_empty() {
                warn!("plate found but no characters could be read");
            }
            println!("{}", res.text());
            Ok(())
        },
        Err(e) if e.is_plate_not_found() => {
            warn!("no license plate in {}", input.display());
            process::exit(2);
        },
        Err(e) => Err(e.into()),
    }
}

fn path_arg(id: &'static str, help: &'static str, default: &Path) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .value_parser(value_parser!(PathBuf))
        .default_value(default.display().to_string())
}

fn name_arg(id: &'static str, help: &'static str, default: &str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .default_value(default.to_string())
}
