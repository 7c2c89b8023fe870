use std::path::PathBuf;

use vidstab_features::DetectorBuilder;

use crate::error::{StabError, StabResult};
use crate::settings::{parse_border_mode, parse_border_size, StabilizerSettings};

pub const USAGE: &str = "\
usage: vidstab <input> <output> [options]

  <input>                  directory of numbered frames (or a single image)
  <output>                 directory the stabilized frames are written to

options:
  --window N               smoothing half-width in frames (default 30)
  --border N|auto          margin added around each frame (default 0)
  --border-mode MODE       black, replicate, reflect or constant:R,G,B[,A]
  --crop                   crop frames back to the input size
  --method NAME            GFTT, FAST, HARRIS, ORB, STAR or DENSE
  --max-frames N           stop after N frames (batch mode)
  --streaming              single pass with bounded memory
  --config FILE            TOML settings file; flags override it
  --save-transforms FILE   write the transform log as JSON (batch mode)
  --load-transforms FILE   apply a saved transform log instead of estimating
  --threads N              worker threads
  -h, --help               show this message";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub window: Option<usize>,
    pub border: Option<String>,
    pub border_mode: Option<String>,
    pub crop: bool,
    pub method: Option<String>,
    pub max_frames: Option<usize>,
    pub streaming: bool,
    pub config: Option<PathBuf>,
    pub save_transforms: Option<PathBuf>,
    pub load_transforms: Option<PathBuf>,
    pub threads: Option<usize>,
    pub help: bool,
}

fn invalid(option: &str, reason: impl Into<String>) -> StabError {
    StabError::InvalidOption {
        option: option.to_string(),
        reason: reason.into(),
    }
}

fn parse_count(option: &str, value: String) -> StabResult<usize> {
    value
        .parse()
        .map_err(|_| invalid(option, format!("expected a non-negative integer, got '{}'", value)))
}

impl CliArgs {
    /// Parse arguments, not including the program name
    pub fn parse<I>(args: I) -> StabResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = CliArgs::default();
        let mut positional = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = |name: &str| args.next().ok_or_else(|| invalid(name, "missing value"));
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--window" => parsed.window = Some(parse_count("window", value("window")?)?),
                "--border" => parsed.border = Some(value("border")?),
                "--border-mode" => parsed.border_mode = Some(value("border-mode")?),
                "--crop" => parsed.crop = true,
                "--method" => parsed.method = Some(value("method")?),
                "--max-frames" => parsed.max_frames = Some(parse_count("max-frames", value("max-frames")?)?),
                "--streaming" => parsed.streaming = true,
                "--config" => parsed.config = Some(value("config")?.into()),
                "--save-transforms" => parsed.save_transforms = Some(value("save-transforms")?.into()),
                "--load-transforms" => parsed.load_transforms = Some(value("load-transforms")?.into()),
                "--threads" => parsed.threads = Some(parse_count("threads", value("threads")?)?),
                flag if flag.starts_with("--") => return Err(invalid(flag, "unknown flag")),
                _ => positional.push(arg),
            }
        }

        if parsed.help {
            return Ok(parsed);
        }
        match <[String; 2]>::try_from(positional) {
            Ok([input, output]) => {
                parsed.input = input.into();
                parsed.output = output.into();
            }
            Err(p) => return Err(invalid("paths", format!("expected <input> <output>, got {} paths", p.len()))),
        }
        if parsed.streaming && (parsed.save_transforms.is_some() || parsed.load_transforms.is_some()) {
            return Err(invalid("streaming", "transform logs are only available in batch mode"));
        }
        Ok(parsed)
    }

    /// Settings from the config file (if any) with command line flags applied on top
    pub fn settings(&self) -> StabResult<StabilizerSettings> {
        let mut settings = match &self.config {
            Some(path) => StabilizerSettings::load_toml(path)?,
            None => StabilizerSettings::default(),
        };

        if let Some(window) = self.window {
            settings.config.smoothing_window = window;
        }
        if let Some(border) = &self.border {
            settings.config.border.size = parse_border_size(border)?;
        }
        if let Some(mode) = &self.border_mode {
            settings.config.border.mode = parse_border_mode(mode)?;
        }
        if self.crop {
            settings.config.crop_to_original = true;
        }
        if let Some(method) = &self.method {
            // A different method discards the file's options for the old one
            let builder = DetectorBuilder::from_name(method)?;
            if builder.method() != settings.detector.method() {
                settings.detector = builder.to_kind()?;
            }
        }
        if let Some(n) = self.max_frames {
            settings.max_frames = Some(n);
        }
        if let Some(n) = self.threads {
            settings.config.n_threads = n.max(1);
        }
        Ok(settings)
    }
}
