//! Run configuration: an optional TOML file overlaid by command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use basalt_vm::VmConfig;
use clap::ValueEnum;
use serde::Deserialize;

use crate::RunArgs;

/// Image path used when neither the command line nor the file names one.
pub const DEFAULT_IMAGE: &str = "module.bin";

/// On-disk layout of the image file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Bare instruction bytes, no declared functions.
    #[default]
    Raw,
    /// Compiled-module container with type and function tables.
    Module,
}

/// Contents of a `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub image: Option<PathBuf>,
    pub format: Option<ImageFormat>,
    pub vm: VmConfig,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read config '{}': {e}", path.display()))?;
        Self::parse(&text).map_err(|e| format!("invalid config '{}': {e}", path.display()))
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub image: PathBuf,
    pub format: ImageFormat,
    pub vm: VmConfig,
}

impl RunSettings {
    /// Flags win over the file; the file wins over built-in defaults.
    pub fn resolve(args: &RunArgs, file: FileConfig) -> Self {
        let mut vm = file.vm;
        if let Some(stack_size) = args.stack_size {
            vm.stack_size = stack_size;
        }
        if let Some(heap_size) = args.heap_size {
            vm.heap_size = heap_size;
        }
        if let Some(limit) = args.instruction_limit {
            vm.instruction_limit = limit;
        }
        vm.profile |= args.profile;

        Self {
            image: args
                .image
                .clone()
                .or(file.image)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE)),
            format: args.format.or(file.format).unwrap_or_default(),
            vm,
        }
    }
}
