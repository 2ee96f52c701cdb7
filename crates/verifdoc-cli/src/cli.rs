// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use verifdoc_core::ModuleKind;

#[derive(Parser, Debug)]
#[command(name = "verifdoc", version, about = "Forensic document image analysis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every analyzer on an image and print the fused report as JSON.
    Analyze {
        /// Image file (PNG, JPEG, TIFF, ...).
        image: PathBuf,
        /// OCR output: {"text": "...", "words": [{"text": "...", "confidence": 93.5}]}.
        #[arg(long)]
        ocr: Option<PathBuf>,
        /// JSON analysis settings; unspecified fields keep their defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory to write one PNG heatmap per module into.
        #[arg(long)]
        heatmaps: Option<PathBuf>,
        /// Per-module deadline, overriding the config file.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Modules to leave out.
        #[arg(long, value_enum, num_args = 1..)]
        skip: Vec<ModuleArg>,
    },
    /// Print the default analysis settings as JSON.
    DefaultConfig,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModuleArg {
    Ela,
    Noise,
    Copymove,
    Ocr,
}

impl From<ModuleArg> for ModuleKind {
    fn from(arg: ModuleArg) -> Self {
        match arg {
            ModuleArg::Ela => ModuleKind::Ela,
            ModuleArg::Noise => ModuleKind::NoiseResidual,
            ModuleArg::Copymove => ModuleKind::CopyMove,
            ModuleArg::Ocr => ModuleKind::TextAnomaly,
        }
    }
}
