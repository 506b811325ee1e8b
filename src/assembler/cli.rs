// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use super::Config;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Flat binary image.
    Bin,
    /// DragonDOS binary with load/exec header.
    Dragondos,
    /// CoCo RS-DOS segmented binary.
    Coco,
    /// Intel HEX records.
    Hex,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputFormat::Bin => "bin",
            OutputFormat::Dragondos => "dragondos",
            OutputFormat::Coco => "coco",
            OutputFormat::Hex => "hex",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SymFormat {
    /// `NAME EQU $XXXX` lines.
    Asm,
    Json,
}

impl std::fmt::Display for SymFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SymFormat::Asm => "asm",
            SymFormat::Json => "json",
        };
        write!(f, "{name}")
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "forge6809",
    version = VERSION,
    about = "Two-pass Motorola 6809 cross-assembler"
)]
pub struct Cli {
    /// Assembly source file.
    pub source: PathBuf,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        long_help = "Write the assembled image to FILE. Defaults to the source name with a format-specific extension."
    )]
    pub output: Option<PathBuf>,
    #[arg(
        short = 'f',
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Bin,
        long_help = "Output container format."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'e',
        long = "exec",
        value_name = "ADDR",
        long_help = "Execution address for DragonDOS/CoCo headers, in hex. Defaults to the image origin."
    )]
    pub exec: Option<String>,
    #[arg(
        short = 'l',
        long = "listing",
        value_name = "FILE",
        long_help = "Write a listing of the final pass to FILE."
    )]
    pub listing: Option<PathBuf>,
    #[arg(
        short = 's',
        long = "symbols",
        value_name = "FILE",
        long_help = "Write exported symbols to FILE."
    )]
    pub symbols: Option<PathBuf>,
    #[arg(
        long = "sym-format",
        value_enum,
        default_value_t = SymFormat::Asm,
        long_help = "Exported-symbol file format."
    )]
    pub sym_format: SymFormat,
    #[arg(
        long = "max-depth",
        value_name = "N",
        default_value_t = 128,
        long_help = "Maximum nesting depth for INCLUDE and macro expansion."
    )]
    pub max_depth: u32,
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    pub quiet: bool,
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            max_program_depth: self.max_depth,
        }
    }

    /// Exec address from the CLI, or `origin` when absent.
    pub fn exec_addr(&self, origin: u16) -> Result<u16, String> {
        match &self.exec {
            None => Ok(origin),
            Some(text) => {
                let digits = text.strip_prefix('$').unwrap_or(text);
                let digits = digits
                    .strip_prefix("0x")
                    .or_else(|| digits.strip_prefix("0X"))
                    .unwrap_or(digits);
                u16::from_str_radix(digits, 16)
                    .map_err(|_| format!("invalid exec address '{text}'"))
            }
        }
    }

    /// Output path: explicit, or derived from the source name.
    pub fn output_path(&self) -> PathBuf {
        if let Some(path) = &self.output {
            return path.clone();
        }
        let ext = match self.format {
            OutputFormat::Bin | OutputFormat::Dragondos | OutputFormat::Coco => "bin",
            OutputFormat::Hex => "hex",
        };
        self.source.with_extension(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_addr_accepts_hex_forms() {
        let cli = Cli::parse_from(["forge6809", "demo.s", "-e", "$2000"]);
        assert_eq!(cli.exec_addr(0), Ok(0x2000));
        let cli = Cli::parse_from(["forge6809", "demo.s", "-e", "0x1F00"]);
        assert_eq!(cli.exec_addr(0), Ok(0x1f00));
        let cli = Cli::parse_from(["forge6809", "demo.s"]);
        assert_eq!(cli.exec_addr(0x1234), Ok(0x1234));
        let cli = Cli::parse_from(["forge6809", "demo.s", "-e", "wat"]);
        assert!(cli.exec_addr(0).is_err());
    }

    #[test]
    fn output_path_derives_from_source() {
        let cli = Cli::parse_from(["forge6809", "demo.s"]);
        assert_eq!(cli.output_path(), PathBuf::from("demo.bin"));
        let cli = Cli::parse_from(["forge6809", "demo.s", "-f", "hex"]);
        assert_eq!(cli.output_path(), PathBuf::from("demo.hex"));
        let cli = Cli::parse_from(["forge6809", "demo.s", "-o", "out/rom.img"]);
        assert_eq!(cli.output_path(), PathBuf::from("out/rom.img"));
    }

    #[test]
    fn config_carries_max_depth() {
        let cli = Cli::parse_from(["forge6809", "demo.s", "--max-depth", "16"]);
        assert_eq!(cli.config().max_program_depth, 16);
    }
}
