// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for forge6809.

use std::fs::File;
use std::process::ExitCode;

use clap::Parser;

use forge6809::assembler::cli::{Cli, OutputFormat, SymFormat};
use forge6809::assembler::listing::ListingWriter;
use forge6809::assembler::output;
use forge6809::Assembler;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut assembler = Assembler::new(cli.config());

    let output = match assembler.assemble_file(&cli.source) {
        Ok(output) => output,
        Err(err) => {
            for diag in err.diagnostics() {
                eprintln!("{}", diag.format_with_context());
            }
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let exec = match cli.exec_addr(output.origin) {
        Ok(exec) => exec,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let out_path = cli.output_path();
    let result = File::create(&out_path).and_then(|file| match cli.format {
        OutputFormat::Bin => output::write_bin(file, &output),
        OutputFormat::Dragondos => output::write_dragondos(file, &output, exec),
        OutputFormat::Coco => output::write_coco(file, &output, exec),
        OutputFormat::Hex => output::write_hex(file, &output),
    });
    if let Err(err) = result {
        eprintln!("{}: {err}", out_path.display());
        return ExitCode::FAILURE;
    }

    if let Some(path) = &cli.listing {
        let result = File::create(path)
            .and_then(|file| ListingWriter::new(file).write_all(&output.listing));
        if let Err(err) = result {
            eprintln!("{}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }

    if let Some(path) = &cli.symbols {
        let result = File::create(path).and_then(|file| match cli.sym_format {
            SymFormat::Asm => output::write_symbols(file, &output),
            SymFormat::Json => output::write_symbols_json(file, &output),
        });
        if let Err(err) = result {
            eprintln!("{}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }

    if !cli.quiet {
        eprintln!(
            "{}: {} bytes at ${:04X}",
            out_path.display(),
            output.image.len(),
            output.origin
        );
    }
    ExitCode::SUCCESS
}
