// sonic -- a Sonic to C++ translator for digital audio processing
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! `sonicc` - the Sonic to C++ translator.
//!
//! Reads one or more Sonic source files, treats them as a single program,
//! and writes `<program>.cpp` into the current directory. On any error the
//! partial output is removed so a half-written translation never survives.

use std::fs;
use std::path::PathBuf;
use std::process;

use structopt::StructOpt;

use sonic_lang::ast::Program;
use sonic_lang::scanner::Scanner;
use sonic_lang::token::FilenameTable;
use sonic_lang::{codegen, parser, validate, TranslationError, RELEASE_DATE, VERSION};

#[derive(Debug, StructOpt)]
#[structopt(name = "sonicc", about = "Translating Sonic programs into C++")]
struct Opt {
    #[structopt(short = "v", long = "verbose")]
    verbose: bool,

    /// Sonic source files, combined into one program in the order given.
    #[structopt(parse(from_os_str), required = true)]
    sources: Vec<PathBuf>,
}

fn main() {
    let opt = Opt::from_args();

    let level = if opt.verbose {
        log::Level::Trace
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level).unwrap();

    println!("Sonic translator, version {} ({})", VERSION, RELEASE_DATE);
    println!();

    let mut program = Program::new();
    match run(&opt, &mut program) {
        Ok(()) => {
            println!("Translation completed successfully.");
        }
        Err(error) => {
            eprintln!("{}", error);
            remove_partial_output(&program);
            process::exit(1);
        }
    }
}

fn run(opt: &Opt, program: &mut Program) -> Result<(), TranslationError> {
    let mut filenames = FilenameTable::new();

    for path in &opt.sources {
        let text = fs::read_to_string(path).map_err(|source| TranslationError::OpenFile {
            path: path.clone(),
            source,
        })?;
        let handle = filenames.intern(&path.to_string_lossy())?;
        let mut scanner = Scanner::new(&text, handle);
        parser::parse_source(program, &mut scanner)?;
        log::debug!("parsed '{}'", path.display());
    }

    validate::validate(program)?;
    let filename = codegen::generate_file(program)?;
    log::info!("wrote '{}'", filename);
    Ok(())
}

/// The code generator already removes its own file when it fails midway;
/// this also covers failures in later source files of a multi-file run,
/// where an output from an earlier successful run may be lying around.
fn remove_partial_output(program: &Program) {
    if let Some(body) = &program.body {
        let _ = fs::remove_file(format!("{}.cpp", body.name.lexeme()));
    }
}
