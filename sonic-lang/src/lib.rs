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

//! Front end and code generator for Sonic, a small language for digital
//! audio signal processing.
//!
//! A Sonic program declares a sampling rate, a channel count, imported
//! native helper types, functions, and one program body, and manipulates
//! waveform files through per-sample assignment loops. This crate
//! translates such programs to C++ source that compiles against the
//! `sonic.h` audio runtime: scanning ([`scanner`]), recursive descent
//! parsing into a typed tree ([`parser`], [`ast`]), semantic validation
//! ([`validate`]), and code generation ([`codegen`]).

pub mod ast;
pub mod codegen;
pub mod error;
pub mod intrinsics;
pub mod parser;
pub mod scanner;
pub mod token;
pub mod types;
pub mod validate;

pub use error::{Result, TranslationError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const RELEASE_DATE: &str = "26 June 2021";
