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

//! Lexical tokens and the interned filename table they point into.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TranslationError};

/// Upper bound on distinct source files per translator run.
pub const MAX_SOURCE_FILES: usize = 256;

/// Hands out stable, cheaply cloneable handles for source filenames so that
/// every token can carry its origin without duplicating the path string.
#[derive(Debug, Default)]
pub struct FilenameTable {
    names: Vec<Arc<str>>,
}

impl FilenameTable {
    pub fn new() -> Self {
        FilenameTable::default()
    }

    pub fn intern(&mut self, name: &str) -> Result<Arc<str>> {
        if let Some(existing) = self.names.iter().find(|n| ***n == *name) {
            return Ok(existing.clone());
        }
        if self.names.len() >= MAX_SOURCE_FILES {
            return Err(TranslationError::semantic_nowhere(format!(
                "too many source files (limit is {})",
                MAX_SOURCE_FILES
            )));
        }
        let handle: Arc<str> = Arc::from(name);
        self.names.push(handle.clone());
        Ok(handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Unknown,
    Keyword,
    Identifier,
    Builtin,
    Constant,
    Punctuation,
    Str,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Unknown => "unknown",
            TokenKind::Keyword => "keyword",
            TokenKind::Identifier => "identifier",
            TokenKind::Builtin => "builtin",
            TokenKind::Constant => "constant",
            TokenKind::Punctuation => "punctuation",
            TokenKind::Str => "string",
        };
        write!(f, "{}", name)
    }
}

/// A classified lexeme together with its source position.
///
/// Token equality is by lexeme alone; position and kind never participate.
#[derive(Debug, Clone)]
pub struct Token {
    kind: TokenKind,
    lexeme: String,
    file: Arc<str>,
    line: u32,
    column: u32,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        lexeme: impl Into<String>,
        file: Arc<str>,
        line: u32,
        column: u32,
    ) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            file,
            line,
            column,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn source_file(&self) -> &str {
        &self.file
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Token) -> bool {
        self.lexeme == other.lexeme
    }
}

impl Eq for Token {}

impl PartialEq<str> for Token {
    fn eq(&self, other: &str) -> bool {
        self.lexeme == other
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.lexeme == *other
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}
