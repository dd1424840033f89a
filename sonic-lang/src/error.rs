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

//! The single error category of the translator.
//!
//! Every fallible step in the pipeline produces a [`TranslationError`]. The
//! first error aborts the translation; there is no recovery and no second
//! diagnostic, so each message is written to stand on its own.

use std::path::PathBuf;

use snafu::Snafu;

use crate::token::Token;

pub type Result<T, E = TranslationError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
pub enum TranslationError {
    #[snafu(display("Error: cannot open source file '{}': {}", path.display(), source))]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(context(false))]
    #[snafu(display("Error: output file write failed: {}", source))]
    Io { source: std::io::Error },

    #[snafu(display("{}", diagnostic(message, near)))]
    Syntax {
        message: String,
        near: Option<Token>,
    },

    #[snafu(display("{}", diagnostic(message, near)))]
    Semantic {
        message: String,
        near: Option<Token>,
    },

    #[snafu(display("{}", diagnostic(message, near)))]
    Internal {
        message: String,
        near: Option<Token>,
    },
}

impl TranslationError {
    pub fn syntax(message: impl Into<String>, near: &Token) -> Self {
        TranslationError::Syntax {
            message: message.into(),
            near: Some(near.clone()),
        }
    }

    pub fn syntax_eof(message: impl Into<String>) -> Self {
        TranslationError::Syntax {
            message: message.into(),
            near: None,
        }
    }

    pub fn semantic(message: impl Into<String>, near: &Token) -> Self {
        TranslationError::Semantic {
            message: message.into(),
            near: Some(near.clone()),
        }
    }

    pub fn semantic_nowhere(message: impl Into<String>) -> Self {
        TranslationError::Semantic {
            message: message.into(),
            near: None,
        }
    }

    /// An invariant violation inside the translator itself. Never the
    /// user's fault; the message names the invariant that failed.
    pub fn internal(message: impl Into<String>, near: Option<&Token>) -> Self {
        TranslationError::Internal {
            message: message.into(),
            near: near.cloned(),
        }
    }
}

fn diagnostic(message: &str, near: &Option<Token>) -> String {
    let mut text = format!("Error: {}", message);
    if let Some(token) = near {
        text.push_str(&format!(
            "\nSource file: '{}' line {} column {}",
            token.source_file(),
            token.line(),
            token.column()
        ));
        text.push_str(&format!("\nnear token '{}'", token.lexeme()));
    }
    text
}
