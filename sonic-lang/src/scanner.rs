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

//! Scans and classifies the lexical tokens of the Sonic language.
//!
//! Tokens can be pushed back onto a stack for the backtracking that the
//! recursive descent parser needs (which is very often!). A second,
//! character-level pushback stack lets the scanner itself look one
//! character ahead for the two-character operators and for telling a `/`
//! operator apart from the start of a comment.

use std::str::Chars;
use std::sync::Arc;

use crate::error::{Result, TranslationError};
use crate::token::{Token, TokenKind};

/// Depth of both pushback stacks. The parser needs at most three tokens of
/// lookahead and the scanner at most two characters.
pub const SCANNER_STACK_SIZE: usize = 16;

const KEYWORDS: &[&str] = &[
    "program", "function", "var", "return", "if", "else", "while", "for", "repeat", "real",
    "integer", "boolean", "wave", "import", "from",
];

const BUILTINS: &[&str] = &[
    "i",
    "c",
    "pi",
    "e",
    "r",
    "t",
    "true",
    "false",
    "m",
    "n",
    "interpolate",
];

fn classify_symbol(lexeme: &str) -> TokenKind {
    if KEYWORDS.contains(&lexeme) {
        TokenKind::Keyword
    } else if BUILTINS.contains(&lexeme) {
        TokenKind::Builtin
    } else {
        TokenKind::Identifier
    }
}

/// One character of input along with the position it was read at. `None`
/// marks end of input.
#[derive(Debug, Clone, Copy)]
struct ScanChar {
    ch: Option<char>,
    line: u32,
    column: u32,
}

pub struct Scanner<'a> {
    chars: Chars<'a>,
    filename: Arc<str>,
    line: u32,
    column: u32,
    char_stack: Vec<ScanChar>,
    token_stack: Vec<Token>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str, filename: Arc<str>) -> Self {
        Scanner {
            chars: source.chars(),
            filename,
            line: 1,
            column: 1,
            char_stack: Vec::new(),
            token_stack: Vec::new(),
        }
    }

    /// Returns the next token, failing with a syntax error at end of input.
    pub fn get_token(&mut self) -> Result<Token> {
        match self.get_token_opt()? {
            Some(token) => Ok(token),
            None => Err(TranslationError::syntax_eof("unexpected end of file")),
        }
    }

    /// Returns the next token, or `None` at end of input. A non-empty
    /// pushback stack is popped before any new input is scanned.
    pub fn get_token_opt(&mut self) -> Result<Option<Token>> {
        if let Some(token) = self.token_stack.pop() {
            return Ok(Some(token));
        }

        if !self.skip_whitespace()? {
            return Ok(None);
        }

        let first = self.get();
        let ch = match first.ch {
            Some(ch) => ch,
            None => return Ok(None),
        };

        if ch.is_alphabetic() || ch == '_' {
            Ok(Some(self.scan_symbol(ch, first)))
        } else if ch == '"' {
            self.scan_string(first).map(Some)
        } else if ch.is_ascii_digit() {
            self.scan_number(ch, first).map(Some)
        } else {
            Ok(Some(self.scan_punctuation(ch, first)))
        }
    }

    /// Pushes a token back so the next `get_token` call returns it (LIFO).
    /// The parser never backtracks more than a few tokens, so overflowing
    /// the stack is an internal error, not the user's fault.
    pub fn push_token(&mut self, token: Token) -> Result<()> {
        if self.token_stack.len() >= SCANNER_STACK_SIZE {
            return Err(TranslationError::internal(
                "token pushback stack overflow",
                Some(&token),
            ));
        }
        self.token_stack.push(token);
        Ok(())
    }

    /// Scans the next token and fails unless its lexeme is exactly
    /// `expected`. Used when the grammar leaves only one legal next token.
    pub fn expect(&mut self, expected: &str) -> Result<()> {
        match self.get_token_opt()? {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(TranslationError::syntax(
                format!("expected '{}'", expected),
                &token,
            )),
            None => Err(TranslationError::syntax_eof(format!(
                "expected '{}'",
                expected
            ))),
        }
    }

    fn make_token(&self, kind: TokenKind, lexeme: String, at: ScanChar) -> Token {
        Token::new(kind, lexeme, self.filename.clone(), at.line, at.column)
    }

    fn scan_symbol(&mut self, first_char: char, start: ScanChar) -> Token {
        let mut lexeme = String::new();
        lexeme.push(first_char);
        while let Some(ch) = self.peek().ch {
            if ch.is_alphanumeric() || ch == '_' {
                lexeme.push(ch);
                self.get();
            } else {
                break;
            }
        }
        let kind = classify_symbol(&lexeme);
        self.make_token(kind, lexeme, start)
    }

    fn scan_string(&mut self, start: ScanChar) -> Result<Token> {
        // The enclosing quotes are stripped from the stored lexeme.
        let mut lexeme = String::new();
        loop {
            let tc = self.get();
            match tc.ch {
                Some('"') => break,
                Some('\n') | Some('\r') | None => {
                    let token = self.make_token(TokenKind::Str, lexeme, start);
                    return Err(TranslationError::syntax(
                        "unterminated string constant",
                        &token,
                    ));
                }
                Some(ch) => lexeme.push(ch),
            }
        }
        Ok(self.make_token(TokenKind::Str, lexeme, start))
    }

    fn scan_number(&mut self, first_char: char, start: ScanChar) -> Result<Token> {
        let mut lexeme = String::new();
        lexeme.push(first_char);

        let mut e_count = 0;
        let mut e_follows = false;
        let mut e_seen = false;
        let mut dot_count = 0;
        loop {
            let ch = match self.peek().ch {
                Some(ch) => ch,
                None => break,
            };

            if !ch.is_ascii_digit() && ch != 'e' && ch != 'E' && ch != '.' {
                // A sign continues the constant only directly after the exponent marker.
                if !((ch == '+' || ch == '-') && e_follows) {
                    break;
                }
            }

            if ch == '.' {
                dot_count += 1;
                if dot_count > 1 {
                    let token = self.make_token(TokenKind::Constant, lexeme, start);
                    return Err(TranslationError::syntax(
                        "extraneous '.' in numeric constant",
                        &token,
                    ));
                }
                if e_seen {
                    let token = self.make_token(TokenKind::Constant, lexeme, start);
                    return Err(TranslationError::syntax(
                        "'.' not allowed after 'e'/'E' in numeric constant",
                        &token,
                    ));
                }
            }

            e_follows = ch == 'e' || ch == 'E';
            if e_follows {
                e_seen = true;
                e_count += 1;
                if e_count > 1 {
                    let token = self.make_token(TokenKind::Constant, lexeme, start);
                    return Err(TranslationError::syntax(
                        "extraneous 'e'/'E' in numeric constant",
                        &token,
                    ));
                }
            }

            lexeme.push(ch);
            self.get();
        }

        Ok(self.make_token(TokenKind::Constant, lexeme, start))
    }

    fn scan_punctuation(&mut self, first_char: char, start: ScanChar) -> Token {
        let mut lexeme = String::new();
        lexeme.push(first_char);

        let next = self.peek().ch;
        if first_char == '<' {
            if let Some(ch @ ('<' | '>' | '=')) = next {
                lexeme.push(ch);
                self.get();
            }
        } else if "+-*/%=>!".contains(first_char) {
            if let Some('=') = next {
                lexeme.push('=');
                self.get();
            }
        }

        self.make_token(TokenKind::Punctuation, lexeme, start)
    }

    /// Consumes whitespace and comments; positions the input at the start
    /// of the next token. Returns false at end of input.
    fn skip_whitespace(&mut self) -> Result<bool> {
        loop {
            let tc = self.peek();
            let ch = match tc.ch {
                None => return Ok(false),
                Some(ch) => ch,
            };

            if ch == '/' {
                // Might be the beginning of a comment.
                let slash = self.get();
                let second = self.get();
                match second.ch {
                    Some('/') => {
                        loop {
                            let tc = self.get();
                            if tc.ch == Some('\n') || tc.ch.is_none() {
                                break;
                            }
                        }
                        continue;
                    }
                    Some('*') => {
                        self.skip_block_comment()?;
                        continue;
                    }
                    _ => {
                        // A plain division operator: undo both reads so the
                        // next scan sees the '/' again.
                        self.push_char(second)?;
                        self.push_char(slash)?;
                        return Ok(true);
                    }
                }
            }

            if !ch.is_whitespace() {
                return Ok(true);
            }

            self.get();
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        loop {
            let tc = self.get();
            match tc.ch {
                None => {
                    return Err(TranslationError::syntax_eof(
                        "unterminated '/*' comment at end of file",
                    ))
                }
                Some('*') => {
                    if self.peek().ch == Some('/') {
                        self.get();
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn push_char(&mut self, tc: ScanChar) -> Result<()> {
        if self.char_stack.len() >= SCANNER_STACK_SIZE {
            return Err(TranslationError::internal(
                "character pushback stack overflow",
                None,
            ));
        }
        self.char_stack.push(tc);
        Ok(())
    }

    fn peek(&mut self) -> ScanChar {
        if let Some(tc) = self.char_stack.last() {
            return *tc;
        }
        ScanChar {
            ch: self.chars.clone().next(),
            line: self.line,
            column: self.column,
        }
    }

    fn get(&mut self) -> ScanChar {
        if let Some(tc) = self.char_stack.pop() {
            return tc;
        }
        match self.chars.next() {
            None => ScanChar {
                ch: None,
                line: self.line,
                column: self.column,
            },
            Some(ch) => {
                let tc = ScanChar {
                    ch: Some(ch),
                    line: self.line,
                    column: self.column,
                };
                if ch == '\n' {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
                tc
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::FilenameTable;
    use expect_test::{expect, Expect};

    fn scanner(input: &str) -> Scanner<'_> {
        let mut table = FilenameTable::new();
        let file = table.intern("test.son").unwrap();
        Scanner::new(input, file)
    }

    fn scan_all(input: &str) -> Vec<(TokenKind, String)> {
        let mut s = scanner(input);
        let mut tokens = Vec::new();
        while let Some(t) = s.get_token_opt().unwrap() {
            tokens.push((t.kind(), t.lexeme().to_string()));
        }
        tokens
    }

    fn check(input: &str, output: Expect) {
        let rendered = scan_all(input)
            .into_iter()
            .map(|(kind, lexeme)| format!("{} `{}`", kind, lexeme))
            .collect::<Vec<_>>()
            .join("\n");
        output.assert_eq(&rendered);
    }

    fn check_error(input: &str, output: Expect) {
        let mut s = scanner(input);
        let error = loop {
            match s.get_token_opt() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a scan error for {:?}", input),
                Err(e) => break e,
            }
        };
        output.assert_eq(&error.to_string());
    }

    #[test]
    fn classifies_symbols() {
        check(
            "program beep wave pi x1",
            expect![[r#"
                keyword `program`
                identifier `beep`
                keyword `wave`
                builtin `pi`
                identifier `x1`"#]],
        );
    }

    #[test]
    fn two_character_operators() {
        check(
            "<< <> <= += == != < = !",
            expect![[r#"
                punctuation `<<`
                punctuation `<>`
                punctuation `<=`
                punctuation `+=`
                punctuation `==`
                punctuation `!=`
                punctuation `<`
                punctuation `=`
                punctuation `!`"#]],
        );
    }

    #[test]
    fn division_is_not_a_comment() {
        check(
            "a/b",
            expect![[r#"
                identifier `a`
                punctuation `/`
                identifier `b`"#]],
        );
    }

    #[test]
    fn comments_are_skipped() {
        check(
            "a // to end of line\n// next line too\nb /* and\nthis */ c /* x ** y **/ d",
            expect![[r#"
                identifier `a`
                identifier `b`
                identifier `c`
                identifier `d`"#]],
        );
    }

    #[test]
    fn numeric_constants() {
        check(
            "0 440 0.5 1e6 2.5e-3 1E+2",
            expect![[r#"
                constant `0`
                constant `440`
                constant `0.5`
                constant `1e6`
                constant `2.5e-3`
                constant `1E+2`"#]],
        );
    }

    #[test]
    fn number_followed_by_operator() {
        // The '-' after the exponent-free constant must not be swallowed.
        check(
            "2-1",
            expect![[r#"
                constant `2`
                punctuation `-`
                constant `1`"#]],
        );
    }

    #[test]
    fn leading_dot_is_punctuation() {
        check(
            ".5",
            expect![[r#"
                punctuation `.`
                constant `5`"#]],
        );
    }

    #[test]
    fn string_constants_strip_quotes() {
        check(
            r#"import Voice from "voice.h";"#,
            expect![[r#"
                keyword `import`
                identifier `Voice`
                keyword `from`
                string `voice.h`
                punctuation `;`"#]],
        );
    }

    #[test]
    fn malformed_numbers() {
        check_error(
            "1.2.3",
            expect![[r#"
                Error: extraneous '.' in numeric constant
                Source file: 'test.son' line 1 column 1
                near token '1.2'"#]],
        );
        check_error(
            "1e2e3",
            expect![[r#"
                Error: extraneous 'e'/'E' in numeric constant
                Source file: 'test.son' line 1 column 1
                near token '1e2'"#]],
        );
        check_error(
            "1e2.5",
            expect![[r#"
                Error: '.' not allowed after 'e'/'E' in numeric constant
                Source file: 'test.son' line 1 column 1
                near token '1e2'"#]],
        );
    }

    #[test]
    fn unterminated_string() {
        check_error(
            "\"no closing quote\nx",
            expect![[r#"
                Error: unterminated string constant
                Source file: 'test.son' line 1 column 1
                near token 'no closing quote'"#]],
        );
    }

    #[test]
    fn unterminated_block_comment() {
        check_error(
            "a /* never closed",
            expect![[r#"Error: unterminated '/*' comment at end of file"#]],
        );
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let mut s = scanner("ab\n  cd");
        let first = s.get_token().unwrap();
        assert_eq!((first.line(), first.column()), (1, 1));
        let second = s.get_token().unwrap();
        assert_eq!((second.line(), second.column()), (2, 3));
    }

    #[test]
    fn pushback_is_the_inverse_of_get() {
        let mut s = scanner("one two three");
        let first = s.get_token().unwrap();
        s.push_token(first.clone()).unwrap();
        let again = s.get_token().unwrap();
        assert_eq!(first, again);
        assert_eq!(again, "one");

        // LIFO order across more than one token.
        let second = s.get_token().unwrap();
        let third = s.get_token().unwrap();
        s.push_token(second.clone()).unwrap();
        s.push_token(third.clone()).unwrap();
        assert_eq!(s.get_token().unwrap(), "three");
        assert_eq!(s.get_token().unwrap(), "two");
    }

    #[test]
    fn pushback_overflow_is_an_internal_error() {
        let mut s = scanner("x");
        let token = s.get_token().unwrap();
        for _ in 0..SCANNER_STACK_SIZE {
            s.push_token(token.clone()).unwrap();
        }
        let err = s.push_token(token).unwrap_err();
        assert!(
            err.to_string().contains("token pushback stack overflow"),
            "{}",
            err
        );
    }

    #[test]
    fn expect_matches_literal() {
        let mut s = scanner("( x");
        s.expect("(").unwrap();
        let err = s.expect(")").unwrap_err();
        assert!(err.to_string().contains("expected ')'"));
    }

    #[test]
    fn eof_behavior() {
        let mut s = scanner("  // only trivia\n");
        assert!(s.get_token_opt().unwrap().is_none());
        let err = s.get_token().unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));
    }
}
