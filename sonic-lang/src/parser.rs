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

//! Recursive descent parser for Sonic source code.
//!
//! The parser consumes one scanner per source file and accumulates
//! everything into a shared [`Program`], so a program may be split across
//! several files. Backtracking never goes deeper than the scanner's token
//! pushback stack.

use crate::ast::{
    BinaryOp, CallKind, Expr, ExprKind, Function, ImportType, Lvalue, LvalueTarget, Program, Stmt,
    UnaryOp, VarDecl,
};
use crate::error::{Result, TranslationError};
use crate::intrinsics::{find_intrinsic, is_pseudo_function};
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};
use crate::types::{ElemType, SonicType, TypeKind, MAX_ARRAY_DIMENSIONS, MAX_CHANNELS};

#[cfg(test)]
mod expect_tests;

/// Parses one source file into `program`. Call once per file, in command
/// line order; program-level settings and declarations accumulate.
pub fn parse_source(program: &mut Program, scanner: &mut Scanner<'_>) -> Result<()> {
    Parser {
        program,
        scanner,
        inside_func_parms: false,
        local_parms: Vec::new(),
        local_vars: Vec::new(),
    }
    .run()
}

struct Parser<'a, 'src> {
    program: &'a mut Program,
    scanner: &'a mut Scanner<'src>,
    inside_func_parms: bool,
    /// Parameters of the function currently being parsed, needed to
    /// disambiguate array and wave subscripts while its body is read.
    local_parms: Vec<VarDecl>,
    local_vars: Vec<VarDecl>,
}

impl<'a, 'src> Parser<'a, 'src> {
    fn run(&mut self) -> Result<()> {
        while let Some(t) = self.scanner.get_token_opt()? {
            if t.kind() == TokenKind::Builtin {
                self.parse_builtin_assignment(t)?;
            } else if t == "program" || t == "function" {
                self.scanner.push_token(t)?;
                self.parse_function()?;
            } else if t == "import" {
                self.parse_import_list()?;
            } else if t == "var" {
                self.scanner.push_token(t)?;
                self.parse_var_list(true)?;
            } else {
                return Err(TranslationError::syntax(
                    "expected 'program', 'function', 'var', 'import', or constant definition",
                    &t,
                ));
            }
        }
        Ok(())
    }

    /// `r = 44100;` / `m = 2;` / `interpolate = true;` - each at most once.
    fn parse_builtin_assignment(&mut self, name: Token) -> Result<()> {
        if name == "r" || name == "m" {
            self.scanner.expect("=")?;
            let value_token = self.scanner.get_token()?;
            let value = positive_integer_constant(&value_token)
                .ok_or_else(|| TranslationError::syntax("expected positive integer constant", &value_token))?;
            self.scanner.expect(";")?;

            if name == "r" {
                if self.program.sampling_rate_explicit {
                    return Err(TranslationError::syntax(
                        "value for 'r' has already been defined in program",
                        &name,
                    ));
                }
                self.program.sampling_rate = value;
                self.program.sampling_rate_explicit = true;
            } else {
                if value > MAX_CHANNELS {
                    return Err(TranslationError::syntax(
                        format!("maximum allowed number of channels is {}", MAX_CHANNELS),
                        &name,
                    ));
                }
                if self.program.num_channels_explicit {
                    return Err(TranslationError::syntax(
                        "value for 'm' has already been defined in program",
                        &name,
                    ));
                }
                self.program.num_channels = value;
                self.program.num_channels_explicit = true;
            }
        } else if name == "interpolate" {
            self.scanner.expect("=")?;
            let value = self.scanner.get_token()?;
            self.scanner.expect(";")?;

            if self.program.interpolate_explicit {
                return Err(TranslationError::syntax(
                    "value for 'interpolate' has already been defined in program",
                    &name,
                ));
            }
            if value == "true" {
                self.program.interpolate = true;
            } else if value == "false" {
                self.program.interpolate = false;
            } else {
                return Err(TranslationError::syntax("expected 'true' or 'false'", &value));
            }
            self.program.interpolate_explicit = true;
        } else {
            return Err(TranslationError::syntax(
                "cannot assign a value to this built-in symbol",
                &name,
            ));
        }
        Ok(())
    }

    /// `import Name1, Name2 from "header.h";`
    fn parse_import_list(&mut self) -> Result<()> {
        let mut names = Vec::new();
        loop {
            let name = self.scanner.get_token()?;
            if name.kind() != TokenKind::Identifier {
                return Err(TranslationError::syntax("expected imported class name", &name));
            }
            names.push(name);

            let t = self.scanner.get_token()?;
            if t == "from" {
                let header = self.scanner.get_token()?;
                if header.kind() != TokenKind::Str {
                    return Err(TranslationError::syntax(
                        "expected header filename inside double quotes",
                        &header,
                    ));
                }
                self.scanner.expect(";")?;
                for name in names {
                    self.program.imports.push(ImportType {
                        name,
                        header: header.clone(),
                    });
                }
                return Ok(());
            } else if t != "," {
                return Err(TranslationError::syntax("expected ',' or 'from'", &t));
            }
        }
    }

    /// Consecutive `var name [init] {, name [init]} : type ;` groups.
    fn parse_var_list(&mut self, is_global: bool) -> Result<()> {
        loop {
            let t = match self.scanner.get_token_opt()? {
                Some(t) => t,
                None if is_global => break,
                None => return Err(TranslationError::syntax_eof("unexpected end of file")),
            };
            if t != "var" {
                self.scanner.push_token(t)?;
                break;
            }

            let mut group: Vec<(Token, Vec<Expr>)> = Vec::new();
            loop {
                let var_name = self.scanner.get_token()?;
                if var_name.kind() != TokenKind::Identifier {
                    return Err(TranslationError::syntax("expected variable name", &var_name));
                }
                self.check_name_free(&var_name, "variable name")?;

                let mut init = Vec::new();
                let t = self.scanner.get_token()?;
                if t == "=" {
                    init.push(self.parse_expression()?);
                } else if t == "(" {
                    init = self.parse_constructor_args()?;
                } else {
                    self.scanner.push_token(t)?;
                }
                group.push((var_name, init));

                let t = self.scanner.get_token()?;
                if t == ":" {
                    break;
                } else if t != "," {
                    return Err(TranslationError::syntax("expected ',' or ':'", &t));
                }
            }

            let (ty, ctor_args) = self.parse_type_with_constructor()?;
            self.scanner.expect(";")?;

            for (name, mut init) in group {
                if !ctor_args.is_empty() {
                    if !init.is_empty() {
                        return Err(TranslationError::syntax(
                            "variable has both an initializer and constructor arguments",
                            &name,
                        ));
                    }
                    init = ctor_args.clone();
                }
                let decl = VarDecl::new(name, ty.clone(), init, is_global);
                if is_global {
                    self.program.globals.push(decl);
                } else {
                    self.local_vars.push(decl);
                }
            }
        }
        Ok(())
    }

    /// Parenthesized constructor argument list, opening paren consumed.
    fn parse_constructor_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        let t = self.scanner.get_token()?;
        if t == ")" {
            return Ok(args);
        }
        self.scanner.push_token(t)?;
        loop {
            args.push(self.parse_b0()?);
            let t = self.scanner.get_token()?;
            if t == ")" {
                break;
            } else if t != "," {
                return Err(TranslationError::syntax("expected ')' or ','", &t));
            }
        }
        Ok(args)
    }

    fn check_name_free(&self, name: &Token, what: &str) -> Result<()> {
        if find_intrinsic(name.lexeme()).is_some() {
            return Err(TranslationError::syntax(
                format!("{} conflicts with intrinsic function", what),
                name,
            ));
        }
        if is_pseudo_function(name.lexeme()) {
            return Err(TranslationError::syntax(
                format!("{} conflicts with pseudo-function", what),
                name,
            ));
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<SonicType> {
        Ok(self.parse_type_inner(false)?.0)
    }

    /// In variable declarations an import type name may carry constructor
    /// arguments: `var v: Voice(440, 0.5, 0.5);`.
    fn parse_type_with_constructor(&mut self) -> Result<(SonicType, Vec<Expr>)> {
        self.parse_type_inner(true)
    }

    fn parse_type_inner(&mut self, allow_constructor: bool) -> Result<(SonicType, Vec<Expr>)> {
        let t = self.scanner.get_token()?;

        let (base, array_allowed) = if t == "integer" {
            (TypeKind::Integer, true)
        } else if t == "real" {
            (TypeKind::Real, true)
        } else if t == "boolean" {
            (TypeKind::Boolean, true)
        } else if t == "wave" {
            (TypeKind::Wave, false)
        } else if self.program.find_import_type(&t).is_some() {
            (TypeKind::Import(t.lexeme().to_string()), false)
        } else {
            return Err(TranslationError::syntax("expected data type", &t));
        };

        let mut ctor_args = Vec::new();
        if allow_constructor && matches!(base, TypeKind::Import(_)) {
            let paren = self.scanner.get_token()?;
            if paren == "(" {
                ctor_args = self.parse_constructor_args()?;
            } else {
                self.scanner.push_token(paren)?;
            }
        }

        let lbracket = self.scanner.get_token()?;
        if lbracket != "[" {
            self.scanner.push_token(lbracket)?;
            return Ok((SonicType::new(base), ctor_args));
        }

        if !array_allowed {
            return Err(TranslationError::syntax(
                format!("'{}' may not be used as an array element type", t.lexeme()),
                &t,
            ));
        }

        let mut dims = Vec::new();
        loop {
            let dim = self.scanner.get_token()?;
            if dims.len() >= MAX_ARRAY_DIMENSIONS {
                return Err(TranslationError::syntax("too many array dimensions", &dim));
            }

            if dim == "?" {
                if !self.inside_func_parms {
                    return Err(TranslationError::syntax(
                        "may use '?' as array dimension only in function parameters",
                        &dim,
                    ));
                }
                if !dims.is_empty() {
                    return Err(TranslationError::syntax(
                        "may use '?' only as first dimension of array",
                        &dim,
                    ));
                }
                dims.push(0);
            } else {
                match positive_integer_constant(&dim) {
                    Some(value) => dims.push(value),
                    None => {
                        return Err(TranslationError::syntax(
                            "array dimension must be positive integer constant",
                            &dim,
                        ))
                    }
                }
            }

            let punct = self.scanner.get_token()?;
            if punct == "]" {
                break;
            } else if punct != "," {
                return Err(TranslationError::syntax("expected ',' or ']'", &punct));
            }
        }

        let element = match base {
            TypeKind::Integer => ElemType::Integer,
            TypeKind::Real => ElemType::Real,
            TypeKind::Boolean => ElemType::Boolean,
            _ => {
                return Err(TranslationError::internal(
                    "array element survived the element type check",
                    Some(&t),
                ))
            }
        };
        Ok((SonicType::new(TypeKind::Array { element, dims }), ctor_args))
    }

    /// `program name(parms) [: type] { ... }` or the same with `function`.
    fn parse_function(&mut self) -> Result<()> {
        let t = self.scanner.get_token()?;
        let is_program_body = t == "program";
        if !is_program_body && t != "function" {
            return Err(TranslationError::syntax("expected 'program' or 'function'", &t));
        }

        let func_name = self.scanner.get_token()?;
        if func_name.kind() != TokenKind::Identifier {
            return Err(TranslationError::syntax(
                format!(
                    "expected {} name",
                    if is_program_body { "program" } else { "function" }
                ),
                &func_name,
            ));
        }
        self.check_name_free(&func_name, "name")?;

        self.scanner.expect("(")?;

        let mut params: Vec<VarDecl> = Vec::new();
        loop {
            let parm_name = self.scanner.get_token()?;
            if parm_name == ")" {
                break;
            }
            if parm_name.kind() != TokenKind::Identifier {
                return Err(TranslationError::syntax("expected parameter name or ')'", &parm_name));
            }
            self.check_name_free(&parm_name, "name")?;

            self.scanner.expect(":")?;

            self.inside_func_parms = true;
            let parm_type = self.parse_type();
            self.inside_func_parms = false;
            let mut parm_type = parm_type?;

            // A trailing '&' marks the parameter as passed by reference.
            let amp = self.scanner.get_token()?;
            if amp == "&" {
                parm_type.by_ref = true;
            } else {
                self.scanner.push_token(amp)?;
            }

            params.push(VarDecl::parameter(parm_name, parm_type));

            let t = self.scanner.get_token()?;
            if t != "," {
                self.scanner.push_token(t)?;
            }
        }

        let mut return_type = SonicType::new(TypeKind::Void);
        let t = self.scanner.get_token()?;
        if t == ":" {
            return_type = self.parse_type()?;
        } else {
            self.scanner.push_token(t)?;
        }

        self.scanner.expect("{")?;

        self.local_parms = params;
        self.local_vars = Vec::new();
        self.parse_var_list(false)?;

        let mut body = Vec::new();
        loop {
            let t = self.scanner.get_token()?;
            if t == "}" {
                break;
            }
            self.scanner.push_token(t)?;
            body.push(self.parse_statement()?);
        }

        let func = Function {
            name: func_name,
            is_program_body,
            return_type,
            params: std::mem::take(&mut self.local_parms),
            locals: std::mem::take(&mut self.local_vars),
            body,
        };

        if is_program_body {
            if self.program.body.is_some() {
                return Err(TranslationError::syntax("program body already defined", &func.name));
            }
            self.program.body = Some(func);
        } else {
            self.program.functions.push(func);
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let t = self.scanner.get_token()?;

        if t == "if" {
            self.scanner.expect("(")?;
            let condition = self.parse_b0()?;
            self.scanner.expect(")")?;
            let then_part = Box::new(self.parse_statement()?);
            let t = self.scanner.get_token()?;
            let else_part = if t == "else" {
                Some(Box::new(self.parse_statement()?))
            } else {
                self.scanner.push_token(t)?;
                None
            };
            Ok(Stmt::If {
                condition,
                then_part,
                else_part,
            })
        } else if t == "while" {
            self.scanner.expect("(")?;
            let condition = self.parse_b0()?;
            self.scanner.expect(")")?;
            let body = Box::new(self.parse_statement()?);
            Ok(Stmt::While { condition, body })
        } else if t == "for" {
            // The initializer is a full statement and consumes its own ';';
            // the update must not end with one.
            self.scanner.expect("(")?;
            let init = Box::new(self.parse_statement()?);
            let condition = self.parse_b0()?;
            self.scanner.expect(";")?;
            let update = Box::new(self.parse_assignment()?);
            self.scanner.expect(")")?;
            let body = Box::new(self.parse_statement()?);
            Ok(Stmt::For {
                init,
                condition,
                update,
                body,
            })
        } else if t == "repeat" {
            self.scanner.expect("(")?;
            let count = self.parse_term()?;
            self.scanner.expect(")")?;
            let body = Box::new(self.parse_statement()?);
            Ok(Stmt::Repeat { count, body })
        } else if t == "return" {
            let t2 = self.scanner.get_token()?;
            let value = if t2 == ";" {
                None
            } else {
                self.scanner.push_token(t2)?;
                let value = self.parse_b0()?;
                self.scanner.expect(";")?;
                Some(value)
            };
            Ok(Stmt::Return { token: t, value })
        } else if t == "{" {
            let mut body = Vec::new();
            loop {
                let t = self.scanner.get_token()?;
                if t == "}" {
                    break;
                }
                self.scanner.push_token(t)?;
                body.push(self.parse_statement()?);
            }
            Ok(Stmt::Compound(body))
        } else if t == ";" {
            Ok(Stmt::Compound(Vec::new()))
        } else if t.kind() == TokenKind::Identifier {
            // One more token decides between a call and an assignment.
            let t2 = self.scanner.get_token()?;
            if t2 == "(" {
                self.scanner.push_token(t2)?;
                self.scanner.push_token(t.clone())?;
                let expr = self.parse_t3()?;
                if !matches!(expr.kind, ExprKind::Call { .. }) {
                    return Err(TranslationError::syntax("expected function call", &t));
                }
                self.scanner.expect(";")?;
                Ok(Stmt::Call(expr))
            } else {
                self.scanner.push_token(t2)?;
                self.scanner.push_token(t)?;
                let stmt = self.parse_assignment()?;
                self.scanner.expect(";")?;
                Ok(stmt)
            }
        } else {
            Err(TranslationError::syntax("expected a statement", &t))
        }
    }

    /// An assignment without its terminating ';' (shared with `for`).
    fn parse_assignment(&mut self) -> Result<Stmt> {
        let name = self.scanner.get_token()?;
        let t2 = self.scanner.get_token()?;

        let target = if t2 == "[" {
            let ty = self.var_type(&name)?;
            match ty.kind {
                TypeKind::Array { .. } => {
                    let indices = self.parse_index_list()?;
                    LvalueTarget::Array { indices }
                }
                TypeKind::Wave => {
                    // The literal tokens 'c' and 'i' are mandatory here.
                    self.scanner.expect("c")?;
                    self.scanner.expect(",")?;
                    self.scanner.expect("i")?;
                    let t = self.scanner.get_token()?;
                    let limit = if t == ":" {
                        Some(self.parse_term()?)
                    } else {
                        self.scanner.push_token(t)?;
                        None
                    };
                    self.scanner.expect("]")?;
                    LvalueTarget::Wave { limit }
                }
                _ => {
                    return Err(TranslationError::syntax(
                        "cannot subscript variable of this type",
                        &name,
                    ))
                }
            }
        } else {
            self.scanner.push_token(t2)?;
            LvalueTarget::Scalar
        };

        let op = self.scanner.get_token()?;
        if !matches!(op.lexeme(), "=" | "<<" | "+=" | "-=" | "*=" | "/=" | "%=") {
            return Err(TranslationError::syntax("invalid assignment operator", &op));
        }

        let rvalue = self.parse_expression()?;
        Ok(Stmt::Assign {
            op,
            lvalue: Lvalue { name, target },
            rvalue,
        })
    }

    /// Comma-separated index expressions ending at ']', '[' consumed.
    fn parse_index_list(&mut self) -> Result<Vec<Expr>> {
        let mut indices = Vec::new();
        loop {
            indices.push(self.parse_term()?);
            let punct = self.scanner.get_token()?;
            if punct == "]" {
                break;
            } else if punct != "," {
                return Err(TranslationError::syntax("expected ',' or ']'", &punct));
            }
        }
        Ok(indices)
    }

    // ---- expressions -------------------------------------------------

    /// Top-level expression: a vector literal `{ e, ..., e }` or a `b0`.
    fn parse_expression(&mut self) -> Result<Expr> {
        let t = self.scanner.get_token()?;
        if t == "{" {
            let lbrace = t;
            let mut components = Vec::new();
            loop {
                components.push(self.parse_b0()?);
                let t = self.scanner.get_token()?;
                if t == "}" {
                    break;
                } else if t != "," {
                    return Err(TranslationError::syntax(
                        "expected '}' or ',' after expression",
                        &t,
                    ));
                }
            }
            Ok(Expr::new(lbrace, ExprKind::Vector { components }))
        } else {
            self.scanner.push_token(t)?;
            self.parse_b0()
        }
    }

    fn parse_b0(&mut self) -> Result<Expr> {
        let mut expr = self.parse_b1()?;
        loop {
            let t = self.scanner.get_token()?;
            if t == "|" {
                let rhs = self.parse_b1()?;
                expr = Expr::binary(t, BinaryOp::Or, expr, rhs);
            } else {
                self.scanner.push_token(t)?;
                return Ok(expr);
            }
        }
    }

    fn parse_b1(&mut self) -> Result<Expr> {
        let mut expr = self.parse_b2()?;
        loop {
            let t = self.scanner.get_token()?;
            if t == "&" {
                let rhs = self.parse_b2()?;
                expr = Expr::binary(t, BinaryOp::And, expr, rhs);
            } else {
                self.scanner.push_token(t)?;
                return Ok(expr);
            }
        }
    }

    fn parse_b2(&mut self) -> Result<Expr> {
        let expr = self.parse_term()?;
        let t = self.scanner.get_token()?;
        let op = match t.lexeme() {
            "==" => Some(BinaryOp::Equal),
            "!=" | "<>" => Some(BinaryOp::NotEqual),
            "<" => Some(BinaryOp::Less),
            "<=" => Some(BinaryOp::LessEqual),
            ">" => Some(BinaryOp::Greater),
            ">=" => Some(BinaryOp::GreaterEqual),
            _ => None,
        };
        match op {
            Some(op) => {
                let rhs = self.parse_term()?;
                Ok(Expr::binary(t, op, expr, rhs))
            }
            None => {
                self.scanner.push_token(t)?;
                Ok(expr)
            }
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_t1()?;
        loop {
            let t = self.scanner.get_token()?;
            let op = match t.lexeme() {
                "+" => BinaryOp::Add,
                "-" => BinaryOp::Subtract,
                _ => {
                    self.scanner.push_token(t)?;
                    return Ok(expr);
                }
            };
            let rhs = self.parse_t1()?;
            expr = Expr::binary(t, op, expr, rhs);
        }
    }

    fn parse_t1(&mut self) -> Result<Expr> {
        let mut expr = self.parse_t2()?;
        loop {
            let t = self.scanner.get_token()?;
            let op = match t.lexeme() {
                "*" => BinaryOp::Multiply,
                "/" => BinaryOp::Divide,
                "%" => BinaryOp::Modulo,
                _ => {
                    self.scanner.push_token(t)?;
                    return Ok(expr);
                }
            };
            let rhs = self.parse_t2()?;
            expr = Expr::binary(t, op, expr, rhs);
        }
    }

    /// `^` groups right-to-left.
    fn parse_t2(&mut self) -> Result<Expr> {
        let expr = self.parse_t3()?;
        let t = self.scanner.get_token()?;
        if t == "^" {
            let rhs = self.parse_t2()?;
            Ok(Expr::binary(t, BinaryOp::Power, expr, rhs))
        } else {
            self.scanner.push_token(t)?;
            Ok(expr)
        }
    }

    fn parse_t3(&mut self) -> Result<Expr> {
        let t = self.scanner.get_token()?;

        match t.kind() {
            TokenKind::Constant => {
                let ty = if t.lexeme().contains(&['.', 'e', 'E'][..]) {
                    TypeKind::Real
                } else {
                    TypeKind::Integer
                };
                Ok(Expr::with_type(
                    t,
                    SonicType::new(ty),
                    ExprKind::Constant,
                ))
            }
            TokenKind::Str => Ok(Expr::with_type(
                t,
                SonicType::new(TypeKind::Str),
                ExprKind::Constant,
            )),
            TokenKind::Builtin => Ok(Expr::new(t, ExprKind::Builtin)),
            TokenKind::Identifier => self.parse_identifier_expr(t),
            _ => {
                if t == "(" {
                    let expr = self.parse_expression()?;
                    self.scanner.expect(")")?;
                    Ok(expr)
                } else if t == "!" {
                    let operand = Box::new(self.parse_t3()?);
                    Ok(Expr::new(t, ExprKind::Unary { op: UnaryOp::Not, operand }))
                } else if t == "-" {
                    let operand = Box::new(self.parse_t3()?);
                    Ok(Expr::new(
                        t,
                        ExprKind::Unary {
                            op: UnaryOp::Negate,
                            operand,
                        },
                    ))
                } else if t == "$" {
                    Ok(Expr::new(t, ExprKind::OldData))
                } else {
                    Err(TranslationError::syntax("error in expression", &t))
                }
            }
        }
    }

    /// An identifier atom: subscript, field access, call, or plain variable.
    fn parse_identifier_expr(&mut self, name: Token) -> Result<Expr> {
        let t2 = self.scanner.get_token()?;

        if t2 == "[" {
            let ty = self.var_type(&name)?;
            match ty.kind {
                TypeKind::Array { .. } => {
                    let indices = self.parse_index_list()?;
                    Ok(Expr::new(name, ExprKind::ArrayIndex { indices }))
                }
                TypeKind::Wave => {
                    let channel = Box::new(self.parse_term()?);
                    self.scanner.expect(",")?;
                    let index = Box::new(self.parse_term()?);
                    self.scanner.expect("]")?;
                    Ok(Expr::new(name, ExprKind::WaveSample { channel, index }))
                }
                _ => Err(TranslationError::syntax(
                    "'[' may appear only after array or wave variable",
                    &t2,
                )),
            }
        } else if t2 == "." {
            let field = self.scanner.get_token()?;
            if matches!(field.lexeme(), "n" | "m" | "r" | "max" | "interpolate") {
                Ok(Expr::new(name, ExprKind::WaveField { field }))
            } else {
                Err(TranslationError::syntax("expected wave field after '.'", &field))
            }
        } else if t2 == "(" {
            self.parse_call(name)
        } else {
            self.scanner.push_token(t2)?;
            Ok(Expr::new(name, ExprKind::Variable))
        }
    }

    /// A call form, opening paren consumed. The four pseudo-functions have
    /// fixed argument syntax and produce dedicated nodes.
    fn parse_call(&mut self, name: Token) -> Result<Expr> {
        if name == "sinewave" {
            let amplitude = Box::new(self.parse_term()?);
            self.scanner.expect(",")?;
            let frequency = Box::new(self.parse_term()?);
            self.scanner.expect(",")?;
            let phase = Box::new(self.parse_term()?);
            self.scanner.expect(")")?;
            let tag = self.program.next_node_id();
            return Ok(Expr::new(
                name,
                ExprKind::Sinewave {
                    tag,
                    amplitude,
                    frequency,
                    phase,
                },
            ));
        }

        if name == "sawtooth" {
            let frequency = Box::new(self.parse_term()?);
            self.scanner.expect(")")?;
            let tag = self.program.next_node_id();
            return Ok(Expr::new(name, ExprKind::Sawtooth { tag, frequency }));
        }

        if name == "fft" {
            let input = Box::new(self.parse_term()?);
            self.scanner.expect(",")?;
            let size = Box::new(self.parse_term()?);
            self.scanner.expect(",")?;
            let transfer = self.scanner.get_token()?;
            if transfer.kind() != TokenKind::Identifier {
                return Err(TranslationError::syntax(
                    "third parameter to 'fft' must be transfer function name",
                    &transfer,
                ));
            }
            self.scanner.expect(",")?;
            let freq_shift = Box::new(self.parse_term()?);
            self.scanner.expect(")")?;
            let tag = self.program.next_node_id();
            return Ok(Expr::new(
                name,
                ExprKind::Fft {
                    tag,
                    input,
                    size,
                    transfer,
                    freq_shift,
                },
            ));
        }

        if name == "iir" {
            self.scanner.expect("{")?;
            let mut x_coeffs = Vec::new();
            loop {
                x_coeffs.push(self.parse_term()?);
                let t = self.scanner.get_token()?;
                if t == "}" {
                    break;
                } else if t != "," {
                    return Err(TranslationError::syntax(
                        "expected ',' or '}' after x-coeff expression",
                        &t,
                    ));
                }
            }
            self.scanner.expect(",")?;
            self.scanner.expect("{")?;
            let mut y_coeffs = Vec::new();
            let t = self.scanner.get_token()?;
            if t != "}" {
                self.scanner.push_token(t)?;
                loop {
                    y_coeffs.push(self.parse_term()?);
                    let t = self.scanner.get_token()?;
                    if t == "}" {
                        break;
                    } else if t != "," {
                        return Err(TranslationError::syntax(
                            "expected ',' or '}' after y-coeff expression",
                            &t,
                        ));
                    }
                }
            }
            self.scanner.expect(",")?;
            let input = Box::new(self.parse_term()?);
            self.scanner.expect(")")?;
            let tag = self.program.next_node_id();
            return Ok(Expr::new(
                name,
                ExprKind::Iir {
                    tag,
                    x_coeffs,
                    y_coeffs,
                    input,
                },
            ));
        }

        // An ordinary call; intrinsics are resolved right here.
        let mut args = Vec::new();
        let mut t2 = self.scanner.get_token()?;
        while t2 != ")" {
            self.scanner.push_token(t2)?;
            args.push(self.parse_expression()?);

            t2 = self.scanner.get_token()?;
            if t2 != ")" {
                if t2 != "," {
                    return Err(TranslationError::syntax("expected ',' or ')'", &t2));
                }
                t2 = self.scanner.get_token()?;
            }
        }

        let (kind, target) = match find_intrinsic(name.lexeme()) {
            Some(entry) => {
                if args.len() != entry.num_params {
                    return Err(TranslationError::syntax(
                        "wrong number of parameters to intrinsic function",
                        &name,
                    ));
                }
                (CallKind::Intrinsic, entry.target_name.to_string())
            }
            None => (CallKind::User, name.lexeme().to_string()),
        };
        Ok(Expr::new(name, ExprKind::Call { kind, target, args }))
    }

    fn var_type(&self, name: &Token) -> Result<SonicType> {
        self.local_parms
            .iter()
            .chain(self.local_vars.iter())
            .find(|decl| decl.name == *name)
            .map(|decl| decl.ty.clone())
            .or_else(|| self.program.find_global(name).map(|decl| decl.ty.clone()))
            .ok_or_else(|| TranslationError::syntax("undefined symbol", name))
    }
}

fn positive_integer_constant(token: &Token) -> Option<i64> {
    if token.kind() != TokenKind::Constant {
        return None;
    }
    let lexeme = token.lexeme();
    if lexeme.contains(&['.', 'e', 'E'][..]) {
        return None;
    }
    match lexeme.parse::<i64>() {
        Ok(value) if value > 0 => Some(value),
        _ => None,
    }
}
