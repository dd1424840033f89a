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

//! Generation of the output C++ source file from a validated program.
//!
//! The emitted file is self-contained apart from the audio runtime
//! (`sonic.h`) and any import headers: constants, prototypes, globals, a
//! `main` that parses the command line, the program body, and every user
//! function. The code generator still detects a few errors that the parse
//! and validate phases cannot express, all of them about where the
//! loop-context symbols `i`, `t`, `c`, `n`, and `$` may appear.

mod expr;
mod wave;

#[cfg(test)]
mod expect_tests;

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;

use crate::ast::{Function, Lvalue, LvalueTarget, NodeId, Program, Stmt, VarDecl};
use crate::error::{Result, TranslationError};
use crate::types::{ElemType, TypeKind};
use crate::{RELEASE_DATE, VERSION};

const SPACES_PER_INDENT: usize = 4;
const LOCAL_PREFIX: &str = "v_";
const FUNCTION_PREFIX: &str = "f_";
const TEMPORARY_PREFIX: &str = "t_";
const IMPORT_PREFIX: &str = "i_";

/// Writes the translation of `program` into `out`.
pub fn generate(program: &Program, out: &mut dyn Write) -> Result<()> {
    let body = program.body.as_ref().ok_or_else(|| {
        TranslationError::internal("no program body defined at code generation", None)
    })?;
    CodeGen::new(program).gen_file(out, body)
}

/// Creates `<program>.cpp` in the current directory and writes the
/// translation into it. The file is removed again on any failure so that
/// no partial translation survives.
pub fn generate_file(program: &Program) -> Result<String> {
    let body = program.body.as_ref().ok_or_else(|| {
        TranslationError::internal("no program body defined at code generation", None)
    })?;
    let filename = format!("{}.cpp", body.name.lexeme());

    let mut file = File::create(&filename)?;
    let mut result = generate(program, &mut file);
    if result.is_ok() {
        result = file.flush().map_err(Into::into);
    }
    drop(file);
    if result.is_err() {
        let _ = std::fs::remove_file(&filename);
    }
    result?;

    log::debug!("generated '{}'", filename);
    Ok(filename)
}

/// Per-statement temporaries of one `iir` construct.
#[derive(Debug, Clone, Default)]
struct IirTemps {
    x_coeff: u32,
    y_coeff: u32,
    x_index: u32,
    y_index: u32,
    x_buffer: Vec<u32>,
    y_buffer: Vec<u32>,
    accum: u32,
}

/// The mutable state threaded through code generation. The boolean gates
/// mirror rules the type system cannot express: `i`/`t` and `c` are only
/// meaningful inside a wave assignment's sample and channel loops, and a
/// bare `n` only inside a wave subscript.
struct CodeGen<'a> {
    program: &'a Program,
    func: Option<&'a Function>,
    indent_level: usize,
    i_allowed: bool,
    c_allowed: bool,
    next_temp_tag: u32,
    inside_function_parms: bool,
    generating_comment: bool,
    /// The wave whose subscript is being emitted; gives a bare `n` its
    /// meaning.
    bracketer: Option<String>,
    /// The channel whose `sample[c]` line is being emitted.
    channel_value: Option<usize>,
    inside_vector: bool,
    osc_temps: HashMap<NodeId, Vec<u32>>,
    fft_temps: HashMap<NodeId, u32>,
    iir_temps: HashMap<NodeId, IirTemps>,
}

impl<'a> CodeGen<'a> {
    fn new(program: &'a Program) -> Self {
        CodeGen {
            program,
            func: None,
            indent_level: 0,
            i_allowed: false,
            c_allowed: false,
            next_temp_tag: 0,
            inside_function_parms: false,
            generating_comment: false,
            bracketer: None,
            channel_value: None,
            inside_vector: false,
            osc_temps: HashMap::new(),
            fft_temps: HashMap::new(),
            iir_temps: HashMap::new(),
        }
    }

    fn next_temp(&mut self) -> u32 {
        let tag = self.next_temp_tag;
        self.next_temp_tag += 1;
        tag
    }

    fn indent(&self, o: &mut dyn Write, text: &str) -> Result<()> {
        for _ in 0..self.indent_level {
            write!(o, " ")?;
        }
        write!(o, "{}", text)?;
        Ok(())
    }

    fn push_indent(&mut self) {
        self.indent_level += SPACES_PER_INDENT;
    }

    fn pop_indent(&mut self) {
        self.indent_level -= SPACES_PER_INDENT;
    }

    // ---- file shape --------------------------------------------------

    fn gen_file(&mut self, o: &mut dyn Write, body: &'a Function) -> Result<()> {
        let filename = format!("{}.cpp", body.name.lexeme());

        writeln!(
            o,
            "// {}  -  generated by the Sonic translator v {}, released {}.",
            filename, VERSION, RELEASE_DATE
        )?;
        writeln!(o, "// Do not edit; changes will be lost on retranslation.")?;
        writeln!(o)?;
        writeln!(o, "// Standard includes...")?;
        writeln!(o, "#include <stdio.h>")?;
        writeln!(o, "#include <iostream.h>")?;
        writeln!(o, "#include <stdlib.h>")?;
        writeln!(o, "#include <string.h>")?;
        writeln!(o, "#include <math.h>")?;
        writeln!(o)?;
        writeln!(o, "// Sonic-specific includes...")?;
        writeln!(o, "#include \"sonic.h\"")?;
        self.gen_import_includes(o)?;
        writeln!(o)?;
        writeln!(o)?;
        writeln!(
            o,
            "const long    SamplingRate     =  {};",
            self.program.sampling_rate
        )?;
        writeln!(
            o,
            "const double  SampleTime       =  1.0 / double(SamplingRate);"
        )?;
        writeln!(
            o,
            "const int     NumChannels      =  {};",
            self.program.num_channels
        )?;
        writeln!(
            o,
            "const int     InterpolateFlag  =  {};",
            if self.program.interpolate { 1 } else { 0 }
        )?;
        writeln!(o)?;
        writeln!(o, "const double pi = 4.0 * atan(1.0);")?;
        writeln!(o, "const double e  = exp(1.0);")?;
        writeln!(o)?;

        self.gen_prototypes(o, body)?;
        self.gen_global_variables(o)?;
        self.gen_main(o, body)?;
        self.gen_function(o, body)?;
        for func in &self.program.functions {
            self.gen_function(o, func)?;
        }

        writeln!(o)?;
        writeln!(o)?;
        writeln!(o, "/*---  end of file {}  ---*/", filename)?;
        Ok(())
    }

    /// Each distinct import header is included exactly once.
    fn gen_import_includes(&self, o: &mut dyn Write) -> Result<()> {
        let mut seen: Vec<&str> = Vec::new();
        for import in &self.program.imports {
            let header = import.header.lexeme();
            if !seen.contains(&header) {
                seen.push(header);
                writeln!(o, "#include \"{}\"", header)?;
            }
        }
        Ok(())
    }

    fn gen_prototypes(&mut self, o: &mut dyn Write, body: &Function) -> Result<()> {
        self.gen_prototype(o, body)?;
        writeln!(o, ";")?;
        writeln!(o)?;
        for func in &self.program.functions {
            self.gen_prototype(o, func)?;
            writeln!(o, ";")?;
            writeln!(o)?;
        }
        Ok(())
    }

    fn gen_global_variables(&mut self, o: &mut dyn Write) -> Result<()> {
        if self.program.globals.is_empty() {
            return Ok(());
        }
        writeln!(o, "// global variables...")?;
        writeln!(o)?;
        for decl in &self.program.globals {
            self.gen_var_decl(o, decl)?;
            writeln!(o, ";")?;
        }
        writeln!(o)?;
        Ok(())
    }

    fn gen_main(&mut self, o: &mut dyn Write, body: &Function) -> Result<()> {
        writeln!(o)?;
        writeln!(o, "int main ( int argc, char *argv[] )")?;
        writeln!(o, "{{")?;
        self.push_indent();

        writeln!(o, "    if ( argc != {} )", 1 + body.params.len())?;
        writeln!(o, "    {{")?;
        write!(o, "        cerr << \"Use:  {}", body.name)?;
        for parm in &body.params {
            write!(o, " {}", parm.name)?;
        }
        writeln!(o, "\" << endl << endl;")?;
        writeln!(o, "        return 1;")?;
        writeln!(o, "    }}")?;
        writeln!(o)?;

        // Extract the program arguments from argv...
        for (index, parm) in body.params.iter().enumerate() {
            let argc = index + 1;
            let name = parm.name.lexeme();
            self.indent(o, "")?;
            match parm.ty.kind {
                TypeKind::Integer => writeln!(
                    o,
                    "long {}{} = scan_integer ( \"{}\", argv[{}] );",
                    LOCAL_PREFIX, name, name, argc
                )?,
                TypeKind::Real => writeln!(
                    o,
                    "double {}{} = scan_real ( \"{}\", argv[{}] );",
                    LOCAL_PREFIX, name, name, argc
                )?,
                TypeKind::Boolean => writeln!(
                    o,
                    "int {}{} = scan_boolean ( \"{}\", argv[{}] );",
                    LOCAL_PREFIX, name, name, argc
                )?,
                TypeKind::Wave => writeln!(
                    o,
                    "SampleWave {}{} ( argv[{}], \"{}\", SamplingRate, NumChannels );",
                    LOCAL_PREFIX, name, argc, name
                )?,
                TypeKind::Import(_) => {
                    return Err(TranslationError::semantic(
                        "cannot pass import type to program",
                        &parm.name,
                    ))
                }
                _ => {
                    return Err(TranslationError::semantic(
                        "program parameters must be integer, real, boolean, or wave",
                        &parm.name,
                    ))
                }
            }
        }

        // Call the program function...
        self.indent(o, FUNCTION_PREFIX)?;
        if body.params.is_empty() {
            writeln!(o, "{} ();", body.name)?;
        } else {
            write!(o, "{} ( ", body.name)?;
            for (index, parm) in body.params.iter().enumerate() {
                write!(o, "{}{}", LOCAL_PREFIX, parm.name)?;
                if index + 1 < body.params.len() {
                    write!(o, ", ")?;
                }
            }
            writeln!(o, " );")?;
        }
        writeln!(o)?;

        // Commit every wave argument to its permanent WAV file...
        for (index, parm) in body.params.iter().enumerate() {
            if parm.ty == TypeKind::Wave {
                writeln!(
                    o,
                    "    {}{}.convert_to_wav ( argv[{}] );",
                    LOCAL_PREFIX,
                    parm.name,
                    index + 1
                )?;
            }
        }

        writeln!(o, "    erase_all_temp_files();")?;
        writeln!(o, "    return 0;")?;
        self.pop_indent();
        writeln!(o, "}}")?;
        writeln!(o)?;
        Ok(())
    }

    // ---- declarations ------------------------------------------------

    fn gen_prototype(&mut self, o: &mut dyn Write, func: &Function) -> Result<()> {
        match func.return_type.kind {
            TypeKind::Void => write!(o, "void ")?,
            TypeKind::Integer => write!(o, "long ")?,
            TypeKind::Real => write!(o, "double ")?,
            TypeKind::Boolean => write!(o, "int ")?,
            TypeKind::Wave => {
                return Err(TranslationError::semantic(
                    "function not allowed to return wave type",
                    &func.name,
                ))
            }
            TypeKind::Import(_) | TypeKind::Array { .. } => {
                return Err(TranslationError::semantic(
                    "function may return only integer, real, or boolean",
                    &func.name,
                ))
            }
            _ => {
                return Err(TranslationError::internal(
                    "function return type survived validation undefined",
                    Some(&func.name),
                ))
            }
        }

        write!(o, "{}{} (", FUNCTION_PREFIX, func.name)?;
        if !func.params.is_empty() {
            writeln!(o)?;
            self.push_indent();
            self.inside_function_parms = true;
            for (index, parm) in func.params.iter().enumerate() {
                self.indent(o, "")?;
                self.gen_var_decl(o, parm)?;
                if index + 1 < func.params.len() {
                    writeln!(o, ",")?;
                }
            }
            self.inside_function_parms = false;
            self.pop_indent();
        }
        write!(o, " )")?;
        Ok(())
    }

    fn gen_function(&mut self, o: &mut dyn Write, func: &'a Function) -> Result<()> {
        let saved = self.func.take();
        self.func = Some(func);

        writeln!(o)?;
        self.gen_prototype(o, func)?;
        writeln!(o)?;
        writeln!(o, "{{")?;
        self.push_indent();

        if !func.locals.is_empty() {
            for decl in &func.locals {
                self.indent(o, "")?;
                self.gen_var_decl(o, decl)?;
                writeln!(o, ";")?;
            }
            writeln!(o)?;
        }

        for (index, stmt) in func.body.iter().enumerate() {
            self.gen_stmt(o, stmt, index + 1 < func.body.len())?;
        }

        self.pop_indent();
        writeln!(o, "}}")?;
        writeln!(o)?;

        self.func = saved;
        Ok(())
    }

    fn gen_var_decl(&mut self, o: &mut dyn Write, decl: &VarDecl) -> Result<()> {
        let array_dims: Option<&[i64]> = match &decl.ty.kind {
            TypeKind::Void => {
                return Err(TranslationError::internal(
                    "symbol with type 'void'",
                    Some(&decl.name),
                ))
            }
            TypeKind::Integer => {
                write!(o, "long ")?;
                None
            }
            TypeKind::Real => {
                write!(o, "double ")?;
                None
            }
            TypeKind::Boolean => {
                write!(o, "int ")?;
                None
            }
            TypeKind::Wave => {
                write!(o, "SampleWave ")?;
                if self.inside_function_parms {
                    write!(o, "&")?;
                }
                None
            }
            TypeKind::Import(import_name) => {
                write!(o, "{}{} ", IMPORT_PREFIX, import_name)?;
                if self.inside_function_parms {
                    write!(o, "&")?;
                }
                None
            }
            TypeKind::Array { element, dims } => {
                write!(o, "{} ", element_keyword(*element))?;
                Some(dims)
            }
            TypeKind::Str | TypeKind::Vector | TypeKind::Undefined => {
                return Err(TranslationError::internal(
                    "symbol with non-denotable type",
                    Some(&decl.name),
                ))
            }
        };

        if decl.ty.by_ref {
            if !self.inside_function_parms {
                return Err(TranslationError::internal(
                    "found reference type outside of function parms",
                    Some(&decl.name),
                ));
            }
            write!(o, "&")?;
        }

        write!(o, "{}{}", LOCAL_PREFIX, decl.name)?;

        if let Some(dims) = array_dims {
            for dim in dims {
                if *dim == 0 {
                    write!(o, "[]")?;
                } else {
                    write!(o, "[{}]", dim)?;
                }
            }
        }

        if !decl.init.is_empty() {
            if self.inside_function_parms {
                return Err(TranslationError::internal(
                    "function parameter has initializer",
                    Some(&decl.name),
                ));
            }
            match &decl.ty.kind {
                TypeKind::Wave => {
                    return Err(TranslationError::semantic(
                        "wave variable cannot have initializer",
                        &decl.name,
                    ))
                }
                TypeKind::Import(_) => {
                    write!(o, " ( ")?;
                    for (index, arg) in decl.init.iter().enumerate() {
                        self.gen_expr(o, arg)?;
                        if index + 1 < decl.init.len() {
                            write!(o, ", ")?;
                        }
                    }
                    write!(o, " )")?;
                }
                _ => {
                    if decl.init.len() > 1 {
                        return Err(TranslationError::semantic(
                            "this variable must not have multiple initializer expressions",
                            &decl.name,
                        ));
                    }
                    write!(o, " = ")?;
                    let cast =
                        decl.ty == TypeKind::Integer && decl.init[0].ty == TypeKind::Real;
                    if cast {
                        write!(o, "long(")?;
                    }
                    self.gen_expr(o, &decl.init[0])?;
                    if cast {
                        write!(o, ")")?;
                    }
                }
            }
        } else if !self.inside_function_parms {
            match decl.ty.kind {
                TypeKind::Integer | TypeKind::Real | TypeKind::Boolean => {
                    write!(o, " = 0")?;
                }
                TypeKind::Wave => {
                    write!(
                        o,
                        " ( \"\", \"{}\", SamplingRate, NumChannels )",
                        decl.name
                    )?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ---- statements --------------------------------------------------

    fn gen_stmt(&mut self, o: &mut dyn Write, stmt: &Stmt, has_next: bool) -> Result<()> {
        match stmt {
            Stmt::Compound(body) => {
                if body.is_empty() {
                    self.indent(o, ";\n")?;
                } else if body.len() == 1 {
                    self.gen_stmt(o, &body[0], false)?;
                } else {
                    self.indent(o, "{\n")?;
                    self.push_indent();
                    for (index, inner) in body.iter().enumerate() {
                        self.gen_stmt(o, inner, index + 1 < body.len())?;
                    }
                    self.pop_indent();
                    self.indent(o, "}\n")?;
                }
                Ok(())
            }
            Stmt::Call(expr) => {
                self.indent(o, "")?;
                self.gen_expr(o, expr)?;
                writeln!(o, ";")?;
                if has_next {
                    writeln!(o)?;
                }
                Ok(())
            }
            Stmt::If {
                condition,
                then_part,
                else_part,
            } => {
                self.indent(o, "if ( ")?;
                self.gen_expr(o, condition)?;
                writeln!(o, " )")?;
                self.gen_nested_stmt(o, then_part)?;
                if let Some(else_part) = else_part {
                    self.indent(o, "else\n")?;
                    self.gen_nested_stmt(o, else_part)?;
                }
                if has_next {
                    writeln!(o)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.indent(o, "while ( ")?;
                self.gen_expr(o, condition)?;
                writeln!(o, " )")?;
                self.gen_nested_stmt(o, body)?;
                if has_next {
                    writeln!(o)?;
                }
                Ok(())
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                self.indent(o, "for ( ")?;
                self.gen_stmt_inline(o, init)?;
                write!(o, "; ")?;
                self.gen_expr(o, condition)?;
                write!(o, "; ")?;
                self.gen_stmt_inline(o, update)?;
                writeln!(o, " )")?;
                self.gen_nested_stmt(o, body)?;
                if has_next {
                    writeln!(o)?;
                }
                Ok(())
            }
            Stmt::Repeat { count, body } => {
                let counter = format!("{}{}", TEMPORARY_PREFIX, self.next_temp());
                self.indent(o, "for ( long ")?;
                write!(o, "{} = long(", counter)?;
                self.gen_expr(o, count)?;
                writeln!(o, "); {} > 0; --{} )", counter, counter)?;
                self.gen_nested_stmt(o, body)?;
                if has_next {
                    writeln!(o)?;
                }
                Ok(())
            }
            Stmt::Return { value, .. } => {
                self.indent(o, "return")?;
                if let Some(value) = value {
                    write!(o, " ")?;
                    self.gen_expr(o, value)?;
                }
                writeln!(o, ";")?;
                Ok(())
            }
            Stmt::Assign { op, lvalue, rvalue } => {
                if lvalue.is_wave() {
                    self.gen_wave_assignment(o, op, lvalue, rvalue)?;
                } else {
                    self.gen_scalar_assignment(o, op.lexeme(), lvalue, rvalue)?;
                }
                if has_next {
                    writeln!(o)?;
                }
                Ok(())
            }
        }
    }

    /// Emits the body of an `if` or loop, indenting single statements and
    /// leaving brace-emitting statements at the current level.
    fn gen_nested_stmt(&mut self, o: &mut dyn Write, stmt: &Stmt) -> Result<()> {
        let braces = stmt.needs_braces();
        if !braces {
            self.push_indent();
        }
        self.gen_stmt(o, stmt, false)?;
        if !braces {
            self.pop_indent();
        }
        Ok(())
    }

    fn gen_scalar_assignment(
        &mut self,
        o: &mut dyn Write,
        op: &str,
        lvalue: &Lvalue,
        rvalue: &crate::ast::Expr,
    ) -> Result<()> {
        self.indent(o, LOCAL_PREFIX)?;
        write!(o, "{}", lvalue.name)?;
        if let LvalueTarget::Array { indices } = &lvalue.target {
            self.gen_array_subscripts(o, indices)?;
        }
        write!(o, " {} ", op)?;
        self.gen_expr(o, rvalue)?;
        writeln!(o, ";")?;
        Ok(())
    }

    /// An assignment or call rendered without indentation or terminator,
    /// for the heading of a `for` loop.
    fn gen_stmt_inline(&mut self, o: &mut dyn Write, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Compound(body) if body.is_empty() => Ok(()),
            Stmt::Compound(body) if body.len() == 1 => self.gen_stmt_inline(o, &body[0]),
            Stmt::Call(expr) => self.gen_expr(o, expr),
            Stmt::Assign { op, lvalue, rvalue } => {
                if lvalue.is_wave() {
                    return Err(TranslationError::semantic(
                        "wave assignment cannot appear in a 'for' heading",
                        &lvalue.name,
                    ));
                }
                write!(o, "{}{}", LOCAL_PREFIX, lvalue.name)?;
                if let LvalueTarget::Array { indices } = &lvalue.target {
                    self.gen_array_subscripts(o, indices)?;
                }
                write!(o, " {} ", op.lexeme())?;
                self.gen_expr(o, rvalue)
            }
            _ => Err(TranslationError::semantic_nowhere(
                "only assignments and calls may appear in a 'for' heading",
            )),
        }
    }

    fn gen_array_subscripts(
        &mut self,
        o: &mut dyn Write,
        indices: &[crate::ast::Expr],
    ) -> Result<()> {
        for index in indices {
            write!(o, "[")?;
            let cast = index.ty == TypeKind::Real;
            if cast {
                write!(o, "long(")?;
            }
            self.gen_expr(o, index)?;
            if cast {
                write!(o, ")")?;
            }
            write!(o, "]")?;
        }
        Ok(())
    }
}

fn element_keyword(element: ElemType) -> &'static str {
    match element {
        ElemType::Integer => "long",
        ElemType::Real => "double",
        ElemType::Boolean => "int",
    }
}
