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

//! Post-parse validation of a Sonic program.
//!
//! Resolves every name, enforces the type rules, and decorates each
//! expression with its inferred type. Deliberately a side effect of this
//! pass: one function may call another that is defined later in the source
//! without any forward declaration mechanism in the language, because call
//! types are resolved against a snapshot of every function signature taken
//! before the tree walk begins.

use crate::ast::{
    CallKind, Expr, ExprKind, Function, Lvalue, LvalueTarget, Program, Stmt, UnaryOp, VarDecl,
};
use crate::error::{Result, TranslationError};
use crate::token::Token;
use crate::types::{ElemType, SonicType, TypeKind};

/// Validates the whole program: the program body first, then each
/// function, then the global variables. Validation is idempotent.
pub fn validate(program: &mut Program) -> Result<()> {
    if program.body.is_none() {
        return Err(TranslationError::semantic_nowhere(
            "code contains no program body",
        ));
    }

    let sigs = Signatures::collect(program);
    let validator = Validator { sigs: &sigs };

    if let Some(body) = program.body.as_mut() {
        validator.validate_function(body)?;
    }
    for func in &mut program.functions {
        validator.validate_function(func)?;
    }

    let global_names: Vec<Token> = program.globals.iter().map(|d| d.name.clone()).collect();
    for name in &global_names {
        let instances = global_names.iter().filter(|n| *n == name).count();
        if instances > 1 {
            return Err(TranslationError::semantic(
                "global variable declared more than once",
                name,
            ));
        }
    }
    let global_scope = Scope::empty();
    for decl in &mut program.globals {
        validator.validate_var_decl(decl, &global_scope)?;
    }

    log::debug!("validated program '{}'", sigs.program_name);
    Ok(())
}

/// A lightweight snapshot of everything callable or referable at program
/// scope, so the tree can be mutated while signatures are consulted.
struct Signatures {
    program_name: String,
    functions: Vec<FuncSig>,
    body: FuncSig,
    imports: Vec<String>,
    globals: Vec<(String, SonicType)>,
    num_channels: i64,
}

struct FuncSig {
    name: String,
    return_type: SonicType,
    params: Vec<SonicType>,
}

impl FuncSig {
    fn of(func: &Function) -> Self {
        FuncSig {
            name: func.name.lexeme().to_string(),
            return_type: func.return_type.clone(),
            params: func.params.iter().map(|p| p.ty.clone()).collect(),
        }
    }
}

impl Signatures {
    fn collect(program: &Program) -> Self {
        let body = program
            .body
            .as_ref()
            .map(FuncSig::of)
            .unwrap_or_else(|| FuncSig {
                name: String::new(),
                return_type: SonicType::new(TypeKind::Void),
                params: Vec::new(),
            });
        Signatures {
            program_name: body.name.clone(),
            functions: program.functions.iter().map(FuncSig::of).collect(),
            body,
            imports: program
                .imports
                .iter()
                .map(|import| import.name.lexeme().to_string())
                .collect(),
            globals: program
                .globals
                .iter()
                .map(|decl| (decl.name.lexeme().to_string(), decl.ty.clone()))
                .collect(),
            num_channels: program.num_channels,
        }
    }

    fn find_function(&self, name: &str) -> Option<&FuncSig> {
        self.functions
            .iter()
            .find(|sig| sig.name == name)
            .or_else(|| {
                if self.body.name == name {
                    Some(&self.body)
                } else {
                    None
                }
            })
    }

    fn find_global(&self, name: &str) -> Option<&SonicType> {
        self.globals
            .iter()
            .find(|(global, _)| global == name)
            .map(|(_, ty)| ty)
    }
}

/// The symbols visible inside one function: its parameters, then its
/// locals. Globals are consulted through the signature snapshot.
struct Scope {
    symbols: Vec<(String, SonicType)>,
}

impl Scope {
    fn empty() -> Self {
        Scope {
            symbols: Vec::new(),
        }
    }

    fn of(func: &Function) -> Self {
        Scope {
            symbols: func
                .params
                .iter()
                .chain(func.locals.iter())
                .map(|decl| (decl.name.lexeme().to_string(), decl.ty.clone()))
                .collect(),
        }
    }

    fn find(&self, name: &str) -> Option<&SonicType> {
        self.symbols
            .iter()
            .find(|(symbol, _)| symbol == name)
            .map(|(_, ty)| ty)
    }
}

struct Validator<'a> {
    sigs: &'a Signatures,
}

impl<'a> Validator<'a> {
    fn validate_function(&self, func: &mut Function) -> Result<()> {
        if !func.is_program_body && func.name.lexeme() == self.sigs.program_name {
            return Err(TranslationError::semantic(
                "function name conflicts with program name",
                &func.name,
            ));
        }
        let same_name = self
            .sigs
            .functions
            .iter()
            .filter(|sig| sig.name == func.name.lexeme())
            .count();
        if same_name > 1 {
            return Err(TranslationError::semantic(
                "function name already defined",
                &func.name,
            ));
        }

        let scope = Scope::of(func);
        for decl in func.params.iter().chain(func.locals.iter()) {
            self.validate_unique_symbol(&decl.name, &scope)?;
        }

        let return_type = func.return_type.clone();
        for decl in &mut func.locals {
            self.validate_var_decl(decl, &scope)?;
        }
        for stmt in &mut func.body {
            self.validate_stmt(stmt, &scope, &return_type)?;
        }
        Ok(())
    }

    /// A declared name must occur exactly once across the union of
    /// globals, imports, functions, the program body, and the enclosing
    /// function's parameters and locals.
    fn validate_unique_symbol(&self, name: &Token, scope: &Scope) -> Result<()> {
        let lexeme = name.lexeme();
        let mut found = scope
            .symbols
            .iter()
            .filter(|(symbol, _)| symbol == lexeme)
            .count();
        found += self
            .sigs
            .globals
            .iter()
            .filter(|(global, _)| global == lexeme)
            .count();
        found += self
            .sigs
            .functions
            .iter()
            .filter(|sig| sig.name == lexeme)
            .count();
        found += self
            .sigs
            .imports
            .iter()
            .filter(|import| *import == lexeme)
            .count();
        if self.sigs.program_name == lexeme {
            found += 1;
        }

        if found == 0 {
            Err(TranslationError::semantic("symbol not defined", name))
        } else if found > 1 {
            Err(TranslationError::semantic(
                "symbol defined more than once",
                name,
            ))
        } else {
            Ok(())
        }
    }

    fn validate_var_decl(&self, decl: &mut VarDecl, scope: &Scope) -> Result<()> {
        if decl.init.is_empty() {
            return Ok(());
        }
        if decl.ty == TypeKind::Wave {
            return Err(TranslationError::semantic(
                "wave variable cannot have initializer",
                &decl.name,
            ));
        }

        // Multiple expressions occur in initializers only for import
        // types, where they become constructor arguments and are not
        // checked further.
        for init in &mut decl.init {
            self.validate_expr(init, scope)?;
        }
        if !matches!(decl.ty.kind, TypeKind::Import(_)) {
            if decl.init.len() > 1 {
                return Err(TranslationError::semantic(
                    "this variable must not have multiple initializer expressions",
                    &decl.name,
                ));
            }
            if !decl.init[0].ty.can_convert_to(&decl.ty) {
                return Err(TranslationError::semantic(
                    "cannot convert initializer expression to variable type",
                    &decl.init[0].first,
                ));
            }
        }
        Ok(())
    }

    fn validate_stmt(&self, stmt: &mut Stmt, scope: &Scope, return_type: &SonicType) -> Result<()> {
        match stmt {
            Stmt::Compound(body) => {
                for inner in body {
                    self.validate_stmt(inner, scope, return_type)?;
                }
                Ok(())
            }
            Stmt::Call(expr) => self.validate_expr(expr, scope),
            Stmt::If {
                condition,
                then_part,
                else_part,
            } => {
                self.validate_expr(condition, scope)?;
                if condition.ty != TypeKind::Boolean {
                    return Err(TranslationError::semantic(
                        "argument to 'if' must be boolean type",
                        &condition.first,
                    ));
                }
                self.validate_stmt(then_part, scope, return_type)?;
                if let Some(else_part) = else_part {
                    self.validate_stmt(else_part, scope, return_type)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.validate_expr(condition, scope)?;
                self.validate_stmt(body, scope, return_type)?;
                if condition.ty != TypeKind::Boolean {
                    return Err(TranslationError::semantic(
                        "argument to 'while' must be boolean type",
                        &condition.first,
                    ));
                }
                Ok(())
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                self.validate_stmt(init, scope, return_type)?;
                self.validate_expr(condition, scope)?;
                if condition.ty != TypeKind::Boolean {
                    return Err(TranslationError::semantic(
                        "argument to 'for' must be boolean type",
                        &condition.first,
                    ));
                }
                self.validate_stmt(update, scope, return_type)?;
                self.validate_stmt(body, scope, return_type)
            }
            Stmt::Repeat { count, body } => {
                self.validate_expr(count, scope)?;
                self.validate_stmt(body, scope, return_type)?;
                if !count.ty.can_convert_to(&SonicType::new(TypeKind::Integer)) {
                    return Err(TranslationError::semantic(
                        "cannot convert 'repeat' argument to integer type",
                        &count.first,
                    ));
                }
                Ok(())
            }
            Stmt::Return { token, value } => match value {
                Some(value) => {
                    self.validate_expr(value, scope)?;
                    if !value.ty.can_convert_to(return_type) {
                        return Err(TranslationError::semantic(
                            "cannot convert return value to return type",
                            &value.first,
                        ));
                    }
                    Ok(())
                }
                None => {
                    if *return_type != TypeKind::Void {
                        return Err(TranslationError::semantic(
                            "this function must return a value",
                            token,
                        ));
                    }
                    Ok(())
                }
            },
            Stmt::Assign { op, lvalue, rvalue } => {
                let ltype = self.validate_lvalue(lvalue, scope)?;
                self.validate_expr(rvalue, scope)?;

                if !rvalue.ty.can_convert_to(&ltype) {
                    return Err(TranslationError::semantic(
                        "cannot convert expression to type on left side of '='",
                        &rvalue.first,
                    ));
                }
                if ltype == TypeKind::Boolean && *op != "=" {
                    return Err(TranslationError::semantic(
                        "assignment operator not allowed for boolean on left",
                        op,
                    ));
                }
                if *op == "<<" {
                    if !lvalue.is_wave() {
                        return Err(TranslationError::semantic(
                            "append operator '<<' is allowed only in wave assignments",
                            op,
                        ));
                    }
                    if rvalue.references_old_data() {
                        return Err(TranslationError::semantic(
                            "cannot use append operator when '$' appears on right side",
                            op,
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    /// Checks the l-value and returns the type an r-value must convert to.
    /// A wave l-value accepts a channel tuple, hence `vector`.
    fn validate_lvalue(&self, lvalue: &mut Lvalue, scope: &Scope) -> Result<SonicType> {
        let var_type = self.lookup_var(&lvalue.name, scope)?;
        match &mut lvalue.target {
            LvalueTarget::Scalar => Ok(var_type),
            LvalueTarget::Wave { limit } => {
                if var_type != TypeKind::Wave {
                    return Err(TranslationError::semantic(
                        "subscript '[c,i]' allowed only on variable of wave type",
                        &lvalue.name,
                    ));
                }
                if let Some(limit) = limit {
                    self.validate_expr(limit, scope)?;
                    if !limit.ty.is_numeric() {
                        return Err(TranslationError::semantic(
                            "sample limit expression must have numeric type",
                            &limit.first,
                        ));
                    }
                }
                Ok(SonicType::new(TypeKind::Vector))
            }
            LvalueTarget::Array { indices } => match var_type.kind.clone() {
                TypeKind::Array { element, dims } => {
                    self.validate_indices(indices, &dims, &lvalue.name, scope)?;
                    Ok(element_type(element))
                }
                _ => Err(TranslationError::internal(
                    "array l-value names a variable that is not an array",
                    Some(&lvalue.name),
                )),
            },
        }
    }

    fn validate_indices(
        &self,
        indices: &mut [Expr],
        dims: &[i64],
        name: &Token,
        scope: &Scope,
    ) -> Result<()> {
        if indices.len() != dims.len() {
            return Err(TranslationError::semantic(
                "wrong number of array subscripts",
                name,
            ));
        }
        for index in indices {
            self.validate_expr(index, scope)?;
            if !index.ty.can_convert_to(&SonicType::new(TypeKind::Integer)) {
                return Err(TranslationError::semantic(
                    "array subscript must have numeric type",
                    &index.first,
                ));
            }
        }
        Ok(())
    }

    fn validate_expr(&self, expr: &mut Expr, scope: &Scope) -> Result<()> {
        let first = expr.first.clone();
        let ty = match &mut expr.kind {
            ExprKind::Constant => expr.ty.clone(),
            ExprKind::OldData => SonicType::new(TypeKind::Real),
            ExprKind::Variable => self.lookup_var(&first, scope)?,
            ExprKind::Builtin => builtin_type(&first)?,
            ExprKind::Vector { components } => {
                let num_channels = self.sigs.num_channels as usize;
                for component in components.iter_mut() {
                    self.validate_expr(component, scope)?;
                    if !component.ty.is_numeric() {
                        return Err(TranslationError::semantic(
                            "vector component expression must have numeric type",
                            &component.first,
                        ));
                    }
                }
                if components.len() > num_channels {
                    return Err(TranslationError::semantic(
                        "too many vector components",
                        &components[num_channels].first,
                    ));
                }
                if components.len() < num_channels {
                    return Err(TranslationError::semantic(
                        "too few vector components",
                        &first,
                    ));
                }
                SonicType::new(TypeKind::Vector)
            }
            ExprKind::WaveSample { channel, index } => {
                let wave_type = self.lookup_var(&first, scope)?;
                if wave_type != TypeKind::Wave {
                    return Err(TranslationError::semantic(
                        "subscript '[c,i]' allowed only on variable of wave type",
                        &first,
                    ));
                }
                self.validate_expr(channel, scope)?;
                if !channel.ty.can_convert_to(&SonicType::new(TypeKind::Integer)) {
                    return Err(TranslationError::semantic(
                        "channel term must be of numeric type",
                        &channel.first,
                    ));
                }
                self.validate_expr(index, scope)?;
                if !index.ty.can_convert_to(&SonicType::new(TypeKind::Real)) {
                    return Err(TranslationError::semantic(
                        "index term must be of numeric type",
                        &index.first,
                    ));
                }
                SonicType::new(TypeKind::Real)
            }
            ExprKind::WaveField { field } => {
                let wave_type = self.lookup_var(&first, scope)?;
                if wave_type != TypeKind::Wave {
                    return Err(TranslationError::semantic(
                        "field access allowed only on variable of wave type",
                        &first,
                    ));
                }
                match field.lexeme() {
                    "r" | "m" | "n" => SonicType::new(TypeKind::Integer),
                    "max" => SonicType::new(TypeKind::Real),
                    "interpolate" => SonicType::new(TypeKind::Boolean),
                    _ => {
                        return Err(TranslationError::semantic("unknown wave field", field));
                    }
                }
            }
            ExprKind::ArrayIndex { indices } => {
                let var_type = self.lookup_var(&first, scope)?;
                match var_type.kind.clone() {
                    TypeKind::Array { element, dims } => {
                        self.validate_indices(indices, &dims, &first, scope)?;
                        element_type(element)
                    }
                    _ => {
                        return Err(TranslationError::semantic(
                            "subscript allowed only on array or wave variable",
                            &first,
                        ))
                    }
                }
            }
            ExprKind::Call { kind, args, .. } => match kind {
                CallKind::Intrinsic => {
                    // All intrinsic functions accept real parameters; the
                    // argument count was checked at parse time.
                    for arg in args.iter_mut() {
                        self.validate_expr(arg, scope)?;
                        if !arg.ty.can_convert_to(&SonicType::new(TypeKind::Real)) {
                            return Err(TranslationError::semantic(
                                "cannot convert intrinsic function parameter to type 'real'",
                                &arg.first,
                            ));
                        }
                    }
                    SonicType::new(TypeKind::Real)
                }
                CallKind::User | CallKind::Import => {
                    if let Some(var_type) = self.try_lookup_var(&first, scope) {
                        // A call through a variable: legal only for import
                        // function objects, which take anything and return
                        // real. Their real signature is trusted, so errors
                        // surface when the generated C++ is compiled.
                        if !matches!(var_type.kind, TypeKind::Import(_)) {
                            return Err(TranslationError::semantic(
                                "this variable is not an import function",
                                &first,
                            ));
                        }
                        *kind = CallKind::Import;
                        for arg in args.iter_mut() {
                            self.validate_expr(arg, scope)?;
                        }
                        SonicType::new(TypeKind::Real)
                    } else {
                        let sig = self
                            .sigs
                            .find_function(first.lexeme())
                            .ok_or_else(|| TranslationError::semantic("undefined function", &first))?;
                        if args.len() > sig.params.len() {
                            return Err(TranslationError::semantic(
                                "too many parameters to function",
                                &first,
                            ));
                        }
                        if args.len() < sig.params.len() {
                            return Err(TranslationError::semantic(
                                "not enough parameters to function",
                                &first,
                            ));
                        }
                        for (arg, parm_type) in args.iter_mut().zip(sig.params.iter()) {
                            self.validate_expr(arg, scope)?;
                            if parm_type.by_ref {
                                // Reference arguments must be plain
                                // variables of the identical type.
                                if !matches!(arg.kind, ExprKind::Variable) {
                                    return Err(TranslationError::semantic(
                                        "must pass a variable as reference argument to function",
                                        &arg.first,
                                    ));
                                }
                                if arg.ty != *parm_type {
                                    return Err(TranslationError::semantic(
                                        "variable type does not match function argument type",
                                        &arg.first,
                                    ));
                                }
                            } else if !arg.ty.can_convert_to(parm_type) {
                                return Err(TranslationError::semantic(
                                    "cannot convert expression to function parameter type",
                                    &arg.first,
                                ));
                            }
                        }
                        sig.return_type.clone()
                    }
                }
            },
            ExprKind::Binary {
                op,
                op_token,
                lhs,
                rhs,
            } => {
                self.validate_expr(lhs, scope)?;
                self.validate_expr(rhs, scope)?;
                if op.requires_boolean_operands() {
                    if lhs.ty != TypeKind::Boolean {
                        return Err(TranslationError::semantic(
                            "left operand must have boolean type",
                            op_token,
                        ));
                    }
                    if rhs.ty != TypeKind::Boolean {
                        return Err(TranslationError::semantic(
                            "right operand must have boolean type",
                            op_token,
                        ));
                    }
                    SonicType::new(TypeKind::Boolean)
                } else if op.is_boolean() {
                    if lhs.ty == TypeKind::Wave {
                        return Err(TranslationError::semantic(
                            "left operand may not be of type 'wave'",
                            op_token,
                        ));
                    }
                    if rhs.ty == TypeKind::Wave {
                        return Err(TranslationError::semantic(
                            "right operand may not be of type 'wave'",
                            op_token,
                        ));
                    }
                    if !rhs.ty.can_convert_to(&lhs.ty) {
                        return Err(TranslationError::semantic(
                            "operands of comparison have incompatible types",
                            op_token,
                        ));
                    }
                    SonicType::new(TypeKind::Boolean)
                } else {
                    if !lhs.ty.is_numeric() {
                        return Err(TranslationError::semantic(
                            "left operand must have numeric type",
                            op_token,
                        ));
                    }
                    if !rhs.ty.is_numeric() {
                        return Err(TranslationError::semantic(
                            "right operand must have numeric type",
                            op_token,
                        ));
                    }
                    if lhs.ty == TypeKind::Real || rhs.ty == TypeKind::Real {
                        SonicType::new(TypeKind::Real)
                    } else {
                        SonicType::new(TypeKind::Integer)
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                self.validate_expr(operand, scope)?;
                match op {
                    UnaryOp::Negate => {
                        if !operand.ty.is_numeric() {
                            return Err(TranslationError::semantic(
                                "operand of unary '-' must have numeric type",
                                &first,
                            ));
                        }
                        operand.ty.clone()
                    }
                    UnaryOp::Not => {
                        if operand.ty != TypeKind::Boolean {
                            return Err(TranslationError::semantic(
                                "operand of '!' must have boolean type",
                                &first,
                            ));
                        }
                        SonicType::new(TypeKind::Boolean)
                    }
                }
            }
            ExprKind::Sinewave {
                amplitude,
                frequency,
                phase,
                ..
            } => {
                self.require_real(amplitude, scope, "cannot convert amplitude expression to type 'real'")?;
                self.require_real(frequency, scope, "cannot convert frequency expression to type 'real'")?;
                self.require_real(phase, scope, "cannot convert phase expression to type 'real'")?;
                SonicType::new(TypeKind::Real)
            }
            ExprKind::Sawtooth { frequency, .. } => {
                self.require_real(frequency, scope, "cannot convert frequency expression to type 'real'")?;
                SonicType::new(TypeKind::Real)
            }
            ExprKind::Fft {
                input,
                size,
                transfer,
                freq_shift,
                ..
            } => {
                self.require_real(input, scope, "cannot convert fft input expression to type 'real'")?;
                self.validate_expr(size, scope)?;
                if !size.ty.can_convert_to(&SonicType::new(TypeKind::Integer)) {
                    return Err(TranslationError::semantic(
                        "cannot convert fft size expression to type 'integer'",
                        &size.first,
                    ));
                }
                self.require_real(
                    freq_shift,
                    scope,
                    "cannot convert fft frequency shift expression to type 'real'",
                )?;
                self.validate_transfer_function(transfer)?;
                SonicType::new(TypeKind::Real)
            }
            ExprKind::Iir {
                x_coeffs,
                y_coeffs,
                input,
                ..
            } => {
                for coeff in x_coeffs.iter_mut() {
                    self.require_real(coeff, scope, "cannot convert filter x-coefficient to type 'real'")?;
                }
                for coeff in y_coeffs.iter_mut() {
                    self.require_real(coeff, scope, "cannot convert filter y-coefficient to type 'real'")?;
                }
                self.require_real(input, scope, "cannot convert filter input expression to type 'real'")?;
                SonicType::new(TypeKind::Real)
            }
        };

        expr.ty = ty;
        Ok(())
    }

    /// The fft transfer function must be a user function with the exact
    /// prototype `function f(real, real&, real&)` and no return value.
    fn validate_transfer_function(&self, transfer: &Token) -> Result<()> {
        let sig = self
            .sigs
            .find_function(transfer.lexeme())
            .ok_or_else(|| {
                TranslationError::semantic("symbol not defined or is not a function", transfer)
            })?;
        if sig.params.len() != 3 {
            return Err(TranslationError::semantic(
                "fft transfer function must accept 3 parameters",
                transfer,
            ));
        }
        if sig.return_type != TypeKind::Void {
            return Err(TranslationError::semantic(
                "fft transfer function must not return a value",
                transfer,
            ));
        }
        if sig.params[0] != TypeKind::Real || sig.params[0].by_ref {
            return Err(TranslationError::semantic(
                "first parm of transfer function must be of type 'real'",
                transfer,
            ));
        }
        if sig.params[1] != TypeKind::Real || !sig.params[1].by_ref {
            return Err(TranslationError::semantic(
                "second parm of transfer function must be of type 'real &'",
                transfer,
            ));
        }
        if sig.params[2] != TypeKind::Real || !sig.params[2].by_ref {
            return Err(TranslationError::semantic(
                "third parm of transfer function must be of type 'real &'",
                transfer,
            ));
        }
        Ok(())
    }

    fn require_real(&self, expr: &mut Expr, scope: &Scope, message: &str) -> Result<()> {
        self.validate_expr(expr, scope)?;
        if !expr.ty.can_convert_to(&SonicType::new(TypeKind::Real)) {
            return Err(TranslationError::semantic(message, &expr.first));
        }
        Ok(())
    }

    fn try_lookup_var(&self, name: &Token, scope: &Scope) -> Option<SonicType> {
        scope
            .find(name.lexeme())
            .or_else(|| self.sigs.find_global(name.lexeme()))
            .cloned()
    }

    fn lookup_var(&self, name: &Token, scope: &Scope) -> Result<SonicType> {
        self.try_lookup_var(name, scope)
            .ok_or_else(|| TranslationError::semantic("undefined symbol", name))
    }
}

fn element_type(element: ElemType) -> SonicType {
    SonicType::new(match element {
        ElemType::Integer => TypeKind::Integer,
        ElemType::Real => TypeKind::Real,
        ElemType::Boolean => TypeKind::Boolean,
    })
}

fn builtin_type(name: &Token) -> Result<SonicType> {
    let kind = match name.lexeme() {
        "true" | "false" | "interpolate" => TypeKind::Boolean,
        "pi" | "e" | "t" => TypeKind::Real,
        "i" | "c" | "r" | "n" | "m" => TypeKind::Integer,
        _ => {
            return Err(TranslationError::internal(
                "cannot determine built-in type",
                Some(name),
            ))
        }
    };
    Ok(SonicType::new(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::scanner::Scanner;
    use crate::token::FilenameTable;

    fn parse(source: &str) -> Result<Program> {
        let mut table = FilenameTable::new();
        let file = table.intern("test.son").unwrap();
        let mut program = Program::new();
        let mut scanner = Scanner::new(source, file);
        parse_source(&mut program, &mut scanner)?;
        Ok(program)
    }

    fn compile(source: &str) -> Result<Program> {
        let mut program = parse(source)?;
        validate(&mut program)?;
        Ok(program)
    }

    fn compile_err(source: &str) -> String {
        match compile(source) {
            Ok(_) => panic!("expected validation to fail"),
            Err(error) => error.to_string(),
        }
    }

    #[test]
    fn program_body_is_required() {
        let err = compile_err("function f() { return; }");
        assert!(err.contains("no program body"), "{}", err);
    }

    #[test]
    fn simple_program_validates() {
        compile("program p() { var x: real; x = 1.5; }").unwrap();
    }

    #[test]
    fn every_expression_is_typed_after_validation() {
        let program = compile(
            "program p(gain: real) {
                 var s: wave;
                 var n0: integer;
                 n0 = 3;
                 repeat (n0)
                     s[c,i:r] = gain * sinewave(0.5, 440, 0) + noise(0.1);
             }",
        )
        .unwrap();

        fn check_expr(expr: &Expr) {
            expr.walk(&mut |e| {
                assert!(
                    e.ty != TypeKind::Undefined,
                    "untyped expression at '{}'",
                    e.first
                );
            });
        }
        fn check_stmt(stmt: &Stmt) {
            match stmt {
                Stmt::Compound(body) => body.iter().for_each(check_stmt),
                Stmt::Call(expr) => check_expr(expr),
                Stmt::If {
                    condition,
                    then_part,
                    else_part,
                } => {
                    check_expr(condition);
                    check_stmt(then_part);
                    if let Some(else_part) = else_part {
                        check_stmt(else_part);
                    }
                }
                Stmt::While { condition, body } => {
                    check_expr(condition);
                    check_stmt(body);
                }
                Stmt::For {
                    init,
                    condition,
                    update,
                    body,
                } => {
                    check_stmt(init);
                    check_expr(condition);
                    check_stmt(update);
                    check_stmt(body);
                }
                Stmt::Repeat { count, body } => {
                    check_expr(count);
                    check_stmt(body);
                }
                Stmt::Return { value, .. } => {
                    if let Some(value) = value {
                        check_expr(value);
                    }
                }
                Stmt::Assign { lvalue, rvalue, .. } => {
                    if let LvalueTarget::Wave { limit: Some(limit) } = &lvalue.target {
                        check_expr(limit);
                    }
                    check_expr(rvalue);
                }
            }
        }
        for stmt in &program.body.as_ref().unwrap().body {
            check_stmt(stmt);
        }
    }

    #[test]
    fn programs_may_span_several_source_files() {
        let mut table = FilenameTable::new();
        let mut program = Program::new();

        let first = table.intern("first.son").unwrap();
        let mut scanner = Scanner::new("var master: real; program p() { master = f(2); }", first);
        parse_source(&mut program, &mut scanner).unwrap();

        let second = table.intern("second.son").unwrap();
        let mut scanner = Scanner::new("function f(x: real): real { return x * master; }", second);
        parse_source(&mut program, &mut scanner).unwrap();

        validate(&mut program).unwrap();
        assert_eq!(program.functions.len(), 1);
        assert!(program.body.is_some());
    }

    #[test]
    fn validation_is_idempotent() {
        let mut program = parse(
            "program p() { var x: integer; x = 2 + 3 * 4; if (x > 5) x = 0; }",
        )
        .unwrap();
        validate(&mut program).unwrap();
        validate(&mut program).unwrap();
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let err = compile_err("var g: real; program p() { var g: integer; g = 1; }");
        assert!(err.contains("symbol defined more than once"), "{}", err);

        let err = compile_err("program p() { var x, x: real; x = 1; }");
        assert!(err.contains("symbol defined more than once"), "{}", err);
    }

    #[test]
    fn undefined_symbols_are_rejected() {
        let err = compile_err("program p() { var x: real; x = y; }");
        assert!(err.contains("undefined symbol"), "{}", err);
    }

    #[test]
    fn function_calls_check_arity_and_types() {
        let err = compile_err(
            "program p() { var x: real; x = f(1); }
             function f(a: real, b: real): real { return a + b; }",
        );
        assert!(err.contains("not enough parameters"), "{}", err);

        let err = compile_err(
            "program p() { var x: real; x = f(1, 2, 3); }
             function f(a: real, b: real): real { return a + b; }",
        );
        assert!(err.contains("too many parameters"), "{}", err);

        let err = compile_err(
            "program p() { var s: wave; var x: real; x = f(s); }
             function f(a: real): real { return a; }",
        );
        assert!(err.contains("cannot convert expression to function parameter type"), "{}", err);
    }

    #[test]
    fn reference_arguments_must_be_identical_variables() {
        let err = compile_err(
            "program p() { f(1 + 2); }
             function f(a: real &) { a = 0; }",
        );
        assert!(err.contains("must pass a variable as reference argument"), "{}", err);

        let err = compile_err(
            "program p() { var x: integer; f(x); }
             function f(a: real &) { a = 0; }",
        );
        assert!(err.contains("does not match function argument type"), "{}", err);

        compile(
            "program p() { var x: real; f(x); }
             function f(a: real &) { a = 0; }",
        )
        .unwrap();
    }

    #[test]
    fn conditions_must_be_boolean() {
        let err = compile_err("program p() { if (1) { } }");
        assert!(err.contains("'if' must be boolean"), "{}", err);

        let err = compile_err("program p() { while (3.5) { } }");
        assert!(err.contains("'while' must be boolean"), "{}", err);
    }

    #[test]
    fn return_values_must_match() {
        let err = compile_err(
            "program p() { }
             function f(): real { return; }",
        );
        assert!(err.contains("must return a value"), "{}", err);

        let err = compile_err(
            "program p() { var s: wave; f(s); }
             function f(w: wave &) { return w; }",
        );
        assert!(err.contains("cannot convert return value"), "{}", err);
    }

    #[test]
    fn boolean_lvalues_accept_only_plain_assignment() {
        let err = compile_err("program p() { var b: boolean; b += true; }");
        assert!(err.contains("invalid assignment operator") || err.contains("boolean on left"), "{}", err);
    }

    #[test]
    fn append_with_old_data_is_rejected() {
        let err = compile_err("program p(w: wave) { w[c,i] << 0.5 * $; }");
        assert!(err.contains("'$' appears on right side"), "{}", err);
    }

    #[test]
    fn append_requires_wave_lvalue() {
        let err = compile_err("program p() { var x: real; x << 1; }");
        assert!(err.contains("allowed only in wave assignments"), "{}", err);
    }

    #[test]
    fn vector_arity_must_match_channel_count() {
        let err = compile_err("m = 2; program p() { var s: wave; s[c,i:r] = {1, 2, 3}; }");
        assert!(err.contains("too many vector components"), "{}", err);

        let err = compile_err("m = 2; program p() { var s: wave; s[c,i:r] = {1}; }");
        assert!(err.contains("too few vector components"), "{}", err);

        compile("m = 2; program p() { var s: wave; s[c,i:r] = {0.2, 0.3}; }").unwrap();
    }

    #[test]
    fn fft_transfer_function_prototype_is_enforced() {
        let err = compile_err(
            "program p(w: wave, out: wave) { out[c,i] = fft(w[c,i], 1024, spectrum, 0.0); }
             function spectrum(f: real, zr: real &) { zr = f; }",
        );
        assert!(err.contains("must accept 3 parameters"), "{}", err);

        let err = compile_err(
            "program p(w: wave, out: wave) { out[c,i] = fft(w[c,i], 1024, spectrum, 0.0); }
             function spectrum(f: real, zr: real &, zi: real &): real { return f; }",
        );
        assert!(err.contains("must not return a value"), "{}", err);

        let err = compile_err(
            "program p(w: wave, out: wave) { out[c,i] = fft(w[c,i], 1024, spectrum, 0.0); }
             function spectrum(f: real, zr: real, zi: real &) { zi = f + zr; }",
        );
        assert!(err.contains("second parm of transfer function"), "{}", err);

        compile(
            "program p(w: wave, out: wave) { out[c,i] = fft(w[c,i], 1024, spectrum, 0.0); }
             function spectrum(f: real, zr: real &, zi: real &) { zr = f; zi = 0; }",
        )
        .unwrap();
    }

    #[test]
    fn import_variables_are_callable() {
        let program = compile(
            "import Voice from \"voice.h\";
             program p() {
                 var v: Voice(440, 0.5, 0.5);
                 var out: wave;
                 out[c,i:r] = v(c, i);
             }",
        )
        .unwrap();
        assert_eq!(program.imports.len(), 1);
        assert_eq!(program.imports[0].header.lexeme(), "voice.h");

        let err = compile_err("program p() { var x: real; x = x(1); }");
        assert!(err.contains("not an import function"), "{}", err);
    }

    #[test]
    fn comparisons_reject_waves() {
        let err = compile_err("program p(w: wave) { if (w == w) { } }");
        assert!(err.contains("may not be of type 'wave'"), "{}", err);
    }

    #[test]
    fn array_subscripts_are_checked() {
        let err = compile_err("program p() { var a: real[3,4]; a[1] = 0; }");
        assert!(err.contains("wrong number of array subscripts"), "{}", err);

        compile("program p() { var a: real[3,4]; a[1, 2] = 0.5; }").unwrap();
    }
}
