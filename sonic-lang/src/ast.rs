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

//! The Program IR: the typed tree that the parser builds, the validator
//! decorates, and the code generator walks.
//!
//! The tree is strictly owned top-down (program → functions → statements →
//! expressions). Cross-references (variable uses, calls, import lookups)
//! stay names and are resolved against the program's tables, so no node
//! ever points back up the tree.

use std::cell::Cell;

use crate::token::Token;
use crate::types::{SonicType, TypeKind};

/// Identifies a pseudo-function node so the code generator can park its
/// per-statement temporaries in a side table.
pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl BinaryOp {
    /// Higher binds tighter.
    pub fn precedence(self) -> i32 {
        use BinaryOp::*;
        match self {
            Or => 1,
            And => 2,
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual => 3,
            Add | Subtract => 10,
            Multiply | Divide | Modulo => 11,
            Power => 12,
        }
    }

    /// Whether the right operand needs parentheses at equal precedence.
    pub fn groups_to_right(self) -> bool {
        matches!(self, BinaryOp::Subtract | BinaryOp::Divide | BinaryOp::Modulo)
    }

    /// True for the operators whose result is boolean.
    pub fn is_boolean(self) -> bool {
        self.precedence() <= 3
    }

    /// True for `&` and `|`, which demand boolean operands; the relational
    /// operators instead demand comparable non-wave operands.
    pub fn requires_boolean_operands(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn target_symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Or => "||",
            And => "&&",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Modulo => "%",
            Power => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Resolved against the intrinsic table at parse time.
    Intrinsic,
    /// A user-defined `function`.
    User,
    /// A call through a variable of import type; retagged by the validator.
    Import,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A numeric or string constant; the token holds the spelling.
    Constant,
    /// A simple variable name.
    Variable,
    /// One of the built-in symbols (`i`, `c`, `pi`, ...).
    Builtin,
    /// `$` - the previous value of the sample being written.
    OldData,
    /// `{ expr, ..., expr }`
    Vector { components: Vec<Expr> },
    /// `name[cterm, iterm]`
    WaveSample { channel: Box<Expr>, index: Box<Expr> },
    /// `name.field`
    WaveField { field: Token },
    /// `name[i1, ..., in]` on an array variable.
    ArrayIndex { indices: Vec<Expr> },
    Call {
        kind: CallKind,
        /// The name emitted in generated code (the C name for intrinsics).
        target: String,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        op_token: Token,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Sinewave {
        tag: NodeId,
        amplitude: Box<Expr>,
        frequency: Box<Expr>,
        phase: Box<Expr>,
    },
    Sawtooth { tag: NodeId, frequency: Box<Expr> },
    Fft {
        tag: NodeId,
        input: Box<Expr>,
        size: Box<Expr>,
        transfer: Token,
        freq_shift: Box<Expr>,
    },
    Iir {
        tag: NodeId,
        x_coeffs: Vec<Expr>,
        y_coeffs: Vec<Expr>,
        input: Box<Expr>,
    },
}

#[derive(Debug, Clone)]
pub struct Expr {
    /// First token of the expression, for error reporting. For the
    /// name-bearing kinds this is the name itself.
    pub first: Token,
    /// Inferred type; `Undefined` until validation runs.
    pub ty: SonicType,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(first: Token, kind: ExprKind) -> Self {
        Expr {
            first,
            ty: SonicType::new(TypeKind::Undefined),
            kind,
        }
    }

    pub fn with_type(first: Token, ty: SonicType, kind: ExprKind) -> Self {
        Expr { first, ty, kind }
    }

    pub fn binary(op_token: Token, op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::new(
            lhs.first.clone(),
            ExprKind::Binary {
                op,
                op_token,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    pub fn precedence(&self) -> i32 {
        match &self.kind {
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Unary { .. } => 50,
            _ => 100,
        }
    }

    /// Applies `visit` to this node and every descendant.
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match &self.kind {
            ExprKind::Constant
            | ExprKind::Variable
            | ExprKind::Builtin
            | ExprKind::OldData
            | ExprKind::WaveField { .. } => {}
            ExprKind::Vector { components } => {
                for component in components {
                    component.walk(visit);
                }
            }
            ExprKind::WaveSample { channel, index } => {
                channel.walk(visit);
                index.walk(visit);
            }
            ExprKind::ArrayIndex { indices } => {
                for index in indices {
                    index.walk(visit);
                }
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            ExprKind::Unary { operand, .. } => operand.walk(visit),
            ExprKind::Sinewave {
                amplitude,
                frequency,
                phase,
                ..
            } => {
                amplitude.walk(visit);
                frequency.walk(visit);
                phase.walk(visit);
            }
            ExprKind::Sawtooth { frequency, .. } => frequency.walk(visit),
            ExprKind::Fft {
                input,
                size,
                freq_shift,
                ..
            } => {
                input.walk(visit);
                size.walk(visit);
                freq_shift.walk(visit);
            }
            ExprKind::Iir {
                x_coeffs,
                y_coeffs,
                input,
                ..
            } => {
                for coeff in x_coeffs {
                    coeff.walk(visit);
                }
                for coeff in y_coeffs {
                    coeff.walk(visit);
                }
                input.walk(visit);
            }
        }
    }

    /// An expression is channel-dependent when its value at a given time
    /// index may differ between channels: it mentions `c`, `$`, or an
    /// `iir` construct anywhere.
    pub fn is_channel_dependent(&self) -> bool {
        let mut dependent = false;
        self.walk(&mut |e| match &e.kind {
            ExprKind::Builtin if e.first == "c" => dependent = true,
            ExprKind::OldData | ExprKind::Iir { .. } => dependent = true,
            _ => {}
        });
        dependent
    }

    pub fn references_old_data(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e.kind, ExprKind::OldData) {
                found = true;
            }
        });
        found
    }

    /// Accumulates the wave variables this expression reads, the total
    /// number of per-sample read sites, and whether `$` appears.
    pub fn collect_wave_refs(&self, refs: &mut WaveRefs) {
        match &self.kind {
            ExprKind::Constant
            | ExprKind::Variable
            | ExprKind::Builtin
            | ExprKind::Sinewave { .. }
            | ExprKind::Sawtooth { .. } => {}
            ExprKind::OldData => refs.modifies = true,
            ExprKind::WaveSample { .. } => {
                refs.add_name(&self.first);
                refs.occurrences += 1;
            }
            ExprKind::WaveField { .. } => refs.add_name(&self.first),
            ExprKind::Vector { components } => {
                for component in components {
                    component.collect_wave_refs(refs);
                }
            }
            ExprKind::ArrayIndex { indices } => {
                for index in indices {
                    index.collect_wave_refs(refs);
                }
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    arg.collect_wave_refs(refs);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.collect_wave_refs(refs);
                rhs.collect_wave_refs(refs);
            }
            ExprKind::Unary { operand, .. } => operand.collect_wave_refs(refs),
            // The oscillators hold no per-sample wave reads; the filters
            // read only through their signal input.
            ExprKind::Fft { input, size, .. } => {
                input.collect_wave_refs(refs);
                size.collect_wave_refs(refs);
            }
            ExprKind::Iir { input, .. } => input.collect_wave_refs(refs),
        }
    }
}

/// The wave variables referenced on the right-hand side of a wave
/// assignment, gathered before emitting its loop structure.
#[derive(Debug, Default)]
pub struct WaveRefs {
    pub names: Vec<Token>,
    /// Total wave-read sites, counting repeats; scales the countdown.
    pub occurrences: usize,
    /// Set when `$` appears anywhere; forces modify mode.
    pub modifies: bool,
}

impl WaveRefs {
    pub fn add_name(&mut self, name: &Token) {
        if !self.names.iter().any(|existing| existing == name) {
            self.names.push(name.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub enum LvalueTarget {
    /// Plain variable.
    Scalar,
    /// `name[c,i]` or `name[c,i:limit]`.
    Wave { limit: Option<Expr> },
    /// `name[i1, ..., in]`.
    Array { indices: Vec<Expr> },
}

#[derive(Debug, Clone)]
pub struct Lvalue {
    pub name: Token,
    pub target: LvalueTarget,
}

impl Lvalue {
    pub fn is_wave(&self) -> bool {
        matches!(self.target, LvalueTarget::Wave { .. })
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Compound(Vec<Stmt>),
    /// A function call in statement position.
    Call(Expr),
    If {
        condition: Expr,
        then_part: Box<Stmt>,
        else_part: Option<Box<Stmt>>,
    },
    While { condition: Expr, body: Box<Stmt> },
    For {
        init: Box<Stmt>,
        condition: Expr,
        update: Box<Stmt>,
        body: Box<Stmt>,
    },
    Repeat { count: Expr, body: Box<Stmt> },
    Return { token: Token, value: Option<Expr> },
    Assign {
        op: Token,
        lvalue: Lvalue,
        rvalue: Expr,
    },
}

impl Stmt {
    /// Whether the statement emits its own braces, so an enclosing `if` or
    /// loop must not indent it as a single line.
    pub fn needs_braces(&self) -> bool {
        match self {
            Stmt::Compound(body) => {
                body.len() > 1 || body.first().map_or(false, Stmt::needs_braces)
            }
            Stmt::Assign { lvalue, .. } => lvalue.is_wave(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: Token,
    pub ty: SonicType,
    /// Multiple expressions occur only for import types, where they are
    /// the constructor arguments.
    pub init: Vec<Expr>,
    pub is_global: bool,
    pub is_parameter: bool,
    /// Transient code generation state: whether this import variable's
    /// `reset` call has been emitted for the current wave assignment.
    pub reset_emitted: Cell<bool>,
}

impl VarDecl {
    pub fn new(name: Token, ty: SonicType, init: Vec<Expr>, is_global: bool) -> Self {
        VarDecl {
            name,
            ty,
            init,
            is_global,
            is_parameter: false,
            reset_emitted: Cell::new(false),
        }
    }

    pub fn parameter(name: Token, ty: SonicType) -> Self {
        VarDecl {
            name,
            ty,
            init: Vec::new(),
            is_global: false,
            is_parameter: true,
            reset_emitted: Cell::new(false),
        }
    }
}

/// A `function` or `program` body; the two parse identically.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Token,
    pub is_program_body: bool,
    pub return_type: SonicType,
    pub params: Vec<VarDecl>,
    pub locals: Vec<VarDecl>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn find_symbol(&self, name: &Token) -> Option<&VarDecl> {
        self.params
            .iter()
            .chain(self.locals.iter())
            .find(|decl| decl.name == *name)
    }

    pub fn count_instances(&self, name: &Token) -> usize {
        self.params
            .iter()
            .chain(self.locals.iter())
            .filter(|decl| decl.name == *name)
            .count()
    }

    pub fn clear_reset_flags(&self) {
        for decl in self.params.iter().chain(self.locals.iter()) {
            decl.reset_emitted.set(false);
        }
    }
}

/// An imported native helper type and the header that declares it.
#[derive(Debug, Clone)]
pub struct ImportType {
    pub name: Token,
    pub header: Token,
}

/// The entire parsed input, possibly assembled from several source files.
#[derive(Debug)]
pub struct Program {
    pub sampling_rate: i64,
    pub sampling_rate_explicit: bool,
    pub num_channels: i64,
    pub num_channels_explicit: bool,
    pub interpolate: bool,
    pub interpolate_explicit: bool,
    pub globals: Vec<VarDecl>,
    pub functions: Vec<Function>,
    pub imports: Vec<ImportType>,
    pub body: Option<Function>,
    pub(crate) next_node_id: NodeId,
}

impl Program {
    pub fn new() -> Self {
        Program {
            sampling_rate: 44100,
            sampling_rate_explicit: false,
            num_channels: 2,
            num_channels_explicit: false,
            interpolate: true,
            interpolate_explicit: false,
            globals: Vec::new(),
            functions: Vec::new(),
            imports: Vec::new(),
            body: None,
            next_node_id: 0,
        }
    }

    pub fn find_global(&self, name: &Token) -> Option<&VarDecl> {
        self.globals.iter().find(|decl| decl.name == *name)
    }

    pub fn find_function(&self, name: &Token) -> Option<&Function> {
        self.functions
            .iter()
            .find(|func| func.name == *name)
            .or_else(|| self.body.as_ref().filter(|body| body.name == *name))
    }

    pub fn find_import_type(&self, name: &Token) -> Option<&ImportType> {
        self.imports.iter().find(|import| import.name == *name)
    }

    /// Resolves a symbol the way scoping works in Sonic: enclosing
    /// function parameters, then its locals, then the globals.
    pub fn find_symbol<'a>(
        &'a self,
        name: &Token,
        func: Option<&'a Function>,
    ) -> Option<&'a VarDecl> {
        func.and_then(|f| f.find_symbol(name))
            .or_else(|| self.find_global(name))
    }

    pub fn clear_reset_flags(&self) {
        for decl in &self.globals {
            decl.reset_emitted.set(false);
        }
    }

    pub(crate) fn next_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }
}
