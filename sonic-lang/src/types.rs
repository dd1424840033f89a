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

//! The Sonic type system: type representation, structural equality, and
//! the conversion rules applied across assignments, calls, and operands.

/// Should be big enough for a while!
pub const MAX_CHANNELS: i64 = 64;

pub const MAX_ARRAY_DIMENSIONS: usize = 4;

/// Array elements are restricted to the scalar primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    Integer,
    Real,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Undefined,
    /// Used only for functions which do not return a value.
    Void,
    Integer,
    Real,
    Boolean,
    Wave,
    /// Arises only from string constants.
    Str,
    /// A brace-enclosed channel tuple; anonymous, arises only in expressions.
    Vector,
    /// A native helper class imported into the Sonic program.
    Import(String),
    /// A dimension of 0 encodes the `?` wildcard of function parameters.
    Array { element: ElemType, dims: Vec<i64> },
}

/// A Sonic type plus the pass-by-reference marker that is meaningful only
/// on function parameters.
#[derive(Debug, Clone)]
pub struct SonicType {
    pub kind: TypeKind,
    pub by_ref: bool,
}

impl SonicType {
    pub fn new(kind: TypeKind) -> Self {
        SonicType {
            kind,
            by_ref: false,
        }
    }

    pub fn import(name: impl Into<String>) -> Self {
        SonicType::new(TypeKind::Import(name.into()))
    }

    pub fn is(&self, kind: &TypeKind) -> bool {
        self.kind == *kind
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Integer | TypeKind::Real)
    }

    /// Whether a value of this type may be used where `target` is needed.
    ///
    /// For arrays, the leading dimension is a wildcard: it exists solely to
    /// allow passing arrays of differing leading length to functions, and
    /// callers must know this.
    pub fn can_convert_to(&self, target: &SonicType) -> bool {
        use TypeKind::*;

        if matches!(target.kind, Void | Undefined) || matches!(self.kind, Void | Undefined) {
            return false;
        }

        match &target.kind {
            Integer | Real => matches!(self.kind, Integer | Real),
            Wave => matches!(self.kind, Wave | Str),
            Vector => matches!(self.kind, Vector | Integer | Real),
            Array {
                element: target_elem,
                dims: target_dims,
            } => match &self.kind {
                Array {
                    element: source_elem,
                    dims: source_dims,
                } => {
                    source_elem == target_elem
                        && source_dims.len() == target_dims.len()
                        && source_dims.iter().skip(1).eq(target_dims.iter().skip(1))
                }
                _ => false,
            },
            _ => self.kind == target.kind,
        }
    }
}

// Type equality is structural on the kind alone; the reference flag never
// participates (a `real&` parameter accepts exactly a `real` variable).
impl PartialEq for SonicType {
    fn eq(&self, other: &SonicType) -> bool {
        self.kind == other.kind
    }
}

impl Eq for SonicType {}

impl PartialEq<TypeKind> for SonicType {
    fn eq(&self, other: &TypeKind) -> bool {
        self.kind == *other
    }
}
