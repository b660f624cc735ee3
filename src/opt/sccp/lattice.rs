//! Abstract-value lattice for sparse conditional constant propagation.
//!
//! The lattice represents knowledge about the value a definition may
//! produce:
//!
//! ```text
//!      NonConst(τ)   — any runtime value of type τ
//!           |
//!   Constant(c, τ)   — always the compile-time constant c
//!           |
//!        Nothing     — no value has flowed here yet
//! ```
//!
//! Values only move upward, and the lattice is three levels tall, so every
//! definition changes value at most twice; that bounds the solver's
//! fixed-point iteration.

use crate::ir::ConstantValue;

use super::types::TypeSystem;

/// Position of a value in the lattice order. `Nothing < Constant <
/// NonConst`; the solver asserts that updates never move down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    Nothing,
    Constant,
    NonConst,
}

/// Knowledge about one definition, parameterized over the abstract type
/// domain `Ty` of the active type system.
///
/// The variants carry exactly what the lattice level requires: a constant
/// always has both its value and its type, a non-constant has only a type,
/// and `Nothing` has neither.
#[derive(Debug, Clone, PartialEq)]
pub enum AbstractValue<Ty> {
    Nothing,
    Constant(ConstantValue, Ty),
    NonConst(Ty),
}

impl<Ty: Copy + Eq + std::fmt::Debug> AbstractValue<Ty> {
    #[inline]
    pub fn nothing() -> Self {
        Self::Nothing
    }

    #[inline]
    pub fn constant(value: ConstantValue, ty: Ty) -> Self {
        Self::Constant(value, ty)
    }

    #[inline]
    pub fn non_constant(ty: Ty) -> Self {
        Self::NonConst(ty)
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Nothing => ValueKind::Nothing,
            Self::Constant(..) => ValueKind::Constant,
            Self::NonConst(_) => ValueKind::NonConst,
        }
    }

    #[inline]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(..))
    }

    #[inline]
    pub fn is_non_const(&self) -> bool {
        matches!(self, Self::NonConst(_))
    }

    /// The constant, when this value is at the `Constant` level.
    #[inline]
    pub fn constant_value(&self) -> Option<&ConstantValue> {
        match self {
            Self::Constant(c, _) => Some(c),
            _ => None,
        }
    }

    /// The abstract type; `Nothing` carries none.
    #[inline]
    pub fn ty(&self) -> Option<Ty> {
        match self {
            Self::Nothing => None,
            Self::Constant(_, ty) | Self::NonConst(ty) => Some(*ty),
        }
    }

    /// Least upper bound.
    ///
    /// `Nothing` is the identity; equal constants stay constant; anything
    /// else widens to `NonConst` under the type system's join.
    pub fn join(&self, other: &Self, types: &impl TypeSystem<Ty = Ty>) -> Self {
        match (self, other) {
            (Self::Nothing, x) | (x, Self::Nothing) => x.clone(),
            (Self::Constant(a, ty), Self::Constant(b, _)) if a == b => {
                Self::Constant(a.clone(), *ty)
            }
            (a, b) => {
                // Both sides carry a type here.
                let ty = match (a.ty(), b.ty()) {
                    (Some(x), Some(y)) => types.join(x, y),
                    _ => unreachable!("Nothing handled above"),
                };
                Self::NonConst(ty)
            }
        }
    }

    /// Whether this value is certainly a (non-null) boolean. `Nothing`
    /// passes vacuously; otherwise the type must prove it.
    pub fn is_bool(&self, types: &impl TypeSystem<Ty = Ty>) -> bool {
        match self.ty() {
            None => true,
            Some(ty) => types.is_definitely_bool(ty),
        }
    }
}

impl<Ty: std::hash::Hash> std::hash::Hash for AbstractValue<Ty> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Nothing => {}
            Self::Constant(c, ty) => {
                c.hash(state);
                ty.hash(state);
            }
            Self::NonConst(ty) => ty.hash(state),
        }
    }
}

impl<Ty> Default for AbstractValue<Ty> {
    fn default() -> Self {
        Self::Nothing
    }
}
