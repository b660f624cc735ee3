//! Abstract type domains for the propagator.
//!
//! The solver is polymorphic over a [`TypeSystem`] so it can run both
//! before type inference (every type collapses to a single token) and
//! after it (types are masks of value categories). Only three facts about
//! a type ever matter here: how to join two of them, which type a constant
//! has, and whether a type proves "non-null boolean".

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::ir::{ConstantValue, FunctionId, NodeId, Selector};

/// Abstract type domain consulted by the solver and transformer.
pub trait TypeSystem {
    type Ty: Copy + Eq + std::hash::Hash + std::fmt::Debug;

    fn dynamic_type(&self) -> Self::Ty;
    fn type_type(&self) -> Self::Ty;
    fn function_type(&self) -> Self::Ty;
    fn bool_type(&self) -> Self::Ty;
    fn int_type(&self) -> Self::Ty;
    fn string_type(&self) -> Self::Ty;
    fn list_type(&self) -> Self::Ty;
    fn map_type(&self) -> Self::Ty;

    fn join(&self, a: Self::Ty, b: Self::Ty) -> Self::Ty;
    fn type_of_constant(&self, value: &ConstantValue) -> Self::Ty;

    /// True only if every value of `ty` is a boolean and `ty` excludes
    /// null.
    fn is_definitely_bool(&self, ty: Self::Ty) -> bool;

    /// Return type of a known call target; `dynamic` when unknown.
    fn return_type(&self, function: FunctionId) -> Self::Ty;

    /// Best-known result type of a dynamic send through `selector`.
    fn selector_return_type(&self, selector: &Selector) -> Self::Ty;

    /// Declared/inferred type of a root parameter.
    fn parameter_type(&self, parameter: NodeId) -> Self::Ty;
}

// =============================================================================
// Unit type system
// =============================================================================

/// The single inhabitant of the unit type domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UnitType;

/// Type system for running the pass before any inference has happened.
/// Every query answers the unit token, and no type proves boolean-ness.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitTypeSystem;

impl TypeSystem for UnitTypeSystem {
    type Ty = UnitType;

    fn dynamic_type(&self) -> UnitType {
        UnitType
    }
    fn type_type(&self) -> UnitType {
        UnitType
    }
    fn function_type(&self) -> UnitType {
        UnitType
    }
    fn bool_type(&self) -> UnitType {
        UnitType
    }
    fn int_type(&self) -> UnitType {
        UnitType
    }
    fn string_type(&self) -> UnitType {
        UnitType
    }
    fn list_type(&self) -> UnitType {
        UnitType
    }
    fn map_type(&self) -> UnitType {
        UnitType
    }

    fn join(&self, _: UnitType, _: UnitType) -> UnitType {
        UnitType
    }

    fn type_of_constant(&self, _: &ConstantValue) -> UnitType {
        UnitType
    }

    fn is_definitely_bool(&self, _: UnitType) -> bool {
        false
    }

    fn return_type(&self, _: FunctionId) -> UnitType {
        UnitType
    }

    fn selector_return_type(&self, _: &Selector) -> UnitType {
        UnitType
    }

    fn parameter_type(&self, _: NodeId) -> UnitType {
        UnitType
    }
}

// =============================================================================
// Type masks
// =============================================================================

bitflags! {
    /// A set of runtime value categories. The dynamic type is the full
    /// mask; joins are unions; nullability is the NULL bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeMask: u16 {
        const NULL     = 1 << 0;
        const BOOL     = 1 << 1;
        const INT      = 1 << 2;
        const DOUBLE   = 1 << 3;
        const STRING   = 1 << 4;
        const FUNCTION = 1 << 5;
        const TYPE     = 1 << 6;
        const LIST     = 1 << 7;
        const MAP      = 1 << 8;
        /// Instances outside the primitive categories.
        const OTHER    = 1 << 9;
    }
}

impl TypeMask {
    #[inline]
    pub fn dynamic() -> Self {
        Self::all()
    }

    #[inline]
    pub fn is_nullable(self) -> bool {
        self.contains(Self::NULL)
    }
}

/// Type system backed by dataflow-inferred masks.
///
/// The inference results arrive from outside as per-function return masks,
/// per-selector result masks, and per-parameter masks; anything absent is
/// dynamic.
#[derive(Debug, Default)]
pub struct TypeMaskSystem {
    return_types: FxHashMap<FunctionId, TypeMask>,
    selector_types: FxHashMap<Selector, TypeMask>,
    parameter_types: FxHashMap<NodeId, TypeMask>,
}

impl TypeMaskSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_return_type(&mut self, function: FunctionId, mask: TypeMask) {
        self.return_types.insert(function, mask);
    }

    pub fn set_selector_type(&mut self, selector: Selector, mask: TypeMask) {
        self.selector_types.insert(selector, mask);
    }

    pub fn set_parameter_type(&mut self, parameter: NodeId, mask: TypeMask) {
        self.parameter_types.insert(parameter, mask);
    }
}

impl TypeSystem for TypeMaskSystem {
    type Ty = TypeMask;

    fn dynamic_type(&self) -> TypeMask {
        TypeMask::dynamic()
    }
    fn type_type(&self) -> TypeMask {
        TypeMask::TYPE
    }
    fn function_type(&self) -> TypeMask {
        TypeMask::FUNCTION
    }
    fn bool_type(&self) -> TypeMask {
        TypeMask::BOOL
    }
    fn int_type(&self) -> TypeMask {
        TypeMask::INT
    }
    fn string_type(&self) -> TypeMask {
        TypeMask::STRING
    }
    fn list_type(&self) -> TypeMask {
        TypeMask::LIST
    }
    fn map_type(&self) -> TypeMask {
        TypeMask::MAP
    }

    fn join(&self, a: TypeMask, b: TypeMask) -> TypeMask {
        a | b
    }

    fn type_of_constant(&self, value: &ConstantValue) -> TypeMask {
        match value {
            ConstantValue::Bool(_) => TypeMask::BOOL,
            ConstantValue::Int(_) => TypeMask::INT,
            ConstantValue::Double(_) => TypeMask::DOUBLE,
            ConstantValue::Null => TypeMask::NULL,
            ConstantValue::String(_) => TypeMask::STRING,
            ConstantValue::Function(_) => TypeMask::FUNCTION,
            ConstantValue::Type(_) => TypeMask::TYPE,
            ConstantValue::List(_) => TypeMask::LIST,
            ConstantValue::Map(_) => TypeMask::MAP,
            ConstantValue::Constructed(..)
            | ConstantValue::Interceptor(_)
            | ConstantValue::Dummy => TypeMask::OTHER,
        }
    }

    fn is_definitely_bool(&self, ty: TypeMask) -> bool {
        ty == TypeMask::BOOL
    }

    fn return_type(&self, function: FunctionId) -> TypeMask {
        self.return_types
            .get(&function)
            .copied()
            .unwrap_or_else(TypeMask::dynamic)
    }

    fn selector_return_type(&self, selector: &Selector) -> TypeMask {
        self.selector_types
            .get(selector)
            .copied()
            .unwrap_or_else(TypeMask::dynamic)
    }

    fn parameter_type(&self, parameter: NodeId) -> TypeMask {
        self.parameter_types
            .get(&parameter)
            .copied()
            .unwrap_or_else(TypeMask::dynamic)
    }
}
