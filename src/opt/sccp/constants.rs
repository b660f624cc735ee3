//! Operator folding over compile-time constants.
//!
//! The solver asks a [`ConstantSystem`] two kinds of questions: does this
//! selector name a foldable operator, and what does that operator produce
//! for these constant operands. Both may answer "no" — an unknown selector
//! or an operand outside the folding domain simply leaves the result
//! non-constant. Folding never errors.

use crate::ir::{ClassId, ClassWorld, ConstantValue, Selector};

/// Foldable unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    BitNot,
}

/// Foldable binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    TruncatingDivide,
    Remainder,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

/// Constant model consumed by the solver.
pub trait ConstantSystem {
    /// Recognize a unary operator selector (`unary-`, `~`).
    fn lookup_unary(&self, selector: &Selector) -> Option<UnaryOp>;

    /// Recognize a binary operator selector (`+`, `<`, `==`, ...).
    fn lookup_binary(&self, selector: &Selector) -> Option<BinaryOp>;

    /// Fold a unary operator; `None` when the operand is outside the
    /// operator's domain.
    fn fold_unary(&self, op: UnaryOp, value: &ConstantValue) -> Option<ConstantValue>;

    /// Fold a binary operator; `None` on overflow, division by zero,
    /// NaN/infinity results, or operands the operator does not accept.
    fn fold_binary(
        &self,
        op: BinaryOp,
        left: &ConstantValue,
        right: &ConstantValue,
    ) -> Option<ConstantValue>;

    /// Subtype query used when folding `is` checks.
    fn is_subtype(&self, world: &ClassWorld, sub: ClassId, sup: ClassId) -> bool {
        world.is_subtype(sub, sup)
    }
}

/// The language's native constant semantics: checked 64-bit integers,
/// IEEE doubles with int coercion, string concatenation on `+`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConstantSystem;

impl NativeConstantSystem {
    pub fn new() -> Self {
        NativeConstantSystem
    }

    fn fold_int(op: BinaryOp, a: i64, b: i64) -> Option<ConstantValue> {
        let int = ConstantValue::Int;
        match op {
            BinaryOp::Add => a.checked_add(b).map(int),
            BinaryOp::Subtract => a.checked_sub(b).map(int),
            BinaryOp::Multiply => a.checked_mul(b).map(int),
            // `/` produces a double even on integer operands.
            BinaryOp::Divide => Self::fold_double(op, a as f64, b as f64),
            BinaryOp::TruncatingDivide => {
                if b == 0 {
                    None
                } else {
                    a.checked_div(b).map(int)
                }
            }
            BinaryOp::Remainder => {
                if b == 0 {
                    None
                } else {
                    a.checked_rem(b).map(int)
                }
            }
            BinaryOp::Less => Some(ConstantValue::Bool(a < b)),
            BinaryOp::LessEqual => Some(ConstantValue::Bool(a <= b)),
            BinaryOp::Greater => Some(ConstantValue::Bool(a > b)),
            BinaryOp::GreaterEqual => Some(ConstantValue::Bool(a >= b)),
            BinaryOp::Equal => Some(ConstantValue::Bool(a == b)),
            BinaryOp::BitAnd => Some(int(a & b)),
            BinaryOp::BitOr => Some(int(a | b)),
            BinaryOp::BitXor => Some(int(a ^ b)),
            BinaryOp::ShiftLeft => {
                if (0..64).contains(&b) {
                    a.checked_shl(b as u32).map(int)
                } else {
                    None
                }
            }
            BinaryOp::ShiftRight => {
                if (0..64).contains(&b) {
                    Some(int(a >> b))
                } else {
                    None
                }
            }
        }
    }

    fn fold_double(op: BinaryOp, a: f64, b: f64) -> Option<ConstantValue> {
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => {
                if b == 0.0 {
                    return None;
                }
                a / b
            }
            BinaryOp::TruncatingDivide => {
                if b == 0.0 {
                    return None;
                }
                let q = (a / b).trunc();
                return if q.is_finite() && q >= i64::MIN as f64 && q <= i64::MAX as f64 {
                    Some(ConstantValue::Int(q as i64))
                } else {
                    None
                };
            }
            BinaryOp::Remainder => {
                if b == 0.0 {
                    return None;
                }
                a % b
            }
            BinaryOp::Less => return Some(ConstantValue::Bool(a < b)),
            BinaryOp::LessEqual => return Some(ConstantValue::Bool(a <= b)),
            BinaryOp::Greater => return Some(ConstantValue::Bool(a > b)),
            BinaryOp::GreaterEqual => return Some(ConstantValue::Bool(a >= b)),
            BinaryOp::Equal => return Some(ConstantValue::Bool(a == b)),
            // Bit operations have no double semantics.
            BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::ShiftLeft
            | BinaryOp::ShiftRight => return None,
        };
        if result.is_nan() || result.is_infinite() {
            None
        } else {
            Some(ConstantValue::Double(result))
        }
    }

    /// Structural equality between primitives, with numeric cross-kind
    /// comparison (`2 == 2.0`).
    fn fold_equal(left: &ConstantValue, right: &ConstantValue) -> Option<ConstantValue> {
        if !left.is_primitive() || !right.is_primitive() {
            return None;
        }
        let result = match (left.as_double(), right.as_double()) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        };
        Some(ConstantValue::Bool(result))
    }
}

impl ConstantSystem for NativeConstantSystem {
    fn lookup_unary(&self, selector: &Selector) -> Option<UnaryOp> {
        if selector.argument_count != 0 {
            return None;
        }
        match &*selector.name {
            "unary-" => Some(UnaryOp::Negate),
            "~" => Some(UnaryOp::BitNot),
            _ => None,
        }
    }

    fn lookup_binary(&self, selector: &Selector) -> Option<BinaryOp> {
        if selector.argument_count != 1 {
            return None;
        }
        match &*selector.name {
            "+" => Some(BinaryOp::Add),
            "-" => Some(BinaryOp::Subtract),
            "*" => Some(BinaryOp::Multiply),
            "/" => Some(BinaryOp::Divide),
            "~/" => Some(BinaryOp::TruncatingDivide),
            "%" => Some(BinaryOp::Remainder),
            "<" => Some(BinaryOp::Less),
            "<=" => Some(BinaryOp::LessEqual),
            ">" => Some(BinaryOp::Greater),
            ">=" => Some(BinaryOp::GreaterEqual),
            "==" => Some(BinaryOp::Equal),
            "&" => Some(BinaryOp::BitAnd),
            "|" => Some(BinaryOp::BitOr),
            "^" => Some(BinaryOp::BitXor),
            "<<" => Some(BinaryOp::ShiftLeft),
            ">>" => Some(BinaryOp::ShiftRight),
            _ => None,
        }
    }

    fn fold_unary(&self, op: UnaryOp, value: &ConstantValue) -> Option<ConstantValue> {
        match (op, value) {
            (UnaryOp::Negate, ConstantValue::Int(v)) => v.checked_neg().map(ConstantValue::Int),
            (UnaryOp::Negate, ConstantValue::Double(v)) => Some(ConstantValue::Double(-v)),
            (UnaryOp::BitNot, ConstantValue::Int(v)) => Some(ConstantValue::Int(!v)),
            _ => None,
        }
    }

    fn fold_binary(
        &self,
        op: BinaryOp,
        left: &ConstantValue,
        right: &ConstantValue,
    ) -> Option<ConstantValue> {
        if op == BinaryOp::Equal {
            return Self::fold_equal(left, right);
        }
        // String concatenation rides the `+` operator.
        if op == BinaryOp::Add {
            if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
                return Some(ConstantValue::string(format!("{}{}", a, b)));
            }
        }
        match (left, right) {
            (ConstantValue::Int(a), ConstantValue::Int(b)) => Self::fold_int(op, *a, *b),
            _ => {
                let (a, b) = (left.as_double()?, right.as_double()?);
                Self::fold_double(op, a, b)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ClassWorld;

    fn system() -> NativeConstantSystem {
        NativeConstantSystem::new()
    }

    fn binary(name: &str) -> BinaryOp {
        system()
            .lookup_binary(&Selector::binary_operator(name))
            .expect("known operator")
    }

    #[test]
    fn test_lookup_binary() {
        assert_eq!(binary("+"), BinaryOp::Add);
        assert_eq!(binary("~/"), BinaryOp::TruncatingDivide);
        assert_eq!(binary("=="), BinaryOp::Equal);
        assert!(system()
            .lookup_binary(&Selector::call("toString", 1))
            .is_none());
        // Operator name with the wrong arity is not an operator call.
        assert!(system().lookup_binary(&Selector::call("+", 2)).is_none());
    }

    #[test]
    fn test_lookup_unary() {
        let s = system();
        assert_eq!(
            s.lookup_unary(&Selector::unary_operator("unary-")),
            Some(UnaryOp::Negate)
        );
        assert_eq!(
            s.lookup_unary(&Selector::unary_operator("~")),
            Some(UnaryOp::BitNot)
        );
        assert!(s.lookup_unary(&Selector::unary_operator("!")).is_none());
    }

    #[test]
    fn test_int_arithmetic() {
        let s = system();
        assert_eq!(
            s.fold_binary(BinaryOp::Add, &ConstantValue::Int(2), &ConstantValue::Int(3)),
            Some(ConstantValue::Int(5))
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::Multiply,
                &ConstantValue::Int(6),
                &ConstantValue::Int(7)
            ),
            Some(ConstantValue::Int(42))
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::TruncatingDivide,
                &ConstantValue::Int(7),
                &ConstantValue::Int(2)
            ),
            Some(ConstantValue::Int(3))
        );
    }

    #[test]
    fn test_int_overflow_refuses() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::Add,
                &ConstantValue::Int(i64::MAX),
                &ConstantValue::Int(1)
            ),
            None
        );
        assert_eq!(
            s.fold_unary(UnaryOp::Negate, &ConstantValue::Int(i64::MIN)),
            None
        );
    }

    #[test]
    fn test_division_by_zero_refuses() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::TruncatingDivide,
                &ConstantValue::Int(1),
                &ConstantValue::Int(0)
            ),
            None
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::Divide,
                &ConstantValue::Double(1.0),
                &ConstantValue::Double(0.0)
            ),
            None
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::Remainder,
                &ConstantValue::Int(5),
                &ConstantValue::Int(0)
            ),
            None
        );
    }

    #[test]
    fn test_int_division_produces_double() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::Divide,
                &ConstantValue::Int(1),
                &ConstantValue::Int(2)
            ),
            Some(ConstantValue::Double(0.5))
        );
    }

    #[test]
    fn test_mixed_numeric_coercion() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::Add,
                &ConstantValue::Int(1),
                &ConstantValue::Double(0.5)
            ),
            Some(ConstantValue::Double(1.5))
        );
    }

    #[test]
    fn test_comparisons() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::Less,
                &ConstantValue::Int(2),
                &ConstantValue::Int(3)
            ),
            Some(ConstantValue::Bool(true))
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::GreaterEqual,
                &ConstantValue::Int(2),
                &ConstantValue::Int(3)
            ),
            Some(ConstantValue::Bool(false))
        );
    }

    #[test]
    fn test_equality() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::Equal,
                &ConstantValue::Int(2),
                &ConstantValue::Double(2.0)
            ),
            Some(ConstantValue::Bool(true))
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::Equal,
                &ConstantValue::string("a"),
                &ConstantValue::string("b")
            ),
            Some(ConstantValue::Bool(false))
        );
        assert_eq!(
            s.fold_binary(BinaryOp::Equal, &ConstantValue::Null, &ConstantValue::Null),
            Some(ConstantValue::Bool(true))
        );
    }

    #[test]
    fn test_string_concatenation_on_plus() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::Add,
                &ConstantValue::string("foo"),
                &ConstantValue::string("bar")
            ),
            Some(ConstantValue::string("foobar"))
        );
        // String + non-string does not fold.
        assert_eq!(
            s.fold_binary(
                BinaryOp::Add,
                &ConstantValue::string("foo"),
                &ConstantValue::Int(1)
            ),
            None
        );
    }

    #[test]
    fn test_shift_out_of_range_refuses() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::ShiftLeft,
                &ConstantValue::Int(1),
                &ConstantValue::Int(64)
            ),
            None
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::ShiftLeft,
                &ConstantValue::Int(1),
                &ConstantValue::Int(-1)
            ),
            None
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::ShiftLeft,
                &ConstantValue::Int(1),
                &ConstantValue::Int(4)
            ),
            Some(ConstantValue::Int(16))
        );
    }

    #[test]
    fn test_nan_and_infinity_refuse() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::Multiply,
                &ConstantValue::Double(f64::MAX),
                &ConstantValue::Double(2.0)
            ),
            None
        );
        assert_eq!(
            s.fold_binary(
                BinaryOp::Remainder,
                &ConstantValue::Double(f64::NAN),
                &ConstantValue::Double(1.0)
            ),
            None
        );
    }

    #[test]
    fn test_non_numeric_operands_refuse() {
        let s = system();
        assert_eq!(
            s.fold_binary(
                BinaryOp::Subtract,
                &ConstantValue::Bool(true),
                &ConstantValue::Int(1)
            ),
            None
        );
    }

    #[test]
    fn test_unary_folds() {
        let s = system();
        assert_eq!(
            s.fold_unary(UnaryOp::Negate, &ConstantValue::Int(5)),
            Some(ConstantValue::Int(-5))
        );
        assert_eq!(
            s.fold_unary(UnaryOp::Negate, &ConstantValue::Double(2.5)),
            Some(ConstantValue::Double(-2.5))
        );
        assert_eq!(
            s.fold_unary(UnaryOp::BitNot, &ConstantValue::Int(0)),
            Some(ConstantValue::Int(-1))
        );
        assert_eq!(s.fold_unary(UnaryOp::BitNot, &ConstantValue::Null), None);
    }

    #[test]
    fn test_is_subtype_delegates_to_world() {
        let s = system();
        let world = ClassWorld::new();
        let core = *world.core();
        assert!(s.is_subtype(&world, core.int, core.num));
        assert!(!s.is_subtype(&world, core.num, core.int));
    }
}
