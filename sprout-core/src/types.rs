//! Type system for Sprout.
//!
//! This module defines the primitive types, array/vector types and the
//! tuple type produced by multi-return builtins, together with the
//! assignability rules used by declarations, assignments and calls.
//! It does not depend on parsing or code generation.

use std::fmt;

/// Primitive types, named as in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Bool,
    Char,
    Str,
    Void,
}

impl Primitive {
    pub const ALL: [Primitive; 15] = [
        Primitive::I8,
        Primitive::I16,
        Primitive::I32,
        Primitive::I64,
        Primitive::U8,
        Primitive::U16,
        Primitive::U32,
        Primitive::U64,
        Primitive::Usize,
        Primitive::F32,
        Primitive::F64,
        Primitive::Bool,
        Primitive::Char,
        Primitive::Str,
        Primitive::Void,
    ];

    pub fn from_name(name: &str) -> Option<Primitive> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::Usize => "usize",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::Str => "str",
            Primitive::Void => "void",
        }
    }

    pub fn to_cpp(self) -> &'static str {
        match self {
            Primitive::I8 => "int8_t",
            Primitive::I16 => "int16_t",
            Primitive::I32 => "int32_t",
            Primitive::I64 => "int64_t",
            Primitive::U8 => "uint8_t",
            Primitive::U16 => "uint16_t",
            Primitive::U32 => "uint32_t",
            Primitive::U64 => "uint64_t",
            Primitive::Usize => "std::size_t",
            Primitive::F32 => "float",
            Primitive::F64 => "double",
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::Str => "std::string",
            Primitive::Void => "void",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::I16
                | Primitive::I32
                | Primitive::I64
                | Primitive::U8
                | Primitive::U16
                | Primitive::U32
                | Primitive::U64
                | Primitive::Usize
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_floating()
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64 | Primitive::F32 | Primitive::F64
        )
    }

    /// Width in bits; zero for non-numeric types.
    pub fn bits(self) -> u32 {
        match self {
            Primitive::I8 | Primitive::U8 => 8,
            Primitive::I16 | Primitive::U16 => 16,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 32,
            Primitive::I64 | Primitive::U64 | Primitive::Usize | Primitive::F64 => 64,
            Primitive::Bool | Primitive::Char | Primitive::Str | Primitive::Void => 0,
        }
    }

    /// Inclusive value range of an integer type.
    pub fn integer_range(self) -> Option<(i128, i128)> {
        if !self.is_integer() {
            return None;
        }
        let bits = self.bits();
        if self.is_signed() {
            let max = (1i128 << (bits - 1)) - 1;
            Some((-max - 1, max))
        } else {
            Some((0, (1i128 << bits) - 1))
        }
    }

    fn integer_with(bits: u32, signed: bool) -> Primitive {
        match (bits, signed) {
            (8, true) => Primitive::I8,
            (16, true) => Primitive::I16,
            (32, true) => Primitive::I32,
            (8, false) => Primitive::U8,
            (16, false) => Primitive::U16,
            (32, false) => Primitive::U32,
            (_, true) => Primitive::I64,
            (_, false) => Primitive::U64,
        }
    }
}

/// Types of values and expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    /// `T[n]` when `size` is known, `T[]` (a vector) otherwise.
    ///
    /// `i32[2][3]` is an array of two `i32[3]`.
    Array { element: Box<Type>, size: Option<u64> },
    /// Result of a multi-return function, one entry per value.
    Tuple(Vec<Type>),
    /// Type of the `null` literal.
    Null,
}

impl Type {
    pub const VOID: Type = Type::Primitive(Primitive::Void);
    pub const BOOL: Type = Type::Primitive(Primitive::Bool);
    pub const STR: Type = Type::Primitive(Primitive::Str);
    pub const I32: Type = Type::Primitive(Primitive::I32);
    pub const I64: Type = Type::Primitive(Primitive::I64);
    pub const U64: Type = Type::Primitive(Primitive::U64);
    pub const F32: Type = Type::Primitive(Primitive::F32);
    pub const F64: Type = Type::Primitive(Primitive::F64);

    pub fn array(element: Type, size: Option<u64>) -> Type {
        Type::Array {
            element: Box::new(element),
            size,
        }
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.primitive().is_some_and(Primitive::is_numeric)
    }

    pub fn is_integer(&self) -> bool {
        self.primitive().is_some_and(Primitive::is_integer)
    }

    pub fn is_floating(&self) -> bool {
        self.primitive().is_some_and(Primitive::is_floating)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Void))
    }

    /// Fixed-size array.
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { size: Some(_), .. })
    }

    /// Dynamic array.
    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Array { size: None, .. })
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn to_cpp(&self) -> String {
        match self {
            Type::Primitive(p) => p.to_cpp().to_string(),
            Type::Array {
                element,
                size: Some(size),
            } => format!("rt::array<{}, {}>", element.to_cpp(), size),
            Type::Array { element, size: None } => format!("rt::vector<{}>", element.to_cpp()),
            Type::Tuple(items) => {
                let items: Vec<String> = items.iter().map(Type::to_cpp).collect();
                format!("std::tuple<{}>", items.join(", "))
            }
            Type::Null => "std::nullptr_t".to_string(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => f.write_str(p.name()),
            Type::Array { .. } => {
                let mut dims = Vec::new();
                let mut current = self;
                while let Type::Array { element, size } = current {
                    dims.push(*size);
                    current = element.as_ref();
                }
                write!(f, "{current}")?;
                for size in dims {
                    match size {
                        Some(n) => write!(f, "[{n}]")?,
                        None => f.write_str("[]")?,
                    }
                }
                Ok(())
            }
            Type::Tuple(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Type::Null => f.write_str("null"),
        }
    }
}

/// Result of checking whether a value of one type may be stored in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignability {
    Exact,
    /// Allowed, no information lost.
    Widening,
    /// Allowed, but reported as precision loss.
    Narrowing,
    Incompatible,
}

impl Assignability {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Assignability::Incompatible)
    }

    pub fn loses_precision(self) -> bool {
        matches!(self, Assignability::Narrowing)
    }
}

/// Can a value of type `source` be stored in a place of type `target`?
pub fn can_assign(target: &Type, source: &Type) -> Assignability {
    if target == source {
        return Assignability::Exact;
    }
    match (target, source) {
        (Type::Primitive(t), Type::Primitive(s)) if t.is_numeric() && s.is_numeric() => {
            numeric_assignability(*t, *s)
        }
        (
            Type::Array {
                element: te,
                size: ts,
            },
            Type::Array {
                element: se,
                size: ss,
            },
        ) => {
            if te == se && (ts.is_none() || ts == ss) {
                Assignability::Widening
            } else {
                Assignability::Incompatible
            }
        }
        _ => Assignability::Incompatible,
    }
}

fn numeric_assignability(target: Primitive, source: Primitive) -> Assignability {
    let widening = match (target.is_floating(), source.is_floating()) {
        (true, true) => target.bits() >= source.bits(),
        // f32 holds 24 bits of mantissa, f64 holds 53.
        (true, false) => source.bits() <= target.bits() / 2,
        (false, true) => false,
        (false, false) => {
            if target.is_signed() == source.is_signed() {
                target.bits() >= source.bits()
            } else {
                target.is_signed() && target.bits() > source.bits()
            }
        }
    };
    if widening {
        Assignability::Widening
    } else {
        Assignability::Narrowing
    }
}

/// Result type of an arithmetic operator applied to two numeric operands.
pub fn common_numeric(left: Primitive, right: Primitive) -> Option<Primitive> {
    if !left.is_numeric() || !right.is_numeric() {
        return None;
    }
    let promoted = match (left.is_floating(), right.is_floating()) {
        (true, true) => {
            if left.bits() >= right.bits() {
                left
            } else {
                right
            }
        }
        (true, false) => left,
        (false, true) => right,
        (false, false) => {
            let bits = left.bits().max(right.bits());
            let signed = if left.bits() == right.bits() {
                left.is_signed() && right.is_signed()
            } else if left.bits() > right.bits() {
                left.is_signed()
            } else {
                right.is_signed()
            };
            let has_usize = left == Primitive::Usize || right == Primitive::Usize;
            if has_usize && bits == 64 && !signed {
                Primitive::Usize
            } else {
                Primitive::integer_with(bits, signed)
            }
        }
    };
    Some(promoted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names_round_trip() {
        for p in Primitive::ALL {
            assert_eq!(Primitive::from_name(p.name()), Some(p));
        }
        assert_eq!(Primitive::from_name("int"), None);
    }

    #[test]
    fn narrowing_float_warns_widening_does_not() {
        assert_eq!(can_assign(&Type::F32, &Type::F64), Assignability::Narrowing);
        assert_eq!(can_assign(&Type::F64, &Type::F32), Assignability::Widening);
        assert_eq!(can_assign(&Type::I32, &Type::I64), Assignability::Narrowing);
        assert_eq!(can_assign(&Type::I64, &Type::I32), Assignability::Widening);
    }

    #[test]
    fn signedness_changes_are_narrowing() {
        let u32_ = Type::Primitive(Primitive::U32);
        assert_eq!(can_assign(&u32_, &Type::I32), Assignability::Narrowing);
        assert_eq!(can_assign(&Type::I64, &u32_), Assignability::Widening);
        assert_eq!(can_assign(&Type::I32, &u32_), Assignability::Narrowing);
    }

    #[test]
    fn non_numeric_types_need_exact_match() {
        let ch = Type::Primitive(Primitive::Char);
        assert_eq!(can_assign(&ch, &Type::I32), Assignability::Incompatible);
        assert_eq!(can_assign(&Type::STR, &ch), Assignability::Incompatible);
        assert_eq!(can_assign(&Type::BOOL, &Type::BOOL), Assignability::Exact);
    }

    #[test]
    fn arrays_need_same_element_and_compatible_size() {
        let fixed3 = Type::array(Type::I32, Some(3));
        let fixed4 = Type::array(Type::I32, Some(4));
        let vector = Type::array(Type::I32, None);
        assert!(can_assign(&vector, &fixed3).is_allowed());
        assert!(!can_assign(&fixed4, &fixed3).is_allowed());
        assert!(!can_assign(&fixed3, &vector).is_allowed());
        assert!(!can_assign(&Type::array(Type::I64, None), &fixed3).is_allowed());
    }

    #[test]
    fn displays_source_syntax() {
        let ty = Type::array(Type::array(Type::I32, None), Some(2));
        assert_eq!(ty.to_string(), "i32[2][]");
        assert_eq!(ty.to_cpp(), "rt::array<rt::vector<int32_t>, 2>");
        assert_eq!(Type::Tuple(vec![Type::I64, Type::I64]).to_string(), "i64 i64");
    }

    #[test]
    fn promotes_binary_operands() {
        use Primitive::*;
        assert_eq!(common_numeric(I32, I64), Some(I64));
        assert_eq!(common_numeric(I32, F32), Some(F32));
        assert_eq!(common_numeric(F32, F64), Some(F64));
        assert_eq!(common_numeric(U32, I32), Some(U32));
        assert_eq!(common_numeric(Bool, I32), None);
    }
}
