//! Built-in functions and methods.
//!
//! The table maps Sprout-level calls to the runtime-support library the
//! generated C++ links against. It performs no lowering itself: a
//! successful resolution names the C++ callee and the result type, and the
//! expression typer assembles the call text.

use crate::error::Violation;
use crate::types::{Assignability, Primitive, Type, can_assign};

/// What a builtin may be called on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// A free function, `name(args)`.
    Free,
    /// A method on fixed arrays and vectors.
    Array,
    /// A method on vectors only.
    Vector,
    /// A method on `str`.
    Str,
}

/// Class of values a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Any value: primitives and arrays, not `void`.
    Any,
    Int,
    Num,
    /// The element type of the receiver.
    Element,
}

/// Result type of a builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Void,
    Str,
    I64,
    U64,
    F64,
    /// The element type of the receiver.
    Element,
    /// Two `i64` values.
    I64Pair,
}

/// Metadata about a single builtin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Name at the Sprout level.
    pub name: &'static str,
    pub receiver: Receiver,
    pub params: &'static [Param],
    /// Accepts any number of trailing arguments of this class.
    pub variadic: Option<Param>,
    pub returns: Returns,
    /// C++ callee. For methods, the member name.
    pub target: &'static str,
}

const fn free(name: &'static str, params: &'static [Param], returns: Returns, target: &'static str) -> BuiltinDescriptor {
    BuiltinDescriptor {
        name,
        receiver: Receiver::Free,
        params,
        variadic: None,
        returns,
        target,
    }
}

const fn method(
    name: &'static str,
    receiver: Receiver,
    params: &'static [Param],
    returns: Returns,
    target: &'static str,
) -> BuiltinDescriptor {
    BuiltinDescriptor {
        name,
        receiver,
        params,
        variadic: None,
        returns,
        target,
    }
}

/// The complete list of builtins, in resolution order.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: "print",
        receiver: Receiver::Free,
        params: &[],
        variadic: Some(Param::Any),
        returns: Returns::Void,
        target: "rt::print",
    },
    BuiltinDescriptor {
        name: "println",
        receiver: Receiver::Free,
        params: &[],
        variadic: Some(Param::Any),
        returns: Returns::Void,
        target: "rt::println",
    },
    free("read", &[], Returns::Str, "rt::read"),
    free("mod", &[Param::Int, Param::Int], Returns::I64, "rt::mod"),
    free("mod", &[Param::Num, Param::Num], Returns::F64, "rt::mod"),
    free("pow", &[Param::Num, Param::Num], Returns::F64, "rt::pow"),
    free("sqrt", &[Param::Num], Returns::F64, "std::sqrt"),
    free("abs", &[Param::Int], Returns::I64, "rt::abs"),
    free("abs", &[Param::Num], Returns::F64, "rt::abs"),
    free("min", &[Param::Int, Param::Int], Returns::I64, "std::min<int64_t>"),
    free("min", &[Param::Num, Param::Num], Returns::F64, "std::min<double>"),
    free("max", &[Param::Int, Param::Int], Returns::I64, "std::max<int64_t>"),
    free("max", &[Param::Num, Param::Num], Returns::F64, "std::max<double>"),
    free("divmod", &[Param::Int, Param::Int], Returns::I64Pair, "rt::divmod"),
    method("len", Receiver::Array, &[], Returns::U64, "len"),
    method("len", Receiver::Str, &[], Returns::U64, "size"),
    method("at", Receiver::Array, &[Param::Int], Returns::Element, "at"),
    method("push", Receiver::Vector, &[Param::Element], Returns::Void, "push"),
    method("pop", Receiver::Vector, &[], Returns::Element, "pop"),
    method("clear", Receiver::Vector, &[], Returns::Void, "clear"),
];

/// Look up the builtins with a given Sprout-level name.
pub fn find_builtins(name: &str) -> impl Iterator<Item = &'static BuiltinDescriptor> + '_ {
    BUILTINS.iter().filter(move |b| b.name == name)
}

/// A call bound to a builtin.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub ret: Type,
    /// C++ callee, or member name for methods.
    pub target: String,
    /// The call is a type conversion such as `i32(x)`.
    pub constructor: bool,
    pub variadic: bool,
    /// The call modifies its receiver.
    pub mutates: bool,
    /// Arguments that only fit their parameter by narrowing.
    pub narrowed: Vec<usize>,
}

/// Bind `name(args)` or `receiver.name(args)` to the first compatible builtin.
pub fn resolve_function(receiver: Option<&Type>, name: &str, args: &[Type]) -> Result<Resolved, Violation> {
    let mut known = false;
    for builtin in find_builtins(name) {
        if !receiver_matches(builtin.receiver, receiver) {
            continue;
        }
        known = true;
        let element = receiver.and_then(Type::element_type);
        if let Some(narrowed) = bind_arguments(builtin, element, args) {
            return Ok(Resolved {
                ret: return_type(builtin.returns, element),
                target: builtin.target.to_string(),
                constructor: false,
                variadic: builtin.variadic.is_some(),
                mutates: builtin.receiver == Receiver::Vector,
                narrowed,
            });
        }
    }

    let signature = signature(receiver, name, args);
    if known {
        Err(Violation::new(format!("no builtin matches the call '{signature}'")))
    } else if receiver.is_some() {
        Err(Violation::new(format!("unknown method '{signature}'")))
    } else {
        Err(Violation::new(format!("unknown function '{signature}'")))
    }
}

/// Bind a conversion `T(x)` where `T` names a primitive type.
pub fn resolve_constructor(target: Primitive, args: &[Type]) -> Result<Resolved, Violation> {
    let call = || signature(None, target.name(), args);
    let [arg] = args else {
        return Err(Violation::new(format!(
            "conversion '{}' takes exactly one argument",
            call()
        )));
    };
    let Some(source) = arg.primitive().filter(|p| *p != Primitive::Void) else {
        return Err(Violation::new(format!("cannot convert in '{}'", call())));
    };

    let callee = match target {
        Primitive::Void => return Err(Violation::new("cannot convert to void")),
        Primitive::Str => "rt::to_str".to_string(),
        _ if source == Primitive::Str => {
            return Err(Violation::new(format!("cannot convert str in '{}'", call())));
        }
        _ => format!("static_cast<{}>", target.to_cpp()),
    };
    Ok(Resolved {
        ret: Type::Primitive(target),
        target: callee,
        constructor: true,
        variadic: false,
        mutates: false,
        narrowed: Vec::new(),
    })
}

fn receiver_matches(expected: Receiver, actual: Option<&Type>) -> bool {
    match (expected, actual) {
        (Receiver::Free, None) => true,
        (Receiver::Array, Some(ty)) => ty.is_array() || ty.is_vector(),
        (Receiver::Vector, Some(ty)) => ty.is_vector(),
        (Receiver::Str, Some(ty)) => *ty == Type::STR,
        _ => false,
    }
}

/// Indices of narrowed arguments, or `None` when the call does not fit.
fn bind_arguments(builtin: &BuiltinDescriptor, element: Option<&Type>, args: &[Type]) -> Option<Vec<usize>> {
    let fixed = builtin.params.len();
    let arity_fits = match builtin.variadic {
        Some(_) => args.len() >= fixed,
        None => args.len() == fixed,
    };
    if !arity_fits {
        return None;
    }

    let mut narrowed = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        let param = builtin.params.get(i).copied().or(builtin.variadic)?;
        match accepts(param, element, arg) {
            Assignability::Incompatible => return None,
            Assignability::Narrowing => narrowed.push(i),
            _ => {}
        }
    }
    Some(narrowed)
}

fn accepts(param: Param, element: Option<&Type>, arg: &Type) -> Assignability {
    let fits = match param {
        Param::Any => !arg.is_void() && !matches!(arg, Type::Tuple(_) | Type::Null),
        Param::Int => arg.is_integer(),
        Param::Num => arg.is_numeric(),
        Param::Element => return element.map_or(Assignability::Incompatible, |e| can_assign(e, arg)),
    };
    if fits {
        Assignability::Exact
    } else {
        Assignability::Incompatible
    }
}

fn return_type(returns: Returns, element: Option<&Type>) -> Type {
    match returns {
        Returns::Void => Type::VOID,
        Returns::Str => Type::STR,
        Returns::I64 => Type::I64,
        Returns::U64 => Type::U64,
        Returns::F64 => Type::F64,
        Returns::Element => element.cloned().unwrap_or(Type::VOID),
        Returns::I64Pair => Type::Tuple(vec![Type::I64, Type::I64]),
    }
}

fn signature(receiver: Option<&Type>, name: &str, args: &[Type]) -> String {
    let args: Vec<String> = args.iter().map(Type::to_string).collect();
    match receiver {
        Some(ty) => format!("{ty}.{name}({})", args.join(", ")),
        None => format!("{name}({})", args.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_compatible_overload_wins() {
        let int = resolve_function(None, "mod", &[Type::I32, Type::I64]).expect("int mod");
        assert_eq!(int.ret, Type::I64);
        let float = resolve_function(None, "mod", &[Type::F64, Type::I32]).expect("float mod");
        assert_eq!(float.ret, Type::F64);
        assert_eq!(float.target, "rt::mod");
    }

    #[test]
    fn variadic_accepts_any_count() {
        assert!(resolve_function(None, "println", &[]).is_ok());
        let resolved = resolve_function(None, "print", &[Type::STR, Type::I32, Type::BOOL]).expect("print");
        assert!(resolved.variadic);
        assert!(resolved.ret.is_void());
        assert!(resolve_function(None, "print", &[Type::VOID]).is_err());
    }

    #[test]
    fn divmod_returns_a_pair() {
        let resolved = resolve_function(None, "divmod", &[Type::I64, Type::I32]).expect("divmod");
        assert_eq!(resolved.ret.to_string(), "i64 i64");
    }

    #[test]
    fn methods_depend_on_receiver() {
        let vector = Type::array(Type::F64, None);
        let fixed = Type::array(Type::F64, Some(3));
        let pop = resolve_function(Some(&vector), "pop", &[]).expect("pop");
        assert_eq!(pop.ret, Type::F64);
        assert!(pop.mutates);
        assert!(resolve_function(Some(&fixed), "pop", &[]).is_err());
        assert_eq!(resolve_function(Some(&fixed), "len", &[]).expect("len").target, "len");
        assert_eq!(resolve_function(Some(&Type::STR), "len", &[]).expect("len").target, "size");
    }

    #[test]
    fn push_reports_narrowed_arguments() {
        let vector = Type::array(Type::I32, None);
        let resolved = resolve_function(Some(&vector), "push", &[Type::F64]).expect("push");
        assert_eq!(resolved.narrowed, vec![0]);
        assert!(resolve_function(Some(&vector), "push", &[Type::STR]).is_err());
    }

    #[test]
    fn errors_name_the_signature() {
        let err = resolve_function(None, "sqrt", &[Type::STR]).unwrap_err();
        assert_eq!(err.message, "no builtin matches the call 'sqrt(str)'");
        let err = resolve_function(None, "frobnicate", &[Type::I32]).unwrap_err();
        assert_eq!(err.message, "unknown function 'frobnicate(i32)'");
        let err = resolve_function(Some(&Type::I32), "len", &[]).unwrap_err();
        assert_eq!(err.message, "unknown method 'i32.len()'");
    }

    #[test]
    fn constructors_cast_or_stringify() {
        let cast = resolve_constructor(Primitive::I32, &[Type::F64]).expect("cast");
        assert_eq!(cast.target, "static_cast<int32_t>");
        assert!(cast.constructor);
        let text = resolve_constructor(Primitive::Str, &[Type::I32]).expect("str");
        assert_eq!(text.target, "rt::to_str");
        assert!(resolve_constructor(Primitive::I32, &[Type::STR]).is_err());
        assert!(resolve_constructor(Primitive::I32, &[]).is_err());
    }
}
