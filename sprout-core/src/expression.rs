//! Typing of expression trees.
//!
//! A [`Typer`] checks a parsed [`Node`] against the current scope stack and
//! produces an [`Expression`]: the C++ text, the Sprout type, and the folded
//! value when the node is a compile-time constant. Precision-loss warnings
//! raised along the way are collected on the typer.

use crate::ast::{BinaryOp, Index, Literal, Node, NodeKind, Number, UnaryOp};
use crate::builtins::{Resolved, resolve_constructor, resolve_function};
use crate::diagnostic::{Diagnostic, PRECISION_LOSS};
use crate::error::Violation;
use crate::parser::UNARY_PRECEDENCE;
use crate::scope::Scopes;
use crate::span::SourceLocation;
use crate::types::{Assignability, Primitive, Type, can_assign, common_numeric};

/// Precedence of text that never needs parentheses.
const ATOM: u8 = u8::MAX;

/// A compile-time value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i128),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
}

impl ConstValue {
    /// The value a place of type `ty` holds after storing `self`.
    pub fn convert(&self, ty: &Type) -> Option<ConstValue> {
        let target = ty.primitive()?;
        if target.is_integer() {
            let value = match self {
                ConstValue::Int(v) => *v,
                ConstValue::Float(f) if f.is_finite() => f.trunc() as i128,
                ConstValue::Bool(b) => i128::from(*b),
                ConstValue::Char(c) => i128::from(u32::from(*c)),
                _ => return None,
            };
            let (min, max) = target.integer_range()?;
            return (min..=max).contains(&value).then_some(ConstValue::Int(value));
        }
        let converted = match (target, self) {
            (Primitive::F32 | Primitive::F64, _) => {
                let value = self.as_f64()?;
                ConstValue::Float(if target == Primitive::F32 {
                    f64::from(value as f32)
                } else {
                    value
                })
            }
            (Primitive::Bool, ConstValue::Bool(b)) => ConstValue::Bool(*b),
            (Primitive::Bool, ConstValue::Int(v)) => ConstValue::Bool(*v != 0),
            (Primitive::Char, ConstValue::Char(c)) => ConstValue::Char(*c),
            (Primitive::Char, ConstValue::Int(v)) => {
                ConstValue::Char(u8::try_from(*v).ok().filter(u8::is_ascii)?.into())
            }
            (Primitive::Str, ConstValue::Str(s)) => ConstValue::Str(s.clone()),
            _ => return None,
        };
        Some(converted)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Int(v) => Some(*v as f64),
            ConstValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// An assignable location: a variable, possibly indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    /// Source name of the root variable.
    pub name: String,
    pub mutable: bool,
    pub constant: bool,
}

/// A typed expression ready to be emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub text: String,
    pub ty: Type,
    pub constant: Option<ConstValue>,
    /// `++x`, `x--`.
    pub is_step: bool,
    pub is_call: bool,
    pub place: Option<Place>,
    precedence: u8,
}

impl Expression {
    /// A plain value with no constant and no place.
    pub fn new(text: impl Into<String>, ty: Type) -> Self {
        Self::atom(text, ty)
    }

    fn atom(text: impl Into<String>, ty: Type) -> Self {
        Expression {
            text: text.into(),
            ty,
            constant: None,
            is_step: false,
            is_call: false,
            place: None,
            precedence: ATOM,
        }
    }

    fn with_constant(mut self, constant: Option<ConstValue>) -> Self {
        self.constant = constant;
        self
    }

    /// Text safe to use as an operand of an operator with `precedence`.
    fn operand(&self, precedence: u8) -> String {
        if self.precedence < precedence {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }

    pub fn is_null(&self) -> bool {
        self.ty == Type::Null
    }
}

pub struct Typer<'a> {
    scopes: &'a Scopes,
    warnings: Vec<Diagnostic>,
}

impl<'a> Typer<'a> {
    pub fn new(scopes: &'a Scopes) -> Self {
        Typer {
            scopes,
            warnings: Vec::new(),
        }
    }

    pub fn into_warnings(self) -> Vec<Diagnostic> {
        self.warnings
    }

    /// Type a node used as a value inside a statement.
    pub fn value(&mut self, node: &Node) -> Result<Expression, Violation> {
        let location = node.location;
        match &node.kind {
            NodeKind::Number(number) => number_literal(*number, location),
            NodeKind::Literal(literal) => literal_value(literal, location),
            NodeKind::Nullptr => Err(Violation::at("null is only allowed as a whole initializer", location)),
            NodeKind::Array(_) => Err(Violation::at(
                "array literals are only allowed as initializers",
                location,
            )),
            NodeKind::Variable {
                name,
                call,
                index,
                member,
            } => self.variable(name, call.as_deref(), index.as_ref(), member.as_deref(), location),
            NodeKind::Type { name, index, call } => match (index, call) {
                (None, Some(args)) => self.constructor(*name, args, location),
                (Some(_), Some(_)) => Err(Violation::at("array types cannot be constructed", location)),
                (_, None) => Err(Violation::at(format!("type '{}' used as a value", name.name()), location)),
            },
            NodeKind::Unary { op, operand } if op.is_step() => self.step(*op, operand, false, location),
            NodeKind::Unary { op, operand } => self.unary(*op, operand, location),
            NodeKind::Postfix { op, operand } => self.step(*op, operand, true, location),
            NodeKind::Binary { op, left, right } => self.binary(*op, left, right, location),
        }
    }

    /// Type the right-hand side of a declaration or assignment.
    ///
    /// `null` and array literals are accepted here. Without a `target`, an
    /// array literal takes the type of its elements.
    pub fn initializer(&mut self, node: &Node, target: Option<&Type>) -> Result<Expression, Violation> {
        match &node.kind {
            NodeKind::Nullptr => match target {
                Some(_) => Ok(Expression::atom("{}", Type::Null)),
                None => Err(Violation::at("cannot infer a type from null", node.location)),
            },
            NodeKind::Array(elements) => self.array_literal(elements, target, node.location),
            _ => self.value(node),
        }
    }

    /// Check that `value` may be stored in a place of type `target`.
    ///
    /// Narrowing is allowed but warned about, except for integer constants
    /// that fit the target exactly.
    pub fn check_assign(
        &mut self,
        target: &Type,
        value: &Expression,
        location: SourceLocation,
    ) -> Result<Assignability, Violation> {
        if value.is_null() {
            return Ok(Assignability::Exact);
        }
        let assignability = can_assign(target, &value.ty);
        match assignability {
            Assignability::Incompatible => {
                return Err(Violation::at(
                    format!("cannot assign a value of type '{}' to '{}'", value.ty, target),
                    location,
                ));
            }
            Assignability::Narrowing if !constant_fits(target, value) => {
                self.precision_loss(&value.ty, target, location);
            }
            _ => {}
        }
        Ok(assignability)
    }

    /// Text of `value` converted to `target`, with an explicit cast where C++
    /// would reject the implicit conversion.
    pub fn converted(
        &mut self,
        target: &Type,
        value: &Expression,
        location: SourceLocation,
    ) -> Result<String, Violation> {
        let assignability = self.check_assign(target, value, location)?;
        let needs_cast = assignability != Assignability::Exact && target.is_numeric() && !constant_fits(target, value);
        Ok(if needs_cast {
            format!("static_cast<{}>({})", target.to_cpp(), value.text)
        } else {
            value.text.clone()
        })
    }

    /// Resolve a type node such as `f64[3][]`.
    pub fn resolve_type(&mut self, node: &Node) -> Result<Type, Violation> {
        let NodeKind::Type {
            name,
            index,
            call: None,
        } = &node.kind
        else {
            return Err(Violation::at("expected a type", node.location));
        };
        if *name == Primitive::Void {
            return Err(Violation::at("values cannot have type 'void'", node.location));
        }
        let mut ty = Type::Primitive(*name);
        if let Some(index) = index {
            for level in index.levels().into_iter().rev() {
                let size = match level {
                    Some(size) => Some(self.dimension(size)?),
                    None => None,
                };
                ty = Type::array(ty, size);
            }
        }
        Ok(ty)
    }

    fn dimension(&mut self, node: &Node) -> Result<u64, Violation> {
        let size = self.value(node)?;
        match size.constant {
            Some(ConstValue::Int(n)) if size.ty.is_integer() => u64::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| Violation::at("array size must be greater than zero", node.location)),
            _ => Err(Violation::at("array size must be a constant", node.location)),
        }
    }

    fn array_literal(
        &mut self,
        elements: &[Node],
        target: Option<&Type>,
        location: SourceLocation,
    ) -> Result<Expression, Violation> {
        let (element_type, ty) = match target {
            Some(ty @ Type::Array { element, size }) => {
                if let Some(size) = *size
                    && size != elements.len() as u64
                {
                    let quantity = if (elements.len() as u64) < size { "few" } else { "many" };
                    return Err(Violation::at(
                        format!(
                            "too {quantity} elements for '{ty}': expected {size}, found {}",
                            elements.len()
                        ),
                        location,
                    ));
                }
                (element.as_ref().clone(), ty.clone())
            }
            Some(other) => {
                return Err(Violation::at(
                    format!("cannot assign an array literal to '{other}'"),
                    location,
                ));
            }
            None => {
                let element = self.infer_element(elements, location)?;
                let ty = Type::array(element.clone(), Some(elements.len() as u64));
                (element, ty)
            }
        };

        let mut texts = Vec::with_capacity(elements.len());
        for node in elements {
            let value = self.initializer(node, Some(&element_type))?;
            texts.push(self.converted(&element_type, &value, node.location)?);
        }
        Ok(Expression::atom(format!("{{{}}}", texts.join(", ")), ty))
    }

    fn infer_element(&mut self, elements: &[Node], location: SourceLocation) -> Result<Type, Violation> {
        let mut inferred: Option<Type> = None;
        for node in elements {
            let ty = self.initializer(node, None)?.ty;
            inferred = Some(match inferred {
                None => ty,
                Some(current) if current == ty => current,
                Some(Type::Primitive(a)) if ty.is_numeric() && a.is_numeric() => {
                    let b = ty.primitive().unwrap_or(a);
                    Type::Primitive(common_numeric(a, b).unwrap_or(a))
                }
                Some(current) => {
                    return Err(Violation::at(
                        format!("array literal mixes '{current}' and '{ty}'"),
                        node.location,
                    ));
                }
            });
        }
        inferred.ok_or_else(|| Violation::at("cannot infer the type of an empty array literal", location))
    }

    fn variable(
        &mut self,
        name: &str,
        call: Option<&[Node]>,
        index: Option<&Index>,
        member: Option<&Node>,
        location: SourceLocation,
    ) -> Result<Expression, Violation> {
        let mut expr = match call {
            Some(args) => {
                let args = self.arguments(args)?;
                let types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
                let resolved = resolve_function(None, name, &types).map_err(|v| v.or_at(location))?;
                self.call(None, resolved, &args, location)
            }
            None => {
                let symbol = self
                    .scopes
                    .lookup(name)
                    .ok_or_else(|| Violation::at(format!("unknown identifier '{name}'"), location))?;
                let mut expr = Expression::atom(escape_name(name), symbol.ty);
                expr.place = Some(Place {
                    name: name.to_string(),
                    mutable: symbol.mutable,
                    constant: symbol.constant.is_some(),
                });
                expr.with_constant(symbol.constant)
            }
        };
        if let Some(index) = index {
            expr = self.index(expr, index)?;
        }
        if let Some(member) = member {
            expr = self.member(expr, member)?;
        }
        Ok(expr)
    }

    fn index(&mut self, mut expr: Expression, index: &Index) -> Result<Expression, Violation> {
        for level in index.levels() {
            let Some(node) = level else {
                return Err(Violation::new("missing index expression"));
            };
            let position = self.value(node)?;
            expr = self.element_access(expr, &position, node.location)?;
        }
        Ok(expr)
    }

    fn element_access(
        &mut self,
        receiver: Expression,
        position: &Expression,
        location: SourceLocation,
    ) -> Result<Expression, Violation> {
        if !position.ty.is_integer() {
            return Err(Violation::at(
                format!("array index must be an integer, found '{}'", position.ty),
                location,
            ));
        }
        let element = match &receiver.ty {
            Type::Array { element, .. } => element.as_ref().clone(),
            ty if *ty == Type::STR => Type::Primitive(Primitive::Char),
            ty => return Err(Violation::at(format!("cannot index a value of type '{ty}'"), location)),
        };
        if let Some(ConstValue::Int(i)) = position.constant {
            let out_of_bounds = match receiver.ty {
                Type::Array { size: Some(size), .. } => i >= i128::from(size),
                _ => false,
            };
            if i < 0 || out_of_bounds {
                return Err(Violation::at(
                    format!("index {i} is out of bounds for '{}'", receiver.ty),
                    location,
                ));
            }
        }
        let mut expr = Expression::atom(format!("{}.at({})", receiver.operand(ATOM), position.text), element);
        expr.place = receiver.place;
        Ok(expr)
    }

    fn member(&mut self, receiver: Expression, member: &Node) -> Result<Expression, Violation> {
        let NodeKind::Variable {
            name,
            call,
            index,
            member: next,
        } = &member.kind
        else {
            return Err(Violation::at("expected a member name", member.location));
        };
        let Some(args) = call else {
            return Err(Violation::at(
                format!("'{}' has no member '{name}'", receiver.ty),
                member.location,
            ));
        };

        let args = self.arguments(args)?;
        let mut expr = if name == "at" {
            let [position] = args.as_slice() else {
                return Err(Violation::at("'at' takes exactly one index", member.location));
            };
            self.element_access(receiver, position, member.location)?
        } else {
            let types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
            let resolved = resolve_function(Some(&receiver.ty), name, &types).map_err(|v| v.or_at(member.location))?;
            if resolved.mutates {
                check_modifiable(&receiver, member.location)?;
            }
            self.call(Some(&receiver), resolved, &args, member.location)
        };

        if let Some(index) = index {
            expr = self.index(expr, index)?;
        }
        if let Some(next) = next {
            expr = self.member(expr, next)?;
        }
        Ok(expr)
    }

    fn arguments(&mut self, args: &[Node]) -> Result<Vec<Expression>, Violation> {
        args.iter().map(|arg| self.value(arg)).collect()
    }

    fn call(
        &mut self,
        receiver: Option<&Expression>,
        resolved: Resolved,
        args: &[Expression],
        location: SourceLocation,
    ) -> Expression {
        // Only element parameters accept narrowing arguments.
        let element = receiver.and_then(|r| r.ty.element_type());
        for &i in &resolved.narrowed {
            if let (Some(arg), Some(element)) = (args.get(i), element)
                && !constant_fits(element, arg)
            {
                self.precision_loss(&arg.ty, element, location);
            }
        }
        let texts: Vec<&str> = args.iter().map(|arg| arg.text.as_str()).collect();
        let text = match receiver {
            Some(receiver) => format!("{}.{}({})", receiver.operand(ATOM), resolved.target, texts.join(", ")),
            None => format!("{}({})", resolved.target, texts.join(", ")),
        };
        let mut expr = Expression::atom(text, resolved.ret);
        expr.is_call = true;
        expr
    }

    fn constructor(&mut self, target: Primitive, args: &[Node], location: SourceLocation) -> Result<Expression, Violation> {
        let args = self.arguments(args)?;
        let types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
        let resolved = resolve_constructor(target, &types).map_err(|v| v.or_at(location))?;
        let constant = args[0].constant.as_ref().and_then(|c| c.convert(&resolved.ret));
        let text = format!("{}({})", resolved.target, args[0].text);
        Ok(Expression::atom(text, resolved.ret).with_constant(constant))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Node, location: SourceLocation) -> Result<Expression, Violation> {
        let inner = self.value(operand)?;
        let valid = match op {
            UnaryOp::Not => inner.ty == Type::BOOL,
            _ => inner.ty.is_numeric(),
        };
        if !valid {
            return Err(Violation::at(
                format!("operator '{}' cannot be applied to '{}'", op.symbol(), inner.ty),
                location,
            ));
        }

        let mut text = inner.operand(UNARY_PRECEDENCE);
        // Keep `- -x` from reading as a decrement.
        if text.starts_with(['-', '+']) {
            text = format!("({text})");
        }
        let constant = match (op, &inner.constant) {
            (UnaryOp::Plus, Some(value)) => Some(value.clone()),
            (UnaryOp::Minus, Some(ConstValue::Int(v))) => Some(ConstValue::Int(-v)),
            (UnaryOp::Minus, Some(ConstValue::Float(v))) => Some(ConstValue::Float(-v)),
            (UnaryOp::Not, Some(ConstValue::Bool(v))) => Some(ConstValue::Bool(!v)),
            _ => None,
        };
        let mut expr = Expression::atom(format!("{}{}", op.symbol(), text), inner.ty).with_constant(constant);
        expr.precedence = UNARY_PRECEDENCE;
        Ok(expr)
    }

    fn step(
        &mut self,
        op: UnaryOp,
        operand: &Node,
        postfix: bool,
        location: SourceLocation,
    ) -> Result<Expression, Violation> {
        let inner = self.value(operand)?;
        if inner.place.is_none() {
            return Err(Violation::at(
                format!("operator '{}' needs a variable", op.symbol()),
                location,
            ));
        }
        check_modifiable(&inner, location)?;
        if !inner.ty.is_numeric() {
            return Err(Violation::at(
                format!("operator '{}' cannot be applied to '{}'", op.symbol(), inner.ty),
                location,
            ));
        }
        let text = if postfix {
            format!("{}{}", inner.text, op.symbol())
        } else {
            format!("{}{}", op.symbol(), inner.text)
        };
        let mut expr = Expression::atom(text, inner.ty);
        expr.is_step = true;
        if !postfix {
            expr.precedence = UNARY_PRECEDENCE;
        }
        Ok(expr)
    }

    fn binary(&mut self, op: BinaryOp, left: &Node, right: &Node, location: SourceLocation) -> Result<Expression, Violation> {
        let l = self.value(left)?;
        let r = self.value(right)?;
        let mismatch = || {
            Violation::at(
                format!("operator '{}' cannot be applied to '{}' and '{}'", op.symbol(), l.ty, r.ty),
                location,
            )
        };

        let ty = if op.is_logical() {
            if l.ty != Type::BOOL || r.ty != Type::BOOL {
                return Err(mismatch());
            }
            Type::BOOL
        } else if op.is_comparison() {
            let comparable = (l.ty.is_numeric() && r.ty.is_numeric())
                || (l.ty == r.ty && matches!(l.ty.primitive(), Some(Primitive::Char | Primitive::Str)))
                || (l.ty == Type::BOOL && r.ty == Type::BOOL && matches!(op, BinaryOp::Eq | BinaryOp::Ne));
            if !comparable {
                return Err(mismatch());
            }
            Type::BOOL
        } else if op == BinaryOp::Add && l.ty == Type::STR && matches!(r.ty.primitive(), Some(Primitive::Str | Primitive::Char)) {
            Type::STR
        } else {
            let (Some(a), Some(b)) = (l.ty.primitive(), r.ty.primitive()) else {
                return Err(mismatch());
            };
            let promoted = common_numeric(a, b).ok_or_else(mismatch)?;
            if op == BinaryOp::Pow {
                if promoted.is_integer() { Type::I64 } else { Type::F64 }
            } else {
                Type::Primitive(promoted)
            }
        };

        if matches!(op, BinaryOp::Div | BinaryOp::Mod)
            && ty.is_integer()
            && r.constant == Some(ConstValue::Int(0))
        {
            return Err(Violation::at("division by zero", location));
        }

        // Folding gives up on overflow: the value must fit the result type.
        let constant = match (&l.constant, &r.constant) {
            (Some(a), Some(b)) => fold_binary(op, a, b).and_then(|value| value.convert(&ty)),
            _ => None,
        };

        let (text, precedence) = match op {
            BinaryOp::Mod => (format!("rt::mod({}, {})", l.text, r.text), ATOM),
            BinaryOp::Pow if ty.is_integer() => (format!("static_cast<int64_t>(rt::pow({}, {}))", l.text, r.text), ATOM),
            BinaryOp::Pow => (format!("rt::pow({}, {})", l.text, r.text), ATOM),
            _ => {
                let precedence = binary_precedence(op);
                let text = format!("{} {} {}", l.operand(precedence), op.symbol(), r.operand(precedence + 1));
                (text, precedence)
            }
        };
        let mut expr = Expression::atom(text, ty).with_constant(constant);
        expr.precedence = precedence;
        Ok(expr)
    }

    fn precision_loss(&mut self, from: &Type, to: &Type, location: SourceLocation) {
        self.warnings.push(
            Diagnostic::warning(format!("precision loss converting '{from}' to '{to}'"))
                .with_code(PRECISION_LOSS)
                .at(location),
        );
    }
}

/// Rejects writes through constants and read-only variables.
pub fn check_modifiable(expr: &Expression, location: SourceLocation) -> Result<(), Violation> {
    match &expr.place {
        Some(place) if place.constant => Err(Violation::at(
            format!("cannot modify constant '{}'", place.name),
            location,
        )),
        Some(place) if !place.mutable => Err(Violation::at(
            format!("cannot modify read-only variable '{}'", place.name),
            location,
        )),
        _ => Ok(()),
    }
}

fn constant_fits(target: &Type, value: &Expression) -> bool {
    match (target.primitive(), &value.constant) {
        (Some(p), Some(ConstValue::Int(v))) if p.is_integer() => {
            p.integer_range().is_some_and(|(min, max)| (min..=max).contains(v))
        }
        (Some(p), Some(ConstValue::Int(_))) => p.is_floating(),
        _ => false,
    }
}

/// Mirrors the parser's tiers; C++ orders these operators the same way.
fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq | BinaryOp::Ne => 3,
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 4,
        BinaryOp::Add | BinaryOp::Sub => 5,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
        BinaryOp::Pow => 7,
    }
}

fn fold_binary(op: BinaryOp, left: &ConstValue, right: &ConstValue) -> Option<ConstValue> {
    use ConstValue::*;
    let value = match (left, right) {
        (Int(a), Int(b)) => match op {
            BinaryOp::Add => Int(a.checked_add(*b)?),
            BinaryOp::Sub => Int(a.checked_sub(*b)?),
            BinaryOp::Mul => Int(a.checked_mul(*b)?),
            BinaryOp::Div => Int(a.checked_div(*b)?),
            BinaryOp::Mod => Int(a.checked_rem(*b)?),
            BinaryOp::Pow => Int(a.checked_pow(u32::try_from(*b).ok()?)?),
            _ => Bool(compare(op, a.cmp(b))?),
        },
        (Int(_) | Float(_), Int(_) | Float(_)) => {
            let (a, b) = (left.as_f64()?, right.as_f64()?);
            match op {
                BinaryOp::Add => Float(a + b),
                BinaryOp::Sub => Float(a - b),
                BinaryOp::Mul => Float(a * b),
                BinaryOp::Div => Float(a / b),
                BinaryOp::Mod => Float(a % b),
                BinaryOp::Pow => Float(a.powf(b)),
                _ => Bool(compare(op, a.partial_cmp(&b)?)?),
            }
        }
        (Bool(a), Bool(b)) => match op {
            BinaryOp::And => Bool(*a && *b),
            BinaryOp::Or => Bool(*a || *b),
            _ => Bool(compare(op, a.cmp(b))?),
        },
        (Str(a), Str(b)) if op == BinaryOp::Add => Str(format!("{a}{b}")),
        (Str(a), Char(b)) if op == BinaryOp::Add => Str(format!("{a}{b}")),
        (Str(a), Str(b)) => Bool(compare(op, a.cmp(b))?),
        (Char(a), Char(b)) => Bool(compare(op, a.cmp(b))?),
        _ => return None,
    };
    Some(value)
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> Option<bool> {
    use std::cmp::Ordering::*;
    let result = match op {
        BinaryOp::Eq => ordering == Equal,
        BinaryOp::Ne => ordering != Equal,
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Ge => ordering != Less,
        _ => return None,
    };
    Some(result)
}

fn number_literal(number: Number, location: SourceLocation) -> Result<Expression, Violation> {
    let (text, constant) = match number {
        Number::I8(v) => (v.to_string(), ConstValue::Int(v.into())),
        Number::I16(v) => (v.to_string(), ConstValue::Int(v.into())),
        Number::I32(v) => (v.to_string(), ConstValue::Int(v.into())),
        Number::I64(v) => (v.to_string(), ConstValue::Int(v.into())),
        Number::U8(v) => (v.to_string(), ConstValue::Int(v.into())),
        Number::U16(v) => (v.to_string(), ConstValue::Int(v.into())),
        Number::U32(v) => (format!("{v}U"), ConstValue::Int(v.into())),
        Number::U64(v) | Number::Usize(v) => (format!("{v}ULL"), ConstValue::Int(v.into())),
        Number::F32(v) if v.is_finite() => (format!("{v:?}f"), ConstValue::Float(v.into())),
        Number::F64(v) if v.is_finite() => (format!("{v:?}"), ConstValue::Float(v)),
        Number::F32(_) | Number::F64(_) => {
            return Err(Violation::at("floating-point literal is out of range", location));
        }
    };
    Ok(Expression::atom(text, Type::Primitive(number.primitive())).with_constant(Some(constant)))
}

fn literal_value(literal: &Literal, location: SourceLocation) -> Result<Expression, Violation> {
    let expr = match literal {
        Literal::Bool(value) => Expression::atom(value.to_string(), Type::BOOL).with_constant(Some(ConstValue::Bool(*value))),
        Literal::Char(value) => {
            if !value.is_ascii() {
                return Err(Violation::at("character literal does not fit in a char", location));
            }
            let text = format!("'{}'", escape_cpp(*value, '\''));
            Expression::atom(text, Type::Primitive(Primitive::Char)).with_constant(Some(ConstValue::Char(*value)))
        }
        Literal::Str(value) => {
            let escaped: String = value.chars().map(|c| escape_cpp(c, '"')).collect();
            Expression::atom(format!("std::string(\"{escaped}\")"), Type::STR)
                .with_constant(Some(ConstValue::Str(value.clone())))
        }
    };
    Ok(expr)
}

fn escape_cpp(ch: char, quote: char) -> String {
    match ch {
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\r' => "\\r".to_string(),
        '\0' => "\\0".to_string(),
        '\\' => "\\\\".to_string(),
        c if c == quote => format!("\\{c}"),
        c if c.is_ascii_control() => format!("\\x{:02x}", c as u32),
        c => c.to_string(),
    }
}

/// Names the generated code cannot use as-is.
const RESERVED: &[&str] = &[
    "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "bool", "case", "catch",
    "char", "char8_t", "char16_t", "char32_t", "class", "compl", "concept", "const_cast", "consteval",
    "constexpr", "constinit", "co_await", "co_return", "co_yield", "decltype", "default", "delete", "do",
    "double", "dynamic_cast", "enum", "explicit", "export", "extern", "false", "float", "friend", "goto",
    "inline", "int", "long", "mutable", "namespace", "new", "noexcept", "not", "not_eq", "nullptr",
    "operator", "or", "or_eq", "private", "protected", "public", "register", "reinterpret_cast",
    "requires", "short", "signed", "sizeof", "static", "static_assert", "static_cast", "struct", "switch",
    "template", "this", "thread_local", "throw", "true", "try", "typedef", "typeid", "typename", "union",
    "unsigned", "using", "virtual", "void", "volatile", "wchar_t", "xor", "xor_eq", "int8_t", "int16_t",
    "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t", "size_t", "argc", "argv",
    "std", "rt", "NULL",
];

/// C++ spelling of a Sprout identifier.
///
/// Names starting with `_` or colliding with C++ take a `_u` prefix, which
/// leaves `_t` free for generated temporaries.
pub fn escape_name(name: &str) -> String {
    if name.starts_with('_') || RESERVED.contains(&name) {
        format!("_u{name}")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_expression;
    use crate::scope::ScopeKind;
    use crate::span::{FileId, SourceFile};

    fn node(text: &str) -> Node {
        let file = SourceFile::new(FileId(0), "test.spr", text);
        parse_expression(&tokenize(&file).expect("lex")).expect("parse")
    }

    fn scopes() -> Scopes {
        let mut scopes = Scopes::new();
        scopes.open(ScopeKind::Main);
        scopes.declare_variable("a", Type::I32, true).expect("a");
        scopes.declare_variable("b", Type::I32, true).expect("b");
        scopes.declare_variable("x", Type::F64, true).expect("x");
        scopes.declare_variable("s", Type::STR, true).expect("s");
        scopes.declare_variable("ok", Type::BOOL, true).expect("ok");
        scopes
            .declare_variable("m", Type::array(Type::array(Type::I32, Some(3)), Some(2)), true)
            .expect("m");
        scopes.declare_variable("v", Type::array(Type::I32, None), true).expect("v");
        scopes
            .declare_variable("args", Type::array(Type::STR, None), false)
            .expect("args");
        scopes
            .declare_constant("N", Type::I32, ConstValue::Int(4))
            .expect("N");
        scopes
    }

    fn typed(text: &str) -> Expression {
        let scopes = scopes();
        Typer::new(&scopes).value(&node(text)).expect("typed")
    }

    fn violation(text: &str) -> Violation {
        let scopes = scopes();
        Typer::new(&scopes).value(&node(text)).unwrap_err()
    }

    #[test]
    fn folds_integer_constants() {
        let expr = typed("2 * 3 + N");
        assert_eq!(expr.text, "2 * 3 + N");
        assert_eq!(expr.ty, Type::I32);
        assert_eq!(expr.constant, Some(ConstValue::Int(10)));
    }

    #[test]
    fn parenthesises_only_where_needed() {
        assert_eq!(typed("(1 + 2) * a").text, "(1 + 2) * a");
        assert_eq!(typed("a - (b - 1)").text, "a - (b - 1)");
        assert_eq!(typed("(a - b) - 1").text, "a - b - 1");
        assert_eq!(typed("-(-a)").text, "-(-a)");
        assert_eq!(typed("!(a < b)").text, "!(a < b)");
    }

    #[test]
    fn promotes_mixed_arithmetic() {
        assert_eq!(typed("a + x").ty, Type::F64);
        assert_eq!(typed("a < x && ok").ty, Type::BOOL);
        assert_eq!(typed("s + \"!\"").ty, Type::STR);
    }

    #[test]
    fn lowers_mod_and_pow() {
        assert_eq!(typed("a % 3").text, "rt::mod(a, 3)");
        let pow = typed("a ^ 2");
        assert_eq!(pow.text, "static_cast<int64_t>(rt::pow(a, 2))");
        assert_eq!(pow.ty, Type::I64);
        assert_eq!(typed("x ^ 2").ty, Type::F64);
        assert_eq!(typed("2 ^ 10").constant, Some(ConstValue::Int(1024)));
    }

    #[test]
    fn rejects_mismatched_operands() {
        assert!(violation("s + 1").message.contains("operator '+'"));
        assert!(violation("ok && a").message.contains("operator '&&'"));
        assert_eq!(violation("a / 0").message, "division by zero");
    }

    #[test]
    fn index_chains_use_checked_access() {
        let expr = typed("m[1][a]");
        assert_eq!(expr.text, "m.at(1).at(a)");
        assert_eq!(expr.ty, Type::I32);
        assert_eq!(expr.place.expect("place").name, "m");
        assert_eq!(typed("v.at(0)").text, "v.at(0)");
        assert!(violation("m[2][0]").message.contains("out of bounds"));
        assert!(violation("a[0]").message.contains("cannot index"));
        assert!(violation("v[x]").message.contains("must be an integer"));
    }

    #[test]
    fn resolves_builtin_calls_and_methods() {
        let len = typed("s.len()");
        assert_eq!(len.text, "s.size()");
        assert_eq!(len.ty, Type::U64);
        let call = typed("max(a, 2)");
        assert_eq!(call.text, "std::max<int64_t>(a, 2)");
        assert!(call.is_call);
        assert_eq!(typed("v.pop()").ty, Type::I32);
        assert!(violation("args.push(s)").message.contains("read-only"));
        assert!(violation("nothing(1)").message.contains("unknown function"));
    }

    #[test]
    fn push_with_narrowing_warns() {
        let scopes = scopes();
        let mut typer = Typer::new(&scopes);
        typer.value(&node("v.push(x)")).expect("push");
        let warnings = typer.into_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, Some(PRECISION_LOSS));
    }

    #[test]
    fn escapes_literals_and_names() {
        assert_eq!(typed("\"a\\\"b\\n\"").text, "std::string(\"a\\\"b\\n\")");
        assert_eq!(typed("'\\''").text, "'\\''");
        assert_eq!(escape_name("_x"), "_u_x");
        assert_eq!(escape_name("int"), "_uint");
        assert_eq!(escape_name("value"), "value");
    }

    #[test]
    fn constructors_cast_and_fold() {
        let expr = typed("i32(2.7)");
        assert_eq!(expr.text, "static_cast<int32_t>(2.7)");
        assert_eq!(expr.constant, Some(ConstValue::Int(2)));
        assert_eq!(typed("str(a)").text, "rt::to_str(a)");
        assert!(violation("i32").message.contains("used as a value"));
    }

    #[test]
    fn steps_need_mutable_numeric_places() {
        let expr = typed("a++");
        assert!(expr.is_step);
        assert_eq!(expr.text, "a++");
        assert!(violation("N++").message.contains("cannot modify constant"));
        assert!(violation("++(a + 1)").message.contains("needs a variable"));
        assert!(violation("s++").message.contains("cannot be applied"));
    }

    #[test]
    fn null_and_array_literals_only_as_initializers() {
        let scopes = scopes();
        let mut typer = Typer::new(&scopes);
        assert!(typer.value(&node("null")).is_err());
        assert!(typer.value(&node("[1, 2]")).is_err());
        let null = typer.initializer(&node("null"), Some(&Type::I32)).expect("null");
        assert_eq!(null.text, "{}");
        assert!(typer.initializer(&node("null"), None).is_err());
    }

    #[test]
    fn array_literals_check_each_element() {
        let scopes = scopes();
        let mut typer = Typer::new(&scopes);
        let target = Type::array(Type::F32, Some(2));
        let expr = typer.initializer(&node("[1, 2.5]"), Some(&target)).expect("array");
        assert_eq!(expr.text, "{1, static_cast<float>(2.5)}");
        let err = typer.initializer(&node("[1, 2, 3]"), Some(&target)).unwrap_err();
        assert!(err.message.contains("too many elements"));
        assert!(typer.initializer(&node("[s]"), Some(&target)).is_err());
        assert_eq!(typer.into_warnings().len(), 1);
    }

    #[test]
    fn infers_array_literal_types() {
        let scopes = scopes();
        let mut typer = Typer::new(&scopes);
        let expr = typer.initializer(&node("[[1, 2], [3, a]]"), None).expect("array");
        assert_eq!(expr.ty.to_string(), "i32[2][2]");
        assert_eq!(expr.text, "{{1, 2}, {3, a}}");
        let mixed = typer.initializer(&node("[1, x]"), None).expect("mixed");
        assert_eq!(mixed.ty.to_string(), "f64[2]");
        assert!(typer.initializer(&node("[1, s]"), None).is_err());
    }

    #[test]
    fn resolves_array_types() {
        let scopes = scopes();
        let mut typer = Typer::new(&scopes);
        let ty = typer.resolve_type(&node("i32[N][]")).expect("type");
        assert_eq!(ty.to_string(), "i32[4][]");
        let err = typer.resolve_type(&node("i32[a]")).unwrap_err();
        assert_eq!(err.message, "array size must be a constant");
        assert!(typer.resolve_type(&node("i32[0]")).is_err());
    }

    #[test]
    fn constant_integers_do_not_warn_when_they_fit() {
        let scopes = scopes();
        let mut typer = Typer::new(&scopes);
        let small = typer.value(&node("100")).expect("small");
        let u8_ = Type::Primitive(Primitive::U8);
        assert_eq!(typer.check_assign(&u8_, &small, small_location()), Ok(Assignability::Narrowing));
        let big = typer.value(&node("300")).expect("big");
        typer.check_assign(&u8_, &big, small_location()).expect("allowed");
        let double = typer.value(&node("x")).expect("x");
        typer.check_assign(&Type::F32, &double, small_location()).expect("allowed");
        assert_eq!(typer.into_warnings().len(), 2);
    }

    fn small_location() -> SourceLocation {
        SourceLocation::new(FileId(0), 1, 1)
    }
}
