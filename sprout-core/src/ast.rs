//! Expression trees.
//!
//! Nodes own their children outright. The printer renders a fully
//! parenthesised prefix form, e.g. `1 + 2 * 3` prints as `(+ 1 (* 2 3))`.

use std::fmt;

use crate::span::SourceLocation;
use crate::types::Primitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::Or | BinaryOp::And)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    Increment,
    Decrement,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "!",
            UnaryOp::Increment => "++",
            UnaryOp::Decrement => "--",
        }
    }

    pub fn is_step(self) -> bool {
        matches!(self, UnaryOp::Increment | UnaryOp::Decrement)
    }
}

/// A numeric literal, one variant per width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(u64),
    F32(f32),
    F64(f64),
}

impl Number {
    pub fn primitive(self) -> Primitive {
        match self {
            Number::I8(_) => Primitive::I8,
            Number::I16(_) => Primitive::I16,
            Number::I32(_) => Primitive::I32,
            Number::I64(_) => Primitive::I64,
            Number::U8(_) => Primitive::U8,
            Number::U16(_) => Primitive::U16,
            Number::U32(_) => Primitive::U32,
            Number::U64(_) => Primitive::U64,
            Number::Usize(_) => Primitive::Usize,
            Number::F32(_) => Primitive::F32,
            Number::F64(_) => Primitive::F64,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::I8(v) => write!(f, "{v}"),
            Number::I16(v) => write!(f, "{v}"),
            Number::I32(v) => write!(f, "{v}"),
            Number::I64(v) => write!(f, "{v}"),
            Number::U8(v) => write!(f, "{v}"),
            Number::U16(v) => write!(f, "{v}"),
            Number::U32(v) => write!(f, "{v}"),
            Number::U64(v) | Number::Usize(v) => write!(f, "{v}"),
            Number::F32(v) => write!(f, "{v:?}f"),
            Number::F64(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Char(char),
    Str(String),
}

/// One bracket level of an index chain or an array type suffix.
///
/// `[2][3]` is `Index { size: 2, nested: Index { size: 3 } }`; `[]` has no size.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub size: Option<Box<Node>>,
    pub nested: Option<Box<Index>>,
}

impl Index {
    pub fn new(size: Option<Node>) -> Self {
        Index {
            size: size.map(Box::new),
            nested: None,
        }
    }

    /// Appends a bracket level at the end of the chain.
    pub fn push(&mut self, next: Index) {
        match &mut self.nested {
            Some(nested) => nested.push(next),
            None => self.nested = Some(Box::new(next)),
        }
    }

    pub fn levels(&self) -> Vec<Option<&Node>> {
        let mut levels = vec![self.size.as_deref()];
        let mut current = self.nested.as_deref();
        while let Some(index) = current {
            levels.push(index.size.as_deref());
            current = index.nested.as_deref();
        }
        levels
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    /// `x++` / `x--`.
    Postfix {
        op: UnaryOp,
        operand: Box<Node>,
    },
    /// `name`, `name(args)`, `name[i]`, followed by an optional `.member` chain.
    Variable {
        name: String,
        call: Option<Vec<Node>>,
        index: Option<Index>,
        member: Option<Box<Node>>,
    },
    Number(Number),
    Literal(Literal),
    Nullptr,
    /// A type name with an optional array suffix, or a constructor call `i32(x)`.
    Type {
        name: Primitive,
        index: Option<Index>,
        call: Option<Vec<Node>>,
    },
    Array(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: SourceLocation,
}

impl Node {
    pub fn new(kind: NodeKind, location: SourceLocation) -> Self {
        Node { kind, location }
    }

    /// The name when this node is a bare variable reference.
    pub fn as_plain_variable(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Variable {
                name,
                call: None,
                index: None,
                member: None,
            } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Binary { op, left, right } => write!(f, "({} {} {})", op.symbol(), left, right),
            NodeKind::Unary { op, operand } => write!(f, "({} {})", op.symbol(), operand),
            NodeKind::Postfix { op, operand } => write!(f, "(post{} {})", op.symbol(), operand),
            NodeKind::Variable {
                name,
                call,
                index,
                member,
            } => {
                f.write_str(name)?;
                if let Some(args) = call {
                    write_list(f, "(", args, ")")?;
                }
                if let Some(index) = index {
                    write!(f, "{index}")?;
                }
                if let Some(member) = member {
                    write!(f, ".{member}")?;
                }
                Ok(())
            }
            NodeKind::Number(number) => write!(f, "{number}"),
            NodeKind::Literal(Literal::Bool(value)) => write!(f, "{value}"),
            NodeKind::Literal(Literal::Char(value)) => write!(f, "{value:?}"),
            NodeKind::Literal(Literal::Str(value)) => write!(f, "{value:?}"),
            NodeKind::Nullptr => f.write_str("null"),
            NodeKind::Type { name, index, call } => {
                f.write_str(name.name())?;
                if let Some(index) = index {
                    write!(f, "{index}")?;
                }
                if let Some(args) = call {
                    write_list(f, "(", args, ")")?;
                }
                Ok(())
            }
            NodeKind::Array(elements) => write_list(f, "[", elements, "]"),
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for level in self.levels() {
            match level {
                Some(size) => write!(f, "[{size}]")?,
                None => f.write_str("[]")?,
            }
        }
        Ok(())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, open: &str, items: &[Node], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    fn at() -> SourceLocation {
        SourceLocation::new(FileId(0), 1, 1)
    }

    fn num(value: i32) -> Node {
        Node::new(NodeKind::Number(Number::I32(value)), at())
    }

    #[test]
    fn prints_prefix_form() {
        let product = Node::new(
            NodeKind::Binary {
                op: BinaryOp::Mul,
                left: Box::new(num(2)),
                right: Box::new(num(3)),
            },
            at(),
        );
        let sum = Node::new(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left: Box::new(num(1)),
                right: Box::new(product),
            },
            at(),
        );
        assert_eq!(sum.to_string(), "(+ 1 (* 2 3))");
    }

    #[test]
    fn index_chain_collects_levels() {
        let mut index = Index::new(Some(num(2)));
        index.push(Index::new(None));
        index.push(Index::new(Some(num(4))));
        assert_eq!(index.levels().len(), 3);
        assert_eq!(index.to_string(), "[2][][4]");
    }

    #[test]
    fn prints_float_literals_with_suffix() {
        assert_eq!(Number::F32(1.5).to_string(), "1.5f");
        assert_eq!(Number::F64(2.0).to_string(), "2.0");
    }
}
