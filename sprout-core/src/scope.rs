//! Lexical scopes.
//!
//! Scopes form a stack: opening a block pushes a fresh [`Scope`], closing
//! it pops and drops the whole symbol table. Lookup walks from the
//! innermost scope outwards, so nearer declarations shadow outer ones.

use std::collections::HashMap;

use crate::error::Violation;
use crate::expression::ConstValue;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Main,
    If,
    Else,
    Loop,
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
struct Variable {
    ty: Type,
    mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Constant {
    ty: Type,
    value: ConstValue,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    variables: HashMap<String, Variable>,
    constants: HashMap<String, Constant>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Scope {
            kind,
            variables: HashMap::new(),
            constants: HashMap::new(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.constants.contains_key(name)
    }

    fn symbol(&self, name: &str) -> Option<Symbol> {
        if let Some(var) = self.variables.get(name) {
            return Some(Symbol {
                ty: var.ty.clone(),
                constant: None,
                mutable: var.mutable,
            });
        }
        self.constants.get(name).map(|c| Symbol {
            ty: c.ty.clone(),
            constant: Some(c.value.clone()),
            mutable: false,
        })
    }
}

/// What a lookup found.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub ty: Type,
    pub constant: Option<ConstValue>,
    pub mutable: bool,
}

/// Outcome of a successful declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared {
    Fresh,
    /// The name hides a declaration of an enclosing scope.
    Shadowing,
}

#[derive(Debug)]
pub struct Scopes {
    stack: Vec<Scope>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    /// A stack holding only the global scope.
    pub fn new() -> Self {
        Scopes {
            stack: vec![Scope::new(ScopeKind::Global)],
        }
    }

    pub fn open(&mut self, kind: ScopeKind) {
        self.stack.push(Scope::new(kind));
    }

    /// Pops the innermost scope; the global scope cannot be closed.
    pub fn close(&mut self) -> Result<Scope, Violation> {
        if self.stack.len() == 1 {
            return Err(Violation::new("unexpected '}'"));
        }
        self.stack
            .pop()
            .ok_or_else(|| Violation::new("unexpected '}'"))
    }

    pub fn current_kind(&self) -> ScopeKind {
        self.current().kind
    }

    /// Number of open scopes below the global one.
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    pub fn declare_variable(&mut self, name: &str, ty: Type, mutable: bool) -> Result<Declared, Violation> {
        let declared = self.check_free(name)?;
        self.current_mut()
            .variables
            .insert(name.to_string(), Variable { ty, mutable });
        Ok(declared)
    }

    pub fn declare_constant(&mut self, name: &str, ty: Type, value: ConstValue) -> Result<Declared, Violation> {
        let declared = self.check_free(name)?;
        self.current_mut()
            .constants
            .insert(name.to_string(), Constant { ty, value });
        Ok(declared)
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.stack.iter().rev().find_map(|scope| scope.symbol(name))
    }

    /// True only when `name` is declared in an enclosing scope, not the current one.
    pub fn is_shadowing(&self, name: &str) -> bool {
        let (_, ancestors) = self.stack.split_last().expect("global scope is never popped");
        !self.current().contains(name) && ancestors.iter().any(|scope| scope.contains(name))
    }

    /// Walks outwards until a loop scope is found or the global scope is reached.
    pub fn in_loop(&self) -> bool {
        self.stack
            .iter()
            .rev()
            .take_while(|scope| scope.kind != ScopeKind::Global)
            .any(|scope| scope.kind == ScopeKind::Loop)
    }

    /// Whether any enclosing scope is `main`.
    pub fn in_main(&self) -> bool {
        self.stack.iter().any(|scope| scope.kind == ScopeKind::Main)
    }

    fn check_free(&self, name: &str) -> Result<Declared, Violation> {
        if self.current().contains(name) {
            return Err(Violation::new(format!("'{name}' is already declared in this scope")));
        }
        Ok(if self.is_shadowing(name) {
            Declared::Shadowing
        } else {
            Declared::Fresh
        })
    }

    fn current(&self) -> &Scope {
        self.stack.last().expect("global scope is never popped")
    }

    fn current_mut(&mut self) -> &mut Scope {
        self.stack.last_mut().expect("global scope is never popped")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let mut scopes = Scopes::new();
        scopes.open(ScopeKind::Main);
        scopes.declare_variable("x", Type::I32, true).expect("first");
        let err = scopes.declare_variable("x", Type::I32, true).unwrap_err();
        assert!(err.message.contains("already declared"));
        assert!(scopes.declare_constant("x", Type::I32, ConstValue::Int(1)).is_err());
    }

    #[test]
    fn nested_declaration_shadows() {
        let mut scopes = Scopes::new();
        scopes.open(ScopeKind::Main);
        scopes.declare_variable("x", Type::I32, true).expect("outer");
        scopes.open(ScopeKind::Plain);
        assert!(scopes.is_shadowing("x"));
        let declared = scopes.declare_variable("x", Type::F64, false).expect("inner");
        assert_eq!(declared, Declared::Shadowing);
        assert!(!scopes.is_shadowing("x"));
        assert_eq!(scopes.lookup("x").expect("found").ty, Type::F64);

        scopes.close().expect("close");
        let outer = scopes.lookup("x").expect("found");
        assert_eq!(outer.ty, Type::I32);
        assert!(outer.mutable);
    }

    #[test]
    fn closing_discards_symbols() {
        let mut scopes = Scopes::new();
        scopes.open(ScopeKind::Plain);
        scopes.declare_variable("tmp", Type::I32, true).expect("declare");
        scopes.close().expect("close");
        assert!(scopes.lookup("tmp").is_none());
    }

    #[test]
    fn constants_carry_their_value() {
        let mut scopes = Scopes::new();
        scopes
            .declare_constant("N", Type::I32, ConstValue::Int(4))
            .expect("declare");
        let symbol = scopes.lookup("N").expect("found");
        assert_eq!(symbol.constant, Some(ConstValue::Int(4)));
        assert!(!symbol.mutable);
    }

    #[test]
    fn loop_detection_walks_parents() {
        let mut scopes = Scopes::new();
        scopes.open(ScopeKind::Main);
        assert!(!scopes.in_loop());
        scopes.open(ScopeKind::Loop);
        scopes.open(ScopeKind::If);
        assert!(scopes.in_loop());
        scopes.close().expect("if");
        scopes.close().expect("loop");
        scopes.open(ScopeKind::If);
        assert!(!scopes.in_loop());
    }

    #[test]
    fn global_scope_cannot_be_closed() {
        let mut scopes = Scopes::new();
        assert!(scopes.close().is_err());
        assert_eq!(scopes.depth(), 0);
    }
}
