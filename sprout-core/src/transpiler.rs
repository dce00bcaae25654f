//! C++ generation.
//!
//! The [`Transpiler`] walks instructions in source order, owns the scope
//! stack, and appends C++ text to a single buffer. Block headers (`main`,
//! `if`, `while`, `for`, `else`) are held back until the `{` that opens
//! their block, which is where the matching scope is pushed.
//!
//! Any violation aborts generation; no partial output is returned.

use crate::ast::{Node, NodeKind};
use crate::compiler::Options;
use crate::diagnostic::{Diagnostic, SHADOWING};
use crate::error::{CoreError, Violation};
use crate::expression::{ConstValue, Expression, Typer, check_modifiable, escape_name};
use crate::instruction::{Instruction, InstructionKind, find_top_level, split_top_level_commas};
use crate::lexer::{Token, TokenKind};
use crate::parser::{SyntaxError, parse_expression, parse_expressions, parse_type};
use crate::scope::{Declared, ScopeKind, Scopes};
use crate::span::{SourceFile, SourceLocation};
use crate::types::{Primitive, Type};

/// Temporary holding a multi-return value while it is unpacked.
const TEMPORARY: &str = "_t0";

/// Generated code and the diagnostics collected on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// A block header waiting for its `{`.
#[derive(Debug)]
enum Header {
    Main,
    Block {
        kind: ScopeKind,
        text: String,
        /// Continues the line of the preceding `}`.
        inline: bool,
    },
    For {
        ty: String,
        name: String,
        init: String,
        bound: Option<String>,
        step: Option<String>,
        /// Loop variable to declare in the loop scope.
        variable: Option<(String, Type, SourceLocation)>,
        /// Outer name the loop variable hides; bound and step may not read it.
        shadowed: Option<String>,
    },
}

enum Failure {
    Syntax(SyntaxError),
    Violation(Violation),
}

impl From<SyntaxError> for Failure {
    fn from(err: SyntaxError) -> Self {
        Failure::Syntax(err)
    }
}

impl From<Violation> for Failure {
    fn from(err: Violation) -> Self {
        Failure::Violation(err)
    }
}

pub struct Transpiler<'a> {
    file: &'a SourceFile,
    options: &'a Options,
    out: String,
    scopes: Scopes,
    diagnostics: Vec<Diagnostic>,
    seen_main: bool,
    pending: Option<Header>,
    /// Kind of the scope closed by the previous instruction.
    closed: Option<ScopeKind>,
}

impl<'a> Transpiler<'a> {
    pub fn new(file: &'a SourceFile, options: &'a Options) -> Self {
        Transpiler {
            file,
            options,
            out: String::new(),
            scopes: Scopes::new(),
            diagnostics: Vec::new(),
            seen_main: false,
            pending: None,
            closed: None,
        }
    }

    pub fn generate(mut self, instructions: &[Instruction]) -> Result<Output, CoreError> {
        self.out.push_str(&format!("#include \"{}\"\n\n", self.options.runtime_header));

        for instruction in instructions {
            self.instruction(instruction)
                .map_err(|failure| self.fail(failure, instruction))?;
        }

        let end = self.end_of_input(instructions);
        if self.pending.is_some() {
            return Err(self.semantic(Violation::at("expected '{'", end), ""));
        }
        if self.scopes.depth() > 0 {
            return Err(self.semantic(Violation::at("missing '}' at end of input", end), ""));
        }

        Ok(Output {
            code: self.out,
            diagnostics: self.diagnostics,
        })
    }

    fn instruction(&mut self, instruction: &Instruction) -> Result<(), Failure> {
        let closed = self.closed.take();
        let kind = instruction.kind;
        let location = instruction.location();

        if self.pending.is_some()
            && !matches!(
                kind,
                InstructionKind::OpenScope | InstructionKind::ForCondition | InstructionKind::ForStep
            )
        {
            return Err(Violation::at("expected '{'", location).into());
        }
        let global_allowed = matches!(
            kind,
            InstructionKind::Main
                | InstructionKind::Declaration
                | InstructionKind::Initialization
                | InstructionKind::CloseScope
        );
        if self.scopes.depth() == 0 && self.pending.is_none() && !global_allowed {
            return Err(Violation::at("statements must appear inside main", location).into());
        }

        match kind {
            InstructionKind::Main => self.main(instruction),
            InstructionKind::Declaration | InstructionKind::Initialization => self.declaration(instruction),
            InstructionKind::Operation => self.operation(instruction),
            InstructionKind::Assignation => self.assignation(instruction),
            InstructionKind::Structure => self.structure(instruction),
            InstructionKind::Else => self.else_header(instruction, closed),
            InstructionKind::ForCondition => self.for_clause(instruction, false),
            InstructionKind::ForStep => self.for_clause(instruction, true),
            InstructionKind::Break => self.jump(instruction),
            InstructionKind::Return => self.return_statement(instruction),
            InstructionKind::OpenScope => self.open_scope(),
            InstructionKind::CloseScope => self.close_scope(location),
        }
    }

    fn main(&mut self, instruction: &Instruction) -> Result<(), Failure> {
        let location = instruction.location();
        if let Some(extra) = instruction.tokens.get(1) {
            return Err(Violation::at(format!("unexpected '{}' after main", extra.lexeme), extra.location).into());
        }
        if self.scopes.depth() > 0 {
            return Err(Violation::at("main must be declared at global scope", location).into());
        }
        if self.seen_main {
            return Err(Violation::at("duplicate main", location).into());
        }
        self.seen_main = true;
        self.pending = Some(Header::Main);
        Ok(())
    }

    fn open_scope(&mut self) -> Result<(), Failure> {
        match self.pending.take() {
            None => {
                self.line("{");
                self.scopes.open(ScopeKind::Plain);
            }
            Some(Header::Main) => {
                self.line("int main(int argc, char** argv) {");
                self.scopes.open(ScopeKind::Main);
                self.scopes.declare_variable("args", Type::array(Type::STR, None), false)?;
                self.line("const rt::vector<std::string> args = rt::make_args(argc, argv);");
            }
            Some(Header::Block { kind, text, inline }) => {
                if inline {
                    self.out.push_str(&format!(" {text}{{\n"));
                } else {
                    self.line(&format!("{text}{{"));
                }
                self.scopes.open(kind);
            }
            Some(Header::For {
                ty,
                name,
                init,
                bound,
                step,
                variable,
                ..
            }) => {
                let bound = bound.ok_or_else(|| Violation::new("for header needs a bound"))?;
                let step = step.unwrap_or_else(|| "1".to_string());
                self.line(&format!("RT_FOR({ty}, {name}, {init}, {bound}, {step}) {{"));
                self.scopes.open(ScopeKind::Loop);
                if let Some((name, ty, location)) = variable {
                    self.declare(&name, ty, true, None, location)?;
                }
            }
        }
        Ok(())
    }

    fn close_scope(&mut self, location: SourceLocation) -> Result<(), Failure> {
        let kind = self.scopes.current_kind();
        if kind == ScopeKind::Main {
            self.line("return 0;");
        }
        self.scopes.close().map_err(|v| v.or_at(location))?;
        self.line("}");
        self.closed = Some(kind);
        Ok(())
    }

    fn declaration(&mut self, instruction: &Instruction) -> Result<(), Failure> {
        let tokens = &instruction.tokens;
        let keyword = &tokens[0];
        let constant = keyword.kind == TokenKind::Const;

        let equal = find_top_level(tokens, |k| k == TokenKind::Equal);
        let head = &tokens[1..equal.unwrap_or(tokens.len())];
        let colon = find_top_level(head, |k| k == TokenKind::Colon);

        let mut names = Vec::new();
        for part in split_top_level_commas(&head[..colon.unwrap_or(head.len())]) {
            match part {
                [token] if token.kind == TokenKind::Identifier => names.push(token),
                _ => {
                    let at = part.first().unwrap_or(keyword);
                    return Err(Violation::at("expected a variable name", at.location).into());
                }
            }
        }
        if names.is_empty() {
            return Err(Violation::at(format!("expected a variable name after '{}'", keyword.lexeme), keyword.location).into());
        }

        let type_node = match colon {
            Some(c) => Some(parse_type(require(&head[c + 1..], &head[c], "a type after ':'")?)?),
            None => None,
        };
        let initializers = match equal {
            Some(e) => parse_expressions(require(&tokens[e + 1..], &tokens[e], "an initializer after '='")?)?,
            None => Vec::new(),
        };

        for name in names.iter().filter(|name| self.scopes.is_shadowing(&name.lexeme)) {
            for node in &initializers {
                reject_shadowed_read(&name.lexeme, node)?;
            }
        }

        let mut typer = Typer::new(&self.scopes);
        let declared = type_node.as_ref().map(|node| typer.resolve_type(node)).transpose()?;
        let mut lines = Vec::new();
        let mut bindings: Vec<(String, Type, Option<ConstValue>)> = Vec::new();

        if initializers.is_empty() {
            let first = names[0].lexeme.as_str();
            if constant {
                return Err(Violation::at(format!("constant '{first}' needs an initializer"), keyword.location).into());
            }
            let ty = declared.ok_or_else(|| Violation::at(format!("missing type for '{first}'"), keyword.location))?;
            for name in &names {
                lines.push(format!("{} {}{{}};", ty.to_cpp(), escape_name(&name.lexeme)));
                bindings.push((name.lexeme.clone(), ty.clone(), None));
            }
        } else if let Some(call) = self.multi_return(&mut typer, &initializers, names.len())? {
            if constant {
                return Err(Violation::at("constants cannot be initialized from a multi-return call", keyword.location).into());
            }
            let Type::Tuple(members) = &call.ty else {
                unreachable!("multi_return only yields tuples");
            };
            let mut targets = Vec::new();
            for (name, member) in names.iter().zip(members) {
                let ty = declared.clone().unwrap_or_else(|| member.clone());
                let target = escape_name(&name.lexeme);
                lines.push(format!("{} {}{{}};", ty.to_cpp(), target));
                targets.push((target, ty.clone()));
                bindings.push((name.lexeme.clone(), ty, None));
            }
            lines.extend(self.destructure(&mut typer, &call, &targets, initializers[0].location)?);
        } else {
            if initializers.len() != 1 && initializers.len() != names.len() {
                let quantity = if initializers.len() > names.len() { "many" } else { "few" };
                return Err(Violation::at(format!("too {quantity} initializers"), initializers[0].location).into());
            }
            // One initializer is shared by every name.
            let mut values = Vec::new();
            for node in &initializers {
                values.push(typer.initializer(node, declared.as_ref())?);
            }
            for (i, name) in names.iter().enumerate() {
                let index = if values.len() == 1 { 0 } else { i };
                let (value, node) = (&values[index], &initializers[index]);
                let ty = match &declared {
                    Some(ty) => ty.clone(),
                    None => inferred_type(value, &name.lexeme, node.location)?,
                };
                let text = typer.converted(&ty, value, node.location)?;
                let target = escape_name(&name.lexeme);

                let folded = if constant {
                    let folded = value.constant.as_ref().and_then(|c| c.convert(&ty));
                    if folded.is_none() {
                        return Err(Violation::at(
                            format!("initializer of constant '{}' is not a compile-time constant", name.lexeme),
                            node.location,
                        )
                        .into());
                    }
                    lines.push(format!("const {} {} = {};", ty.to_cpp(), target, text));
                    folded
                } else if value.is_null() {
                    lines.push(format!("{} {}{{}};", ty.to_cpp(), target));
                    None
                } else {
                    lines.push(format!("{} {} = {};", ty.to_cpp(), target, text));
                    None
                };
                bindings.push((name.lexeme.clone(), ty, folded));
            }
        }

        let warnings = typer.into_warnings();
        self.report(warnings)?;
        for ((name, ty, folded), token) in bindings.into_iter().zip(&names) {
            self.declare(&name, ty, !constant, folded, token.location)
                .map_err(|v| v.or_at(token.location))?;
        }
        self.emit(lines);
        Ok(())
    }

    /// The single initializer when it is a multi-return call unpacked into `count` targets.
    fn multi_return(&self, typer: &mut Typer<'_>, values: &[Node], count: usize) -> Result<Option<Expression>, Failure> {
        let [node] = values else {
            return Ok(None);
        };
        if count < 2 || !matches!(node.kind, NodeKind::Variable { call: Some(_), .. }) {
            return Ok(None);
        }
        let call = typer.value(node)?;
        match &call.ty {
            Type::Tuple(members) if members.len() == count => Ok(Some(call)),
            Type::Tuple(members) => Err(Violation::at(
                format!("call returns {} values but {} targets were given", members.len(), count),
                node.location,
            )
            .into()),
            _ => Ok(None),
        }
    }

    /// `{ const auto _t0 = call; a = std::get<0>(_t0); ... }`
    fn destructure(
        &self,
        typer: &mut Typer<'_>,
        call: &Expression,
        targets: &[(String, Type)],
        location: SourceLocation,
    ) -> Result<Vec<String>, Failure> {
        let Type::Tuple(members) = &call.ty else {
            return Err(Violation::at("expected a multi-return call", location).into());
        };
        let inner = " ".repeat(self.options.indent);
        let mut lines = vec!["{".to_string(), format!("{inner}const auto {TEMPORARY} = {};", call.text)];
        for (i, ((target, ty), member)) in targets.iter().zip(members).enumerate() {
            let value = Expression::new(format!("std::get<{i}>({TEMPORARY})"), member.clone());
            let text = typer.converted(ty, &value, location)?;
            lines.push(format!("{inner}{target} = {text};"));
        }
        lines.push("}".to_string());
        Ok(lines)
    }

    fn operation(&mut self, instruction: &Instruction) -> Result<(), Failure> {
        let nodes = parse_expressions(&instruction.tokens)?;
        let mut typer = Typer::new(&self.scopes);
        let mut lines = Vec::new();
        for node in &nodes {
            let expr = typer.value(node)?;
            if !(expr.is_step || (expr.is_call && expr.ty.is_void())) {
                return Err(Violation::at("invalid operation: the value is never used", node.location).into());
            }
            lines.push(format!("{};", expr.text));
        }
        let warnings = typer.into_warnings();
        self.report(warnings)?;
        self.emit(lines);
        Ok(())
    }

    fn assignation(&mut self, instruction: &Instruction) -> Result<(), Failure> {
        let tokens = &instruction.tokens;
        let split = find_top_level(tokens, |k| k == TokenKind::Equal || k.is_compound_assign())
            .ok_or_else(|| Violation::new("expected an assignment"))?;
        let operator = &tokens[split];
        let targets = parse_expressions(require(&tokens[..split], operator, "an assignment target before")?)?;
        let values = parse_expressions(require(&tokens[split + 1..], operator, "a value after")?)?;

        let mut typer = Typer::new(&self.scopes);
        let mut places = Vec::new();
        for node in &targets {
            let place = typer.value(node)?;
            if place.place.is_none() {
                return Err(Violation::at("invalid assignment target", node.location).into());
            }
            check_modifiable(&place, node.location)?;
            places.push(place);
        }

        let lines = if operator.kind == TokenKind::Equal {
            if let Some(line) = swap(&targets, &values, &places)? {
                vec![line]
            } else if let Some(call) = self.multi_return(&mut typer, &values, places.len())? {
                let targets: Vec<(String, Type)> = places.iter().map(|p| (p.text.clone(), p.ty.clone())).collect();
                self.destructure(&mut typer, &call, &targets, values[0].location)?
            } else {
                check_counts(places.len(), &values)?;
                let mut lines = Vec::new();
                for (i, place) in places.iter().enumerate() {
                    let node = &values[if values.len() == 1 { 0 } else { i }];
                    let value = typer.initializer(node, Some(&place.ty))?;
                    let text = typer.converted(&place.ty, &value, node.location)?;
                    lines.push(format!("{} = {};", place.text, text));
                }
                lines
            }
        } else {
            check_counts(places.len(), &values)?;
            let mut lines = Vec::new();
            for (i, place) in places.iter().enumerate() {
                let node = &values[if values.len() == 1 { 0 } else { i }];
                let value = typer.value(node)?;
                lines.push(compound(&mut typer, operator, place, &value, node.location)?);
            }
            lines
        };

        let warnings = typer.into_warnings();
        self.report(warnings)?;
        self.emit(lines);
        Ok(())
    }

    fn structure(&mut self, instruction: &Instruction) -> Result<(), Failure> {
        let keyword = &instruction.tokens[0];
        let rest = &instruction.tokens[1..];
        let header = match keyword.kind {
            TokenKind::If => Header::Block {
                kind: ScopeKind::If,
                text: format!("if ({}) ", self.condition(rest, keyword)?),
                inline: false,
            },
            TokenKind::While => Header::Block {
                kind: ScopeKind::Loop,
                text: format!("while ({}) ", self.condition(rest, keyword)?),
                inline: false,
            },
            _ => self.for_header(rest, keyword)?,
        };
        self.pending = Some(header);
        Ok(())
    }

    fn else_header(&mut self, instruction: &Instruction, closed: Option<ScopeKind>) -> Result<(), Failure> {
        let keyword = &instruction.tokens[0];
        if closed != Some(ScopeKind::If) {
            return Err(Violation::at("'else' must follow the block of an 'if'", keyword.location).into());
        }
        let header = match instruction.tokens.get(1) {
            None => Header::Block {
                kind: ScopeKind::Else,
                text: "else ".to_string(),
                inline: true,
            },
            Some(next) if next.kind == TokenKind::If => Header::Block {
                kind: ScopeKind::If,
                text: format!("else if ({}) ", self.condition(&instruction.tokens[2..], next)?),
                inline: true,
            },
            Some(next) => {
                return Err(Violation::at(format!("unexpected '{}' after else", next.lexeme), next.location).into());
            }
        };
        if self.out.ends_with('\n') {
            self.out.pop();
        }
        self.pending = Some(header);
        Ok(())
    }

    fn condition(&mut self, tokens: &[Token], keyword: &Token) -> Result<String, Failure> {
        let node = parse_expression(require(tokens, keyword, "a condition after")?)?;
        let mut typer = Typer::new(&self.scopes);
        let expr = typer.value(&node)?;
        if expr.ty != Type::BOOL {
            return Err(Violation::at(format!("condition must be 'bool', found '{}'", expr.ty), node.location).into());
        }
        let warnings = typer.into_warnings();
        self.report(warnings)?;
        Ok(expr.text)
    }

    /// `for var i: T = init` or `for i = init`.
    fn for_header(&mut self, tokens: &[Token], keyword: &Token) -> Result<Header, Failure> {
        let tokens = require(tokens, keyword, "a loop variable after")?;
        let equal = find_top_level(tokens, |k| k == TokenKind::Equal)
            .ok_or_else(|| Violation::at("for variable needs an initial value", keyword.location))?;
        let init_tokens = require(&tokens[equal + 1..], &tokens[equal], "an initial value after")?;
        let init_node = parse_expression(init_tokens)?;
        let declares = tokens[0].kind == TokenKind::Var;
        if declares
            && let Some(name) = tokens.get(1).filter(|t| t.kind == TokenKind::Identifier)
            && self.scopes.lookup(&name.lexeme).is_some()
        {
            reject_shadowed_read(&name.lexeme, &init_node)?;
        }

        let mut typer = Typer::new(&self.scopes);
        let init = typer.value(&init_node)?;
        let header = if declares {
            let declaration = &tokens[1..equal];
            let name = match declaration.first() {
                Some(token) if token.kind == TokenKind::Identifier => token,
                _ => return Err(Violation::at("expected a loop variable name", tokens[0].location).into()),
            };
            let ty = match declaration.get(1) {
                None => init.ty.clone(),
                Some(colon) if colon.kind == TokenKind::Colon => {
                    let node = parse_type(require(&declaration[2..], colon, "a type after")?)?;
                    typer.resolve_type(&node)?
                }
                Some(other) => {
                    return Err(Violation::at(format!("unexpected '{}' in for header", other.lexeme), other.location).into());
                }
            };
            if !ty.is_numeric() {
                return Err(Violation::at(format!("loop variable must be numeric, found '{ty}'"), name.location).into());
            }
            let init = typer.converted(&ty, &init, init_node.location)?;
            Header::For {
                ty: ty.to_cpp(),
                name: escape_name(&name.lexeme),
                init,
                bound: None,
                step: None,
                variable: Some((name.lexeme.clone(), ty, name.location)),
                shadowed: self.scopes.lookup(&name.lexeme).map(|_| name.lexeme.clone()),
            }
        } else {
            let node = parse_expression(&tokens[..equal])?;
            if node.as_plain_variable().is_none() {
                return Err(Violation::at("loop variable must be a plain variable", node.location).into());
            }
            let variable = typer.value(&node)?;
            check_modifiable(&variable, node.location)?;
            if !variable.ty.is_numeric() {
                return Err(Violation::at(
                    format!("loop variable must be numeric, found '{}'", variable.ty),
                    node.location,
                )
                .into());
            }
            let init = typer.converted(&variable.ty, &init, init_node.location)?;
            Header::For {
                ty: String::new(),
                name: variable.text,
                init,
                bound: None,
                step: None,
                variable: None,
                shadowed: None,
            }
        };
        let warnings = typer.into_warnings();
        self.report(warnings)?;
        Ok(header)
    }

    fn for_clause(&mut self, instruction: &Instruction, is_step: bool) -> Result<(), Failure> {
        let node = parse_expression(&instruction.tokens)?;
        let mut typer = Typer::new(&self.scopes);
        let expr = typer.value(&node)?;
        let what = if is_step { "step" } else { "bound" };
        if !expr.ty.is_numeric() {
            return Err(Violation::at(format!("for {what} must be numeric, found '{}'", expr.ty), node.location).into());
        }
        if is_step && matches!(expr.constant, Some(ConstValue::Int(0))) {
            return Err(Violation::at("for step cannot be zero", node.location).into());
        }
        let warnings = typer.into_warnings();
        self.report(warnings)?;

        let Some(Header::For {
            bound, step, shadowed, ..
        }) = self.pending.as_mut()
        else {
            return Err(Violation::at(format!("unexpected for {what}"), node.location).into());
        };
        if let Some(name) = shadowed.as_deref()
            && mentions(&node, name)
        {
            return Err(Violation::at(
                format!("for {what} refers to the outer '{name}', which the loop variable shadows"),
                node.location,
            )
            .into());
        }
        *(if is_step { step } else { bound }) = Some(expr.text);
        Ok(())
    }

    fn jump(&mut self, instruction: &Instruction) -> Result<(), Failure> {
        let keyword = &instruction.tokens[0];
        if let Some(extra) = instruction.tokens.get(1) {
            return Err(Violation::at(
                format!("unexpected '{}' after {}", extra.lexeme, keyword.lexeme),
                extra.location,
            )
            .into());
        }
        if !self.scopes.in_loop() {
            return Err(Violation::at(format!("cannot use {} outside a loop", keyword.lexeme), keyword.location).into());
        }
        self.line(&format!("{};", keyword.lexeme));
        Ok(())
    }

    fn return_statement(&mut self, instruction: &Instruction) -> Result<(), Failure> {
        let keyword = &instruction.tokens[0];
        if !self.scopes.in_main() {
            return Err(Violation::at("return is only allowed inside main", keyword.location).into());
        }
        let value = match &instruction.tokens[1..] {
            [] => "0".to_string(),
            tokens => {
                let node = parse_expression(tokens)?;
                let mut typer = Typer::new(&self.scopes);
                let expr = typer.value(&node)?;
                if !expr.ty.is_integer() {
                    return Err(Violation::at(format!("main must return an integer, found '{}'", expr.ty), node.location).into());
                }
                expr.text
            }
        };
        self.line(&format!("return {value};"));
        Ok(())
    }

    fn declare(
        &mut self,
        name: &str,
        ty: Type,
        mutable: bool,
        constant: Option<ConstValue>,
        location: SourceLocation,
    ) -> Result<(), Violation> {
        let declared = match constant {
            Some(value) => self.scopes.declare_constant(name, ty, value)?,
            None => self.scopes.declare_variable(name, ty, mutable)?,
        };
        if declared == Declared::Shadowing {
            let warning = Diagnostic::warning(format!("'{name}' shadows a declaration of an enclosing scope"))
                .with_code(SHADOWING)
                .at(location);
            self.report(vec![warning])?;
        }
        Ok(())
    }

    /// Records warnings, or fails on the first one when warnings are denied.
    fn report(&mut self, warnings: Vec<Diagnostic>) -> Result<(), Violation> {
        for warning in warnings {
            if self.options.deny_warnings {
                return Err(Violation {
                    message: format!("{} (warnings are denied)", warning.message),
                    location: warning.location,
                });
            }
            self.diagnostics.push(warning);
        }
        Ok(())
    }

    fn emit(&mut self, lines: Vec<String>) {
        for line in lines {
            self.line(&line);
        }
    }

    fn line(&mut self, text: &str) {
        let indent = self.options.indent * self.scopes.depth();
        self.out.extend(std::iter::repeat_n(' ', indent));
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn end_of_input(&self, instructions: &[Instruction]) -> SourceLocation {
        match instructions.last().and_then(|i| i.tokens.last()) {
            Some(token) => token.location,
            None => SourceLocation::new(self.file.id, 1, 1),
        }
    }

    fn fail(&self, failure: Failure, instruction: &Instruction) -> CoreError {
        match failure {
            Failure::Syntax(err) => err.into_error(self.file),
            Failure::Violation(violation) => {
                let violation = violation.or_at(instruction.location());
                self.semantic(violation, &instruction.text())
            }
        }
    }

    fn semantic(&self, violation: Violation, instruction: &str) -> CoreError {
        let location = violation.location.unwrap_or(SourceLocation::new(self.file.id, 1, 1));
        CoreError::SemanticError {
            location,
            message: format!("{}: {}", self.file.describe(location), violation.message),
            instruction: instruction.to_string(),
        }
    }
}

/// Non-empty `tokens`, or a syntax error pointing just past `after`.
fn require<'t>(tokens: &'t [Token], after: &Token, what: &str) -> Result<&'t [Token], SyntaxError> {
    if tokens.is_empty() {
        let message = if what.ends_with("before") || what.ends_with("after") {
            format!("expected {what} '{}'", after.lexeme)
        } else {
            format!("expected {what}")
        };
        return Err(SyntaxError::new(message, after));
    }
    Ok(tokens)
}

fn inferred_type(value: &Expression, name: &str, location: SourceLocation) -> Result<Type, Violation> {
    match &value.ty {
        ty if ty.is_void() => Err(Violation::at(format!("cannot initialize '{name}' from a void expression"), location)),
        Type::Tuple(_) => Err(Violation::at(
            format!("cannot initialize '{name}' from a multi-return call"),
            location,
        )),
        ty => Ok(ty.clone()),
    }
}

fn check_counts(targets: usize, values: &[Node]) -> Result<(), Violation> {
    if values.len() == 1 || values.len() == targets {
        return Ok(());
    }
    let quantity = if values.len() > targets { "many" } else { "few" };
    Err(Violation::at(format!("too {quantity} values in assignment"), values[0].location))
}

/// `a, b = b, a` on two distinct plain variables.
fn swap(targets: &[Node], values: &[Node], places: &[Expression]) -> Result<Option<String>, Violation> {
    let names = |nodes: &[Node]| -> Option<Vec<String>> {
        nodes.iter().map(|n| n.as_plain_variable().map(str::to_string)).collect()
    };
    let (Some(left), Some(right)) = (names(targets), names(values)) else {
        return Ok(None);
    };
    if left.len() != 2 || right.len() != 2 || left[0] == left[1] || left[0] != right[1] || left[1] != right[0] {
        return Ok(None);
    }
    if places[0].ty != places[1].ty {
        return Err(Violation::at(
            format!(
                "cannot swap '{}' and '{}' of different types '{}' and '{}'",
                left[0], left[1], places[0].ty, places[1].ty
            ),
            targets[0].location,
        ));
    }
    Ok(Some(format!("std::swap({}, {});", places[0].text, places[1].text)))
}

fn compound(
    typer: &mut Typer<'_>,
    operator: &Token,
    place: &Expression,
    value: &Expression,
    location: SourceLocation,
) -> Result<String, Violation> {
    let target = &place.ty;
    let concatenation = operator.kind == TokenKind::PlusEqual
        && *target == Type::STR
        && matches!(value.ty.primitive(), Some(Primitive::Str | Primitive::Char));
    if concatenation {
        return Ok(format!("{} += {};", place.text, value.text));
    }
    if !target.is_numeric() || !value.ty.is_numeric() {
        return Err(Violation::at(
            format!("operator '{}' cannot be applied to '{}' and '{}'", operator.lexeme, target, value.ty),
            location,
        ));
    }
    if matches!(operator.kind, TokenKind::SlashEqual | TokenKind::PercentEqual)
        && target.is_integer()
        && value.constant == Some(ConstValue::Int(0))
    {
        return Err(Violation::at("division by zero", location));
    }
    typer.check_assign(target, value, location)?;
    let line = match operator.kind {
        TokenKind::PercentEqual => format!("{0} = rt::mod({0}, {1});", place.text, value.text),
        TokenKind::CaretEqual => format!(
            "{0} = static_cast<{2}>(rt::pow({0}, {1}));",
            place.text,
            value.text,
            target.to_cpp()
        ),
        _ => format!("{} {} {};", place.text, operator.lexeme, value.text),
    };
    Ok(line)
}

/// A new `name` is visible before its initializer runs in the generated
/// code, so the initializer may not read the outer `name` it hides.
fn reject_shadowed_read(name: &str, node: &Node) -> Result<(), Violation> {
    if mentions(node, name) {
        return Err(Violation::at(
            format!("initializer refers to the outer '{name}', which this declaration shadows"),
            node.location,
        ));
    }
    Ok(())
}

/// Whether `node` reads the variable `name` anywhere.
fn mentions(node: &Node, name: &str) -> bool {
    let any = |nodes: &[Node]| nodes.iter().any(|n| mentions(n, name));
    match &node.kind {
        NodeKind::Binary { left, right, .. } => mentions(left, name) || mentions(right, name),
        NodeKind::Unary { operand, .. } | NodeKind::Postfix { operand, .. } => mentions(operand, name),
        NodeKind::Variable {
            name: own,
            call,
            index,
            member,
        } => {
            (call.is_none() && own == name)
                || call.as_deref().is_some_and(any)
                || index
                    .as_ref()
                    .is_some_and(|index| index.levels().into_iter().flatten().any(|n| mentions(n, name)))
                || member.as_deref().is_some_and(|m| mentions(m, name))
        }
        NodeKind::Type { index, call, .. } => {
            call.as_deref().is_some_and(any)
                || index
                    .as_ref()
                    .is_some_and(|index| index.levels().into_iter().flatten().any(|n| mentions(n, name)))
        }
        NodeKind::Array(elements) => any(elements),
        NodeKind::Number(_) | NodeKind::Literal(_) | NodeKind::Nullptr => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::transpile;
    use crate::diagnostic::PRECISION_LOSS;

    fn compile(source: &str) -> Output {
        let artifact = transpile(source, "test.spr", &Options::default()).expect("transpile");
        Output {
            code: artifact.code,
            diagnostics: artifact.diagnostics,
        }
    }

    /// Generated statements inside `main`, without the fixed prologue and epilogue.
    fn body(source: &str) -> String {
        let code = compile(&format!("main {{\n{source}\n}}")).code;
        let lines: Vec<&str> = code.lines().collect();
        let inner = &lines[4..lines.len() - 2];
        inner.iter().map(|l| format!("{}\n", l.strip_prefix("    ").unwrap_or(l))).collect()
    }

    fn error(source: &str) -> CoreError {
        transpile(source, "test.spr", &Options::default()).unwrap_err()
    }

    fn semantic_message(source: &str) -> String {
        match error(source) {
            CoreError::SemanticError { message, .. } => message,
            other => panic!("expected a semantic error, got {other:?}"),
        }
    }

    fn warnings(source: &str) -> Vec<Diagnostic> {
        compile(&format!("main {{\n{source}\n}}"))
            .diagnostics
            .into_iter()
            .filter(Diagnostic::is_warning)
            .collect()
    }

    #[test]
    fn emits_main_with_args_and_return() {
        let output = compile("main {\n    var a: i32 = 1\n    println(\"{}\", a)\n}\n");
        let expected = "#include \"sprout_runtime.hpp\"\n\
                        \n\
                        int main(int argc, char** argv) {\n    \
                        const rt::vector<std::string> args = rt::make_args(argc, argv);\n    \
                        int32_t a = 1;\n    \
                        rt::println(std::string(\"{}\"), a);\n    \
                        return 0;\n\
                        }\n";
        assert_eq!(output.code, expected);
        assert!(output.diagnostics.iter().all(|d| !d.is_warning()));
    }

    #[test]
    fn swaps_two_variables() {
        assert_eq!(body("var a, b: i32 = 1, 2\na, b = b, a"), "int32_t a = 1;\nint32_t b = 2;\nstd::swap(a, b);\n");
    }

    #[test]
    fn swap_needs_matching_types() {
        let message = semantic_message("main {\nvar a: i32 = 1\nvar b: f64 = 2\na, b = b, a\n}");
        assert!(message.contains("cannot swap"));
    }

    #[test]
    fn pairwise_and_broadcast_assignment() {
        assert_eq!(body("var a, b: i32\na, b = 1, 2"), "int32_t a{};\nint32_t b{};\na = 1;\nb = 2;\n");
        assert_eq!(body("var a, b: i32\na, b = 7"), "int32_t a{};\nint32_t b{};\na = 7;\nb = 7;\n");
        assert!(semantic_message("main {\nvar a, b: i32\na, b = 1, 2, 3\n}").contains("too many values"));
    }

    #[test]
    fn pairwise_assignment_is_sequential() {
        assert_eq!(
            body("var a, b: i32 = 1, 2\na, b = b, a + 1"),
            "int32_t a = 1;\nint32_t b = 2;\na = b;\nb = a + 1;\n"
        );
    }

    #[test]
    fn one_initializer_applies_to_every_name() {
        assert_eq!(body("var x, y: f64 = 0"), "double x = 0;\ndouble y = 0;\n");
        assert!(semantic_message("main {\nvar x, y, z: i32 = 1, 2\n}").contains("too few initializers"));
    }

    #[test]
    fn declares_arrays_and_vectors() {
        assert_eq!(
            body("const N: i32 = 3\nvar grid: f64[N][]\nvar v: i32[] = [1, 2]"),
            "const int32_t N = 3;\nrt::array<rt::vector<double>, 3> grid{};\nrt::vector<int32_t> v = {1, 2};\n"
        );
        assert!(semantic_message("main {\nvar n: i32 = 3\nvar a: i32[n]\n}").contains("array size must be a constant"));
        assert!(semantic_message("main {\nvar a: i32[2] = [1, 2, 3]\n}").contains("too many elements"));
    }

    #[test]
    fn infers_types_from_initializers() {
        assert_eq!(body("var a = 2.5\nvar s = \"x\""), "double a = 2.5;\nstd::string s = std::string(\"x\");\n");
        assert!(semantic_message("main {\nvar a = null\n}").contains("cannot infer"));
        assert!(semantic_message("main {\nvar a: i32\nvar b = println(a)\n}").contains("void"));
    }

    #[test]
    fn null_initializes_to_default() {
        assert_eq!(body("var s: str = null\ns = null"), "std::string s{};\ns = {};\n");
    }

    #[test]
    fn constants_must_be_compile_time() {
        assert!(semantic_message("main {\nvar a: i32 = 1\nconst B: i32 = a\n}").contains("not a compile-time constant"));
        assert!(semantic_message("main {\nconst B: i32\n}").contains("needs an initializer"));
        assert!(semantic_message("main {\nconst B: i32 = 1\nB = 2\n}").contains("cannot modify constant 'B'"));
    }

    #[test]
    fn args_are_read_only() {
        assert!(semantic_message("main {\nargs = args\n}").contains("read-only"));
        assert_eq!(body("var n = args.len()"), "uint64_t n = args.len();\n");
    }

    #[test]
    fn narrowing_warns_and_widening_does_not() {
        let narrowing = warnings("var d: f64 = 1.5\nvar f: f32 = d");
        assert_eq!(narrowing.len(), 1);
        assert_eq!(narrowing[0].code, Some(PRECISION_LOSS));
        assert!(warnings("var f: f32 = 1.5f\nvar d: f64 = f").is_empty());
        assert!(warnings("var b: u8 = 200").is_empty());
        assert_eq!(warnings("var b: u8 = 300").len(), 1);
    }

    #[test]
    fn incompatible_assignment_fails() {
        let message = semantic_message("main {\nvar s: str = 1\n}");
        assert!(message.contains("cannot assign a value of type 'i32' to 'str'"));
        assert!(message.starts_with("test.spr:2:"));
    }

    #[test]
    fn redeclaration_fails_and_shadowing_warns() {
        assert!(semantic_message("main {\nvar x: i32\nvar x: i32\n}").contains("already declared"));
        let shadowing = warnings("var x: i32 = 1\nif x > 0 {\nvar x: f64 = 2\n}");
        assert_eq!(shadowing.len(), 1);
        assert_eq!(shadowing[0].code, Some(SHADOWING));
        assert!(semantic_message("main {\nvar x: i32 = 1\n{\nvar x = x + 1\n}\n}").contains("refers to the outer 'x'"));
    }

    #[test]
    fn compound_assignment_lowering() {
        assert_eq!(
            body("var a: i32 = 7\na += 2\na %= 3\na ^= 2"),
            "int32_t a = 7;\na += 2;\na = rt::mod(a, 3);\na = static_cast<int32_t>(rt::pow(a, 2));\n"
        );
        assert_eq!(body("var s = \"a\"\ns += 'b'"), "std::string s = std::string(\"a\");\ns += 'b';\n");
        assert!(semantic_message("main {\nvar b = true\nb += 1\n}").contains("operator '+='"));
    }

    #[test]
    fn indexed_targets_use_checked_access() {
        assert_eq!(
            body("var m: i32[2][2]\nm[1][0] = 5"),
            "rt::array<rt::array<int32_t, 2>, 2> m{};\nm.at(1).at(0) = 5;\n"
        );
    }

    #[test]
    fn destructures_multi_return_calls() {
        let code = body("var q: i32\nvar r: i64\nq, r = divmod(7, 2)");
        assert_eq!(
            code,
            "int32_t q{};\nint64_t r{};\n{\n    const auto _t0 = rt::divmod(7, 2);\n    \
             q = static_cast<int32_t>(std::get<0>(_t0));\n    r = std::get<1>(_t0);\n}\n"
        );
        assert_eq!(warnings("var q: i32\nvar r: i64\nq, r = divmod(7, 2)").len(), 1);
    }

    #[test]
    fn destructures_in_declarations() {
        let code = body("var q, r = divmod(7, 2)");
        assert_eq!(
            code,
            "int64_t q{};\nint64_t r{};\n{\n    const auto _t0 = rt::divmod(7, 2);\n    \
             q = std::get<0>(_t0);\n    r = std::get<1>(_t0);\n}\n"
        );
        assert!(semantic_message("main {\nvar a, b, c = divmod(7, 2)\n}").contains("returns 2 values"));
    }

    #[test]
    fn shadowing_declarations_cannot_read_the_outer_name() {
        let nested = |inner: &str| format!("main {{\nvar q: i64 = 9\nvar r: i64 = 4\n{{\n{inner}\n}}\n}}");
        assert!(semantic_message(&nested("var q, r = divmod(q, 2)")).contains("refers to the outer 'q'"));
        assert!(semantic_message(&nested("var q, r = divmod(7, r)")).contains("refers to the outer 'r'"));
        assert!(semantic_message(&nested("var a, q: i64 = 1, q")).contains("refers to the outer 'q'"));
        assert!(transpile(&nested("var a, b = divmod(q, r)"), "test.spr", &Options::default()).is_ok());
    }

    #[test]
    fn loop_variable_cannot_read_the_outer_name() {
        let with_outer = |header: &str| format!("main {{\nvar i: i32 = 3\n{header} {{\n}}\n}}");
        assert!(semantic_message(&with_outer("for var i: i32 = i; 10")).contains("refers to the outer 'i'"));
        assert!(semantic_message(&with_outer("for var i = 0; i")).contains("for bound refers to the outer 'i'"));
        assert!(semantic_message(&with_outer("for var i = 0; 10; i")).contains("for step refers to the outer 'i'"));
        let code = transpile(&with_outer("for var j = i; i * 2; i"), "test.spr", &Options::default())
            .expect("transpile")
            .code;
        assert!(code.contains("RT_FOR(int32_t, j, i, i * 2, i) {"));
        assert!(transpile(&with_outer("for i = i + 1; 10"), "test.spr", &Options::default()).is_ok());
    }

    #[test]
    fn if_else_chain_shares_lines_with_braces() {
        let code = body("var x: i32 = 3\nif x > 2 {\nx = 0\n} else if x == 2 {\nx--\n} else {\nx++\n}");
        assert_eq!(
            code,
            "int32_t x = 3;\nif (x > 2) {\n    x = 0;\n} else if (x == 2) {\n    x--;\n} else {\n    x++;\n}\n"
        );
    }

    #[test]
    fn else_needs_an_if_block() {
        assert!(semantic_message("main {\nwhile true {\n} else {\n}\n}").contains("'else' must follow"));
    }

    #[test]
    fn conditions_must_be_bool() {
        assert!(semantic_message("main {\nif 1 {\n}\n}").contains("condition must be 'bool'"));
    }

    #[test]
    fn for_loops_use_the_runtime_macro() {
        assert_eq!(
            body("for var i: i32 = 0; 10 {\nprintln(\"{}\", i)\n}"),
            "RT_FOR(int32_t, i, 0, 10, 1) {\n    rt::println(std::string(\"{}\"), i);\n}\n"
        );
        assert_eq!(
            body("var i: i64\nfor i = 10; 0; -2 {\n}"),
            "int64_t i{};\nRT_FOR(, i, 10, 0, -2) {\n}\n"
        );
        assert!(semantic_message("main {\nfor var i: i32 = 0; 10 {\n}\ni = 1\n}").contains("unknown identifier 'i'"));
        assert!(semantic_message("main {\nfor var i = 0; 10; 0 {\n}\n}").contains("step cannot be zero"));
    }

    #[test]
    fn break_outside_a_loop_fails() {
        assert!(semantic_message("main {\nbreak\n}").contains("cannot use break outside a loop"));
        assert!(semantic_message("main {\nif true {\ncontinue\n}\n}").contains("cannot use continue outside a loop"));
        assert_eq!(body("while true {\nif true {\nbreak\n}\n}"), "while (true) {\n    if (true) {\n        break;\n    }\n}\n");
    }

    #[test]
    fn operations_must_have_effects() {
        assert_eq!(body("var i: i32\ni++, println()"), "int32_t i{};\ni++;\nrt::println();\n");
        assert!(semantic_message("main {\nvar i: i32\ni + 1\n}").contains("invalid operation"));
    }

    #[test]
    fn return_is_only_allowed_in_main() {
        assert_eq!(body("return 3"), "return 3;\n");
        assert!(semantic_message("main {\nreturn 1.5\n}").contains("must return an integer"));
    }

    #[test]
    fn reserved_names_are_escaped() {
        assert_eq!(body("var int: i32 = 1\nvar _x = int"), "int32_t _uint = 1;\nint32_t _u_x = _uint;\n");
    }

    #[test]
    fn structural_errors() {
        assert!(semantic_message("main {\n}\nmain {\n}").contains("duplicate main"));
        assert!(semantic_message("main {\n}\n}").contains("unexpected '}'"));
        assert!(semantic_message("main {\nvar a: i32").contains("missing '}'"));
        assert!(semantic_message("main\nvar a: i32").contains("expected '{'"));
        assert!(semantic_message("var a: i32\na = 1").contains("statements must appear inside main"));
    }

    #[test]
    fn global_declarations_precede_main() {
        let code = compile("const LIMIT: i64 = 10\nmain {\nvar x = LIMIT * 2\n}").code;
        assert!(code.contains("\nconst int64_t LIMIT = 10;\nint main"));
        assert!(code.contains("    int64_t x = LIMIT * 2;\n"));
    }

    #[test]
    fn deny_warnings_turns_the_first_warning_into_an_error() {
        let options = Options {
            deny_warnings: true,
            ..Options::default()
        };
        let err = transpile("main {\nvar f: f32 = 1.5\n}", "test.spr", &options).unwrap_err();
        assert!(matches!(err, CoreError::SemanticError { ref message, .. } if message.contains("warnings are denied")));
    }
}
