// eva-vm - Scope analysis pass
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Scope analysis: variable resolution and closure-capture promotion.
//!
//! A single recursive pre-pass over the expression tree. Every
//! scope-introducing form (block, function, lambda, class) gets a scope
//! record; the records are collected in pre-order so the code generator
//! can consume them with a cursor while walking the same tree.
//!
//! Resolution walks the parent chain. Crossing a function boundary
//! without finding the binding turns the resolution into a *cell*
//! (heap-allocated, shared with the owning scope); reaching the global
//! scope turns it into a *global*. Promotion records the name as an own
//! cell in the owning scope and as a free variable in every scope in
//! between, which is what lets closures share state with their creators.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use eva_parser::Exp;

use crate::error::{CompileError, CompileResult};

/// The kind of a scope-introducing expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    Class,
}

/// How a variable is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    Global,
    Local,
    Cell,
}

/// Shared handle to a scope record.
pub type ScopeRef = Rc<RefCell<Scope>>;

/// A scope record.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeRef>,
    /// Resolved allocation kind per name referenced or declared here.
    pub alloc_info: HashMap<String, AllocKind>,
    /// Names captured from enclosing function scopes.
    pub free: BTreeSet<String>,
    /// Names owned here but captured by some inner closure.
    pub cells: BTreeSet<String>,
}

impl Scope {
    pub fn new(kind: ScopeKind, parent: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            kind,
            parent,
            alloc_info: HashMap::new(),
            free: BTreeSet::new(),
            cells: BTreeSet::new(),
        }))
    }

    /// Register a declaration: local, or global when this is the global scope.
    pub fn add_local(&mut self, name: &str) {
        let kind = if self.kind == ScopeKind::Global {
            AllocKind::Global
        } else {
            AllocKind::Local
        };
        self.alloc_info.insert(name.to_string(), kind);
    }

    /// Register an own cell.
    pub fn add_cell(&mut self, name: &str) {
        self.cells.insert(name.to_string());
        self.alloc_info.insert(name.to_string(), AllocKind::Cell);
    }

    /// Register a free variable (a cell owned by an enclosing scope).
    pub fn add_free(&mut self, name: &str) {
        self.free.insert(name.to_string());
        self.alloc_info.insert(name.to_string(), AllocKind::Cell);
    }
}

/// Resolve a name in the scope chain.
///
/// The allocation kind starts out as the caller's assumption and is
/// upgraded while walking: to `Cell` when the walk leaves a function
/// scope, to `Global` when the walk enters the global scope. Returns the
/// owning scope and the final kind, or `None` when no scope binds the
/// name.
fn resolve(scope: &ScopeRef, name: &str, mut kind: AllocKind) -> Option<(ScopeRef, AllocKind)> {
    if scope.borrow().alloc_info.contains_key(name) {
        return Some((Rc::clone(scope), kind));
    }
    if scope.borrow().kind == ScopeKind::Function {
        kind = AllocKind::Cell;
    }
    let parent = scope.borrow().parent.clone()?;
    if parent.borrow().kind == ScopeKind::Global {
        kind = AllocKind::Global;
    }
    resolve(&parent, name, kind)
}

/// Potentially promote a referenced variable from local to cell.
///
/// Unbound names resolve as globals here; the code generator raises the
/// reference error if the global table has no such name either (this is
/// what lets preregistered natives resolve without scope entries).
fn maybe_promote(scope: &ScopeRef, name: &str) -> CompileResult<()> {
    let initial = {
        let s = scope.borrow();
        let default = if s.kind == ScopeKind::Global {
            AllocKind::Global
        } else {
            AllocKind::Local
        };
        s.alloc_info.get(name).copied().unwrap_or(default)
    };
    // Already promoted
    if initial == AllocKind::Cell {
        return Ok(());
    }
    match resolve(scope, name, initial) {
        Some((owner, kind)) => {
            scope
                .borrow_mut()
                .alloc_info
                .insert(name.to_string(), kind);
            if kind == AllocKind::Cell {
                promote(scope, name, &owner)?;
            }
            Ok(())
        }
        None => {
            scope
                .borrow_mut()
                .alloc_info
                .insert(name.to_string(), AllocKind::Global);
            Ok(())
        }
    }
}

/// Promote a variable from the stack to the heap: the owner records it
/// as an own cell, and every scope between the reference and the owner
/// records it as free.
fn promote(scope: &ScopeRef, name: &str, owner: &ScopeRef) -> CompileResult<()> {
    owner.borrow_mut().add_cell(name);
    let mut current = Rc::clone(scope);
    while !Rc::ptr_eq(&current, owner) {
        if current.borrow().kind == ScopeKind::Class {
            return Err(CompileError::Syntax(format!(
                "method cannot capture enclosing variable '{}'",
                name
            )));
        }
        current.borrow_mut().add_free(name);
        let parent = current.borrow().parent.clone().ok_or_else(|| {
            CompileError::Internal(format!("promotion of '{}' escaped the scope chain", name))
        })?;
        current = parent;
    }
    Ok(())
}

/// The scope analyzer. Walks the tree once and collects a pre-order
/// list of scope records for the code generator.
pub struct Analyzer {
    records: Vec<ScopeRef>,
}

impl Analyzer {
    /// Analyze a program and return the scope records in pre-order of
    /// the scope-introducing expressions.
    pub fn analyze(program: &Exp) -> CompileResult<Vec<ScopeRef>> {
        let mut analyzer = Analyzer {
            records: Vec::new(),
        };
        analyzer.analyze_exp(program, None)?;
        Ok(analyzer.records)
    }

    fn analyze_exp(&mut self, exp: &Exp, scope: Option<&ScopeRef>) -> CompileResult<()> {
        match exp {
            Exp::Number(_) | Exp::Str(_) => Ok(()),
            Exp::Symbol(name) => {
                if name == "true" || name == "false" {
                    return Ok(());
                }
                match scope {
                    Some(scope) => maybe_promote(scope, name),
                    None => Ok(()),
                }
            }
            Exp::List(items) => self.analyze_list(items, scope),
        }
    }

    fn analyze_list(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        let Some(head) = items.first().and_then(Exp::as_symbol) else {
            // Inline lambda call or other computed callee
            for item in items {
                self.analyze_exp(item, scope)?;
            }
            return Ok(());
        };

        match head {
            "begin" => self.analyze_block(items, scope),
            "var" => self.analyze_var(items, scope),
            "set" => self.analyze_set(items, scope),
            "if" => self.analyze_if(items, scope),
            "while" => self.analyze_while(items, scope),
            "def" => self.analyze_def(items, scope),
            "lambda" => self.analyze_lambda(items, scope),
            "class" => self.analyze_class(items, scope),
            "prop" => self.analyze_prop(items, scope),
            "new" => self.analyze_new(items, scope),
            "super" => self.analyze_super(items),
            "+" | "-" | "*" | "/" | "<" | ">" | "==" | ">=" | "<=" | "!=" => {
                expect_len(items, 3, head)?;
                self.analyze_exp(&items[1], scope)?;
                self.analyze_exp(&items[2], scope)
            }
            _ => {
                // Function call: the head is an ordinary variable reference
                for item in items {
                    self.analyze_exp(item, scope)?;
                }
                Ok(())
            }
        }
    }

    fn analyze_block(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        let kind = match scope {
            None => ScopeKind::Global,
            Some(_) => ScopeKind::Block,
        };
        let block = Scope::new(kind, scope.cloned());
        self.records.push(Rc::clone(&block));
        for child in &items[1..] {
            self.analyze_exp(child, Some(&block))?;
        }
        Ok(())
    }

    fn analyze_var(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        expect_len(items, 3, "var")?;
        let name = symbol_operand(&items[1], "var name")?;
        if let Some(scope) = scope {
            scope.borrow_mut().add_local(name);
        }
        // A lambda initializer is a named function: the variable's name
        // becomes its slot 0, so it can call itself recursively
        let init = &items[2];
        if init.is_tagged("lambda") {
            let lambda = init.as_list().unwrap_or_default();
            expect_len(lambda, 3, "lambda")?;
            return self.analyze_function_scope(Some(name), &lambda[1], &lambda[2], scope);
        }
        self.analyze_exp(init, scope)
    }

    fn analyze_set(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        expect_len(items, 3, "set")?;
        match &items[1] {
            Exp::Symbol(name) => {
                if let Some(scope) = scope {
                    maybe_promote(scope, name)?;
                }
            }
            target if target.is_tagged("prop") => {
                let prop = target.as_list().unwrap_or_default();
                expect_len(prop, 3, "prop")?;
                symbol_operand(&prop[2], "property name")?;
                self.analyze_exp(&prop[1], scope)?;
            }
            _ => {
                return Err(CompileError::Syntax(
                    "set target must be a variable or (prop obj name)".into(),
                ));
            }
        }
        self.analyze_exp(&items[2], scope)
    }

    fn analyze_if(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        if items.len() != 3 && items.len() != 4 {
            return Err(CompileError::Syntax(
                "if expects (if test consequent [alternate])".into(),
            ));
        }
        for child in &items[1..] {
            self.analyze_exp(child, scope)?;
        }
        Ok(())
    }

    fn analyze_while(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        expect_len(items, 3, "while")?;
        self.analyze_exp(&items[1], scope)?;
        self.analyze_exp(&items[2], scope)
    }

    fn analyze_def(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        expect_len(items, 4, "def")?;
        let name = symbol_operand(&items[1], "def name")?;
        if let Some(scope) = scope {
            scope.borrow_mut().add_local(name);
        }
        self.analyze_function_scope(Some(name), &items[2], &items[3], scope)
    }

    fn analyze_lambda(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        expect_len(items, 3, "lambda")?;
        self.analyze_function_scope(None, &items[1], &items[2], scope)
    }

    fn analyze_function_scope(
        &mut self,
        name: Option<&str>,
        params: &Exp,
        body: &Exp,
        scope: Option<&ScopeRef>,
    ) -> CompileResult<()> {
        let function = Scope::new(ScopeKind::Function, scope.cloned());
        self.records.push(Rc::clone(&function));
        if let Some(name) = name {
            // Local slot 0, so the function can call itself by name
            function.borrow_mut().add_local(name);
        }
        for param in param_names(params)? {
            function.borrow_mut().add_local(param);
        }
        self.analyze_exp(body, Some(&function))
    }

    fn analyze_class(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        if items.len() < 3 {
            return Err(CompileError::Syntax(
                "class expects (class Name Super member...)".into(),
            ));
        }
        let name = symbol_operand(&items[1], "class name")?;
        symbol_operand(&items[2], "superclass")?;
        if let Some(scope) = scope {
            scope.borrow_mut().add_local(name);
        }
        let class = Scope::new(ScopeKind::Class, scope.cloned());
        self.records.push(Rc::clone(&class));
        for member in class_members(items) {
            self.analyze_exp(member, Some(&class))?;
        }
        Ok(())
    }

    fn analyze_prop(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        expect_len(items, 3, "prop")?;
        symbol_operand(&items[2], "property name")?;
        self.analyze_exp(&items[1], scope)
    }

    fn analyze_new(&mut self, items: &[Exp], scope: Option<&ScopeRef>) -> CompileResult<()> {
        if items.len() < 2 {
            return Err(CompileError::Syntax("new expects (new Class arg...)".into()));
        }
        for child in &items[1..] {
            self.analyze_exp(child, scope)?;
        }
        Ok(())
    }

    fn analyze_super(&mut self, items: &[Exp]) -> CompileResult<()> {
        expect_len(items, 2, "super")?;
        symbol_operand(&items[1], "super class name")?;
        // Resolved through the compiler's class list, not the scope chain
        Ok(())
    }
}

/// Class members: either the direct tail of the class form, or the
/// children of a single `(begin ...)` wrapper. The code generator uses
/// the same helper so both passes walk identical member lists.
pub fn class_members(items: &[Exp]) -> &[Exp] {
    let body = &items[3..];
    if let [single] = body
        && single.is_tagged("begin")
    {
        if let Some(inner) = single.as_list() {
            return &inner[1..];
        }
    }
    body
}

/// Parameter names of a `(params...)` list.
pub fn param_names(params: &Exp) -> CompileResult<Vec<&str>> {
    let items = params
        .as_list()
        .ok_or_else(|| CompileError::Syntax("parameter list must be a list".into()))?;
    items
        .iter()
        .map(|p| {
            p.as_symbol()
                .ok_or_else(|| CompileError::Syntax("parameters must be symbols".into()))
        })
        .collect()
}

fn expect_len(items: &[Exp], len: usize, form: &str) -> CompileResult<()> {
    if items.len() != len {
        return Err(CompileError::Syntax(format!(
            "{} expects {} operands",
            form,
            len - 1
        )));
    }
    Ok(())
}

fn symbol_operand<'a>(exp: &'a Exp, what: &str) -> CompileResult<&'a str> {
    exp.as_symbol()
        .ok_or_else(|| CompileError::Syntax(format!("{} must be a symbol", what)))
}

// ============================================================================
// Tests
// ============================================================================
