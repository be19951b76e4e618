// eva-vm - Bytecode code generator
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Code generation: tree-directed emission into code objects.
//!
//! The generator walks the expression tree a second time, consuming the
//! analyzer's scope records in the same pre-order. Each function gets
//! its own code object; forward jumps are emitted with placeholder
//! operands and patched with absolute 16-bit big-endian offsets once the
//! target is known.
//!
//! Compile-time allocations (interned strings, code objects, functions
//! built for non-closures, native objects, classes) are tracked in the
//! constant-object set, which the VM later treats as GC roots.

use std::rc::Rc;

use eva_parser::Exp;

use crate::error::{CompileError, CompileResult};
use crate::global::GlobalTable;
use crate::heap::Heap;
use crate::opcode::{CompareOp, Opcode};
use crate::value::{CodeObject, FunctionObject, Object, ObjRef, Value};

use super::analysis::{AllocKind, Analyzer, ScopeRef, class_members, param_names};

/// The output of a compilation: the entry-point function plus the
/// object sets the VM needs for rooting and diagnostics.
#[derive(Debug)]
pub struct Compilation {
    /// The "main" function wrapping the top-level code object.
    pub main_fn: ObjRef,
    /// Every compile-time heap allocation (kept alive as GC roots).
    pub constant_objects: Vec<ObjRef>,
    /// All code objects, in creation order (for the disassembler).
    pub code_objects: Vec<ObjRef>,
}

/// Net stack effect of a block statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    /// Left one value on the stack.
    Value,
    /// Left one value that is a declared local's slot.
    LocalSlot,
    /// Left nothing (cell declarations store straight to the heap).
    Nothing,
}

/// The bytecode compiler. Emits into a current code object `co`, with a
/// stack of scope records matching the nesting being emitted.
pub struct Compiler<'a> {
    heap: &'a mut Heap,
    global: &'a mut GlobalTable,
    /// Scope records from the analyzer, consumed in pre-order.
    scopes: Vec<ScopeRef>,
    cursor: usize,
    scope_stack: Vec<ScopeRef>,
    /// Currently compiling code object.
    co: ObjRef,
    /// Top-level code object (the only one without a function epilogue).
    main_co: ObjRef,
    code_objects: Vec<ObjRef>,
    constant_objects: Vec<ObjRef>,
    /// Classes compiled so far, for superclass and `super` resolution.
    classes: Vec<ObjRef>,
}

impl<'a> Compiler<'a> {
    pub fn new(heap: &'a mut Heap, global: &'a mut GlobalTable) -> Self {
        Compiler {
            heap,
            global,
            scopes: Vec::new(),
            cursor: 0,
            scope_stack: Vec::new(),
            co: ObjRef::NONE,
            main_co: ObjRef::NONE,
            code_objects: Vec::new(),
            constant_objects: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Compile a whole program (normally a `(begin ...)` wrapper).
    pub fn compile(mut self, program: &Exp) -> CompileResult<Compilation> {
        self.scopes = Analyzer::analyze(program)?;

        self.co = self.create_code_object("main", 0);
        self.main_co = self.co;

        self.compile_expr(program)?;
        self.emit(Opcode::Halt);

        let main_fn = self.alloc_tracked(Object::Function(FunctionObject {
            co: self.main_co,
            cells: Vec::new(),
        }));

        if self.cursor != self.scopes.len() {
            return Err(CompileError::Internal(
                "scope records out of sync with code generation".into(),
            ));
        }

        Ok(Compilation {
            main_fn,
            constant_objects: self.constant_objects,
            code_objects: self.code_objects,
        })
    }

    // ========================================================================
    // Expression dispatch
    // ========================================================================

    fn compile_expr(&mut self, exp: &Exp) -> CompileResult<()> {
        match exp {
            Exp::Number(n) => {
                let index = self.number_const(*n);
                self.emit_with_index(Opcode::Const, index, CompileError::TooManyConstants)
            }
            Exp::Str(s) => {
                let s = s.clone();
                let index = self.string_const(&s);
                self.emit_with_index(Opcode::Const, index, CompileError::TooManyConstants)
            }
            Exp::Symbol(name) => self.compile_symbol(name),
            Exp::List(items) => self.compile_list(items),
        }
    }

    fn compile_symbol(&mut self, name: &str) -> CompileResult<()> {
        if name == "true" || name == "false" {
            let index = self.boolean_const(name == "true");
            return self.emit_with_index(Opcode::Const, index, CompileError::TooManyConstants);
        }

        match self.lookup_kind(name) {
            AllocKind::Local => {
                let slot = self.co().local_index(name).ok_or_else(|| {
                    CompileError::Internal(format!("local '{}' missing from locals table", name))
                })?;
                self.emit_with_index(Opcode::GetLocal, slot, CompileError::TooManyLocals)
            }
            AllocKind::Cell => {
                let index = self
                    .co()
                    .cell_index(name)
                    .ok_or_else(|| CompileError::Reference(name.to_string()))?;
                self.emit_with_index(Opcode::GetCell, index, CompileError::TooManyCells)
            }
            AllocKind::Global => {
                let index = self
                    .global
                    .get_index(name)
                    .ok_or_else(|| CompileError::Reference(name.to_string()))?;
                self.emit_with_index(Opcode::GetGlobal, index, CompileError::TooManyGlobals)
            }
        }
    }

    fn compile_list(&mut self, items: &[Exp]) -> CompileResult<()> {
        if items.is_empty() {
            return Err(CompileError::Syntax("cannot call an empty list".into()));
        }

        if let Some(head) = items[0].as_symbol() {
            match head {
                "+" => return self.compile_binary(items, Opcode::Add),
                "-" => return self.compile_binary(items, Opcode::Sub),
                "*" => return self.compile_binary(items, Opcode::Mul),
                "/" => return self.compile_binary(items, Opcode::Div),
                "<" | ">" | "==" | ">=" | "<=" | "!=" => {
                    return self.compile_compare(items, head);
                }
                "if" => return self.compile_if(items),
                "while" => return self.compile_while(items),
                "var" => return self.compile_var(items, true).map(|_| ()),
                "set" => return self.compile_set(items),
                "begin" => return self.compile_block(items),
                "def" => return self.compile_def(items, true).map(|_| ()),
                "lambda" => return self.compile_function("lambda", &items[1], &items[2]),
                "class" => return self.compile_class(items).map(|_| ()),
                "prop" => return self.compile_prop(items),
                "new" => return self.compile_new(items),
                "super" => return self.compile_super(items),
                _ => {}
            }
        }

        // Named or inline-lambda function call
        self.compile_call(items)
    }

    fn compile_binary(&mut self, items: &[Exp], op: Opcode) -> CompileResult<()> {
        self.compile_expr(&items[1])?;
        self.compile_expr(&items[2])?;
        self.emit(op);
        Ok(())
    }

    fn compile_compare(&mut self, items: &[Exp], operator: &str) -> CompileResult<()> {
        let sub_op = CompareOp::from_symbol(operator).ok_or_else(|| {
            CompileError::Internal(format!("unknown comparison operator '{}'", operator))
        })?;
        self.compile_expr(&items[1])?;
        self.compile_expr(&items[2])?;
        self.emit(Opcode::Compare);
        self.emit_byte(sub_op as u8);
        Ok(())
    }

    /// (if test consequent [alternate])
    fn compile_if(&mut self, items: &[Exp]) -> CompileResult<()> {
        self.compile_expr(&items[1])?;

        self.emit(Opcode::JmpIfFalse);
        let else_jump = self.reserve_jump_operand();

        self.compile_expr(&items[2])?;
        self.emit(Opcode::Jmp);
        let end_jump = self.reserve_jump_operand();

        let else_target = self.offset();
        self.patch_jump(else_jump, else_target)?;

        if let Some(alternate) = items.get(3) {
            self.compile_expr(alternate)?;
        } else {
            // Keep the stack balanced when the test fails
            let index = self.boolean_const(false);
            self.emit_with_index(Opcode::Const, index, CompileError::TooManyConstants)?;
        }

        let end_target = self.offset();
        self.patch_jump(end_jump, end_target)?;
        Ok(())
    }

    /// (while test body)
    fn compile_while(&mut self, items: &[Exp]) -> CompileResult<()> {
        let loop_start = self.offset();
        self.compile_expr(&items[1])?;

        self.emit(Opcode::JmpIfFalse);
        let exit_jump = self.reserve_jump_operand();

        self.compile_expr(&items[2])?;
        // Each iteration's value is discarded
        self.emit(Opcode::Pop);
        self.emit(Opcode::Jmp);
        let back_jump = self.reserve_jump_operand();
        self.patch_jump(back_jump, loop_start)?;

        let exit_target = self.offset();
        self.patch_jump(exit_jump, exit_target)?;

        // The loop's value
        let index = self.boolean_const(false);
        self.emit_with_index(Opcode::Const, index, CompileError::TooManyConstants)
    }

    /// (var name initializer)
    fn compile_var(&mut self, items: &[Exp], keep_value: bool) -> CompileResult<Effect> {
        let name = items[1]
            .as_symbol()
            .ok_or_else(|| CompileError::Syntax("var name must be a symbol".into()))?
            .to_string();

        // A lambda initializer takes the variable's name
        let init = &items[2];
        if init.is_tagged("lambda") {
            let lambda = init.as_list().unwrap_or_default();
            self.compile_function(&name, &lambda[1], &lambda[2])?;
        } else {
            self.compile_expr(init)?;
        }

        self.bind_declaration(&name, keep_value)
    }

    /// (def name (params) body)
    fn compile_def(&mut self, items: &[Exp], keep_value: bool) -> CompileResult<Effect> {
        let name = items[1]
            .as_symbol()
            .ok_or_else(|| CompileError::Syntax("def name must be a symbol".into()))?
            .to_string();
        self.compile_function(&name, &items[2], &items[3])?;
        self.bind_declaration(&name, keep_value)
    }

    /// Bind the value on top of the stack to a freshly declared name.
    fn bind_declaration(&mut self, name: &str, keep_value: bool) -> CompileResult<Effect> {
        match self.lookup_kind(name) {
            AllocKind::Global => {
                let index = self.global.define(name);
                self.emit_with_index(Opcode::SetGlobal, index, CompileError::TooManyGlobals)?;
                Ok(Effect::Value)
            }
            AllocKind::Cell => {
                let index = match self.co().cell_index(name) {
                    Some(index) => index,
                    None => {
                        let co = self.co_mut();
                        co.cell_names.push(name.to_string());
                        co.cell_names.len() - 1
                    }
                };
                self.emit_with_index(Opcode::SetCell, index, CompileError::TooManyCells)?;
                if keep_value {
                    Ok(Effect::Value)
                } else {
                    // The value now lives on the heap; release the stack slot
                    self.emit(Opcode::Pop);
                    Ok(Effect::Nothing)
                }
            }
            AllocKind::Local => {
                // The initializer's value on the stack becomes the local
                self.co_mut().add_local(name);
                Ok(Effect::LocalSlot)
            }
        }
    }

    /// (set name value) or (set (prop obj name) value)
    fn compile_set(&mut self, items: &[Exp]) -> CompileResult<()> {
        let target = &items[1];

        if target.is_tagged("prop") {
            let prop = target.as_list().unwrap_or_default();
            let name = prop[2]
                .as_symbol()
                .ok_or_else(|| CompileError::Syntax("property name must be a symbol".into()))?
                .to_string();
            self.compile_expr(&items[2])?; // value
            self.compile_expr(&prop[1])?; // receiver
            let index = self.string_const(&name);
            return self.emit_with_index(Opcode::SetProp, index, CompileError::TooManyConstants);
        }

        let name = target
            .as_symbol()
            .ok_or_else(|| CompileError::Syntax("set target must be a symbol".into()))?
            .to_string();
        self.compile_expr(&items[2])?;

        match self.lookup_kind(&name) {
            AllocKind::Local => {
                let slot = self
                    .co()
                    .local_index(&name)
                    .ok_or_else(|| CompileError::Reference(name.clone()))?;
                self.emit_with_index(Opcode::SetLocal, slot, CompileError::TooManyLocals)
            }
            AllocKind::Cell => {
                let index = self
                    .co()
                    .cell_index(&name)
                    .ok_or_else(|| CompileError::Reference(name.clone()))?;
                self.emit_with_index(Opcode::SetCell, index, CompileError::TooManyCells)
            }
            AllocKind::Global => {
                let index = self
                    .global
                    .get_index(&name)
                    .ok_or_else(|| CompileError::Reference(name.clone()))?;
                self.emit_with_index(Opcode::SetGlobal, index, CompileError::TooManyGlobals)
            }
        }
    }

    /// (begin e1 ... en)
    fn compile_block(&mut self, items: &[Exp]) -> CompileResult<()> {
        let record = self.next_scope_record()?;
        self.scope_stack.push(record);
        self.co_mut().scope_level += 1;

        let body = &items[1..];
        if body.is_empty() {
            // An empty block still produces a value
            let index = self.boolean_const(false);
            self.emit_with_index(Opcode::Const, index, CompileError::TooManyConstants)?;
        }
        for (i, child) in body.iter().enumerate() {
            let last = i == body.len() - 1;
            let effect = self.compile_statement(child, last)?;
            // Keep the stack balanced: the last expression's value is the
            // block's value, local slots stay until scope exit
            if !last && effect == Effect::Value {
                self.emit(Opcode::Pop);
            }
        }

        self.exit_scope()?;
        self.scope_stack.pop();
        Ok(())
    }

    fn compile_statement(&mut self, exp: &Exp, last: bool) -> CompileResult<Effect> {
        if let Exp::List(items) = exp {
            match items.first().and_then(Exp::as_symbol) {
                Some("var") => return self.compile_var(items, last),
                Some("def") => return self.compile_def(items, last),
                Some("class") => return self.compile_class(items),
                _ => {}
            }
        }
        self.compile_expr(exp)?;
        Ok(Effect::Value)
    }

    /// Emit `OP_SCOPE_EXIT` for the locals declared at the current depth.
    /// Function bodies also clean up the arguments and the function slot.
    fn exit_scope(&mut self) -> CompileResult<()> {
        let mut count = self.locals_count_on_exit();
        if self.is_function_body() {
            count += self.co().arity + 1;
        }
        if count > 0 {
            self.emit(Opcode::ScopeExit);
            self.emit_index(count, CompileError::TooManyLocals)?;
        }
        self.co_mut().scope_level -= 1;
        Ok(())
    }

    fn locals_count_on_exit(&mut self) -> usize {
        let co = self.co_mut();
        let level = co.scope_level;
        let mut count = 0;
        while co
            .locals
            .last()
            .is_some_and(|local| local.scope_level == level)
        {
            co.locals.pop();
            count += 1;
        }
        count
    }

    fn is_function_body(&self) -> bool {
        self.co != self.main_co && self.co().scope_level == 1
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Compile `(def name (params) body)` / `(lambda (params) body)` into
    /// its own code object, then emit the code that produces the function
    /// value in the enclosing code object: a plain constant for
    /// non-closures, `OP_LOAD_CELL* OP_CONST OP_MAKE_FUNCTION` for
    /// closures.
    fn compile_function(&mut self, name: &str, params: &Exp, body: &Exp) -> CompileResult<()> {
        let record = self.next_scope_record()?;
        let (co_ref, free_names) = self.compile_function_body(name, params, body, &record)?;

        // The code object is a constant of the enclosing code object
        let co_const = self.add_const_to(self.co, Value::Obj(co_ref));

        if free_names.is_empty() {
            // Non-closure: build the function at compile time and replace
            // the code-object constant with it
            let function = self.alloc_tracked(Object::Function(FunctionObject {
                co: co_ref,
                cells: Vec::new(),
            }));
            if let Some(co) = self.heap.code_mut(self.co) {
                co.constants[co_const] = Value::Obj(function);
            }
            self.emit_with_index(Opcode::Const, co_const, CompileError::TooManyConstants)
        } else {
            // Closure: capture the free cells at runtime
            for free in &free_names {
                let index = self
                    .co()
                    .cell_index(free)
                    .ok_or_else(|| CompileError::Reference(free.clone()))?;
                self.emit_with_index(Opcode::LoadCell, index, CompileError::TooManyCells)?;
            }
            self.emit_with_index(Opcode::Const, co_const, CompileError::TooManyConstants)?;
            self.emit(Opcode::MakeFunction);
            self.emit_index(free_names.len(), CompileError::TooManyCells)
        }
    }

    /// Shared function-body compilation. Returns the new code object and
    /// its free-variable names (in cell order).
    fn compile_function_body(
        &mut self,
        name: &str,
        params: &Exp,
        body: &Exp,
        record: &ScopeRef,
    ) -> CompileResult<(ObjRef, Vec<String>)> {
        self.scope_stack.push(Rc::clone(record));

        let param_list: Vec<String> = param_names(params)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let arity = param_list.len();

        let prev_co = self.co;
        let co_ref = self.create_code_object(name, arity);
        self.co = co_ref;

        // Free cells come first in the cell table and are assigned by
        // MAKE_FUNCTION; own cells are appended in first-store order so
        // the lazy allocation in SET_CELL lines up with its index
        let free_names: Vec<String> = {
            let rec = record.borrow();
            let co = self
                .heap
                .code_mut(co_ref)
                .ok_or_else(|| CompileError::Internal("missing function code object".into()))?;
            co.free_count = rec.free.len();
            co.cell_names.extend(rec.free.iter().cloned());
            rec.free.iter().cloned().collect()
        };

        // Slot 0 is the function itself, parameters follow; any of them
        // captured by an inner closure is promoted to a cell on entry
        self.co_mut().add_local(name);
        self.promote_entry_slot(name, record)?;
        for param in &param_list {
            self.co_mut().add_local(param);
            self.promote_entry_slot(param, record)?;
        }

        self.compile_expr(body)?;

        // A begin body pops its own locals and arguments on scope exit
        if !body.is_tagged("begin") {
            self.emit(Opcode::ScopeExit);
            self.emit_index(arity + 1, CompileError::TooManyLocals)?;
        }
        self.emit(Opcode::Return);

        self.co = prev_co;
        self.scope_stack.pop();
        Ok((co_ref, free_names))
    }

    /// If `name` (a fresh entry slot: the function itself or a
    /// parameter) is captured by an inner closure, record its cell and
    /// copy the slot value into it.
    fn promote_entry_slot(&mut self, name: &str, record: &ScopeRef) -> CompileResult<()> {
        if !record.borrow().cells.contains(name) {
            return Ok(());
        }
        let cell_index = match self.co().cell_index(name) {
            Some(index) => index,
            None => {
                let co = self.co_mut();
                co.cell_names.push(name.to_string());
                co.cell_names.len() - 1
            }
        };
        let slot = self
            .co()
            .local_index(name)
            .ok_or_else(|| CompileError::Internal(format!("entry slot '{}' missing", name)))?;
        self.emit_with_index(Opcode::GetLocal, slot, CompileError::TooManyLocals)?;
        self.emit_with_index(Opcode::SetCell, cell_index, CompileError::TooManyCells)?;
        self.emit(Opcode::Pop);
        Ok(())
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// (class Name Super member...): members are `def` methods and
    /// literal `var` fields, optionally wrapped in a single `begin`.
    fn compile_class(&mut self, items: &[Exp]) -> CompileResult<Effect> {
        let name = items[1]
            .as_symbol()
            .ok_or_else(|| CompileError::Syntax("class name must be a symbol".into()))?
            .to_string();

        if self.lookup_kind(&name) != AllocKind::Global {
            return Err(CompileError::Syntax(format!(
                "class '{}' must be declared at top level",
                name
            )));
        }

        let superclass = match items[2].as_symbol() {
            Some("null") => None,
            Some(super_name) => Some(
                self.class_by_name(super_name)
                    .ok_or_else(|| CompileError::UnknownClass(super_name.to_string()))?,
            ),
            None => {
                return Err(CompileError::Syntax(
                    "superclass must be a class name or null".into(),
                ));
            }
        };

        let class_ref = self.alloc_tracked(Object::Class(crate::value::ClassObject {
            name: name.clone(),
            superclass,
            properties: Default::default(),
        }));
        self.classes.push(class_ref);

        // Bind the global before compiling members so methods can refer
        // to the class by name
        let global_index = self.global.define(&name);

        let record = self.next_scope_record()?;
        self.scope_stack.push(record);
        for member in class_members(items).to_vec() {
            self.compile_class_member(class_ref, &member)?;
        }
        self.scope_stack.pop();

        let class_const = self.add_const_to(self.co, Value::Obj(class_ref));
        self.emit_with_index(Opcode::Const, class_const, CompileError::TooManyConstants)?;
        self.emit_with_index(Opcode::SetGlobal, global_index, CompileError::TooManyGlobals)?;
        Ok(Effect::Value)
    }

    fn compile_class_member(&mut self, class_ref: ObjRef, member: &Exp) -> CompileResult<()> {
        let items = member.as_list().unwrap_or_default();
        match items.first().and_then(Exp::as_symbol) {
            Some("def") => {
                let method_name = items[1]
                    .as_symbol()
                    .ok_or_else(|| CompileError::Syntax("method name must be a symbol".into()))?
                    .to_string();
                let record = self.next_scope_record()?;
                let (co_ref, free_names) =
                    self.compile_function_body(&method_name, &items[2], &items[3], &record)?;
                if !free_names.is_empty() {
                    return Err(CompileError::Syntax(format!(
                        "method '{}' cannot capture enclosing variables",
                        method_name
                    )));
                }
                let function = self.alloc_tracked(Object::Function(FunctionObject {
                    co: co_ref,
                    cells: Vec::new(),
                }));
                if let Some(class) = self.heap.class_mut(class_ref) {
                    class.properties.insert(method_name, Value::Obj(function));
                }
                Ok(())
            }
            Some("var") => {
                let field_name = items[1]
                    .as_symbol()
                    .ok_or_else(|| CompileError::Syntax("field name must be a symbol".into()))?
                    .to_string();
                let value = self.literal_value(&items[2]).ok_or_else(|| {
                    CompileError::Syntax(format!(
                        "class field '{}' initializer must be a literal",
                        field_name
                    ))
                })?;
                if let Some(class) = self.heap.class_mut(class_ref) {
                    class.properties.insert(field_name, value);
                }
                Ok(())
            }
            _ => Err(CompileError::Syntax(
                "class members must be def methods or var fields".into(),
            )),
        }
    }

    /// (new Class arg...): allocate, then call the constructor with the
    /// instance as its first argument.
    fn compile_new(&mut self, items: &[Exp]) -> CompileResult<()> {
        self.compile_expr(&items[1])?;
        self.emit(Opcode::New);
        let args = &items[2..];
        for arg in args {
            self.compile_expr(arg)?;
        }
        if args.len() + 1 > u8::MAX as usize {
            return Err(CompileError::TooManyArguments);
        }
        self.emit(Opcode::Call);
        self.emit_byte((args.len() + 1) as u8);
        Ok(())
    }

    /// (prop obj name)
    fn compile_prop(&mut self, items: &[Exp]) -> CompileResult<()> {
        let name = items[2]
            .as_symbol()
            .ok_or_else(|| CompileError::Syntax("property name must be a symbol".into()))?
            .to_string();
        self.compile_expr(&items[1])?;
        let index = self.string_const(&name);
        self.emit_with_index(Opcode::GetProp, index, CompileError::TooManyConstants)
    }

    /// (super ClassName): compile-time superclass lookup.
    fn compile_super(&mut self, items: &[Exp]) -> CompileResult<()> {
        let name = items[1]
            .as_symbol()
            .ok_or_else(|| CompileError::Syntax("super expects a class name".into()))?;
        let class_ref = self
            .class_by_name(name)
            .ok_or_else(|| CompileError::UnknownClass(name.to_string()))?;
        let superclass = self
            .heap
            .class(class_ref)
            .and_then(|class| class.superclass)
            .ok_or_else(|| {
                CompileError::Syntax(format!("class '{}' has no superclass", name))
            })?;
        let index = self.add_const_to(self.co, Value::Obj(superclass));
        self.emit_with_index(Opcode::Const, index, CompileError::TooManyConstants)
    }

    fn class_by_name(&self, name: &str) -> Option<ObjRef> {
        self.classes
            .iter()
            .rev()
            .copied()
            .find(|&r| self.heap.class(r).is_some_and(|class| class.name == name))
    }

    fn literal_value(&mut self, exp: &Exp) -> Option<Value> {
        match exp {
            Exp::Number(n) => Some(Value::Number(*n)),
            Exp::Str(s) => {
                let s = s.clone();
                let r = self.alloc_tracked(Object::Str(s));
                Some(Value::Obj(r))
            }
            Exp::Symbol(s) if s == "true" => Some(Value::Bool(true)),
            Exp::Symbol(s) if s == "false" => Some(Value::Bool(false)),
            _ => None,
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Callee first, then the arguments in source order.
    fn compile_call(&mut self, items: &[Exp]) -> CompileResult<()> {
        self.compile_expr(&items[0])?;
        let args = &items[1..];
        if args.len() > u8::MAX as usize {
            return Err(CompileError::TooManyArguments);
        }
        for arg in args {
            self.compile_expr(arg)?;
        }
        self.emit(Opcode::Call);
        self.emit_byte(args.len() as u8);
        Ok(())
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    fn co(&self) -> &CodeObject {
        self.heap.code(self.co).expect("current code object")
    }

    fn co_mut(&mut self) -> &mut CodeObject {
        self.heap.code_mut(self.co).expect("current code object")
    }

    fn emit(&mut self, op: Opcode) {
        self.co_mut().code.push(op as u8);
    }

    fn emit_byte(&mut self, byte: u8) {
        self.co_mut().code.push(byte);
    }

    fn emit_index(&mut self, index: usize, err: CompileError) -> CompileResult<()> {
        let byte = u8::try_from(index).map_err(|_| err)?;
        self.emit_byte(byte);
        Ok(())
    }

    fn emit_with_index(&mut self, op: Opcode, index: usize, err: CompileError) -> CompileResult<()> {
        self.emit(op);
        self.emit_index(index, err)
    }

    fn offset(&self) -> usize {
        self.co().code.len()
    }

    /// Reserve a two-byte jump operand; returns its offset for patching.
    fn reserve_jump_operand(&mut self) -> usize {
        let at = self.offset();
        self.emit_byte(0);
        self.emit_byte(0);
        at
    }

    /// Write an absolute big-endian 16-bit target into a reserved operand.
    fn patch_jump(&mut self, at: usize, target: usize) -> CompileResult<()> {
        let target = u16::try_from(target)
            .map_err(|_| CompileError::Internal("jump target exceeds 16-bit range".into()))?;
        let co = self.co_mut();
        co.code[at] = (target >> 8) as u8;
        co.code[at + 1] = (target & 0xFF) as u8;
        Ok(())
    }

    fn create_code_object(&mut self, name: &str, arity: usize) -> ObjRef {
        let r = self.alloc_tracked(Object::Code(CodeObject::new(name, arity)));
        self.code_objects.push(r);
        r
    }

    fn alloc_tracked(&mut self, object: Object) -> ObjRef {
        let r = self.heap.alloc(object);
        self.constant_objects.push(r);
        r
    }

    fn add_const_to(&mut self, co: ObjRef, value: Value) -> usize {
        match self.heap.code_mut(co) {
            Some(co) => co.add_const(value),
            None => 0,
        }
    }

    fn next_scope_record(&mut self) -> CompileResult<ScopeRef> {
        let record = self.scopes.get(self.cursor).cloned().ok_or_else(|| {
            CompileError::Internal("scope record cursor out of sync".into())
        })?;
        self.cursor += 1;
        Ok(record)
    }

    /// Allocation kind of a name at the current syntactic position.
    fn lookup_kind(&self, name: &str) -> AllocKind {
        self.scope_stack
            .last()
            .and_then(|scope| scope.borrow().alloc_info.get(name).copied())
            .unwrap_or(AllocKind::Global)
    }

    // ========================================================================
    // Constants
    // ========================================================================

    fn number_const(&mut self, value: f64) -> usize {
        let existing = self.co().constants.iter().position(
            |c| matches!(c, Value::Number(n) if n.to_bits() == value.to_bits()),
        );
        match existing {
            Some(index) => index,
            None => self.co_mut().add_const(Value::Number(value)),
        }
    }

    fn boolean_const(&mut self, value: bool) -> usize {
        let existing = self
            .co()
            .constants
            .iter()
            .position(|c| matches!(c, Value::Bool(b) if *b == value));
        match existing {
            Some(index) => index,
            None => self.co_mut().add_const(Value::Bool(value)),
        }
    }

    /// String constants are deduplicated by content.
    fn string_const(&mut self, value: &str) -> usize {
        let existing = {
            let co = self.co();
            co.constants.iter().position(|c| {
                c.as_obj()
                    .and_then(|r| self.heap.string(r))
                    .is_some_and(|s| s == value)
            })
        };
        match existing {
            Some(index) => index,
            None => {
                let r = self.alloc_tracked(Object::Str(value.to_string()));
                self.co_mut().add_const(Value::Obj(r))
            }
        }
    }
}
