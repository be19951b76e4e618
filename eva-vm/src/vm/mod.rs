// eva-vm - Stack-based virtual machine for Eva bytecode
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stack-based virtual machine for executing Eva bytecode.
//!
//! The machine keeps a value stack with a base pointer marking the
//! current frame's slot 0 (the running function itself), a separate call
//! stack of frames, and an instruction pointer into the current code
//! object's bytecode. `exec` runs the whole pipeline: parse, compile,
//! then dispatch until `OP_HALT`.
//!
//! Allocation during execution is gated by the collector: when the heap
//! crosses its byte threshold, a mark-and-sweep cycle runs first, rooted
//! at the live stack slots, the global table and the compiler's
//! constant-object set.

pub mod frame;
pub mod stack;

use eva_parser::{Exp, Parser};

pub use frame::Frame;
pub use stack::{STACK_LIMIT, ValueStack};

use crate::compiler::Compiler;
use crate::disassembler::Disassembler;
use crate::error::{EvaError, RuntimeError, RuntimeResult};
use crate::global::GlobalTable;
use crate::heap::{GC_THRESHOLD, Heap, HeapStats};
use crate::opcode::{CompareOp, Opcode};
use crate::value::{
    FunctionObject, InstanceObject, NativeFn, Object, ObjRef, Value, format_number,
};

/// Version of the language exposed as the `VERSION` global.
pub const VERSION: f64 = 1.0;

/// Resolved callee data, extracted before the call mutates the stack.
enum Callee {
    Native {
        function: NativeFn,
        name: String,
        arity: usize,
    },
    Function {
        co: ObjRef,
        arity: usize,
        free_count: usize,
        name: String,
    },
}

/// The Eva virtual machine.
pub struct Vm {
    heap: Heap,
    global: GlobalTable,
    stack: ValueStack,
    frames: Vec<Frame>,
    /// Base pointer: stack slot 0 of the current frame.
    bp: usize,
    /// Instruction pointer into the current code object's bytecode.
    ip: usize,
    /// Currently executing function.
    fn_ref: ObjRef,
    /// Code object of the currently executing function.
    co: ObjRef,
    /// Compile-time allocations, rooted for the collector.
    constant_objects: Vec<ObjRef>,
    /// All compiled code objects (diagnostics).
    code_objects: Vec<ObjRef>,
    trace: bool,
}

impl Vm {
    /// Create a VM with the default stack capacity and GC threshold.
    pub fn new() -> Self {
        Self::with_config(STACK_LIMIT, GC_THRESHOLD)
    }

    /// Create a VM with a custom stack capacity and GC threshold.
    pub fn with_config(stack_limit: usize, gc_threshold: usize) -> Self {
        let mut heap = Heap::with_threshold(gc_threshold);
        let mut global = GlobalTable::new();
        set_global_variables(&mut global, &mut heap);
        Vm {
            heap,
            global,
            stack: ValueStack::with_limit(stack_limit),
            frames: Vec::new(),
            bp: 0,
            ip: 0,
            fn_ref: ObjRef::NONE,
            co: ObjRef::NONE,
            constant_objects: Vec::new(),
            code_objects: Vec::new(),
            trace: false,
        }
    }

    /// Print disassembly to stderr before each run.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    /// Parse, compile and run a program; returns the value left on top
    /// of the stack at `OP_HALT`.
    pub fn exec(&mut self, source: &str) -> Result<Value, EvaError> {
        let forms = Parser::parse_all_str(source)?;
        // The program is implicitly a block
        let mut wrapped = Vec::with_capacity(forms.len() + 1);
        wrapped.push(Exp::symbol("begin"));
        wrapped.extend(forms);
        let program = Exp::List(wrapped);

        let compilation = Compiler::new(&mut self.heap, &mut self.global).compile(&program)?;
        self.constant_objects
            .extend(compilation.constant_objects.iter().copied());
        self.code_objects
            .extend(compilation.code_objects.iter().copied());

        if self.trace {
            eprintln!("{}", self.disassemble_objects(&compilation.code_objects));
        }

        let result = self.run(compilation.main_fn);
        if result.is_err() {
            // Leave the machine reusable after a failed program
            self.stack.clear();
            self.frames.clear();
        }
        result.map_err(EvaError::Runtime)
    }

    fn run(&mut self, main_fn: ObjRef) -> RuntimeResult<Value> {
        self.fn_ref = main_fn;
        self.co = self
            .heap
            .function(main_fn)
            .map(|f| f.co)
            .ok_or_else(|| RuntimeError::Internal("missing main function".into()))?;
        self.ip = 0;
        self.bp = self.stack.len();
        self.eval()
    }

    /// The dispatch loop.
    fn eval(&mut self) -> RuntimeResult<Value> {
        loop {
            let byte = self.read_byte()?;
            let op = Opcode::try_from(byte).map_err(RuntimeError::UnknownOpcode)?;
            match op {
                Opcode::Halt => return self.stack.pop(),

                Opcode::Const => {
                    let index = self.read_byte()?;
                    let value = self.get_constant(index)?;
                    self.stack.push(value)?;
                }

                Opcode::Add => self.add()?,
                Opcode::Sub => self.binary_num_op(|a, b| a - b)?,
                Opcode::Mul => self.binary_num_op(|a, b| a * b)?,
                Opcode::Div => self.binary_num_op(|a, b| a / b)?,

                Opcode::Compare => self.compare()?,

                Opcode::JmpIfFalse => {
                    let address = self.read_short()? as usize;
                    let condition = self.stack.pop()?;
                    let condition = condition.as_bool().ok_or_else(|| RuntimeError::TypeError {
                        expected: "boolean",
                        got: self.type_name(condition),
                    })?;
                    if !condition {
                        self.ip = address;
                    }
                }
                Opcode::Jmp => {
                    self.ip = self.read_short()? as usize;
                }

                Opcode::Pop => {
                    self.stack.pop()?;
                }

                Opcode::GetGlobal => {
                    let index = self.read_byte()? as usize;
                    let value = self
                        .global
                        .get(index)
                        .map(|slot| slot.value)
                        .ok_or_else(|| {
                            RuntimeError::Internal(format!("global {} doesn't exist", index))
                        })?;
                    self.stack.push(value)?;
                }
                Opcode::SetGlobal => {
                    let index = self.read_byte()? as usize;
                    let value = self.stack.peek(0)?;
                    self.global.set(index, value)?;
                }

                Opcode::GetLocal => {
                    let slot = self.read_byte()? as usize;
                    let index = self.bp + slot;
                    let value = self
                        .stack
                        .get(index)
                        .map_err(|_| RuntimeError::InvalidLocal { slot })?;
                    self.stack.push(value)?;
                }
                Opcode::SetLocal => {
                    let slot = self.read_byte()? as usize;
                    let value = self.stack.peek(0)?;
                    let index = self.bp + slot;
                    self.stack
                        .set(index, value)
                        .map_err(|_| RuntimeError::InvalidLocal { slot })?;
                }

                Opcode::ScopeExit => {
                    let count = self.read_byte()? as usize;
                    // The block's value moves down over the freed slots
                    let top = self.stack.peek(0)?;
                    let len = self.stack.len();
                    if count >= len {
                        return Err(RuntimeError::StackUnderflow);
                    }
                    self.stack.set(len - 1 - count, top)?;
                    self.stack.pop_n(count)?;
                }

                Opcode::Call => {
                    let argc = self.read_byte()? as usize;
                    self.call(argc)?;
                }
                Opcode::Return => {
                    let frame = self
                        .frames
                        .pop()
                        .ok_or_else(|| RuntimeError::Internal("return without a frame".into()))?;
                    self.ip = frame.ret_ip;
                    self.bp = frame.ret_bp;
                    self.fn_ref = frame.ret_fn;
                    self.co = self
                        .heap
                        .function(self.fn_ref)
                        .map(|f| f.co)
                        .ok_or_else(|| {
                            RuntimeError::Internal("caller function disappeared".into())
                        })?;
                }

                Opcode::GetCell => {
                    let index = self.read_byte()? as usize;
                    let cell_ref = self.cell_at(index)?;
                    let value = self
                        .heap
                        .cell(cell_ref)
                        .map(|cell| cell.value)
                        .ok_or(RuntimeError::InvalidCell { index })?;
                    self.stack.push(value)?;
                }
                Opcode::SetCell => {
                    let index = self.read_byte()? as usize;
                    let value = self.stack.peek(0)?;
                    let cells_len = self
                        .heap
                        .function(self.fn_ref)
                        .map(|f| f.cells.len())
                        .ok_or_else(|| {
                            RuntimeError::Internal("no function for SET_CELL".into())
                        })?;
                    if cells_len <= index {
                        // First store for this index allocates the cell
                        self.maybe_gc();
                        let cell = self.heap.alloc_cell(value);
                        self.heap
                            .function_mut(self.fn_ref)
                            .ok_or_else(|| {
                                RuntimeError::Internal("no function for SET_CELL".into())
                            })?
                            .cells
                            .push(cell);
                    } else {
                        let cell_ref = self.cell_at(index)?;
                        self.heap
                            .cell_mut(cell_ref)
                            .ok_or(RuntimeError::InvalidCell { index })?
                            .value = value;
                    }
                }
                Opcode::LoadCell => {
                    let index = self.read_byte()? as usize;
                    let cell_ref = self.cell_at(index)?;
                    self.stack.push(Value::Obj(cell_ref))?;
                }

                Opcode::MakeFunction => {
                    let count = self.read_byte()? as usize;
                    self.make_function(count)?;
                }

                Opcode::New => self.new_instance()?,
                Opcode::GetProp => {
                    let index = self.read_byte()?;
                    self.get_prop(index)?;
                }
                Opcode::SetProp => {
                    let index = self.read_byte()?;
                    self.set_prop(index)?;
                }
            }
        }
    }

    // ========================================================================
    // Instruction helpers
    // ========================================================================

    fn read_byte(&mut self) -> RuntimeResult<u8> {
        let co = self
            .heap
            .code(self.co)
            .ok_or_else(|| RuntimeError::Internal("missing code object".into()))?;
        let byte = co
            .code
            .get(self.ip)
            .copied()
            .ok_or_else(|| RuntimeError::Internal("instruction pointer out of bounds".into()))?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_short(&mut self) -> RuntimeResult<u16> {
        let hi = self.read_byte()? as u16;
        let lo = self.read_byte()? as u16;
        Ok((hi << 8) | lo)
    }

    fn get_constant(&self, index: u8) -> RuntimeResult<Value> {
        self.heap
            .code(self.co)
            .and_then(|co| co.constants.get(index as usize).copied())
            .ok_or_else(|| {
                RuntimeError::Internal(format!("constant index {} out of bounds", index))
            })
    }

    fn cell_at(&self, index: usize) -> RuntimeResult<ObjRef> {
        self.heap
            .function(self.fn_ref)
            .and_then(|f| f.cells.get(index).copied())
            .ok_or(RuntimeError::InvalidCell { index })
    }

    /// `+` is overloaded: numeric addition or string concatenation.
    fn add(&mut self) -> RuntimeResult<()> {
        let b = self.stack.peek(0)?;
        let a = self.stack.peek(1)?;
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.stack.pop_n(2)?;
                self.stack.push(Value::Number(x + y))
            }
            (Value::Obj(r1), Value::Obj(r2)) => {
                let concatenated = match (self.heap.string(r1), self.heap.string(r2)) {
                    (Some(s1), Some(s2)) => {
                        let mut s = String::with_capacity(s1.len() + s2.len());
                        s.push_str(s1);
                        s.push_str(s2);
                        s
                    }
                    _ => {
                        return Err(RuntimeError::TypeError {
                            expected: "numbers or strings",
                            got: format!("{} + {}", self.type_name(a), self.type_name(b)),
                        });
                    }
                };
                // Operands stay rooted on the stack through the collection
                self.maybe_gc();
                let r = self.heap.alloc_string(concatenated);
                self.stack.pop_n(2)?;
                self.stack.push(Value::Obj(r))
            }
            _ => Err(RuntimeError::TypeError {
                expected: "numbers or strings",
                got: format!("{} + {}", self.type_name(a), self.type_name(b)),
            }),
        }
    }

    fn binary_num_op(&mut self, op: fn(f64, f64) -> f64) -> RuntimeResult<()> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => self.stack.push(Value::Number(op(x, y))),
            _ => Err(RuntimeError::TypeError {
                expected: "number",
                got: format!("{} and {}", self.type_name(a), self.type_name(b)),
            }),
        }
    }

    fn compare(&mut self) -> RuntimeResult<()> {
        let sub_op = self.read_byte()?;
        let sub_op = CompareOp::try_from(sub_op)
            .map_err(|byte| RuntimeError::Internal(format!("bad comparison sub-op {}", byte)))?;
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        let result = match (a, b) {
            (Value::Number(x), Value::Number(y)) => sub_op.apply(&x, &y),
            (Value::Obj(r1), Value::Obj(r2)) => {
                match (self.heap.string(r1), self.heap.string(r2)) {
                    (Some(s1), Some(s2)) => sub_op.apply(&s1, &s2),
                    _ => {
                        return Err(RuntimeError::TypeError {
                            expected: "matching comparable shapes",
                            got: format!(
                                "{} {} {}",
                                self.type_name(a),
                                sub_op.symbol(),
                                self.type_name(b)
                            ),
                        });
                    }
                }
            }
            _ => {
                return Err(RuntimeError::TypeError {
                    expected: "matching comparable shapes",
                    got: format!(
                        "{} {} {}",
                        self.type_name(a),
                        sub_op.symbol(),
                        self.type_name(b)
                    ),
                });
            }
        };
        self.stack.push(Value::Bool(result))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// `OP_CALL argc`: the callee sits below its arguments.
    fn call(&mut self, argc: usize) -> RuntimeResult<()> {
        let callee = self.stack.peek(argc)?;
        let r = callee
            .as_obj()
            .ok_or_else(|| RuntimeError::NotCallable(self.type_name(callee)))?;
        let callee = match self.heap.get(r) {
            Some(Object::Native(native)) => Callee::Native {
                function: native.function,
                name: native.name.clone(),
                arity: native.arity,
            },
            Some(Object::Function(function)) => {
                let co = self.heap.code(function.co).ok_or_else(|| {
                    RuntimeError::Internal("function without a code object".into())
                })?;
                Callee::Function {
                    co: function.co,
                    arity: co.arity,
                    free_count: co.free_count,
                    name: co.name.clone(),
                }
            }
            Some(other) => return Err(RuntimeError::NotCallable(other.kind_name().into())),
            None => return Err(RuntimeError::Internal("callee disappeared".into())),
        };

        match callee {
            Callee::Native {
                function,
                name,
                arity,
            } => {
                if argc != arity {
                    return Err(RuntimeError::ArityError {
                        name,
                        expected: arity,
                        got: argc,
                    });
                }
                // The native reads its arguments with peek and pushes its
                // result; the VM then squashes callee and arguments
                function(&mut self.stack)?;
                let result = self.stack.pop()?;
                self.stack.pop_n(argc + 1)?;
                self.stack.push(result)
            }
            Callee::Function {
                co,
                arity,
                free_count,
                name,
            } => {
                if argc != arity {
                    return Err(RuntimeError::ArityError {
                        name,
                        expected: arity,
                        got: argc,
                    });
                }
                self.frames.push(Frame {
                    ret_ip: self.ip,
                    ret_bp: self.bp,
                    ret_fn: self.fn_ref,
                });
                // Own cells are fresh per invocation; captured free cells remain
                if let Some(function) = self.heap.function_mut(r) {
                    function.cells.truncate(free_count);
                }
                self.fn_ref = r;
                self.co = co;
                self.bp = self.stack.len() - argc - 1;
                self.ip = 0;
                Ok(())
            }
        }
    }

    fn make_function(&mut self, count: usize) -> RuntimeResult<()> {
        let co_val = self.stack.peek(0)?;
        let co_ref = co_val
            .as_obj()
            .filter(|&r| self.heap.code(r).is_some())
            .ok_or_else(|| {
                RuntimeError::Internal("MAKE_FUNCTION expects a code object on top".into())
            })?;
        let mut cells = Vec::with_capacity(count);
        for i in 0..count {
            // The first-pushed capture is deepest on the stack
            let value = self.stack.peek(count - i)?;
            let cell_ref = value
                .as_obj()
                .filter(|&r| self.heap.cell(r).is_some())
                .ok_or_else(|| {
                    RuntimeError::Internal("MAKE_FUNCTION expects cell references".into())
                })?;
            cells.push(cell_ref);
        }
        self.maybe_gc();
        let function = self.heap.alloc(Object::Function(FunctionObject {
            co: co_ref,
            cells,
        }));
        self.stack.pop_n(count + 1)?;
        self.stack.push(Value::Obj(function))
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// `OP_NEW`: allocate an instance and stage the constructor call.
    fn new_instance(&mut self) -> RuntimeResult<()> {
        let class_val = self.stack.peek(0)?;
        let class_ref = class_val
            .as_obj()
            .filter(|&r| self.heap.class(r).is_some())
            .ok_or_else(|| RuntimeError::TypeError {
                expected: "class",
                got: self.type_name(class_val),
            })?;
        let constructor = self.class_get_prop(class_ref, "constructor")?;
        self.maybe_gc();
        let instance = self.heap.alloc(Object::Instance(InstanceObject {
            class: class_ref,
            properties: Default::default(),
        }));
        self.stack.pop()?;
        self.stack.push(constructor)?;
        self.stack.push(Value::Obj(instance))
    }

    fn get_prop(&mut self, name_index: u8) -> RuntimeResult<()> {
        let name = self.constant_string(name_index)?;
        let receiver = self.stack.pop()?;
        let value = match receiver.as_obj().map(|r| (r, self.heap.get(r))) {
            Some((r, Some(Object::Instance(_)))) => self.instance_get_prop(r, &name)?,
            Some((r, Some(Object::Class(_)))) => self.class_get_prop(r, &name)?,
            _ => {
                return Err(RuntimeError::TypeError {
                    expected: "instance or class",
                    got: self.type_name(receiver),
                });
            }
        };
        self.stack.push(value)
    }

    fn set_prop(&mut self, name_index: u8) -> RuntimeResult<()> {
        let name = self.constant_string(name_index)?;
        let receiver = self.stack.pop()?;
        let value = self.stack.pop()?;
        let r = receiver.as_obj().ok_or_else(|| RuntimeError::TypeError {
            expected: "instance or class",
            got: self.type_name(receiver),
        })?;
        let stored = match self.heap.get_mut(r) {
            Some(Object::Instance(instance)) => {
                instance.properties.insert(name, value);
                true
            }
            Some(Object::Class(class)) => {
                class.properties.insert(name, value);
                true
            }
            _ => false,
        };
        if !stored {
            return Err(RuntimeError::TypeError {
                expected: "instance or class",
                got: self.type_name(receiver),
            });
        }
        self.stack.push(value)
    }

    /// Resolve a property on an instance: own table first, then the
    /// class chain.
    fn instance_get_prop(&self, instance_ref: ObjRef, name: &str) -> RuntimeResult<Value> {
        let instance = self
            .heap
            .instance(instance_ref)
            .ok_or_else(|| RuntimeError::Internal("missing instance".into()))?;
        if let Some(value) = instance.properties.get(name) {
            return Ok(*value);
        }
        self.class_get_prop(instance.class, name)
    }

    /// Resolve a property in a class chain.
    fn class_get_prop(&self, class_ref: ObjRef, name: &str) -> RuntimeResult<Value> {
        let mut current = Some(class_ref);
        while let Some(r) = current {
            let class = self
                .heap
                .class(r)
                .ok_or_else(|| RuntimeError::Internal("missing class".into()))?;
            if let Some(value) = class.properties.get(name) {
                return Ok(*value);
            }
            current = class.superclass;
        }
        let class_name = self
            .heap
            .class(class_ref)
            .map(|class| class.name.clone())
            .unwrap_or_default();
        Err(RuntimeError::PropertyNotFound {
            target: format!("class {}", class_name),
            property: name.to_string(),
        })
    }

    fn constant_string(&self, index: u8) -> RuntimeResult<String> {
        let value = self.get_constant(index)?;
        value
            .as_obj()
            .and_then(|r| self.heap.string(r))
            .map(str::to_string)
            .ok_or_else(|| RuntimeError::Internal("property name must be a string".into()))
    }

    // ========================================================================
    // Garbage collection
    // ========================================================================

    /// Run a collection cycle if the heap has crossed its threshold.
    /// Called from every runtime allocation site.
    fn maybe_gc(&mut self) {
        if !self.heap.should_collect() {
            return;
        }
        let roots = self.gc_roots();
        self.heap.collect(roots);
    }

    /// Force a collection cycle; returns the number of reclaimed objects.
    pub fn collect_garbage(&mut self) -> usize {
        let roots = self.gc_roots();
        self.heap.collect(roots)
    }

    /// Roots: live stack slots, globals, constant objects, and the
    /// currently executing function.
    fn gc_roots(&self) -> Vec<ObjRef> {
        let mut roots = Vec::with_capacity(self.constant_objects.len() + self.stack.len() + 8);
        for value in self.stack.as_slice() {
            if let Value::Obj(r) = value {
                roots.push(*r);
            }
        }
        for slot in self.global.iter() {
            if let Value::Obj(r) = slot.value {
                roots.push(r);
            }
        }
        roots.extend(self.constant_objects.iter().copied());
        roots.push(self.fn_ref);
        roots.push(self.co);
        roots
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The current value of a global by name.
    pub fn global_value(&self, name: &str) -> Option<Value> {
        self.global
            .get_index(name)
            .and_then(|index| self.global.get(index))
            .map(|slot| slot.value)
    }

    /// The string contents of a value, if it is a string object.
    pub fn string_value(&self, value: &Value) -> Option<&str> {
        value.as_obj().and_then(|r| self.heap.string(r))
    }

    /// Render a value for the REPL and diagnostics.
    pub fn render(&self, value: &Value) -> String {
        match value {
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Obj(r) => match self.heap.get(*r) {
                Some(Object::Str(s)) => format!("\"{}\"", s),
                Some(Object::Code(co)) => format!("#<code {}/{}>", co.name, co.arity),
                Some(Object::Native(n)) => format!("#<native {}/{}>", n.name, n.arity),
                Some(Object::Function(f)) => match self.heap.code(f.co) {
                    Some(co) => format!("#<fn {}/{}>", co.name, co.arity),
                    None => "#<fn ?>".to_string(),
                },
                Some(Object::Cell(c)) => format!("#<cell {}>", self.render(&c.value)),
                Some(Object::Class(c)) => format!("#<class {}>", c.name),
                Some(Object::Instance(i)) => match self.heap.class(i.class) {
                    Some(class) => format!("#<instance {}>", class.name),
                    None => "#<instance ?>".to_string(),
                },
                None => "#<freed object>".to_string(),
            },
        }
    }

    /// Formatted disassembly of every code object compiled so far.
    pub fn disassemble(&self) -> String {
        self.disassemble_objects(&self.code_objects)
    }

    fn disassemble_objects(&self, code_objects: &[ObjRef]) -> String {
        let disassembler = Disassembler::new(&self.heap, &self.global);
        let mut out = String::new();
        for &co in code_objects {
            // Formatting into a String cannot fail
            let _ = disassembler.disassemble(co, &mut out);
        }
        out
    }

    fn type_name(&self, value: Value) -> String {
        match value {
            Value::Number(_) => "number".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Obj(r) => match self.heap.get(r) {
                Some(object) => object.kind_name().to_string(),
                None => "object".to_string(),
            },
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Preregistered globals
// ============================================================================

fn set_global_variables(global: &mut GlobalTable, heap: &mut Heap) {
    global.add_native(heap, "native-square", native_square, 1);
    global.add_native(heap, "sum", native_sum, 2);
    global.add_const("VERSION", VERSION);
}

fn number_arg(stack: &ValueStack, distance: usize) -> RuntimeResult<f64> {
    let value = stack.peek(distance)?;
    value.as_number().ok_or_else(|| RuntimeError::TypeError {
        expected: "number",
        got: value.shape_name().to_string(),
    })
}

/// (native-square x) -> x * x
fn native_square(stack: &mut ValueStack) -> RuntimeResult<()> {
    let x = number_arg(stack, 0)?;
    stack.push(Value::Number(x * x))
}

/// (sum a b) -> a + b
fn native_sum(stack: &mut ValueStack) -> RuntimeResult<()> {
    let b = number_arg(stack, 0)?;
    let a = number_arg(stack, 1)?;
    stack.push(Value::Number(a + b))
}
