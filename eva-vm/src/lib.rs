// eva-vm - Bytecode compiler and virtual machine for the Eva programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode compiler and stack-based virtual machine for Eva.
//!
//! Source text is parsed into an expression tree (by `eva-parser`),
//! lowered to a byte-encoded stack machine by a two-pass compiler
//! (scope analysis, then code generation), and executed by a dispatch
//! loop that allocates heap objects under a mark-and-sweep garbage
//! collector.

pub mod compiler;
pub mod disassembler;
pub mod error;
pub mod global;
pub mod heap;
pub mod opcode;
pub mod value;
pub mod vm;

pub use compiler::{Compilation, Compiler};
pub use disassembler::Disassembler;
pub use error::{CompileError, EvaError, RuntimeError};
pub use global::{GlobalTable, GlobalVar};
pub use heap::{GC_THRESHOLD, Heap, HeapStats};
pub use opcode::{CompareOp, Opcode};
pub use value::{ObjRef, Object, Value};
pub use vm::{STACK_LIMIT, ValueStack, Vm};
