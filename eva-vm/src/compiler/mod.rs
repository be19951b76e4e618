// eva-vm - Bytecode compiler for the Eva programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode compiler: transforms the Eva expression tree to bytecode.
//!
//! The compiler operates in two phases:
//! 1. Analysis: resolve variables, determine captures, promote
//!    closure-captured variables to cells
//! 2. Code generation: emit bytecode into code objects

pub mod analysis;
pub mod codegen;

pub use analysis::{AllocKind, Analyzer, Scope, ScopeKind, ScopeRef};
pub use codegen::{Compilation, Compiler};
