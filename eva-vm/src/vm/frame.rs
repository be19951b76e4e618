// eva-vm - Call frames for the VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames for the VM.

use crate::value::ObjRef;

/// A frame on the call stack: the caller's execution context, restored
/// by `OP_RETURN`.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Caller's instruction pointer (the return address).
    pub ret_ip: usize,
    /// Caller's base pointer.
    pub ret_bp: usize,
    /// Caller's function.
    pub ret_fn: ObjRef,
}
