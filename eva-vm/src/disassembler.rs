// eva-vm - Bytecode disassembler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode disassembler.
//!
//! A pure diagnostic: formats already-compiled code objects, one
//! instruction per line: offset, raw bytes, mnemonic, and an annotated
//! operand. Writes to any `fmt::Write` sink so tests can capture the
//! output.

use std::fmt::{self, Write};

use crate::global::GlobalTable;
use crate::heap::Heap;
use crate::opcode::{CompareOp, Opcode};
use crate::value::{CodeObject, Object, ObjRef, Value, format_number};

/// The Eva disassembler.
pub struct Disassembler<'a> {
    heap: &'a Heap,
    global: &'a GlobalTable,
}

impl<'a> Disassembler<'a> {
    pub fn new(heap: &'a Heap, global: &'a GlobalTable) -> Self {
        Disassembler { heap, global }
    }

    /// Disassemble one code object.
    pub fn disassemble(&self, co_ref: ObjRef, out: &mut impl Write) -> fmt::Result {
        let Some(co) = self.heap.code(co_ref) else {
            return writeln!(out, "<not a code object>");
        };
        writeln!(out, "\n---------- Disassembly: {} ----------\n", co.name)?;
        let mut offset = 0;
        while offset < co.code.len() {
            offset = self.disassemble_instruction(co, offset, out)?;
        }
        Ok(())
    }

    /// Disassemble the instruction at `offset`; returns the next offset.
    pub fn disassemble_instruction(
        &self,
        co: &CodeObject,
        offset: usize,
        out: &mut impl Write,
    ) -> Result<usize, fmt::Error> {
        write!(out, "{:04X}  ", offset)?;
        let byte = co.code[offset];
        let Ok(op) = Opcode::try_from(byte) else {
            self.dump_bytes(co, offset, 1, out)?;
            writeln!(out, "<unknown opcode 0x{:02X}>", byte)?;
            return Ok(offset + 1);
        };

        match op {
            Opcode::Halt
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Pop
            | Opcode::Return
            | Opcode::New => {
                self.dump_bytes(co, offset, 1, out)?;
                writeln!(out, "{:<20}", op.mnemonic())?;
                Ok(offset + 1)
            }
            Opcode::ScopeExit | Opcode::Call | Opcode::MakeFunction => {
                self.dump_bytes(co, offset, 2, out)?;
                let operand = self.operand(co, offset);
                writeln!(out, "{:<20} {}", op.mnemonic(), operand)?;
                Ok(offset + 2)
            }
            Opcode::Const | Opcode::GetProp | Opcode::SetProp => {
                self.dump_bytes(co, offset, 2, out)?;
                let index = self.operand(co, offset);
                let annotation = co
                    .constants
                    .get(index)
                    .map(|c| self.constant_to_string(*c))
                    .unwrap_or_else(|| "?".to_string());
                writeln!(out, "{:<20} {} ({})", op.mnemonic(), index, annotation)?;
                Ok(offset + 2)
            }
            Opcode::Compare => {
                self.dump_bytes(co, offset, 2, out)?;
                let sub_op = self.operand(co, offset);
                let symbol = CompareOp::try_from(sub_op as u8)
                    .map(CompareOp::symbol)
                    .unwrap_or("?");
                writeln!(out, "{:<20} {} ({})", op.mnemonic(), sub_op, symbol)?;
                Ok(offset + 2)
            }
            Opcode::GetGlobal | Opcode::SetGlobal => {
                self.dump_bytes(co, offset, 2, out)?;
                let index = self.operand(co, offset);
                let name = self
                    .global
                    .get(index)
                    .map(|slot| slot.name.as_str())
                    .unwrap_or("?");
                writeln!(out, "{:<20} {} ({})", op.mnemonic(), index, name)?;
                Ok(offset + 2)
            }
            Opcode::GetLocal | Opcode::SetLocal => {
                self.dump_bytes(co, offset, 2, out)?;
                let slot = self.operand(co, offset);
                // Locals are popped during compilation, so the table may
                // no longer cover this slot
                match co.locals.get(slot) {
                    Some(local) => {
                        writeln!(out, "{:<20} {} ({})", op.mnemonic(), slot, local.name)?;
                    }
                    None => writeln!(out, "{:<20} {}", op.mnemonic(), slot)?,
                }
                Ok(offset + 2)
            }
            Opcode::GetCell | Opcode::SetCell | Opcode::LoadCell => {
                self.dump_bytes(co, offset, 2, out)?;
                let index = self.operand(co, offset);
                let name = co
                    .cell_names
                    .get(index)
                    .map(String::as_str)
                    .unwrap_or("?");
                writeln!(out, "{:<20} {} ({})", op.mnemonic(), index, name)?;
                Ok(offset + 2)
            }
            Opcode::Jmp | Opcode::JmpIfFalse => {
                self.dump_bytes(co, offset, 3, out)?;
                let address = self.word_at(co, offset + 1);
                writeln!(out, "{:<20} {:04X}", op.mnemonic(), address)?;
                Ok(offset + 3)
            }
        }
    }

    fn operand(&self, co: &CodeObject, offset: usize) -> usize {
        co.code.get(offset + 1).copied().unwrap_or(0) as usize
    }

    fn word_at(&self, co: &CodeObject, offset: usize) -> u16 {
        let hi = co.code.get(offset).copied().unwrap_or(0) as u16;
        let lo = co.code.get(offset + 1).copied().unwrap_or(0) as u16;
        (hi << 8) | lo
    }

    fn dump_bytes(
        &self,
        co: &CodeObject,
        offset: usize,
        count: usize,
        out: &mut impl Write,
    ) -> fmt::Result {
        let mut bytes = String::new();
        for i in 0..count {
            if let Some(byte) = co.code.get(offset + i) {
                let _ = write!(bytes, "{:02X} ", byte);
            }
        }
        write!(out, "{:<12}", bytes)
    }

    /// Render a constant-pool entry for annotation.
    fn constant_to_string(&self, value: Value) -> String {
        match value {
            Value::Number(n) => format_number(n),
            Value::Bool(b) => b.to_string(),
            Value::Obj(r) => match self.heap.get(r) {
                Some(Object::Str(s)) => format!("\"{}\"", s),
                Some(Object::Code(co)) => format!("code {}/{}", co.name, co.arity),
                Some(Object::Function(f)) => match self.heap.code(f.co) {
                    Some(co) => format!("{}/{}", co.name, co.arity),
                    None => "fn ?".to_string(),
                },
                Some(Object::Native(n)) => format!("{}/{}", n.name, n.arity),
                Some(Object::Cell(c)) => format!("cell: {}", self.constant_to_string(c.value)),
                Some(Object::Class(c)) => format!("class: {}", c.name),
                Some(Object::Instance(i)) => match self.heap.class(i.class) {
                    Some(class) => format!("instance: {}", class.name),
                    None => "instance: ?".to_string(),
                },
                None => "<freed>".to_string(),
            },
        }
    }
}
