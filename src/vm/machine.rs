//! Quadruple interpreter
//!
//! A fetch-decode-execute loop over the compiled instruction stream.
//! State is a call stack of activation records (each owning its local
//! and temporal stores), one global store, one frozen constant store, a
//! print log and the render stream. Call setup is split across three
//! operations: `era` stages a record sized from the function table,
//! `param` fills its parameter slots while the caller is still active,
//! and `gosub` activates it.

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::memory::{MemoryMapper, MemoryStore, Value};
use crate::render::{RenderOp, RenderTag, RenderValue};
use crate::semantics::codegen::{CompiledPage, GLOBAL_SCOPE, RENDER_SCOPE};
use crate::semantics::types::{
    Addr, CompilationOutput, FuncEntry, Instruction, Operation, Segment, ValueType,
};

/// One activation record
#[derive(Debug)]
struct Frame {
    func: String,
    local: MemoryStore,
    temporal: MemoryStore,
    ip: usize,
}

/// Stack-based virtual machine for compiled pages
pub struct VirtualMachine {
    output: CompilationOutput,
    mapper: MemoryMapper,
    global: MemoryStore,
    constants: MemoryStore,
    frames: Vec<Frame>,
    pending: Vec<Frame>,
    printed: Vec<String>,
    render_log: Vec<RenderOp>,
}

impl VirtualMachine {
    /// Initializes a machine: sizes the global store from the recorded
    /// footprint, decodes the literal table into the constant store and
    /// sets up the boot frame at instruction 0
    pub fn new(page: CompiledPage) -> Result<Self> {
        let CompiledPage { output, mapper } = page;

        let global_sizes = output
            .func_table
            .get(GLOBAL_SCOPE)
            .and_then(|entry| entry.size)
            .map(|size| size.local)
            .ok_or_else(|| Error::address("compiled page has no global footprint"))?;
        let global = MemoryStore::new(&global_sizes);

        let mut constants = MemoryStore::new(&mapper.size_of(Segment::Constant)?);
        for (text, addr) in &output.literal_table {
            let (segment, vt) = mapper.resolve(*addr)?;
            if segment != Segment::Constant {
                return Err(Error::address(format!(
                    "literal {} mapped outside the constant segment",
                    text
                )));
            }
            let offset = mapper.context_offset(*addr)?;
            constants.write(vt, offset, decode_literal(text, vt)?)?;
        }

        // the boot frame has no backing cells: global code may not use
        // locals or temporals
        let boot = Frame {
            func: GLOBAL_SCOPE.to_string(),
            local: MemoryStore::empty(),
            temporal: MemoryStore::empty(),
            ip: 0,
        };

        Ok(VirtualMachine {
            output,
            mapper,
            global,
            constants,
            frames: vec![boot],
            pending: Vec::new(),
            printed: Vec::new(),
            render_log: Vec::new(),
        })
    }

    /// Runs the program to `endprog`
    pub fn run(&mut self) -> Result<()> {
        loop {
            let ip = self.frame()?.ip;
            let instr = *self.output.quadruples.get(ip).ok_or_else(|| {
                Error::address(format!("instruction pointer {} past end of program", ip))
            })?;
            trace!(ip, operation = ?instr.operation, "execute");

            match instr.operation {
                Operation::EndProg => break,

                Operation::Add
                | Operation::Sub
                | Operation::Mul
                | Operation::Div
                | Operation::Lt
                | Operation::Gt
                | Operation::Le
                | Operation::Ge
                | Operation::Eq
                | Operation::Ne
                | Operation::And
                | Operation::Or => {
                    let lhs = self.read(instr.lhs)?;
                    let rhs = self.read(instr.rhs)?;
                    let value = super::ops::binary(instr.operation, &lhs, &rhs)?;
                    self.write_raw(instr.result, value)?;
                    self.step()?;
                }

                Operation::Assign => {
                    let value = self.read(instr.lhs)?;
                    self.write_assign(instr.result, value)?;
                    self.step()?;
                }

                Operation::Goto => self.jump(instr.result)?,

                Operation::GotoF => {
                    let cond = self.read(instr.lhs)?.as_bool()?;
                    if cond {
                        self.step()?;
                    } else {
                        self.jump(instr.result)?;
                    }
                }

                Operation::GotoT => {
                    let cond = self.read(instr.lhs)?.as_bool()?;
                    if cond {
                        self.jump(instr.result)?;
                    } else {
                        self.step()?;
                    }
                }

                Operation::GotoRender => {
                    let entry = self.func_entry(RENDER_SCOPE)?;
                    let frame = stage_frame(RENDER_SCOPE, &entry)?;
                    debug!("entering render frame");
                    self.frames.push(frame);
                }

                Operation::Era => {
                    let name = self.read(instr.lhs)?.as_str()?.to_string();
                    let entry = self.func_entry(&name)?;
                    let frame = stage_frame(&name, &entry)?;
                    self.pending.push(frame);
                    self.step()?;
                }

                Operation::Param => {
                    self.bind_param(instr.lhs, instr.result)?;
                    self.step()?;
                }

                Operation::Gosub => {
                    let frame = self.pending.pop().ok_or_else(|| Error::StackUnderflow {
                        stack: "pending frames".to_string(),
                    })?;
                    // the caller's ip stays put: frame teardown advances it
                    self.frames.push(frame);
                }

                Operation::EndFunc => {
                    self.pop_frame()?;
                }

                Operation::Return => {
                    if !instr.result.is_none() {
                        let value = self.read(instr.result)?;
                        let entry = self.func_entry(&self.frame()?.func.clone())?;
                        let slot = entry.return_addr.ok_or_else(|| {
                            Error::address("return value from a function without a return slot")
                        })?;
                        self.write_raw(slot, value)?;
                    }
                    self.pop_frame()?;
                }

                Operation::Verify => {
                    let index = self.read(instr.lhs)?.as_int()?;
                    let bound = self.read(instr.result)?.as_int()?;
                    if index < 0 || index >= bound {
                        return Err(Error::IndexOutOfBounds { index, bound });
                    }
                    self.step()?;
                }

                Operation::Print => {
                    let value = self.read(instr.lhs)?;
                    debug!(%value, "print");
                    self.printed.push(value.to_string());
                    self.step()?;
                }

                Operation::RenderOp => {
                    self.render_op(instr)?;
                    self.step()?;
                }
            }
        }
        Ok(())
    }

    /// Values printed so far, in order
    pub fn printed(&self) -> &[String] {
        &self.printed
    }

    /// Render stream produced so far, in order
    pub fn render_ops(&self) -> &[RenderOp] {
        &self.render_log
    }

    // ---- frames ----

    fn frame(&self) -> Result<&Frame> {
        self.frames.last().ok_or_else(|| Error::StackUnderflow {
            stack: "frames".to_string(),
        })
    }

    fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or_else(|| Error::StackUnderflow {
            stack: "frames".to_string(),
        })
    }

    fn step(&mut self) -> Result<()> {
        self.frame_mut()?.ip += 1;
        Ok(())
    }

    fn jump(&mut self, target: Addr) -> Result<()> {
        if target.is_none() {
            return Err(Error::address("jump to unresolved target"));
        }
        self.frame_mut()?.ip = target.0 as usize;
        Ok(())
    }

    /// Tears down the active frame and resumes the caller just past the
    /// instruction that activated it
    fn pop_frame(&mut self) -> Result<()> {
        self.frames.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "frames".to_string(),
        })?;
        self.step()
    }

    fn func_entry(&self, name: &str) -> Result<FuncEntry> {
        self.output
            .func_table
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UndefinedFunction {
                name: name.to_string(),
            })
    }

    /// Writes an argument into the staged frame's parameter slot
    ///
    /// Parameters are the first locals of their type, so slot `i` lands
    /// at the per-type offset counting earlier same-typed parameters.
    fn bind_param(&mut self, arg: Addr, slot: Addr) -> Result<()> {
        let value = self.read(arg)?;

        let staged_name = self
            .pending
            .last()
            .map(|frame| frame.func.clone())
            .ok_or_else(|| Error::StackUnderflow {
                stack: "pending frames".to_string(),
            })?;
        let entry = self.func_entry(&staged_name)?;
        let params = &entry.params;

        let index = slot.0 as usize;
        let vt = *params.get(index).ok_or_else(|| {
            Error::address(format!("parameter slot {} out of range", index))
        })?;
        let offset = params[..index].iter().filter(|p| **p == vt).count();

        let staged = self.pending.last_mut().ok_or_else(|| Error::StackUnderflow {
            stack: "pending frames".to_string(),
        })?;
        staged.local.write(vt, offset, value)
    }

    // ---- memory access ----

    fn load(&self, segment: Segment, vt: ValueType, offset: usize) -> Result<Value> {
        match segment {
            Segment::Global => self.global.read(vt, offset),
            Segment::Constant => self.constants.read(vt, offset),
            Segment::Local => self.frame()?.local.read(vt, offset),
            Segment::Temporal => self.frame()?.temporal.read(vt, offset),
        }
    }

    /// Reads a cell, chasing a pointer cell exactly one level
    fn read(&self, addr: Addr) -> Result<Value> {
        let (segment, vt) = self.mapper.resolve(addr)?;
        let offset = self.mapper.context_offset(addr)?;
        let value = self.load(segment, vt, offset)?;

        if vt != ValueType::Pointer {
            return Ok(value);
        }

        let target = Addr(value.as_int()? as i32);
        let (tsegment, tvt) = self.mapper.resolve(target)?;
        if tvt == ValueType::Pointer {
            return Err(Error::address("pointer cell targets another pointer"));
        }
        let toffset = self.mapper.context_offset(target)?;
        self.load(tsegment, tvt, toffset)
    }

    /// Writes straight into the addressed cell, pointers included (this
    /// is how pointer temporals receive their target address)
    fn write_raw(&mut self, addr: Addr, value: Value) -> Result<()> {
        let (segment, vt) = self.mapper.resolve(addr)?;
        let offset = self.mapper.context_offset(addr)?;
        match segment {
            Segment::Global => self.global.write(vt, offset, value),
            Segment::Constant => Err(Error::address("write into the constant segment")),
            Segment::Local => self.frame_mut()?.local.write(vt, offset, value),
            Segment::Temporal => self.frame_mut()?.temporal.write(vt, offset, value),
        }
    }

    /// Assignment write: a pointer target redirects to the cell whose
    /// address the pointer holds
    fn write_assign(&mut self, addr: Addr, value: Value) -> Result<()> {
        let (_, vt) = self.mapper.resolve(addr)?;
        if vt == ValueType::Pointer {
            let offset = self.mapper.context_offset(addr)?;
            let held = self.frame()?.temporal.read(ValueType::Pointer, offset)?;
            let target = Addr(held.as_int()? as i32);
            self.write_raw(target, value)
        } else {
            self.write_raw(addr, value)
        }
    }

    // ---- render ----

    fn render_op(&mut self, instr: Instruction) -> Result<()> {
        let tag = RenderTag::from_id(instr.lhs.0)
            .ok_or_else(|| Error::address(format!("unknown render tag id {}", instr.lhs.0)))?;

        // addresses at or below zero carry no payload
        let value = if instr.rhs.0 > 0 {
            Some(match self.read(instr.rhs)? {
                Value::Int(n) => RenderValue::Int(n),
                Value::Float(x) => RenderValue::Float(x),
                Value::Str(s) => RenderValue::Str(s),
                Value::Bool(b) => RenderValue::Bool(b),
            })
        } else {
            None
        };

        let attribute = if instr.result.0 > 0 {
            Some(self.read(instr.result)?.as_str()?.to_string())
        } else {
            None
        };

        debug!(%tag, ?attribute, "render op");
        self.render_log.push(RenderOp {
            tag,
            value,
            attribute,
        });
        Ok(())
    }
}

/// Builds a fresh activation record from a function table entry
fn stage_frame(name: &str, entry: &FuncEntry) -> Result<Frame> {
    let size = entry.size.ok_or_else(|| {
        Error::address(format!("function {} has no recorded frame size", name))
    })?;
    let func_start = entry.func_start.ok_or_else(|| {
        Error::address(format!("function {} has no recorded start", name))
    })?;
    Ok(Frame {
        func: name.to_string(),
        local: MemoryStore::new(&size.local),
        temporal: MemoryStore::new(&size.temporal),
        ip: func_start,
    })
}

fn decode_literal(text: &str, vt: ValueType) -> Result<Value> {
    match vt {
        ValueType::Int => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Error::address(format!("bad int literal {}", text))),
        ValueType::Float => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Error::address(format!("bad float literal {}", text))),
        ValueType::Bool => Ok(Value::Bool(text == "true")),
        ValueType::Str => {
            // quoted keys are user strings; bare keys are names interned
            // for era and render attributes
            let inner = if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
                &text[1..text.len() - 1]
            } else {
                text
            };
            Ok(Value::Str(inner.to_string()))
        }
        ValueType::Pointer => Err(Error::address("literal mapped into pointer cells")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_literals() {
        assert_eq!(
            decode_literal("42", ValueType::Int).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            decode_literal("2.5", ValueType::Float).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            decode_literal("true", ValueType::Bool).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            decode_literal("\"hi\"", ValueType::Str).unwrap(),
            Value::Str("hi".to_string())
        );
        assert_eq!(
            decode_literal("main", ValueType::Str).unwrap(),
            Value::Str("main".to_string())
        );
    }
}
