//! Code generation context
//!
//! The parser drives this struct through small hooks fired between
//! grammar symbols; together they implement single-pass compilation to
//! quadruples. State lives in four stacks: operands (flat virtual
//! addresses, never tagged values), operators (with fake floors isolating
//! parenthesized and argument expressions), pending jumps, and staged
//! calls. Types are recovered from addresses through the memory mapper;
//! the one exception is pointer temporals, whose element type is kept in
//! a compile-time side map the VM never sees.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::MemoryMapper;
use crate::render::RenderTag;
use crate::semantics::cube;
use crate::semantics::types::{
    Addr, CompilationOutput, FrameSize, FuncEntry, Instruction, Operation, Operator, ReturnType,
    Segment, ValueType, VarEntry, VarKind,
};

/// Scope name for code outside any function
pub const GLOBAL_SCOPE: &str = "global";

/// Scope name for the render body
pub const RENDER_SCOPE: &str = "render";

/// A compiled page: the serializable artifact plus the address layout it
/// was compiled under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPage {
    /// Function table, literal table and quadruple stream
    pub output: CompilationOutput,
    /// Frozen address layout
    pub mapper: MemoryMapper,
}

/// Operator stack entry
#[derive(Debug, Clone, Copy, PartialEq)]
enum OpEntry {
    /// Fake floor: boundary no resolution may cross
    Floor,
    /// A pending operator
    Op(Operator),
}

/// A call being compiled; nesting is handled by stacking these
#[derive(Debug, Clone)]
struct CallFrame {
    name: String,
    params: Vec<ValueType>,
    return_type: ReturnType,
    return_addr: Option<Addr>,
    func_start: usize,
    name_lit: Addr,
    args_seen: usize,
}

/// A `for` loop being compiled
#[derive(Debug, Clone)]
struct ForFrame {
    ctrl: Addr,
    ctrl_type: ValueType,
    limit: Option<(Addr, ValueType)>,
    step: Option<(Addr, ValueType)>,
    head: usize,
    exit_jump: usize,
}

/// An array or matrix access being compiled
#[derive(Debug, Clone)]
struct IndexFrame {
    name: String,
    base: Addr,
    element_type: ValueType,
    dims: Vec<usize>,
    indices_done: usize,
    offset: Option<Addr>,
}

/// Single-pass code generator and symbol table
pub struct CodeGenerator {
    mapper: MemoryMapper,
    func_table: HashMap<String, FuncEntry>,
    literal_table: HashMap<String, Addr>,
    instructions: Vec<Instruction>,
    current: String,
    operand_stack: Vec<Addr>,
    operator_stack: Vec<OpEntry>,
    jump_stack: Vec<usize>,
    call_stack: Vec<CallFrame>,
    for_stack: Vec<ForFrame>,
    index_stack: Vec<IndexFrame>,
    pointer_types: HashMap<Addr, ValueType>,
}

impl CodeGenerator {
    /// Starts a generator in the global scope
    pub fn new(mapper: MemoryMapper) -> Self {
        let mut func_table = HashMap::new();
        func_table.insert(GLOBAL_SCOPE.to_string(), FuncEntry::new(ReturnType::Void));

        CodeGenerator {
            mapper,
            func_table,
            literal_table: HashMap::new(),
            instructions: Vec::new(),
            current: GLOBAL_SCOPE.to_string(),
            operand_stack: Vec::new(),
            operator_stack: Vec::new(),
            jump_stack: Vec::new(),
            call_stack: Vec::new(),
            for_stack: Vec::new(),
            index_stack: Vec::new(),
            pointer_types: HashMap::new(),
        }
    }

    // ---- low-level helpers ----

    fn emit(&mut self, instr: Instruction) -> usize {
        let index = self.instructions.len();
        debug!(
            index,
            operation = ?instr.operation,
            lhs = instr.lhs.0,
            rhs = instr.rhs.0,
            result = instr.result.0,
            "emit quadruple"
        );
        self.instructions.push(instr);
        index
    }

    /// Fills a jump emitted earlier with its now-known target
    ///
    /// The slot must still hold the sentinel; a second fill is a bug in
    /// the generator itself and aborts compilation.
    fn fill_pending_jump(&mut self, index: usize, target: usize) -> Result<()> {
        let instr = self
            .instructions
            .get_mut(index)
            .ok_or(Error::InvalidBackpatch { index })?;
        if !instr.result.is_none() {
            return Err(Error::InvalidBackpatch { index });
        }
        instr.result = Addr(target as i32);
        debug!(index, target, "backpatch jump");
        Ok(())
    }

    fn pop_operand(&mut self) -> Result<Addr> {
        self.operand_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "operand".to_string(),
        })
    }

    fn current_entry_mut(&mut self) -> &mut FuncEntry {
        // the current scope is always registered
        self.func_table.get_mut(&self.current).unwrap()
    }

    fn in_function(&self) -> bool {
        self.current != GLOBAL_SCOPE && self.current != RENDER_SCOPE
    }

    fn var_segment(&self) -> Segment {
        if self.current == GLOBAL_SCOPE {
            Segment::Global
        } else {
            Segment::Local
        }
    }

    fn new_temporal(&mut self, vt: ValueType) -> Result<Addr> {
        self.mapper.allocate(vt, Segment::Temporal)
    }

    /// Type of the value an address stands for, looking through pointers
    fn operand_type(&self, addr: Addr) -> Result<ValueType> {
        let (_, vt) = self.mapper.resolve(addr)?;
        if vt == ValueType::Pointer {
            self.pointer_types
                .get(&addr)
                .copied()
                .ok_or_else(|| Error::address(format!("pointer {} has no element type", addr)))
        } else {
            Ok(vt)
        }
    }

    fn lookup_var(&self, name: &str) -> Result<VarEntry> {
        if let Some(vars) = self.func_table[&self.current].vars.as_ref() {
            if let Some(entry) = vars.get(name) {
                return Ok(entry.clone());
            }
        }
        if let Some(vars) = self.func_table[GLOBAL_SCOPE].vars.as_ref() {
            if let Some(entry) = vars.get(name) {
                return Ok(entry.clone());
            }
        }
        Err(Error::UndefinedIdentifier {
            name: name.to_string(),
        })
    }

    // ---- literals ----

    fn literal(&mut self, key: String, vt: ValueType) -> Result<Addr> {
        if let Some(addr) = self.literal_table.get(&key) {
            return Ok(*addr);
        }
        let addr = self.mapper.allocate(vt, Segment::Constant)?;
        self.literal_table.insert(key, addr);
        Ok(addr)
    }

    /// Address of an integer literal, interned on first use
    pub fn int_literal(&mut self, value: i64) -> Result<Addr> {
        self.literal(value.to_string(), ValueType::Int)
    }

    /// Address of a float literal
    pub fn float_literal(&mut self, value: f64) -> Result<Addr> {
        // keep a trailing .0 so the key never collides with an int key
        let key = if value.fract() == 0.0 && value.is_finite() {
            format!("{:.1}", value)
        } else {
            value.to_string()
        };
        self.literal(key, ValueType::Float)
    }

    /// Address of a string literal
    ///
    /// Keys keep their quotes so a user string never collides with a
    /// bare name literal used by `era` or render attributes.
    pub fn string_literal(&mut self, value: &str) -> Result<Addr> {
        self.literal(format!("\"{}\"", value), ValueType::Str)
    }

    /// Address of a boolean literal
    pub fn bool_literal(&mut self, value: bool) -> Result<Addr> {
        self.literal(value.to_string(), ValueType::Bool)
    }

    /// Address of a bare name literal (function names, attribute names)
    fn name_literal(&mut self, name: &str) -> Result<Addr> {
        self.literal(name.to_string(), ValueType::Str)
    }

    // ---- operand / operator stack hooks ----

    /// Pushes a named variable on the operand stack
    pub fn push_operand(&mut self, name: &str) -> Result<()> {
        let entry = self.lookup_var(name)?;
        self.operand_stack.push(entry.addr);
        Ok(())
    }

    /// Pushes an already-resolved address (literals, call results)
    pub fn push_operand_addr(&mut self, addr: Addr) {
        self.operand_stack.push(addr);
    }

    /// Pushes a pending binary operator
    pub fn push_operator(&mut self, op: Operator) {
        self.operator_stack.push(OpEntry::Op(op));
    }

    /// Opens a fake floor: pending operators above it are untouchable
    pub fn push_floor(&mut self) {
        self.operator_stack.push(OpEntry::Floor);
    }

    /// Closes the innermost fake floor
    pub fn pop_floor(&mut self) -> Result<()> {
        match self.operator_stack.pop() {
            Some(OpEntry::Floor) => Ok(()),
            _ => Err(Error::StackUnderflow {
                stack: "operator (expected floor)".to_string(),
            }),
        }
    }

    /// Resolves pending operators from `set` sitting on top of the stack
    ///
    /// Called after each operand at a given precedence level; the fake
    /// floor stops resolution from escaping a parenthesized group.
    pub fn resolve_pending(&mut self, set: &[Operator]) -> Result<()> {
        while let Some(OpEntry::Op(op)) = self.operator_stack.last().copied() {
            if !set.contains(&op) {
                break;
            }
            self.operator_stack.pop();
            self.apply_operator(op)?;
        }
        Ok(())
    }

    fn apply_operator(&mut self, op: Operator) -> Result<()> {
        let rhs = self.pop_operand()?;
        let lhs = self.pop_operand()?;
        let lhs_type = self.operand_type(lhs)?;
        let rhs_type = self.operand_type(rhs)?;
        let result_type = cube::result_type(op, lhs_type, rhs_type)?;

        let result = self.new_temporal(result_type)?;
        self.emit(Instruction::new(op.into(), lhs, rhs, result));
        self.operand_stack.push(result);
        Ok(())
    }

    /// Resolves an assignment: the target address and a pending `=` were
    /// pushed before the value expression was parsed
    pub fn resolve_assignment(&mut self) -> Result<()> {
        match self.operator_stack.pop() {
            Some(OpEntry::Op(Operator::Assign)) => {}
            _ => {
                return Err(Error::StackUnderflow {
                    stack: "operator (expected =)".to_string(),
                })
            }
        }

        let value = self.pop_operand()?;
        let target = self.pop_operand()?;
        let target_type = self.operand_type(target)?;
        let value_type = self.operand_type(value)?;

        if !cube::assignable(target_type, value_type) {
            return Err(Error::TypeError {
                expected: target_type.to_string(),
                got: value_type.to_string(),
            });
        }

        self.emit(Instruction::new(
            Operation::Assign,
            value,
            Addr::NONE,
            target,
        ));
        Ok(())
    }

    /// Drops an unused expression result (statement-level calls)
    pub fn discard_top(&mut self) -> Result<()> {
        self.pop_operand().map(|_| ())
    }

    // ---- declarations ----

    /// Declares a variable in the active scope
    pub fn add_var(&mut self, name: &str, vt: ValueType, dims: Vec<usize>) -> Result<Addr> {
        if self.current == GLOBAL_SCOPE && self.func_table.contains_key(name) {
            return Err(Error::DuplicateIdentifier {
                name: name.to_string(),
            });
        }

        let segment = self.var_segment();
        let entry_vars = self.current_entry_mut();
        let vars = entry_vars.vars.as_ref().unwrap();
        if vars.contains_key(name) {
            return Err(Error::DuplicateIdentifier {
                name: name.to_string(),
            });
        }

        let addr = self.mapper.allocate(vt, segment)?;
        let cells: usize = dims.iter().product::<usize>().max(1);
        if cells > 1 {
            self.mapper.bulk_advance(vt, segment, cells - 1)?;
        }

        let kind = match dims.len() {
            0 => None,
            1 => Some(VarKind::Array),
            _ => Some(VarKind::Matrix),
        };

        let entry = VarEntry {
            value_type: vt,
            kind,
            dims,
            addr,
        };
        self.current_entry_mut()
            .vars
            .as_mut()
            .unwrap()
            .insert(name.to_string(), entry);
        Ok(addr)
    }

    /// Declares a parameter of the current function
    pub fn add_param(&mut self, name: &str, vt: ValueType) -> Result<()> {
        self.current_entry_mut().params.push(vt);
        self.add_var(name, vt, Vec::new())?;
        Ok(())
    }

    /// Assigns one element of an array initializer list
    ///
    /// The literal value must already sit on the operand stack. Backing
    /// cells are contiguous, so element `i` lives at `base + i`.
    pub fn array_init_element(&mut self, name: &str, index: usize) -> Result<()> {
        let entry = self.lookup_var(name)?;
        let cells = entry.cell_count();
        if index >= cells {
            return Err(Error::IndexOutOfBounds {
                index: index as i64,
                bound: cells as i64,
            });
        }

        let value = self.pop_operand()?;
        let value_type = self.operand_type(value)?;
        if !cube::assignable(entry.value_type, value_type) {
            return Err(Error::TypeError {
                expected: entry.value_type.to_string(),
                got: value_type.to_string(),
            });
        }

        self.emit(Instruction::new(
            Operation::Assign,
            value,
            Addr::NONE,
            Addr(entry.addr.0 + index as i32),
        ));
        Ok(())
    }

    // ---- functions ----

    /// Registers a function and switches into its scope
    ///
    /// Emits the pending skip jump that lets inline global statements
    /// step over the body; it is filled when the body ends.
    pub fn register_func(&mut self, name: &str, return_type: ReturnType) -> Result<()> {
        if self.func_table.contains_key(name) || name == RENDER_SCOPE {
            return Err(Error::DuplicateFunction {
                name: name.to_string(),
            });
        }
        if let Some(globals) = self.func_table[GLOBAL_SCOPE].vars.as_ref() {
            if globals.contains_key(name) {
                return Err(Error::DuplicateIdentifier {
                    name: name.to_string(),
                });
            }
        }

        let mut entry = FuncEntry::new(return_type);

        if let Some(vt) = return_type.as_value_type() {
            let return_addr = self.mapper.allocate(vt, Segment::Global)?;
            entry.return_addr = Some(return_addr);
            // the return slot doubles as a global named after the function
            self.func_table
                .get_mut(GLOBAL_SCOPE)
                .unwrap()
                .vars
                .as_mut()
                .unwrap()
                .insert(
                    name.to_string(),
                    VarEntry {
                        value_type: vt,
                        kind: Some(VarKind::FuncReturn),
                        dims: Vec::new(),
                        addr: return_addr,
                    },
                );
        }

        let skip = self.emit(Instruction::new(
            Operation::Goto,
            Addr::NONE,
            Addr::NONE,
            Addr::NONE,
        ));
        self.jump_stack.push(skip);

        entry.func_start = Some(self.instructions.len());
        self.func_table.insert(name.to_string(), entry);
        self.current = name.to_string();
        debug!(func = name, "enter function scope");
        Ok(())
    }

    /// Closes the current function body
    pub fn end_func(&mut self) -> Result<()> {
        let size = FrameSize {
            local: self.mapper.size_of(Segment::Local)?,
            temporal: self.mapper.size_of(Segment::Temporal)?,
        };

        let entry = self.current_entry_mut();
        entry.size = Some(size);
        entry.vars = None;

        self.emit(Instruction::new(
            Operation::EndFunc,
            Addr::NONE,
            Addr::NONE,
            Addr::NONE,
        ));

        self.mapper.reset(Segment::Local)?;
        self.mapper.reset(Segment::Temporal)?;
        self.pointer_types.clear();

        let skip = self.jump_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "jump".to_string(),
        })?;
        let target = self.instructions.len();
        self.fill_pending_jump(skip, target)?;

        self.current = GLOBAL_SCOPE.to_string();
        Ok(())
    }

    /// Handles a `return` statement; the value, if any, is on the
    /// operand stack
    pub fn handle_return(&mut self, has_value: bool) -> Result<()> {
        if !self.in_function() {
            return Err(Error::ReturnOutsideFunction);
        }

        let return_type = self.func_table[&self.current].return_type;
        if has_value {
            let value = self.pop_operand()?;
            let value_type = self.operand_type(value)?;
            match return_type.as_value_type() {
                Some(expected) if expected == value_type => {}
                Some(expected) => {
                    return Err(Error::TypeError {
                        expected: expected.to_string(),
                        got: value_type.to_string(),
                    });
                }
                None => {
                    return Err(Error::TypeError {
                        expected: "void".to_string(),
                        got: value_type.to_string(),
                    });
                }
            }
            self.emit(Instruction::new(
                Operation::Return,
                Addr::NONE,
                Addr::NONE,
                value,
            ));
        } else {
            if return_type != ReturnType::Void {
                return Err(Error::TypeError {
                    expected: return_type.to_string(),
                    got: "void".to_string(),
                });
            }
            self.emit(Instruction::new(
                Operation::Return,
                Addr::NONE,
                Addr::NONE,
                Addr::NONE,
            ));
        }
        Ok(())
    }

    // ---- calls ----

    /// Starts compiling a call: stages the activation record
    pub fn call_begin(&mut self, name: &str) -> Result<()> {
        if name == GLOBAL_SCOPE || name == RENDER_SCOPE {
            return Err(Error::UndefinedFunction {
                name: name.to_string(),
            });
        }
        let entry = self
            .func_table
            .get(name)
            .ok_or_else(|| Error::UndefinedFunction {
                name: name.to_string(),
            })?
            .clone();
        let func_start = entry.func_start.ok_or_else(|| Error::UndefinedFunction {
            name: name.to_string(),
        })?;

        let name_lit = self.name_literal(name)?;
        self.push_floor();
        self.call_stack.push(CallFrame {
            name: name.to_string(),
            params: entry.params,
            return_type: entry.return_type,
            return_addr: entry.return_addr,
            func_start,
            name_lit,
            args_seen: 0,
        });

        self.emit(Instruction::new(
            Operation::Era,
            name_lit,
            Addr::NONE,
            Addr::NONE,
        ));
        Ok(())
    }

    /// Binds the argument expression just parsed to the next parameter
    pub fn call_arg(&mut self) -> Result<()> {
        let arg = self.pop_operand()?;
        let arg_type = self.operand_type(arg)?;

        let frame = self.call_stack.last_mut().ok_or_else(|| Error::StackUnderflow {
            stack: "call".to_string(),
        })?;
        let index = frame.args_seen;
        if index >= frame.params.len() {
            return Err(Error::TooManyArguments {
                func: frame.name.clone(),
                expected: frame.params.len(),
            });
        }
        let expected = frame.params[index];
        if !cube::assignable(expected, arg_type) {
            return Err(Error::TypeError {
                expected: expected.to_string(),
                got: arg_type.to_string(),
            });
        }
        frame.args_seen += 1;

        self.emit(Instruction::new(
            Operation::Param,
            arg,
            Addr::NONE,
            Addr(index as i32),
        ));
        Ok(())
    }

    /// Finishes a call; returns true when a result value was pushed
    pub fn call_end(&mut self) -> Result<bool> {
        let frame = self.call_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "call".to_string(),
        })?;
        if frame.args_seen < frame.params.len() {
            return Err(Error::MissingArguments {
                func: frame.name,
                expected: frame.params.len(),
                got: frame.args_seen,
            });
        }
        self.pop_floor()?;

        self.emit(Instruction::new(
            Operation::Gosub,
            frame.name_lit,
            Addr::NONE,
            Addr(frame.func_start as i32),
        ));

        if let Some(vt) = frame.return_type.as_value_type() {
            // snapshot the shared return slot before anything clobbers it
            let return_addr = frame.return_addr.ok_or_else(|| {
                Error::address(format!("function {} has no return slot", frame.name))
            })?;
            let temp = self.new_temporal(vt)?;
            self.emit(Instruction::new(
                Operation::Assign,
                return_addr,
                Addr::NONE,
                temp,
            ));
            self.operand_stack.push(temp);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ---- control flow ----

    /// After an `if` condition: validates it and leaves the false-jump
    /// pending
    pub fn if_begin(&mut self) -> Result<()> {
        let cond = self.pop_operand()?;
        let cond_type = self.operand_type(cond)?;
        if cond_type != ValueType::Bool {
            return Err(Error::TypeError {
                expected: "bool".to_string(),
                got: cond_type.to_string(),
            });
        }

        let jump = self.emit(Instruction::new(
            Operation::GotoF,
            cond,
            Addr::NONE,
            Addr::NONE,
        ));
        self.jump_stack.push(jump);
        Ok(())
    }

    /// Between the then and else branches
    pub fn if_else(&mut self) -> Result<()> {
        let false_jump = self.jump_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "jump".to_string(),
        })?;
        let end_jump = self.emit(Instruction::new(
            Operation::Goto,
            Addr::NONE,
            Addr::NONE,
            Addr::NONE,
        ));
        self.jump_stack.push(end_jump);
        let target = self.instructions.len();
        self.fill_pending_jump(false_jump, target)
    }

    /// After the last branch of an `if`
    pub fn if_end(&mut self) -> Result<()> {
        let jump = self.jump_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "jump".to_string(),
        })?;
        let target = self.instructions.len();
        self.fill_pending_jump(jump, target)
    }

    /// Before a `while` condition: remembers the re-evaluation point
    pub fn while_begin(&mut self) {
        self.jump_stack.push(self.instructions.len());
    }

    /// After a `while` condition
    pub fn while_cond(&mut self) -> Result<()> {
        self.if_begin()
    }

    /// After a `while` body
    pub fn while_end(&mut self) -> Result<()> {
        let exit_jump = self.jump_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "jump".to_string(),
        })?;
        let head = self.jump_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "jump".to_string(),
        })?;

        self.emit(Instruction::new(
            Operation::Goto,
            Addr::NONE,
            Addr::NONE,
            Addr(head as i32),
        ));
        let target = self.instructions.len();
        self.fill_pending_jump(exit_jump, target)
    }

    /// Binds the control variable of a `for` loop
    pub fn for_control(&mut self, name: &str) -> Result<()> {
        let entry = self.lookup_var(name)?;
        if !entry.dims.is_empty()
            || !matches!(entry.value_type, ValueType::Int | ValueType::Float)
        {
            return Err(Error::TypeError {
                expected: "int or float".to_string(),
                got: entry.value_type.to_string(),
            });
        }

        self.for_stack.push(ForFrame {
            ctrl: entry.addr,
            ctrl_type: entry.value_type,
            limit: None,
            step: None,
            head: 0,
            exit_jump: 0,
        });
        Ok(())
    }

    fn for_frame_mut(&mut self) -> Result<&mut ForFrame> {
        self.for_stack.last_mut().ok_or_else(|| Error::StackUnderflow {
            stack: "for".to_string(),
        })
    }

    /// After the initial-value expression of a `for`
    pub fn for_init(&mut self) -> Result<()> {
        let value = self.pop_operand()?;
        let value_type = self.operand_type(value)?;
        let frame = self.for_frame_mut()?;
        let (ctrl, ctrl_type) = (frame.ctrl, frame.ctrl_type);
        if !cube::assignable(ctrl_type, value_type) {
            return Err(Error::TypeError {
                expected: ctrl_type.to_string(),
                got: value_type.to_string(),
            });
        }
        self.emit(Instruction::new(Operation::Assign, value, Addr::NONE, ctrl));
        Ok(())
    }

    fn for_snapshot(&mut self) -> Result<(Addr, ValueType)> {
        let value = self.pop_operand()?;
        let value_type = self.operand_type(value)?;
        if !matches!(value_type, ValueType::Int | ValueType::Float) {
            return Err(Error::TypeError {
                expected: "int or float".to_string(),
                got: value_type.to_string(),
            });
        }
        // snapshot into a temporal so later mutation cannot move the bound
        let temp = self.new_temporal(value_type)?;
        self.emit(Instruction::new(Operation::Assign, value, Addr::NONE, temp));
        Ok((temp, value_type))
    }

    /// After the limit expression of a `for`
    pub fn for_limit(&mut self) -> Result<()> {
        let snapshot = self.for_snapshot()?;
        self.for_frame_mut()?.limit = Some(snapshot);
        Ok(())
    }

    /// After the optional step expression of a `for`
    pub fn for_step(&mut self) -> Result<()> {
        let snapshot = self.for_snapshot()?;
        self.for_frame_mut()?.step = Some(snapshot);
        Ok(())
    }

    /// Before the `for` body: emits the exclusive-bound comparison
    pub fn for_head(&mut self) -> Result<()> {
        if self.for_frame_mut()?.step.is_none() {
            let one = self.int_literal(1)?;
            self.for_frame_mut()?.step = Some((one, ValueType::Int));
        }

        let head = self.instructions.len();
        let (ctrl, limit) = {
            let frame = self.for_frame_mut()?;
            let limit = frame.limit.ok_or_else(|| Error::StackUnderflow {
                stack: "for (missing limit)".to_string(),
            })?;
            (frame.ctrl, limit.0)
        };

        let cond = self.new_temporal(ValueType::Bool)?;
        self.emit(Instruction::new(Operation::Lt, ctrl, limit, cond));
        let exit_jump = self.emit(Instruction::new(
            Operation::GotoF,
            cond,
            Addr::NONE,
            Addr::NONE,
        ));

        let frame = self.for_frame_mut()?;
        frame.head = head;
        frame.exit_jump = exit_jump;
        Ok(())
    }

    /// After the `for` body: increments and loops back
    pub fn for_end(&mut self) -> Result<()> {
        let frame = self.for_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "for".to_string(),
        })?;
        let (step, step_type) = frame.step.ok_or_else(|| Error::StackUnderflow {
            stack: "for (missing step)".to_string(),
        })?;

        let sum_type = cube::result_type(Operator::Add, frame.ctrl_type, step_type)?;
        let sum = self.new_temporal(sum_type)?;
        self.emit(Instruction::new(Operation::Add, frame.ctrl, step, sum));
        self.emit(Instruction::new(
            Operation::Assign,
            sum,
            Addr::NONE,
            frame.ctrl,
        ));
        self.emit(Instruction::new(
            Operation::Goto,
            Addr::NONE,
            Addr::NONE,
            Addr(frame.head as i32),
        ));

        let target = self.instructions.len();
        self.fill_pending_jump(frame.exit_jump, target)
    }

    // ---- array / matrix access ----

    /// Starts an indexed access; returns the declared dimension count
    pub fn index_begin(&mut self, name: &str) -> Result<usize> {
        let entry = self.lookup_var(name)?;
        if !matches!(entry.kind, Some(VarKind::Array) | Some(VarKind::Matrix)) {
            return Err(Error::NotIndexable {
                name: name.to_string(),
            });
        }

        self.push_floor();
        let dims = entry.dims.clone();
        let count = dims.len();
        self.index_stack.push(IndexFrame {
            name: name.to_string(),
            base: entry.addr,
            element_type: entry.value_type,
            dims,
            indices_done: 0,
            offset: None,
        });
        Ok(count)
    }

    /// After one index expression: bounds-checks it and folds it into
    /// the linear offset
    pub fn index_dim(&mut self) -> Result<()> {
        let index = self.pop_operand()?;
        let index_type = self.operand_type(index)?;
        if index_type != ValueType::Int {
            return Err(Error::TypeError {
                expected: "int".to_string(),
                got: index_type.to_string(),
            });
        }

        let (name, dims, done, offset) = {
            let frame = self.index_stack.last().ok_or_else(|| Error::StackUnderflow {
                stack: "index".to_string(),
            })?;
            (
                frame.name.clone(),
                frame.dims.clone(),
                frame.indices_done,
                frame.offset,
            )
        };

        if done >= dims.len() {
            return Err(Error::DimensionMismatch {
                name,
                expected: dims.len(),
                got: done + 1,
            });
        }

        let bound = self.int_literal(dims[done] as i64)?;
        self.emit(Instruction::new(
            Operation::Verify,
            index,
            Addr::NONE,
            bound,
        ));

        let new_offset = if dims.len() == 2 && done == 0 {
            // row index scales by the row width
            let width = self.int_literal(dims[1] as i64)?;
            let scaled = self.new_temporal(ValueType::Int)?;
            self.emit(Instruction::new(Operation::Mul, index, width, scaled));
            scaled
        } else if let Some(prev) = offset {
            let folded = self.new_temporal(ValueType::Int)?;
            self.emit(Instruction::new(Operation::Add, prev, index, folded));
            folded
        } else {
            index
        };

        let frame = self.index_stack.last_mut().unwrap();
        frame.offset = Some(new_offset);
        frame.indices_done += 1;
        Ok(())
    }

    /// Finishes an indexed access, pushing a pointer temporal whose cell
    /// will hold the absolute element address at runtime
    pub fn index_end(&mut self) -> Result<Addr> {
        let frame = self.index_stack.pop().ok_or_else(|| Error::StackUnderflow {
            stack: "index".to_string(),
        })?;
        if frame.indices_done != frame.dims.len() {
            return Err(Error::DimensionMismatch {
                name: frame.name,
                expected: frame.dims.len(),
                got: frame.indices_done,
            });
        }

        let offset = frame.offset.ok_or_else(|| Error::StackUnderflow {
            stack: "index (no offset folded)".to_string(),
        })?;
        let base = self.int_literal(frame.base.0 as i64)?;
        let pointer = self.new_temporal(ValueType::Pointer)?;
        self.emit(Instruction::new(Operation::Add, offset, base, pointer));
        self.pointer_types.insert(pointer, frame.element_type);

        self.pop_floor()?;
        self.operand_stack.push(pointer);
        Ok(pointer)
    }

    // ---- print and render ----

    /// Emits a print of the value on top of the operand stack
    pub fn print_value(&mut self) -> Result<()> {
        let value = self.pop_operand()?;
        self.emit(Instruction::new(
            Operation::Print,
            value,
            Addr::NONE,
            Addr::NONE,
        ));
        Ok(())
    }

    /// Opens a render element
    pub fn render_open(&mut self, tag: RenderTag) {
        self.emit(Instruction::new(
            Operation::RenderOp,
            Addr(tag.id()),
            Addr::NONE,
            Addr::NONE,
        ));
    }

    /// Sets one attribute of a render element; the value is on the
    /// operand stack
    pub fn render_attr(&mut self, tag: RenderTag, attribute: &str) -> Result<()> {
        let value = self.pop_operand()?;
        let attr_lit = self.name_literal(attribute)?;
        self.emit(Instruction::new(
            Operation::RenderOp,
            Addr(tag.id()),
            value,
            attr_lit,
        ));
        Ok(())
    }

    // ---- render scope and program end ----

    /// Enters the render body, emitting the frame-switch jump
    pub fn begin_render(&mut self) -> Result<()> {
        if self.func_table.contains_key(RENDER_SCOPE) {
            return Err(Error::DuplicateFunction {
                name: RENDER_SCOPE.to_string(),
            });
        }

        self.emit(Instruction::new(
            Operation::GotoRender,
            Addr::NONE,
            Addr::NONE,
            Addr::NONE,
        ));

        let mut entry = FuncEntry::new(ReturnType::Void);
        entry.func_start = Some(self.instructions.len());
        self.func_table.insert(RENDER_SCOPE.to_string(), entry);
        self.current = RENDER_SCOPE.to_string();
        debug!("enter render scope");
        Ok(())
    }

    /// Closes the render body (no endfunc: the program ends here)
    pub fn end_render(&mut self) -> Result<()> {
        let size = FrameSize {
            local: self.mapper.size_of(Segment::Local)?,
            temporal: self.mapper.size_of(Segment::Temporal)?,
        };
        let entry = self.current_entry_mut();
        entry.size = Some(size);
        entry.vars = None;

        self.mapper.reset(Segment::Local)?;
        self.mapper.reset(Segment::Temporal)?;
        self.pointer_types.clear();
        self.current = GLOBAL_SCOPE.to_string();
        Ok(())
    }

    /// Seals the program: emits `endprog`, records the global footprint
    /// and checks that no jump is left pending
    pub fn end_program(mut self) -> Result<CompiledPage> {
        self.emit(Instruction::new(
            Operation::EndProg,
            Addr::NONE,
            Addr::NONE,
            Addr::NONE,
        ));

        let global_size = FrameSize {
            local: self.mapper.size_of(Segment::Global)?,
            temporal: Default::default(),
        };
        self.func_table
            .get_mut(GLOBAL_SCOPE)
            .unwrap()
            .size = Some(global_size);

        if let Some(&pending) = self.jump_stack.last() {
            return Err(Error::UnresolvedJump { index: pending });
        }
        for (index, instr) in self.instructions.iter().enumerate() {
            let is_jump = matches!(
                instr.operation,
                Operation::Goto | Operation::GotoF | Operation::GotoT | Operation::Gosub
            );
            if is_jump && instr.result.is_none() {
                return Err(Error::UnresolvedJump { index });
            }
        }

        Ok(CompiledPage {
            output: CompilationOutput {
                func_table: self.func_table,
                literal_table: self.literal_table,
                quadruples: self.instructions,
            },
            mapper: self.mapper,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen() -> CodeGenerator {
        CodeGenerator::new(MemoryMapper::default_layout().unwrap())
    }

    #[test]
    fn test_literal_idempotence() {
        let mut g = gen();
        let a = g.int_literal(5).unwrap();
        let b = g.int_literal(5).unwrap();
        assert_eq!(a, b);
        let c = g.int_literal(6).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_string_and_name_literals_do_not_collide() {
        let mut g = gen();
        let quoted = g.string_literal("f").unwrap();
        let bare = g.name_literal("f").unwrap();
        assert_ne!(quoted, bare);
    }

    #[test]
    fn test_float_and_int_literal_keys_distinct() {
        let mut g = gen();
        let i = g.int_literal(2).unwrap();
        let f = g.float_literal(2.0).unwrap();
        assert_ne!(i, f);
    }

    #[test]
    fn test_expression_emits_temporal() {
        let mut g = gen();
        g.register_func("f", ReturnType::Void).unwrap();
        let a = g.int_literal(2).unwrap();
        let b = g.int_literal(3).unwrap();
        g.push_operand_addr(a);
        g.push_operator(Operator::Add);
        g.push_operand_addr(b);
        g.resolve_pending(&[Operator::Add, Operator::Sub]).unwrap();

        let quad = *g.instructions.last().unwrap();
        assert_eq!(quad.operation, Operation::Add);
        assert_eq!(quad.lhs, a);
        assert_eq!(quad.rhs, b);
        assert_eq!(
            g.mapper.resolve(quad.result).unwrap(),
            (Segment::Temporal, ValueType::Int)
        );
    }

    #[test]
    fn test_floor_blocks_resolution() {
        let mut g = gen();
        g.register_func("f", ReturnType::Void).unwrap();
        let a = g.int_literal(1).unwrap();
        g.push_operand_addr(a);
        g.push_operator(Operator::Add);
        g.push_floor();
        let quads_before = g.instructions.len();
        g.resolve_pending(&[Operator::Add]).unwrap();
        assert_eq!(g.instructions.len(), quads_before);
        g.pop_floor().unwrap();
    }

    #[test]
    fn test_incompatible_operands_rejected() {
        let mut g = gen();
        g.register_func("f", ReturnType::Void).unwrap();
        let s = g.string_literal("x").unwrap();
        let n = g.int_literal(1).unwrap();
        g.push_operand_addr(s);
        g.push_operator(Operator::Sub);
        g.push_operand_addr(n);
        let err = g.resolve_pending(&[Operator::Sub]).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let mut g = gen();
        g.add_var("x", ValueType::Int, Vec::new()).unwrap();
        let err = g.add_var("x", ValueType::Float, Vec::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentifier { .. }));
    }

    #[test]
    fn test_function_name_clashes_with_global() {
        let mut g = gen();
        g.add_var("f", ValueType::Int, Vec::new()).unwrap();
        let err = g.register_func("f", ReturnType::Void).unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentifier { .. }));
    }

    #[test]
    fn test_return_outside_function_rejected() {
        let mut g = gen();
        let err = g.handle_return(false).unwrap_err();
        assert_eq!(err, Error::ReturnOutsideFunction);
    }

    #[test]
    fn test_backpatch_twice_is_fatal() {
        let mut g = gen();
        let jump = g.emit(Instruction::new(
            Operation::Goto,
            Addr::NONE,
            Addr::NONE,
            Addr::NONE,
        ));
        g.fill_pending_jump(jump, 7).unwrap();
        let err = g.fill_pending_jump(jump, 9).unwrap_err();
        assert_eq!(err, Error::InvalidBackpatch { index: jump });
    }

    #[test]
    fn test_skip_jump_covers_function_body() {
        let mut g = gen();
        g.register_func("f", ReturnType::Void).unwrap();
        g.handle_return(false).unwrap();
        g.end_func().unwrap();

        // quad 0 is the skip jump, filled to just past endfunc
        assert_eq!(g.instructions[0].operation, Operation::Goto);
        assert_eq!(g.instructions[0].result, Addr(g.instructions.len() as i32));
    }

    #[test]
    fn test_call_argument_count_checked() {
        let mut g = gen();
        g.register_func("f", ReturnType::Void).unwrap();
        g.add_param("a", ValueType::Int).unwrap();
        g.end_func().unwrap();

        g.call_begin("f").unwrap();
        let err = g.call_end().unwrap_err();
        assert!(matches!(err, Error::MissingArguments { .. }));
    }

    #[test]
    fn test_matrix_access_emits_verify_and_pointer() {
        let mut g = gen();
        g.register_func("f", ReturnType::Void).unwrap();
        g.add_var("m", ValueType::Int, vec![2, 3]).unwrap();

        let dims = g.index_begin("m").unwrap();
        assert_eq!(dims, 2);
        let i = g.int_literal(1).unwrap();
        g.push_operand_addr(i);
        g.index_dim().unwrap();
        let j = g.int_literal(2).unwrap();
        g.push_operand_addr(j);
        g.index_dim().unwrap();
        let pointer = g.index_end().unwrap();

        assert_eq!(
            g.mapper.resolve(pointer).unwrap(),
            (Segment::Temporal, ValueType::Pointer)
        );
        assert_eq!(g.operand_type(pointer).unwrap(), ValueType::Int);
        let verifies = g
            .instructions
            .iter()
            .filter(|q| q.operation == Operation::Verify)
            .count();
        assert_eq!(verifies, 2);
    }

    #[test]
    fn test_scalar_cannot_be_indexed() {
        let mut g = gen();
        g.add_var("x", ValueType::Int, Vec::new()).unwrap();
        let err = g.index_begin("x").unwrap_err();
        assert!(matches!(err, Error::NotIndexable { .. }));
    }
}
