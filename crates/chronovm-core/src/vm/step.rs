//! The pure step function (spec.md §4.1 **Step function**).
//!
//! `step` never mutates its input: it clones the incoming [`VmState`] and
//! returns a new one, matching the teacher's `Result<state, Error>`-style
//! functional error handling (`ouros/src/exception_private.rs`) rather than
//! the teacher's own in-place-mutating interpreter, since ChronoVM must
//! keep every intermediate state around for the trace (spec.md §3's "no
//! intermediate observable state" invariant requires each step to be a
//! complete before→after pair, not a partially-applied mutation).

use crate::{
    heap,
    value::{Address, HeapObject, Primitive},
    vm::{
        Operand, Opcode, Program,
        state::{Frame, VmError, VmState},
    },
};

type StepResult = Result<VmState, VmError>;

/// Executes `program[state.pc]` against `state`, returning the successor
/// state. Requires `state.is_running`; callers (see `trace.rs`) stop
/// calling once `is_running` is false.
pub fn step(program: &Program, state: &VmState) -> StepResult {
    let instr = program.get(state.pc).ok_or(VmError::InvalidPc(state.pc))?;
    let mut next = state.clone();

    match instr.op {
        Opcode::LoadConst => {
            let Operand::Const(value) = &instr.operand else {
                return Err(VmError::TypeMismatch("LOAD_CONST".to_owned()));
            };
            let addr = next.heap.allocate(HeapObject::Primitive(value.clone()));
            next.operand_stack.push(addr);
            advance(&mut next);
        }
        Opcode::Load => {
            let name = operand_name(&instr.operand, "LOAD")?;
            let addr = next
                .envs
                .resolve(next.current_env, name)
                .ok_or_else(|| VmError::UnknownBinding(name.to_owned()))?;
            next.operand_stack.push(addr);
            advance(&mut next);
        }
        Opcode::Store => {
            let name = operand_name(&instr.operand, "STORE")?.to_owned();
            let addr = pop(&mut next)?;
            next.envs.bind(next.current_env, &name, addr);
            advance(&mut next);
        }
        Opcode::Pop => {
            pop(&mut next)?;
            advance(&mut next);
        }
        Opcode::Dup => {
            let top = *next.operand_stack.last().ok_or(VmError::StackUnderflow)?;
            next.operand_stack.push(top);
            advance(&mut next);
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
            binary_arith(&mut next, instr.op)?;
            advance(&mut next);
        }
        Opcode::Negate => {
            let addr = pop(&mut next)?;
            let value = numeric(&next, addr, "NEGATE")?;
            let result = match value {
                Num::Int(n) => Primitive::Int(-n),
                Num::Float(n) => Primitive::Float(-n),
            };
            let out = next.heap.allocate(HeapObject::Primitive(result));
            next.operand_stack.push(out);
            advance(&mut next);
        }
        Opcode::Not => {
            let addr = pop(&mut next)?;
            let truthy = primitive_at(&next, addr, "NOT")?.truthy();
            let out = next.heap.allocate(HeapObject::Primitive(Primitive::Bool(!truthy)));
            next.operand_stack.push(out);
            advance(&mut next);
        }
        Opcode::Eq | Opcode::Neq | Opcode::Lt | Opcode::Gt | Opcode::Lte | Opcode::Gte => {
            binary_compare(&mut next, instr.op)?;
            advance(&mut next);
        }
        Opcode::Jump => {
            next.pc = operand_target(&instr.operand, "JUMP")?;
        }
        Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
            let target = operand_target(&instr.operand, "JUMP_IF_FALSE/JUMP_IF_TRUE")?;
            let addr = pop(&mut next)?;
            let truthy = primitive_at(&next, addr, "JUMP_IF_FALSE/JUMP_IF_TRUE")?.truthy();
            let take = (instr.op == Opcode::JumpIfFalse && !truthy) || (instr.op == Opcode::JumpIfTrue && truthy);
            next.pc = if take { target } else { state.pc + 1 };
        }
        Opcode::NewObject => {
            let addr = next.heap.allocate(HeapObject::Object(indexmap::IndexMap::new()));
            next.operand_stack.push(addr);
            advance(&mut next);
        }
        Opcode::SetProperty => {
            let name = operand_name(&instr.operand, "SET_PROPERTY")?.to_owned();
            let value = pop(&mut next)?;
            let obj_addr = pop(&mut next)?;
            match next.heap.get_mut(obj_addr) {
                Some(HeapObject::Object(props)) => {
                    props.insert(name, value);
                }
                _ => return Err(VmError::TypeMismatch("SET_PROPERTY".to_owned())),
            }
            next.operand_stack.push(obj_addr);
            advance(&mut next);
        }
        Opcode::GetProperty => {
            let name = operand_name(&instr.operand, "GET_PROPERTY")?.to_owned();
            let obj_addr = pop(&mut next)?;
            let found = match next.heap.get(obj_addr) {
                Some(HeapObject::Object(props)) => props.get(&name).copied(),
                _ => return Err(VmError::TypeMismatch("GET_PROPERTY".to_owned())),
            };
            let result = match found {
                Some(addr) => addr,
                None => next.heap.allocate(HeapObject::Primitive(Primitive::Null)),
            };
            next.operand_stack.push(result);
            advance(&mut next);
        }
        Opcode::NewList => {
            let addr = next.heap.allocate(HeapObject::List(Vec::new()));
            next.operand_stack.push(addr);
            advance(&mut next);
        }
        Opcode::ListAppend => {
            let value = pop(&mut next)?;
            let list_addr = pop(&mut next)?;
            match next.heap.get_mut(list_addr) {
                Some(HeapObject::List(items)) => items.push(value),
                _ => return Err(VmError::TypeMismatch("LIST_APPEND".to_owned())),
            }
            next.operand_stack.push(list_addr);
            advance(&mut next);
        }
        Opcode::ListSet => {
            let value = pop(&mut next)?;
            let index_addr = pop(&mut next)?;
            let list_addr = pop(&mut next)?;
            let index = list_index(&next, index_addr)?;
            match next.heap.get_mut(list_addr) {
                Some(HeapObject::List(items)) if index < items.len() => {
                    items[index] = value;
                }
                Some(HeapObject::List(_)) => return Err(VmError::TypeMismatch("LIST_SET (index out of range)".to_owned())),
                _ => return Err(VmError::TypeMismatch("LIST_SET".to_owned())),
            }
            next.operand_stack.push(list_addr);
            advance(&mut next);
        }
        Opcode::ListGet => {
            let index_addr = pop(&mut next)?;
            let list_addr = pop(&mut next)?;
            let index = list_index(&next, index_addr)?;
            let result = match next.heap.get(list_addr) {
                Some(HeapObject::List(items)) => {
                    *items.get(index).ok_or_else(|| VmError::TypeMismatch("LIST_GET (index out of range)".to_owned()))?
                }
                _ => return Err(VmError::TypeMismatch("LIST_GET".to_owned())),
            };
            next.operand_stack.push(result);
            advance(&mut next);
        }
        Opcode::ListLen => {
            let list_addr = pop(&mut next)?;
            let len = match next.heap.get(list_addr) {
                Some(HeapObject::List(items)) => items.len(),
                _ => return Err(VmError::TypeMismatch("LIST_LEN".to_owned())),
            };
            let addr = next.heap.allocate(HeapObject::Primitive(Primitive::Int(len as i64)));
            next.operand_stack.push(addr);
            advance(&mut next);
        }
        Opcode::MakeFunction => {
            let entry_pc = operand_target(&instr.operand, "MAKE_FUNCTION")?;
            let addr = next
                .heap
                .allocate(HeapObject::Function { entry_pc, captured_env: next.current_env });
            next.operand_stack.push(addr);
            advance(&mut next);
        }
        Opcode::Call => {
            let arg_count = operand_count(&instr.operand, "CALL")?;
            let callee_addr = pop(&mut next)?;
            let mut args = Vec::with_capacity(arg_count);
            for _ in 0..arg_count {
                args.push(pop(&mut next)?);
            }
            args.reverse();
            let (entry_pc, captured_env) = match next.heap.get(callee_addr) {
                Some(HeapObject::Function { entry_pc, captured_env }) => (*entry_pc, *captured_env),
                _ => return Err(VmError::TypeMismatch("CALL".to_owned())),
            };
            let new_env = next.envs.allocate(Some(captured_env));
            for (i, arg_addr) in args.into_iter().enumerate() {
                next.envs.bind(new_env, &format!("arg{i}"), arg_addr);
            }
            next.call_stack.push(Frame {
                return_pc: state.pc + 1,
                return_env: next.current_env,
                stack_depth: next.operand_stack.len(),
            });
            next.current_env = new_env;
            next.pc = entry_pc;
        }
        Opcode::Ret => {
            let return_value = pop(&mut next)?;
            let frame = next.call_stack.pop().ok_or(VmError::StackUnderflow)?;
            next.operand_stack.truncate(frame.stack_depth);
            next.operand_stack.push(return_value);
            next.current_env = frame.return_env;
            next.pc = frame.return_pc;
        }
        Opcode::Print => {
            let addr = pop(&mut next)?;
            next.output.push(heap::stringify(&next.heap, addr));
            advance(&mut next);
        }
        Opcode::Halt => {
            next.is_running = false;
        }
    }

    Ok(next)
}

fn advance(state: &mut VmState) {
    state.pc += 1;
}

fn pop(state: &mut VmState) -> Result<Address, VmError> {
    state.operand_stack.pop().ok_or(VmError::StackUnderflow)
}

fn operand_name<'a>(operand: &'a Operand, op: &str) -> Result<&'a str, VmError> {
    match operand {
        Operand::Name(name) => Ok(name.as_str()),
        _ => Err(VmError::TypeMismatch(op.to_owned())),
    }
}

fn operand_target(operand: &Operand, op: &str) -> Result<usize, VmError> {
    match operand {
        Operand::Target(target) => Ok(*target),
        _ => Err(VmError::TypeMismatch(op.to_owned())),
    }
}

fn operand_count(operand: &Operand, op: &str) -> Result<usize, VmError> {
    match operand {
        Operand::Count(count) => Ok(*count),
        _ => Err(VmError::TypeMismatch(op.to_owned())),
    }
}

fn primitive_at<'a>(state: &'a VmState, addr: Address, op: &str) -> Result<&'a Primitive, VmError> {
    match state.heap.get(addr) {
        Some(HeapObject::Primitive(p)) => Ok(p),
        _ => Err(VmError::TypeMismatch(op.to_owned())),
    }
}

fn list_index(state: &VmState, addr: Address) -> Result<usize, VmError> {
    match primitive_at(state, addr, "LIST index")? {
        Primitive::Int(n) if *n >= 0 => Ok(*n as usize),
        _ => Err(VmError::TypeMismatch("LIST index".to_owned())),
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(n) => n,
        }
    }
}

fn numeric(state: &VmState, addr: Address, op: &str) -> Result<Num, VmError> {
    match primitive_at(state, addr, op)? {
        Primitive::Int(n) => Ok(Num::Int(*n)),
        Primitive::Float(n) => Ok(Num::Float(*n)),
        _ => Err(VmError::TypeMismatch(op.to_owned())),
    }
}

fn binary_arith(state: &mut VmState, op: Opcode) -> Result<(), VmError> {
    let b = pop(state)?;
    let a = pop(state)?;

    // ADD also supports string concatenation (spec.md's Python-like surface
    // language compiles `+` on strings down to this opcode).
    if op == Opcode::Add {
        if let (Some(HeapObject::Primitive(Primitive::Str(sa))), Some(HeapObject::Primitive(Primitive::Str(sb)))) =
            (state.heap.get(a), state.heap.get(b))
        {
            let combined = format!("{sa}{sb}");
            let out = state.heap.allocate(HeapObject::Primitive(Primitive::Str(combined)));
            state.operand_stack.push(out);
            return Ok(());
        }
    }

    let name = op.to_string();
    let na = numeric(state, a, &name)?;
    let nb = numeric(state, b, &name)?;

    let result = if matches!((na, nb), (Num::Int(_), Num::Int(_))) {
        let (Num::Int(x), Num::Int(y)) = (na, nb) else { unreachable!() };
        match op {
            Opcode::Add => Primitive::Int(x + y),
            Opcode::Sub => Primitive::Int(x - y),
            Opcode::Mul => Primitive::Int(x * y),
            Opcode::Div => {
                if y == 0 {
                    return Err(VmError::DivisionByZero);
                }
                Primitive::Float(x as f64 / y as f64)
            }
            Opcode::Mod => {
                if y == 0 {
                    return Err(VmError::DivisionByZero);
                }
                Primitive::Int(x.rem_euclid(y))
            }
            _ => unreachable!(),
        }
    } else {
        let x = na.as_f64();
        let y = nb.as_f64();
        match op {
            Opcode::Add => Primitive::Float(x + y),
            Opcode::Sub => Primitive::Float(x - y),
            Opcode::Mul => Primitive::Float(x * y),
            Opcode::Div => {
                if y == 0.0 {
                    return Err(VmError::DivisionByZero);
                }
                Primitive::Float(x / y)
            }
            Opcode::Mod => {
                if y == 0.0 {
                    return Err(VmError::DivisionByZero);
                }
                Primitive::Float(x.rem_euclid(y))
            }
            _ => unreachable!(),
        }
    };

    let out = state.heap.allocate(HeapObject::Primitive(result));
    state.operand_stack.push(out);
    Ok(())
}

fn binary_compare(state: &mut VmState, op: Opcode) -> Result<(), VmError> {
    let b = pop(state)?;
    let a = pop(state)?;
    let name = op.to_string();

    let result = match op {
        Opcode::Eq | Opcode::Neq => {
            let equal = primitives_equal(state, a, b);
            if op == Opcode::Eq { equal } else { !equal }
        }
        Opcode::Lt | Opcode::Gt | Opcode::Lte | Opcode::Gte => {
            let pa = primitive_at(state, a, &name)?.clone();
            let pb = primitive_at(state, b, &name)?.clone();
            let ordering = match (&pa, &pb) {
                (Primitive::Str(sa), Primitive::Str(sb)) => sa.partial_cmp(sb),
                _ => {
                    let na = numeric(state, a, &name)?;
                    let nb = numeric(state, b, &name)?;
                    na.as_f64().partial_cmp(&nb.as_f64())
                }
            }
            .ok_or_else(|| VmError::TypeMismatch(name.clone()))?;
            match op {
                Opcode::Lt => ordering.is_lt(),
                Opcode::Gt => ordering.is_gt(),
                Opcode::Lte => ordering.is_le(),
                Opcode::Gte => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
        _ => unreachable!(),
    };

    let out = state.heap.allocate(HeapObject::Primitive(Primitive::Bool(result)));
    state.operand_stack.push(out);
    Ok(())
}

fn primitives_equal(state: &VmState, a: Address, b: Address) -> bool {
    match (state.heap.get(a), state.heap.get(b)) {
        (Some(HeapObject::Primitive(pa)), Some(HeapObject::Primitive(pb))) => match (pa, pb) {
            (Primitive::Int(x), Primitive::Int(y)) => x == y,
            (Primitive::Float(x), Primitive::Float(y)) => x == y,
            (Primitive::Int(x), Primitive::Float(y)) | (Primitive::Float(y), Primitive::Int(x)) => *x as f64 == *y,
            (Primitive::Bool(x), Primitive::Bool(y)) => x == y,
            (Primitive::Str(x), Primitive::Str(y)) => x == y,
            (Primitive::Null, Primitive::Null) => true,
            _ => false,
        },
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Instruction;

    fn run(program: &Program, mut state: VmState) -> VmState {
        while state.is_running {
            state = step(program, &state).expect("step failed");
        }
        state
    }

    #[test]
    fn simple_assignment_allocates_and_binds() {
        let program = Program::new(vec![
            Instruction::new(Opcode::LoadConst, Operand::Const(Primitive::Int(2))),
            Instruction::new(Opcode::Store, Operand::Name("x".to_owned())),
            Instruction::simple(Opcode::Halt),
        ]);
        let state = VmState::initial(&program);
        let end = run(&program, state);
        let addr = end.envs.resolve(end.current_env, "x").unwrap();
        assert_eq!(heap::stringify(&end.heap, addr), "2");
    }

    #[test]
    fn division_by_zero_is_terminal() {
        let program = Program::new(vec![
            Instruction::new(Opcode::LoadConst, Operand::Const(Primitive::Int(1))),
            Instruction::new(Opcode::LoadConst, Operand::Const(Primitive::Int(0))),
            Instruction::simple(Opcode::Div),
        ]);
        let state = VmState::initial(&program);
        let err = step(&program, &step(&program, &state).unwrap());
        assert_eq!(err.unwrap_err(), VmError::DivisionByZero);
    }

    #[test]
    fn call_parents_new_env_on_the_callees_captured_env_not_the_caller_env() {
        // pc0: CALL 0           (caller's current env is `global`, with no `arg0`)
        // pc1: HALT             (unreachable body, return lands here)
        // pc2: LOAD arg0        (the closure's body)
        // pc3: RET
        let program = Program::new(vec![
            Instruction::new(Opcode::Call, Operand::Count(0)),
            Instruction::simple(Opcode::Halt),
            Instruction::new(Opcode::Load, Operand::Name("arg0".to_owned())),
            Instruction::simple(Opcode::Ret),
        ]);

        let mut state = VmState::initial(&program);
        let closure_env = state.envs.allocate(Some(state.global_env));
        let five = state.heap.allocate(HeapObject::Primitive(Primitive::Int(5)));
        state.envs.bind(closure_env, "arg0", five);
        let func_addr = state.heap.allocate(HeapObject::Function { entry_pc: 2, captured_env: closure_env });
        state.operand_stack.push(func_addr);

        let after_call = step(&program, &state).expect("call");
        assert_ne!(after_call.current_env, state.global_env, "CALL must create a fresh env");
        let after_load = step(&program, &after_call).expect("load");
        let after_ret = step(&program, &after_load).expect("ret");

        assert_eq!(after_ret.current_env, state.global_env);
        assert_eq!(after_ret.pc, 1);
        let result = *after_ret.operand_stack.last().unwrap();
        assert_eq!(heap::stringify(&after_ret.heap, result), "5");
    }
}
