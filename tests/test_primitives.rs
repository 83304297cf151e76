use forge::primitives::{ForthError, Memory, Primitive, Stack, VM};
use std::io::{self, Cursor};

fn vm_with_input(input: &str) -> VM {
    VM::with_io(
        Box::new(Cursor::new(input.as_bytes().to_vec())),
        Box::new(io::sink()),
    )
}

fn vm() -> VM {
    vm_with_input("")
}

fn run(vm: &mut VM, values: &[i64], prim: Primitive) -> Result<(), ForthError> {
    for &v in values {
        vm.data_stack.push(v);
    }
    vm.execute_primitive(prim)
}

fn result_of(values: &[i64], prim: Primitive) -> Vec<i64> {
    let mut vm = vm();
    run(&mut vm, values, prim).unwrap();
    vm.data_stack.iter().copied().collect()
}

#[test]
fn test_stack_operations() {
    let mut stack = Stack::new();
    assert!(stack.is_empty());

    stack.push(42);
    assert_eq!(stack.depth(), 1);
    assert_eq!(stack.peek().unwrap(), 42);

    stack.push(99);
    assert_eq!(stack.pick(1).unwrap(), 42);
    assert_eq!(stack.pick(2), Err(ForthError::StackUnderflow));
    assert_eq!(stack.pop().unwrap(), 99);
    assert_eq!(stack.pop().unwrap(), 42);

    assert_eq!(stack.pop(), Err(ForthError::StackUnderflow));
    assert_eq!(stack.peek(), Err(ForthError::StackUnderflow));
}

#[test]
fn test_arithmetic_keeps_source_order() {
    assert_eq!(result_of(&[7, 2], Primitive::Sub), vec![5]);
    assert_eq!(result_of(&[2, 7], Primitive::Sub), vec![-5]);
    assert_eq!(result_of(&[3, 4], Primitive::Add), vec![7]);
    assert_eq!(result_of(&[6, 7], Primitive::Mul), vec![42]);
    assert_eq!(result_of(&[20, 6], Primitive::Div), vec![3]);
    assert_eq!(result_of(&[20, 6], Primitive::Mod), vec![2]);
}

#[test]
fn test_division_truncates_toward_zero() {
    assert_eq!(result_of(&[-7, 2], Primitive::Div), vec![-3]);
    assert_eq!(result_of(&[-7, 2], Primitive::Mod), vec![-1]);
    assert_eq!(result_of(&[7, -2], Primitive::Div), vec![-3]);
}

#[test]
fn test_division_by_zero() {
    let mut vm = vm();
    assert_eq!(run(&mut vm, &[1, 0], Primitive::Div), Err(ForthError::DivisionByZero));
    assert_eq!(run(&mut vm, &[1, 0], Primitive::Mod), Err(ForthError::DivisionByZero));
}

#[test]
fn test_arithmetic_wraps() {
    assert_eq!(result_of(&[i64::MAX, 1], Primitive::Add), vec![i64::MIN]);
    assert_eq!(result_of(&[i64::MIN, -1], Primitive::Div), vec![i64::MIN]);
}

#[test]
fn test_comparisons() {
    assert_eq!(result_of(&[5, 3], Primitive::Greater), vec![-1]);
    assert_eq!(result_of(&[3, 5], Primitive::Greater), vec![0]);
    assert_eq!(result_of(&[3, 5], Primitive::Less), vec![-1]);
    assert_eq!(result_of(&[1, 0], Primitive::Equals), vec![0]);
    assert_eq!(result_of(&[1, 1], Primitive::Equals), vec![-1]);
}

#[test]
fn test_logical_ops_use_truthiness() {
    assert_eq!(result_of(&[2, 4], Primitive::And), vec![-1]);
    assert_eq!(result_of(&[2, 0], Primitive::And), vec![0]);
    assert_eq!(result_of(&[0, 4], Primitive::Or), vec![-1]);
    assert_eq!(result_of(&[0, 0], Primitive::Or), vec![0]);
}

#[test]
fn test_invert() {
    assert_eq!(result_of(&[-1], Primitive::Invert), vec![0]);
    assert_eq!(result_of(&[0], Primitive::Invert), vec![-1]);
    for x in [-100, -3, 5, 12345] {
        assert_eq!(result_of(&[x], Primitive::Invert), vec![-x - 1]);
    }
}

#[test]
fn test_stack_shuffles() {
    assert_eq!(result_of(&[1, 2], Primitive::Drop), vec![1]);
    assert_eq!(result_of(&[1, 2], Primitive::Dup), vec![1, 2, 2]);
    assert_eq!(result_of(&[1, 2], Primitive::Swap), vec![2, 1]);
    assert_eq!(result_of(&[1, 2], Primitive::Over), vec![1, 2, 1]);
    assert_eq!(result_of(&[1, 2, 3], Primitive::Rot), vec![2, 3, 1]);
}

#[test]
fn test_underflow_in_every_consumer() {
    let consumers = [
        Primitive::Add,
        Primitive::Sub,
        Primitive::Mul,
        Primitive::Div,
        Primitive::Mod,
        Primitive::Equals,
        Primitive::Less,
        Primitive::Greater,
        Primitive::And,
        Primitive::Or,
        Primitive::Invert,
        Primitive::Drop,
        Primitive::Dup,
        Primitive::Swap,
        Primitive::Over,
        Primitive::Rot,
        Primitive::Dot,
        Primitive::Emit,
        Primitive::Fetch,
        Primitive::Store,
        Primitive::PlusStore,
        Primitive::Question,
        Primitive::Cells,
        Primitive::Allot,
    ];
    for prim in consumers {
        let mut vm = vm();
        assert_eq!(
            vm.execute_primitive(prim),
            Err(ForthError::StackUnderflow),
            "{} on an empty stack",
            prim.name()
        );
    }
}

#[test]
fn test_memory_allot_and_bounds() {
    let mut memory = Memory::new();
    assert!(memory.is_empty());
    let first = memory.allot(1).unwrap();
    let rest = memory.allot(3).unwrap();
    assert_eq!(first.index(), 0);
    assert_eq!(rest.index(), 1);
    assert_eq!(memory.len(), 4);

    assert_eq!(memory.fetch(rest), 0);
    assert!(memory.address(3).is_ok());
    assert_eq!(memory.address(4), Err(ForthError::InvalidMemoryAddress(4)));
    assert_eq!(memory.address(-1), Err(ForthError::InvalidMemoryAddress(-1)));
}

#[test]
fn test_store_fetch_plus_store() {
    let mut vm = vm();
    let addr = vm.memory.allot(1).unwrap().as_cell();

    run(&mut vm, &[42, addr], Primitive::Store).unwrap();
    run(&mut vm, &[8, addr], Primitive::PlusStore).unwrap();
    run(&mut vm, &[addr], Primitive::Fetch).unwrap();
    assert_eq!(vm.data_stack.pop().unwrap(), 50);
}

#[test]
fn test_memory_access_out_of_bounds() {
    for prim in [Primitive::Fetch, Primitive::Question] {
        let mut vm = vm();
        assert_eq!(run(&mut vm, &[0], prim), Err(ForthError::InvalidMemoryAddress(0)));
    }
    for prim in [Primitive::Store, Primitive::PlusStore] {
        let mut vm = vm();
        vm.memory.allot(2).unwrap();
        assert_eq!(run(&mut vm, &[1, 2], prim), Err(ForthError::InvalidMemoryAddress(2)));
    }
}

#[test]
fn test_cells_and_allot() {
    let mut vm = vm();
    run(&mut vm, &[5], Primitive::Cells).unwrap();
    assert_eq!(vm.data_stack.peek().unwrap(), 5);
    vm.execute_primitive(Primitive::Allot).unwrap();
    assert_eq!(vm.memory.len(), 5);

    assert_eq!(run(&mut vm, &[-1], Primitive::Allot), Err(ForthError::NegativeAllot(-1)));
}

#[test]
fn test_key_reads_one_byte() {
    let mut vm = vm_with_input("AB");
    vm.execute_primitive(Primitive::Key).unwrap();
    vm.execute_primitive(Primitive::Key).unwrap();
    assert_eq!(vm.data_stack.iter().copied().collect::<Vec<_>>(), vec![65, 66]);

    assert!(matches!(vm.execute_primitive(Primitive::Key), Err(ForthError::Io(_))));
}

#[test]
fn test_key_decodes_utf8_characters() {
    let mut vm = vm_with_input("é€🦀");
    for _ in 0..3 {
        vm.execute_primitive(Primitive::Key).unwrap();
    }
    assert_eq!(
        vm.data_stack.iter().copied().collect::<Vec<_>>(),
        vec![0xE9, 0x20AC, 0x1F980]
    );
}

#[test]
fn test_key_replaces_invalid_bytes() {
    let mut vm = VM::with_io(Box::new(Cursor::new(vec![0xFF, b'A'])), Box::new(io::sink()));
    vm.execute_primitive(Primitive::Key).unwrap();
    vm.execute_primitive(Primitive::Key).unwrap();
    assert_eq!(vm.data_stack.iter().copied().collect::<Vec<_>>(), vec![0xFFFD, 65]);
}

#[test]
fn test_emit_rejects_invalid_code_points() {
    let mut vm = vm();
    assert_eq!(run(&mut vm, &[-1], Primitive::Emit), Err(ForthError::InvalidCharacter(-1)));
    assert_eq!(
        run(&mut vm, &[0xD800], Primitive::Emit),
        Err(ForthError::InvalidCharacter(0xD800))
    );
}

#[test]
fn test_loops() {
    let mut vm = vm();
    assert_eq!(vm.execute_primitive(Primitive::I), Err(ForthError::NoActiveLoop));

    // 3 0 do
    vm.data_stack.push(3);
    vm.data_stack.push(0);
    vm.begin_loop().unwrap();
    let mut seen = Vec::new();
    loop {
        vm.execute_primitive(Primitive::I).unwrap();
        seen.push(vm.data_stack.pop().unwrap());
        if !vm.step_loop().unwrap() {
            break;
        }
    }
    assert_eq!(seen, vec![0, 1, 2]);
    assert!(vm.loop_stack.is_empty());
}

#[test]
fn test_primitive_names_round_trip() {
    for name in ["+", "mod", "invert", "rot", ".", "emit", "+!", "?", "cells", "i"] {
        let prim = Primitive::from_name(name).unwrap();
        assert_eq!(prim.name(), name);
    }
    assert_eq!(Primitive::from_name("DUP"), None);
}
