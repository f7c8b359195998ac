//! Integration tests for the Basalt VM.
//!
//! Images are produced with `ImageBuilder`. Without a data section the
//! base pointer starts at address 0, so frame offset 0 is the exit-code
//! slot and the following 4-byte slots sit at offsets -4, -8, ...

use std::io;

use basalt_common::{
    CommandArg, CompareOp, Dest, FieldDecl, FunctionDecl, ImageBuilder, Module, Opcode, Source,
    TypeDecl, ValueKind,
};
use basalt_vm::bridge::Binding;
use basalt_vm::{
    run, ExitStatus, Memory, MemoryError, NativeRegistry, NativeValue, RuntimeError, Vm, VmConfig,
};

// ============================================================
// Helper functions
// ============================================================

fn module(b: ImageBuilder) -> Module {
    Module::from_code(b.finish())
}

fn imm(value: i32) -> Source {
    Source::Immediate(value.to_le_bytes().to_vec())
}

fn run_module(module: &Module) -> Result<ExitStatus, RuntimeError> {
    run(module, VmConfig::default())
}

fn exit_code(b: ImageBuilder) -> i32 {
    run_module(&module(b)).expect("module runs").exit_code
}

/// Execute and return the final memory.
fn run_memory(module: &Module) -> Memory {
    let mut vm = Vm::load(module, &NativeRegistry::new(), VmConfig::default(), io::sink())
        .expect("module links");
    vm.execute().expect("module runs");
    vm.memory().clone()
}

/// Execute with the console captured.
fn run_captured(
    module: &Module,
    natives: &NativeRegistry,
) -> (Result<ExitStatus, RuntimeError>, String) {
    let mut vm = Vm::load(module, natives, VmConfig::default(), Vec::new()).expect("module links");
    let result = vm.execute();
    let output = String::from_utf8(vm.into_output()).expect("utf-8 output");
    (result, output)
}

fn run_error(b: ImageBuilder) -> RuntimeError {
    run_module(&module(b)).expect_err("module should fail")
}

// ============================================================
// Termination and exit code
// ============================================================

#[test]
fn empty_image_exits_with_zero() {
    let status = run_module(&Module::default()).unwrap();
    assert_eq!(status.exit_code, 0);
    assert_eq!(status.instructions, 0);
}

#[test]
fn data_word_moved_to_first_slot_is_exit_code() {
    let mut b = ImageBuilder::new();
    b.data_section(&[42, 0, 0, 0]);
    b.allocate_stack(&[0; 4]);
    b.mov(Dest::Direct(0), Source::Absolute { address: 0, size: 4 });
    b.exit();
    assert_eq!(exit_code(b), 42);
}

#[test]
fn data_section_is_mapped_at_address_zero() {
    let mut b = ImageBuilder::new();
    b.data_section(&[42, 0, 0, 0]);
    b.exit();
    let memory = run_memory(&module(b));
    assert_eq!(memory.read_i32(0), Ok(42));
    assert_eq!(memory.data_size(), 4);
    assert_eq!(memory.stack_base(), 4);
    assert_eq!(memory.stack_pointer(), 4);
}

#[test]
fn exit_skips_remaining_instructions() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&1i32.to_le_bytes());
    b.exit();
    b.mov(Dest::Direct(0), imm(2));
    let status = run_module(&module(b)).unwrap();
    assert_eq!(status.exit_code, 1);
    assert_eq!(status.instructions, 2);
}

#[test]
fn running_off_the_end_terminates_normally() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&9i32.to_le_bytes());
    assert_eq!(exit_code(b), 9);
}

#[test]
fn step_reports_completion() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let module = module(b);
    let mut vm = Vm::load(&module, &NativeRegistry::new(), VmConfig::default(), io::sink()).unwrap();
    assert_eq!(vm.step(), Ok(true));
    assert!(vm.is_finished());
    assert_eq!(vm.step(), Ok(false));
    assert_eq!(vm.instructions(), 1);
}

// ============================================================
// Allocation
// ============================================================

#[test]
fn allocate_stack_with_default_then_print() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[7, 0, 0, 0]);
    b.print(&[CommandArg::new(0, 4, ValueKind::Int)]);
    let (result, output) = run_captured(&module(b), &NativeRegistry::new());
    assert!(result.is_ok());
    assert_eq!(output, "7\n");
}

#[test]
fn push_variable_copies_slot() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&31i32.to_le_bytes());
    b.push_variable(-4, 4);
    b.mov(Dest::Direct(0), Source::Frame { offset: -8, size: 4 });
    b.exit();
    assert_eq!(exit_code(b), 31);
}

#[test]
fn allocate_heap_stores_pointer_past_stack() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_heap(0, 16);
    b.allocate_stack(&[0; 4]);
    b.allocate_heap(-4, 8);
    let memory = run_memory(&module(b));
    let stack_size = VmConfig::default().stack_size;
    assert_eq!(memory.read_pointer(0), Ok(stack_size));
    assert_eq!(memory.read_pointer(4), Ok(stack_size + 16));
    assert_eq!(memory.heap_pointer(), stack_size + 24);
}

#[test]
fn allocate_heap_from_variable() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&[12]);
    b.allocate_heap_from(0, -4, 1);
    let memory = run_memory(&module(b));
    let stack_size = VmConfig::default().stack_size;
    assert_eq!(memory.heap_pointer(), stack_size + 12);
}

#[test]
fn negative_heap_size_is_fatal() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.allocate_heap(0, -1);
    assert_eq!(
        run_error(b),
        RuntimeError::NegativeOperand { at, value: -1 }
    );
}

#[test]
fn heap_object_beyond_pointer_range_is_fatal() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.allocate_heap(0, i32::MAX);
    match run_error(b) {
        RuntimeError::Memory {
            at: failed,
            source: MemoryError::OutOfBounds { address, size, .. },
        } => {
            assert_eq!(failed, at);
            assert_eq!(address, VmConfig::default().stack_size as i64);
            assert_eq!(size, i32::MAX as usize);
        }
        other => panic!("expected out-of-bounds heap allocation, got {other:?}"),
    }
}

#[test]
fn deallocate_stack_retracts_pointer() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&[0; 8]);
    b.deallocate_stack(8);
    let memory = run_memory(&module(b));
    assert_eq!(memory.stack_pointer(), 4);
}

#[test]
fn negative_deallocate_count_is_fatal() {
    let mut b = ImageBuilder::new();
    let at = b.deallocate_stack(-4);
    assert_eq!(
        run_error(b),
        RuntimeError::NegativeOperand { at, value: -4 }
    );
}

#[test]
fn stack_overflow_is_fatal() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.allocate_stack(&[0; 4]);
    let config = VmConfig {
        stack_size: 8,
        ..VmConfig::default()
    };
    assert_eq!(
        run(&module(b), config),
        Err(RuntimeError::Memory {
            at,
            source: MemoryError::StackOverflow {
                requested: 4,
                pointer: 4,
                limit: 8
            }
        })
    );
}

#[test]
fn invalid_stack_allocation_mode() {
    let mut b = ImageBuilder::new();
    b.raw(&[Opcode::AllocateStack as u8, 9]);
    assert_eq!(
        run_error(b),
        RuntimeError::InvalidStackAllocationMode { at: 0, mode: 9 }
    );
}

// ============================================================
// Calling convention
// ============================================================

#[test]
fn call_return_resumes_after_call() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let call = b.call(0);
    b.increment(0, 4);
    b.exit();
    let function = b.position();
    b.prologue();
    b.epilogue();
    b.ret();
    b.patch_target(call, function);

    let module = module(b);
    assert_eq!(run_module(&module).unwrap().exit_code, 1);
    let memory = run_memory(&module);
    assert_eq!(memory.stack_pointer(), 4);
    assert_eq!(memory.base_pointer(), 0);
}

#[test]
fn callee_writes_caller_slot_through_its_frame() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let call = b.call(0);
    b.exit();
    let function = b.position();
    b.prologue();
    // anchor at 4..8, saved base at 8..12, new base 12: address 0 is offset 12
    b.mov(Dest::Direct(12), imm(55));
    b.epilogue();
    b.ret();
    b.patch_target(call, function);
    assert_eq!(exit_code(b), 55);
}

#[test]
fn nested_calls_unwind() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let outer_call = b.call(0);
    b.exit();

    let outer = b.position();
    b.prologue();
    let inner_call = b.call(0);
    b.epilogue();
    b.ret();

    let inner = b.position();
    b.prologue();
    b.allocate_stack(&[0; 16]);
    b.epilogue();
    b.ret();

    b.patch_target(outer_call, outer);
    b.patch_target(inner_call, inner);
    let memory = run_memory(&module(b));
    assert_eq!(memory.stack_pointer(), 4);
    assert_eq!(memory.base_pointer(), 0);
}

#[test]
fn return_to_non_call_byte_is_corrupted_stack() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&0i32.to_le_bytes());
    let at = b.ret();
    assert_eq!(
        run_error(b),
        RuntimeError::CorruptedStack {
            at,
            anchor: 0,
            found: Opcode::AllocateStack as u8
        }
    );
}

#[test]
fn return_anchor_outside_image() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&1000i32.to_le_bytes());
    let at = b.ret();
    assert_eq!(
        run_error(b),
        RuntimeError::AnchorOutsideImage { at, anchor: 1000 }
    );
}

#[test]
fn call_target_outside_image_is_fatal() {
    let mut b = ImageBuilder::new();
    let at = b.call(1000);
    assert_eq!(
        run_error(b),
        RuntimeError::InvalidTarget { at, target: 1000 }
    );
}

#[test]
fn scope_savers_restore_pointers() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.open_scope();
    b.allocate_stack(&[0; 8]);
    b.restore_scope();
    b.allocate_stack(&[0; 2]);
    b.close_scope();
    let memory = run_memory(&module(b));
    assert_eq!(memory.stack_pointer(), 4);
    assert_eq!(memory.base_pointer(), 0);
}

#[test]
fn restore_scope_keeps_scope_open() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.open_scope();
    b.allocate_stack(&[0; 8]);
    b.restore_scope();
    let memory = run_memory(&module(b));
    assert_eq!(memory.base_pointer(), 8);
    assert_eq!(memory.stack_pointer(), 8);
}

// ============================================================
// Control flow
// ============================================================

/// Result slot, a condition of `width` bytes at offset -4, and a branch
/// that yields 1 when the jump is not taken and 2 when it is.
fn branch_on(condition: &[u8]) -> i32 {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(condition);
    let jump = b.jump_if_false(0, -4, condition.len() as u8);
    b.mov(Dest::Direct(0), imm(1));
    b.exit();
    let taken = b.position();
    b.mov(Dest::Direct(0), imm(2));
    b.exit();
    b.patch_target(jump, taken);
    exit_code(b)
}

#[test]
fn jump_if_false_taken_on_zero() {
    assert_eq!(branch_on(&[0]), 2);
}

#[test]
fn jump_if_false_not_taken_on_nonzero() {
    assert_eq!(branch_on(&[5]), 1);
}

#[test]
fn jump_if_false_rejects_zero_width() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.jump_if_false(0, 0, 0);
    assert_eq!(run_error(b), RuntimeError::UnsupportedWidth { at, width: 0 });
}

#[test]
fn jump_if_false_checks_every_byte() {
    assert_eq!(branch_on(&[0, 0, 1, 0]), 1);
    assert_eq!(branch_on(&[0, 0, 0, 0]), 2);
}

#[test]
fn jump_to_image_end_terminates() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&3i32.to_le_bytes());
    let jump = b.jump(0);
    b.mov(Dest::Direct(0), imm(4));
    let end = b.position();
    b.patch_target(jump, end);
    assert_eq!(exit_code(b), 3);
}

#[test]
fn negative_jump_target_is_fatal() {
    let mut b = ImageBuilder::new();
    let at = b.jump(-1);
    assert_eq!(run_error(b), RuntimeError::InvalidTarget { at, target: -1 });
}

#[test]
fn counting_loop() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&10i32.to_le_bytes());
    b.allocate_stack(&[0]);
    let top = b.position();
    b.increment(0, 4);
    b.compare(0, -4, 4, -8, CompareOp::Lt);
    let done = b.jump_if_false(0, -8, 1);
    b.jump(top);
    let end = b.position();
    b.exit();
    b.patch_target(done, end);

    let status = run_module(&module(b)).unwrap();
    assert_eq!(status.exit_code, 10);
    assert_eq!(status.instructions, 43);
}

#[test]
fn instruction_limit_stops_runaway_loop() {
    let mut b = ImageBuilder::new();
    b.jump(0);
    let config = VmConfig {
        instruction_limit: 100,
        ..VmConfig::default()
    };
    assert_eq!(
        run(&module(b), config),
        Err(RuntimeError::InstructionLimitExceeded { at: 0, limit: 100 })
    );
}

// ============================================================
// Arithmetic and comparison
// ============================================================

fn binary_result(opcode: Opcode, a: i32, b_value: i32) -> Result<i32, RuntimeError> {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&a.to_le_bytes());
    b.allocate_stack(&b_value.to_le_bytes());
    b.binary(opcode, -4, -8, 0, 4);
    run_module(&module(b)).map(|s| s.exit_code)
}

#[test]
fn binary_operators_at_int_width() {
    assert_eq!(binary_result(Opcode::Add, 40, 2), Ok(42));
    assert_eq!(binary_result(Opcode::Sub, 3, 10), Ok(-7));
    assert_eq!(binary_result(Opcode::Mul, -6, 7), Ok(-42));
    assert_eq!(binary_result(Opcode::Div, -7, 2), Ok(-3));
    assert_eq!(binary_result(Opcode::DivRemainder, -7, 2), Ok(-1));
    assert_eq!(binary_result(Opcode::LeftBitShift, 3, 4), Ok(48));
    assert_eq!(binary_result(Opcode::RightBitShift, -32, 2), Ok(-8));
    assert_eq!(binary_result(Opcode::BitAnd, 0b1100, 0b1010), Ok(0b1000));
    assert_eq!(binary_result(Opcode::BitOr, 0b1100, 0b1010), Ok(0b1110));
}

#[test]
fn add_wraps_at_int_boundary() {
    assert_eq!(binary_result(Opcode::Add, i32::MAX, 1), Ok(i32::MIN));
}

#[test]
fn byte_width_wraps_without_touching_neighbours() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0xAA; 4]);
    b.allocate_stack(&[120]);
    b.allocate_stack(&[10]);
    b.binary(Opcode::Add, -4, -5, 0, 1);
    let memory = run_memory(&module(b));
    assert_eq!(memory.read(0, 4), Ok(&[130u8, 0xAA, 0xAA, 0xAA][..]));
    assert_eq!(memory.read_int(0, basalt_common::Width::Byte), Ok(-126));
}

#[test]
fn division_by_zero_is_fatal() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&5i32.to_le_bytes());
    b.allocate_stack(&0i32.to_le_bytes());
    let at = b.binary(Opcode::Div, -4, -8, 0, 4);
    assert_eq!(run_error(b), RuntimeError::DivisionByZero { at });
}

#[test]
fn remainder_by_zero_is_fatal() {
    assert!(matches!(
        binary_result(Opcode::DivRemainder, 5, 0),
        Err(RuntimeError::DivisionByZero { .. })
    ));
}

#[test]
fn unsupported_width_is_fatal() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.binary(Opcode::Add, 0, 0, 0, 3);
    assert_eq!(run_error(b), RuntimeError::UnsupportedWidth { at, width: 3 });
}

fn compare_result(a: i32, b_value: i32, op: CompareOp) -> i32 {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&a.to_le_bytes());
    b.allocate_stack(&b_value.to_le_bytes());
    b.compare(-4, -8, 4, 0, op);
    exit_code(b)
}

#[test]
fn compare_greater_than() {
    assert_eq!(compare_result(10, 3, CompareOp::Gt), 1);
    assert_eq!(compare_result(3, 10, CompareOp::Gt), 0);
}

#[test]
fn compare_operators() {
    assert_eq!(compare_result(4, 4, CompareOp::Eq), 1);
    assert_eq!(compare_result(4, 4, CompareOp::Neq), 0);
    assert_eq!(compare_result(4, 4, CompareOp::Ge), 1);
    assert_eq!(compare_result(-1, 0, CompareOp::Lt), 1);
    assert_eq!(compare_result(5, 4, CompareOp::Le), 0);
}

#[test]
fn invalid_compare_operator() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.position() as usize;
    b.raw(&[Opcode::Compare as u8]);
    b.raw(&[0; 4]);
    b.raw(&[0; 4]);
    b.raw(&[4]);
    b.raw(&[0; 4]);
    b.raw(&[9]);
    assert_eq!(
        run_error(b),
        RuntimeError::InvalidCompareOperator { at, op: 9 }
    );
}

#[test]
fn negate_increment_decrement() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&17i32.to_le_bytes());
    b.negate(-4, 0, 4);
    b.decrement(0, 4);
    b.decrement(0, 4);
    b.increment(0, 4);
    assert_eq!(exit_code(b), -18);
}

#[test]
fn increment_wraps_short() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&i16::MAX.to_le_bytes());
    b.allocate_stack(&[0; 2]);
    b.increment(0, 2);
    let memory = run_memory(&module(b));
    assert_eq!(memory.read_i16(0), Ok(i16::MIN));
}

// ============================================================
// Data movement and pointers
// ============================================================

#[test]
fn mov_frame_and_deref_sources() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&21i32.to_le_bytes());
    b.allocate_stack(&[0; 4]);
    b.to_ptr_value(-4, -8);
    b.mov(Dest::Direct(0), Source::Deref { offset: -8, size: 4 });
    b.mov(Dest::Direct(-4), Source::Frame { offset: 0, size: 4 });
    b.binary(Opcode::Add, 0, -4, 0, 4);
    assert_eq!(exit_code(b), 42);
}

#[test]
fn mov_indirect_destination() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&[0; 4]);
    b.to_ptr_value(0, -4);
    b.mov(Dest::Indirect(-4), imm(64));
    assert_eq!(exit_code(b), 64);
}

#[test]
fn invalid_mov_modes() {
    let mut b = ImageBuilder::new();
    b.raw(&[Opcode::Mov as u8, 7]);
    assert_eq!(
        run_error(b),
        RuntimeError::InvalidDestinationMode { at: 0, mode: 7 }
    );

    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.position() as usize;
    b.raw(&[Opcode::Mov as u8, 1, 0, 0, 0, 0, 5]);
    assert_eq!(
        run_error(b),
        RuntimeError::InvalidSourceMode { at, mode: 5 }
    );
}

#[test]
fn mov_absolute_negative_address_is_out_of_bounds() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.mov(Dest::Direct(0), Source::Absolute { address: -4, size: 4 });
    assert!(matches!(
        run_error(b),
        RuntimeError::Memory {
            at: failed,
            source: MemoryError::OutOfBounds { .. }
        } if failed == at
    ));
}

#[test]
fn pointer_get_set_and_ref() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]); //  0: exit
    b.allocate_stack(&9i32.to_le_bytes()); // -4: value
    b.allocate_stack(&[0; 4]); // -8: &value
    b.allocate_stack(&5i32.to_le_bytes()); // -12: replacement
    b.allocate_stack(&[0; 4]); // -16: copy of &value
    b.to_ptr_value(-4, -8);
    b.ptr_get(-8, 0, 4);
    b.ptr_set(-8, -12, 4);
    b.to_ptr_ref(-8, -16);
    let memory = run_memory(&module(b));
    assert_eq!(memory.read_i32(0), Ok(9));
    assert_eq!(memory.read_i32(4), Ok(5));
    assert_eq!(memory.read_pointer(8), Ok(4));
    assert_eq!(memory.read_pointer(16), Ok(4));
}

#[test]
fn pointer_shift_modes() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&100i32.to_le_bytes()); // 0: pointer
    b.allocate_stack(&[(-2i8) as u8]); // -4: shift variable
    b.ptr_shift(0, 8);
    b.ptr_shift_by(0, -4, 1, 1);
    assert_eq!(exit_code(b), 107);
}

#[test]
fn invalid_pointer_shift_mode() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.position() as usize;
    b.raw(&[Opcode::PtrShift as u8, 4, 0, 0, 0, 0]);
    assert_eq!(
        run_error(b),
        RuntimeError::InvalidShiftMode { at, mode: 4 }
    );
}

#[test]
fn field_setter_then_getter() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]); //  0: exit
    b.allocate_stack(&[0; 4]); // -4: object
    b.allocate_heap(-4, 8);
    b.allocate_stack(&[0; 4]); // -8: field address
    b.field_access(-4, 4, 4, false, -8);
    b.mov(Dest::Indirect(-8), imm(77));
    b.field_access(-4, 4, 4, true, 0);
    let module = module(b);
    assert_eq!(run_module(&module).unwrap().exit_code, 77);

    let memory = run_memory(&module);
    let object = VmConfig::default().stack_size;
    assert_eq!(memory.read_pointer(4), Ok(object));
    assert_eq!(memory.read_pointer(8), Ok(object + 4));
    assert_eq!(memory.read_i32(object + 4), Ok(77));
}

#[test]
fn cast_truncates_to_low_bytes() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&0x1234_5678i32.to_le_bytes());
    b.allocate_stack(&[0xFF; 4]);
    b.cast(0, 4, -4, 2);
    let memory = run_memory(&module(b));
    assert_eq!(memory.read(4, 4), Ok(&[0x78u8, 0x56, 0xFF, 0xFF][..]));
}

#[test]
fn cast_zero_extends() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0xFE, 0xFF, 0xAA, 0xAA]);
    b.allocate_stack(&[0xFF; 4]);
    b.cast(0, 2, -4, 4);
    let memory = run_memory(&module(b));
    assert_eq!(memory.read_i32(4), Ok(0xFFFE));
}

#[test]
fn cast_rejects_odd_sizes() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 8]);
    let at = b.cast(0, 3, -4, 4);
    assert_eq!(run_error(b), RuntimeError::UnsupportedWidth { at, width: 3 });
}

// ============================================================
// Decoding and sections
// ============================================================

#[test]
fn zero_opcode_is_fatal() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.raw(&[0]);
    assert_eq!(run_error(b), RuntimeError::InvalidOpcode { at: 7, byte: 0 });
}

#[test]
fn opcode_past_table_is_fatal() {
    let mut b = ImageBuilder::new();
    b.raw(&[37]);
    assert_eq!(run_error(b), RuntimeError::InvalidOpcode { at: 0, byte: 37 });
}

#[test]
fn truncated_operand_is_fatal() {
    let mut b = ImageBuilder::new();
    b.raw(&[Opcode::Call as u8, 1, 0]);
    assert!(matches!(
        run_error(b),
        RuntimeError::Truncated { at: 0, .. }
    ));
}

#[test]
fn data_section_must_be_first() {
    let mut b = ImageBuilder::new();
    b.code_section();
    b.data_section(&[1]);
    assert_eq!(run_error(b), RuntimeError::MisplacedDataSection { at: 2 });
}

#[test]
fn data_section_requires_code_marker() {
    let mut b = ImageBuilder::new();
    b.raw(&[Opcode::Section as u8, 0, 1, 0, 0, 0, 9]);
    b.exit();
    assert_eq!(
        run_error(b),
        RuntimeError::UnterminatedDataSection {
            at: 0,
            opcode: Opcode::Exit as u8,
            kind: 0
        }
    );
}

#[test]
fn data_section_length_overruns_image() {
    let mut b = ImageBuilder::new();
    b.raw(&[Opcode::Section as u8, 0, 40, 0, 0, 0, 1, 2]);
    assert!(matches!(
        run_error(b),
        RuntimeError::Truncated { at: 0, .. }
    ));
}

#[test]
fn invalid_section_kind() {
    let mut b = ImageBuilder::new();
    b.raw(&[Opcode::Section as u8, 4]);
    assert_eq!(
        run_error(b),
        RuntimeError::InvalidSectionKind { at: 0, kind: 4 }
    );
}

// ============================================================
// VM commands
// ============================================================

#[test]
fn print_formats_every_kind() {
    let mut b = ImageBuilder::new();
    // "hi" as [len i32][bytes] at address 0
    b.data_section(&[2, 0, 0, 0, b'h', b'i']);
    b.allocate_stack(&[0; 4]); //  0: exit
    b.allocate_stack(&[1]); // -4
    b.allocate_stack(&[200]); // -5
    b.allocate_stack(&(-3i16).to_le_bytes()); // -6
    b.allocate_stack(&(-5_000_000_000i64).to_le_bytes()); // -8
    b.allocate_stack(&0x1Fi32.to_le_bytes()); // -16
    b.allocate_stack(&0i32.to_le_bytes()); // -20: pointer to "hi"
    b.print(&[
        CommandArg::new(-4, 1, ValueKind::Bool),
        CommandArg::new(-5, 1, ValueKind::Byte),
        CommandArg::new(-6, 2, ValueKind::Short),
    ]);
    b.print(&[
        CommandArg::new(-8, 8, ValueKind::Long),
        CommandArg::new(-16, 4, ValueKind::Pointer),
        CommandArg::new(-20, 4, ValueKind::Str),
    ]);
    b.print(&[]);

    let (result, output) = run_captured(&module(b), &NativeRegistry::new());
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(output, "true200-3\n-5000000000<0x1F>hi\n\n");
}

#[test]
fn print_false() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0]);
    b.print(&[CommandArg::new(0, 1, ValueKind::Bool)]);
    let (_, output) = run_captured(&module(b), &NativeRegistry::new());
    assert_eq!(output, "false\n");
}

#[test]
fn print_unknown_kind_is_fatal() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.print(&[CommandArg {
        offset: 0,
        size: 4,
        kind: 9,
    }]);
    assert_eq!(run_error(b), RuntimeError::InvalidValueKind { at, kind: 9 });
}

#[test]
fn print_size_must_match_kind() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    let at = b.print(&[CommandArg::new(0, 2, ValueKind::Int)]);
    assert_eq!(run_error(b), RuntimeError::UnsupportedWidth { at, width: 2 });
}

#[test]
fn invalid_vm_command() {
    let mut b = ImageBuilder::new();
    b.raw(&[Opcode::VmCommand as u8, 1]);
    assert_eq!(
        run_error(b),
        RuntimeError::InvalidCommand { at: 0, command: 1 }
    );
}

#[test]
fn sleep_accepts_one_integer() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&1i32.to_le_bytes());
    b.sleep(CommandArg::new(0, 4, ValueKind::Int));
    assert_eq!(exit_code(b), 1);
}

#[test]
fn sleep_rejects_non_integer_kind() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[1]);
    let at = b.sleep(CommandArg::new(0, 1, ValueKind::Bool));
    assert_eq!(run_error(b), RuntimeError::InvalidValueKind { at, kind: 0 });
}

#[test]
fn sleep_rejects_negative_duration() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&(-1i32).to_le_bytes());
    let at = b.sleep(CommandArg::new(0, 4, ValueKind::Int));
    assert_eq!(run_error(b), RuntimeError::NegativeOperand { at, value: -1 });
}

// ============================================================
// Native bindings
// ============================================================

fn named_type(name: &str) -> TypeDecl {
    TypeDecl {
        name: name.into(),
        is_value_type: true,
        fields: vec![],
        functions: vec![],
    }
}

/// `Console.Write(int, string)` declared abstract, with an image that pushes
/// `5` and a pointer to "hi" before invoking it.
fn console_module(is_abstract: bool) -> (Module, usize) {
    let mut b = ImageBuilder::new();
    b.data_section(&[2, 0, 0, 0, b'h', b'i']);
    b.allocate_stack(&[0; 4]);
    b.allocate_stack(&5i32.to_le_bytes());
    b.allocate_stack(&0i32.to_le_bytes());
    let invoke = b.invoke(0);
    b.exit();

    let module = Module {
        types: vec![named_type("int"), named_type("string"), named_type("Console")],
        functions: vec![FunctionDecl {
            name: "Write".into(),
            is_static: true,
            is_abstract,
            owner_type: 2,
            arguments: vec![
                FieldDecl {
                    name: "count".into(),
                    type_index: 0,
                },
                FieldDecl {
                    name: "text".into(),
                    type_index: 1,
                },
            ],
            returns: vec![],
            pointed_opcode: 0,
        }],
        code: b.finish(),
    };
    (module, invoke)
}

#[test]
fn native_receives_marshalled_arguments() {
    let (module, _) = console_module(true);
    let mut natives = NativeRegistry::new();
    natives.register("Console", "Write", |ctx, args| {
        let [NativeValue::Int(count), NativeValue::Str(text)] = args else {
            return Err(format!("unexpected arguments {args:?}"));
        };
        writeln!(ctx.output, "{count}:{text}").map_err(|e| e.to_string())?;
        let base = ctx.memory.stack_base();
        ctx.memory.write_i32(base, 99).map_err(|e| e.to_string())
    });

    let (result, output) = run_captured(&module, &natives);
    assert_eq!(result.map(|s| s.exit_code), Ok(99));
    assert_eq!(output, "5:hi\n");
}

#[test]
fn load_links_declared_functions() {
    let (module, _) = console_module(true);
    let mut natives = NativeRegistry::new();
    natives.register("Console", "Write", |ctx, _| {
        writeln!(ctx.output, "called").map_err(|e| e.to_string())
    });
    let config = VmConfig {
        stack_size: 256,
        ..VmConfig::default()
    };

    let mut vm = Vm::load(&module, &natives, config.clone(), Vec::new()).expect("module links");
    assert_eq!(vm.config(), &config);
    assert_eq!(vm.functions().len(), 1);
    assert!(matches!(
        vm.functions().get(0),
        Some(Binding::Native { qualified_name, .. }) if qualified_name == "Console.Write"
    ));
    assert!(vm.output().is_empty());

    vm.execute().expect("module runs");
    assert_eq!(vm.output().as_slice(), b"called\n");
}

#[test]
fn native_failure_is_fatal() {
    let (module, at) = console_module(true);
    let mut natives = NativeRegistry::new();
    natives.register("Console", "Write", |_, _| Err("device offline".into()));
    let (result, _) = run_captured(&module, &natives);
    assert_eq!(
        result,
        Err(RuntimeError::Native {
            at,
            function: "Console.Write".into(),
            message: "device offline".into()
        })
    );
}

#[test]
fn unresolved_native_fails_at_load() {
    let (module, _) = console_module(true);
    let err = Vm::load(&module, &NativeRegistry::new(), VmConfig::default(), io::sink())
        .err()
        .expect("linking fails");
    assert_eq!(
        err,
        RuntimeError::UnresolvedFunction {
            owner: "Console".into(),
            name: "Write".into()
        }
    );
}

#[test]
fn invoking_in_module_function_is_fatal() {
    let (module, at) = console_module(false);
    assert_eq!(
        run_module(&module),
        Err(RuntimeError::NotAbstract {
            at,
            index: 0,
            position: 0
        })
    );
}

#[test]
fn invoking_unknown_function_is_fatal() {
    let mut b = ImageBuilder::new();
    let at = b.invoke(3);
    assert_eq!(
        run_error(b),
        RuntimeError::UnknownFunction { at, index: 3 }
    );
}

// ============================================================
// Profiling
// ============================================================

#[test]
fn profile_counts_dispatched_opcodes() {
    let mut b = ImageBuilder::new();
    b.allocate_stack(&[0; 4]);
    b.increment(0, 4);
    b.increment(0, 4);
    b.exit();
    let module = module(b);

    let config = VmConfig {
        profile: true,
        ..VmConfig::default()
    };
    let mut vm = Vm::load(&module, &NativeRegistry::new(), config, io::sink()).unwrap();
    vm.execute().unwrap();
    let profile = vm.profile().expect("profiling enabled");
    assert_eq!(profile.count(Opcode::Increment), 2);
    assert_eq!(profile.count(Opcode::Exit), 1);
    assert_eq!(profile.entries().len(), 3);
}

#[test]
fn profile_disabled_by_default() {
    let module = Module::default();
    let vm = Vm::load(&module, &NativeRegistry::new(), VmConfig::default(), io::sink()).unwrap();
    assert!(vm.profile().is_none());
}
