//! The stack memory ceiling against hostile growth scripts.

use tx_core::script::{Interpreter, Limits, Script, ScriptErrorKind};

/// Iterated squaring: `OP_2 OP_MUL` then 22 rounds of `OP_DUP OP_MUL`
/// raise the pushed seed to the 2^22 power. The element doubles in
/// length every round; the ceiling must stop it long before the process
/// allocates anything near the theoretical result.
#[test]
fn squaring_attack_hits_memory_ceiling() {
    let seed = "ff".repeat(16); // 16-byte operand
    let unlocking = Script::from_asm(&seed).unwrap();

    let mut asm = String::from("OP_2 OP_MUL");
    for _ in 0..22 {
        asm.push_str(" OP_DUP OP_MUL");
    }
    asm.push_str(" OP_DROP");
    let locking = Script::from_asm(&asm).unwrap();

    let limits = Limits::with_memory_limit(32 * 1024 * 1024);
    let err = Interpreter::new(limits)
        .evaluate(&unlocking, &locking, None)
        .unwrap_err();
    assert_eq!(err.kind, ScriptErrorKind::StackMemoryExceeded);
    assert!(err.opcode_index.is_some());
}

/// The same shape under an untrusted-context ceiling trips far earlier.
#[test]
fn small_ceiling_trips_early() {
    let unlocking = Script::from_asm(&"ee".repeat(64)).unwrap();
    let mut asm = String::from("OP_2 OP_MUL");
    for _ in 0..22 {
        asm.push_str(" OP_DUP OP_MUL");
    }
    let locking = Script::from_asm(&asm).unwrap();

    let err = Interpreter::new(Limits::with_memory_limit(100 * 1024))
        .evaluate(&unlocking, &locking, None)
        .unwrap_err();
    assert_eq!(err.kind, ScriptErrorKind::StackMemoryExceeded);
}

/// Doubling by concatenation is caught the same way.
#[test]
fn cat_doubling_hits_ceiling() {
    let unlocking = Script::from_asm(&"ab".repeat(32)).unwrap();
    let mut asm = String::new();
    for _ in 0..30 {
        asm.push_str("OP_DUP OP_CAT ");
    }
    asm.push_str("OP_1");
    let locking = Script::from_asm(asm.trim()).unwrap();

    let err = Interpreter::new(Limits::with_memory_limit(1024 * 1024))
        .evaluate(&unlocking, &locking, None)
        .unwrap_err();
    assert_eq!(err.kind, ScriptErrorKind::StackMemoryExceeded);
}

/// Balanced push/drop traffic stays under a tiny ceiling: the guard
/// tracks live bytes, not cumulative throughput.
#[test]
fn ceiling_tracks_live_bytes_only() {
    let mut asm = String::new();
    for _ in 0..200 {
        asm.push_str("00112233445566778899aabbccddeeff00112233 OP_DROP ");
    }
    asm.push_str("OP_1");
    let locking = Script::from_asm(asm.trim()).unwrap();

    Interpreter::new(Limits::with_memory_limit(128))
        .evaluate(&Script::new(), &locking, None)
        .unwrap();
}
