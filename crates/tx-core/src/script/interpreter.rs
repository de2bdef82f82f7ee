//! Script interpreter
//!
//! A stack machine over byte strings. Evaluation runs the unlocking
//! script (push-only) and then the locking script over the same stack,
//! and succeeds when the final top of stack is truthy.
//!
//! Memory is the primary resource guard: the summed byte length of every
//! element on both stacks is checked before each push against a
//! configurable ceiling, so a push/dup explosion fails with
//! `StackMemoryExceeded` long before the process feels it. An opcode
//! budget and the classic script-number width limit are also available
//! through [`Limits`].

use num_bigint::BigInt;

use super::number;
use super::op::*;
use super::{Script, ScriptChunk, ScriptError, ScriptErrorKind, ScriptResult};
use crate::crypto;
use crate::transaction::sighash::{self, SighashType};
use crate::transaction::Transaction;

/// Default stack memory ceiling: 100 MB, the validation-context bound.
pub const DEFAULT_MEMORY_LIMIT: usize = 100_000_000;

/// Resource bounds for one evaluation.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Ceiling on the summed byte length of all stack and altstack
    /// elements. Checked before every push.
    pub memory_limit: usize,
    /// Ceiling on executed non-push opcodes. `None` leaves it unbounded.
    pub max_ops: Option<usize>,
    /// Width bound for arithmetic operands. `None` follows post-Genesis
    /// rules (unbounded); `Some(4)` restores the classic policy bound.
    pub max_number_size: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            max_ops: None,
            max_number_size: None,
        }
    }
}

impl Limits {
    pub fn with_memory_limit(memory_limit: usize) -> Self {
        Self {
            memory_limit,
            ..Self::default()
        }
    }
}

/// Transaction context for signature and lock-time opcodes.
///
/// Without it the interpreter still runs: signature checks validate
/// encoding only and then succeed, and lock-time checks validate their
/// operand but skip the comparisons against the spending transaction,
/// which is what template-level tests want. Verification paths always
/// supply a context.
#[derive(Debug, Clone, Copy)]
pub struct SpendContext<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub source_satoshis: u64,
}

/// Lock-time operands may be 5 bytes wide.
const LOCKTIME_NUMBER_SIZE: usize = 5;

const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;
const SEQUENCE_DISABLE_FLAG: i64 = 1 << 31;
const SEQUENCE_TYPE_FLAG: i64 = 1 << 22;
const SEQUENCE_LOCKTIME_MASK: i64 = 0x0000_FFFF;
const LOCKTIME_BLOCK_HEIGHT_THRESHOLD: i64 = 500_000_000;

/// Both value stacks plus the shared memory budget.
struct Stacks {
    stack: Vec<Vec<u8>>,
    alt: Vec<Vec<u8>>,
    mem: usize,
    limit: usize,
}

impl Stacks {
    fn new(limit: usize) -> Self {
        Self {
            stack: Vec::new(),
            alt: Vec::new(),
            mem: 0,
            limit,
        }
    }

    fn charge(&mut self, len: usize) -> Result<(), ScriptErrorKind> {
        if self.mem + len > self.limit {
            return Err(ScriptErrorKind::StackMemoryExceeded);
        }
        self.mem += len;
        Ok(())
    }

    fn push(&mut self, v: Vec<u8>) -> Result<(), ScriptErrorKind> {
        self.charge(v.len())?;
        self.stack.push(v);
        Ok(())
    }

    fn push_bool(&mut self, b: bool) -> Result<(), ScriptErrorKind> {
        self.push(if b { vec![1] } else { Vec::new() })
    }

    fn pop(&mut self) -> Result<Vec<u8>, ScriptErrorKind> {
        let v = self.stack.pop().ok_or(ScriptErrorKind::StackUnderflow)?;
        self.mem -= v.len();
        Ok(v)
    }

    /// Borrow the element `depth` entries below the top.
    fn peek(&self, depth: usize) -> Result<&[u8], ScriptErrorKind> {
        if depth >= self.stack.len() {
            return Err(ScriptErrorKind::StackUnderflow);
        }
        Ok(&self.stack[self.stack.len() - 1 - depth])
    }

    /// Remove the element `depth` entries below the top.
    fn remove(&mut self, depth: usize) -> Result<Vec<u8>, ScriptErrorKind> {
        if depth >= self.stack.len() {
            return Err(ScriptErrorKind::StackUnderflow);
        }
        let idx = self.stack.len() - 1 - depth;
        let v = self.stack.remove(idx);
        self.mem -= v.len();
        Ok(v)
    }

    fn push_alt(&mut self, v: Vec<u8>) -> Result<(), ScriptErrorKind> {
        self.charge(v.len())?;
        self.alt.push(v);
        Ok(())
    }

    fn pop_alt(&mut self) -> Result<Vec<u8>, ScriptErrorKind> {
        let v = self.alt.pop().ok_or(ScriptErrorKind::StackUnderflow)?;
        self.mem -= v.len();
        Ok(v)
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// One OP_IF/OP_NOTIF frame.
struct Branch {
    /// Whether this arm currently executes.
    executing: bool,
    /// Whether the frame was opened inside an executing outer branch;
    /// OP_ELSE only toggles live frames.
    live: bool,
    else_seen: bool,
}

/// Script interpreter, parameterized by resource limits.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    limits: Limits,
}

impl Interpreter {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Evaluate `unlocking` then `locking` over one stack.
    ///
    /// Returns the terminal stack on success (top element truthy).
    pub fn evaluate(
        &self,
        unlocking: &Script,
        locking: &Script,
        ctx: Option<&SpendContext<'_>>,
    ) -> ScriptResult<Vec<Vec<u8>>> {
        // push-only applies to the unlocking script alone
        if let Some(bad) = unlocking.chunks.iter().position(|c| !is_push_op(c.op)) {
            return Err(ScriptError::new(
                ScriptErrorKind::PushOnlyRequired,
                Some(bad),
                format!(
                    "non-push opcode {} in unlocking script",
                    op_name(unlocking.chunks[bad].op).unwrap_or("?")
                ),
            ));
        }

        let mut stacks = Stacks::new(self.limits.memory_limit);
        let mut op_count: usize = 0;

        self.run_script(unlocking, 0, &mut stacks, &mut op_count, None, None)?;
        self.run_script(
            locking,
            unlocking.chunks.len(),
            &mut stacks,
            &mut op_count,
            ctx,
            Some(locking),
        )?;

        let ok = stacks
            .stack
            .last()
            .map(|v| number::is_truthy(v))
            .unwrap_or(false);
        if !ok {
            return Err(ScriptError::new(
                ScriptErrorKind::VerifyFailed,
                None,
                "evaluation ended with a false top of stack",
            ));
        }
        Ok(stacks.stack)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_script(
        &self,
        script: &Script,
        index_base: usize,
        stacks: &mut Stacks,
        op_count: &mut usize,
        ctx: Option<&SpendContext<'_>>,
        locking: Option<&Script>,
    ) -> ScriptResult<()> {
        let mut if_stack: Vec<Branch> = Vec::new();
        let mut last_code_sep: Option<usize> = None;

        for (pc, chunk) in script.chunks.iter().enumerate() {
            let at = Some(index_base + pc);
            let err = |kind, reason: String| ScriptError::new(kind, at, reason);
            let lift =
                |kind: ScriptErrorKind, what: &str| ScriptError::new(kind, at, what.to_string());

            let opcode = chunk.op;

            // disabled opcodes poison the script even in dead branches
            if matches!(opcode, OP_2MUL | OP_2DIV | OP_VERIF | OP_VERNOTIF) {
                return Err(err(
                    ScriptErrorKind::DisabledOpcode,
                    format!("{} is disabled", op_name(opcode).unwrap_or("?")),
                ));
            }

            if !is_push_op(opcode) {
                *op_count += 1;
                if let Some(max) = self.limits.max_ops {
                    if *op_count > max {
                        return Err(err(
                            ScriptErrorKind::OpCountExceeded,
                            format!("opcode budget of {max} exceeded"),
                        ));
                    }
                }
            }

            let executing = if_stack.iter().all(|b| b.executing);

            // conditional frames are tracked whether executing or not
            match opcode {
                OP_IF | OP_NOTIF => {
                    if executing {
                        let top = stacks.pop().map_err(|k| lift(k, "IF needs a condition"))?;
                        let mut taken = number::is_truthy(&top);
                        if opcode == OP_NOTIF {
                            taken = !taken;
                        }
                        if_stack.push(Branch {
                            executing: taken,
                            live: true,
                            else_seen: false,
                        });
                    } else {
                        if_stack.push(Branch {
                            executing: false,
                            live: false,
                            else_seen: false,
                        });
                    }
                    continue;
                }
                OP_ELSE => {
                    let frame = if_stack.last_mut().ok_or_else(|| {
                        ScriptError::new(
                            ScriptErrorKind::ControlStackMismatch,
                            at,
                            "OP_ELSE without OP_IF".to_string(),
                        )
                    })?;
                    if frame.else_seen {
                        return Err(err(
                            ScriptErrorKind::ControlStackMismatch,
                            "second OP_ELSE in one conditional".to_string(),
                        ));
                    }
                    frame.else_seen = true;
                    if frame.live {
                        frame.executing = !frame.executing;
                    }
                    continue;
                }
                OP_ENDIF => {
                    if if_stack.pop().is_none() {
                        return Err(err(
                            ScriptErrorKind::ControlStackMismatch,
                            "OP_ENDIF without OP_IF".to_string(),
                        ));
                    }
                    continue;
                }
                _ => {}
            }

            if !executing {
                continue;
            }

            // data pushes
            if let Some(data) = &chunk.data {
                stacks
                    .push(data.clone())
                    .map_err(|k| lift(k, "push exceeds memory limit"))?;
                continue;
            }

            match opcode {
                // ── constants ────────────────────────────────────────
                OP_0 => stacks.push(Vec::new()).map_err(|k| lift(k, "push"))?,
                OP_1NEGATE => stacks
                    .push(vec![0x81])
                    .map_err(|k| lift(k, "push"))?,
                OP_1..=OP_16 => stacks
                    .push(vec![opcode - OP_1 + 1])
                    .map_err(|k| lift(k, "push"))?,

                // ── flow ─────────────────────────────────────────────
                OP_NOP | OP_NOP1 | OP_NOP4 | OP_NOP5 | OP_NOP6 | OP_NOP7 | OP_NOP8 | OP_NOP9
                | OP_NOP10 => {}
                OP_VERIFY => {
                    let v = stacks.pop().map_err(|k| lift(k, "VERIFY"))?;
                    if !number::is_truthy(&v) {
                        return Err(err(
                            ScriptErrorKind::VerifyFailed,
                            "OP_VERIFY failed".to_string(),
                        ));
                    }
                }
                OP_RETURN => {
                    return Err(err(
                        ScriptErrorKind::Malformed,
                        "OP_RETURN terminates evaluation".to_string(),
                    ));
                }
                OP_VER | OP_RESERVED | OP_RESERVED1 | OP_RESERVED2 => {
                    return Err(err(
                        ScriptErrorKind::Malformed,
                        format!("reserved opcode {}", op_name(opcode).unwrap_or("?")),
                    ));
                }

                // ── alt stack ────────────────────────────────────────
                OP_TOALTSTACK => {
                    let v = stacks.pop().map_err(|k| lift(k, "TOALTSTACK"))?;
                    stacks.push_alt(v).map_err(|k| lift(k, "TOALTSTACK"))?;
                }
                OP_FROMALTSTACK => {
                    let v = stacks.pop_alt().map_err(|k| lift(k, "FROMALTSTACK"))?;
                    stacks.push(v).map_err(|k| lift(k, "FROMALTSTACK"))?;
                }

                // ── stack shuffling ──────────────────────────────────
                OP_2DROP => {
                    stacks.pop().map_err(|k| lift(k, "2DROP"))?;
                    stacks.pop().map_err(|k| lift(k, "2DROP"))?;
                }
                OP_2DUP => {
                    let a = stacks.peek(1).map_err(|k| lift(k, "2DUP"))?.to_vec();
                    let b = stacks.peek(0).map_err(|k| lift(k, "2DUP"))?.to_vec();
                    stacks.push(a).map_err(|k| lift(k, "2DUP"))?;
                    stacks.push(b).map_err(|k| lift(k, "2DUP"))?;
                }
                OP_3DUP => {
                    let a = stacks.peek(2).map_err(|k| lift(k, "3DUP"))?.to_vec();
                    let b = stacks.peek(1).map_err(|k| lift(k, "3DUP"))?.to_vec();
                    let c = stacks.peek(0).map_err(|k| lift(k, "3DUP"))?.to_vec();
                    stacks.push(a).map_err(|k| lift(k, "3DUP"))?;
                    stacks.push(b).map_err(|k| lift(k, "3DUP"))?;
                    stacks.push(c).map_err(|k| lift(k, "3DUP"))?;
                }
                OP_2OVER => {
                    let a = stacks.peek(3).map_err(|k| lift(k, "2OVER"))?.to_vec();
                    let b = stacks.peek(2).map_err(|k| lift(k, "2OVER"))?.to_vec();
                    stacks.push(a).map_err(|k| lift(k, "2OVER"))?;
                    stacks.push(b).map_err(|k| lift(k, "2OVER"))?;
                }
                OP_2ROT => {
                    let a = stacks.remove(5).map_err(|k| lift(k, "2ROT"))?;
                    let b = stacks.remove(4).map_err(|k| lift(k, "2ROT"))?;
                    stacks.push(a).map_err(|k| lift(k, "2ROT"))?;
                    stacks.push(b).map_err(|k| lift(k, "2ROT"))?;
                }
                OP_2SWAP => {
                    let a = stacks.remove(3).map_err(|k| lift(k, "2SWAP"))?;
                    let b = stacks.remove(2).map_err(|k| lift(k, "2SWAP"))?;
                    stacks.push(a).map_err(|k| lift(k, "2SWAP"))?;
                    stacks.push(b).map_err(|k| lift(k, "2SWAP"))?;
                }
                OP_IFDUP => {
                    let top = stacks.peek(0).map_err(|k| lift(k, "IFDUP"))?;
                    if number::is_truthy(top) {
                        let copy = top.to_vec();
                        stacks.push(copy).map_err(|k| lift(k, "IFDUP"))?;
                    }
                }
                OP_DEPTH => {
                    let d = BigInt::from(stacks.depth());
                    stacks
                        .push(number::encode(&d))
                        .map_err(|k| lift(k, "DEPTH"))?;
                }
                OP_DROP => {
                    stacks.pop().map_err(|k| lift(k, "DROP"))?;
                }
                OP_DUP => {
                    let top = stacks.peek(0).map_err(|k| lift(k, "DUP"))?.to_vec();
                    stacks.push(top).map_err(|k| lift(k, "DUP"))?;
                }
                OP_NIP => {
                    stacks.remove(1).map_err(|k| lift(k, "NIP"))?;
                }
                OP_OVER => {
                    let v = stacks.peek(1).map_err(|k| lift(k, "OVER"))?.to_vec();
                    stacks.push(v).map_err(|k| lift(k, "OVER"))?;
                }
                OP_PICK | OP_ROLL => {
                    let n = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let depth = number::to_i64(&n)
                        .filter(|&d| d >= 0)
                        .ok_or_else(|| {
                            err(
                                ScriptErrorKind::StackUnderflow,
                                "PICK/ROLL index out of range".to_string(),
                            )
                        })? as usize;
                    if opcode == OP_PICK {
                        let v = stacks.peek(depth).map_err(|k| lift(k, "PICK"))?.to_vec();
                        stacks.push(v).map_err(|k| lift(k, "PICK"))?;
                    } else {
                        let v = stacks.remove(depth).map_err(|k| lift(k, "ROLL"))?;
                        stacks.push(v).map_err(|k| lift(k, "ROLL"))?;
                    }
                }
                OP_ROT => {
                    let v = stacks.remove(2).map_err(|k| lift(k, "ROT"))?;
                    stacks.push(v).map_err(|k| lift(k, "ROT"))?;
                }
                OP_SWAP => {
                    let v = stacks.remove(1).map_err(|k| lift(k, "SWAP"))?;
                    stacks.push(v).map_err(|k| lift(k, "SWAP"))?;
                }
                OP_TUCK => {
                    let b = stacks.pop().map_err(|k| lift(k, "TUCK"))?;
                    let a = stacks.pop().map_err(|k| lift(k, "TUCK"))?;
                    stacks.push(b.clone()).map_err(|k| lift(k, "TUCK"))?;
                    stacks.push(a).map_err(|k| lift(k, "TUCK"))?;
                    stacks.push(b).map_err(|k| lift(k, "TUCK"))?;
                }

                // ── splice ───────────────────────────────────────────
                OP_CAT => {
                    let b = stacks.pop().map_err(|k| lift(k, "CAT"))?;
                    let mut a = stacks.pop().map_err(|k| lift(k, "CAT"))?;
                    a.extend_from_slice(&b);
                    stacks.push(a).map_err(|k| lift(k, "CAT"))?;
                }
                OP_SPLIT => {
                    let n = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let a = stacks.pop().map_err(|k| lift(k, "SPLIT"))?;
                    let split_at = number::to_i64(&n)
                        .filter(|&p| p >= 0 && p as usize <= a.len())
                        .ok_or_else(|| {
                            err(
                                ScriptErrorKind::Malformed,
                                "SPLIT position out of range".to_string(),
                            )
                        })? as usize;
                    let right = a[split_at..].to_vec();
                    let left = a[..split_at].to_vec();
                    stacks.push(left).map_err(|k| lift(k, "SPLIT"))?;
                    stacks.push(right).map_err(|k| lift(k, "SPLIT"))?;
                }
                OP_NUM2BIN => {
                    let size = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let raw = stacks.pop().map_err(|k| lift(k, "NUM2BIN"))?;
                    let width = number::to_i64(&size)
                        .filter(|&w| w >= 0)
                        .ok_or_else(|| {
                            err(
                                ScriptErrorKind::Malformed,
                                "NUM2BIN width out of range".to_string(),
                            )
                        })? as usize;
                    let n = number::decode(&raw, None).expect("unbounded decode");
                    let minimal = number::encode(&n);
                    if minimal.len() > width {
                        return Err(err(
                            ScriptErrorKind::Malformed,
                            "NUM2BIN value wider than requested size".to_string(),
                        ));
                    }
                    let mut out = minimal;
                    let negative = !out.is_empty() && out[out.len() - 1] & 0x80 != 0;
                    if negative {
                        let end = out.len() - 1;
                        out[end] &= 0x7f;
                    }
                    while out.len() < width {
                        out.push(0);
                    }
                    if negative {
                        let end = out.len() - 1;
                        out[end] |= 0x80;
                    }
                    stacks.push(out).map_err(|k| lift(k, "NUM2BIN"))?;
                }
                OP_BIN2NUM => {
                    let raw = stacks.pop().map_err(|k| lift(k, "BIN2NUM"))?;
                    let n = number::decode(&raw, None).expect("unbounded decode");
                    stacks
                        .push(number::encode(&n))
                        .map_err(|k| lift(k, "BIN2NUM"))?;
                }
                OP_SIZE => {
                    let len = stacks.peek(0).map_err(|k| lift(k, "SIZE"))?.len();
                    stacks
                        .push(number::encode(&BigInt::from(len)))
                        .map_err(|k| lift(k, "SIZE"))?;
                }

                // ── bit logic ────────────────────────────────────────
                OP_INVERT => {
                    let mut a = stacks.pop().map_err(|k| lift(k, "INVERT"))?;
                    for b in &mut a {
                        *b = !*b;
                    }
                    stacks.push(a).map_err(|k| lift(k, "INVERT"))?;
                }
                OP_AND | OP_OR | OP_XOR => {
                    let b = stacks.pop().map_err(|k| lift(k, "bitwise"))?;
                    let mut a = stacks.pop().map_err(|k| lift(k, "bitwise"))?;
                    if a.len() != b.len() {
                        return Err(err(
                            ScriptErrorKind::Malformed,
                            "bitwise operands differ in length".to_string(),
                        ));
                    }
                    for (x, y) in a.iter_mut().zip(b.iter()) {
                        *x = match opcode {
                            OP_AND => *x & y,
                            OP_OR => *x | y,
                            _ => *x ^ y,
                        };
                    }
                    stacks.push(a).map_err(|k| lift(k, "bitwise"))?;
                }
                OP_EQUAL | OP_EQUALVERIFY => {
                    let b = stacks.pop().map_err(|k| lift(k, "EQUAL"))?;
                    let a = stacks.pop().map_err(|k| lift(k, "EQUAL"))?;
                    let equal = a == b;
                    if opcode == OP_EQUALVERIFY {
                        if !equal {
                            return Err(err(
                                ScriptErrorKind::VerifyFailed,
                                "OP_EQUALVERIFY failed".to_string(),
                            ));
                        }
                    } else {
                        stacks.push_bool(equal).map_err(|k| lift(k, "EQUAL"))?;
                    }
                }
                OP_LSHIFT | OP_RSHIFT => {
                    let n = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let a = stacks.pop().map_err(|k| lift(k, "shift"))?;
                    let bits = number::to_i64(&n).filter(|&s| s >= 0).ok_or_else(|| {
                        err(
                            ScriptErrorKind::Malformed,
                            "negative shift amount".to_string(),
                        )
                    })? as usize;
                    let shifted = if opcode == OP_LSHIFT {
                        shift_left(&a, bits)
                    } else {
                        shift_right(&a, bits)
                    };
                    stacks.push(shifted).map_err(|k| lift(k, "shift"))?;
                }

                // ── arithmetic ───────────────────────────────────────
                OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                    let a = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let r = match opcode {
                        OP_1ADD => a + 1,
                        OP_1SUB => a - 1,
                        OP_NEGATE => -a,
                        OP_ABS => {
                            if a.sign() == num_bigint::Sign::Minus {
                                -a
                            } else {
                                a
                            }
                        }
                        OP_NOT => BigInt::from(u8::from(a == BigInt::from(0))),
                        _ => BigInt::from(u8::from(a != BigInt::from(0))),
                    };
                    stacks
                        .push(number::encode(&r))
                        .map_err(|k| lift(k, "arith"))?;
                }
                OP_ADD | OP_SUB | OP_MUL | OP_DIV | OP_MOD | OP_BOOLAND | OP_BOOLOR
                | OP_NUMEQUAL | OP_NUMEQUALVERIFY | OP_NUMNOTEQUAL | OP_LESSTHAN
                | OP_GREATERTHAN | OP_LESSTHANOREQUAL | OP_GREATERTHANOREQUAL | OP_MIN
                | OP_MAX => {
                    let b = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let a = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let zero = BigInt::from(0);
                    if matches!(opcode, OP_DIV | OP_MOD) && b == zero {
                        return Err(err(
                            ScriptErrorKind::Malformed,
                            "division by zero".to_string(),
                        ));
                    }
                    let r: BigInt = match opcode {
                        OP_ADD => a + b,
                        OP_SUB => a - b,
                        OP_MUL => a * b,
                        // BigInt division truncates toward zero and the
                        // remainder takes the dividend's sign, matching
                        // script arithmetic
                        OP_DIV => a / b,
                        OP_MOD => a % b,
                        OP_BOOLAND => BigInt::from(u8::from(a != zero && b != zero)),
                        OP_BOOLOR => BigInt::from(u8::from(a != zero || b != zero)),
                        OP_NUMEQUAL | OP_NUMEQUALVERIFY => BigInt::from(u8::from(a == b)),
                        OP_NUMNOTEQUAL => BigInt::from(u8::from(a != b)),
                        OP_LESSTHAN => BigInt::from(u8::from(a < b)),
                        OP_GREATERTHAN => BigInt::from(u8::from(a > b)),
                        OP_LESSTHANOREQUAL => BigInt::from(u8::from(a <= b)),
                        OP_GREATERTHANOREQUAL => BigInt::from(u8::from(a >= b)),
                        OP_MIN => a.min(b),
                        _ => a.max(b),
                    };
                    if opcode == OP_NUMEQUALVERIFY {
                        if r == zero {
                            return Err(err(
                                ScriptErrorKind::VerifyFailed,
                                "OP_NUMEQUALVERIFY failed".to_string(),
                            ));
                        }
                    } else {
                        stacks
                            .push(number::encode(&r))
                            .map_err(|k| lift(k, "arith"))?;
                    }
                }
                OP_WITHIN => {
                    let max = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let min = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    let x = self.pop_number(stacks).map_err(|e| e.locate(at))?;
                    stacks
                        .push_bool(min <= x && x < max)
                        .map_err(|k| lift(k, "WITHIN"))?;
                }

                // ── crypto ───────────────────────────────────────────
                OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                    let data = stacks.pop().map_err(|k| lift(k, "hash"))?;
                    let digest = match opcode {
                        OP_RIPEMD160 => crypto::ripemd160(&data),
                        OP_SHA1 => crypto::sha1(&data),
                        OP_SHA256 => crypto::sha256(&data),
                        OP_HASH160 => crypto::hash160(&data),
                        _ => crypto::sha256d(&data),
                    };
                    stacks.push(digest).map_err(|k| lift(k, "hash"))?;
                }
                OP_CODESEPARATOR => {
                    last_code_sep = Some(pc);
                }
                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    let pubkey = stacks.pop().map_err(|k| lift(k, "CHECKSIG"))?;
                    let sig = stacks.pop().map_err(|k| lift(k, "CHECKSIG"))?;
                    let valid =
                        self.check_sig(&sig, &pubkey, ctx, locking, last_code_sep, at)?;
                    if opcode == OP_CHECKSIGVERIFY {
                        if !valid {
                            return Err(err(
                                ScriptErrorKind::VerifyFailed,
                                "OP_CHECKSIGVERIFY failed".to_string(),
                            ));
                        }
                    } else {
                        stacks.push_bool(valid).map_err(|k| lift(k, "CHECKSIG"))?;
                    }
                }
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    let valid = self.check_multisig(
                        stacks,
                        op_count,
                        ctx,
                        locking,
                        last_code_sep,
                        at,
                    )?;
                    if opcode == OP_CHECKMULTISIGVERIFY {
                        if !valid {
                            return Err(err(
                                ScriptErrorKind::VerifyFailed,
                                "OP_CHECKMULTISIGVERIFY failed".to_string(),
                            ));
                        }
                    } else {
                        stacks
                            .push_bool(valid)
                            .map_err(|k| lift(k, "CHECKMULTISIG"))?;
                    }
                }

                // ── lock time ────────────────────────────────────────
                OP_CHECKLOCKTIMEVERIFY => {
                    self.check_lock_time(stacks, ctx, at)?;
                }
                OP_CHECKSEQUENCEVERIFY => {
                    self.check_sequence(stacks, ctx, at)?;
                }

                other => {
                    return Err(err(
                        ScriptErrorKind::Malformed,
                        format!("invalid opcode 0x{other:02x}"),
                    ));
                }
            }
        }

        if !if_stack.is_empty() {
            return Err(ScriptError::new(
                ScriptErrorKind::ControlStackMismatch,
                Some(index_base + script.chunks.len().saturating_sub(1)),
                "unterminated conditional".to_string(),
            ));
        }
        Ok(())
    }

    /// Pop an arithmetic operand, honoring the configured width bound.
    fn pop_number(&self, stacks: &mut Stacks) -> Result<BigInt, UnlocatedError> {
        let raw = stacks.pop().map_err(|kind| UnlocatedError {
            kind,
            reason: "arithmetic operand".to_string(),
        })?;
        number::decode(&raw, self.limits.max_number_size).ok_or(UnlocatedError {
            kind: ScriptErrorKind::NumericOverflow,
            reason: format!(
                "operand of {} bytes exceeds the number size limit",
                raw.len()
            ),
        })
    }

    /// Verify one signature. `sig` carries the sighash scope in its final
    /// byte. Without a transaction context only the encoding is checked.
    fn check_sig(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        ctx: Option<&SpendContext<'_>>,
        locking: Option<&Script>,
        last_code_sep: Option<usize>,
        at: Option<usize>,
    ) -> ScriptResult<bool> {
        if sig.is_empty() {
            return Err(ScriptError::new(
                ScriptErrorKind::InvalidSignatureEncoding,
                at,
                "empty signature".to_string(),
            ));
        }
        let scope_byte = sig[sig.len() - 1];
        let der = &sig[..sig.len() - 1];
        let sighash_type = SighashType::from_byte(scope_byte).map_err(|e| ScriptError {
            opcode_index: at,
            ..e
        })?;

        let (ctx, locking) = match (ctx, locking) {
            (Some(c), Some(l)) => (c, l),
            // no transaction context: encoding checks only
            _ => return Ok(true),
        };

        let subscript = subscript_for_signing(locking, last_code_sep, sig);
        let preimage = sighash::preimage(
            ctx.tx,
            ctx.input_index,
            &subscript,
            ctx.source_satoshis,
            sighash_type,
        )
        .map_err(|e| {
            ScriptError::new(ScriptErrorKind::Malformed, at, e.to_string())
        })?;
        let digest = crypto::sha256d(&preimage);

        match crypto::verify_signature(&digest, der, pubkey) {
            Ok(valid) => Ok(valid),
            Err(crypto::SigningError::InvalidSignature(reason)) => Err(ScriptError::new(
                ScriptErrorKind::InvalidSignatureEncoding,
                at,
                reason,
            )),
            Err(e) => Err(ScriptError::new(
                ScriptErrorKind::Malformed,
                at,
                e.to_string(),
            )),
        }
    }

    /// Classic N-of-M check, extra pop included.
    fn check_multisig(
        &self,
        stacks: &mut Stacks,
        op_count: &mut usize,
        ctx: Option<&SpendContext<'_>>,
        locking: Option<&Script>,
        last_code_sep: Option<usize>,
        at: Option<usize>,
    ) -> ScriptResult<bool> {
        let lift = |kind: ScriptErrorKind, what: &str| {
            ScriptError::new(kind, at, what.to_string())
        };

        let n = self.pop_number(stacks).map_err(|e| e.locate(at))?;
        let key_count = number::to_i64(&n).filter(|&k| k >= 0).ok_or_else(|| {
            lift(ScriptErrorKind::Malformed, "invalid public key count")
        })? as usize;
        *op_count += key_count;
        if let Some(max) = self.limits.max_ops {
            if *op_count > max {
                return Err(lift(ScriptErrorKind::OpCountExceeded, "opcode budget exceeded"));
            }
        }

        let mut pubkeys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            pubkeys.push(stacks.pop().map_err(|k| lift(k, "CHECKMULTISIG keys"))?);
        }

        let m = self.pop_number(stacks).map_err(|e| e.locate(at))?;
        let sig_count = number::to_i64(&m)
            .filter(|&s| s >= 0 && s as usize <= key_count)
            .ok_or_else(|| lift(ScriptErrorKind::Malformed, "invalid signature count"))?
            as usize;

        let mut sigs = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            sigs.push(stacks.pop().map_err(|k| lift(k, "CHECKMULTISIG sigs"))?);
        }

        // one extra element is consumed, a consensus quirk every
        // validator has to preserve
        stacks.pop().map_err(|k| lift(k, "CHECKMULTISIG dummy"))?;

        // each signature must match a key; keys are consumed in order
        let mut key_idx = 0;
        let mut sig_idx = 0;
        while sig_idx < sigs.len() {
            if key_count - key_idx < sigs.len() - sig_idx {
                return Ok(false);
            }
            let valid = self.check_sig(
                &sigs[sig_idx],
                &pubkeys[key_idx],
                ctx,
                locking,
                last_code_sep,
                at,
            )?;
            if valid {
                sig_idx += 1;
            }
            key_idx += 1;
        }
        Ok(true)
    }

    /// The operand checks (width, sign) run unconditionally; comparing
    /// against the spending transaction's lock time needs a context.
    fn check_lock_time(
        &self,
        stacks: &mut Stacks,
        ctx: Option<&SpendContext<'_>>,
        at: Option<usize>,
    ) -> ScriptResult<()> {
        let fail = |reason: &str| {
            ScriptError::new(ScriptErrorKind::VerifyFailed, at, reason.to_string())
        };

        let raw = stacks
            .peek(0)
            .map_err(|k| ScriptError::new(k, at, "CHECKLOCKTIMEVERIFY".to_string()))?;
        let n = number::decode(raw, Some(LOCKTIME_NUMBER_SIZE)).ok_or_else(|| {
            ScriptError::new(
                ScriptErrorKind::NumericOverflow,
                at,
                "lock time operand too wide".to_string(),
            )
        })?;
        let lock_time = number::to_i64(&n).filter(|&t| t >= 0).ok_or_else(|| {
            fail("negative lock time")
        })?;

        let Some(ctx) = ctx else {
            return Ok(());
        };

        let tx_lock_time = ctx.tx.lock_time as i64;
        let same_kind = (lock_time < LOCKTIME_BLOCK_HEIGHT_THRESHOLD)
            == (tx_lock_time < LOCKTIME_BLOCK_HEIGHT_THRESHOLD);
        if !same_kind {
            return Err(fail("lock time kind mismatch"));
        }
        if lock_time > tx_lock_time {
            return Err(fail("lock time not yet reached"));
        }
        let sequence = ctx
            .tx
            .inputs
            .get(ctx.input_index)
            .map(|i| i.sequence)
            .unwrap_or(SEQUENCE_FINAL);
        if sequence == SEQUENCE_FINAL {
            return Err(fail("input sequence is final"));
        }
        Ok(())
    }

    /// Like `check_lock_time`: operand and disable-flag handling are
    /// context-free, the sequence comparison is not.
    fn check_sequence(
        &self,
        stacks: &mut Stacks,
        ctx: Option<&SpendContext<'_>>,
        at: Option<usize>,
    ) -> ScriptResult<()> {
        let fail = |reason: &str| {
            ScriptError::new(ScriptErrorKind::VerifyFailed, at, reason.to_string())
        };

        let raw = stacks
            .peek(0)
            .map_err(|k| ScriptError::new(k, at, "CHECKSEQUENCEVERIFY".to_string()))?;
        let n = number::decode(raw, Some(LOCKTIME_NUMBER_SIZE)).ok_or_else(|| {
            ScriptError::new(
                ScriptErrorKind::NumericOverflow,
                at,
                "sequence operand too wide".to_string(),
            )
        })?;
        let target = number::to_i64(&n).filter(|&t| t >= 0).ok_or_else(|| {
            fail("negative sequence")
        })?;

        if target & SEQUENCE_DISABLE_FLAG != 0 {
            return Ok(());
        }

        let Some(ctx) = ctx else {
            return Ok(());
        };

        if ctx.tx.version < 2 {
            return Err(fail("relative lock time requires version 2"));
        }
        let sequence = ctx
            .tx
            .inputs
            .get(ctx.input_index)
            .map(|i| i.sequence as i64)
            .unwrap_or(SEQUENCE_FINAL as i64);
        if sequence & SEQUENCE_DISABLE_FLAG != 0 {
            return Err(fail("relative lock time disabled on input"));
        }

        let mask = SEQUENCE_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK;
        let masked_target = target & mask;
        let masked_sequence = sequence & mask;
        let same_kind =
            (masked_target & SEQUENCE_TYPE_FLAG) == (masked_sequence & SEQUENCE_TYPE_FLAG);
        if !same_kind {
            return Err(fail("relative lock time kind mismatch"));
        }
        if (masked_target & SEQUENCE_LOCKTIME_MASK) > (masked_sequence & SEQUENCE_LOCKTIME_MASK) {
            return Err(fail("relative lock time not yet reached"));
        }
        Ok(())
    }
}

/// A kind+reason pair raised below the main loop, located once the
/// opcode index is known.
struct UnlocatedError {
    kind: ScriptErrorKind,
    reason: String,
}

impl UnlocatedError {
    fn locate(self, at: Option<usize>) -> ScriptError {
        ScriptError::new(self.kind, at, self.reason)
    }
}

/// Locking-script tail from the most recent executed OP_CODESEPARATOR,
/// with every push of the exact signature bytes removed.
fn subscript_for_signing(locking: &Script, last_code_sep: Option<usize>, sig: &[u8]) -> Script {
    let start = last_code_sep.map(|i| i + 1).unwrap_or(0);
    let chunks: Vec<ScriptChunk> = locking.chunks[start.min(locking.chunks.len())..]
        .iter()
        .filter(|c| c.data.as_deref() != Some(sig))
        .cloned()
        .collect();
    Script::from_chunks(chunks)
}

/// BSV byte-string left shift: fixed width, bits falling off the front.
fn shift_left(bytes: &[u8], bits: usize) -> Vec<u8> {
    let len = bytes.len();
    let mut out = vec![0u8; len];
    let byte_shift = bits / 8;
    let bit_shift = (bits % 8) as u32;
    for i in 0..len {
        let src = i + byte_shift;
        let mut v = 0u16;
        if src < len {
            v = (bytes[src] as u16) << bit_shift;
        }
        if bit_shift > 0 && src + 1 < len {
            v |= (bytes[src + 1] as u16) >> (8 - bit_shift);
        }
        out[i] = (v & 0xff) as u8;
    }
    out
}

/// BSV byte-string right shift: fixed width, bits falling off the end.
fn shift_right(bytes: &[u8], bits: usize) -> Vec<u8> {
    let len = bytes.len();
    let mut out = vec![0u8; len];
    let byte_shift = bits / 8;
    let bit_shift = (bits % 8) as u32;
    for i in 0..len {
        if i < byte_shift {
            continue;
        }
        let src = i - byte_shift;
        let mut v = (bytes[src] as u16) >> bit_shift;
        if bit_shift > 0 && src > 0 {
            v |= (bytes[src - 1] as u16) << (8 - bit_shift);
        }
        out[i] = (v & 0xff) as u8;
    }
    out
}
