//! ID-based instruction builder.
//!
//! `FunctionBuilder` assembles the body of one function. Callers only see
//! `Copy` ids; every emitted value has a recorded type and a debug name.
//!
//! # Method Organization
//!
//! | Category | Methods |
//! |----------|---------|
//! | Constants | `const_f64`, `const_bool`, `const_i8`, `const_i32`, `const_null`, `const_str`, `const_fn`, `const_global` |
//! | Memory | `alloc`, `load`, `store`, `struct_gep`, `index_gep` |
//! | Arithmetic | `binary`, `fneg`, `not` |
//! | Comparisons | `cmp` |
//! | Conversions | `bitcast` |
//! | Control flow | `br`, `cond_br`, `switch`, `ret`, `unreachable` |
//! | Calls | `call`, `call_indirect` |
//! | Blocks | `append_block`, `position_at_end`, `current_block`, `save_position`, `restore_position` |
//!
//! Emitting into a block that already has a terminator starts a fresh,
//! unreachable block instead, so code after a `return` is well-formed.

use crate::{
    BinOp, Block, BlockId, CmpPred, Const, FuncId, FunctionBody, GlobalId, Inst, Terminator,
    TyId, ValueId,
};

/// Saved insertion point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position(Option<BlockId>);

pub struct FunctionBuilder {
    func: FuncId,
    blocks: Vec<Block>,
    value_types: Vec<TyId>,
    value_names: Vec<String>,
    current: Option<BlockId>,
}

impl FunctionBuilder {
    /// Start a body for `func`. Parameters become values `0..params.len()`
    /// and the builder is positioned at the end of the entry block.
    pub fn new(func: FuncId, params: &[TyId]) -> Self {
        let mut b = FunctionBuilder {
            func,
            blocks: Vec::new(),
            value_types: Vec::new(),
            value_names: Vec::new(),
            current: None,
        };
        for (i, &ty) in params.iter().enumerate() {
            b.new_value(ty, &format!("arg{i}"));
        }
        let entry = b.append_block("entry");
        b.position_at_end(entry);
        b
    }

    pub fn func(&self) -> FuncId {
        self.func
    }

    /// Parameter `i` of the function.
    pub fn param(&self, i: u32) -> ValueId {
        ValueId::from_raw(i)
    }

    pub fn value_type(&self, v: ValueId) -> TyId {
        self.value_types.get(v.index()).copied().unwrap_or(TyId::VOID)
    }

    pub fn value_name(&self, v: ValueId) -> &str {
        self.value_names.get(v.index()).map_or("", String::as_str)
    }

    fn new_value(&mut self, ty: TyId, name: &str) -> ValueId {
        let id = ValueId::from_len(self.value_types.len());
        self.value_types.push(ty);
        self.value_names.push(name.to_owned());
        id
    }

    pub fn finish(self) -> FunctionBody {
        let value_count = u32::try_from(self.value_types.len()).unwrap_or(u32::MAX);
        FunctionBody {
            blocks: self.blocks,
            value_count,
            value_types: self.value_types,
            value_names: self.value_names,
        }
    }

    // ── Blocks ──────────────────────────────────────────────────────

    pub fn append_block(&mut self, name: &str) -> BlockId {
        let id = BlockId::from_len(self.blocks.len());
        self.blocks.push(Block {
            name: name.to_owned(),
            insts: Vec::new(),
            term: None,
        });
        id
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    pub fn save_position(&self) -> Position {
        Position(self.current)
    }

    pub fn restore_position(&mut self, pos: Position) {
        self.current = pos.0;
    }

    /// Whether the current block already has a terminator.
    pub fn is_terminated(&self) -> bool {
        self.current
            .and_then(|b| self.blocks.get(b.index()))
            .is_some_and(|b| b.term.is_some())
    }

    /// The block to append to, opening a dead block if the current one is closed.
    fn open_block(&mut self) -> usize {
        if self.current.is_none() || self.is_terminated() {
            let dead = self.append_block("dead");
            self.current = Some(dead);
        }
        self.current.map_or(0, BlockId::index)
    }

    fn emit(&mut self, inst: Inst) {
        let b = self.open_block();
        self.blocks[b].insts.push(inst);
    }

    fn terminate(&mut self, term: Terminator) {
        let b = self.open_block();
        self.blocks[b].term = Some(term);
    }

    // ── Constants ───────────────────────────────────────────────────

    pub fn const_value(&mut self, value: Const, name: &str) -> ValueId {
        let dst = self.new_value(value.ty(), name);
        self.emit(Inst::Const { dst, value });
        dst
    }

    pub fn const_f64(&mut self, value: f64) -> ValueId {
        self.const_value(Const::Float(value), "num")
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.const_value(Const::Bool(value), "bool")
    }

    pub fn const_i8(&mut self, value: i8) -> ValueId {
        self.const_value(
            Const::Int {
                ty: TyId::I8,
                value: i64::from(value),
            },
            "i8",
        )
    }

    pub fn const_i32(&mut self, value: i32) -> ValueId {
        self.const_value(
            Const::Int {
                ty: TyId::I32,
                value: i64::from(value),
            },
            "i32",
        )
    }

    pub fn const_null(&mut self) -> ValueId {
        self.const_value(Const::Null, "null")
    }

    pub fn const_str(&mut self, value: &str) -> ValueId {
        self.const_value(Const::Str(value.to_owned()), "str")
    }

    pub fn const_fn(&mut self, func: FuncId) -> ValueId {
        self.const_value(Const::Func(func), "fnaddr")
    }

    pub fn const_global(&mut self, global: GlobalId) -> ValueId {
        self.const_value(Const::Global(global), "gaddr")
    }

    // ── Memory ──────────────────────────────────────────────────────

    /// Zero-initialized allocation of `ty`; yields a pointer.
    pub fn alloc(&mut self, ty: TyId, name: &str) -> ValueId {
        let dst = self.new_value(TyId::PTR, name);
        self.emit(Inst::Alloc { dst, ty });
        dst
    }

    pub fn load(&mut self, ty: TyId, ptr: ValueId, name: &str) -> ValueId {
        let dst = self.new_value(ty, name);
        self.emit(Inst::Load { dst, ty, ptr });
        dst
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) {
        self.emit(Inst::Store { value, ptr });
    }

    pub fn struct_gep(&mut self, ty: TyId, ptr: ValueId, index: u32, name: &str) -> ValueId {
        let dst = self.new_value(TyId::PTR, name);
        self.emit(Inst::StructGep {
            dst,
            ty,
            ptr,
            index,
        });
        dst
    }

    pub fn index_gep(&mut self, elem: TyId, ptr: ValueId, index: ValueId, name: &str) -> ValueId {
        let dst = self.new_value(TyId::PTR, name);
        self.emit(Inst::IndexGep {
            dst,
            elem,
            ptr,
            index,
        });
        dst
    }

    // ── Arithmetic & comparisons ────────────────────────────────────

    pub fn binary(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let ty = match op {
            BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => TyId::F64,
            BinOp::Concat => TyId::STR,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::And | BinOp::Or => {
                self.value_type(lhs)
            }
        };
        let dst = self.new_value(ty, name);
        self.emit(Inst::Binary { dst, op, lhs, rhs });
        dst
    }

    pub fn fneg(&mut self, value: ValueId, name: &str) -> ValueId {
        let dst = self.new_value(TyId::F64, name);
        self.emit(Inst::FNeg { dst, value });
        dst
    }

    pub fn not(&mut self, value: ValueId, name: &str) -> ValueId {
        let dst = self.new_value(TyId::I1, name);
        self.emit(Inst::Not { dst, value });
        dst
    }

    pub fn cmp(&mut self, pred: CmpPred, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let dst = self.new_value(TyId::I1, name);
        self.emit(Inst::Cmp {
            dst,
            pred,
            lhs,
            rhs,
        });
        dst
    }

    // ── Conversions ─────────────────────────────────────────────────

    /// Reinterpret `value` as `ty` without changing its bits.
    pub fn bitcast(&mut self, value: ValueId, ty: TyId, name: &str) -> ValueId {
        let dst = self.new_value(ty, name);
        self.emit(Inst::BitCast { dst, value, ty });
        dst
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// Direct call; returns `None` when `ret` is `void`.
    pub fn call(&mut self, func: FuncId, ret: TyId, args: &[ValueId], name: &str) -> Option<ValueId> {
        let dst = (ret != TyId::VOID).then(|| self.new_value(ret, name));
        self.emit(Inst::Call {
            dst,
            func,
            args: args.to_vec(),
        });
        dst
    }

    /// Call through a function pointer of signature `sig`.
    pub fn call_indirect(
        &mut self,
        sig: TyId,
        ret: TyId,
        callee: ValueId,
        args: &[ValueId],
        name: &str,
    ) -> Option<ValueId> {
        let dst = (ret != TyId::VOID).then(|| self.new_value(ret, name));
        self.emit(Inst::CallIndirect {
            dst,
            sig,
            callee,
            args: args.to_vec(),
        });
        dst
    }

    // ── Control flow ────────────────────────────────────────────────

    pub fn br(&mut self, dest: BlockId) {
        self.terminate(Terminator::Br(dest));
    }

    pub fn cond_br(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn switch(&mut self, value: ValueId, default: BlockId, cases: &[(i64, BlockId)]) {
        self.terminate(Terminator::Switch {
            value,
            default,
            cases: cases.to_vec(),
        });
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
