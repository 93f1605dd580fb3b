//! Textual rendering of a [`Module`].
//!
//! The format is LLVM-flavoured and meant for humans: tracing output when
//! `TSN_DEBUG_LIR` is set, and snapshot-style assertions in tests.

use std::fmt::Write;

use crate::{
    Const, ConstInit, Function, FunctionBody, Global, Inst, LirType, Module, Terminator, TyId,
    ValueId,
};

/// Render the whole module.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; module {}", module.name);
    for i in 0..module.types.len() {
        let id = TyId::from_raw(u32::try_from(i).unwrap_or(u32::MAX));
        if let LirType::Struct {
            name: Some(name),
            fields,
        } = module.types.get(id)
        {
            match fields {
                Some(fields) => {
                    let inner: Vec<String> =
                        fields.iter().map(|&f| module.types.display(f)).collect();
                    let _ = writeln!(out, "%\"{name}\" = type {{ {} }}", inner.join(", "));
                }
                None => {
                    let _ = writeln!(out, "%\"{name}\" = type opaque");
                }
            }
        }
    }
    for (_, global) in module.globals() {
        print_global(&mut out, module, global);
    }
    for (_, func) in module.functions() {
        out.push('\n');
        print_function(&mut out, module, func);
    }
    out
}

fn print_global(out: &mut String, module: &Module, global: &Global) {
    let kind = if global.readonly { "constant" } else { "global" };
    let ty = module.types.display(global.ty);
    match &global.init {
        None => {
            let _ = writeln!(out, "@\"{}\" = external {kind} {ty}", global.name);
        }
        Some(init) => {
            let _ = writeln!(
                out,
                "@\"{}\" = {kind} {ty} {}",
                global.name,
                init_text(module, init)
            );
        }
    }
}

fn init_text(module: &Module, init: &ConstInit) -> String {
    match init {
        ConstInit::Zero => "zeroinitializer".to_owned(),
        ConstInit::Scalar(c) => const_text(module, c),
        ConstInit::Aggregate(items) => {
            let inner: Vec<String> = items.iter().map(|i| init_text(module, i)).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

fn const_text(module: &Module, c: &Const) -> String {
    match c {
        Const::Int { ty, value } => format!("{} {value}", module.types.display(*ty)),
        Const::Float(v) => format!("f64 {v:?}"),
        Const::Bool(v) => format!("i1 {v}"),
        Const::Null => "null".to_owned(),
        Const::Str(s) => format!("{s:?}"),
        Const::Func(f) => format!(
            "@\"{}\"",
            module.function(*f).map_or("?", |f| f.name.as_str())
        ),
        Const::Global(g) => format!(
            "@\"{}\"",
            module.global(*g).map_or("?", |g| g.name.as_str())
        ),
    }
}

fn print_function(out: &mut String, module: &Module, func: &Function) {
    let params: Vec<String> = func
        .params
        .iter()
        .enumerate()
        .map(|(i, &p)| format!("{} %arg{i}", module.types.display(p)))
        .collect();
    let ret = module.types.display(func.ret);
    let Some(body) = &func.body else {
        let _ = writeln!(out, "declare {ret} @\"{}\"({})", func.name, params.join(", "));
        return;
    };
    let _ = writeln!(out, "define {ret} @\"{}\"({}) {{", func.name, params.join(", "));
    for (i, block) in body.blocks.iter().enumerate() {
        let _ = writeln!(out, "{}.{i}:", block.name);
        for inst in &block.insts {
            let _ = writeln!(out, "  {}", inst_text(module, body, inst));
        }
        match &block.term {
            Some(term) => {
                let _ = writeln!(out, "  {}", term_text(body, term));
            }
            None => {
                let _ = writeln!(out, "  ; <unterminated>");
            }
        }
    }
    out.push_str("}\n");
}

fn v(body: &FunctionBody, id: ValueId) -> String {
    match body.value_names.get(id.index()) {
        Some(name) if !name.is_empty() => format!("%{name}.{}", id.raw()),
        _ => format!("%{}", id.raw()),
    }
}

fn args_text(body: &FunctionBody, args: &[ValueId]) -> String {
    args.iter().map(|&a| v(body, a)).collect::<Vec<_>>().join(", ")
}

fn inst_text(module: &Module, body: &FunctionBody, inst: &Inst) -> String {
    let t = |ty: TyId| module.types.display(ty);
    match inst {
        Inst::Const { dst, value } => format!("{} = {}", v(body, *dst), const_text(module, value)),
        Inst::Alloc { dst, ty } => format!("{} = alloc {}", v(body, *dst), t(*ty)),
        Inst::Load { dst, ty, ptr } => {
            format!("{} = load {}, {}", v(body, *dst), t(*ty), v(body, *ptr))
        }
        Inst::Store { value, ptr } => format!("store {}, {}", v(body, *value), v(body, *ptr)),
        Inst::StructGep {
            dst,
            ty,
            ptr,
            index,
        } => format!(
            "{} = struct_gep {}, {}, {index}",
            v(body, *dst),
            t(*ty),
            v(body, *ptr)
        ),
        Inst::IndexGep {
            dst,
            elem,
            ptr,
            index,
        } => format!(
            "{} = index_gep {}, {}, {}",
            v(body, *dst),
            t(*elem),
            v(body, *ptr),
            v(body, *index)
        ),
        Inst::Call { dst, func, args } => {
            let name = module.function(*func).map_or("?", |f| f.name.as_str());
            let call = format!("call @\"{name}\"({})", args_text(body, args));
            match dst {
                Some(d) => format!("{} = {call}", v(body, *d)),
                None => call,
            }
        }
        Inst::CallIndirect {
            dst,
            sig,
            callee,
            args,
        } => {
            let call = format!(
                "call_indirect {} {}({})",
                t(*sig),
                v(body, *callee),
                args_text(body, args)
            );
            match dst {
                Some(d) => format!("{} = {call}", v(body, *d)),
                None => call,
            }
        }
        Inst::BitCast { dst, value, ty } => {
            format!("{} = bitcast {} to {}", v(body, *dst), v(body, *value), t(*ty))
        }
        Inst::Binary { dst, op, lhs, rhs } => format!(
            "{} = {} {}, {}",
            v(body, *dst),
            op.mnemonic(),
            v(body, *lhs),
            v(body, *rhs)
        ),
        Inst::Cmp {
            dst,
            pred,
            lhs,
            rhs,
        } => format!(
            "{} = cmp {} {}, {}",
            v(body, *dst),
            pred.mnemonic(),
            v(body, *lhs),
            v(body, *rhs)
        ),
        Inst::Not { dst, value } => format!("{} = not {}", v(body, *dst), v(body, *value)),
        Inst::FNeg { dst, value } => format!("{} = fneg {}", v(body, *dst), v(body, *value)),
    }
}

fn term_text(body: &FunctionBody, term: &Terminator) -> String {
    let label = |b: crate::BlockId| {
        body.blocks
            .get(b.index())
            .map_or_else(|| format!("{}", b.raw()), |blk| format!("{}.{}", blk.name, b.raw()))
    };
    match term {
        Terminator::Ret(None) => "ret void".to_owned(),
        Terminator::Ret(Some(val)) => format!("ret {}", v(body, *val)),
        Terminator::Br(b) => format!("br {}", label(*b)),
        Terminator::CondBr {
            cond,
            then_block,
            else_block,
        } => format!(
            "br {}, {}, {}",
            v(body, *cond),
            label(*then_block),
            label(*else_block)
        ),
        Terminator::Switch {
            value,
            default,
            cases,
        } => {
            let arms: Vec<String> = cases
                .iter()
                .map(|(c, b)| format!("{c} => {}", label(*b)))
                .collect();
            format!(
                "switch {}, default {} [{}]",
                v(body, *value),
                label(*default),
                arms.join(", ")
            )
        }
        Terminator::Unreachable => "unreachable".to_owned(),
    }
}
