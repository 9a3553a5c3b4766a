//! Runtime Code-Generation Environment
//!
//! Assembles specialized draw routines from composable fragments: blocks of
//! operations, scopes with save/restore of mutated state, conditionals, and
//! named procedures. `compile()` freezes the whole tree plus a deduplicating
//! constant pool into a set of invokable routines closed over the linked
//! constants.
//!
//! # Builder model
//!
//! Blocks, scopes and conditionals live in contiguous arenas inside the
//! environment and are addressed through lightweight `Copy` ids — the same
//! storage discipline the renderer uses for pipelines. The environment is
//! consumed by `compile()`; constants linked into one pass are meaningless in
//! any other.
//!
//! ```
//! use wisp::codegen::{CodeGenEnvironment, Expr, Place};
//! use wisp::value::Value;
//!
//! let mut env = CodeGenEnvironment::new();
//! let state = env.link(Value::object());
//! let draw = env.proc("draw", 1);
//! env.set(draw, Place::Const(state), "mode", Expr::arg(0));
//! let procs = env.compile();
//! procs.call("draw", &[Value::Int(4)]);
//! ```
//!
//! # Save/restore contract
//!
//! Within one scope, a tracked (place, property) is snapshotted at the point
//! of the first `save`/`set` and restored exactly once on exit, however many
//! entry-time writes follow — the last write wins during the body, the
//! pre-entry value wins after exit.

mod ops;

use std::cell::RefCell;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::value::Value;

pub use ops::{BlockId, CellSlot, CondId, ConstId, Expr, Op, Place, ScopeId};

use ops::{BlockData, CondData, Exec, Flow, ProcData, Program, ScopeData, render_unit};

// ─── Constant Pool ───────────────────────────────────────────────────────────

/// Deduplicating table of externally owned values injected into generated
/// code. Names (`g{n}`) are assigned sequentially on first reference and
/// reused on identity match.
#[derive(Default)]
struct ConstantPool {
    values: Vec<Value>,
}

impl ConstantPool {
    fn link(&mut self, value: Value) -> ConstId {
        for (i, existing) in self.values.iter().enumerate() {
            if existing.identity_eq(&value) {
                return ConstId(i as u32);
            }
        }
        let id = ConstId(self.values.len() as u32);
        self.values.push(value);
        id
    }
}

// ─── Environment ─────────────────────────────────────────────────────────────

/// Builder for one compile pass.
pub struct CodeGenEnvironment {
    pool: ConstantPool,
    blocks: Vec<BlockData>,
    scopes: Vec<ScopeData>,
    conds: Vec<CondData>,
    procs: Vec<(String, ProcData)>,
    cell_count: u32,
    global: BlockId,
}

impl CodeGenEnvironment {
    /// Creates an empty environment with a fresh global block.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: ConstantPool::default(),
            blocks: vec![BlockData::new()],
            scopes: Vec::new(),
            conds: Vec::new(),
            procs: Vec::new(),
            cell_count: 0,
            global: BlockId(0),
        }
    }

    /// Links a value into the pass, returning its stable name.
    ///
    /// Identity-deduplicated: linking the same value twice returns the same
    /// id; two distinct values get two distinct ids.
    pub fn link(&mut self, value: Value) -> ConstId {
        self.pool.link(value)
    }

    /// The global block, executed once when the pass is compiled.
    ///
    /// Cells defined here act as unit-level shared state visible to every
    /// procedure of the pass.
    #[must_use]
    pub fn global(&self) -> BlockId {
        self.global
    }

    /// Creates a detached block. Blocks only execute once pushed into a
    /// scope, a procedure body or the global block.
    pub fn block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData::new());
        id
    }

    /// Appends an operation to a block.
    pub fn push(&mut self, block: BlockId, op: Op) {
        self.blocks[block.0 as usize].ops.push(op);
    }

    /// Appends an expression statement to a block.
    pub fn stmt(&mut self, block: BlockId, expr: Expr) {
        self.push(block, Op::Eval(expr));
    }

    /// Defines a cell initialized at the current position of `block`.
    pub fn def(&mut self, block: BlockId, init: Expr) -> CellSlot {
        let cell = self.fresh_cell(block);
        self.push(
            block,
            Op::Define {
                cell,
                init: Some(init),
            },
        );
        cell
    }

    /// Declares an uninitialized cell in `block`, to be assigned later.
    pub fn declare(&mut self, block: BlockId) -> CellSlot {
        let cell = self.fresh_cell(block);
        self.push(block, Op::Define { cell, init: None });
        cell
    }

    fn fresh_cell(&mut self, block: BlockId) -> CellSlot {
        let cell = CellSlot(self.cell_count);
        self.cell_count += 1;
        self.blocks[block.0 as usize].declared.push(cell);
        cell
    }

    /// Creates a detached scope: an entry/exit block pair.
    pub fn scope(&mut self) -> ScopeId {
        let entry = self.block();
        let exit = self.block();
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            entry,
            exit,
            saved: FxHashSet::default(),
        });
        id
    }

    /// The entry block of a scope.
    #[must_use]
    pub fn entry(&self, scope: ScopeId) -> BlockId {
        self.scopes[scope.0 as usize].entry
    }

    /// The exit block of a scope.
    #[must_use]
    pub fn exit(&self, scope: ScopeId) -> BlockId {
        self.scopes[scope.0 as usize].exit
    }

    /// Snapshots `object.prop` at the current entry position and restores it
    /// on scope exit. Deduplicated per (place, property) per scope — repeated
    /// calls record the pre-entry value exactly once.
    pub fn save(&mut self, scope: ScopeId, object: Place, prop: &str) {
        let inserted = self.scopes[scope.0 as usize]
            .saved
            .insert((object, prop.to_owned()));
        if !inserted {
            return;
        }
        let (entry, exit) = {
            let data = &self.scopes[scope.0 as usize];
            (data.entry, data.exit)
        };
        let cell = self.def(entry, Expr::get(Expr::Place(object), prop));
        self.push(
            exit,
            Op::Store {
                object,
                prop: prop.to_owned(),
                value: Expr::Place(Place::Cell(cell)),
            },
        );
    }

    /// `save` plus an entry-time assignment of `value` to `object.prop`.
    pub fn set(&mut self, scope: ScopeId, object: Place, prop: &str, value: Expr) {
        self.save(scope, object, prop);
        let entry = self.entry(scope);
        self.push(
            entry,
            Op::Store {
                object,
                prop: prop.to_owned(),
                value,
            },
        );
    }

    /// Creates a detached conditional with empty then/else scopes.
    pub fn cond(&mut self, pred: Expr) -> CondId {
        let then_scope = self.scope();
        let else_scope = self.scope();
        let id = CondId(self.conds.len() as u32);
        self.conds.push(CondData {
            pred,
            then_scope,
            else_scope,
        });
        id
    }

    /// The scope run when the predicate is truthy.
    #[must_use]
    pub fn then_scope(&self, cond: CondId) -> ScopeId {
        self.conds[cond.0 as usize].then_scope
    }

    /// The scope run when the predicate is falsy.
    #[must_use]
    pub fn else_scope(&self, cond: CondId) -> ScopeId {
        self.conds[cond.0 as usize].else_scope
    }

    /// Registers a named procedure with a fixed positional arity and returns
    /// its body scope. Arguments are read with [`Expr::arg`]. Registering a
    /// name twice keeps the later body.
    pub fn proc(&mut self, name: &str, arity: u32) -> ScopeId {
        let body = self.scope();
        self.procs.push((name.to_owned(), ProcData { body, arity }));
        body
    }

    /// Freezes the pass: runs the global block once against the shared cell
    /// table and returns the named, invokable procedures closed over the
    /// linked constants.
    #[must_use]
    pub fn compile(self) -> CompiledProcedures {
        let CodeGenEnvironment {
            pool,
            blocks,
            scopes,
            conds,
            procs,
            cell_count,
            global,
        } = self;

        let program = Program {
            consts: pool.values,
            blocks,
            scopes,
            conds,
        };

        if log::log_enabled!(log::Level::Trace) {
            log::trace!("compile unit:\n{}", render_unit(&program, global, &procs));
        }
        log::debug!(
            "compiled {} procedure(s) over {} linked constant(s)",
            procs.len(),
            program.consts.len()
        );

        let cells = RefCell::new(vec![Value::Null; cell_count as usize]);
        {
            let exec = Exec {
                program: &program,
                cells: &cells,
                args: &[],
            };
            exec.run_block(global);
        }

        let procs: FxHashMap<String, ProcData> = procs.into_iter().collect();
        CompiledProcedures {
            program,
            cells,
            procs,
        }
    }
}

impl Default for CodeGenEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Compiled procedures ─────────────────────────────────────────────────────

/// The output of one compile pass: every registered procedure, keyed by name,
/// sharing the pass's constants and cell table.
pub struct CompiledProcedures {
    program: Program,
    cells: RefCell<Vec<Value>>,
    procs: FxHashMap<String, ProcData>,
}

impl CompiledProcedures {
    /// Invokes a procedure with its declared arity.
    ///
    /// # Panics
    ///
    /// Panics if `name` was never registered or `args` does not match the
    /// declared arity — both caller programming errors, not runtime-checked
    /// conditions.
    pub fn call(&self, name: &str, args: &[Value]) -> Value {
        let proc = self
            .procs
            .get(name)
            .unwrap_or_else(|| panic!("unknown procedure {name:?}"));
        assert_eq!(
            args.len(),
            proc.arity as usize,
            "procedure {name:?} expects {} argument(s)",
            proc.arity
        );
        let exec = Exec {
            program: &self.program,
            cells: &self.cells,
            args,
        };
        match exec.run_scope(proc.body) {
            Flow::Return(v) => v,
            Flow::Normal => Value::Null,
        }
    }

    /// Whether a procedure with this name was registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.procs.contains_key(name)
    }

    /// Names of every registered procedure, in arbitrary order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.procs.keys().map(String::as_str)
    }
}
