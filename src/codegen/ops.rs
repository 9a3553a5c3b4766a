//! Operation / Expression Tree
//!
//! The compile target of the code-generation environment. Where the system
//! this descends from synthesized source text and constructed live routines
//! from it, this crate freezes the builder's blocks into an operation tree
//! and walks it per call — the per-call branching is still hoisted into the
//! one-time compile step, because every decision made while *building* the
//! tree is gone by the time it executes.

use std::cell::RefCell;
use std::fmt;
use std::fmt::Write as _;

use rustc_hash::FxHashSet;

use crate::dynamic::PathAccessor;
use crate::value::Value;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// A linked constant. Displays as its stable generated name (`g0`, `g1`, …),
/// valid only within the compile pass that assigned it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ConstId(pub(crate) u32);

/// A cell in the compile unit's shared cell table (`v0`, `v1`, …): the
/// function-scoped locals of the synthesized unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CellSlot(pub(crate) u32);

/// Handle to a [`Block`](super::CodeGenEnvironment::block) in the builder.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BlockId(pub(crate) u32);

/// Handle to a scope (entry/exit block pair).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ScopeId(pub(crate) u32);

/// Handle to a conditional (predicate + then/else scopes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CondId(pub(crate) u32);

impl fmt::Display for ConstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl fmt::Display for CellSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A directly addressable storage location: a linked constant, a positional
/// argument of the current invocation, or a shared cell.
///
/// Places are the legal receivers of scope save/restore tracking — they are
/// cheap `Copy` keys, so a scope can deduplicate snapshots per
/// (place, property) pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Place {
    Const(ConstId),
    Arg(u32),
    Cell(CellSlot),
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Const(id) => write!(f, "{id}"),
            Place::Arg(i) => write!(f, "a{i}"),
            Place::Cell(slot) => write!(f, "{slot}"),
        }
    }
}

// ─── Expressions ─────────────────────────────────────────────────────────────

/// An expression fragment pushed into blocks by the builder.
#[derive(Clone)]
pub enum Expr {
    /// An immediate value embedded at build time.
    Lit(Value),
    /// Read of a constant, argument or cell.
    Place(Place),
    /// Single property read, `base.prop` (missing → `Null`).
    GetProp(Box<Expr>, String),
    /// Resolved dynamic-path lookup, `base["a"]["b"]…` (missing → `Null`).
    Path(Box<Expr>, PathAccessor),
    /// Call through a native callable value.
    Call(Box<Expr>, Vec<Expr>),
}

impl Expr {
    /// Positional argument `a{index}` of the enclosing procedure.
    #[must_use]
    pub fn arg(index: u32) -> Self {
        Expr::Place(Place::Arg(index))
    }

    /// Property read on another expression.
    #[must_use]
    pub fn get(base: Expr, prop: &str) -> Self {
        Expr::GetProp(Box::new(base), prop.to_owned())
    }

    /// Call expression.
    #[must_use]
    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call(Box::new(callee), args)
    }
}

impl From<Place> for Expr {
    fn from(place: Place) -> Self {
        Expr::Place(place)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Lit(value)
    }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// One statement inside a block.
pub enum Op {
    /// Evaluate for side effects, discard the result.
    Eval(Expr),
    /// Define a cell, optionally initializing it at this position.
    Define { cell: CellSlot, init: Option<Expr> },
    /// `object.prop = value`.
    Store {
        object: Place,
        prop: String,
        value: Expr,
    },
    /// Run a nested scope (entry, then exit) at this position.
    Enter(ScopeId),
    /// Run a conditional at this position.
    Branch(CondId),
    /// Return a value from the enclosing procedure, skipping everything
    /// after it — including pending exit blocks, exactly as a `return`
    /// inside a synthesized function body would.
    Return(Expr),
}

// ─── Frozen program ──────────────────────────────────────────────────────────

pub(crate) struct BlockData {
    pub ops: Vec<Op>,
    /// Cells declared by this block, for unit rendering.
    pub declared: Vec<CellSlot>,
}

impl BlockData {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            declared: Vec::new(),
        }
    }
}

pub(crate) struct ScopeData {
    pub entry: BlockId,
    pub exit: BlockId,
    /// (place, property) pairs already snapshotted in this scope.
    pub saved: FxHashSet<(Place, String)>,
}

pub(crate) struct CondData {
    pub pred: Expr,
    pub then_scope: ScopeId,
    pub else_scope: ScopeId,
}

#[derive(Clone, Copy)]
pub(crate) struct ProcData {
    pub body: ScopeId,
    pub arity: u32,
}

/// The arenas of one compile pass, frozen at `compile()` time.
pub(crate) struct Program {
    pub consts: Vec<Value>,
    pub blocks: Vec<BlockData>,
    pub scopes: Vec<ScopeData>,
    pub conds: Vec<CondData>,
}

// ─── Interpreter ─────────────────────────────────────────────────────────────

pub(crate) enum Flow {
    Normal,
    Return(Value),
}

/// One invocation's view of the program: the frozen arenas, the shared cell
/// table and the positional arguments.
pub(crate) struct Exec<'a> {
    pub program: &'a Program,
    pub cells: &'a RefCell<Vec<Value>>,
    pub args: &'a [Value],
}

impl Exec<'_> {
    pub fn run_block(&self, id: BlockId) -> Flow {
        for op in &self.program.blocks[id.0 as usize].ops {
            match op {
                Op::Eval(expr) => {
                    self.eval(expr);
                }
                Op::Define { cell, init } => {
                    let v = init.as_ref().map_or(Value::Null, |e| self.eval(e));
                    self.cells.borrow_mut()[cell.0 as usize] = v;
                }
                Op::Store {
                    object,
                    prop,
                    value,
                } => {
                    let v = self.eval(value);
                    self.read_place(*object).set_key(prop, v);
                }
                Op::Enter(scope) => {
                    if let Flow::Return(v) = self.run_scope(*scope) {
                        return Flow::Return(v);
                    }
                }
                Op::Branch(cond) => {
                    let data = &self.program.conds[cond.0 as usize];
                    let taken = if self.eval(&data.pred).is_truthy() {
                        data.then_scope
                    } else {
                        data.else_scope
                    };
                    if let Flow::Return(v) = self.run_scope(taken) {
                        return Flow::Return(v);
                    }
                }
                Op::Return(expr) => return Flow::Return(self.eval(expr)),
            }
        }
        Flow::Normal
    }

    /// Entry block, then exit block. Nested scopes therefore serialize as
    /// outer-entry, inner-entry, inner-exit, outer-exit.
    pub fn run_scope(&self, id: ScopeId) -> Flow {
        let scope = &self.program.scopes[id.0 as usize];
        match self.run_block(scope.entry) {
            Flow::Return(v) => Flow::Return(v),
            Flow::Normal => self.run_block(scope.exit),
        }
    }

    fn read_place(&self, place: Place) -> Value {
        match place {
            Place::Const(id) => self.program.consts[id.0 as usize].clone(),
            Place::Arg(i) => self.args[i as usize].clone(),
            Place::Cell(slot) => self.cells.borrow()[slot.0 as usize].clone(),
        }
    }

    /// Evaluates an expression.
    ///
    /// # Panics
    ///
    /// Panics on calls through non-native values and on argument reads
    /// outside the declared arity — both caller programming errors.
    pub fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Lit(v) => v.clone(),
            Expr::Place(place) => self.read_place(*place),
            Expr::GetProp(base, prop) => self.eval(base).get_key(prop),
            Expr::Path(base, path) => path.resolve(&self.eval(base)),
            Expr::Call(callee, args) => {
                let callee = self.eval(callee);
                let argv: Vec<Value> = args.iter().map(|a| self.eval(a)).collect();
                match callee {
                    Value::Native(f) => f(&argv),
                    other => panic!("call through non-native value {other}"),
                }
            }
        }
    }
}

// ─── Unit rendering ──────────────────────────────────────────────────────────
//
// Pseudo-source for trace logs: the serialized form of the compile unit,
// readable enough to eyeball what a command compiled to.

fn expr_src(expr: &Expr) -> String {
    match expr {
        Expr::Lit(v) => v.to_string(),
        Expr::Place(p) => p.to_string(),
        Expr::GetProp(base, prop) => format!("{}.{prop}", expr_src(base)),
        Expr::Path(base, path) => format!("{}{}", expr_src(base), path.render()),
        Expr::Call(callee, args) => {
            let argv: Vec<String> = args.iter().map(expr_src).collect();
            format!("{}({})", expr_src(callee), argv.join(","))
        }
    }
}

fn block_src(program: &Program, id: BlockId, out: &mut String) {
    let block = &program.blocks[id.0 as usize];
    if !block.declared.is_empty() {
        let names: Vec<String> = block.declared.iter().map(ToString::to_string).collect();
        let _ = write!(out, "var {};", names.join(","));
    }
    for op in &block.ops {
        match op {
            Op::Eval(e) => {
                let _ = write!(out, "{};", expr_src(e));
            }
            Op::Define { cell, init } => {
                if let Some(e) = init {
                    let _ = write!(out, "{cell}={};", expr_src(e));
                }
            }
            Op::Store {
                object,
                prop,
                value,
            } => {
                let _ = write!(out, "{object}.{prop}={};", expr_src(value));
            }
            Op::Enter(scope) => scope_src(program, *scope, out),
            Op::Branch(cond) => {
                let data = &program.conds[cond.0 as usize];
                let _ = write!(out, "if({}){{", expr_src(&data.pred));
                scope_src(program, data.then_scope, out);
                out.push('}');
                let mut else_body = String::new();
                scope_src(program, data.else_scope, &mut else_body);
                if !else_body.is_empty() {
                    let _ = write!(out, "else{{{else_body}}}");
                }
            }
            Op::Return(e) => {
                let _ = write!(out, "return {};", expr_src(e));
            }
        }
    }
}

fn scope_src(program: &Program, id: ScopeId, out: &mut String) {
    let scope = &program.scopes[id.0 as usize];
    block_src(program, scope.entry, out);
    block_src(program, scope.exit, out);
}

pub(crate) fn render_unit(
    program: &Program,
    global: BlockId,
    procs: &[(String, ProcData)],
) -> String {
    let mut out = String::new();
    block_src(program, global, &mut out);
    for (name, proc) in procs {
        let args: Vec<String> = (0..proc.arity).map(|i| format!("a{i}")).collect();
        let _ = write!(out, "\n{name:?}: proc({}){{", args.join(","));
        scope_src(program, proc.body, &mut out);
        out.push('}');
    }
    out.replace(';', ";\n")
}
