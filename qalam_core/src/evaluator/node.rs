//! The parse-tree contract the evaluator walks.
//!
//! The grammar, lexer, and parser that produce this tree are out of
//! scope for this crate — `Node` is the *shape* those upstream stages
//! are expected to hand the evaluator, not a parser output. Every
//! variant carries its own `SourceLocation` so errors raised
//! mid-evaluation can report where in the source they occurred.

use crate::span::SourceLocation;
use std::sync::Arc;

/// `Arc`, not `Rc`: a spawned task runs its body on a fresh
/// OS thread, so the tree it walks must be shareable across threads.
/// `Node` itself holds no interior mutability, so this is a plain
/// immutable shared tree — no locking needed to read it.
pub type NodeRef = Arc<Node>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    NullishCoalesce,
    InstanceOf,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitwiseNot,
    SizeOf,
    TypeOf,
    PreIncrement,
    PostIncrement,
    PreDecrement,
    PostDecrement,
}

#[derive(Debug, Clone)]
pub enum Literal {
    None,
    NaN,
    Bool(bool),
    Char(char),
    Int(i64),
    Decimal(f64),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub is_nullable: bool,
    pub default: Option<NodeRef>,
    pub is_variadic: bool,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    /// `"ok"`, `"error"`, `"some"`, or `"none"` — the four shapes the
    /// `try`/`match` construct recognizes over `Result`/`Option`.
    pub pattern: String,
    pub binding: Option<String>,
    pub body: NodeRef,
}

#[derive(Debug, Clone)]
pub enum Node {
    Program {
        statements: Vec<NodeRef>,
        location: Option<SourceLocation>,
    },
    Block {
        statements: Vec<NodeRef>,
        location: Option<SourceLocation>,
    },

    Declaration {
        name: String,
        is_constant: bool,
        is_nullable: bool,
        initializer: Option<NodeRef>,
        location: Option<SourceLocation>,
    },
    /// Tuple-destructuring declaration: `let a, b := expr`.
    /// The initializer must produce a `Tuple` of exactly `names.len()`
    /// elements; each name is bound positionally.
    MultiDeclaration {
        names: Vec<String>,
        is_constant: bool,
        initializer: NodeRef,
        location: Option<SourceLocation>,
    },
    Assignment {
        target: NodeRef,
        value: NodeRef,
        location: Option<SourceLocation>,
    },

    Identifier {
        name: String,
        location: Option<SourceLocation>,
    },
    Literal {
        value: Literal,
        location: Option<SourceLocation>,
    },

    BinaryExpr {
        op: BinaryOp,
        left: NodeRef,
        right: NodeRef,
        location: Option<SourceLocation>,
    },
    UnaryExpr {
        op: UnaryOp,
        operand: NodeRef,
        location: Option<SourceLocation>,
    },

    Call {
        callee: NodeRef,
        arguments: Vec<NodeRef>,
        /// An explicit ordinal suffix (`name#2(args)`) that selects a
        /// specific overload instead of ranking by arity/type
        /// compatibility.
        ordinal: Option<usize>,
        location: Option<SourceLocation>,
    },
    MethodCall {
        receiver: NodeRef,
        method_name: String,
        arguments: Vec<NodeRef>,
        ordinal: Option<usize>,
        location: Option<SourceLocation>,
    },

    Index {
        target: NodeRef,
        index: NodeRef,
        location: Option<SourceLocation>,
    },
    FieldAccess {
        target: NodeRef,
        field: String,
        location: Option<SourceLocation>,
    },

    TupleLiteral {
        elements: Vec<NodeRef>,
        location: Option<SourceLocation>,
    },
    ListLiteral {
        elements: Vec<NodeRef>,
        location: Option<SourceLocation>,
    },
    ObjectLiteral {
        type_name: Option<String>,
        fields: Vec<(String, NodeRef)>,
        location: Option<SourceLocation>,
    },

    If {
        condition: NodeRef,
        then_branch: NodeRef,
        /// `(condition, body)` pairs for each `elseif`.
        elseifs: Vec<(NodeRef, NodeRef)>,
        else_branch: Option<NodeRef>,
        location: Option<SourceLocation>,
    },

    WhileLoop {
        label: Option<String>,
        condition: NodeRef,
        body: NodeRef,
        location: Option<SourceLocation>,
    },
    RepeatLoop {
        label: Option<String>,
        body: NodeRef,
        location: Option<SourceLocation>,
    },
    IndexedLoop {
        label: Option<String>,
        variable: String,
        start: NodeRef,
        end: NodeRef,
        step: Option<NodeRef>,
        body: NodeRef,
        location: Option<SourceLocation>,
    },
    ForeachLoop {
        label: Option<String>,
        targets: Vec<String>,
        iterable: NodeRef,
        body: NodeRef,
        location: Option<SourceLocation>,
    },
    Break {
        label: Option<String>,
        /// The value `break` yields to the enclosing loop expression, if
        /// any (`break 3`, `break outer 3`). `None` breaks with `none`.
        value: Option<NodeRef>,
        location: Option<SourceLocation>,
    },
    Continue {
        label: Option<String>,
        location: Option<SourceLocation>,
    },
    Return {
        value: Option<NodeRef>,
        location: Option<SourceLocation>,
    },

    FunctionDecl {
        name: String,
        parameters: Vec<Param>,
        body: NodeRef,
        location: Option<SourceLocation>,
    },
    BehaviorDecl {
        type_name: String,
        method_name: String,
        parameters: Vec<Param>,
        body: NodeRef,
        location: Option<SourceLocation>,
    },

    TryMatch {
        subject: NodeRef,
        arms: Vec<MatchArm>,
        location: Option<SourceLocation>,
    },
    Throw {
        value: NodeRef,
        location: Option<SourceLocation>,
    },

    Spawn {
        body: NodeRef,
        location: Option<SourceLocation>,
    },
    Await {
        value: NodeRef,
        location: Option<SourceLocation>,
    },
    Scope {
        /// `scope ordered { .. }` awaits collected tasks in spawn order;
        /// a plain `scope { .. }` awaits in completion order.
        ordered: bool,
        body: NodeRef,
        location: Option<SourceLocation>,
    },

    Import {
        path: String,
        alias: Option<String>,
        location: Option<SourceLocation>,
    },
}

impl Node {
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            Node::Program { location, .. }
            | Node::Block { location, .. }
            | Node::Declaration { location, .. }
            | Node::MultiDeclaration { location, .. }
            | Node::Assignment { location, .. }
            | Node::Identifier { location, .. }
            | Node::Literal { location, .. }
            | Node::BinaryExpr { location, .. }
            | Node::UnaryExpr { location, .. }
            | Node::Call { location, .. }
            | Node::MethodCall { location, .. }
            | Node::Index { location, .. }
            | Node::FieldAccess { location, .. }
            | Node::TupleLiteral { location, .. }
            | Node::ListLiteral { location, .. }
            | Node::ObjectLiteral { location, .. }
            | Node::If { location, .. }
            | Node::WhileLoop { location, .. }
            | Node::RepeatLoop { location, .. }
            | Node::IndexedLoop { location, .. }
            | Node::ForeachLoop { location, .. }
            | Node::Break { location, .. }
            | Node::Continue { location, .. }
            | Node::Return { location, .. }
            | Node::FunctionDecl { location, .. }
            | Node::BehaviorDecl { location, .. }
            | Node::TryMatch { location, .. }
            | Node::Throw { location, .. }
            | Node::Spawn { location, .. }
            | Node::Await { location, .. }
            | Node::Scope { location, .. }
            | Node::Import { location, .. } => *location,
        }
    }
}
