//! Abstract Syntax Tree definitions
//!
//! A program is an ordered sequence of nodes. Every node evaluates to a
//! runtime value (statements evaluate to void), so statements and
//! expressions share one enum. Nested bodies are their own blocks.

mod span;

pub use span::*;

use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Ordered sequence of sibling nodes
pub type Block = Vec<Node>;

/// A parsed program
#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub body: Block,
}

/// AST node
#[derive(Debug, Clone, Serialize)]
pub enum Node {
    /// Integer literal
    Int(i64),
    /// String literal
    Str(String),
    /// Variable read
    Variable(String),
    /// `name = value`
    Assign { name: String, value: Box<Node> },
    /// Binary operation, resolved at runtime by operand kinds
    Binary {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// Unary minus
    Negate(Box<Node>),
    /// `print` / `printInline`
    Print { value: Box<Node>, newline: bool },
    /// Function declaration
    Function(Rc<FunctionDef>),
    /// Free function call
    Call { name: String, args: Vec<Node> },
    If {
        condition: Box<Node>,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While { condition: Box<Node>, body: Block },
    For {
        init: Box<Node>,
        condition: Box<Node>,
        increment: Box<Node>,
        body: Block,
    },
    /// `return expr`, or `return void` when `None`
    Return(Option<Box<Node>>),
    /// Read one line from the console
    Input,
    /// Array literal
    Array(Vec<Node>),
    /// `target[index]`
    Index { target: Box<Node>, index: Box<Node> },
    /// `target:name(args)`
    Extension {
        target: Box<Node>,
        name: String,
        args: Vec<Node>,
    },
    /// refbox definition
    RefBox(Rc<RefBoxDef>),
    /// `create Name`
    Create(String),
    /// `instance.field`
    FieldAccess { instance: String, field: String },
    /// `instance.field = value`
    FieldAssign {
        instance: String,
        field: String,
        value: Box<Node>,
    },
    /// `receiver.name(args)`
    MethodCall(MethodCall),
    /// `throw message`
    Throw(Box<Node>),
    /// `import path`
    Import(Box<Node>),
    /// `readFile(path)`: all lines
    ReadLines(Box<Node>),
    /// `readWholeFile(path)`
    ReadText(Box<Node>),
    /// `fileExists(path)`
    FileExists(Box<Node>),
    /// `extension(kind, refbox, function, arity)`
    ExtensionDecl {
        kind: Box<Node>,
        refbox: Box<Node>,
        function: Box<Node>,
        arity: Box<Node>,
    },
}

impl Node {
    /// Short node name for diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            Node::Int(_) => "int",
            Node::Str(_) => "string",
            Node::Variable(_) => "variable",
            Node::Assign { .. } => "assign",
            Node::Binary { .. } => "binary",
            Node::Negate(_) => "negate",
            Node::Print { .. } => "print",
            Node::Function(_) => "function",
            Node::Call { .. } => "call",
            Node::If { .. } => "if",
            Node::While { .. } => "while",
            Node::For { .. } => "for",
            Node::Return(_) => "return",
            Node::Input => "input",
            Node::Array(_) => "array",
            Node::Index { .. } => "index",
            Node::Extension { .. } => "extension",
            Node::RefBox(_) => "refbox",
            Node::Create(_) => "create",
            Node::FieldAccess { .. } => "field access",
            Node::FieldAssign { .. } => "field assign",
            Node::MethodCall(_) => "method call",
            Node::Throw(_) => "throw",
            Node::Import(_) => "import",
            Node::ReadLines(_) => "readFile",
            Node::ReadText(_) => "readWholeFile",
            Node::FileExists(_) => "fileExists",
            Node::ExtensionDecl { .. } => "extension declaration",
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Eq => "==",
            BinOp::Ne => "<>",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        write!(f, "{symbol}")
    }
}

/// Function definition (free function or refbox member)
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
}

/// Access modifier on a refbox member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Access {
    Exposed,
    Guarded,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Exposed => write!(f, "Exposed"),
            Access::Guarded => write!(f, "Guarded"),
        }
    }
}

/// Field member of a refbox definition
#[derive(Debug, Clone, Serialize)]
pub struct FieldDecl {
    pub name: String,
    pub init: Node,
    pub access: Access,
}

/// Function member of a refbox definition
#[derive(Debug, Clone, Serialize)]
pub struct MethodDecl {
    pub function: Rc<FunctionDef>,
    pub access: Access,
    pub is_abstract: bool,
}

/// refbox definition as written in source
#[derive(Debug, Clone, Serialize)]
pub struct RefBoxDef {
    pub name: String,
    pub base: Option<String>,
    pub is_abstract: bool,
    pub is_const: bool,
    pub fields: Vec<FieldDecl>,
    pub functions: Vec<MethodDecl>,
}

/// Method call on a refbox instance
#[derive(Debug, Clone, Serialize)]
pub struct MethodCall {
    pub receiver: Receiver,
    pub name: String,
    pub args: Vec<Node>,
}

/// Where a method call finds its instance
#[derive(Debug, Clone, Serialize)]
pub enum Receiver {
    /// Instance stored in a variable
    Named(String),
    /// Fresh instance from `create Name`
    Anonymous(String),
    /// Result of the previous call in a chain
    Chained(Box<MethodCall>),
}
