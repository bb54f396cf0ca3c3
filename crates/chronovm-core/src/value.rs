//! Runtime value representation.
//!
//! Every value the VM manipulates on its operand stack, in a binding, or as
//! a list/object element is an opaque heap address (spec.md §3: "primitives
//! live in the heap too"). `Address` is the externally-observable identifier
//! ("`heap@17`"); internally it is a plain integer, formatted only at the
//! boundary where events/labels become observable (spec.md §9's
//! "address-as-string" note).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A heap-allocated address. Minted by a monotonic counter and never reused
/// within a run, even after collection (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    #[must_use]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap@{}", self.0)
    }
}

/// Identifier for an environment, minted from the same counter discipline
/// as heap addresses but kept in a distinct store (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvId(pub u64);

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env@{}", self.0)
    }
}

/// A scalar value boxed on the heap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Primitive {
    /// Textual representation used by `PRINT` and by the compressor's
    /// variable-diff value-stringification (spec.md §4.8).
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Self::Null => "None".to_owned(),
            Self::Bool(true) => "True".to_owned(),
            Self::Bool(false) => "False".to_owned(),
            Self::Int(n) => n.to_string(),
            Self::Float(n) => format_float(*n),
            Self::Str(s) => s.clone(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
        }
    }

    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
        }
    }
}

/// A 64-bit IEEE 754 float printed with a fixed, deterministic rendering
/// (spec.md §5: "fixed numeric representation").
#[must_use]
pub fn format_float(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{n:.1}")
    } else {
        let mut s = format!("{n}");
        if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("nan") {
            s.push_str(".0");
        }
        s
    }
}

/// One heap-resident object. Every case in spec.md §3's heap object union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeapObject {
    Primitive(Primitive),
    /// Ordered mapping from property name to address.
    Object(indexmap::IndexMap<String, Address>),
    /// Ordered sequence of addresses.
    List(Vec<Address>),
    /// An entry-point `pc` plus the captured environment.
    Function { entry_pc: usize, captured_env: EnvId },
}

impl HeapObject {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Primitive(_) => "primitive",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Function { .. } => "function",
        }
    }

    /// Short human label used by the graph builder (spec.md §4.4).
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Primitive(p) => p.repr(),
            Self::Object(_) => "{object}".to_owned(),
            Self::List(_) => "[list]".to_owned(),
            Self::Function { entry_pc, .. } => format!("<function @{entry_pc}>"),
        }
    }

    /// Every address this heap object directly references, in the order
    /// the graph builder should label edges (spec.md §4.4).
    pub fn outgoing(&self) -> Vec<(String, Address)> {
        match self {
            Self::Primitive(_) => Vec::new(),
            Self::Object(props) => props.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            Self::List(items) => items.iter().enumerate().map(|(i, v)| (format!("[{i}]"), *v)).collect(),
            Self::Function { .. } => Vec::new(),
        }
    }
}
