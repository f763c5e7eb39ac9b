//! Generic objects produced by the pickle machine.
//!
//! The machine never calls anything: `GLOBAL`, `REDUCE` and `BUILD` are kept
//! as inert records and interpreted later by the extractors.

use std::collections::HashMap;
use std::fmt;

/// String-keyed dictionary. Non-string keys are rejected while decoding.
pub type Dict = HashMap<String, Value>;

/// A decoded pickle object.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Int(i64),
    Float(f64),
    /// Unicode string as raw bytes. Byte payloads travel through here too,
    /// so the content is not required to be UTF-8.
    Unicode(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Dict(Dict),
    Global(Global),
    Reduce(Box<Reduce>),
    Build(Box<Build>),
}

impl Value {
    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Unicode(_) => "unicode",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Global(_) => "global",
            Value::Reduce(_) => "reduce",
            Value::Build(_) => "build",
        }
    }
}

/// Result of `GLOBAL`: a class or function reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub module: String,
    pub name: String,
}

impl Global {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Result of `REDUCE`: `callable(*args)`, usually a constructor call.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduce {
    pub callable: Value,
    pub args: Vec<Value>,
}

/// Result of `BUILD`: `object.__setstate__(state)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Build {
    pub object: Value,
    pub state: Value,
}
