//! Python pickle (protocol 0) decoding.
//!
//! Protocol 0 is line oriented: each opcode is one byte, followed by a
//! newline-terminated argument where it takes one. [`decode`] runs the
//! opcodes on a stack machine and returns the object left on top at `STOP`.
//!
//! Only the opcodes emitted for scikit-learn estimators and numpy arrays are
//! understood. Class construction is not performed; see
//! [`extract`](super::extract) for turning the generic [`Value`] tree into
//! typed structures.

mod machine;
mod value;

use std::io::BufRead;

pub use value::{Build, Dict, Global, Reduce, Value};

/// Error while decoding a pickle stream.
#[derive(Debug, thiserror::Error)]
pub enum PickleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of input while reading {context}")]
    UnexpectedEnd { context: &'static str },

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("{0}: stack underflow")]
    StackUnderflow(&'static str),

    #[error("{0}: no mark on the stack")]
    MarkUnderflow(&'static str),

    #[error("memo key {0:?} not found")]
    MemoMiss(String),

    #[error("malformed {what} argument {line:?}")]
    Malformed { what: &'static str, line: String },

    #[error("dict needs an even number of items, got {0}")]
    OddDict(usize),

    #[error("dict keys must be unicode, got {0}")]
    NonUnicodeKey(&'static str),

    #[error("reduce arguments must be a tuple, got {0}")]
    ReduceArgs(&'static str),

    #[error("cannot append to {0}")]
    AppendTarget(&'static str),

    #[error("cannot set item on {0}")]
    SetItemTarget(&'static str),

    #[error("stack is empty at STOP")]
    NoResult,
}

/// Decode one pickled object.
pub fn decode<R: BufRead>(reader: R) -> Result<Value, PickleError> {
    machine::run(reader)
}
