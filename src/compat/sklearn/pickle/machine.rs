//! Protocol 0 opcode interpreter.

use std::collections::HashMap;
use std::io::BufRead;

use super::PickleError;
use super::value::{Build, Dict, Global, Reduce, Value};

// =============================================================================
// Opcodes
// =============================================================================

/// The protocol 0 subset needed for scikit-learn estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    Mark,
    Stop,
    Float,
    Int,
    Long,
    None,
    Reduce,
    Unicode,
    Append,
    Build,
    Global,
    Dict,
    Get,
    List,
    Put,
    SetItem,
    Tuple,
}

impl Opcode {
    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            b'(' => Opcode::Mark,
            b'.' => Opcode::Stop,
            b'F' => Opcode::Float,
            b'I' => Opcode::Int,
            b'L' => Opcode::Long,
            b'N' => Opcode::None,
            b'R' => Opcode::Reduce,
            b'V' => Opcode::Unicode,
            b'a' => Opcode::Append,
            b'b' => Opcode::Build,
            b'c' => Opcode::Global,
            b'd' => Opcode::Dict,
            b'g' => Opcode::Get,
            b'l' => Opcode::List,
            b'p' => Opcode::Put,
            b's' => Opcode::SetItem,
            b't' => Opcode::Tuple,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Opcode::Mark => "MARK",
            Opcode::Stop => "STOP",
            Opcode::Float => "FLOAT",
            Opcode::Int => "INT",
            Opcode::Long => "LONG",
            Opcode::None => "NONE",
            Opcode::Reduce => "REDUCE",
            Opcode::Unicode => "UNICODE",
            Opcode::Append => "APPEND",
            Opcode::Build => "BUILD",
            Opcode::Global => "GLOBAL",
            Opcode::Dict => "DICT",
            Opcode::Get => "GET",
            Opcode::List => "LIST",
            Opcode::Put => "PUT",
            Opcode::SetItem => "SETITEM",
            Opcode::Tuple => "TUPLE",
        }
    }
}

// =============================================================================
// Machine
// =============================================================================

/// Stack, marks and memo of the pickle virtual machine.
#[derive(Debug, Default)]
pub(super) struct Machine {
    stack: Vec<Value>,
    marks: Vec<usize>,
    /// Snapshots taken at `PUT`; later in-place updates of the stack object
    /// (`SETITEM`, `APPEND`, `BUILD`) are not visible through `GET`.
    memo: HashMap<String, Value>,
}

impl Machine {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self, op: Opcode) -> Result<Value, PickleError> {
        self.stack.pop().ok_or(PickleError::StackUnderflow(op.name()))
    }

    fn top_mut(&mut self, op: Opcode) -> Result<&mut Value, PickleError> {
        self.stack.last_mut().ok_or(PickleError::StackUnderflow(op.name()))
    }

    fn push_mark(&mut self) {
        self.marks.push(self.stack.len());
    }

    /// Remove and return everything above the most recent mark.
    fn pop_mark(&mut self, op: Opcode) -> Result<Vec<Value>, PickleError> {
        let mark = self.marks.pop().ok_or(PickleError::MarkUnderflow(op.name()))?;
        if mark > self.stack.len() {
            return Err(PickleError::StackUnderflow(op.name()));
        }
        Ok(self.stack.split_off(mark))
    }

    /// Execute one opcode. Returns the result on `STOP`.
    fn step<R: BufRead>(&mut self, op: Opcode, input: &mut Input<R>) -> Result<Option<Value>, PickleError> {
        match op {
            Opcode::Mark => self.push_mark(),
            Opcode::Stop => return self.stack.pop().map(Some).ok_or(PickleError::NoResult),
            Opcode::Float => {
                let line = input.line(op)?;
                let value = parse_line::<f64>(&line, "float")?;
                self.push(Value::Float(value));
            }
            Opcode::Int => {
                // `I01` / `I00` encode True / False and parse as 1 / 0.
                let line = input.line(op)?;
                let value = parse_line::<i64>(&line, "int")?;
                self.push(Value::Int(value));
            }
            Opcode::Long => {
                let line = input.line(op)?;
                let digits = match line.split_last() {
                    Some((b'L', digits)) if !digits.is_empty() => digits,
                    _ => return Err(malformed("long", &line)),
                };
                let value = parse_line::<i64>(digits, "long")?;
                self.push(Value::Int(value));
            }
            Opcode::None => self.push(Value::None),
            Opcode::Reduce => {
                let args = self.pop(op)?;
                let callable = self.pop(op)?;
                let Value::Tuple(args) = args else {
                    return Err(PickleError::ReduceArgs(args.kind()));
                };
                self.push(Value::Reduce(Box::new(Reduce { callable, args })));
            }
            Opcode::Unicode => {
                let line = input.line(op)?;
                self.push(Value::Unicode(decode_raw_unicode(&line)));
            }
            Opcode::Append => {
                let item = self.pop(op)?;
                match self.top_mut(op)? {
                    Value::List(items) => items.push(item),
                    other => return Err(PickleError::AppendTarget(other.kind())),
                }
            }
            Opcode::Build => {
                let state = self.pop(op)?;
                let object = self.pop(op)?;
                self.push(Value::Build(Box::new(Build { object, state })));
            }
            Opcode::Global => {
                let module = utf8_line(input.line(op)?, "global module")?;
                let name = utf8_line(input.line(op)?, "global name")?;
                self.push(Value::Global(Global { module, name }));
            }
            Opcode::Dict => {
                let items = self.pop_mark(op)?;
                if items.len() % 2 != 0 {
                    return Err(PickleError::OddDict(items.len()));
                }
                let mut dict = Dict::with_capacity(items.len() / 2);
                let mut items = items.into_iter();
                while let (Some(key), Some(value)) = (items.next(), items.next()) {
                    dict.insert(dict_key(key)?, value);
                }
                self.push(Value::Dict(dict));
            }
            Opcode::Get => {
                let key = utf8_line(input.line(op)?, "memo key")?;
                let value = self.memo.get(&key).cloned().ok_or(PickleError::MemoMiss(key))?;
                self.push(value);
            }
            Opcode::List => {
                let items = self.pop_mark(op)?;
                self.push(Value::List(items));
            }
            Opcode::Put => {
                let key = utf8_line(input.line(op)?, "memo key")?;
                let top = self.stack.last().ok_or(PickleError::StackUnderflow(op.name()))?;
                self.memo.insert(key, top.clone());
            }
            Opcode::SetItem => {
                let value = self.pop(op)?;
                let key = dict_key(self.pop(op)?)?;
                match self.top_mut(op)? {
                    Value::Dict(dict) => {
                        dict.insert(key, value);
                    }
                    other => return Err(PickleError::SetItemTarget(other.kind())),
                }
            }
            Opcode::Tuple => {
                let items = self.pop_mark(op)?;
                self.push(Value::Tuple(items));
            }
        }
        Ok(None)
    }
}

/// Run the machine over `reader` until `STOP`.
pub(super) fn run<R: BufRead>(reader: R) -> Result<Value, PickleError> {
    let mut input = Input { reader };
    let mut machine = Machine::default();
    loop {
        let byte = input.byte()?;
        let op = Opcode::from_byte(byte).ok_or(PickleError::UnknownOpcode(byte))?;
        if let Some(result) = machine.step(op, &mut input)? {
            return Ok(result);
        }
    }
}

// =============================================================================
// Input
// =============================================================================

struct Input<R> {
    reader: R,
}

impl<R: BufRead> Input<R> {
    fn byte(&mut self) -> Result<u8, PickleError> {
        let mut buf = [0u8; 1];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => Ok(buf[0]),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(PickleError::UnexpectedEnd { context: "opcode" })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read a newline-terminated argument, without the newline.
    fn line(&mut self, op: Opcode) -> Result<Vec<u8>, PickleError> {
        let mut line = Vec::new();
        self.reader.read_until(b'\n', &mut line)?;
        if line.pop() != Some(b'\n') {
            return Err(PickleError::UnexpectedEnd { context: op.name() });
        }
        Ok(line)
    }
}

// =============================================================================
// Argument decoding
// =============================================================================

fn malformed(what: &'static str, line: &[u8]) -> PickleError {
    PickleError::Malformed {
        what,
        line: String::from_utf8_lossy(line).into_owned(),
    }
}

fn parse_line<T: std::str::FromStr>(line: &[u8], what: &'static str) -> Result<T, PickleError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| malformed(what, line))
}

fn utf8_line(line: Vec<u8>, what: &'static str) -> Result<String, PickleError> {
    String::from_utf8(line).map_err(|e| malformed(what, e.as_bytes()))
}

fn dict_key(key: Value) -> Result<String, PickleError> {
    match key {
        Value::Unicode(bytes) => utf8_line(bytes, "dict key"),
        other => Err(PickleError::NonUnicodeKey(other.kind())),
    }
}

/// Undo `raw-unicode-escape`.
///
/// Code points below 256 map back to single bytes, which keeps latin-1 byte
/// payloads intact; larger ones are stored as UTF-8. Any other byte is kept
/// verbatim.
fn decode_raw_unicode(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        if line[i] == b'\\' {
            let width = match line.get(i + 1) {
                Some(b'u') => 4,
                Some(b'U') => 8,
                _ => 0,
            };
            let code = (width > 0)
                .then(|| line.get(i + 2..i + 2 + width))
                .flatten()
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u32::from_str_radix(hex, 16).ok());
            if let Some(code) = code {
                match u8::try_from(code) {
                    Ok(byte) => out.push(byte),
                    Err(_) => {
                        let ch = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                        out.extend_from_slice(ch.encode_utf8(&mut [0u8; 4]).as_bytes());
                    }
                }
                i += 2 + width;
                continue;
            }
        }
        out.push(line[i]);
        i += 1;
    }
    out
}
