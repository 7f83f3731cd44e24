//! Programs and the lifter that renders them as source text.

use std::fmt::Write;
use std::sync::Arc;

/// One operation of a generated program.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation as source text, e.g. `let v3 = v1 + v2;`.
    pub code: String,
    /// A note attached by the generator explaining where the instruction came from.
    pub comment: Option<String>,
    /// The type observed for the instruction's output when runtime types are collected.
    pub inferred_type: Option<String>,
}

impl Instruction {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            comment: None,
            inferred_type: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_type(mut self, inferred_type: impl Into<String>) -> Self {
        self.inferred_type = Some(inferred_type.into());
        self
    }
}

/// A generated test program. Cheap to clone; the instructions are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub id: u64,
    instructions: Arc<[Instruction]>,
}

impl Program {
    pub fn new(id: u64, instructions: Vec<Instruction>) -> Self {
        Self {
            id,
            instructions: instructions.into(),
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Annotation mode requested when lifting a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftOptions {
    /// Plain code only.
    Minimal,
    /// Emit each instruction's comment on the line above it.
    IncludeComments,
    /// Append each instruction's inferred output type.
    DumpTypes,
}

/// Renders a program's internal representation as human-readable text.
pub trait Lifter: Send + Sync {
    fn lift(&self, program: &Program, options: LiftOptions) -> String;
}

/// Line-per-instruction lifter used when the engine has nothing better.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLifter;

impl Lifter for TextLifter {
    fn lift(&self, program: &Program, options: LiftOptions) -> String {
        let mut out = String::new();
        for instruction in program.instructions() {
            match options {
                LiftOptions::IncludeComments => {
                    if let Some(comment) = &instruction.comment {
                        writeln!(out, "// {comment}").ok();
                    }
                    writeln!(out, "{}", instruction.code).ok();
                }
                LiftOptions::DumpTypes => match &instruction.inferred_type {
                    Some(ty) => {
                        writeln!(out, "{} // {ty}", instruction.code).ok();
                    }
                    None => {
                        writeln!(out, "{}", instruction.code).ok();
                    }
                },
                LiftOptions::Minimal => {
                    writeln!(out, "{}", instruction.code).ok();
                }
            }
        }
        out
    }
}
