// SPDX-License-Identifier: MIT

//! Variable bindings (spec §3 "Variable binding").

use serde::{Deserialize, Serialize};

/// The four assignment operators a recipe file or command-line override can
/// use (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    /// `:=` — right-hand side expanded once, at assignment time.
    Immediate,
    /// `=` — right-hand side expanded every time the variable is read.
    Deferred,
    /// `?=` — only takes effect if the variable is not already set.
    Conditional,
    /// `+=` — appends to the existing value (deferred if the variable was
    /// previously deferred, immediate if it was previously immediate).
    Append,
}

impl AssignOp {
    pub fn from_operator_str(s: &str) -> Option<Self> {
        match s {
            ":=" => Some(Self::Immediate),
            "=" => Some(Self::Deferred),
            "?=" => Some(Self::Conditional),
            "+=" => Some(Self::Append),
            _ => None,
        }
    }
}

/// Where a variable binding came from. Command-line overrides shadow
/// recipe-file assignments of the same name (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    RecipeFile,
    CommandLine,
}

/// A name → value-template binding. The value is stored unexpanded; the
/// expander resolves it lazily for `Deferred`/`Append`-onto-deferred
/// bindings, or once at parse time for `Immediate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarBinding {
    pub op: AssignOp,
    pub value_template: String,
    pub scope: Scope,
}

impl VarBinding {
    pub fn new(op: AssignOp, value_template: impl Into<String>, scope: Scope) -> Self {
        Self {
            op,
            value_template: value_template.into(),
            scope,
        }
    }
}

#[cfg(test)]
#[path = "variable_tests.rs"]
mod tests;
