//! The fixed set of collection operations the resolver dispatches

use std::fmt;
use std::str::FromStr;

use crate::error::ExecutionError;

/// Operation named in a `db.collection.<operation>(...)` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Find,
    FindAndModify,
    Aggregate,
    Insert,
    Update,
    Remove,
    /// Recognized so that it can be rejected with a clear message
    Save,
}

impl Operation {
    /// Every dispatchable operation, in table order
    pub const ALL: [Operation; 7] = [
        Operation::Find,
        Operation::FindAndModify,
        Operation::Aggregate,
        Operation::Insert,
        Operation::Update,
        Operation::Remove,
        Operation::Save,
    ];

    /// Shell name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::FindAndModify => "findAndModify",
            Operation::Aggregate => "aggregate",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Remove => "remove",
            Operation::Save => "save",
        }
    }

    /// Whether the operation writes to the collection
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Insert | Operation::Update | Operation::Remove | Operation::Save
        )
    }
}

impl FromStr for Operation {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| ExecutionError::UnsupportedOperation(s.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
