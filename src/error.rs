/*!

  The two kinds of failure the machine distinguishes.

  A *unification failure* is recoverable: the execute loop backtracks to the youngest choice
  point, or reports `false.` to the driver when none exists. A *runtime error* is fatal: it
  carries the source location of the site that raised it and aborts the current top-level
  operation. Every store access that could overflow its backing vector raises the fatal kind
  with the site recorded; nothing ever silently returns a sentinel.

*/

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::functor::Functor;

/// The `file!()`/`line!()` of the site that raised a fatal error.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct SourceLocation {
  pub file: &'static str,
  pub line: u32,
}

impl Display for SourceLocation {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.file, self.line)
  }
}

/// Captures the `SourceLocation` of the expansion site.
#[macro_export]
macro_rules! source_location {
  () => {
    $crate::error::SourceLocation {
      file: file!(),
      line: line!(),
    }
  };
}

/// Fatal errors. These abort the current top-level operation rather than triggering
/// backtracking.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum RuntimeError {

  #[error("{location}: tried to access {store}[{index}] out of bounds (size {size})")]
  OutOfBounds {
    store    : &'static str,
    index    : usize,
    size     : usize,
    location : SourceLocation,
  },

  #[error("{location}: expected {expected} but found `{found}`")]
  BadCell {
    expected : &'static str,
    found    : String,
    location : SourceLocation,
  },

  #[error("{location}: bad stack-role access: expected {expected}")]
  StackRole {
    expected : &'static str,
    location : SourceLocation,
  },

  #[error("{location}: {operation} with no {missing} in place")]
  Underflow {
    operation : &'static str,
    missing   : &'static str,
    location  : SourceLocation,
  },

  #[error("{location}: cannot evaluate {found} as an arithmetic expression")]
  Arithmetic {
    found    : String,
    location : SourceLocation,
  },

  #[error("{location}: no host command is registered under the name `{name}`")]
  UnknownCommand {
    name     : String,
    location : SourceLocation,
  },

  #[error("{location}: `{functor}` is a built-in and cannot be redeclared")]
  RedeclaredBuiltin {
    functor  : Functor,
    location : SourceLocation,
  },

}

/**
  Any reason an instruction can stop the machine's forward progress: either a unification
  failure, which the backtracking machinery handles, or a fatal `RuntimeError`, which it
  rethrows.

  A *forceful* unification failure is the signal raised by `Proceed` when a `negate` or
  `intercept` modifier is on top of the modifier stack. It must escape the local choice-point
  scope of the modified goal, so the backtracker treats it specially.
*/
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum Fault {

  #[error("unification failure")]
  Unification { forceful: bool },

  #[error(transparent)]
  Error(#[from] RuntimeError),

}

impl Fault {

  /// An ordinary, recoverable unification failure.
  pub fn unification() -> Fault {
    Fault::Unification { forceful: false }
  }

  /// The failure `Proceed` raises under a `negate`/`intercept` modifier.
  pub fn forceful() -> Fault {
    Fault::Unification { forceful: true }
  }

  pub fn is_recoverable(&self) -> bool {
    matches!(self, Fault::Unification { .. })
  }

}

/// Errors reported by the parser, each pinned to a row and column of the source text.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Error on line {row}, column {column}: {message}")]
pub struct ParseError {
  pub message : String,
  pub row     : usize,
  pub column  : usize,
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn location_is_rendered(){
    let error = RuntimeError::OutOfBounds {
      store: "HEAP",
      index: 12,
      size: 4,
      location: source_location!(),
    };
    let message = format!("{}", error);
    assert!(message.contains("HEAP[12]"));
    assert!(message.contains("src/error.rs"));
  }

  #[test]
  fn fault_kinds(){
    assert!(Fault::unification().is_recoverable());
    assert!(Fault::forceful().is_recoverable());

    let fatal = Fault::from(RuntimeError::UnknownCommand {
      name: "frobnicate".to_string(),
      location: source_location!(),
    });
    assert!(!fatal.is_recoverable());
  }

  #[test]
  fn forceful_flag(){
    match Fault::forceful() {
      Fault::Unification { forceful } => assert!(forceful),
      _ => panic!("expected a unification failure"),
    }
  }
}
