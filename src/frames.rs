/*!

  The frames of the control stack.

  Environments and choice points share a single stack, so a frame is tagged with its role and
  every access states which role it expects. Asking for an environment where a choice point sits
  (or vice versa) is a fatal error, not a unification failure.

  An environment holds the permanent variables of one activation of a rule together with the
  continuation to return to when the rule's body is done. A choice point snapshots everything
  needed to retry a predicate's next clause: the argument registers, the environment and
  continuation of the caller, the heap and trail high-water marks, and the address of the next
  alternative.

*/

use std::fmt::{Display, Formatter};

use crate::cell::Cell;
use crate::error::RuntimeError;
use crate::source_location;

/// One activation record for a rule body: the permanent variables and the continuation.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Environment {
  /// Code address to resume at after the rule's body completes.
  pub continuation : usize,
  /// Control-stack index of the environment in force when this one was pushed.
  pub previous     : Option<usize>,
  /// The permanent-variable cells, `Y[1]` through `Y[n]`.
  pub slots        : Vec<Cell>,
}

impl Environment {
  pub fn new(continuation: usize, previous: Option<usize>, slot_count: usize) -> Environment {
    Environment {
      continuation,
      previous,
      slots: vec![Cell::Empty; slot_count],
    }
  }
}

/// A snapshot enabling re-execution of an alternative clause on failure.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ChoicePoint {
  /// The argument registers `X[1]..X[n]` at the moment of creation.
  pub saved_registers : Vec<Cell>,
  /// Control-stack index of the environment in force at the moment of creation.
  pub environment     : Option<usize>,
  /// The continuation in force at the moment of creation.
  pub continuation    : usize,
  /// Code address of the next alternative clause.
  pub next_clause     : usize,
  /// `trail.len()` at the moment of creation. Backtracking unwinds to here.
  pub trail_size      : usize,
  /// `heap.len()` at the moment of creation. Backtracking truncates to here.
  pub heap_size       : usize,
  /// Control-stack index of the previous choice point.
  pub previous        : Option<usize>,
}

/// A control-stack frame is either an environment or a choice point.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum StackFrame {
  Environment(Environment),
  ChoicePoint(ChoicePoint),
}

impl StackFrame {

  pub fn role(&self) -> &'static str {
    match self {
      StackFrame::Environment(_) => "environment",
      StackFrame::ChoicePoint(_) => "choice point",
    }
  }

  pub fn as_environment(&self) -> Result<&Environment, RuntimeError> {
    match self {
      StackFrame::Environment(environment) => Ok(environment),
      StackFrame::ChoicePoint(_) => Err(RuntimeError::StackRole {
        expected: "an environment",
        location: source_location!(),
      }),
    }
  }

  pub fn as_environment_mut(&mut self) -> Result<&mut Environment, RuntimeError> {
    match self {
      StackFrame::Environment(environment) => Ok(environment),
      StackFrame::ChoicePoint(_) => Err(RuntimeError::StackRole {
        expected: "an environment",
        location: source_location!(),
      }),
    }
  }

  pub fn as_choice_point(&self) -> Result<&ChoicePoint, RuntimeError> {
    match self {
      StackFrame::ChoicePoint(choice_point) => Ok(choice_point),
      StackFrame::Environment(_) => Err(RuntimeError::StackRole {
        expected: "a choice point",
        location: source_location!(),
      }),
    }
  }

  pub fn as_choice_point_mut(&mut self) -> Result<&mut ChoicePoint, RuntimeError> {
    match self {
      StackFrame::ChoicePoint(choice_point) => Ok(choice_point),
      StackFrame::Environment(_) => Err(RuntimeError::StackRole {
        expected: "a choice point",
        location: source_location!(),
      }),
    }
  }

}

impl Display for StackFrame {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      StackFrame::Environment(environment) => {
        write!(
          f,
          "ENV(cont: CODE[{}], slots: {})",
          environment.continuation,
          environment.slots.len()
        )
      }

      StackFrame::ChoicePoint(choice_point) => {
        write!(
          f,
          "CP(next: CODE[{}], heap: {}, trail: {}, args: {})",
          choice_point.next_clause,
          choice_point.heap_size,
          choice_point.trail_size,
          choice_point.saved_registers.len()
        )
      }

    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn environments_start_empty(){
    let environment = Environment::new(12, None, 3);
    assert_eq!(environment.slots, vec![Cell::Empty, Cell::Empty, Cell::Empty]);
    assert_eq!(environment.continuation, 12);
  }

  #[test]
  fn role_mismatch_is_fatal(){
    let frame = StackFrame::Environment(Environment::new(0, None, 0));
    assert!(frame.as_environment().is_ok());
    assert!(matches!(
      frame.as_choice_point(),
      Err(RuntimeError::StackRole { .. })
    ));

    let frame = StackFrame::ChoicePoint(ChoicePoint {
      saved_registers: vec![],
      environment: None,
      continuation: 0,
      next_clause: 0,
      trail_size: 0,
      heap_size: 0,
      previous: None,
    });
    assert!(frame.as_choice_point().is_ok());
    assert!(frame.as_environment().is_err());
  }
}
