/*!

  Representation of the machine's instructions.

  Each instruction carries its operands inline; none share mutable state. The execute loop
  dispatches on the variant with a single central `match`. Instruction addresses are plain
  indices into the code vector, which is what lets the database splicer insert new clauses into
  the middle of the program: every address stored elsewhere is routed through the relocation
  pass, and `shift_target` is how an instruction's own code operand participates in it.

*/

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;
use strum_macros::{EnumDiscriminants, Display as StrumDisplay, IntoStaticStr};

use crate::address::Address;
use crate::functor::Functor;
use crate::term::Modifier;

#[derive(
  EnumDiscriminants,
  Clone,             Eq,               PartialEq,
  Debug,             Hash,
)]
#[strum_discriminants(derive(IntoStaticStr, StrumDisplay, Hash))]
#[strum_discriminants(name(Opcode))]
pub enum Instruction {

  // Head-side ("get") instructions, used when matching a clause head against
  // caller-supplied arguments. //

  /// get_structure( f/n, address )
  GetStructure {
    functor  : Functor,
    register : Address,
  },
  /// get_integer( n, address )
  GetInteger {
    value    : i64,
    register : Address,
  },
  /// get_variable( address, argument )
  GetVariable {
    register : Address,
    argument : Address,
  },
  /// get_value( address, argument )
  GetValue {
    register : Address,
    argument : Address,
  },
  /// unify_variable( address )
  UnifyVariable {
    register : Address,
  },
  /// unify_value( address )
  UnifyValue {
    register : Address,
  },

  // Body-side ("put") instructions, used when constructing arguments for a call. //

  /// put_structure( f/n, address )
  PutStructure {
    functor  : Functor,
    register : Address,
  },
  /// put_integer( n, address )
  PutInteger {
    value    : i64,
    register : Address,
  },
  /// put_variable( address, argument )
  PutVariable {
    register : Address,
    argument : Address,
  },
  /// put_value( address, argument )
  PutValue {
    register : Address,
    argument : Address,
  },
  /// set_variable( address )
  SetVariable {
    register : Address,
  },
  /// set_value( address )
  SetValue {
    register : Address,
  },

  // Control instructions //

  /// call( f/n ), with the goal's call modifier
  Call {
    functor  : Functor,
    modifier : Modifier,
  },
  /// proceed
  Proceed,
  /// allocate( n )
  Allocate {
    slots : usize,
  },
  /// deallocate
  Deallocate,
  /// try_initial_clause( alternative ): push a choice point whose next clause is `alternative`
  TryInitialClause {
    alternative : usize,
  },
  /// try_intermediate_clause( alternative ): restore from the current choice point and point
  /// it at `alternative`
  TryIntermediateClause {
    alternative : usize,
  },
  /// trust_final_clause: restore from the current choice point and pop it
  TrustFinalClause,
  /// command( name ): invoke a host-side routine by name
  Command {
    name : DefaultAtom,
  },

}

impl Instruction {

  pub fn opcode(&self) -> Opcode {
    Opcode::from(self)
  }

  /// True for the try/retry/trust family, the only instructions that carry a code address.
  pub fn is_try_family(&self) -> bool {
    matches!(
      self,
      | Instruction::TryInitialClause { .. }
      | Instruction::TryIntermediateClause { .. }
      | Instruction::TrustFinalClause
    )
  }

  /**
    Shifts the instruction's code-address operand, if it has one, by `delta` when the operand is
    at or after `at`. This is the instruction's share of the relocation pass that runs after the
    database splicer inserts code into the middle of the program.
  */
  pub fn shift_target(&mut self, at: usize, delta: usize) {
    match self {

      | Instruction::TryInitialClause { alternative }
      | Instruction::TryIntermediateClause { alternative } => {
        if *alternative >= at {
          *alternative += delta;
        }
      }

      _ => {}

    }
  }

}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self{

      Instruction::GetStructure { functor, register } => {
        write!(f, "GetStructure({}, {})", functor, register)
      }

      Instruction::GetInteger { value, register } => {
        write!(f, "GetInteger({}, {})", value, register)
      }

      Instruction::GetVariable { register, argument } => {
        write!(f, "GetVariable({}, {})", register, argument)
      }

      Instruction::GetValue { register, argument } => {
        write!(f, "GetValue({}, {})", register, argument)
      }

      Instruction::UnifyVariable { register } => {
        write!(f, "UnifyVariable({})", register)
      }

      Instruction::UnifyValue { register } => {
        write!(f, "UnifyValue({})", register)
      }

      Instruction::PutStructure { functor, register } => {
        write!(f, "PutStructure({}, {})", functor, register)
      }

      Instruction::PutInteger { value, register } => {
        write!(f, "PutInteger({}, {})", value, register)
      }

      Instruction::PutVariable { register, argument } => {
        write!(f, "PutVariable({}, {})", register, argument)
      }

      Instruction::PutValue { register, argument } => {
        write!(f, "PutValue({}, {})", register, argument)
      }

      Instruction::SetVariable { register } => {
        write!(f, "SetVariable({})", register)
      }

      Instruction::SetValue { register } => {
        write!(f, "SetValue({})", register)
      }

      Instruction::Call { functor, modifier } => {
        match modifier {
          Modifier::None => write!(f, "Call({})", functor),
          _              => write!(f, "Call({}{})", modifier, functor),
        }
      }

      Instruction::Proceed => {
        write!(f, "Proceed")
      }

      Instruction::Allocate { slots } => {
        write!(f, "Allocate({})", slots)
      }

      Instruction::Deallocate => {
        write!(f, "Deallocate")
      }

      Instruction::TryInitialClause { alternative } => {
        write!(f, "TryInitialClause(CODE[{}])", alternative)
      }

      Instruction::TryIntermediateClause { alternative } => {
        write!(f, "TryIntermediateClause(CODE[{}])", alternative)
      }

      Instruction::TrustFinalClause => {
        write!(f, "TrustFinalClause")
      }

      Instruction::Command { name } => {
        write!(f, "Command({})", name)
      }

    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_forms(){
    let instruction = Instruction::GetStructure {
      functor: Functor::new("h", 2),
      register: Address::Register(3),
    };
    assert_eq!(format!("{}", instruction), "GetStructure(h/2, X[3])");

    let instruction = Instruction::Call {
      functor: Functor::new("p", 1),
      modifier: Modifier::Negate,
    };
    assert_eq!(format!("{}", instruction), "Call(\\+ p/1)");
  }

  #[test]
  fn opcode_discriminants(){
    let instruction = Instruction::Proceed;
    assert_eq!(instruction.opcode(), Opcode::Proceed);
    assert_eq!(format!("{}", instruction.opcode()), "Proceed");
  }

  #[test]
  fn try_family(){
    assert!(Instruction::TrustFinalClause.is_try_family());
    assert!(Instruction::TryInitialClause { alternative: 4 }.is_try_family());
    assert!(!Instruction::Proceed.is_try_family());
  }

  #[test]
  fn shift_targets_at_or_after_the_insertion_point(){
    let mut instruction = Instruction::TryIntermediateClause { alternative: 10 };
    instruction.shift_target(11, 5);
    assert_eq!(instruction, Instruction::TryIntermediateClause { alternative: 10 });
    instruction.shift_target(10, 5);
    assert_eq!(instruction, Instruction::TryIntermediateClause { alternative: 15 });
    instruction.shift_target(3, 2);
    assert_eq!(instruction, Instruction::TryIntermediateClause { alternative: 17 });
  }
}
