/*!

  Epilog: an interpreter for a Prolog dialect.

  Programs are sets of facts and rules; execution unifies queries against the clause database
  under SLD resolution with backtracking. Clauses compile to instructions for an abstract
  machine in the Warren style (tagged heap cells, argument registers, environment and
  choice-point stacks, a trail), and new clauses are spliced into the running program's
  try/retry/trust chains.

  The driver surface is small: parse source text with [`parser::parse`], then feed each clause
  to [`machine::Machine::interpret`].

*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod address;
pub mod builtins;
pub mod cell;
pub mod chariter;
pub mod compiler;
pub mod current;
pub mod error;
pub mod exec;
pub mod frames;
pub mod functor;
pub mod instruction;
pub mod interpreter;
pub mod machine;
pub mod parser;
pub mod term;

pub use error::{Fault, ParseError, RuntimeError};
pub use interpreter::Interpreted;
pub use machine::Machine;
pub use term::{Clause, Goal, Modifier, Term};
