//! The clause compiler: variable classification, the allocation tree, and instruction
//! emission.

mod allocation;
mod compile;
mod variables;

pub use compile::{compile_program_clause, compile_query, CompiledClause};
pub use variables::{Variable, Variables};
