/*!

  The database splicer and the machine's top-level entry points.

  Compiled clauses are registered under their functor/arity. A predicate's clauses form a
  try/retry/trust chain: the first clause is prefixed with `TryInitialClause`, clauses
  2..K−1 begin with `TryIntermediateClause`, and the final clause begins with
  `TrustFinalClause`. Adding a clause to an existing predicate therefore patches code in the
  middle of the program: a prologue is inserted or overwritten, the new clause's block is
  spliced in at the predicate's end, and every label, recorded clause address, and try-family
  operand sitting after an insertion point is relocated by the insertion size.

  Queries compile at the end of code memory and run immediately; facts and rules only extend
  the database.

*/

use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::compiler::{compile_program_clause, compile_query};
use crate::error::{Fault, RuntimeError};
use crate::functor::Functor;
use crate::instruction::Instruction;
use crate::machine::Machine;
use crate::source_location;
use crate::term::{Clause, Goal, Term};

/// A block of instructions containing the definition for each clause with a certain functor:
/// the address at which each clause begins, and the address just past the last clause.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FunctorClause {
  pub start_addresses : Vec<usize>,
  pub end_address     : usize,
}

impl FunctorClause {
  fn new(start_address: usize, end_address: usize) -> FunctorClause {
    FunctorClause {
      start_addresses: vec![start_address],
      end_address,
    }
  }
}

/// What interpreting one clause produced: a database extension, or a query's solution.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Interpreted {
  Extended,
  Solution(Vec<(DefaultAtom, String)>),
}

impl Machine {

  /// Interprets one top-level clause: facts and rules extend the database, queries execute.
  pub fn interpret(&mut self, clause: &Clause) -> Result<Interpreted, Fault> {
    match clause {

      Clause::Fact(head) => {
        self.extend_database(head, &[])?;
        Ok(Interpreted::Extended)
      }

      Clause::Rule { head, goals } => {
        self.extend_database(head, goals)?;
        Ok(Interpreted::Extended)
      }

      Clause::Query(goals) => {
        let solution = self.execute_query(goals)?;
        Ok(Interpreted::Solution(solution))
      }

    }
  }

  /// Compiles a fact or rule and splices it into the predicate's clause chain.
  pub fn extend_database(&mut self, head: &Term, goals: &[Goal]) -> Result<(), Fault> {
    let functor = head.functor().ok_or(RuntimeError::BadCell {
      expected: "a predicate at the clause head",
      found: head.to_string(),
      location: source_location!(),
    })?;

    if self.builtins.contains(&functor) {
      return Err(Fault::from(RuntimeError::RedeclaredBuiltin {
        functor,
        location: source_location!(),
      }));
    }

    let compiled = compile_program_clause(head, goals)?;

    #[cfg(feature = "trace_computation")]
    {
      println!("% Procedure {}", functor);
      for instruction in &compiled.code {
        println!("{:30}", format!("{}", instruction));
      }
    }

    self.splice_clause(functor, compiled.code);
    Ok(())
  }

  /**
    Compiles and runs a query. On success, returns the variable bindings captured by the
    query's epilogue. Either way, the machine is left with no choice point and an empty trail.
  */
  pub fn execute_query(&mut self, goals: &[Goal]) -> Result<Vec<(DefaultAtom, String)>, Fault> {
    let compiled = compile_query(goals)?;

    // Query code goes at the very end of code memory, so nothing needs relocating and the
    // epilogue's `Deallocate` runs the program counter off the end, halting the loop.
    let start = self.code.len();
    self.code.extend(compiled.code);
    self.insertion_address = self.code.len();

    self.query_bindings = compiled.bindings;
    self.last_solution.clear();

    self.reset_for_run();
    let result = self.run(start);
    self.cleanup_after_query();

    match result {
      Ok(())     => Ok(std::mem::take(&mut self.last_solution)),
      Err(fault) => Err(fault),
    }
  }

  // region Clause splicing

  /**
    Registers a compiled clause under `functor` and patches the predicate's try/retry/trust
    chain:

      * the first clause is installed as-is at the end of code memory;
      * the second clause inserts `TryInitialClause` in front of the first clause and appends
        itself behind a `TrustFinalClause` prologue;
      * later clauses overwrite the previous final clause's `TrustFinalClause` prologue with
        `TryIntermediateClause` pointing at the newcomer.
  */
  fn splice_clause(&mut self, functor: Functor, clause_code: Vec<Instruction>) {
    match self.functor_clauses.get(&functor).cloned() {

      None => {
        // First clause of this functor.
        let start = self.code.len();
        self.code.extend(clause_code);
        let end = self.code.len();

        self.labels.insert(functor.clone(), start);
        self.functor_clauses.insert(functor, FunctorClause::new(start, end));
        self.insertion_address = end;
      }

      Some(record) if record.start_addresses.len() == 1 => {
        // Second clause: the first clause gains a TryInitialClause prologue…
        let first_start = record.start_addresses[0];
        self.insert_code(first_start, vec![
          Instruction::TryInitialClause { alternative: 0 }
        ]);
        // The insertion shifted the extended functor's own records; its entry point stays put,
        // now naming the prologue.
        self.labels.insert(functor.clone(), first_start);

        // …and the new clause lands at the predicate's end behind a TrustFinalClause. The
        // record's end address already accounts for the prologue insertion.
        let new_start = self.functor_clauses[&functor].end_address;
        let mut block = vec![Instruction::TrustFinalClause];
        block.extend(clause_code);
        let block_len = block.len();
        self.insert_code(new_start, block);

        self.code[first_start] = Instruction::TryInitialClause { alternative: new_start };

        // The record was just matched on, so `unwrap()` is safe.
        let record = self.functor_clauses.get_mut(&functor).unwrap();
        record.start_addresses = vec![first_start, new_start];
        record.end_address = new_start + block_len;
        self.insertion_address = new_start + block_len;
      }

      Some(record) => {
        // Third and subsequent clauses: the previous final clause's TrustFinalClause prologue
        // becomes TryIntermediateClause pointing at the newcomer.
        // Every record holds at least one start address.
        let previous_start = *record.start_addresses.last().unwrap();
        let new_start = record.end_address;

        let mut block = vec![Instruction::TrustFinalClause];
        block.extend(clause_code);
        let block_len = block.len();
        self.insert_code(new_start, block);

        self.code[previous_start] =
          Instruction::TryIntermediateClause { alternative: new_start };

        // The record was just matched on, so `unwrap()` is safe.
        let record = self.functor_clauses.get_mut(&functor).unwrap();
        record.start_addresses.push(new_start);
        record.end_address = new_start + block_len;
        self.insertion_address = new_start + block_len;
      }

    }
  }

  /**
    Inserts `block` at code address `at`, relocating everything displaced by the insertion:
    try-family operands, label entries, recorded clause start addresses (at or after `at`), and
    recorded end addresses (strictly after `at`, since an end address is one past a clause's
    last instruction and insertion exactly at the end leaves that clause in place).
  */
  fn insert_code(&mut self, at: usize, block: Vec<Instruction>) {
    let delta = block.len();

    for instruction in self.code.iter_mut() {
      instruction.shift_target(at, delta);
    }

    let shifted: BiMap<Functor, usize> =
      self.labels
          .iter()
          .map(|(functor, address)| {
            match *address >= at {
              true  => (functor.clone(), address + delta),
              false => (functor.clone(), *address),
            }
          })
          .collect();
    self.labels = shifted;

    for record in self.functor_clauses.values_mut() {
      for start in record.start_addresses.iter_mut() {
        if *start >= at {
          *start += delta;
        }
      }
      if record.end_address > at {
        record.end_address += delta;
      }
    }

    if self.insertion_address >= at {
      self.insertion_address += delta;
    }

    self.code.splice(at..at, block);
  }

  // endregion

}
