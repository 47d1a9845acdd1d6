/*!

  Structures and functions for the abstract machine that compiled clauses run on.

  The machine owns four memory stores (the heap, the temporary registers, the control stack of
  environments and choice points, and the trail) together with the code vector and the
  compile-time database records (label table and functor-clause records). All mutation happens
  either in the execute loop (`exec.rs`) or in compilation invoked between executions
  (`interpreter.rs`, `compiler/`); the two never interleave on one machine.

  This module holds the stores, the checked accessors, and the three primitive algorithms that
  everything else is built from: dereferencing, binding (with conditional trailing), and
  unification.

*/

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use bimap::BiMap;
use prettytable::{format as TableFormat, Table};
use string_cache::DefaultAtom;

use crate::address::Address;
use crate::cell::Cell;
use crate::error::{Fault, RuntimeError};
use crate::frames::{ChoicePoint, Environment, StackFrame};
use crate::functor::Functor;
use crate::instruction::Instruction;
use crate::interpreter::FunctorClause;
use crate::source_location;
use crate::term::Modifier;

/// In `Write` mode, new elements are built on the heap; in `Read` mode, existing elements are
/// matched against.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Mode{
  Read,
  Write
}

impl Display for Mode{
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self{
      Mode::Read  => write!(f, "Read"),
      Mode::Write => write!(f, "Write")
    }
  }
}

/**
  The frame `Call` pushes for a `\+` or `\:` goal. It snapshots enough machine state to restore
  the world as it was at call time, whichever way the modified goal turns out.
*/
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ModifierFrame {
  pub kind         : Modifier,
  /// The return address of the modified call; control reaching it means the goal succeeded.
  pub continuation : usize,
  pub environment  : Option<usize>,
  pub choice_point : Option<usize>,
  /// `control.len()` at call time, for discarding the goal's dead frames.
  pub stack_size   : usize,
}

pub struct Machine {

  // Flags
  pub(crate) mode : Mode, // In Write mode, new elements are built on the heap.

  // Memory Stores
  pub(crate) heap      : Vec<Cell>,       // The "global stack," a memory store
  pub(crate) registers : Vec<Cell>,       // Argument/temporary registers
  pub(crate) control   : Vec<StackFrame>, // Environments and choice points, one stack
  pub(crate) trail     : Vec<Address>,    // Bindings to undo on backtracking
  pub(crate) code      : Vec<Instruction>,

  // Machine registers / cursors
  pub(crate) pc               : usize,         // Next instruction to execute
  pub(crate) next_goal        : usize,         // Continuation after the current call
  pub(crate) cursor           : usize,         // Heap index of the next argument cell to unify
  pub(crate) num_args         : usize,         // Argument count of the current call
  pub(crate) top_environment  : Option<usize>, // Control-stack index of the active environment
  pub(crate) top_choice_point : Option<usize>, // Control-stack index of the youngest choice point
  pub(crate) modifiers        : Vec<ModifierFrame>,

  // Compile-time database
  pub(crate) labels            : BiMap<Functor, usize>,          // functor -> entry address
  pub(crate) functor_clauses   : HashMap<Functor, FunctorClause>,
  pub(crate) builtins          : HashSet<Functor>,               // reserved symbols
  pub(crate) insertion_address : usize,

  // Query bookkeeping
  pub(crate) query_bindings : Vec<(DefaultAtom, Address)>,
  pub(crate) last_solution  : Vec<(DefaultAtom, String)>,

}

impl Machine {

  // region Construction

  pub fn new() -> Machine {
    let mut machine = Machine {
      mode              :  Mode::Read, // Arbitrarily chosen.

      heap              :  vec![],
      registers         :  vec![],
      control           :  vec![],
      trail             :  vec![],
      code              :  vec![],

      pc                :  0,
      next_goal         :  0,
      cursor            :  0,
      num_args          :  0,
      top_environment   :  None,
      top_choice_point  :  None,
      modifiers         :  vec![],

      labels            :  BiMap::new(),
      functor_clauses   :  HashMap::new(),
      builtins          :  HashSet::new(),
      insertion_address :  0,

      query_bindings    :  vec![],
      last_solution     :  vec![],
    };

    machine.install_builtins();
    machine
  }

  // endregion

  // region Low-level utility methods

  /// Checked read of a heap cell.
  pub(crate) fn heap_at(&self, index: usize) -> Result<&Cell, RuntimeError> {
    self.heap.get(index).ok_or(RuntimeError::OutOfBounds {
      store: "HEAP",
      index,
      size: self.heap.len(),
      location: source_location!(),
    })
  }

  /// Checked read of a code cell.
  pub(crate) fn code_at(&self, index: usize) -> Result<&Instruction, RuntimeError> {
    self.code.get(index).ok_or(RuntimeError::OutOfBounds {
      store: "CODE",
      index,
      size: self.code.len(),
      location: source_location!(),
    })
  }

  /// The active environment frame.
  pub(crate) fn current_environment(&self) -> Result<&Environment, RuntimeError> {
    let index = self.top_environment.ok_or(RuntimeError::Underflow {
      operation: "environment access",
      missing: "environment",
      location: source_location!(),
    })?;
    self.frame_at(index)?.as_environment()
  }

  pub(crate) fn current_environment_mut(&mut self) -> Result<&mut Environment, RuntimeError> {
    let index = self.top_environment.ok_or(RuntimeError::Underflow {
      operation: "environment access",
      missing: "environment",
      location: source_location!(),
    })?;
    let size = self.control.len();
    self.control
        .get_mut(index)
        .ok_or(RuntimeError::OutOfBounds {
          store: "STACK",
          index,
          size,
          location: source_location!(),
        })?
        .as_environment_mut()
  }

  pub(crate) fn frame_at(&self, index: usize) -> Result<&StackFrame, RuntimeError> {
    self.control.get(index).ok_or(RuntimeError::OutOfBounds {
      store: "STACK",
      index,
      size: self.control.len(),
      location: source_location!(),
    })
  }

  pub(crate) fn choice_point_at(&self, index: usize) -> Result<&ChoicePoint, RuntimeError> {
    self.frame_at(index)?.as_choice_point()
  }

  /**
    Performs one step of `dereference`, what C programmers think of as dereferencing. The cell
    is cloned out of its store.
  */
  pub(crate) fn value_at(&self, ptr: &Address) -> Result<Cell, RuntimeError> {
    match ptr {

      Address::Heap(_) => Ok(self.heap_at(ptr.idx())?.clone()),

      Address::Register(_) => {
        self.registers
            .get(ptr.idx())
            .cloned()
            .ok_or(RuntimeError::OutOfBounds {
              store: "X",
              index: ptr.idx(),
              size: self.registers.len(),
              location: source_location!(),
            })
      }

      Address::Environment(_) => {
        let environment = self.current_environment()?;
        environment.slots
                   .get(ptr.idx())
                   .cloned()
                   .ok_or(RuntimeError::OutOfBounds {
                     store: "Y",
                     index: ptr.idx(),
                     size: environment.slots.len(),
                     location: source_location!(),
                   })
      }

      Address::Undefined => Err(RuntimeError::BadCell {
        expected: "a heap, register, or environment address",
        found: ptr.to_string(),
        location: source_location!(),
      }),

    }
  }

  /**
    Sets the value at the given address. The register vector grows on demand, since the compiler
    hands out register numbers freely; heap cells and environment slots must already exist.
  */
  pub(crate) fn set_value_at(&mut self, address: &Address, cell: &Cell)
    -> Result<(), RuntimeError>
  {
    match address {

      Address::Register(_)  => {
        if address.idx() >= self.registers.len() {
          self.registers.resize(address.idx() + 1, Cell::Empty);
        }
        self.registers[address.idx()] = cell.clone();
        Ok(())
      },

      Address::Heap(_) => {
        let size = self.heap.len();
        if address.idx() >= size {
          return Err(RuntimeError::OutOfBounds {
            store: "HEAP",
            index: address.idx(),
            size,
            location: source_location!(),
          });
        }
        self.heap[address.idx()] = cell.clone();
        Ok(())
      },

      Address::Environment(_) => {
        let index = address.idx();
        let environment = self.current_environment_mut()?;
        let size = environment.slots.len();
        if index >= size {
          return Err(RuntimeError::OutOfBounds {
            store: "Y",
            index,
            size,
            location: source_location!(),
          });
        }
        environment.slots[index] = cell.clone();
        Ok(())
      }

      Address::Undefined => Err(RuntimeError::BadCell {
        expected: "a heap, register, or environment address",
        found: address.to_string(),
        location: source_location!(),
      }),

    }
  }

  /// Extracts the functor from either `Cell::Functor` or `Cell::Str` values, dereferencing
  /// through `Str` indirection.
  pub(crate) fn extract_functor(&self, address: &Address) -> Result<Option<Functor>, RuntimeError> {
    match self.value_at(address)? {

      Cell::Functor(functor)   => Ok(Some(functor)),
      Cell::Str(inner_address) => self.extract_functor(&inner_address),
      _                        => Ok(None)

    }
  }

  /// Reads the functor cell a `Cell::Str` points at.
  pub(crate) fn functor_at(&self, address: &Address) -> Result<Functor, RuntimeError> {
    match self.value_at(address)? {
      Cell::Functor(functor) => Ok(functor),
      found => Err(RuntimeError::BadCell {
        expected: "a functor cell",
        found: found.to_string(),
        location: source_location!(),
      }),
    }
  }

  // endregion

  // region Dereferencing, binding, trailing, and unification

  /// Dereference a chain of references. Returns either the address of a variable (a
  /// self-reference) or the address of a non-reference cell.
  pub fn dereference(&self, ptr: &Address) -> Result<Address, RuntimeError> {
    let cell = self.value_at(ptr)?;
    match cell {
      // Do not dereference variables, which reference themselves.
      Cell::Ref(a) if a != *ptr => self.dereference(&a),
      _                         => Ok(*ptr),
    }
  }

  /**
    Records the overwritten address on the trail when the binding must be undone on
    backtracking: a choice point exists, and the address is either an environment slot or a heap
    cell below the choice point's recorded heap size. Bindings younger than the choice point are
    discarded wholesale by heap truncation and need no trail entry.
  */
  pub(crate) fn trail_push(&mut self, address: &Address) -> Result<(), RuntimeError> {
    if let Some(b) = self.top_choice_point {
      let heap_mark = self.choice_point_at(b)?.heap_size;
      let must_record = match address {
        Address::Environment(_) => true,
        Address::Heap(i)        => *i < heap_mark,
        _                       => false,
      };
      if must_record {
        self.trail.push(*address);
      }
    }
    Ok(())
  }

  /// Undoes every binding recorded at trail index `from` or later, restoring each address to an
  /// unbound variable, then truncates the trail to `from`.
  pub(crate) fn unwind_trail(&mut self, from: usize) -> Result<(), RuntimeError> {
    for i in from..self.trail.len() {
      let address = self.trail[i];
      #[cfg(feature = "trace_computation")] println!("unwind({})", address);
      self.set_value_at(&address, &Cell::Ref(address))?;
    }
    self.trail.truncate(from);
    Ok(())
  }

  /// The cell to store when binding a variable to `target`: a reference for heap targets, a
  /// copy for cells living in volatile register or slot storage.
  fn link_cell(&self, target: &Address, target_cell: &Cell) -> Cell {
    match target.is_heap() {
      true  => Cell::Ref(*target),
      false => target_cell.clone(),
    }
  }

  /**
    Binds an unbound variable at one address to the other address. Both must already be
    dereferenced. When both sides are unbound heap variables, the one at the lower index is
    bound to the other; the overwritten address is trailed per `trail_push`.
  */
  pub(crate) fn bind(&mut self, address1: &Address, address2: &Address) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")] print!("bind({}, {}): ", address1, address2);

    let cell1 = self.value_at(address1)?;
    let cell2 = self.value_at(address2)?;

    let unbound1 = cell1.is_unbound_at(address1);
    let unbound2 = cell2.is_unbound_at(address2);

    match (unbound1, unbound2) {

      (true, true) => {
        // Two unbound variables; self-references only live on the heap.
        if address1.idx() <= address2.idx() {
          #[cfg(feature = "trace_computation")] println!("binding {} to {}", address1, address2);
          self.set_value_at(address1, &Cell::Ref(*address2))?;
          self.trail_push(address1)?;
        } else {
          #[cfg(feature = "trace_computation")] println!("binding {} to {}", address2, address1);
          self.set_value_at(address2, &Cell::Ref(*address1))?;
          self.trail_push(address2)?;
        }
        Ok(())
      }

      (true, false) => {
        #[cfg(feature = "trace_computation")] println!("binding {} to {}", address1, address2);
        let cell = self.link_cell(address2, &cell2);
        self.set_value_at(address1, &cell)?;
        self.trail_push(address1)?;
        Ok(())
      }

      (false, true) => {
        #[cfg(feature = "trace_computation")] println!("binding {} to {}", address2, address1);
        let cell = self.link_cell(address1, &cell1);
        self.set_value_at(address2, &cell)?;
        self.trail_push(address2)?;
        Ok(())
      }

      (false, false) => {
        // Neither cell is a variable, an error state.
        Err(Fault::from(RuntimeError::BadCell {
          expected: "an unbound variable on one side of bind",
          found: format!("{} and {}", cell1, cell2),
          location: source_location!(),
        }))
      }

    }
  }

  /**
    The standard iterative unification algorithm with an explicit pushdown. Mismatched functors
    and unequal integers are recoverable unification failures; encountering a cell that is not a
    term at all is fatal.
  */
  pub fn unify(&mut self, a1: &Address, a2: &Address) -> Result<(), Fault> {
    let mut pdl: Vec<(Address, Address)> = vec![(*a1, *a2)];

    while let Some((t1, t2)) = pdl.pop() {
      let d1 = self.dereference(&t1)?;
      let d2 = self.dereference(&t2)?;
      if d1 == d2 {
        continue;
      }

      let c1 = self.value_at(&d1)?;
      let c2 = self.value_at(&d2)?;

      match (&c1, &c2) {

        | (Cell::Ref(_),      _      )
        | (      _     , Cell::Ref(_)) => {
          // At least one of `d1` and `d2` is an unbound variable, since dereferencing stops on
          // non-references and self-references only.
          self.bind(&d1, &d2)?;
        }

        (Cell::Str(f1), Cell::Str(f2)) => {
          let functor1 = self.functor_at(f1)?;
          let functor2 = self.functor_at(f2)?;
          if functor1 != functor2 {
            return Err(Fault::unification());
          }
          for n in 1..=functor1.arity {
            pdl.push((
              Address::from_heap_idx(f1.idx() + n),
              Address::from_heap_idx(f2.idx() + n),
            ));
          }
        }

        (Cell::Integer(m), Cell::Integer(n)) => {
          if m != n {
            return Err(Fault::unification());
          }
        }

        | (Cell::Str(_),     Cell::Integer(_))
        | (Cell::Integer(_), Cell::Str(_)    ) => {
          return Err(Fault::unification());
        }

        _ => {
          // A functor or empty cell reached unification, an error state.
          return Err(Fault::from(RuntimeError::BadCell {
            expected: "term cells in unification",
            found: format!("{} and {}", c1, c2),
            location: source_location!(),
          }));
        }

      }
    }

    Ok(())
  }

  // endregion

  // region Query bookkeeping

  /// Prepares the machine registers for a fresh run. The continuation is parked one past the
  /// end of code, which is where the execute loop halts.
  pub(crate) fn reset_for_run(&mut self) {
    self.mode = Mode::Read;
    self.cursor = 0;
    self.num_args = 0;
    self.next_goal = self.code.len();
    self.registers.clear();
    self.control.clear();
    self.trail.clear();
    self.modifiers.clear();
    self.top_environment = None;
    self.top_choice_point = None;
  }

  /// After a top-level query completes, in success or failure, no choice point remains and
  /// the trail is empty.
  pub(crate) fn cleanup_after_query(&mut self) {
    self.control.clear();
    self.trail.clear();
    self.modifiers.clear();
    self.top_environment = None;
    self.top_choice_point = None;
  }

  // endregion

  // region Display methods

  fn make_register_table<T> (
      name      : &str,
      registers : &[T],
      highlight : usize,
      start     : usize
    ) -> Table
    where T: Display
  {

    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (i, cell) in registers.iter().enumerate() {
      match i == highlight{

        true  => {
          table.add_row(
            row![r->format!("* --> {}[{}] =", name, i+start), format!("{}", cell)]
          );
        }

        false => {
          table.add_row(
            row![r->format!("{}[{}] =", name, i+start), format!("{}", cell)]
          );
        }

      } // end match on highlight
    } // end for
    table
  }

  // endregion

}

impl Default for Machine {
  fn default() -> Self {
    Machine::new()
  }
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {

  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let h_table = Machine::make_register_table("HEAP", &self.heap, self.cursor, 0);
    let x_table = Machine::make_register_table("X", &self.registers, usize::MAX, 1);
    let s_table = Machine::make_register_table("STACK", &self.control, usize::MAX, 0);

    let mut combined_table = table!([h_table, x_table, s_table]);

    combined_table.set_titles(row![ub->"Heap", ub->"Registers", ub->"Control Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(f, "Mode: {}\nPC: {}  CONT: {}  ARGS: {}\n{}",
           self.mode, self.pc, self.next_goal, self.num_args, combined_table)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  /// A machine with a hand-built heap for exercising the primitive algorithms.
  fn machine_with_heap(heap: Vec<Cell>) -> Machine {
    let mut machine = Machine::new();
    machine.heap = heap;
    machine
  }

  #[test]
  fn dereference_follows_chains(){
    //  0: REF 1   1: REF 2   2: REF 2 (unbound)
    let machine = machine_with_heap(vec![
      Cell::Ref(Address::Heap(1)),
      Cell::Ref(Address::Heap(2)),
      Cell::Ref(Address::Heap(2)),
    ]);
    let result = machine.dereference(&Address::Heap(0)).unwrap();
    assert_eq!(result, Address::Heap(2));
  }

  #[test]
  fn dereference_is_idempotent(){
    let machine = machine_with_heap(vec![
      Cell::Ref(Address::Heap(1)),
      Cell::Ref(Address::Heap(2)),
      Cell::Integer(5),
    ]);
    let once = machine.dereference(&Address::Heap(0)).unwrap();
    let twice = machine.dereference(&once).unwrap();
    assert_eq!(once, twice);
  }

  #[test]
  fn dereference_stops_at_non_references(){
    let machine = machine_with_heap(vec![Cell::Integer(42)]);
    assert_eq!(machine.dereference(&Address::Heap(0)).unwrap(), Address::Heap(0));
  }

  #[test]
  fn bind_prefers_the_lower_heap_index(){
    let mut machine = machine_with_heap(vec![
      Cell::Ref(Address::Heap(0)),
      Cell::Ref(Address::Heap(1)),
    ]);
    machine.bind(&Address::Heap(0), &Address::Heap(1)).unwrap();
    assert_eq!(machine.heap[0], Cell::Ref(Address::Heap(1)));
    assert_eq!(machine.heap[1], Cell::Ref(Address::Heap(1)));
  }

  #[test]
  fn bind_without_a_variable_is_fatal(){
    let mut machine = machine_with_heap(vec![
      Cell::Integer(1),
      Cell::Integer(2),
    ]);
    let result = machine.bind(&Address::Heap(0), &Address::Heap(1));
    assert!(matches!(result, Err(Fault::Error(_))));
  }

  #[test]
  fn unify_equal_integers(){
    let mut machine = machine_with_heap(vec![
      Cell::Integer(3),
      Cell::Integer(3),
    ]);
    assert!(machine.unify(&Address::Heap(0), &Address::Heap(1)).is_ok());
  }

  #[test]
  fn unify_unequal_integers_fails(){
    let mut machine = machine_with_heap(vec![
      Cell::Integer(3),
      Cell::Integer(4),
    ]);
    let result = machine.unify(&Address::Heap(0), &Address::Heap(1));
    assert_eq!(result, Err(Fault::unification()));
  }

  #[test]
  fn unify_binds_a_variable_to_an_integer(){
    let mut machine = machine_with_heap(vec![
      Cell::Ref(Address::Heap(0)),
      Cell::Integer(9),
    ]);
    machine.unify(&Address::Heap(0), &Address::Heap(1)).unwrap();
    let derefed = machine.dereference(&Address::Heap(0)).unwrap();
    assert_eq!(machine.value_at(&derefed).unwrap(), Cell::Integer(9));
  }

  #[test]
  fn unify_matching_structures(){
    // f(X) at 0, f(3) at 4
    let mut machine = machine_with_heap(vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(Functor::new("f", 1)),
      Cell::Ref(Address::Heap(2)),      // X
      Cell::Integer(99),                // unrelated
      Cell::Str(Address::Heap(5)),
      Cell::Functor(Functor::new("f", 1)),
      Cell::Integer(3),
    ]);
    machine.unify(&Address::Heap(0), &Address::Heap(4)).unwrap();
    // X is now bound to 3.
    let x = machine.dereference(&Address::Heap(2)).unwrap();
    assert_eq!(machine.value_at(&x).unwrap(), Cell::Integer(3));
  }

  #[test]
  fn unify_mismatched_functors_fails(){
    let mut machine = machine_with_heap(vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(Functor::new("f", 1)),
      Cell::Integer(1),
      Cell::Str(Address::Heap(4)),
      Cell::Functor(Functor::new("g", 1)),
      Cell::Integer(1),
    ]);
    let result = machine.unify(&Address::Heap(0), &Address::Heap(3));
    assert_eq!(result, Err(Fault::unification()));
  }

  #[test]
  fn unify_is_symmetric(){
    let build = || machine_with_heap(vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(Functor::new("f", 1)),
      Cell::Ref(Address::Heap(2)),
      Cell::Str(Address::Heap(4)),
      Cell::Functor(Functor::new("f", 1)),
      Cell::Integer(3),
    ]);
    let forward = build().unify(&Address::Heap(0), &Address::Heap(3)).is_ok();
    let backward = build().unify(&Address::Heap(3), &Address::Heap(0)).is_ok();
    assert_eq!(forward, backward);

    let build_mismatch = || machine_with_heap(vec![
      Cell::Integer(1),
      Cell::Integer(2),
    ]);
    let forward = build_mismatch().unify(&Address::Heap(0), &Address::Heap(1)).is_ok();
    let backward = build_mismatch().unify(&Address::Heap(1), &Address::Heap(0)).is_ok();
    assert_eq!(forward, backward);
  }

  #[test]
  fn structure_integer_pairs_fail(){
    let mut machine = machine_with_heap(vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(Functor::atom("a")),
      Cell::Integer(1),
    ]);
    let result = machine.unify(&Address::Heap(0), &Address::Heap(2));
    assert_eq!(result, Err(Fault::unification()));
  }

  #[test]
  fn out_of_bounds_heap_access_is_fatal(){
    let machine = machine_with_heap(vec![]);
    let result = machine.value_at(&Address::Heap(3));
    assert!(matches!(result, Err(RuntimeError::OutOfBounds { .. })));
  }

  #[test]
  fn registers_grow_on_write(){
    let mut machine = Machine::new();
    machine.set_value_at(&Address::Register(5), &Cell::Integer(1)).unwrap();
    assert_eq!(machine.registers.len(), 5);
    assert_eq!(machine.value_at(&Address::Register(5)).unwrap(), Cell::Integer(1));
    // The cells in between were filled so they can be written out of order.
    assert_eq!(machine.value_at(&Address::Register(1)).unwrap(), Cell::Empty);
  }

  #[test]
  fn trailing_requires_a_choice_point(){
    let mut machine = machine_with_heap(vec![
      Cell::Ref(Address::Heap(0)),
      Cell::Integer(7),
    ]);
    // No choice point: the binding is not recorded.
    machine.bind(&Address::Heap(0), &Address::Heap(1)).unwrap();
    assert!(machine.trail.is_empty());
  }

  #[test]
  fn trailing_records_bindings_below_the_heap_mark(){
    let mut machine = machine_with_heap(vec![
      Cell::Ref(Address::Heap(0)),
      Cell::Integer(7),
    ]);
    machine.control.push(StackFrame::ChoicePoint(ChoicePoint {
      saved_registers: vec![],
      environment: None,
      continuation: 0,
      next_clause: 0,
      trail_size: 0,
      heap_size: 2,
      previous: None,
    }));
    machine.top_choice_point = Some(0);

    machine.bind(&Address::Heap(0), &Address::Heap(1)).unwrap();
    assert_eq!(machine.trail, vec![Address::Heap(0)]);

    // Unwinding restores the self-reference.
    machine.unwind_trail(0).unwrap();
    assert!(machine.trail.is_empty());
    assert_eq!(machine.heap[0], Cell::Ref(Address::Heap(0)));
  }

  #[test]
  fn bindings_above_the_heap_mark_are_not_trailed(){
    let mut machine = machine_with_heap(vec![Cell::Integer(7)]);
    machine.control.push(StackFrame::ChoicePoint(ChoicePoint {
      saved_registers: vec![],
      environment: None,
      continuation: 0,
      next_clause: 0,
      trail_size: 0,
      heap_size: 1,
      previous: None,
    }));
    machine.top_choice_point = Some(0);

    // A variable created after the choice point is reclaimed by truncation, not the trail.
    machine.heap.push(Cell::Ref(Address::Heap(1)));
    machine.bind(&Address::Heap(1), &Address::Heap(0)).unwrap();
    assert!(machine.trail.is_empty());
  }
}
