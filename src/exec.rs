/*!

  The execute loop: fetch, dispatch, and the per-instruction semantics, including choice-point
  creation and restoration and the handling of `\+`/`\:` call modifiers.

  Every instruction advances the program counter itself; the loop pre-increments and the control
  instructions overwrite. Unification failure inside an instruction surfaces as a recoverable
  `Fault`; the loop hands it to `backtrack`, which either resumes at the youngest choice point's
  next clause or rethrows the failure to the driver.

*/

use crate::address::Address;
use crate::cell::Cell;
use crate::error::{Fault, RuntimeError};
use crate::frames::{ChoicePoint, Environment, StackFrame};
use crate::functor::Functor;
use crate::instruction::Instruction;
use crate::machine::{Machine, Mode, ModifierFrame};
use crate::source_location;
use crate::term::Modifier;

impl Machine {

  // region VM control methods

  /**
    Begin execution of the code starting at address `start`, running until the program counter
    passes the end of code memory. Returns `Ok(())` on completion; a leftover unification
    failure means no choice point could recover and the query has failed.
  */
  pub fn run(&mut self, start: usize) -> Result<(), Fault> {
    self.pc = start;

    loop {
      if self.pc >= self.code.len() {
        return Ok(());
      }

      let instruction = self.code_at(self.pc)?.clone();
      // The program counter is incremented before the instruction executes, so that the
      // instruction has an opportunity to change control flow.
      self.pc += 1;

      #[cfg(feature = "trace_computation")]
      println!("{:>4}:  {}", self.pc - 1, instruction);

      match self.execute(&instruction) {

        Ok(()) => {}

        Err(Fault::Unification { forceful }) => {
          self.backtrack(forceful)?;
        }

        Err(fatal) => {
          return Err(fatal);
        }

      }

      #[cfg(feature = "trace_computation")]
      println!("{}", self);
    }
  }

  /// Executes a single instruction, adjusting `pc` and other state as appropriate to the
  /// instruction.
  pub(crate) fn execute(&mut self, instruction: &Instruction) -> Result<(), Fault> {
    match instruction {

      Instruction::GetStructure { functor, register } => self.get_structure(functor, register),
      Instruction::GetInteger { value, register }     => self.get_integer(*value, register),
      Instruction::GetVariable { register, argument } => self.get_variable(register, argument),
      Instruction::GetValue { register, argument }    => self.get_value(register, argument),
      Instruction::UnifyVariable { register }         => self.unify_variable(register),
      Instruction::UnifyValue { register }            => self.unify_value(register),

      Instruction::PutStructure { functor, register } => self.put_structure(functor, register),
      Instruction::PutInteger { value, register }     => self.put_integer(*value, register),
      Instruction::PutVariable { register, argument } => self.put_variable(register, argument),
      Instruction::PutValue { register, argument }    => self.put_value(register, argument),
      Instruction::SetVariable { register }           => self.set_variable(register),
      Instruction::SetValue { register }              => self.set_value(register),

      Instruction::Call { functor, modifier }         => self.call(functor, *modifier),
      Instruction::Proceed                            => self.proceed(),
      Instruction::Allocate { slots }                 => self.allocate(*slots),
      Instruction::Deallocate                         => self.deallocate(),

      Instruction::TryInitialClause { alternative }       => self.try_initial_clause(*alternative),
      Instruction::TryIntermediateClause { alternative }  => self.try_intermediate_clause(*alternative),
      Instruction::TrustFinalClause                       => self.trust_final_clause(),

      Instruction::Command { name }                   => self.host_command(name),

    }
  }

  /**
    Recovers from a unification failure.

    An ordinary failure first checks whether the youngest `\+`/`\:` modifier frame has no
    alternatives left inside its goal; in that case the modifier absorbs the failure and
    control resumes after the modified call. Otherwise control transfers to the youngest choice
    point's next clause, and if none exists the failure is rethrown to the driver.

    A *forceful* failure is the success signal of a modified goal escaping that goal's local
    choice-point scope: the frame's snapshots are restored and the goal's intermediate frames
    discarded. For `negate`, success of the goal means failure of the call, so recovery
    continues as an ordinary failure; for `intercept`, control simply resumes after the call.
  */
  pub(crate) fn backtrack(&mut self, forceful: bool) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")]
    println!("backtrack(forceful: {})", forceful);

    if forceful {
      let frame = self.modifiers.pop().ok_or(RuntimeError::Underflow {
        operation: "a forceful failure",
        missing: "modifier frame",
        location: source_location!(),
      })?;

      self.top_environment  = frame.environment;
      self.top_choice_point = frame.choice_point;
      self.control.truncate(frame.stack_size);

      if frame.kind == Modifier::Intercept {
        // The goal succeeded and the intercept keeps its first solution.
        self.pc = frame.continuation;
        return Ok(());
      }
      // Negation: the goal succeeded, so the negated call fails. Fall through to the ordinary
      // failure handling below.
    }

    let absorbed = matches!(
      self.modifiers.last(),
      Some(frame) if frame.choice_point == self.top_choice_point
    );
    if absorbed {
      // The modified goal is out of alternatives: it cannot be proved, so the modified call
      // succeeds.
      if let Some(frame) = self.modifiers.pop() {
        self.top_environment = frame.environment;
        self.control.truncate(frame.stack_size);
        self.pc = frame.continuation;
      }
      return Ok(());
    }

    match self.top_choice_point {
      Some(b) => {
        self.pc = self.choice_point_at(b)?.next_clause;
        Ok(())
      }
      None => Err(Fault::unification()),
    }
  }

  /// Restores machine state from the choice point at control-stack index `b`: argument
  /// registers, environment, continuation, heap and trail sizes. Frames above the choice point
  /// are discarded.
  fn restore_from_choice_point(&mut self, b: usize) -> Result<(), Fault> {
    let choice_point = self.choice_point_at(b)?.clone();

    for (i, cell) in choice_point.saved_registers.iter().enumerate() {
      self.set_value_at(&Address::from_reg_idx(i), cell)?;
    }
    self.num_args        = choice_point.saved_registers.len();
    self.top_environment = choice_point.environment;
    self.next_goal       = choice_point.continuation;

    self.unwind_trail(choice_point.trail_size)?;
    self.heap.truncate(choice_point.heap_size);
    self.control.truncate(b + 1);

    Ok(())
  }

  // endregion

  // region Head-side instruction methods

  /// Either matches a functor, binds a variable to a new functor structure, or fails.
  fn get_structure(&mut self, functor: &Functor, register: &Address) -> Result<(), Fault> {
    register.require_variable();

    let address = self.dereference(register)?;
    let cell    = self.value_at(&address)?;

    match cell {

      Cell::Ref(target) if target == address => {
        // A variable. Create the functor structure on the heap, bind the variable to it, and
        // continue in write mode.
        #[cfg(feature = "trace_computation")]
        println!("GetStructure({}, {}): creating structure", functor, register);

        let structure_idx = self.heap.len();
        self.heap.push(Cell::Str(Address::from_heap_idx(structure_idx + 1)));
        self.heap.push(Cell::Functor(functor.clone()));
        self.mode = Mode::Write;
        self.bind(&address, &Address::from_heap_idx(structure_idx))
      }

      Cell::Str(functor_address) => {
        // A pointer to a functor.
        if self.functor_at(&functor_address)? == *functor {
          #[cfg(feature = "trace_computation")]
          println!("GetStructure({}, {}): functor already on the heap", functor, register);

          self.cursor = functor_address.idx() + 1;
          self.mode   = Mode::Read;
          Ok(())
        } else {
          Err(Fault::unification())
        }
      }

      _cell => {
        #[cfg(feature = "trace_computation")]
        println!("GetStructure({}, {}): neither REF nor STR: {}", functor, register, _cell);
        Err(Fault::unification())
      }

    }
  }

  /// The integer mirror of `get_structure`: match an integer cell, bind a variable to a fresh
  /// one, or fail.
  fn get_integer(&mut self, value: i64, register: &Address) -> Result<(), Fault> {
    register.require_variable();

    let address = self.dereference(register)?;
    let cell    = self.value_at(&address)?;

    match cell {

      Cell::Ref(target) if target == address => {
        let integer_idx = self.heap.len();
        self.heap.push(Cell::Integer(value));
        self.bind(&address, &Address::from_heap_idx(integer_idx))
      }

      Cell::Integer(found) if found == value => Ok(()),

      _ => Err(Fault::unification()),

    }
  }

  /// get_variable Xn/Yn, Ai: sets the register or slot to the value of argument register Ai.
  fn get_variable(&mut self, register: &Address, argument: &Address) -> Result<(), Fault> {
    register.require_variable();
    argument.require_register();
    #[cfg(feature = "trace_computation")] println!("GetVariable({}, {})", register, argument);

    let cell = self.value_at(argument)?;
    self.set_value_at(register, &cell)?;
    Ok(())
  }

  /// get_value Xn/Yn, Ai: unifies the register or slot with argument register Ai.
  fn get_value(&mut self, register: &Address, argument: &Address) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")] println!("GetValue({}, {})", register, argument);

    self.unify(register, argument)
  }

  /// Either reads the argument cell at the cursor into the register (read mode) or pushes a
  /// fresh unbound variable aliased to the register (write mode). Advances the cursor.
  fn unify_variable(&mut self, register: &Address) -> Result<(), Fault> {
    register.require_variable();

    match self.mode {

      Mode::Read => {
        #[cfg(feature = "trace_computation")]
        println!("UnifyVariable({}):  {} <- HEAP[S={}]", register, register, self.cursor);

        let cell = self.heap_at(self.cursor)?.clone();
        self.set_value_at(register, &cell)?;
      }

      Mode::Write => {
        #[cfg(feature = "trace_computation")] print!("UnifyVariable({}):  ", register);
        self.push_fresh_variable(register)?;
      }

    } // end match mode

    self.cursor += 1;
    Ok(())
  }

  /// Either unifies the register with the argument cell at the cursor (read mode) or pushes a
  /// copy of the register's cell (write mode). Advances the cursor.
  fn unify_value(&mut self, register: &Address) -> Result<(), Fault> {
    register.require_variable();

    match self.mode {

      Mode::Read => {
        #[cfg(feature = "trace_computation")] println!("UnifyValue({}):  unifying", register);
        let cursor_address = Address::from_heap_idx(self.cursor);
        self.unify(register, &cursor_address)?;
      }

      Mode::Write => {
        #[cfg(feature = "trace_computation")] print!("UnifyValue({}):  ", register);
        let cell = self.value_at(register)?;
        self.heap.push(cell);
      }

    }

    self.cursor += 1;
    Ok(())
  }

  // endregion

  // region Body-side instruction methods

  /// Push a new `STR` (and adjoining functor) cell onto the heap and store the structure
  /// reference in the given register.
  fn put_structure(&mut self, functor: &Functor, register: &Address) -> Result<(), Fault> {
    register.require_variable();
    #[cfg(feature = "trace_computation")] println!("PutStructure({}, {})", functor, register);

    let cell = Cell::Str(Address::from_heap_idx(self.heap.len() + 1));
    self.heap.push(cell.clone());
    self.heap.push(Cell::Functor(functor.clone()));
    self.set_value_at(register, &cell)?;
    Ok(())
  }

  /// Push an integer cell onto the heap and store a reference to it in the given register, so
  /// that registers only ever hold references into stable heap storage.
  fn put_integer(&mut self, value: i64, register: &Address) -> Result<(), Fault> {
    register.require_variable();
    #[cfg(feature = "trace_computation")] println!("PutInteger({}, {})", value, register);

    let integer_idx = self.heap.len();
    self.heap.push(Cell::Integer(value));
    self.set_value_at(register, &Cell::Ref(Address::from_heap_idx(integer_idx)))?;
    Ok(())
  }

  /// put_variable Xn/Yn, Ai: pushes a new unbound variable onto the heap and aliases both the
  /// register and argument register Ai to it.
  fn put_variable(&mut self, register: &Address, argument: &Address) -> Result<(), Fault> {
    register.require_variable();
    argument.require_register();
    #[cfg(feature = "trace_computation")] println!("PutVariable({}, {})", register, argument);

    let cell = Cell::Ref(Address::from_heap_idx(self.heap.len()));
    self.heap.push(cell.clone());
    self.set_value_at(register, &cell)?;
    self.set_value_at(argument, &cell)?;
    Ok(())
  }

  /// put_value Xn/Yn, Ai: copies the register's cell into argument register Ai.
  fn put_value(&mut self, register: &Address, argument: &Address) -> Result<(), Fault> {
    register.require_variable();
    argument.require_register();
    #[cfg(feature = "trace_computation")] println!("PutValue({}, {})", register, argument);

    let cell = self.value_at(register)?;
    self.set_value_at(argument, &cell)?;
    Ok(())
  }

  /// set_variable Xn/Yn: pushes a fresh unbound variable and aliases the register to it.
  fn set_variable(&mut self, register: &Address) -> Result<(), Fault> {
    register.require_variable();
    #[cfg(feature = "trace_computation")] println!("SetVariable({})", register);

    self.push_fresh_variable(register)
  }

  /// set_value Xn/Yn: pushes a copy of the register's cell onto the heap.
  fn set_value(&mut self, register: &Address) -> Result<(), Fault> {
    register.require_variable();
    #[cfg(feature = "trace_computation")] println!("SetValue({})", register);

    let cell = self.value_at(register)?;
    self.heap.push(cell);
    Ok(())
  }

  /// Pushes a self-referential `REF` cell onto the heap and aliases `register` to it.
  fn push_fresh_variable(&mut self, register: &Address) -> Result<(), Fault> {
    let cell = Cell::Ref(Address::from_heap_idx(self.heap.len()));
    self.heap.push(cell.clone());
    self.set_value_at(register, &cell)?;
    Ok(())
  }

  // endregion

  // region Control instruction methods

  /**
    A call to the predicate `functor`. Saves the return address as the continuation, records the
    argument count, pushes a modifier frame for `\+`/`\:` goals, and jumps to the predicate's
    label. Calling a label that was never defined is a unification failure, not a fatal error:
    `fail/0` depends on it.
  */
  fn call(&mut self, functor: &Functor, modifier: Modifier) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")] println!("Call({}{})", modifier, functor);

    // `pc` has already advanced past this instruction, making it the return address.
    self.next_goal = self.pc;
    self.num_args  = functor.arity;

    if modifier != Modifier::None {
      self.modifiers.push(ModifierFrame {
        kind         : modifier,
        continuation : self.pc,
        environment  : self.top_environment,
        choice_point : self.top_choice_point,
        stack_size   : self.control.len(),
      });
    }

    match self.labels.get_by_left(functor) {
      Some(address) => {
        self.pc = *address;
        Ok(())
      }
      None => Err(Fault::unification()),
    }
  }

  /**
    Returns from a fact's code. When the return lands on the youngest modifier frame's saved
    continuation, the modified goal has succeeded, which is signalled with a forceful failure
    for the modifier handler to intercept.
  */
  fn proceed(&mut self) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")] println!("Proceed");

    if let Some(frame) = self.modifiers.last() {
      if frame.continuation == self.next_goal {
        return Err(Fault::forceful());
      }
    }

    self.pc = self.next_goal;
    Ok(())
  }

  /// Pushes an environment frame with `slots` permanent-variable cells and the current
  /// continuation.
  fn allocate(&mut self, slots: usize) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")] println!("Allocate({})", slots);

    let environment = Environment::new(self.next_goal, self.top_environment, slots);
    self.control.push(StackFrame::Environment(environment));
    self.top_environment = Some(self.control.len() - 1);
    Ok(())
  }

  /**
    Pops the active environment and jumps to its saved continuation. Like `proceed`, a return
    landing on the youngest modifier frame's continuation signals the modified goal's success,
    since rules return through here rather than through `Proceed`.
  */
  fn deallocate(&mut self) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")] println!("Deallocate");

    let e = self.top_environment.ok_or(RuntimeError::Underflow {
      operation: "Deallocate",
      missing: "environment",
      location: source_location!(),
    })?;
    let (continuation, previous) = {
      let environment = self.frame_at(e)?.as_environment()?;
      (environment.continuation, environment.previous)
    };
    self.top_environment = previous;

    // The frame is physically reclaimed only when no younger choice point protects it.
    if self.control.len() == e + 1 && self.top_choice_point.map_or(true, |b| b < e) {
      self.control.truncate(e);
    }

    if let Some(frame) = self.modifiers.last() {
      if frame.continuation == continuation {
        return Err(Fault::forceful());
      }
    }

    self.pc = continuation;
    Ok(())
  }

  /// Pushes a choice point whose next alternative is `alternative`, saving the argument
  /// registers and the heap and trail high-water marks.
  fn try_initial_clause(&mut self, alternative: usize) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")]
    println!("TryInitialClause(CODE[{}])", alternative);

    let mut saved_registers = Vec::with_capacity(self.num_args);
    for i in 0..self.num_args {
      saved_registers.push(self.value_at(&Address::from_reg_idx(i))?);
    }

    let choice_point = ChoicePoint {
      saved_registers,
      environment  : self.top_environment,
      continuation : self.next_goal,
      next_clause  : alternative,
      trail_size   : self.trail.len(),
      heap_size    : self.heap.len(),
      previous     : self.top_choice_point,
    };
    self.control.push(StackFrame::ChoicePoint(choice_point));
    self.top_choice_point = Some(self.control.len() - 1);
    Ok(())
  }

  /// Restores state from the current choice point and redirects it at the next alternative.
  fn try_intermediate_clause(&mut self, alternative: usize) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")]
    println!("TryIntermediateClause(CODE[{}])", alternative);

    let b = self.top_choice_point.ok_or(RuntimeError::Underflow {
      operation: "TryIntermediateClause",
      missing: "choice point",
      location: source_location!(),
    })?;
    self.restore_from_choice_point(b)?;

    let size = self.control.len();
    self.control
        .get_mut(b)
        .ok_or(RuntimeError::OutOfBounds {
          store: "STACK",
          index: b,
          size,
          location: source_location!(),
        })?
        .as_choice_point_mut()?
        .next_clause = alternative;
    Ok(())
  }

  /// Restores state from the current choice point and pops it: this is the predicate's last
  /// alternative.
  fn trust_final_clause(&mut self) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")] println!("TrustFinalClause");

    let b = self.top_choice_point.ok_or(RuntimeError::Underflow {
      operation: "TrustFinalClause",
      missing: "choice point",
      location: source_location!(),
    })?;
    self.restore_from_choice_point(b)?;

    self.top_choice_point = self.choice_point_at(b)?.previous;
    self.control.truncate(b);
    Ok(())
  }

  // endregion

}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::Machine;

  /// Runs a block of instructions appended to a fresh machine's code.
  fn run_block(machine: &mut Machine, block: Vec<Instruction>) -> Result<(), Fault> {
    let start = machine.code.len();
    machine.code.extend(block);
    machine.reset_for_run();
    machine.run(start)
  }

  #[test]
  fn put_and_get_structure_round_trip(){
    // Build f(a) into X1, then match it with get instructions.
    let mut machine = Machine::new();
    let block = vec![
      Instruction::PutStructure {
        functor: Functor::atom("a"),
        register: Address::Register(2),
      },
      Instruction::PutStructure {
        functor: Functor::new("f", 1),
        register: Address::Register(1),
      },
      Instruction::SetValue { register: Address::Register(2) },
      Instruction::GetStructure {
        functor: Functor::new("f", 1),
        register: Address::Register(1),
      },
      Instruction::UnifyVariable { register: Address::Register(3) },
      Instruction::GetStructure {
        functor: Functor::atom("a"),
        register: Address::Register(3),
      },
    ];
    assert!(run_block(&mut machine, block).is_ok());
  }

  #[test]
  fn get_integer_matches_and_mismatches(){
    let mut machine = Machine::new();
    let block = vec![
      Instruction::PutInteger { value: 3, register: Address::Register(1) },
      Instruction::GetInteger { value: 3, register: Address::Register(1) },
    ];
    assert!(run_block(&mut machine, block).is_ok());

    let mut machine = Machine::new();
    let block = vec![
      Instruction::PutInteger { value: 3, register: Address::Register(1) },
      Instruction::GetInteger { value: 4, register: Address::Register(1) },
    ];
    assert_eq!(run_block(&mut machine, block), Err(Fault::unification()));
  }

  #[test]
  fn get_integer_binds_an_unbound_variable(){
    let mut machine = Machine::new();
    let block = vec![
      Instruction::PutVariable {
        register: Address::Register(2),
        argument: Address::Register(1),
      },
      Instruction::GetInteger { value: 12, register: Address::Register(1) },
    ];
    assert!(run_block(&mut machine, block).is_ok());

    let address = machine.dereference(&Address::Register(2)).unwrap();
    assert_eq!(machine.value_at(&address).unwrap(), Cell::Integer(12));
  }

  #[test]
  fn calling_an_undefined_predicate_fails(){
    let mut machine = Machine::new();
    let block = vec![
      Instruction::Call {
        functor: Functor::new("missing", 0),
        modifier: Modifier::None,
      },
    ];
    assert_eq!(run_block(&mut machine, block), Err(Fault::unification()));
  }

  #[test]
  fn choice_point_restores_heap_and_trail(){
    let mut machine = Machine::new();

    // Park a variable on the heap, then a choice point above it.
    machine.reset_for_run();
    machine.heap.push(Cell::Ref(Address::Heap(0)));
    machine.execute(&Instruction::TryInitialClause { alternative: 99 }).unwrap();
    let heap_mark = machine.heap.len();
    let trail_mark = machine.trail.len();

    // Bind the old variable and build garbage above the mark.
    machine.heap.push(Cell::Integer(5));
    machine.bind(&Address::Heap(0), &Address::Heap(1)).unwrap();
    assert_eq!(machine.trail.len(), trail_mark + 1);

    // Trusting the final clause restores both high-water marks.
    machine.execute(&Instruction::TrustFinalClause).unwrap();
    assert_eq!(machine.heap.len(), heap_mark);
    assert_eq!(machine.trail.len(), trail_mark);
    assert_eq!(machine.heap[0], Cell::Ref(Address::Heap(0)));
    assert_eq!(machine.top_choice_point, None);
  }

  #[test]
  fn try_intermediate_redirects_the_choice_point(){
    let mut machine = Machine::new();
    machine.reset_for_run();
    machine.execute(&Instruction::TryInitialClause { alternative: 10 }).unwrap();
    machine.execute(&Instruction::TryIntermediateClause { alternative: 20 }).unwrap();

    let b = machine.top_choice_point.unwrap();
    assert_eq!(machine.choice_point_at(b).unwrap().next_clause, 20);
  }

  #[test]
  fn deallocate_without_an_environment_is_fatal(){
    let mut machine = Machine::new();
    machine.reset_for_run();
    let result = machine.execute(&Instruction::Deallocate);
    assert!(matches!(result, Err(Fault::Error(RuntimeError::Underflow { .. }))));
  }

  #[test]
  fn environments_nest_and_pop(){
    let mut machine = Machine::new();
    machine.reset_for_run();
    machine.next_goal = 55;
    machine.execute(&Instruction::Allocate { slots: 2 }).unwrap();
    assert_eq!(machine.top_environment, Some(0));

    machine.next_goal = 77;
    machine.execute(&Instruction::Allocate { slots: 0 }).unwrap();
    assert_eq!(machine.top_environment, Some(1));

    machine.execute(&Instruction::Deallocate).unwrap();
    assert_eq!(machine.pc, 77);
    assert_eq!(machine.top_environment, Some(0));

    machine.execute(&Instruction::Deallocate).unwrap();
    assert_eq!(machine.pc, 55);
    assert_eq!(machine.top_environment, None);
    assert!(machine.control.is_empty());
  }
}
