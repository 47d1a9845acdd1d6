/*!

  The built-in library.

  Each built-in predicate is registered with a functor and a thunk that emits its canonical
  instruction body, so call-sites are uniform: a built-in is called exactly like a user
  predicate. The bodies are injected into code memory when the machine is constructed, before
  any user clause, and the symbols are reserved: redeclaring one is a compile error.

  Host-side work (I/O, arithmetic evaluation, binding display) is reached through the `Command`
  instruction, which looks the routine up by name in the command registry.

  `\+/1` and `\:/1` are reserved names but own no code: the compiler realises them as call
  modifiers instead.

*/

use std::collections::HashMap;
use std::io::Write;

use string_cache::DefaultAtom;

use crate::address::Address;
use crate::cell::Cell;
use crate::error::{Fault, RuntimeError};
use crate::functor::{Functor, CONS_FUNCTOR, NIL_FUNCTOR};
use crate::instruction::Instruction;
use crate::machine::Machine;
use crate::source_location;
use crate::term::Modifier;

/// A thunk that emits a built-in's instruction body.
type BodyEmitter = fn(&mut Vec<Instruction>);

/// A host-side routine invoked by the `Command` instruction.
type HostCommand = fn(&mut Machine) -> Result<(), Fault>;

lazy_static! {

  /// The built-in predicates, in installation order, each with the thunk that emits its body.
  static ref LIBRARY: Vec<(Functor, BodyEmitter)> = vec![
    (Functor::atom("true"),       emit_true       as BodyEmitter),
    (Functor::atom("fail"),       emit_fail       as BodyEmitter),
    (Functor::atom("nl"),         emit_nl         as BodyEmitter),
    (Functor::new("write", 1),    emit_write      as BodyEmitter),
    (Functor::new("writeln", 1),  emit_writeln    as BodyEmitter),
    (Functor::new("=", 2),        emit_unify      as BodyEmitter),
    (Functor::new("is", 2),       emit_evaluate   as BodyEmitter),
  ];

  /// The host command registry.
  static ref COMMANDS: HashMap<&'static str, HostCommand> = {
    let mut commands: HashMap<&'static str, HostCommand> = HashMap::new();
    commands.insert("nl",               command_nl               as HostCommand);
    commands.insert("write",            command_write            as HostCommand);
    commands.insert("writeln",          command_writeln          as HostCommand);
    commands.insert("evaluate",         command_evaluate         as HostCommand);
    commands.insert("display_bindings", command_display_bindings as HostCommand);
    commands
  };

}

// region Body emitters

/// `true/0` succeeds immediately.
fn emit_true(code: &mut Vec<Instruction>) {
  code.push(Instruction::Proceed);
}

/// `fail/0` calls a symbol that is never defined, guaranteeing failure. The `$` prefix keeps
/// the symbol out of reach of the parser.
fn emit_fail(code: &mut Vec<Instruction>) {
  code.push(Instruction::Call {
    functor: Functor::atom("$fail"),
    modifier: Modifier::None,
  });
}

fn emit_nl(code: &mut Vec<Instruction>) {
  code.push(Instruction::Command { name: DefaultAtom::from("nl") });
  code.push(Instruction::Proceed);
}

fn emit_write(code: &mut Vec<Instruction>) {
  code.push(Instruction::Command { name: DefaultAtom::from("write") });
  code.push(Instruction::Proceed);
}

fn emit_writeln(code: &mut Vec<Instruction>) {
  code.push(Instruction::Command { name: DefaultAtom::from("writeln") });
  code.push(Instruction::Proceed);
}

/// `=/2` unifies its two argument registers.
fn emit_unify(code: &mut Vec<Instruction>) {
  code.push(Instruction::GetValue {
    register: Address::Register(1),
    argument: Address::Register(2),
  });
  code.push(Instruction::Proceed);
}

/// `is/2` evaluates argument 2 and binds the result to argument 1.
fn emit_evaluate(code: &mut Vec<Instruction>) {
  code.push(Instruction::Command { name: DefaultAtom::from("evaluate") });
  code.push(Instruction::Proceed);
}

// endregion

// region Host commands

fn command_nl(_machine: &mut Machine) -> Result<(), Fault> {
  println!();
  let _ = std::io::stdout().flush();
  Ok(())
}

fn command_write(machine: &mut Machine) -> Result<(), Fault> {
  let rendered = machine.render_term(&Address::Register(1))?;
  print!("{}", rendered);
  let _ = std::io::stdout().flush();
  Ok(())
}

fn command_writeln(machine: &mut Machine) -> Result<(), Fault> {
  let rendered = machine.render_term(&Address::Register(1))?;
  println!("{}", rendered);
  Ok(())
}

/// The body of `is/2`: evaluate the expression in argument register 2, then unify argument
/// register 1 with the result.
fn command_evaluate(machine: &mut Machine) -> Result<(), Fault> {
  let value = machine.evaluate(&Address::Register(2))?;

  let result_idx = machine.heap.len();
  machine.heap.push(Cell::Integer(value));
  machine.unify(&Address::Register(1), &Address::from_heap_idx(result_idx))
}

/// Renders the current query's variable bindings into the machine's solution buffer. Emitted
/// at the end of every compiled query, while the query's environment is still live.
fn command_display_bindings(machine: &mut Machine) -> Result<(), Fault> {
  let bindings = machine.query_bindings.clone();
  for (name, address) in bindings {
    let rendered = machine.render_term(&address)?;
    machine.last_solution.push((name, rendered));
  }
  Ok(())
}

// endregion

impl Machine {

  /**
    Injects the built-in bodies into code memory and reserves their symbols. Called once during
    machine construction, before any user clause is compiled.
  */
  pub(crate) fn install_builtins(&mut self) {
    // The modifier-realised built-ins own no code; registering the symbols reserves them.
    self.builtins.insert(Functor::new("\\+", 1));
    self.builtins.insert(Functor::new("\\:", 1));

    for (functor, emit) in LIBRARY.iter() {
      let address = self.code.len();
      emit(&mut self.code);
      self.labels.insert(functor.clone(), address);
      self.builtins.insert(functor.clone());
    }

    self.insertion_address = self.code.len();
  }

  /// Dispatches a `Command` instruction to its host routine.
  pub(crate) fn host_command(&mut self, name: &DefaultAtom) -> Result<(), Fault> {
    #[cfg(feature = "trace_computation")] println!("Command({})", name);

    match COMMANDS.get(name.as_ref()) {
      Some(command) => command(self),
      None => Err(Fault::from(RuntimeError::UnknownCommand {
        name: name.to_string(),
        location: source_location!(),
      })),
    }
  }

  // region Arithmetic evaluation

  /**
    Evaluates the term at `address` as an arithmetic expression: integer leaves combined by the
    n-ary commutative operators `+` and `*`. Evaluating an unbound variable, an unknown
    operator, or a non-integer is a fatal error, as is integer overflow.
  */
  pub fn evaluate(&self, address: &Address) -> Result<i64, Fault> {
    let address = self.dereference(address)?;
    let cell = self.value_at(&address)?;

    match cell {

      Cell::Integer(value) => Ok(value),

      Cell::Ref(_) => Err(Fault::from(RuntimeError::Arithmetic {
        found: "an unbound variable".to_string(),
        location: source_location!(),
      })),

      Cell::Str(functor_address) => {
        let functor = self.functor_at(&functor_address)?;
        let base = functor_address.idx();

        match &*functor.name {

          "+" => {
            let mut sum: i64 = 0;
            for n in 1..=functor.arity {
              let argument = self.evaluate(&Address::from_heap_idx(base + n))?;
              sum = sum.checked_add(argument).ok_or(RuntimeError::Arithmetic {
                found: "an overflowing sum".to_string(),
                location: source_location!(),
              })?;
            }
            Ok(sum)
          }

          "*" => {
            let mut product: i64 = 1;
            for n in 1..=functor.arity {
              let argument = self.evaluate(&Address::from_heap_idx(base + n))?;
              product = product.checked_mul(argument).ok_or(RuntimeError::Arithmetic {
                found: "an overflowing product".to_string(),
                location: source_location!(),
              })?;
            }
            Ok(product)
          }

          _ => Err(Fault::from(RuntimeError::Arithmetic {
            found: format!("the operator {}", functor),
            location: source_location!(),
          })),

        }
      }

      found => Err(Fault::from(RuntimeError::Arithmetic {
        found: found.to_string(),
        location: source_location!(),
      })),

    }
  }

  // endregion

  // region Term rendering

  /**
    The textual trace form of the term at `address`: `f(a1, …, an)` for compound terms (no
    parentheses when n = 0), list notation through `./2` spines, `_` for unbound variables, and
    quote-stripped functor names.
  */
  pub fn render_term(&self, address: &Address) -> Result<String, Fault> {
    let address = self.dereference(address)?;
    let cell = self.value_at(&address)?;

    match cell {

      Cell::Ref(_) => Ok("_".to_string()),

      Cell::Integer(value) => Ok(value.to_string()),

      Cell::Str(functor_address) => {
        let functor = self.functor_at(&functor_address)?;

        if functor == *CONS_FUNCTOR {
          return self.render_list(&functor_address);
        }

        if functor.arity == 0 {
          return Ok(functor.display_name());
        }

        let base = functor_address.idx();
        let mut rendered_args = Vec::with_capacity(functor.arity);
        for n in 1..=functor.arity {
          rendered_args.push(self.render_term(&Address::from_heap_idx(base + n))?);
        }
        Ok(format!("{}({})", functor.display_name(), rendered_args.join(", ")))
      }

      found => Err(Fault::from(RuntimeError::BadCell {
        expected: "a term cell to render",
        found: found.to_string(),
        location: source_location!(),
      })),

    }
  }

  /**
    Walks the spine of `./2` cells starting at the functor cell `cons_address`, rendering
    `[h1, h2, …]` for a `[]/0`-terminated list and `[h1, h2, … | t]` otherwise.
  */
  fn render_list(&self, cons_address: &Address) -> Result<String, Fault> {
    let mut items: Vec<String> = Vec::new();
    let mut cons = *cons_address;

    loop {
      items.push(self.render_term(&Address::from_heap_idx(cons.idx() + 1))?);

      let tail_address = self.dereference(&Address::from_heap_idx(cons.idx() + 2))?;
      let tail_cell = self.value_at(&tail_address)?;

      if let Cell::Str(functor_address) = &tail_cell {
        let functor = self.functor_at(functor_address)?;
        if functor == *CONS_FUNCTOR {
          cons = *functor_address;
          continue;
        }
        if functor == *NIL_FUNCTOR {
          return Ok(format!("[{}]", items.join(", ")));
        }
      }

      // A non-list tail: an unbound variable or some other term.
      return Ok(format!("[{}|{}]", items.join(", "), self.render_term(&tail_address)?));
    }
  }

  // endregion

}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_symbols_are_reserved(){
    let machine = Machine::new();
    assert!(machine.builtins.contains(&Functor::atom("true")));
    assert!(machine.builtins.contains(&Functor::new("is", 2)));
    assert!(machine.builtins.contains(&Functor::new("\\+", 1)));
    // Bodies were injected for everything except the modifier-realised pair.
    assert!(machine.labels.get_by_left(&Functor::atom("true")).is_some());
    assert!(machine.labels.get_by_left(&Functor::new("\\+", 1)).is_none());
  }

  #[test]
  fn evaluate_integers_and_operators(){
    let mut machine = Machine::new();
    // (1 + 2) * 3 as heap cells:
    //  0: STR 1    1: +/2    2: INT 1    3: INT 2
    //  4: STR 5    5: */2    6: REF 0    7: INT 3
    machine.heap = vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(Functor::new("+", 2)),
      Cell::Integer(1),
      Cell::Integer(2),
      Cell::Str(Address::Heap(5)),
      Cell::Functor(Functor::new("*", 2)),
      Cell::Ref(Address::Heap(0)),
      Cell::Integer(3),
    ];
    assert_eq!(machine.evaluate(&Address::Heap(0)).unwrap(), 3);
    assert_eq!(machine.evaluate(&Address::Heap(4)).unwrap(), 9);
  }

  #[test]
  fn evaluate_rejects_unbound_variables(){
    let mut machine = Machine::new();
    machine.heap = vec![Cell::Ref(Address::Heap(0))];
    let result = machine.evaluate(&Address::Heap(0));
    assert!(matches!(result, Err(Fault::Error(RuntimeError::Arithmetic { .. }))));
  }

  #[test]
  fn evaluate_rejects_unknown_operators(){
    let mut machine = Machine::new();
    machine.heap = vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(Functor::new("-", 2)),
      Cell::Integer(1),
      Cell::Integer(2),
    ];
    let result = machine.evaluate(&Address::Heap(0));
    assert!(matches!(result, Err(Fault::Error(RuntimeError::Arithmetic { .. }))));
  }

  #[test]
  fn render_compound_terms(){
    let mut machine = Machine::new();
    // f(a, 3)
    machine.heap = vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(Functor::new("f", 2)),
      Cell::Ref(Address::Heap(4)),
      Cell::Integer(3),
      Cell::Str(Address::Heap(5)),
      Cell::Functor(Functor::atom("a")),
    ];
    assert_eq!(machine.render_term(&Address::Heap(0)).unwrap(), "f(a, 3)");
  }

  #[test]
  fn render_unbound_as_underscore(){
    let mut machine = Machine::new();
    machine.heap = vec![Cell::Ref(Address::Heap(0))];
    assert_eq!(machine.render_term(&Address::Heap(0)).unwrap(), "_");
  }

  #[test]
  fn render_closed_list(){
    let mut machine = Machine::new();
    // .(1, .(2, []))
    machine.heap = vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(CONS_FUNCTOR.clone()),
      Cell::Integer(1),
      Cell::Str(Address::Heap(4)),
      Cell::Functor(CONS_FUNCTOR.clone()),
      Cell::Integer(2),
      Cell::Str(Address::Heap(7)),
      Cell::Functor(NIL_FUNCTOR.clone()),
    ];
    assert_eq!(machine.render_term(&Address::Heap(0)).unwrap(), "[1, 2]");
  }

  #[test]
  fn render_open_list(){
    let mut machine = Machine::new();
    // .(1, T) with T unbound
    machine.heap = vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(CONS_FUNCTOR.clone()),
      Cell::Integer(1),
      Cell::Ref(Address::Heap(3)),
    ];
    assert_eq!(machine.render_term(&Address::Heap(0)).unwrap(), "[1|_]");
  }

  #[test]
  fn render_strips_quotes(){
    let mut machine = Machine::new();
    machine.heap = vec![
      Cell::Str(Address::Heap(1)),
      Cell::Functor(Functor::atom("'hello world'")),
    ];
    assert_eq!(machine.render_term(&Address::Heap(0)).unwrap(), "hello world");
  }

  #[test]
  fn unknown_commands_are_fatal(){
    let mut machine = Machine::new();
    let result = machine.host_command(&DefaultAtom::from("frobnicate"));
    assert!(matches!(result, Err(Fault::Error(RuntimeError::UnknownCommand { .. }))));
  }
}
