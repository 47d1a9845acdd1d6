/*!

  Instruction emission: from a classified, allocated clause to the instruction block the
  database splicer installs.

  The head and body generators share one driver distinguished by the `dependent_allocations`
  flag. Head code is emitted in breadth-first order over the allocation tree: outer structures
  are matched before inner ones, which the read-mode cursor discipline requires. Body code is
  emitted in post order, so nested compound terms are built bottom-up into temporaries before
  the structures that mention them. The instruction selection table is shared:

    |                         | head (`Get`/`Unify`)  | body (`Put`/`Set`)  |
    | unseen var at argument  | `GetVariable`         | `PutVariable`       |
    | seen var at argument    | `GetValue`            | `PutValue`          |
    | unseen var at register  | `UnifyVariable`       | `SetVariable`       |
    | seen var at register    | `UnifyValue`          | `SetValue`          |

  A rule `Head :- G1, …, Gk` compiles to `Allocate(n)`, head code, then each goal's body code
  ending in a `Call` carrying the goal's modifier, then `Deallocate`. A fact is head code ending
  in `Proceed`. A query is a rule with no head whose epilogue captures the variable bindings
  before the environment is torn down.

*/

use std::collections::{HashMap, HashSet};
use std::collections::VecDeque;

use string_cache::DefaultAtom;

use crate::address::Address;
use crate::error::RuntimeError;
use crate::instruction::Instruction;
use crate::source_location;
use crate::term::{lower, lower_goal, Goal, Term};

use super::allocation::AllocationTree;
use super::variables::Variables;

/// The instruction block for one compiled clause, plus, for queries, the variable bindings to
/// display on success.
pub struct CompiledClause {
  pub code     : Vec<Instruction>,
  pub bindings : Vec<(DefaultAtom, Address)>,
}

/// Per-clause emission state: the classification, the clause-wide variable allocations, and
/// the registers already seen.
struct ClauseCompiler {
  variables   : Variables,
  allocations : HashMap<DefaultAtom, Address>,
  seen        : HashSet<Address>,
  code        : Vec<Instruction>,
}

/// Compiles a fact (`goals` empty) or rule into its instruction block.
pub fn compile_program_clause(head: &Term, goals: &[Goal])
  -> Result<CompiledClause, RuntimeError>
{
  let head = lower(head);
  let goals: Vec<Goal> = goals.iter().map(lower_goal).collect();

  if head.functor().is_none() {
    return Err(RuntimeError::BadCell {
      expected: "a predicate at the clause head",
      found: head.to_string(),
      location: source_location!(),
    });
  }

  let variables = Variables::classify(Some(&head), &goals, false);
  let mut compiler = ClauseCompiler::new(variables);

  if !goals.is_empty() {
    compiler.code.push(Instruction::Allocate {
      slots: compiler.variables.permanent_count()
    });
  }

  let tree = AllocationTree::build(&head, &compiler.variables, &mut compiler.allocations);
  compiler.emit_term(&tree, false);

  match goals.is_empty() {
    true => {
      compiler.code.push(Instruction::Proceed);
    }
    false => {
      for goal in &goals {
        compiler.emit_goal(goal)?;
      }
      compiler.code.push(Instruction::Deallocate);
    }
  }

  Ok(CompiledClause { code: compiler.code, bindings: vec![] })
}

/**
  Compiles a query: a clause with no head, every variable permanent so that bindings survive
  for the solution display. The epilogue renders the bindings while the query's environment is
  still live, then deallocates.
*/
pub fn compile_query(goals: &[Goal]) -> Result<CompiledClause, RuntimeError> {
  let goals: Vec<Goal> = goals.iter().map(lower_goal).collect();

  let variables = Variables::classify(None, &goals, true);
  let mut compiler = ClauseCompiler::new(variables);

  compiler.code.push(Instruction::Allocate {
    slots: compiler.variables.permanent_count()
  });

  for goal in &goals {
    compiler.emit_goal(goal)?;
  }

  compiler.code.push(Instruction::Command {
    name: DefaultAtom::from("display_bindings")
  });
  compiler.code.push(Instruction::Deallocate);

  // Anonymous variables (generated `_G…` names) are bound like any other but not displayed.
  let bindings =
    compiler.variables
            .in_discovery_order()
            .filter(|variable| !variable.name.starts_with('_'))
            .filter_map(|variable| {
              variable.address.map(|address| (variable.name.clone(), address))
            })
            .collect();

  Ok(CompiledClause { code: compiler.code, bindings })
}

impl ClauseCompiler {

  fn new(variables: Variables) -> ClauseCompiler {
    ClauseCompiler {
      variables,
      allocations : HashMap::new(),
      seen        : HashSet::new(),
      code        : Vec::new(),
    }
  }

  /// Emits one body goal's argument-construction code followed by its `Call`.
  fn emit_goal(&mut self, goal: &Goal) -> Result<(), RuntimeError> {
    let functor = goal.predicate.functor().ok_or(RuntimeError::BadCell {
      expected: "a predicate at a goal position",
      found: goal.predicate.to_string(),
      location: source_location!(),
    })?;

    let tree = AllocationTree::build(
      &goal.predicate, &self.variables, &mut self.allocations
    );
    self.emit_term(&tree, true);

    self.code.push(Instruction::Call {
      functor,
      modifier: goal.modifier,
    });
    Ok(())
  }

  /// The shared emission driver: head order without dependent allocations, body order with
  /// them.
  fn emit_term(&mut self, tree: &AllocationTree, dependent_allocations: bool) {
    match dependent_allocations {
      false => self.emit_head(tree),
      true  => self.emit_body(tree),
    }
  }

  // region Instruction selection, shared between the generators

  /// The instruction for a variable at an argument position.
  fn argument_variable_instruction(
    &mut self,
    address: Address,
    argument: Address,
    dependent: bool,
  ) -> Instruction
  {
    let was_seen = self.seen.contains(&address);
    match was_seen {

      true => match dependent {
        // Head
        false => Instruction::GetValue { register: address, argument },
        // Body
        true  => Instruction::PutValue { register: address, argument },
      },

      false => {
        // Have not seen this register before.
        self.seen.insert(address);
        match dependent {
          false => Instruction::GetVariable { register: address, argument },
          true  => Instruction::PutVariable { register: address, argument },
        }
      }

    } // end if seen address before
  }

  /// The instruction for a variable at a register (non-argument) position.
  fn register_variable_instruction(&mut self, address: Address, dependent: bool)
    -> Instruction
  {
    let was_seen = self.seen.contains(&address);
    match was_seen {

      true => match dependent {
        false => Instruction::UnifyValue { register: address },
        true  => Instruction::SetValue { register: address },
      },

      false => {
        self.seen.insert(address);
        match dependent {
          false => Instruction::UnifyVariable { register: address },
          true  => Instruction::SetVariable { register: address },
        }
      }

    }
  }

  // endregion

  // region Head generation (breadth-first)

  fn emit_head(&mut self, tree: &AllocationTree) {
    let mut queue: VecDeque<usize> = VecDeque::new();

    // The argument row: one instruction per argument, with compound arguments expanded in
    // place so their `GetStructure` lands at the argument's position in the row.
    let root_children = tree.root().children.clone();
    for child in root_children {
      let node = &tree.nodes[child];
      match &node.term {

        Term::Variable(_) => {
          // The argument register is always present at the root.
          let argument = node.argument.unwrap();
          let instruction =
            self.argument_variable_instruction(node.address, argument, false);
          self.code.push(instruction);
        }

        Term::Integer(value) => {
          self.code.push(Instruction::GetInteger {
            value: *value,
            register: node.address
          });
        }

        Term::Predicate { .. } => {
          self.expand_head_structure(tree, child, &mut queue);
        }

        _t => panic!("Error: Illegal term survived lowering: {}", _t),

      }
    }

    // Deeper structures, breadth first.
    while let Some(index) = queue.pop_front() {
      self.expand_head_structure(tree, index, &mut queue);
    }
  }

  /// Emits `GetStructure`/`GetInteger` for the node and one `Unify` row per child, queueing
  /// compound and integer children for their own later expansion.
  fn expand_head_structure(
    &mut self,
    tree: &AllocationTree,
    index: usize,
    queue: &mut VecDeque<usize>,
  )
  {
    let node = &tree.nodes[index];
    match &node.term {

      Term::Integer(value) => {
        self.code.push(Instruction::GetInteger {
          value: *value,
          register: node.address
        });
      }

      Term::Predicate { functor, .. } => {
        self.code.push(Instruction::GetStructure {
          functor: functor.clone(),
          register: node.address
        });
        self.seen.insert(node.address);

        let children = node.children.clone();
        for child in children {
          let child_node = &tree.nodes[child];
          match &child_node.term {

            Term::Variable(_) => {
              let instruction =
                self.register_variable_instruction(child_node.address, false);
              self.code.push(instruction);
            }

            _ => {
              // A nested structure or integer: capture it in a fresh temporary now, match it
              // when its turn in the queue comes.
              self.code.push(Instruction::UnifyVariable {
                register: child_node.address
              });
              self.seen.insert(child_node.address);
              queue.push_back(child);
            }

          }
        }
      }

      _t => panic!("Error: Illegal term survived lowering: {}", _t),

    }
  }

  // endregion

  // region Body generation (post-order)

  fn emit_body(&mut self, tree: &AllocationTree) {
    // Nested terms first, bottom-up, so every structure's children exist before it does.
    self.emit_body_deep(tree, 0);

    // Then the argument row.
    let root_children = tree.root().children.clone();
    for child in root_children {
      let node = &tree.nodes[child];
      match &node.term {

        Term::Variable(_) => {
          let argument = node.argument.unwrap();
          let instruction =
            self.argument_variable_instruction(node.address, argument, true);
          self.code.push(instruction);
        }

        Term::Integer(value) => {
          self.code.push(Instruction::PutInteger {
            value: *value,
            register: node.address
          });
          self.seen.insert(node.address);
        }

        Term::Predicate { functor, .. } => {
          self.code.push(Instruction::PutStructure {
            functor: functor.clone(),
            register: node.address
          });
          self.seen.insert(node.address);
          self.emit_body_structure_row(tree, child);
        }

        _t => panic!("Error: Illegal term survived lowering: {}", _t),

      }
    }
  }

  /// Builds every structure and integer nested strictly below the argument row, in post
  /// order.
  fn emit_body_deep(&mut self, tree: &AllocationTree, index: usize) {
    let children = tree.nodes[index].children.clone();
    for child in children {
      self.emit_body_deep(tree, child);

      let node = &tree.nodes[child];
      // The argument row builds the root's direct children itself.
      if node.parent == Some(0) {
        continue;
      }

      match &node.term {

        Term::Variable(_) => {
          // Built inline by the structure row that mentions it.
        }

        Term::Integer(value) => {
          self.code.push(Instruction::PutInteger {
            value: *value,
            register: node.address
          });
          self.seen.insert(node.address);
        }

        Term::Predicate { functor, .. } => {
          self.code.push(Instruction::PutStructure {
            functor: functor.clone(),
            register: node.address
          });
          self.seen.insert(node.address);
          self.emit_body_structure_row(tree, child);
        }

        _t => panic!("Error: Illegal term survived lowering: {}", _t),

      }
    }
  }

  /// One `Set` instruction per child of a structure just built.
  fn emit_body_structure_row(&mut self, tree: &AllocationTree, index: usize) {
    let children = tree.nodes[index].children.clone();
    for child in children {
      let child_node = &tree.nodes[child];
      match &child_node.term {

        Term::Variable(_) => {
          let instruction =
            self.register_variable_instruction(child_node.address, true);
          self.code.push(instruction);
        }

        _ => {
          // Already built by the post-order pass.
          self.code.push(Instruction::SetValue { register: child_node.address });
        }

      }
    }
  }

  // endregion

}
