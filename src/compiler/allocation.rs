/*!

  The allocation tree: the address-assignment pass that runs over each head or goal term before
  instructions are emitted for it.

  The tree is built breadth first from the term. Argument positions always receive argument
  registers `X[1]..X[arity]` in left-to-right order. Nested compound terms and integers receive
  fresh temporary registers, numbered from `arity + 1` so they never collide with the goal's own
  argument registers. A variable node carries the variable's own allocation, which is its
  environment slot when permanent, otherwise the first temporary allocated for its symbol, which
  every later occurrence in the clause reuses. At an argument position the node additionally
  records the argument register, so that argument variables carry a distinct temporary beside
  the argument slot itself.

*/

use std::collections::HashMap;
use std::collections::VecDeque;

use string_cache::DefaultAtom;

use crate::address::Address;
use crate::term::Term;

use super::variables::Variables;

/// One node of the allocation tree.
#[derive(Clone, Debug)]
pub struct AllocationNode {
  pub term     : Term,
  /// Where this node's value lives: an argument register at argument positions, a temporary
  /// for nested terms, the variable's own allocation for variable nodes.
  pub address  : Address,
  /// The argument register, for variable nodes at argument positions only. (For non-variable
  /// argument nodes, `address` is the argument register itself.)
  pub argument : Option<Address>,
  pub parent   : Option<usize>,
  pub children : Vec<usize>,
}

/// The allocation tree for a single head or goal term. `nodes[0]` is the root: the predicate
/// itself, which occupies no register.
pub struct AllocationTree {
  pub nodes : Vec<AllocationNode>,
}

impl AllocationTree {

  /**
    Builds the allocation tree for `goal`, which must be a lowered predicate term. The
    `allocations` map carries variable allocations across the goals of one clause so that every
    occurrence of a symbol reuses its first allocation.
  */
  pub fn build(
    goal: &Term,
    variables: &Variables,
    allocations: &mut HashMap<DefaultAtom, Address>,
  ) -> AllocationTree
  {
    let arity = match goal {
      Term::Predicate { args, .. } => args.len(),
      _t => {
        // Lowering guarantees goals are predicates; anything else is a compiler bug.
        panic!("Error: Illegal term at a goal position: {}", _t);
      }
    };

    let mut tree = AllocationTree {
      nodes: vec![AllocationNode {
        term     : goal.clone(),
        address  : Address::Undefined,
        argument : None,
        parent   : None,
        children : vec![],
      }],
    };

    // Fresh temporaries start just past the argument registers.
    let mut next_temporary = arity + 1;
    let mut queue: VecDeque<usize> = VecDeque::from(vec![0]);

    while let Some(parent) = queue.pop_front() {
      let args = match &tree.nodes[parent].term {
        Term::Predicate { args, .. } => args.clone(),
        _ => continue,
      };
      let at_root = parent == 0;

      for (i, arg) in args.iter().enumerate() {
        let node_index = tree.nodes.len();

        let (address, argument) = match arg {

          Term::Variable(name) => {
            let own = Self::variable_address(
              name, variables, allocations, &mut next_temporary
            );
            match at_root {
              true  => (own, Some(Address::Register(i + 1))),
              false => (own, None),
            }
          }

          // Non-variables build into the argument register directly at argument positions and
          // into a fresh temporary when nested.
          _ => match at_root {
            true  => (Address::Register(i + 1), None),
            false => {
              let temporary = Address::Register(next_temporary);
              next_temporary += 1;
              (temporary, None)
            }
          },

        };

        tree.nodes.push(AllocationNode {
          term     : arg.clone(),
          address,
          argument,
          parent   : Some(parent),
          children : vec![],
        });
        tree.nodes[parent].children.push(node_index);

        if matches!(arg, Term::Predicate { .. }) {
          queue.push_back(node_index);
        }
      }
    }

    tree
  }

  /// The allocation for a variable symbol: its environment slot when permanent, otherwise the
  /// first temporary handed out for it, reused by every later occurrence.
  fn variable_address(
    name: &DefaultAtom,
    variables: &Variables,
    allocations: &mut HashMap<DefaultAtom, Address>,
    next_temporary: &mut usize,
  ) -> Address
  {
    if let Some(variable) = variables.get(name) {
      if let Some(address) = variable.address {
        return address;
      }
    }

    match allocations.get(name) {
      Some(address) => *address,
      None => {
        let address = Address::Register(*next_temporary);
        *next_temporary += 1;
        allocations.insert(name.clone(), address);
        address
      }
    }
  }

  pub fn root(&self) -> &AllocationNode {
    &self.nodes[0]
  }

}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::functor::Functor;

  fn var(name: &str) -> Term {
    Term::Variable(DefaultAtom::from(name))
  }

  fn pred(name: &str, args: Vec<Term>) -> Term {
    Term::Predicate {
      functor: Functor::new(name, args.len()),
      args
    }
  }

  #[test]
  fn arguments_receive_argument_registers(){
    // p(f(X), Y)
    let goal = pred("p", vec![pred("f", vec![var("X")]), var("Y")]);
    let variables = Variables::classify(Some(&goal), &[], false);
    let mut allocations = HashMap::new();
    let tree = AllocationTree::build(&goal, &variables, &mut allocations);

    let root_children = &tree.root().children;
    assert_eq!(root_children.len(), 2);

    // f(X) builds directly into A1.
    let f_node = &tree.nodes[root_children[0]];
    assert_eq!(f_node.address, Address::Register(1));
    assert_eq!(f_node.argument, None);

    // Y carries its own temporary beside the argument register A2.
    let y_node = &tree.nodes[root_children[1]];
    assert_eq!(y_node.argument, Some(Address::Register(2)));
    assert!(matches!(y_node.address, Address::Register(n) if n > 2));
  }

  #[test]
  fn nested_terms_receive_fresh_temporaries(){
    // p(f(g(X)))
    let goal = pred("p", vec![pred("f", vec![pred("g", vec![var("X")])])]);
    let variables = Variables::classify(Some(&goal), &[], false);
    let mut allocations = HashMap::new();
    let tree = AllocationTree::build(&goal, &variables, &mut allocations);

    let f_node = &tree.nodes[tree.root().children[0]];
    let g_node = &tree.nodes[f_node.children[0]];
    let x_node = &tree.nodes[g_node.children[0]];

    assert_eq!(f_node.address, Address::Register(1));
    // Temporaries start past the argument registers.
    assert!(matches!(g_node.address, Address::Register(n) if n >= 2));
    assert_ne!(g_node.address, x_node.address);
  }

  #[test]
  fn variable_occurrences_share_one_allocation(){
    // p(X, X)
    let goal = pred("p", vec![var("X"), var("X")]);
    let variables = Variables::classify(Some(&goal), &[], false);
    let mut allocations = HashMap::new();
    let tree = AllocationTree::build(&goal, &variables, &mut allocations);

    let first  = &tree.nodes[tree.root().children[0]];
    let second = &tree.nodes[tree.root().children[1]];
    assert_eq!(first.address, second.address);
    assert_ne!(first.argument, second.argument);
  }

  #[test]
  fn permanent_variables_carry_their_slot(){
    use crate::term::{Goal, Modifier};

    // q(X) :- p(X): X is permanent, so both trees see Y[1].
    let head = pred("q", vec![var("X")]);
    let goals = vec![Goal {
      modifier: Modifier::None,
      predicate: pred("p", vec![var("X")])
    }];
    let variables = Variables::classify(Some(&head), &goals, false);
    let mut allocations = HashMap::new();

    let head_tree = AllocationTree::build(&head, &variables, &mut allocations);
    let x_in_head = &head_tree.nodes[head_tree.root().children[0]];
    assert_eq!(x_in_head.address, Address::Environment(1));

    let goal_tree = AllocationTree::build(&goals[0].predicate, &variables, &mut allocations);
    let x_in_goal = &goal_tree.nodes[goal_tree.root().children[0]];
    assert_eq!(x_in_goal.address, Address::Environment(1));
  }
}
