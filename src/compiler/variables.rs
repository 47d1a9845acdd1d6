/*!

  The variable-classification pass.

  Walking the head and every body goal (the head counts as goal 0), a variable is *permanent*
  when it appears in more than one goal (in the head plus at least one body goal, or in two or
  more body goals) or when the clause is a query, since query bindings must survive for the
  solution display. All other variables are temporary.

  Permanent variables are assigned environment-slot addresses in discovery order; temporary
  variables receive their register addresses later, while the allocation tree is built.

*/

use std::collections::{HashMap, HashSet};

use string_cache::DefaultAtom;

use crate::address::Address;
use crate::term::{Goal, Term, TermIter};

/// Classification record for one variable of a clause.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Variable {
  pub name         : DefaultAtom,
  pub is_permanent : bool,
  /// The pre-assigned environment slot, for permanent variables only.
  pub address      : Option<Address>,
}

/// A data structure to hold information about the variables in a clause.
pub struct Variables {
  variables       : HashMap<DefaultAtom, Variable>,
  /// Variable names in the order they were first seen, for binding display.
  discovery       : Vec<DefaultAtom>,
  permanent_count : usize,
}

impl Variables {

  /**
    Classifies every variable of a clause. The head, when present, is goal 0; body goals follow.
    With `force_permanent` (queries), every variable is permanent regardless of how many goals
    it appears in.
  */
  pub fn classify(head: Option<&Term>, goals: &[Goal], force_permanent: bool) -> Variables {
    // Which goals each variable appears in, and the order variables were first seen.
    let mut occurrences : HashMap<DefaultAtom, HashSet<usize>> = HashMap::new();
    let mut discovery   : Vec<DefaultAtom> = Vec::new();

    let mut record_goal = |goal_index: usize, term: &Term| {
      for visited in TermIter::new(term) {
        if let Term::Variable(name) = visited {
          let entry = occurrences.entry(name.clone()).or_insert_with(|| {
            discovery.push(name.clone());
            HashSet::new()
          });
          entry.insert(goal_index);
        }
      }
    };

    let body_offset = match head {
      Some(head) => {
        record_goal(0, head);
        1
      }
      None => 0
    };
    for (i, goal) in goals.iter().enumerate() {
      record_goal(body_offset + i, &goal.predicate);
    }

    let mut variables = HashMap::with_capacity(discovery.len());
    let mut permanent_count = 0;

    for name in &discovery {
      let is_permanent = force_permanent || occurrences[name].len() > 1;
      let address = match is_permanent {
        true => {
          permanent_count += 1;
          Some(Address::Environment(permanent_count))
        }
        false => None,
      };
      variables.insert(name.clone(), Variable {
        name: name.clone(),
        is_permanent,
        address
      });
    }

    Variables { variables, discovery, permanent_count }
  }

  pub fn get(&self, name: &DefaultAtom) -> Option<&Variable> {
    self.variables.get(name)
  }

  /// The number of environment slots `Allocate` must reserve.
  pub fn permanent_count(&self) -> usize {
    self.permanent_count
  }

  /// The clause's variables in the order they were first seen.
  pub fn in_discovery_order(&self) -> impl Iterator<Item = &Variable> {
    self.discovery.iter().filter_map(move |name| self.variables.get(name))
  }

}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::functor::Functor;
  use crate::term::Modifier;

  fn var(name: &str) -> Term {
    Term::Variable(DefaultAtom::from(name))
  }

  fn pred(name: &str, args: Vec<Term>) -> Term {
    Term::Predicate {
      functor: Functor::new(name, args.len()),
      args
    }
  }

  fn goal(term: Term) -> Goal {
    Goal { modifier: Modifier::None, predicate: term }
  }

  #[test]
  fn head_plus_body_occurrence_is_permanent(){
    // q(X) :- p(X).
    let head = pred("q", vec![var("X")]);
    let goals = vec![goal(pred("p", vec![var("X")]))];
    let variables = Variables::classify(Some(&head), &goals, false);

    let x = variables.get(&DefaultAtom::from("X")).unwrap();
    assert!(x.is_permanent);
    assert_eq!(x.address, Some(Address::Environment(1)));
    assert_eq!(variables.permanent_count(), 1);
  }

  #[test]
  fn shared_body_variables_are_permanent(){
    // grandparent(X, Z) :- parent(X, Y), parent(Y, Z).
    let head = pred("grandparent", vec![var("X"), var("Z")]);
    let goals = vec![
      goal(pred("parent", vec![var("X"), var("Y")])),
      goal(pred("parent", vec![var("Y"), var("Z")])),
    ];
    let variables = Variables::classify(Some(&head), &goals, false);

    // All three appear in two goals apiece.
    assert!(variables.get(&DefaultAtom::from("X")).unwrap().is_permanent);
    assert!(variables.get(&DefaultAtom::from("Y")).unwrap().is_permanent);
    assert!(variables.get(&DefaultAtom::from("Z")).unwrap().is_permanent);
    assert_eq!(variables.permanent_count(), 3);
  }

  #[test]
  fn head_only_variables_are_temporary(){
    // p(X, f(Y)) :- q(a).
    let head = pred("p", vec![var("X"), pred("f", vec![var("Y")])]);
    let goals = vec![goal(pred("q", vec![Term::atom("a")]))];
    let variables = Variables::classify(Some(&head), &goals, false);

    assert!(!variables.get(&DefaultAtom::from("X")).unwrap().is_permanent);
    assert!(!variables.get(&DefaultAtom::from("Y")).unwrap().is_permanent);
    assert_eq!(variables.permanent_count(), 0);
  }

  #[test]
  fn repeated_occurrence_in_one_goal_stays_temporary(){
    // p(X, X).
    let head = pred("p", vec![var("X"), var("X")]);
    let variables = Variables::classify(Some(&head), &[], false);

    assert!(!variables.get(&DefaultAtom::from("X")).unwrap().is_permanent);
  }

  #[test]
  fn queries_force_all_variables_permanent(){
    // ?- p(X).
    let goals = vec![goal(pred("p", vec![var("X")]))];
    let variables = Variables::classify(None, &goals, true);

    let x = variables.get(&DefaultAtom::from("X")).unwrap();
    assert!(x.is_permanent);
    assert_eq!(x.address, Some(Address::Environment(1)));
  }

  #[test]
  fn slots_are_assigned_in_discovery_order(){
    // q(A, B) :- p(B), p(A).
    let head = pred("q", vec![var("A"), var("B")]);
    let goals = vec![
      goal(pred("p", vec![var("B")])),
      goal(pred("p", vec![var("A")])),
    ];
    let variables = Variables::classify(Some(&head), &goals, false);

    assert_eq!(
      variables.get(&DefaultAtom::from("A")).unwrap().address,
      Some(Address::Environment(1))
    );
    assert_eq!(
      variables.get(&DefaultAtom::from("B")).unwrap().address,
      Some(Address::Environment(2))
    );
  }
}
