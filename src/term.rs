/*!

  The abstract syntax tree types for programs and queries, and the syntactic-sugar lowering that
  rewrites list and string literals into their functor form before compilation.

  A clause is one of a fact, a rule, or a query. Heads are predicates; bodies are ordered goal
  sequences in which each goal carries an optional call modifier (`\+` negation-as-failure or
  `\:` intercept). Parameter leaves are variables, predicates, integers, list literals, and
  string literals. The last two are sugar: `lower` rewrites every list literal into the `./2`
  nucleus terminated by `[]/0` and every string literal into an atom, so the compiler only ever
  sees variables, predicates, and integers.

*/

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::functor::{Functor, CONS_FUNCTOR, NIL_FUNCTOR};

pub type TermVec = Vec<Term>;

// region Term declarations and definitions

/// Abstract Syntax Representation
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Term {
  /// An interned string starting with an uppercase letter or underscore.
  Variable(DefaultAtom),

  /// A `Predicate` is a functor with arguments: `f(stuff)`. Constants are represented as
  /// functors of arity 0, so `args` might be an empty `Vec`. Note that a fact is a single
  /// predicate followed by a period: `f(stuff).`.
  Predicate {
    functor : Functor,
    args    : TermVec
  },

  /// A 64-bit signed integer literal.
  Integer(i64),

  /// A list literal `[a, b | Tail]`. A closed list has no tail term.
  List {
    items : TermVec,
    tail  : Option<Box<Term>>
  },

  /// A single-quoted string literal. Lowered to an atom before compilation.
  Text(DefaultAtom),
}

impl Term {

  /// Builds an atom, i.e. a predicate of arity 0.
  pub fn atom(name: &str) -> Term {
    Term::Predicate {
      functor: Functor::atom(name),
      args: vec![]
    }
  }

  /// The functor of a predicate term.
  pub fn functor(&self) -> Option<Functor> {
    match self {
      Term::Predicate { functor, .. } => Some(functor.clone()),
      _                               => None
    }
  }

  /// Returns a string representation of the term, e.g. `"h(f(f(a)), f(a))"`.
  pub fn expression_string(&self) -> String {
    match self {

      Term::Variable(name) => name.to_string(),

      Term::Integer(value) => value.to_string(),

      Term::Text(text)     => text.to_string(),

      Term::Predicate { functor, args } => {
        if args.is_empty() {
          functor.display_name()
        } else {
          let mut buffer = format!("{}(", functor.display_name());
          for (i, term) in args.iter().enumerate(){
            buffer.push_str(term.expression_string().as_str());
            if i != args.len() - 1 {
              buffer.push_str(", ");
            }
          }
          buffer.push(')');
          buffer
        }
      }

      Term::List { items, tail } => {
        let mut buffer = "[".to_string();
        for (i, term) in items.iter().enumerate(){
          buffer.push_str(term.expression_string().as_str());
          if i != items.len() - 1 {
            buffer.push_str(", ");
          }
        }
        if let Some(tail) = tail {
          buffer.push_str(" | ");
          buffer.push_str(tail.expression_string().as_str());
        }
        buffer.push(']');
        buffer
      }

    }
  }

}

impl Display for Term{
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.expression_string())
  }
}

// endregion Term

// region Clause declarations and definitions

/// The call modifier attached to a goal. `\+` turns the goal into negation-as-failure; `\:`
/// intercepts the goal's failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Modifier {
  None,
  Negate,
  Intercept,
}

impl Display for Modifier {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Modifier::None      => write!(f, ""),
      Modifier::Negate    => write!(f, "\\+ "),
      Modifier::Intercept => write!(f, "\\: "),
    }
  }
}

/// A single goal in a rule or query body: a predicate payload with an optional call modifier.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Goal {
  pub modifier  : Modifier,
  pub predicate : Term,
}

impl Display for Goal {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}{}", self.modifier, self.predicate)
  }
}

/// A top-level clause of a program.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Clause {
  /// `head.`
  Fact(Term),
  /// `head :- goal, …, goal.`
  Rule {
    head  : Term,
    goals : Vec<Goal>
  },
  /// `?- goal, …, goal.`
  Query(Vec<Goal>),
}

impl Display for Clause {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Clause::Fact(head) => write!(f, "{}.", head),

      Clause::Rule { head, goals } => {
        let body =
          goals.iter()
               .map(|g| g.to_string())
               .collect::<Vec<String>>()
               .join(", ");
        write!(f, "{} :- {}.", head, body)
      }

      Clause::Query(goals) => {
        let body =
          goals.iter()
               .map(|g| g.to_string())
               .collect::<Vec<String>>()
               .join(", ");
        write!(f, "?- {}.", body)
      }

    }
  }
}

// endregion Clause

// region Lowering

/**
  Rewrites every list literal in the term to the `./2` nucleus with a `[]/0` tail and every
  string literal to an atom. The compiler requires this rewriting to have happened: it only
  understands variables, predicates, and integers.
*/
pub fn lower(term: &Term) -> Term {
  match term {

    Term::Variable(_) | Term::Integer(_) => term.clone(),

    Term::Text(text) => Term::atom(text),

    Term::Predicate { functor, args } => {
      Term::Predicate {
        functor: functor.clone(),
        args: args.iter().map(lower).collect()
      }
    }

    Term::List { items, tail } => {
      // Build the spine inside-out, starting from the tail.
      let mut lowered =
        match tail {
          Some(tail) => lower(tail),
          None       => Term::Predicate { functor: NIL_FUNCTOR.clone(), args: vec![] }
        };
      for item in items.iter().rev() {
        lowered = Term::Predicate {
          functor: CONS_FUNCTOR.clone(),
          args: vec![lower(item), lowered]
        };
      }
      lowered
    }

  }
}

/// Lowers the predicate payload of a goal, leaving the modifier in place.
pub fn lower_goal(goal: &Goal) -> Goal {
  Goal {
    modifier: goal.modifier,
    predicate: lower(&goal.predicate),
  }
}

// endregion Lowering

// region TermIter declarations and definitions

#[derive(Debug)]
pub struct TermIter<'t>{
  terms: VecDeque<&'t Term>, // A queue of terms yet to be visited.
}

impl<'t> TermIter<'t>{
  pub fn new(start: &'t Term) -> TermIter<'t> {
    TermIter{
      terms: VecDeque::from(vec![start])
    }
  }
}

/// Iterates over the terms in the term tree breadth first.
impl<'t> Iterator for TermIter<'t>{
  type Item = &'t Term;

  fn next(&mut self) -> Option<Self::Item> {
    let option_term = self.terms.pop_front();
    match option_term {

      Some(term) => {
        match term {

          Term::Predicate {args, ..} => {
            self.terms.extend(args.iter());
            option_term
          },

          Term::List { items, tail } => {
            self.terms.extend(items.iter());
            if let Some(tail) = tail {
              self.terms.push_back(tail);
            }
            option_term
          },

          _t => option_term
        }
      }

      None => None
    }
  }
}

// endregion TermIter
