//! A special functor struct is necessary, because we need to know the arity of the functor after
//! we no longer have access to its vector of arguments. Thus, a `Functor` is a name and an arity.

use std::fmt::{Formatter, Display};

use string_cache::DefaultAtom;

pub type ArityType = usize;

/**
  The `Functor` struct represents a symbol `f/n`. Clones are cheap. Functors are interned so that
  the same name is shared among every clause and instruction that mentions it. Note that
  `f/2 != f/3`, i.e. functors are the same if and only if both their name and their arity are the
  same.

  A name lexed from single-quoted syntax keeps its quotes (and `\'` escapes) unless the quoted
  text was an ordinary identifier, in which case the quotes were dropped by the lexer. The
  `display_name` method strips the quotes and unescapes for user-facing output.
*/
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Functor {
  pub name  : DefaultAtom,
  pub arity : ArityType,
}

impl Functor {

  pub fn new(name: &str, arity: ArityType) -> Functor {
    Functor{
      name: DefaultAtom::from(name),
      arity
    }
  }

  /// A functor with no parameters, i.e. an atom.
  pub fn atom(name: &str) -> Functor {
    Functor::new(name, 0)
  }

  pub fn is_constant(&self) -> bool {
    self.arity == 0
  }

  /// The user-facing form of the name: surrounding single quotes are stripped and `\'` is
  /// unescaped.
  pub fn display_name(&self) -> String {
    let name: &str = &self.name;
    if name.len() >= 2 && name.starts_with('\'') && name.ends_with('\'') {
      name[1..name.len() - 1].replace("\\'", "'")
    } else {
      name.to_string()
    }
  }

}

impl Display for Functor{
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.arity == 0{
      write!(f, "{}", self.name)
    }else{
      write!(f, "{}/{}", self.name, self.arity)
    }
  }
}

lazy_static!(
  /// The list constructor `./2`, the nucleus every list literal is lowered to.
  pub static ref CONS_FUNCTOR: Functor = Functor::new(".", 2);
  /// The empty list `[]/0`, the tail every closed list literal is lowered to.
  pub static ref NIL_FUNCTOR: Functor = Functor::atom("[]");
);


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display(){
    assert_eq!(format!("{}", Functor::new("parent", 2)), "parent/2");
    assert_eq!(format!("{}", Functor::atom("tom")), "tom");
  }

  #[test]
  fn arity_distinguishes(){
    assert_ne!(Functor::new("f", 2), Functor::new("f", 3));
    assert_eq!(Functor::new("f", 2), Functor::new("f", 2));
  }

  #[test]
  fn quoted_names_are_stripped_for_display(){
    let f = Functor::atom("'hello world'");
    assert_eq!(f.display_name(), "hello world");

    let g = Functor::atom("'don\\'t'");
    assert_eq!(g.display_name(), "don't");

    // Unquoted names pass through unchanged.
    assert_eq!(Functor::atom("tom").display_name(), "tom");
  }
}
