/*!

  A `Cell` abstractly represents the data that may be stored at a single location in a memory
  store. The name `Cell` is a misnomer. Technically the word cell refers to a memory cell, a
  single space at a specific location in memory into which data can be stored. We are conflating
  the data with the storage space at which it lives. This is done out of convenience. We use the
  word address when we want to refer to a location in memory and cell when we want to refer to
  the data.

*/

use std::fmt::{Display, Formatter};

use crate::address::Address;
use crate::functor::Functor;

pub type CellVec = Vec<Cell>;

/**
  A `Cell` is a piece of data that can be stored at a heap, register, or environment-slot
  `Address`.

  An unbound variable is a `Cell::Ref` stored at the very address it carries; every other `Ref`
  is a link in a reference chain that dereferencing follows.
*/
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Cell {
  /// A cell containing nothing. Used when growing a memory store so it can be filled out of
  /// order, and as the initial contents of environment slots.
  Empty,
  /// A pointer to a cell, displayed as `<REF, a>`, where `a` is the address being referenced.
  Ref(Address),
  /// `<STR, k>` where `k` is the address of a functor `f/n`; a pointer to a functor. The functor
  /// cell is followed on the heap by `n` argument cells in order.
  Str(Address),
  /// A functor, displayed as `f/n`, where `n` is the functor's arity.
  Functor(Functor),
  /// A 64-bit signed integer constant.
  Integer(i64),
}


impl Display for Cell{
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match &self{

      Cell::Ref(a) => {
        write!(f, "<REF, {}>", a)
      }

      Cell::Str(a) => {
        write!(f, "<STR, {}>", a)
      }

      Cell::Functor(functor) => {
        write!(f, "{}", functor)
      }

      Cell::Integer(value) => {
        write!(f, "<INT, {}>", value)
      }

      Cell::Empty => {
        write!(f, "")
      }

    }
  }
}

impl Cell {

  /// True iff this cell, stored at `address`, represents an unbound variable.
  pub fn is_unbound_at(&self, address: &Address) -> bool {
    match self {
      Cell::Ref(target) => target == address,
      _                 => false
    }
  }

  pub fn is_ref(&self) -> bool {
    matches!(self, Cell::Ref(_))
  }

  /// Extracts the address from either `Cell::Ref` or `Cell::Str` values.
  pub fn extract_address(&self) -> Option<Address> {
    match self {

      | Cell::Ref(address) | Cell::Str(address) => Some(*address),

      _ => None

    }
  }

  /// Extracts the functor from a `Cell::Functor` value. For recursively dereferenced functor
  /// extraction, use `Machine::extract_functor()`, which has access to the heap required for
  /// dereferencing.
  pub fn extract_functor(&self) -> Option<Functor>{
    match self {

      Cell::Functor(functor) => Some(functor.clone()),

      _                      => None

    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unbound_is_a_self_reference(){
    let address = Address::Heap(3);
    assert!(Cell::Ref(address).is_unbound_at(&address));
    assert!(!Cell::Ref(Address::Heap(2)).is_unbound_at(&address));
    assert!(!Cell::Integer(3).is_unbound_at(&address));
  }

  #[test]
  fn extraction(){
    let cell = Cell::Str(Address::Heap(4));
    assert_eq!(cell.extract_address(), Some(Address::Heap(4)));
    assert_eq!(cell.extract_functor(), None);

    let cell = Cell::Functor(Functor::new("f", 2));
    assert_eq!(cell.extract_functor(), Some(Functor::new("f", 2)));
    assert_eq!(cell.extract_address(), None);
  }

  #[test]
  fn display_forms(){
    assert_eq!(format!("{}", Cell::Ref(Address::Heap(0))), "<REF, HEAP[0]>");
    assert_eq!(format!("{}", Cell::Str(Address::Heap(1))), "<STR, HEAP[1]>");
    assert_eq!(format!("{}", Cell::Integer(-7)), "<INT, -7>");
    assert_eq!(format!("{}", Cell::Functor(Functor::new("h", 2))), "h/2");
  }
}
