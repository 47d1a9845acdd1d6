/*!

  A pointer type that knows which among the heap, the temporary registers, and the environment
  slots it points to. The memory types are called areas, e.g. heap area, register area, and so
  forth. The `Address::require_*` methods are intended for debug-mode to catch logic errors
  resulting in an address to memory area A being used in a context meant only for an address to
  memory area B.

  Registers and environment slots are numbered from 1, matching how they are written in the
  listings (`X[1]`, `Y[1]`, …). The heap is indexed from 0. `Address::idx()` converts either
  numbering into an index into the backing vector.

*/

use std::fmt::{Display, Formatter};

use strum_macros::{EnumDiscriminants, Display as StrumDisplay, IntoStaticStr};

// `AddressNumberType` is `usize`, as it is naturally an index into a memory store.
pub type AddressNumberType = usize;

#[derive(
  EnumDiscriminants,
  Clone,             Copy,             Eq,
  PartialEq,         Debug,            Hash,
)]
#[strum_discriminants(derive(IntoStaticStr, StrumDisplay))]
#[strum_discriminants(name(Area))]
pub enum Address{
  /// A "pointer" to a cell is an index into the heap. We could call it a cell reference.
  Heap(        AddressNumberType ),
  /// A "pointer" to a register is an index into the register vector `X`.
  Register(    AddressNumberType ),
  /// An index into the permanent-variable slots of the active environment frame.
  Environment( AddressNumberType ),
  /// The address of nothing, used before an allocation has been decided.
  Undefined,
}

impl Address {
  /// Converts the address to an index into the corresponding vector.
  pub fn idx(&self) -> AddressNumberType {
    match self{
      Address::Heap(i) => *i,
      // Registers and environment slots count from 1, so subtract 1 to convert to an index.
      | Address::Register(i)
      | Address::Environment(i) => i - 1,
      Address::Undefined => {
        unreachable!("Error: Tried to take the index of an undefined address.");
      }
    }
  }

  /// The area of memory the address points into.
  pub fn area(&self) -> Area {
    Area::from(self)
  }

  /// Converts an index into the heap vector to a heap address.
  pub fn from_heap_idx(heap_idx: usize) -> Address{
    Address::Heap(heap_idx as AddressNumberType)
  }

  /// Converts an index into the register vector to a register address.
  pub fn from_reg_idx(reg_idx: usize) -> Address{
    Address::Register((reg_idx + 1) as AddressNumberType)
  }

  /// Converts an index into an environment frame's slots to an environment address.
  pub fn from_slot_idx(slot_idx: usize) -> Address{
    Address::Environment((slot_idx + 1) as AddressNumberType)
  }

  /// Panics if the address is not a register pointer.
  pub fn require_register(&self){
    if let Address::Register(_) = self{
      return;
    }
    unreachable!(
      "Error: A non-register pointer was given when a register pointer was required: {}",
      self
    );
  }

  /// Panics if the address is not a register or environment-slot pointer, the two areas a
  /// compiled operand may name.
  pub fn require_variable(&self){
    match self {
      | Address::Register(_)
      | Address::Environment(_) => {},
      _ => {
        unreachable!(
          "Error: A non-variable pointer was given when a variable pointer was required: {}",
          self
        );
      }
    }
  }

  /// Panics if the address is not a heap pointer.
  #[allow(dead_code)]
  pub fn require_heap(&self){
    if let Address::Heap(_) = self{
      return;
    }
    unreachable!(
      "Error: A non-heap pointer was given when a heap pointer was required: {}",
      self
    );
  }

  pub fn is_register(&self) -> bool {
    matches!(self, Address::Register(_))
  }

  pub fn is_heap(&self) -> bool {
    matches!(self, Address::Heap(_))
  }

  pub fn is_environment(&self) -> bool {
    matches!(self, Address::Environment(_))
  }

}


impl Display for Address{
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Address::Heap(i) => {
        write!(f, "HEAP[{}]", i)
      },
      Address::Register(i) => {
        write!(f, "X[{}]", i)
      },
      Address::Environment(i) => {
        write!(f, "Y[{}]", i)
      },
      Address::Undefined => {
        write!(f, "UNDEF")
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_conversion(){
    assert_eq!(Address::Heap(7).idx(), 7);
    assert_eq!(Address::Register(1).idx(), 0);
    assert_eq!(Address::Environment(3).idx(), 2);
    assert_eq!(Address::from_reg_idx(0), Address::Register(1));
    assert_eq!(Address::from_slot_idx(2), Address::Environment(3));
    assert_eq!(Address::from_heap_idx(4), Address::Heap(4));
  }

  #[test]
  fn display_forms(){
    assert_eq!(format!("{}", Address::Heap(0)), "HEAP[0]");
    assert_eq!(format!("{}", Address::Register(2)), "X[2]");
    assert_eq!(format!("{}", Address::Environment(1)), "Y[1]");
  }

  #[test]
  fn areas(){
    assert_eq!(Address::Heap(0).area(), Area::Heap);
    assert_eq!(Address::Environment(1).area(), Area::Environment);
    assert!(Address::Register(1).is_register());
    assert!(!Address::Register(1).is_heap());
  }
}
