/*!

  The process-scoped current machine.

  Entry points take `&mut Machine` explicitly; this thread-local holder exists for the cases
  that cannot: nested sub-interpreters swap the current machine out, install their own for the
  sub-execution, and restore the original on return.

*/

use std::cell::RefCell;

use crate::machine::Machine;

thread_local! {
  static CURRENT: RefCell<Option<Machine>> = RefCell::new(None);
}

/// Installs `machine` as the current machine, returning the one it displaces (to be restored
/// by a later `swap_in`).
pub fn swap_in(machine: Machine) -> Option<Machine> {
  CURRENT.with(|current| current.borrow_mut().replace(machine))
}

/// Removes and returns the current machine, leaving none installed.
pub fn swap_out() -> Option<Machine> {
  CURRENT.with(|current| current.borrow_mut().take())
}

/// Runs `f` against the current machine, if one is installed.
pub fn with_current<F, T>(f: F) -> Option<T>
  where F: FnOnce(&mut Machine) -> T
{
  CURRENT.with(|current| {
    current.borrow_mut().as_mut().map(f)
  })
}
