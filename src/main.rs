use std::process::ExitCode;

use epilog::{Fault, Interpreted, Machine};

fn usage(command: &str) {
  eprintln!("usage: {} <file>", command);
}

fn main() -> ExitCode {
  let mut args = std::env::args();
  let command = args.next().unwrap_or_else(|| "epilog".to_string());

  let path = match args.next() {
    Some(path) => path,
    None => {
      usage(&command);
      return ExitCode::FAILURE;
    }
  };

  let text = match std::fs::read_to_string(&path) {
    Ok(text) => text,
    Err(error) => {
      eprintln!("{}: {}", path, error);
      return ExitCode::FAILURE;
    }
  };

  let clauses = match epilog::parser::parse(&text) {
    Ok(clauses) => clauses,
    Err(errors) => {
      for error in errors {
        eprintln!("{}", error);
      }
      return ExitCode::FAILURE;
    }
  };

  let mut machine = Machine::new();

  for clause in &clauses {
    match machine.interpret(clause) {

      Ok(Interpreted::Extended) => {}

      Ok(Interpreted::Solution(bindings)) => {
        for (name, value) in bindings {
          println!("{} = {}", name, value);
        }
      }

      Err(Fault::Unification { .. }) => {
        println!("false.");
        return ExitCode::FAILURE;
      }

      Err(Fault::Error(error)) => {
        eprintln!("{}", error);
        return ExitCode::FAILURE;
      }

    }
  }

  println!("true.");
  ExitCode::SUCCESS
}
