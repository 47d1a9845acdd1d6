/*!

  This module parses a string representing a program into a sequence of clauses.

  Clauses have the following lexical structure:

    * Comments: `%` to end of line, or a `/* … */` block.
    * Variables: an uppercase letter or underscore followed by alphanumeric characters. A bare
                 `_` is anonymous: every occurrence is a fresh variable.
    * Atoms: a lowercase letter followed by alphanumeric characters, or any single-quoted text
             with `\'` escaping an embedded quote.
    * Integers: a run of decimal digits, optionally preceded by `-`.
    * Structures: an atom optionally followed by a comma-delineated list of terms enclosed in
                  parentheses. A set of empty brackets `()` is equivalent to having no brackets
                  at all.
    * Lists: `[a, b, c]` or `[Head | Tail]`.
    * Infix operators, loosest first: `=` and `is`, then `+`, then `*`. `=`/`is` are only
      meaningful at the goal level; `+` and `*` may appear anywhere a term may.
    * A rule: `head :- goal, …, goal.`  A fact: `head.`  A query: `?- goal, …, goal.`
    * Goal modifiers: a goal may be prefixed with `\+` (negation as failure) or `\:`
      (intercept).

  Whitespace is ignored. On error we skip to the next `.` and keep parsing so that all errors
  in the input are accumulated and reported together.

*/

use string_cache::DefaultAtom;

use crate::chariter::CharIter;
use crate::error::ParseError;
use crate::functor::{ArityType, Functor};
use crate::term::{Clause, Goal, Modifier, Term};

struct Parser<'a>{
  text              : CharIter<'a>,
  errors            : Vec<ParseError>,
  anonymous_counter : usize,
}


/// Parses text to produce abstract syntax trees made of `Clause`s.
pub fn parse(input: &str) -> Result<Vec<Clause>, Vec<ParseError>> {
  let mut parser = Parser::new(input);

  parser.parse()
}

impl<'a> Parser<'a> {

  pub fn new(input: &'a str) -> Self{
    Parser{
      text: CharIter::new(input),
      errors: vec![],
      anonymous_counter: 0,
    }
  }

  pub fn parse(&mut self) -> Result<Vec<Clause>, Vec<ParseError>> {
    let mut clauses: Vec<Clause> = Vec::new();

    loop {
      if !self.skip_ignored() {
        break;
      }
      if self.text.is_empty() {
        break;
      }

      match self.parse_clause() {

        Ok(clause) => {
          clauses.push(clause);
        }

        Err(error) => {
          self.errors.push(error);
          // Synchronize on the next clause terminator so that the remaining clauses can still
          // be checked.
          self.skip_to_period();
        }

      }
    }

    match self.errors.is_empty() {
      true  => Ok(clauses),
      false => Err(std::mem::take(&mut self.errors))
    }
  }

  // region Clause-level productions

  fn parse_clause(&mut self) -> Result<Clause, ParseError> {
    self.skip_ignored();

    if self.text.peek() == Some('?') {
      self.text.next();
      self.expect('-', "Expected `-` after `?` to begin a query.")?;
      let goals = self.parse_body()?;
      self.expect('.', "Expected `.` at the end of the query.")?;
      return Ok(Clause::Query(goals));
    }

    let head = self.parse_structure()?;

    self.skip_ignored();
    match self.text.peek() {

      Some('.') => {
        self.text.next();
        Ok(Clause::Fact(head))
      }

      Some(':') => {
        self.text.next();
        self.expect('-', "Expected `-` after `:` to begin a rule body.")?;
        let goals = self.parse_body()?;
        self.expect('.', "Expected `.` at the end of the rule.")?;
        Ok(Clause::Rule { head, goals })
      }

      Some(c) => Err(self.error_here(
        format!("Expected `.` or `:-` after the clause head, but got `{}`.", c)
      )),

      None => Err(self.error_here(
        "Reached the end of the input while looking for `.`.".to_string()
      )),

    }
  }

  fn parse_body(&mut self) -> Result<Vec<Goal>, ParseError> {
    let mut goals: Vec<Goal> = Vec::new();

    loop {
      goals.push(self.parse_goal()?);

      self.skip_ignored();
      match self.text.peek() {
        Some(',') => {
          self.text.next();
        }
        _ => break
      }
    }

    Ok(goals)
  }

  fn parse_goal(&mut self) -> Result<Goal, ParseError> {
    self.skip_ignored();

    let modifier =
      if self.text.peek() == Some('\\') {
        self.text.next();
        match self.text.next() {
          Some('+') => Modifier::Negate,
          Some(':') => Modifier::Intercept,
          other => {
            return Err(self.error_here(format!(
              "Expected `+` or `:` after `\\`, but got `{}`.",
              other.map_or("end of input".to_string(), |c| c.to_string())
            )));
          }
        }
      } else {
        Modifier::None
      };

    let predicate = self.parse_goal_expression()?;
    match predicate {

      Term::Predicate { .. } => Ok(Goal { modifier, predicate }),

      other => Err(self.error_here(
        format!("A goal must be a predicate, but got `{}`.", other)
      )),

    }
  }

  /// A goal-level expression: an additive expression optionally joined to a second one by the
  /// infix `=` or `is`.
  fn parse_goal_expression(&mut self) -> Result<Term, ParseError> {
    let left = self.parse_additive()?;

    self.skip_ignored();
    match self.text.peek() {

      Some('=') => {
        self.text.next();
        let right = self.parse_additive()?;
        Ok(Term::Predicate {
          functor: Functor::new("=", 2),
          args: vec![left, right]
        })
      }

      Some(c) if c.is_lowercase() => {
        // After a complete term the only thing an identifier can be is an infix operator.
        let name = self.lex_identifier();
        if name == "is" {
          let right = self.parse_additive()?;
          Ok(Term::Predicate {
            functor: Functor::new("is", 2),
            args: vec![left, right]
          })
        } else {
          Err(self.error_here(format!("Unknown infix operator `{}`.", name)))
        }
      }

      _ => Ok(left)

    }
  }

  // endregion

  // region Term-level productions

  fn parse_additive(&mut self) -> Result<Term, ParseError> {
    let mut left = self.parse_multiplicative()?;

    loop {
      self.skip_ignored();
      if self.text.peek() == Some('+') {
        self.text.next();
        let right = self.parse_multiplicative()?;
        left = Term::Predicate {
          functor: Functor::new("+", 2),
          args: vec![left, right]
        };
      } else {
        break;
      }
    }

    Ok(left)
  }

  fn parse_multiplicative(&mut self) -> Result<Term, ParseError> {
    let mut left = self.parse_primary()?;

    loop {
      self.skip_ignored();
      if self.text.peek() == Some('*') {
        self.text.next();
        let right = self.parse_primary()?;
        left = Term::Predicate {
          functor: Functor::new("*", 2),
          args: vec![left, right]
        };
      } else {
        break;
      }
    }

    Ok(left)
  }

  fn parse_primary(&mut self) -> Result<Term, ParseError> {
    self.skip_ignored();

    match self.text.peek() {

      None => Err(self.error_here("Unexpected end of input.".to_string())),

      Some('(') => {
        self.text.next();
        let term = self.parse_additive()?;
        self.expect(')', "Expected `)` to close the parenthesized term.")?;
        Ok(term)
      }

      Some('[') => self.parse_list(),

      Some('\'') => {
        let name = self.lex_quoted()?;
        // Quoted names may head a structure just as plain identifiers may.
        self.parse_structure_tail(name)
      }

      Some('-') => {
        self.text.next();
        match self.text.peek() {
          Some(c) if c.is_ascii_digit() => {
            let digits = self.lex_integer()?;
            Ok(Term::Integer(-digits))
          }
          _ => Err(self.error_here("Expected digits after `-`.".to_string()))
        }
      }

      Some(c) if c.is_ascii_digit() => {
        Ok(Term::Integer(self.lex_integer()?))
      }

      Some(c) if c.is_lowercase() => {
        let name = DefaultAtom::from(self.lex_identifier());
        match self.structure_args()? {
          Some(args) => Ok(Term::Predicate {
            functor: Functor { name, arity: args.len() as ArityType },
            args
          }),
          None => Ok(Term::Predicate {
            functor: Functor { name, arity: 0 },
            args: vec![]
          })
        }
      }

      Some(c) if c.is_uppercase() || c == '_' => {
        let name = self.lex_identifier();
        if name == "_" {
          // Anonymous: every occurrence is distinct.
          self.anonymous_counter += 1;
          Ok(Term::Variable(DefaultAtom::from(
            format!("_G{}", self.anonymous_counter)
          )))
        } else {
          Ok(Term::Variable(DefaultAtom::from(name)))
        }
      }

      Some(c) => Err(self.error_here(format!("Unexpected character `{}`.", c))),

    }
  }

  /// Parses a structure whose head atom must be a plain identifier.
  fn parse_structure(&mut self) -> Result<Term, ParseError> {
    self.skip_ignored();

    match self.text.peek() {

      Some('\'') => {
        let name = self.lex_quoted()?;
        match self.parse_structure_tail(name)? {
          term @ Term::Predicate { .. } => Ok(term),
          // A bare quoted atom is a valid head: lowering turns `Text` into an atom.
          Term::Text(name) => Ok(Term::Predicate {
            functor: Functor { name, arity: 0 },
            args: vec![]
          }),
          other => Err(self.error_here(
            format!("Expected a predicate, but got `{}`.", other)
          )),
        }
      }

      Some(c) if c.is_lowercase() => {
        let name = DefaultAtom::from(self.lex_identifier());
        let args = self.structure_args()?.unwrap_or_default();
        Ok(Term::Predicate {
          functor: Functor { name, arity: args.len() as ArityType },
          args
        })
      }

      Some(c) => Err(self.error_here(
        format!("Expected a predicate name, but got `{}`.", c)
      )),

      None => Err(self.error_here("Unexpected end of input.".to_string())),

    }
  }

  /// A quoted name has been lexed; decide whether it heads a structure or stands alone as a
  /// string literal.
  fn parse_structure_tail(&mut self, name: DefaultAtom) -> Result<Term, ParseError> {
    match self.structure_args()? {
      Some(args) => Ok(Term::Predicate {
        functor: Functor { name, arity: args.len() as ArityType },
        args
      }),
      None => Ok(Term::Text(name))
    }
  }

  /**
    Parses a comma separated argument list in parentheses and returns the terms in a vector, or
    `None` when no parentheses follow. As `()` is equivalent to no brackets at all, the vector
    returned may be empty.
  */
  fn structure_args(&mut self) -> Result<Option<Vec<Term>>, ParseError> {
    self.skip_ignored();
    if self.text.peek() != Some('(') {
      // Constants can omit parentheses, as they have no arguments.
      return Ok(None);
    }
    // Eat `(`
    self.text.next();

    self.skip_ignored();
    if self.text.peek() == Some(')') {
      self.text.next();
      return Ok(Some(vec![]));
    }

    let mut args: Vec<Term> = Vec::new();
    loop {
      args.push(self.parse_additive()?);

      self.skip_ignored();
      match self.text.peek() {

        Some(',') => {
          // Eat the `,` character.
          self.text.next();
        },

        Some(')') => {
          // Eat the `)` character and return.
          self.text.next();
          break;
        },

        Some(unexpected) => {
          return Err(self.error_here(format!(
            "Expected `,` or `)` in the argument list, but got `{}`.",
            unexpected
          )));
        }

        None => {
          return Err(self.error_here(
            "Incomplete argument list. Perhaps you are missing `)`?".to_string()
          ));
        }

      } // end match peek
    } // end loop

    Ok(Some(args))
  }

  fn parse_list(&mut self) -> Result<Term, ParseError> {
    // Eat `[`
    self.text.next();

    self.skip_ignored();
    if self.text.peek() == Some(']') {
      self.text.next();
      return Ok(Term::List { items: vec![], tail: None });
    }

    let mut items: Vec<Term> = Vec::new();
    let mut tail: Option<Box<Term>> = None;

    loop {
      items.push(self.parse_additive()?);

      self.skip_ignored();
      match self.text.peek() {

        Some(',') => {
          self.text.next();
        }

        Some('|') => {
          self.text.next();
          tail = Some(Box::new(self.parse_additive()?));
          self.skip_ignored();
          self.expect(']', "Expected `]` after the list tail.")?;
          break;
        }

        Some(']') => {
          self.text.next();
          break;
        }

        Some(unexpected) => {
          return Err(self.error_here(format!(
            "Expected `,`, `|`, or `]` in the list, but got `{}`.",
            unexpected
          )));
        }

        None => {
          return Err(self.error_here(
            "Reached the end of the input while looking for `]`.".to_string()
          ));
        }

      }
    }

    Ok(Term::List { items, tail })
  }

  // endregion

  // region Lexical helpers

  fn lex_identifier(&mut self) -> String {
    let mut name = String::new();
    while let Some(c) = self.text.peek() {
      if c.is_alphanumeric() || c == '_' {
        name.push(c);
        self.text.next();
      } else {
        break;
      }
    }
    name
  }

  fn lex_integer(&mut self) -> Result<i64, ParseError> {
    let digits = self.text.get_prefix_match(|c| c.is_ascii_digit()).unwrap_or_default();
    digits.parse::<i64>().map_err(|_| {
      self.error_here(format!("The integer literal `{}` is out of range.", digits))
    })
  }

  /**
    Lexes a single-quoted name. The text between the quotes, escapes included, is kept verbatim
    with its surrounding quotes unless it is an ordinary identifier, in which case the quotes
    are dropped on the spot. Rendering strips the retained quotes and unescapes `\'`.
  */
  fn lex_quoted(&mut self) -> Result<DefaultAtom, ParseError> {
    // Eat the opening `'`.
    self.text.next();

    let mut raw = String::new();
    loop {
      match self.text.next() {

        Some('\\') => {
          raw.push('\\');
          match self.text.next() {
            Some(c) => raw.push(c),
            None => {
              return Err(self.error_here("Unterminated quoted name.".to_string()));
            }
          }
        }

        Some('\'') => break,

        Some(c) => raw.push(c),

        None => {
          return Err(self.error_here("Unterminated quoted name.".to_string()));
        }

      }
    }

    let is_simple_identifier =
      raw.chars().next().map_or(false, |c| c.is_lowercase())
      && raw.chars().all(|c| c.is_alphanumeric() || c == '_');

    match is_simple_identifier {
      true  => Ok(DefaultAtom::from(raw)),
      false => Ok(DefaultAtom::from(format!("'{}'", raw)))
    }
  }

  /**
    Skips whitespace and comments. Returns `false` when a lexical error was recorded (an
    unterminated block comment), in which case parsing should stop.
  */
  fn skip_ignored(&mut self) -> bool {
    loop {
      self.text.trim_left();

      match self.text.peek() {

        // Single-line comments
        Some('%') => {
          // Eat until EOL or EOF.
          while let Some(c) = self.text.next() {
            if c == '\n' {
              break;
            }
          }
        }

        // Block comments
        Some('/') => {
          // `/` only begins a comment; peek can't see the `*`, so consume and check.
          self.text.next();
          if self.text.peek() != Some('*') {
            self.errors.push(self.error_here("Unexpected character `/`.".to_string()));
            return false;
          }
          self.text.next();
          let mut terminated = false;
          while let Some(c) = self.text.next() {
            if c == '*' && self.text.peek() == Some('/') {
              self.text.next();
              terminated = true;
              break;
            }
          }
          if !terminated {
            self.errors.push(self.error_here("Unterminated `/*`.".to_string()));
            return false;
          }
        }

        _ => return true,

      }
    }
  }

  fn skip_to_period(&mut self) {
    while let Some(c) = self.text.next() {
      if c == '.' {
        break;
      }
    }
  }

  fn expect(&mut self, expected: char, message: &str) -> Result<(), ParseError> {
    self.skip_ignored();
    match self.text.peek() {
      Some(c) if c == expected => {
        self.text.next();
        Ok(())
      }
      _ => Err(self.error_here(message.to_string()))
    }
  }

  fn error_here(&self, message: String) -> ParseError {
    let (row, column) = self.text.location();
    ParseError { message, row, column }
  }

  // endregion
}


#[cfg(test)]
mod tests {
  use super::*;

  fn parse_one(text: &str) -> Clause {
    let clauses = parse(text).expect("parse failed");
    assert_eq!(clauses.len(), 1);
    clauses.into_iter().next().unwrap()
  }

  #[test]
  fn facts_and_rules(){
    let clauses = parse("parent(tom, bob).\nparent(bob, ann).\n\
                         grandparent(X, Z) :- parent(X, Y), parent(Y, Z).")
      .expect("parse failed");
    assert_eq!(clauses.len(), 3);
    assert_eq!(format!("{}", clauses[0]), "parent(tom, bob).");
    assert_eq!(
      format!("{}", clauses[2]),
      "grandparent(X, Z) :- parent(X, Y), parent(Y, Z)."
    );
  }

  #[test]
  fn queries(){
    let clause = parse_one("?- grandparent(tom, W).");
    match clause {
      Clause::Query(goals) => {
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].modifier, Modifier::None);
        assert_eq!(goals[0].predicate.functor(), Some(Functor::new("grandparent", 2)));
      }
      _ => panic!("expected a query"),
    }
  }

  #[test]
  fn goal_modifiers(){
    let clause = parse_one("?- \\+ p(b), \\: q(a).");
    match clause {
      Clause::Query(goals) => {
        assert_eq!(goals[0].modifier, Modifier::Negate);
        assert_eq!(goals[1].modifier, Modifier::Intercept);
      }
      _ => panic!("expected a query"),
    }
  }

  #[test]
  fn equality_and_arithmetic(){
    let clause = parse_one("?- X is (1 + 2) * 3.");
    match clause {
      Clause::Query(goals) => {
        let is_goal = &goals[0].predicate;
        assert_eq!(is_goal.functor(), Some(Functor::new("is", 2)));
        // (1 + 2) * 3 parses as *(+(1, 2), 3).
        if let Term::Predicate { args, .. } = is_goal {
          assert_eq!(args[1].functor(), Some(Functor::new("*", 2)));
          if let Term::Predicate { args, .. } = &args[1] {
            assert_eq!(args[0].functor(), Some(Functor::new("+", 2)));
            assert_eq!(args[1], Term::Integer(3));
          }
        }
      }
      _ => panic!("expected a query"),
    }
  }

  #[test]
  fn multiplication_binds_tighter_than_addition(){
    let clause = parse_one("?- X is 1 + 2 * 3.");
    match clause {
      Clause::Query(goals) => {
        if let Term::Predicate { args, .. } = &goals[0].predicate {
          // 1 + 2 * 3 parses as +(1, *(2, 3)).
          assert_eq!(args[1].functor(), Some(Functor::new("+", 2)));
        }
      }
      _ => panic!("expected a query"),
    }
  }

  #[test]
  fn equals_goal(){
    let clause = parse_one("q(X) :- p(X), X = 2.");
    match clause {
      Clause::Rule { goals, .. } => {
        assert_eq!(goals[1].predicate.functor(), Some(Functor::new("=", 2)));
      }
      _ => panic!("expected a rule"),
    }
  }

  #[test]
  fn lists(){
    let clause = parse_one("head([H|_], H).");
    match clause {
      Clause::Fact(Term::Predicate { args, .. }) => {
        match &args[0] {
          Term::List { items, tail } => {
            assert_eq!(items.len(), 1);
            assert!(tail.is_some());
            // The anonymous tail is a fresh variable, not a literal underscore.
            if let Some(tail) = tail {
              assert!(matches!(**tail, Term::Variable(_)));
            }
          }
          _ => panic!("expected a list"),
        }
      }
      _ => panic!("expected a fact"),
    }
  }

  #[test]
  fn anonymous_variables_are_distinct(){
    let clause = parse_one("p(_, _).");
    match clause {
      Clause::Fact(Term::Predicate { args, .. }) => {
        assert_ne!(args[0], args[1]);
      }
      _ => panic!("expected a fact"),
    }
  }

  #[test]
  fn comments_are_ignored(){
    let clauses = parse("% a line comment\n/* a block\ncomment */ p(a). % trailing\n")
      .expect("parse failed");
    assert_eq!(clauses.len(), 1);
  }

  #[test]
  fn quoted_atoms(){
    let clause = parse_one("p('hello world').");
    match clause {
      Clause::Fact(Term::Predicate { args, .. }) => {
        assert_eq!(args[0], Term::Text(DefaultAtom::from("'hello world'")));
      }
      _ => panic!("expected a fact"),
    }

    // A quoted simple identifier is unquoted on the spot.
    let clause = parse_one("p('tom').");
    match clause {
      Clause::Fact(Term::Predicate { args, .. }) => {
        assert_eq!(args[0], Term::Text(DefaultAtom::from("tom")));
      }
      _ => panic!("expected a fact"),
    }
  }

  #[test]
  fn empty_parens_equal_no_parens(){
    let clause = parse_one("p().");
    match clause {
      Clause::Fact(head) => {
        assert_eq!(head.functor(), Some(Functor::atom("p")));
      }
      _ => panic!("expected a fact"),
    }
  }

  #[test]
  fn negative_integers(){
    let clause = parse_one("p(-42).");
    match clause {
      Clause::Fact(Term::Predicate { args, .. }) => {
        assert_eq!(args[0], Term::Integer(-42));
      }
      _ => panic!("expected a fact"),
    }
  }

  #[test]
  fn errors_accumulate_across_clauses(){
    let result = parse("p(a. q(]. r(c).");
    match result {
      Err(errors) => {
        assert!(errors.len() >= 2);
      }
      Ok(_) => panic!("expected errors"),
    }
  }

  #[test]
  fn unterminated_block_comment_is_an_error(){
    assert!(parse("/* no end").is_err());
  }
}
