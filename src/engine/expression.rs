//! Expression parser and evaluator.
//!
//! Expressions are not compiled to a tree. Each evaluation walks the cached
//! token array with a Pratt parser and computes results as it goes, so
//! evaluation order is exactly parse order:
//!
//! ```text
//! expression(rbp):
//!     left = prefix(next token)
//!     while rbp < binding_power(peek):
//!         left = infix(next token, left)      // evaluates its right side first
//!     left
//! ```
//!
//! Intermediate results are [`Operand`]s: a node in the state tree (so that
//! assignment, `del` and `<-` can act on it), a computed value, or a bare
//! name atom (the right side of `.`, `=>` and `#`).

use super::generator::{RuleBook, Session};
use super::tokenizer::Token;
use crate::error::{Error, Result};
use crate::state::NodeId;
use crate::symbols::{Op, OpTraits, Symbol};
use crate::value::{Arith, Value};
use std::sync::Arc;

/// Threshold for unary `+`, `-` and `!`.
const UNARY_POWER: u8 = 100;
/// Threshold for the operand of `let`, `del` and the callee of `=>`.
const KEYWORD_POWER: u8 = 79;
/// Threshold for prefix `^`, which capitalizes everything up to the next low-precedence operator.
const CAPITALIZE_POWER: u8 = 10;

/// A compiled (tokenized) expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    tokens: Arc<[Token]>,
    condition: bool,
}

impl Expression {
    pub(crate) fn compile(source: &str, session: &mut Session) -> Result<Self> {
        let source = source.trim();
        let tokens =
            session.tokens.tokenize(source, &mut session.symbols).map_err(|err| Error::in_expression(source, err))?;
        let condition =
            tokens.iter().any(|token| matches!(token, Token::Op(op) if op.traits().contains(OpTraits::CONDITIONAL)));

        Ok(Expression { source: source.to_string(), tokens, condition })
    }

    /// True when the expression contains an equality or relational operator.
    pub fn is_condition(&self) -> bool {
        self.condition
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against the session's state. `this` is the counter node of
    /// the rule the expression belongs to.
    pub(crate) fn evaluate(&self, book: &RuleBook, session: &mut Session, this: Option<NodeId>) -> Result<Operand> {
        let mut evaluator = Evaluator { tokens: &self.tokens, position: 0, create: false, this, book, session };
        evaluator.run().map_err(|err| Error::in_expression(&self.source, err))
    }

    /// Evaluate and reduce the result to a plain value.
    pub(crate) fn evaluate_value(&self, book: &RuleBook, session: &mut Session, this: Option<NodeId>) -> Result<Value> {
        let operand = self.evaluate(book, session, this)?;
        Ok(operand.into_value(session))
    }
}

/// Result of evaluating (part of) an expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Node(NodeId),
    Value(Value),
    Name(Symbol),
}

impl Operand {
    const NULL: Operand = Operand::Value(Value::Null);

    pub(crate) fn into_value(self, session: &Session) -> Value {
        match self {
            Operand::Node(id) => session.tree.value(id).clone(),
            Operand::Value(value) => value,
            Operand::Name(symbol) => Value::Text(session.symbols.name_of(symbol).to_string()),
        }
    }

    /// The node to bind or attach: existing nodes by address, everything else
    /// as a fresh detached node. Null stays null.
    pub(crate) fn materialize(self, session: &mut Session) -> Option<NodeId> {
        match self {
            Operand::Node(id) => Some(id),
            Operand::Value(Value::Null) => None,
            other => {
                let value = other.into_value(session);
                Some(session.tree.alloc(value))
            }
        }
    }
}

struct Evaluator<'a> {
    tokens: &'a [Token],
    position: usize,
    /// When set, variable reads and `.` lookups fabricate missing nodes.
    create: bool,
    this: Option<NodeId>,
    book: &'a RuleBook,
    session: &'a mut Session,
}

impl Evaluator<'_> {
    fn run(&mut self) -> Result<Operand> {
        let result = self.expression(0)?;
        match self.peek() {
            Token::Op(Op::End) => Ok(result),
            token => Err(Error::syntax(format!("unexpected trailing `{}`", self.describe(token)))),
        }
    }

    fn expression(&mut self, right_power: u8) -> Result<Operand> {
        let token = self.next();
        let mut left = self.prefix(&token)?;
        while right_power < self.peek().binding_power() {
            let token = self.next();
            left = self.infix(&token, left)?;
        }
        Ok(left)
    }

    fn peek(&self) -> &Token {
        // The token stream always ends with `End`, which is never consumed.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, op: Op) -> Result<()> {
        if matches!(self.peek(), Token::Op(found) if *found == op) {
            self.next();
            return Ok(());
        }
        Err(Error::syntax(format!("expected `{}`, found `{}`", op.text(), self.describe(self.peek()))))
    }

    fn describe(&self, token: &Token) -> String {
        match token {
            Token::Op(op) => op.text().to_string(),
            Token::Literal(value) => value.to_string(),
            Token::Name(symbol) | Token::Global(symbol) | Token::Local(symbol) => {
                self.session.symbols.name_of(*symbol).to_string()
            }
        }
    }

    fn value(&self, operand: Operand) -> Value {
        operand.into_value(&*self.session)
    }

    fn prefix(&mut self, token: &Token) -> Result<Operand> {
        let op = match token {
            Token::Literal(value) => return Ok(Operand::Value(value.clone())),
            Token::Name(symbol) => return Ok(Operand::Name(*symbol)),
            Token::Global(symbol) => {
                let root = self.session.root;
                return Ok(self.lookup(root, *symbol));
            }
            Token::Local(symbol) => {
                let scope = self.session.current_scope()?;
                return Ok(self.lookup(scope, *symbol));
            }
            Token::Op(op) => *op,
        };

        match op {
            Op::Null => Ok(Operand::NULL),
            Op::This => Ok(self.this.map_or(Operand::NULL, Operand::Node)),
            Op::Add => {
                let operand = self.expression(UNARY_POWER)?;
                let value = self.value(operand);
                value.as_f64()?;
                Ok(Operand::Value(value))
            }
            Op::Sub => {
                let operand = self.expression(UNARY_POWER)?;
                Ok(Operand::Value(self.value(operand).negate()?))
            }
            Op::Not => {
                let operand = self.expression(UNARY_POWER)?;
                let truthy = self.value(operand).truthy()?;
                Ok(Operand::Value(Value::from_bool(!truthy)))
            }
            Op::Capitalize => {
                let operand = self.expression(CAPITALIZE_POWER)?;
                Ok(Operand::Value(self.value(operand).capitalized()))
            }
            Op::LParen => {
                let saved = std::mem::replace(&mut self.create, false);
                let inner = self.expression(0);
                self.create = saved;
                let inner = inner?;
                self.expect(Op::RParen)?;
                Ok(inner)
            }
            Op::Let => {
                let saved = std::mem::replace(&mut self.create, true);
                let target = self.expression(KEYWORD_POWER);
                self.create = saved;
                target
            }
            Op::Del => match self.expression(KEYWORD_POWER)? {
                Operand::Node(id) => Ok(Operand::Node(self.session.tree.detach(id)?)),
                Operand::Value(Value::Null) => Ok(Operand::NULL),
                other => Err(Error::type_error(format!("cannot delete {}", self.value(other).kind()))),
            },
            Op::Call => self.call(),
            other => Err(Error::syntax(format!("`{}` cannot start an expression", other.text()))),
        }
    }

    fn lookup(&mut self, parent: NodeId, name: Symbol) -> Operand {
        self.session.tree.child_or_create(parent, name, self.create).map_or(Operand::NULL, Operand::Node)
    }

    /// `=>name` or `=>name(arg arg ...)`.
    fn call(&mut self) -> Result<Operand> {
        let callee = self.expression(KEYWORD_POWER)?;
        let rule = self.key(callee, "rule name")?;

        let mut arguments = Vec::new();
        if matches!(self.peek(), Token::Op(Op::LParen)) {
            self.next();
            loop {
                match self.peek() {
                    Token::Op(Op::RParen) => break,
                    Token::Op(Op::End) => return Err(Error::syntax("expected `)` to close the argument list")),
                    _ => {}
                }
                let argument = self.expression(0)?;
                arguments.push(argument.materialize(self.session));
            }
            self.next();
        }

        let text = self.book.call(self.session, rule, &arguments)?;
        Ok(Operand::Value(Value::Text(text)))
    }

    /// A symbol named by a name atom or a text value.
    fn key(&mut self, operand: Operand, what: &str) -> Result<Symbol> {
        match operand {
            Operand::Name(symbol) => Ok(symbol),
            Operand::Value(Value::Text(text)) => Ok(self.session.symbols.intern(&text)),
            other => Err(Error::type_error(format!("expected a {what}, found {}", self.value(other).kind()))),
        }
    }

    fn infix(&mut self, token: &Token, left: Operand) -> Result<Operand> {
        let op = match token {
            Token::Op(op) if infix_allowed(*op) => *op,
            token => return Err(Error::syntax(format!("invalid operator `{}`", self.describe(token)))),
        };
        let right = self.expression(op.binding_power())?;

        match op {
            Op::Add => Ok(Operand::Value(self.value(left).plus(&self.value(right))?)),
            Op::Sub => self.arith(Arith::Sub, left, right),
            Op::Mul => self.arith(Arith::Mul, left, right),
            Op::Div => self.arith(Arith::Div, left, right),
            Op::Eq => Ok(Operand::Value(Value::from_bool(self.value(left).loose_eq(&self.value(right))))),
            Op::NotEq => Ok(Operand::Value(Value::from_bool(!self.value(left).loose_eq(&self.value(right))))),
            Op::Less | Op::Greater | Op::LessEq | Op::GreaterEq => {
                let (a, b) = (self.value(left).as_f64()?, self.value(right).as_f64()?);
                let holds = match op {
                    Op::Less => a < b,
                    Op::Greater => a > b,
                    Op::LessEq => a <= b,
                    _ => a >= b,
                };
                Ok(Operand::Value(Value::from_bool(holds)))
            }
            Op::Dot => match left {
                Operand::Node(id) => {
                    let name = self.key(right, "member name")?;
                    Ok(self.lookup(id, name))
                }
                _ => Ok(Operand::NULL),
            },
            Op::Replace => {
                let target = self.assignable(left, op)?;
                let replacement = right.materialize(self.session);
                Ok(Operand::Node(self.session.tree.replace(target, replacement)?))
            }
            Op::Assign => {
                let target = self.assignable(left, op)?;
                match self.value(right) {
                    Value::Null => Ok(Operand::Node(self.session.tree.replace(target, None)?)),
                    value => {
                        self.session.tree.set_value(target, value);
                        Ok(Operand::Node(target))
                    }
                }
            }
            Op::AddAssign | Op::SubAssign | Op::MulAssign | Op::DivAssign => {
                let target = self.assignable(left, op)?;
                let current = self.session.tree.value(target).clone();
                let operand = self.value(right);
                let updated = match op {
                    Op::AddAssign => current.plus(&operand)?,
                    Op::SubAssign => current.arith(Arith::Sub, &operand)?,
                    Op::MulAssign => current.arith(Arith::Mul, &operand)?,
                    _ => current.arith(Arith::Div, &operand)?,
                };
                self.session.tree.set_value(target, updated);
                Ok(Operand::Node(target))
            }
            Op::And => {
                let holds = self.value(left).truthy()? && self.value(right).truthy()?;
                Ok(Operand::Value(Value::from_bool(holds)))
            }
            Op::Or => {
                let (a, b) = (self.value(left).truthy()?, self.value(right).truthy()?);
                Ok(Operand::Value(Value::from_bool(a || b)))
            }
            Op::Modifier => self.modifier(left, right),
            other => Err(Error::syntax(format!("invalid operator `{}`", other.text()))),
        }
    }

    fn arith(&self, op: Arith, left: Operand, right: Operand) -> Result<Operand> {
        Ok(Operand::Value(self.value(left).arith(op, &self.value(right))?))
    }

    fn assignable(&self, operand: Operand, op: Op) -> Result<NodeId> {
        match operand {
            Operand::Node(id) => Ok(id),
            other => Err(Error::type_error(format!("cannot apply `{}` to {}", op.text(), self.value(other).kind()))),
        }
    }

    fn modifier(&mut self, left: Operand, right: Operand) -> Result<Operand> {
        let name = match right {
            Operand::Name(symbol) => symbol,
            _ => return Err(Error::syntax("missing modifier name after `#`")),
        };
        let book = self.book;
        let label = self.session.symbols.name_of(name).to_string();
        let modifier = book.modifier(&label).ok_or_else(|| Error::UnknownModifier(label.clone()))?;
        let input = self.value(left);
        modifier(&input).map(Operand::Value).map_err(|message| Error::Modifier { name: label, message })
    }
}

fn infix_allowed(op: Op) -> bool {
    !matches!(
        op,
        Op::This
            | Op::Null
            | Op::Not
            | Op::LParen
            | Op::RParen
            | Op::Let
            | Op::Del
            | Op::Call
            | Op::Capitalize
            | Op::End
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Options;

    fn setup() -> (RuleBook, Session) {
        let options = Options { seed: Some(7), ..Options::default() };
        let mut book = RuleBook::default();
        book.install_standard_modifiers();
        (book, Session::new(&options))
    }

    /// Evaluate `source` inside a fresh local scope and return the resulting value.
    fn eval(book: &RuleBook, session: &mut Session, source: &str) -> Result<Value> {
        let expression = Expression::compile(source, session)?;
        session.with_local_scope(|session| expression.evaluate_value(book, session, None))
    }

    #[test]
    fn arithmetic_follows_precedence() {
        let (book, mut session) = setup();
        assert_eq!(eval(&book, &mut session, "1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval(&book, &mut session, "(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(eval(&book, &mut session, "10 - 4 - 3").unwrap(), Value::Int(3));
        assert_eq!(eval(&book, &mut session, "-2 * 3").unwrap(), Value::Int(-6));
        assert_eq!(eval(&book, &mut session, "7 / 2.0").unwrap(), Value::Float(3.5));
    }

    #[test]
    fn unary_plus_accepts_numbers_only() {
        let (book, mut session) = setup();
        assert_eq!(eval(&book, &mut session, "+4").unwrap(), Value::Int(4));
        assert_eq!(eval(&book, &mut session, "+2.5 * 2").unwrap(), Value::Float(5.0));
        assert!(matches!(eval(&book, &mut session, r#"+"ava""#).unwrap_err().root_cause(), Error::Type(_)));
        assert!(matches!(eval(&book, &mut session, "+null").unwrap_err().root_cause(), Error::Type(_)));
    }

    #[test]
    fn compound_assignments_update_in_place() {
        let (book, mut session) = setup();
        eval(&book, &mut session, "let gold = 10").unwrap();
        assert_eq!(eval(&book, &mut session, "gold -= 4").unwrap(), Value::Int(6));
        assert_eq!(eval(&book, &mut session, "gold *= 3").unwrap(), Value::Int(18));
        assert_eq!(eval(&book, &mut session, "gold /= 4").unwrap(), Value::Int(4));
        assert_eq!(eval(&book, &mut session, "gold /= 2.0").unwrap(), Value::Float(2.0));
        assert_eq!(eval(&book, &mut session, "gold").unwrap(), Value::Float(2.0));
    }

    #[test]
    fn compound_assignment_errors() {
        let (book, mut session) = setup();
        eval(&book, &mut session, r#"let name = "Ava""#).unwrap();
        eval(&book, &mut session, "let gold = 3").unwrap();

        for source in ["name -= 1", "name *= 2", "name /= 2", "gold -= null", "missing -= 1", "missing *= 2"] {
            let err = eval(&book, &mut session, source).unwrap_err();
            assert!(matches!(err.root_cause(), Error::Type(_)), "{source}: {err}");
        }
        assert!(matches!(eval(&book, &mut session, "gold /= 0").unwrap_err().root_cause(), Error::Arithmetic(_)));
        assert_eq!(eval(&book, &mut session, "gold").unwrap(), Value::Int(3));
        assert_eq!(eval(&book, &mut session, "name").unwrap(), Value::from("Ava"));
    }

    #[test]
    fn let_materializes_paths_and_reads_do_not() {
        let (book, mut session) = setup();
        assert_eq!(eval(&book, &mut session, "hero.gold").unwrap(), Value::Null);
        assert_eq!(session.tree.child(session.root, session.symbols.intern("hero")), None);

        assert_eq!(eval(&book, &mut session, "let hero.gold = 0").unwrap(), Value::Int(0));
        assert_eq!(eval(&book, &mut session, "hero.gold").unwrap(), Value::Int(0));
        eval(&book, &mut session, "hero.gold += 5").unwrap();
        assert_eq!(eval(&book, &mut session, "hero.gold").unwrap(), Value::Int(5));
    }

    #[test]
    fn parentheses_suppress_create_mode() {
        let (book, mut session) = setup();
        assert_eq!(eval(&book, &mut session, "let (ghost.name)").unwrap(), Value::Null);
        assert_eq!(session.tree.child(session.root, session.symbols.intern("ghost")), None);
    }

    #[test]
    fn null_comparisons() {
        let (book, mut session) = setup();
        assert_eq!(eval(&book, &mut session, "null == null").unwrap(), Value::Int(1));
        assert_eq!(eval(&book, &mut session, "null == 0").unwrap(), Value::Int(0));
        assert_eq!(eval(&book, &mut session, "missing != null").unwrap(), Value::Int(0));
        assert_eq!(eval(&book, &mut session, "!missing").unwrap(), Value::Int(1));
        assert_eq!(eval(&book, &mut session, "!3").unwrap(), Value::Int(0));
    }

    #[test]
    fn relational_and_logical_operators() {
        let (book, mut session) = setup();
        assert_eq!(eval(&book, &mut session, "2 < 3 and 3 >= 3").unwrap(), Value::Int(1));
        assert_eq!(eval(&book, &mut session, "2 > 3 or 0").unwrap(), Value::Int(0));
        assert!(matches!(eval(&book, &mut session, "null < 1").unwrap_err().root_cause(), Error::Type(_)));
    }

    #[test]
    fn addition_concatenates_text() {
        let (book, mut session) = setup();
        assert_eq!(eval(&book, &mut session, r#""gold: " + 3"#).unwrap(), Value::from("gold: 3"));
        assert_eq!(eval(&book, &mut session, r#"^"ava" + " lee""#).unwrap(), Value::from("Ava lee"));
    }

    #[test]
    fn assigning_null_removes_the_node() {
        let (book, mut session) = setup();
        eval(&book, &mut session, r#"let hero.name = "Ava""#).unwrap();
        eval(&book, &mut session, "hero.name = null").unwrap();
        assert_eq!(eval(&book, &mut session, "hero.name == null").unwrap(), Value::Int(1));
    }

    #[test]
    fn del_detaches_and_returns_the_node() {
        let (book, mut session) = setup();
        eval(&book, &mut session, "let loot = 3").unwrap();
        assert_eq!(eval(&book, &mut session, "del loot").unwrap(), Value::Int(3));
        assert_eq!(eval(&book, &mut session, "loot").unwrap(), Value::Null);
        assert!(matches!(eval(&book, &mut session, "del 3").unwrap_err().root_cause(), Error::Type(_)));
    }

    #[test]
    fn replace_moves_the_right_node_into_place() {
        let (book, mut session) = setup();
        eval(&book, &mut session, r#"let a = "first""#).unwrap();
        eval(&book, &mut session, r#"let b = "second""#).unwrap();
        eval(&book, &mut session, "a <- b").unwrap();
        assert_eq!(eval(&book, &mut session, "a").unwrap(), Value::from("second"));
        assert_eq!(eval(&book, &mut session, "b").unwrap(), Value::Null);
    }

    #[test]
    fn locals_are_scoped_to_one_evaluation_scope() {
        let (book, mut session) = setup();
        eval(&book, &mut session, "let Temp = 4").unwrap();
        assert_eq!(eval(&book, &mut session, "Temp").unwrap(), Value::Null);

        let expression = Expression::compile("Temp", &mut session).unwrap();
        let err = expression.evaluate(&book, &mut session, None).unwrap_err();
        assert!(matches!(err.root_cause(), Error::Structure(_)));
    }

    #[test]
    fn modifiers_apply_by_name() {
        let (book, mut session) = setup();
        assert_eq!(eval(&book, &mut session, r#""ava" # upper"#).unwrap(), Value::from("AVA"));
        assert_eq!(eval(&book, &mut session, r#""ava" # length"#).unwrap(), Value::Int(3));
        let err = eval(&book, &mut session, r#""ava" # shout"#).unwrap_err();
        assert!(matches!(err.root_cause(), Error::UnknownModifier(name) if name == "shout"));
    }

    #[test]
    fn syntax_errors_carry_the_expression() {
        let (book, mut session) = setup();
        let err = eval(&book, &mut session, "(1 + 2").unwrap_err();
        assert!(matches!(err.root_cause(), Error::Syntax(_)));
        assert!(err.to_string().starts_with("in expression `(1 + 2`"));

        assert!(matches!(eval(&book, &mut session, "1 2").unwrap_err().root_cause(), Error::Syntax(_)));
        assert!(matches!(eval(&book, &mut session, "1 ^ 2").unwrap_err().root_cause(), Error::Syntax(_)));
        assert!(matches!(eval(&book, &mut session, ") 1").unwrap_err().root_cause(), Error::Syntax(_)));
        assert!(matches!(eval(&book, &mut session, "=>story(").unwrap_err().root_cause(), Error::Syntax(_)));
    }

    #[test]
    fn assigning_to_a_value_is_a_type_error() {
        let (book, mut session) = setup();
        assert!(matches!(eval(&book, &mut session, "3 = 4").unwrap_err().root_cause(), Error::Type(_)));
        assert!(matches!(eval(&book, &mut session, r#""a" - 1"#).unwrap_err().root_cause(), Error::Type(_)));
        assert!(matches!(eval(&book, &mut session, "1 / 0").unwrap_err().root_cause(), Error::Arithmetic(_)));
    }

    #[test]
    fn conditions_are_detected_from_tokens() {
        let (_, mut session) = setup();
        assert!(Expression::compile("flags.met == null", &mut session).unwrap().is_condition());
        assert!(Expression::compile("gold >= 3", &mut session).unwrap().is_condition());
        assert!(!Expression::compile("let flags.met", &mut session).unwrap().is_condition());
        assert!(!Expression::compile(r#""a == b""#, &mut session).unwrap().is_condition());
    }
}
