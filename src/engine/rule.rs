//! Rules: one named production each.
//!
//! A rule line has a head and a body separated by `=>`:
//!
//! ```text
//! greet Who, flag greeted, Who != null => "Hello, [Who # capitalize]!", gold += 1
//! └─┬─┘ └┬┘  └──────────┬────────────┘    └──────────────┬──────────┘  └───┬───┘
//!  name params   head expressions               template            tail expressions
//! ```
//!
//! Expressions containing a comparison become conditions, the rest effects.
//! Template insets (`[...]`) are compiled once here and evaluated on every
//! execution.

use super::expression::{Expression, Operand};
use super::generator::{RuleBook, Session};
use crate::error::{Error, Result};
use crate::state::{Loan, NodeId};
use crate::symbols::Symbol;
use crate::value::Value;

/// A piece of a rule template.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// Literal text, already unescaped.
    Text(String),
    /// Index into the rule's inset expressions.
    Inset(usize),
}

#[derive(Debug)]
pub struct Rule {
    name: Symbol,
    rank: u32,
    parameters: Vec<Expression>,
    conditions: Vec<Expression>,
    effects: Vec<Expression>,
    insets: Vec<Expression>,
    segments: Vec<Segment>,
    /// Persistent node holding this rule's `count`; `this` inside the rule.
    counter: NodeId,
}

impl Rule {
    /// Parse one logical rule line.
    pub(crate) fn parse(line: &str, session: &mut Session) -> Result<Rule> {
        let line = line.trim();
        let (head, body) = split_arrow(line).ok_or_else(|| Error::rule(line, "missing `=>`"))?;

        let (signature, head_expressions) = head.split_once(',').unwrap_or((head, ""));
        let mut words = signature.split_whitespace();
        let name = words.next().ok_or_else(|| Error::rule(line, "missing rule name"))?;
        let parameters: Vec<String> = words.map(str::to_string).collect();
        for word in std::iter::once(name).chain(parameters.iter().map(String::as_str)) {
            if !is_valid_name(word) {
                return Err(Error::rule(line, format!("`{word}` is not a valid name")));
            }
        }

        let (template, tail_expressions) = split_template(body).ok_or_else(|| Error::rule(line, "unterminated template"))?;
        let mut expressions = split_expressions(&expand_flags(head_expressions));
        expressions.extend(split_expressions(&expand_flags(tail_expressions)));

        let name = session.symbols.intern(name);
        Rule::new(name, template, &expressions, &parameters, session)
    }

    /// Build a rule from already separated parts. `template` is the text
    /// between the quotes.
    pub(crate) fn new(
        name: Symbol,
        template: &str,
        expressions: &[String],
        parameters: &[String],
        session: &mut Session,
    ) -> Result<Rule> {
        let parameters = parameters
            .iter()
            .map(|parameter| Expression::compile(&format!("let {parameter} = 0"), session))
            .collect::<Result<Vec<_>>>()?;

        let (mut conditions, mut effects) = (Vec::new(), Vec::new());
        for source in expressions {
            let expression = Expression::compile(source, session)?;
            if expression.is_condition() {
                conditions.push(expression);
            } else {
                effects.push(expression);
            }
        }

        let (segments, inset_sources) = scan_template(template);
        let insets = inset_sources.iter().map(|source| Expression::compile(source, session)).collect::<Result<Vec<_>>>()?;

        let counter = session.tree.alloc(Value::Null);
        session.tree.child_or_create(counter, session.count, true);

        let rank = conditions.len() as u32 + 1;
        Ok(Rule { name, rank, parameters, conditions, effects, insets, segments, counter })
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Selection weight: one more than the number of conditions.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn counter(&self) -> NodeId {
        self.counter
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the rule applies to `arguments` in the current state.
    ///
    /// Conditions run in a throwaway local scope and stop at the first false
    /// one. Evaluation errors propagate.
    pub(crate) fn check(&self, book: &RuleBook, session: &mut Session, arguments: &[Option<NodeId>]) -> Result<bool> {
        if arguments.len() < self.arity() {
            return Ok(false);
        }

        session.with_local_scope(|session| {
            self.with_parameters(book, session, arguments, |session| {
                for condition in &self.conditions {
                    let value = condition.evaluate_value(book, session, Some(self.counter))?;
                    if !value.truthy().map_err(|err| Error::in_expression(condition.source(), err))? {
                        return Ok(false);
                    }
                }
                Ok(true)
            })
        })
    }

    /// Run the rule: bump its counter, bind parameters, apply effects, then
    /// fill the template insets in order.
    pub(crate) fn execute(&self, book: &RuleBook, session: &mut Session, arguments: &[Option<NodeId>]) -> Result<String> {
        session.with_local_scope(|session| {
            if let Some(count) = session.tree.child_or_create(self.counter, session.count, true) {
                let next = session.tree.value(count).plus(&Value::Int(1))?;
                session.tree.set_value(count, next);
            }

            self.with_parameters(book, session, arguments, |session| {
                for effect in &self.effects {
                    effect.evaluate(book, session, Some(self.counter))?;
                }

                let mut text = String::new();
                for segment in &self.segments {
                    match segment {
                        Segment::Text(literal) => text.push_str(literal),
                        Segment::Inset(index) => {
                            let value = self.insets[*index].evaluate_value(book, session, Some(self.counter))?;
                            text.push_str(&value.as_text());
                        }
                    }
                }
                Ok(text)
            })
        })
    }

    /// Bind the parameters, run `body`, then hand every borrowed argument
    /// back to its caller's slot, whether `body` failed or not.
    fn with_parameters<T>(
        &self,
        book: &RuleBook,
        session: &mut Session,
        arguments: &[Option<NodeId>],
        body: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let mut loans = Vec::new();
        let result = self.bind_parameters(book, session, arguments, &mut loans).and_then(|()| body(session));
        for loan in loans.into_iter().rev() {
            session.tree.give_back(loan);
        }
        result
    }

    /// Evaluate each `let P = 0` in the fresh scope, then put the caller's
    /// argument in that slot.
    fn bind_parameters(
        &self,
        book: &RuleBook,
        session: &mut Session,
        arguments: &[Option<NodeId>],
        loans: &mut Vec<Loan>,
    ) -> Result<()> {
        for (parameter, argument) in self.parameters.iter().zip(arguments) {
            match parameter.evaluate(book, session, Some(self.counter))? {
                Operand::Node(slot) => {
                    loans.extend(session.tree.bind(slot, *argument)?);
                }
                _ => {
                    let err = Error::type_error("parameter did not resolve to a node");
                    return Err(Error::in_expression(parameter.source(), err));
                }
            }
        }
        Ok(())
    }
}

/// Rule and parameter names: ASCII letters, digits and underscores.
pub(crate) fn is_valid_name(word: &str) -> bool {
    regex!(r"^[A-Za-z0-9_]+$").is_match(word)
}

/// Split at the first `=>` that starts the line or follows whitespace, and is
/// followed by whitespace, a quote, or the end of the line.
fn split_arrow(line: &str) -> Option<(&str, &str)> {
    let found = regex!(r#"(?:^|\s)=>(?:\s|"|$)"#).find(line)?;
    let at = found.start() + found.as_str().find("=>")?;
    Some((&line[..at], &line[at + 2..]))
}

/// Separate the optional quoted template from the tail expressions.
fn split_template(body: &str) -> Option<(&str, &str)> {
    let body = body.trim_start();
    let Some(quoted) = body.strip_prefix('"') else {
        return Some(("", body.strip_prefix(',').unwrap_or(body)));
    };

    let mut escaped = false;
    for (index, c) in quoted.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                let rest = quoted[index + 1..].trim_start();
                return Some((&quoted[..index], rest.strip_prefix(',').unwrap_or(rest)));
            }
            _ => {}
        }
    }
    None
}

/// `flag X` is shorthand for "X not set yet, then set it".
fn expand_flags(text: &str) -> String {
    regex!(r"\bflag\s+([A-Za-z0-9_.]+)").replace_all(text, "flags.${1} == null, let flags.${1}").into_owned()
}

/// Split on commas outside quoted literals, dropping blank entries.
fn split_expressions(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for c in text.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);

    parts.into_iter().map(|part| part.trim().to_string()).filter(|part| !part.is_empty()).collect()
}

/// Break a template into literal segments and inset sources.
fn scan_template(template: &str) -> (Vec<Segment>, Vec<String>) {
    let mut segments = Vec::new();
    let mut insets = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => {
                literal.push(c);
                if let Some((_, escaped)) = chars.next() {
                    literal.push(escaped);
                }
            }
            '[' => match template[index + 1..].find(']') {
                Some(length) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Text(unescape(&std::mem::take(&mut literal))));
                    }
                    let source = &template[index + 1..index + 1 + length];
                    insets.push(source.replace("\\\"", "\""));
                    segments.push(Segment::Inset(insets.len() - 1));
                    while chars.next_if(|&(at, _)| at <= index + 1 + length).is_some() {}
                }
                None => literal.push(c),
            },
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Text(unescape(&literal)));
    }

    (segments, insets)
}

/// Resolve template escapes: `\n`, `\"`, `\[` and `\]`.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(escaped @ ('"' | '[' | ']')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Options;

    fn session() -> Session {
        Session::new(&Options { seed: Some(1), ..Options::default() })
    }

    #[test]
    fn arrow_split_ignores_arrows_inside_expressions() {
        assert_eq!(split_arrow(r#"greet => "hi""#), Some(("greet ", r#" "hi""#)));
        assert_eq!(split_arrow(r#"greet =>"hi""#), Some(("greet ", r#""hi""#)));
        assert_eq!(split_arrow("story, =>intro != null =>"), Some(("story, =>intro != null ", "")));
        assert_eq!(split_arrow("=> \"x\""), Some(("", " \"x\"")));
        assert_eq!(split_arrow("no arrow here"), None);
    }

    #[test]
    fn template_and_tail_are_separated() {
        assert_eq!(split_template(r#" "Hello, [Who]!", gold += 1"#), Some(("Hello, [Who]!", "gold += 1")));
        assert_eq!(split_template(r#" "say \"hi\"""#), Some((r#"say \"hi\""#, "")));
        assert_eq!(split_template(" , let done"), Some(("", "let done")));
        assert_eq!(split_template(r#" "open"#), None);
    }

    #[test]
    fn flags_expand_to_a_guard_and_a_setter() {
        assert_eq!(expand_flags("flag met_ava"), "flags.met_ava == null, let flags.met_ava");
        assert_eq!(expand_flags("a, flag quest.done"), "a, flags.quest.done == null, let flags.quest.done");
        assert_eq!(expand_flags("redflag x"), "redflag x");
    }

    #[test]
    fn expression_lists_respect_quotes() {
        assert_eq!(split_expressions(r#"a = "x, y", , b += 1 "#), vec![r#"a = "x, y""#, "b += 1"]);
        assert_eq!(split_expressions(r#"a = "\"q\", r""#), vec![r#"a = "\"q\", r""#]);
        assert!(split_expressions("  ").is_empty());
    }

    #[test]
    fn template_scan_extracts_insets_and_unescapes_text() {
        let (segments, insets) = scan_template(r#"Line1\nLine2 \[bracket\] [name # upper] [\"!\"]"#);
        assert_eq!(
            segments,
            vec![
                Segment::Text("Line1\nLine2 [bracket] ".to_string()),
                Segment::Inset(0),
                Segment::Text(" ".to_string()),
                Segment::Inset(1),
            ]
        );
        assert_eq!(insets, vec!["name # upper".to_string(), "\"!\"".to_string()]);
    }

    #[test]
    fn unclosed_bracket_stays_literal() {
        let (segments, insets) = scan_template("a [b");
        assert_eq!(segments, vec![Segment::Text("a [b".to_string())]);
        assert!(insets.is_empty());
    }

    #[test]
    fn parse_classifies_expressions_and_ranks() {
        let mut session = session();
        let rule = Rule::parse(r#"greet Who, flag greeted, Who != null => "Hi [Who]", gold += 1"#, &mut session).unwrap();
        assert_eq!(session.symbols.name_of(rule.name()), "greet");
        assert_eq!(rule.arity(), 1);
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(rule.effects.len(), 2);
        assert_eq!(rule.rank(), 3);
        assert_eq!(rule.insets.len(), 1);
        assert_eq!(session.tree.value(session.tree.child(rule.counter(), session.count).unwrap()), &Value::Int(0));
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        let mut session = session();
        assert!(matches!(Rule::parse("greet \"hi\"", &mut session), Err(Error::Rule { .. })));
        assert!(matches!(Rule::parse("=> \"hi\"", &mut session), Err(Error::Rule { .. })));
        assert!(matches!(Rule::parse("gr-eet => \"hi\"", &mut session), Err(Error::Rule { .. })));
        assert!(matches!(Rule::parse("greet => \"hi", &mut session), Err(Error::Rule { .. })));
        assert!(matches!(Rule::parse("greet, a @ b => \"hi\"", &mut session), Err(Error::InExpression { .. })));
    }
}
