//! Expression tokenizer.
//!
//! Splits expression text with a single regex, then classifies each piece in a
//! fixed order:
//!
//! ```text
//! "let" "del" "and" "or" "null" "this"  -> keyword operator
//! "quoted \"text\""                     -> text literal (quotes stripped)
//! 12 / 1.5                              -> number literal
//! identifier after `.` `=>` `#`         -> name atom
//! identifier starting lowercase         -> global variable
//! other identifier                      -> local variable
//! anything else                         -> operator via the symbol table
//! ```
//!
//! Rule expressions are tokenized once at load time; a one-entry cache keyed
//! by the exact text skips re-lexing when the same text comes up again (every
//! parameter compiles to the same `let X = 0` shape, for example).

use crate::error::{Error, Result};
use crate::symbols::{Op, OpTraits, Symbol, SymbolTable};
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Op(Op),
    Literal(Value),
    /// An identifier used as a key or rule name rather than looked up.
    Name(Symbol),
    Global(Symbol),
    Local(Symbol),
}

impl Token {
    /// Left binding power; operands never continue an expression.
    pub fn binding_power(&self) -> u8 {
        match self {
            Token::Op(op) => op.binding_power(),
            _ => 0,
        }
    }
}

/// Tokenize `text`, always ending the stream with [`Op::End`].
pub fn tokenize(text: &str, symbols: &mut SymbolTable) -> Result<Vec<Token>> {
    let pieces = regex!(r#"[0-9]+(?:\.[0-9]+)?|[()]|\^|=>|<-|[+\-*/<>!=]=?|"(?:\\.|[^"\\])*"|[A-Za-z0-9_]+|[.#]"#);

    let mut tokens = Vec::new();
    let mut last_end = 0;
    for piece in pieces.find_iter(text) {
        let gap = &text[last_end..piece.start()];
        if let Some(stray) = gap.split_whitespace().next() {
            return Err(Error::Lex { token: stray.to_string() });
        }
        last_end = piece.end();

        let previous = tokens.last();
        let token = classify(piece.as_str(), previous, symbols)?;
        tokens.push(token);
    }
    if let Some(stray) = text[last_end..].split_whitespace().next() {
        return Err(Error::Lex { token: stray.to_string() });
    }

    tokens.push(Token::Op(Op::End));
    Ok(tokens)
}

fn classify(piece: &str, previous: Option<&Token>, symbols: &mut SymbolTable) -> Result<Token> {
    if let Some(op) = symbols.lookup(piece).and_then(Op::from_symbol) {
        if op.traits().contains(OpTraits::KEYWORD) {
            return Ok(Token::Op(op));
        }
    }

    if piece.len() >= 2 && piece.starts_with('"') && piece.ends_with('"') {
        return Ok(Token::Literal(Value::Text(unquote(&piece[1..piece.len() - 1]))));
    }

    let first = piece.chars().next().unwrap_or(' ');
    if first.is_ascii_digit() {
        return number(piece);
    }

    if first.is_ascii_alphanumeric() || first == '_' {
        let symbol = symbols.intern(piece);
        let after_path = matches!(previous, Some(Token::Op(op)) if op.traits().contains(OpTraits::PATH));
        return Ok(if after_path {
            Token::Name(symbol)
        } else if first.is_lowercase() {
            Token::Global(symbol)
        } else {
            Token::Local(symbol)
        });
    }

    match symbols.lookup(piece).and_then(Op::from_symbol) {
        Some(op) => Ok(Token::Op(op)),
        None => Err(Error::Lex { token: piece.to_string() }),
    }
}

fn number(piece: &str) -> Result<Token> {
    let value = if piece.contains('.') {
        piece.parse::<f64>().map(Value::Float).ok()
    } else {
        piece.parse::<i64>().map(Value::Int).ok()
    };
    value.map(Token::Literal).ok_or_else(|| Error::Lex { token: piece.to_string() })
}

/// Resolve `\"` and `\\` inside a quoted literal.
fn unquote(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped @ ('"' | '\\')) => out.push(escaped),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// One-entry cache of the most recently tokenized text.
#[derive(Debug, Default)]
pub struct TokenCache {
    last: Option<(String, Arc<[Token]>)>,
    hits: usize,
}

impl TokenCache {
    pub fn tokenize(&mut self, text: &str, symbols: &mut SymbolTable) -> Result<Arc<[Token]>> {
        if let Some((cached, tokens)) = &self.last {
            if cached == text {
                self.hits += 1;
                tracing::trace!(expression = text, "token cache hit");
                return Ok(Arc::clone(tokens));
            }
        }

        let tokens: Arc<[Token]> = tokenize(text, symbols)?.into();
        self.last = Some((text.to_string(), Arc::clone(&tokens)));
        Ok(tokens)
    }

    /// Forget the cached entry so nothing leaks into the next load session.
    pub fn clear(&mut self) {
        self.last = None;
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lex(text: &str) -> (Vec<Token>, SymbolTable) {
        let mut symbols = SymbolTable::new();
        let tokens = tokenize(text, &mut symbols).unwrap();
        (tokens, symbols)
    }

    #[test]
    fn classifies_variables_by_case_and_context() {
        let (tokens, symbols) = lex("hero.name + Target =>greet # upper");
        let sym = |name: &str| symbols.lookup(name).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Global(sym("hero")),
                Token::Op(Op::Dot),
                Token::Name(sym("name")),
                Token::Op(Op::Add),
                Token::Local(sym("Target")),
                Token::Op(Op::Call),
                Token::Name(sym("greet")),
                Token::Op(Op::Modifier),
                Token::Name(sym("upper")),
                Token::Op(Op::End),
            ]
        );
    }

    #[test]
    fn keywords_win_over_identifiers() {
        let (tokens, _) = lex("let del and or null this");
        let ops: Vec<Token> =
            [Op::Let, Op::Del, Op::And, Op::Or, Op::Null, Op::This, Op::End].into_iter().map(Token::Op).collect();
        assert_eq!(tokens, ops);
    }

    #[test]
    fn literals_strip_quotes_and_escapes() {
        let (tokens, _) = lex(r#""say \"hi\"" 42 1.25"#);
        assert_eq!(tokens[0], Token::Literal(Value::from(r#"say "hi""#)));
        assert_eq!(tokens[1], Token::Literal(Value::Int(42)));
        assert_eq!(tokens[2], Token::Literal(Value::Float(1.25)));
    }

    #[test]
    fn compound_operators_lex_as_one_token() {
        let (tokens, _) = lex("a += 1 <- b <= c != d == e");
        let ops: Vec<Op> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Op(op) => Some(*op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![Op::AddAssign, Op::Replace, Op::LessEq, Op::NotEq, Op::Eq, Op::End]);
    }

    #[test]
    fn unknown_characters_are_lexing_errors() {
        let mut symbols = SymbolTable::new();
        assert!(matches!(tokenize("a @ b", &mut symbols), Err(Error::Lex { token }) if token == "@"));
        assert!(matches!(tokenize("a ? b", &mut symbols), Err(Error::Lex { .. })));
    }

    #[test]
    fn cache_returns_shared_tokens_and_can_be_cleared() {
        let mut symbols = SymbolTable::new();
        let mut cache = TokenCache::default();
        let first = cache.tokenize("let X = 0", &mut symbols).unwrap();
        let second = cache.tokenize("let X = 0", &mut symbols).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hits(), 1);

        cache.clear();
        let third = cache.tokenize("let X = 0", &mut symbols).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first, third);
    }

    proptest! {
        #[test]
        fn tokenizing_twice_is_identical(text in r#"[a-zA-Z_ .+*/=<>!()"0-9-]{0,40}"#) {
            let mut symbols = SymbolTable::new();
            let mut cache = TokenCache::default();
            if let Ok(first) = cache.tokenize(&text, &mut symbols) {
                let fresh = tokenize(&text, &mut symbols).unwrap();
                let again = cache.tokenize(&text, &mut symbols).unwrap();
                prop_assert_eq!(&*first, &*again);
                prop_assert_eq!(&*first, fresh.as_slice());
            }
        }
    }
}
