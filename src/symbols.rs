//! Symbol table.
//!
//! Every name the engine touches (operators, keywords, variable names, rule
//! names) is interned to a small integer. Operators and keywords are
//! registered first, in [`Op::ALL`] order, so `Symbol(n)` for `n < Op::COUNT`
//! is always the reserved operator `Op::ALL[n]` and user identifiers can never
//! collide with them.

use std::collections::HashMap;

/// An interned name.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Symbol(u32);

impl Symbol {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// True for operator and keyword symbols.
    pub fn is_reserved(self) -> bool {
        (self.0 as usize) < Op::COUNT
    }
}

bitflags::bitflags! {
    /// Static properties of an operator that the tokenizer and rule loader care about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpTraits: u8 {
        /// Equality/relational operator; its presence makes an expression a rule condition.
        const CONDITIONAL = 1 << 0;
        /// An identifier right after this operator is a name atom, not a variable.
        const PATH        = 1 << 1;
        /// Spelled as a word and recognized before identifier classification.
        const KEYWORD     = 1 << 2;
    }
}

/// Reserved operators and keywords.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum Op {
    This,
    Null,
    Add,
    Sub,
    Mul,
    Div,
    Assign,
    Not,
    Eq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    LParen,
    RParen,
    Dot,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    Let,
    Del,
    Call,
    Replace,
    And,
    Or,
    Capitalize,
    Modifier,
    End,
}

impl Op {
    pub const COUNT: usize = 30;

    pub const ALL: [Op; Op::COUNT] = [
        Op::This,
        Op::Null,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Assign,
        Op::Not,
        Op::Eq,
        Op::NotEq,
        Op::Less,
        Op::Greater,
        Op::LessEq,
        Op::GreaterEq,
        Op::LParen,
        Op::RParen,
        Op::Dot,
        Op::AddAssign,
        Op::SubAssign,
        Op::MulAssign,
        Op::DivAssign,
        Op::Let,
        Op::Del,
        Op::Call,
        Op::Replace,
        Op::And,
        Op::Or,
        Op::Capitalize,
        Op::Modifier,
        Op::End,
    ];

    /// Surface spelling.
    pub fn text(self) -> &'static str {
        match self {
            Op::This => "this",
            Op::Null => "null",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Assign => "=",
            Op::Not => "!",
            Op::Eq => "==",
            Op::NotEq => "!=",
            Op::Less => "<",
            Op::Greater => ">",
            Op::LessEq => "<=",
            Op::GreaterEq => ">=",
            Op::LParen => "(",
            Op::RParen => ")",
            Op::Dot => ".",
            Op::AddAssign => "+=",
            Op::SubAssign => "-=",
            Op::MulAssign => "*=",
            Op::DivAssign => "/=",
            Op::Let => "let",
            Op::Del => "del",
            Op::Call => "=>",
            Op::Replace => "<-",
            Op::And => "and",
            Op::Or => "or",
            Op::Capitalize => "^",
            Op::Modifier => "#",
            Op::End => "end_of_expression",
        }
    }

    pub fn symbol(self) -> Symbol {
        Symbol(self as u32)
    }

    pub fn from_symbol(symbol: Symbol) -> Option<Op> {
        Op::ALL.get(symbol.0 as usize).copied()
    }

    pub fn traits(self) -> OpTraits {
        match self {
            Op::Eq | Op::NotEq | Op::Less | Op::Greater | Op::LessEq | Op::GreaterEq => OpTraits::CONDITIONAL,
            Op::Dot | Op::Call | Op::Modifier => OpTraits::PATH,
            Op::Let | Op::Del | Op::And | Op::Or | Op::Null | Op::This => OpTraits::KEYWORD,
            _ => OpTraits::empty(),
        }
    }

    /// Left binding power: how tightly this operator grabs the value to its left.
    pub fn binding_power(self) -> u8 {
        match self {
            Op::Assign
            | Op::Replace
            | Op::AddAssign
            | Op::SubAssign
            | Op::MulAssign
            | Op::DivAssign
            | Op::Let
            | Op::Del
            | Op::And
            | Op::Or => 10,
            Op::Eq | Op::NotEq | Op::Less | Op::Greater | Op::LessEq | Op::GreaterEq => 40,
            Op::Add | Op::Sub | Op::Capitalize => 50,
            Op::Mul | Op::Div => 60,
            Op::LParen => 70,
            Op::Dot | Op::Call | Op::Modifier => 80,
            _ => 0,
        }
    }
}

/// Bidirectional name <-> symbol mapping.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    ids: HashMap<String, Symbol>,
    names: Vec<String>,
}

impl SymbolTable {
    /// A table with every reserved operator pre-registered.
    pub fn new() -> Self {
        let mut table = SymbolTable { ids: HashMap::new(), names: Vec::with_capacity(Op::COUNT) };
        for op in Op::ALL {
            table.intern(op.text());
        }
        table
    }

    /// Return the symbol for `name`, assigning the next free one on first sight.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&symbol) = self.ids.get(name) {
            return symbol;
        }

        let symbol = Symbol(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), symbol);
        symbol
    }

    /// The symbol for `name` if it was interned already.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.ids.get(name).copied()
    }

    /// The name behind `symbol`, or `None` if it was never handed out by this table.
    pub fn get(&self, symbol: Symbol) -> Option<&str> {
        self.names.get(symbol.0 as usize).map(String::as_str)
    }

    /// The name behind `symbol`.
    ///
    /// # Panics
    /// Panics if `symbol` was not produced by this table; symbols are never
    /// freed, so that is always a caller bug.
    pub fn name_of(&self, symbol: Symbol) -> &str {
        &self.names[symbol.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
