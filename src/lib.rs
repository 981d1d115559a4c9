//! Hecate: a generative-grammar engine.
//!
//! A grammar is a set of named, weighted rewrite rules. Expanding a start
//! symbol picks one applicable rule for it, runs the rule's effects against a
//! shared state tree and fills its template, recursing into further rule calls
//! embedded in the template.
//!
//! ```text
//! greet Who, Who != null => "Hello, [Who # capitalize]!", greeted += 1
//! story => "[=>greet(hero.name)] The end."
//! ```
//!
//! Start with [`Generator`]: load rules with [`Generator::load_str`],
//! [`Generator::load_file`] or [`Generator::load_dir`], seed base state with
//! [`Generator::seed`], then call [`Generator::generate`].
//!
//! The library logs through `tracing` and never installs a subscriber.

#[macro_use]
mod macros;
mod api;
mod engine;
mod error;
mod state;
mod symbols;
mod value;

pub use api::{Generation, Modifier, Options, generate_with, standard_modifiers};
pub use engine::{GenerationMetrics, Generator};
pub use error::{Error, Result};
pub use state::{Loan, NodeId, StateTree, nodes_equal};
pub use symbols::{Op, Symbol, SymbolTable};
pub use value::Value;
