//! Rule selection and the public [`Generator`].
//!
//! A generator is split in two halves so evaluation can borrow them
//! independently:
//!
//! - [`RuleBook`]: the rules and modifiers. Read-only while a generation runs.
//! - [`Session`]: everything evaluation mutates (state tree, symbols, local
//!   scope stack, token cache, random source, metrics).
//!
//! A rule call checks every candidate registered under the name and keeps a
//! running choice weighted by rank:
//!
//! ```text
//! total = 0
//! for each applicable candidate c:
//!     total += rank(c)
//!     if uniform(0..total) < rank(c): chosen = c
//! ```
//!
//! which picks each applicable candidate with probability `rank / total`
//! in a single pass.

use super::expression::Expression;
use super::loader;
use super::metrics::GenerationMetrics;
use super::rule::{self, Rule};
use super::tokenizer::TokenCache;
use crate::api::{Generation, Modifier, Options, standard_modifiers};
use crate::error::{Error, Result};
use crate::state::{NodeId, StateTree};
use crate::symbols::{Symbol, SymbolTable};
use crate::value::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Mutable evaluation state of one generator.
pub(crate) struct Session {
    pub(crate) symbols: SymbolTable,
    pub(crate) tree: StateTree,
    /// Global variables live under this node.
    pub(crate) root: NodeId,
    /// Local scope per active rule invocation, innermost last.
    pub(crate) scopes: Vec<NodeId>,
    pub(crate) tokens: TokenCache,
    pub(crate) rng: StdRng,
    pub(crate) metrics: GenerationMetrics,
    /// Interned `count`, the child of a rule's counter node.
    pub(crate) count: Symbol,
}

impl Session {
    pub(crate) fn new(options: &Options) -> Self {
        let mut symbols = SymbolTable::new();
        let count = symbols.intern("count");
        let mut tree = StateTree::new();
        let root = tree.alloc(Value::Null);
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Session {
            symbols,
            tree,
            root,
            scopes: Vec::new(),
            tokens: TokenCache::default(),
            rng,
            metrics: GenerationMetrics::default(),
            count,
        }
    }

    pub(crate) fn current_scope(&self) -> Result<NodeId> {
        self.scopes.last().copied().ok_or_else(|| Error::structure("no active local scope"))
    }

    /// Run `f` with a fresh local scope pushed; the scope is popped on every
    /// exit path.
    pub(crate) fn with_local_scope<T>(&mut self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let scope = self.tree.alloc(Value::Int(0));
        self.scopes.push(scope);
        self.metrics.max_depth = self.metrics.max_depth.max(self.scopes.len());
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// Split a dotted path into interned symbols.
    fn intern_path(&mut self, path: &str) -> Vec<Symbol> {
        path.split('.').map(str::trim).filter(|part| !part.is_empty()).map(|part| self.symbols.intern(part)).collect()
    }
}

/// Rules by name, plus the registered modifiers.
#[derive(Default)]
pub(crate) struct RuleBook {
    rules: HashMap<Symbol, Vec<Rule>>,
    modifiers: HashMap<String, Modifier>,
}

impl RuleBook {
    pub(crate) fn add(&mut self, rule: Rule) {
        self.rules.entry(rule.name()).or_default().push(rule);
    }

    pub(crate) fn modifier(&self, name: &str) -> Option<&Modifier> {
        self.modifiers.get(name)
    }

    pub(crate) fn register_modifier(&mut self, name: &str, modifier: Modifier) {
        self.modifiers.insert(name.to_string(), modifier);
    }

    pub(crate) fn install_standard_modifiers(&mut self) {
        for (name, modifier) in standard_modifiers() {
            self.register_modifier(name, modifier);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Counter nodes of every loaded rule; they survive garbage sweeps.
    fn counters(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.rules.values().flatten().map(Rule::counter)
    }

    /// Invoke the rule `name`: check every candidate, pick one weighted by
    /// rank, execute it. No applicable candidate yields empty text.
    pub(crate) fn call(&self, session: &mut Session, name: Symbol, arguments: &[Option<NodeId>]) -> Result<String> {
        session.metrics.rule_calls += 1;
        let candidates = self.rules.get(&name).map(Vec::as_slice).unwrap_or_default();

        let mut chosen: Option<&Rule> = None;
        let mut total = 0;
        for rule in candidates {
            session.metrics.candidates_checked += 1;
            if !rule.check(self, session, arguments)? {
                continue;
            }
            session.metrics.applicable += 1;
            total += rule.rank();
            if session.rng.gen_range(0..total) < rule.rank() {
                chosen = Some(rule);
            }
        }

        let rule_name = session.symbols.name_of(name);
        match chosen {
            Some(rule) => {
                debug!(rule = rule_name, candidates = candidates.len(), rank = rule.rank(), total, "selected rule");
                session.metrics.executions += 1;
                rule.execute(self, session, arguments)
            }
            None => {
                debug!(rule = rule_name, candidates = candidates.len(), "no applicable rule");
                session.metrics.unmatched_calls += 1;
                Ok(String::new())
            }
        }
    }
}

/// A loaded grammar plus its persistent state.
///
/// ```
/// use hecate::{Generator, Options};
///
/// let mut generator = Generator::with_options(Options { seed: Some(7), ..Options::default() });
/// generator.load_str("inline", r#"greet => "Hello, [name]!""#)?;
/// generator.seed("name", "Ava");
/// assert_eq!(generator.generate("greet")?, "Hello, Ava!");
/// # Ok::<(), hecate::Error>(())
/// ```
pub struct Generator {
    book: RuleBook,
    session: Session,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    /// A generator with default [`Options`]: entropy-seeded, standard modifiers installed.
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let mut book = RuleBook::default();
        if options.standard_modifiers {
            book.install_standard_modifiers();
        }
        Generator { book, session: Session::new(&options) }
    }

    /// Add one rule line. Returns the rule's name.
    pub fn add_rule(&mut self, line: &str) -> Result<String> {
        let rule = Rule::parse(line, &mut self.session)?;
        let name = self.session.symbols.name_of(rule.name()).to_string();
        self.book.add(rule);
        Ok(name)
    }

    /// Load rules from source text; `origin` labels errors. Returns the
    /// number of rules added.
    pub fn load_str(&mut self, origin: &str, source: &str) -> Result<usize> {
        let lines = loader::logical_lines(origin, source)?;
        for line in &lines {
            let rule = Rule::parse(&line.text, &mut self.session).map_err(|err| Error::Load {
                origin: origin.to_string(),
                line: line.number,
                source: Box::new(err),
            })?;
            self.book.add(rule);
        }
        debug!(origin, rules = lines.len(), "loaded rules");
        Ok(lines.len())
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let source = loader::read(path)?;
        self.load_str(&path.display().to_string(), &source)
    }

    /// Load every `*.hec` file in `dir`, in file-name order, then clear the
    /// token cache.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut total = 0;
        for path in loader::rule_files(dir.as_ref())? {
            total += self.load_file(&path)?;
        }
        debug!(cache_hits = self.session.tokens.hits(), rules = total, "loaded rule directory");
        self.clear_token_cache();
        Ok(total)
    }

    pub fn clear_token_cache(&mut self) {
        self.session.tokens.clear();
    }

    /// Register (or replace) a modifier callable as `value # name`.
    pub fn register_modifier<F>(&mut self, name: &str, modifier: F)
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.book.register_modifier(name, Box::new(modifier));
    }

    /// Set a base-state value at a dotted path unless one is already there.
    /// Returns whether the value was written.
    pub fn seed(&mut self, path: &str, value: impl Into<Value>) -> bool {
        let path = self.session.intern_path(path);
        if path.is_empty() || self.session.tree.find(self.session.root, &path).is_some() {
            return false;
        }
        match self.session.tree.walk(self.session.root, &path, true) {
            Some(node) => {
                self.session.tree.set_value(node, value.into());
                true
            }
            None => false,
        }
    }

    /// Read the value at a dotted path.
    pub fn value_at(&self, path: &str) -> Option<&Value> {
        let symbols = &self.session.symbols;
        let path: Option<Vec<Symbol>> = path.split('.').map(|part| symbols.lookup(part.trim())).collect();
        let node = self.session.tree.find(self.session.root, &path?)?;
        Some(self.session.tree.value(node))
    }

    /// Expand the rule `start` into text.
    ///
    /// Recursion depth is bounded only by the grammar: a rule that always
    /// calls itself will overflow the stack.
    pub fn generate(&mut self, start: &str) -> Result<String> {
        self.generate_verbose(start).map(|generation| generation.text)
    }

    /// [`Generator::generate`] plus the metrics of the run.
    pub fn generate_verbose(&mut self, start: &str) -> Result<Generation> {
        if !rule::is_valid_name(start) {
            return Err(Error::syntax(format!("`{start}` is not a valid rule name")));
        }
        self.run(&format!("[=>{start}]"))
    }

    /// Expand an ad-hoc template (the text between a rule's quotes) against
    /// the loaded rules and state.
    pub fn expand(&mut self, template: &str) -> Result<String> {
        self.run(template).map(|generation| generation.text)
    }

    fn run(&mut self, template: &str) -> Result<Generation> {
        let started = Instant::now();
        self.session.metrics = GenerationMetrics::default();

        let result = self.execute_template(template);
        self.collect_garbage();
        self.session.metrics.total = started.elapsed();

        result.map(|text| Generation { text, metrics: self.session.metrics.clone() })
    }

    fn execute_template(&mut self, template: &str) -> Result<String> {
        let name = self.session.symbols.intern("<start>");
        let rule = Rule::new(name, template, &[], &[], &mut self.session)?;
        rule.execute(&self.book, &mut self.session, &[])
    }

    /// Reclaim nodes unreachable from the root and the rule counters.
    fn collect_garbage(&mut self) {
        let mut roots: Vec<NodeId> = self.book.counters().collect();
        roots.push(self.session.root);
        let reclaimed = self.session.tree.sweep(&roots);
        self.session.metrics.reclaimed = reclaimed;
        self.session.metrics.live_nodes = self.session.tree.live();
        debug!(reclaimed, live = self.session.tree.live(), "swept state");
    }

    /// Indented dump of the global state.
    pub fn render_state(&self) -> String {
        self.session.tree.render(self.session.root, "root", &self.session.symbols)
    }

    pub fn rule_count(&self) -> usize {
        self.book.len()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.session.symbols
    }

    /// Metrics of the most recent generation.
    pub fn last_metrics(&self) -> &GenerationMetrics {
        &self.session.metrics
    }

    /// Evaluate a single expression against the global state, in a fresh local scope.
    pub fn evaluate(&mut self, source: &str) -> Result<Value> {
        let expression = Expression::compile(source, &mut self.session)?;
        let book = &self.book;
        self.session.with_local_scope(|session| expression.evaluate_value(book, session, None))
    }
}
