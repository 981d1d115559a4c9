//! Rule engine.
//!
//! This module is the public entry point for loading and running grammars.
//! It is split into focused submodules under `src/engine/`:
//!
//! ## How the parts work together
//!
//! ```text
//! rule source ── loader::logical_lines ──> logical rule lines      (loader.rs)
//!                                               │
//!                                     Rule::parse                   (rule.rs)
//!                                       - name + parameters
//!                                       - conditions / effects
//!                                       - template segments + insets
//!                                               │  Expression::compile
//!                                               │    (tokenizer.rs, cached)
//!                                               v
//!                                  RuleBook (rules by name)         (generator.rs)
//!
//! Generator::generate("story")
//!     synthesized rule "[=>story]"
//!         └─ RuleBook::call(story)
//!              - Rule::check every candidate (local scope, conditions)
//!              - weighted pick by rank
//!              - Rule::execute (counter, parameters, effects, insets)
//!                   └─ Expression::evaluate ── `=>rule(...)` ─┐   (expression.rs)
//!                                                            │
//!              <─────────────────────── recursion ───────────┘
//!     sweep unreachable state nodes
//! ```
//!
//! ## Responsibilities by module
//!
//! - `tokenizer.rs`: splits expression text into tokens; one-entry cache.
//! - `expression.rs`: Pratt parser fused with the evaluator.
//! - `rule.rs`: rule-line parsing, template scanning, check/execute.
//! - `generator.rs`: weighted selection, session state, the [`Generator`] API.
//! - `loader.rs`: line continuation, set headers, rule files.
//! - `metrics.rs`: per-generation counters.
//!
//! ## Debugging
//!
//! Everything logs through `tracing`: rule selection and sweeps at `debug`,
//! token-cache hits and set headers at `trace`.

#[path = "engine/expression.rs"]
mod expression;
#[path = "engine/generator.rs"]
mod generator;
#[path = "engine/loader.rs"]
mod loader;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/rule.rs"]
mod rule;
#[path = "engine/tokenizer.rs"]
mod tokenizer;


pub use generator::Generator;
pub use metrics::GenerationMetrics;
