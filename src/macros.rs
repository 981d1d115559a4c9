/// Compile a regex once and hand out a `&'static Regex`.
///
/// Every pattern used by the tokenizer and the rule-line parser is a literal,
/// so a failure here is a bug in the pattern itself.
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}
