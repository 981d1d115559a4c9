use crate::engine::{GenerationMetrics, Generator};
use crate::error::Result;
use crate::value::Value;

/// A named transformation callable as `value # name`.
///
/// Returning `Err(message)` fails the expression with
/// [`Error::Modifier`](crate::Error::Modifier).
pub type Modifier = Box<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Options that affect generation.
#[derive(Debug, Clone)]
pub struct Options {
    /// Seed for rule selection. `None` seeds from the operating system, so
    /// every generator picks differently.
    pub seed: Option<u64>,
    /// Register the standard modifiers (`upper`, `lower`, `capitalize`,
    /// `trim`, `length`) on construction.
    pub standard_modifiers: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { seed: None, standard_modifiers: true }
    }
}

/// Result from [`Generator::generate_verbose`].
#[derive(Debug, Clone)]
pub struct Generation {
    /// The generated text.
    pub text: String,
    /// Counters and timing for the run.
    pub metrics: GenerationMetrics,
}

/// The modifiers installed when [`Options::standard_modifiers`] is set.
pub fn standard_modifiers() -> Vec<(&'static str, Modifier)> {
    fn modifier(f: impl Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static) -> Modifier {
        Box::new(f)
    }
    fn text(f: fn(&str) -> String) -> Modifier {
        modifier(move |value| Ok(Value::Text(f(&value.as_text()))))
    }

    vec![
        ("upper", text(str::to_uppercase)),
        ("lower", text(str::to_lowercase)),
        ("trim", text(|s| s.trim().to_string())),
        ("capitalize", modifier(|value| Ok(value.capitalized()))),
        ("length", modifier(|value| Ok(Value::Int(value.as_text().chars().count() as i64)))),
    ]
}

/// Load `source` and expand `start` once.
///
/// # Example
/// ```
/// use hecate::{Options, generate_with};
///
/// let options = Options { seed: Some(3), ..Options::default() };
/// let text = generate_with("coin => \"heads\"", "coin", &options).unwrap();
/// assert_eq!(text, "heads");
/// ```
pub fn generate_with(source: &str, start: &str, options: &Options) -> Result<String> {
    let mut generator = Generator::with_options(options.clone());
    generator.load_str("<inline>", source)?;
    generator.generate(start)
}
