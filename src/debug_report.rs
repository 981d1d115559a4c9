use hecate::{Generation, GenerationMetrics};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_generation(start: &str, generation: &Generation, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Generating: =>{start}"), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Output ━━━", ansi::GRAY));
    if generation.text.is_empty() {
        println!("{}", palette.dim("  (empty)"));
        if generation.metrics.unmatched_calls > 0 {
            println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
            println!("  • No rule named '{start}' had all of its conditions met");
            println!("  • A rule expected arguments that the call did not pass");
        }
    } else {
        for line in generation.text.lines() {
            println!("  {}", palette.bold(palette.paint(line, ansi::GREEN)));
        }
    }

    println!("\n{}", palette.paint("━━━ Rule Selection ━━━", ansi::GRAY));
    print_selection(&generation.metrics, &palette);

    println!("\n{}", palette.paint("━━━ State ━━━", ansi::GRAY));
    println!(
        "  Live nodes: {}  │  Reclaimed: {}  │  Max depth: {}",
        palette.paint(generation.metrics.live_nodes.to_string(), ansi::BLUE),
        palette.paint(generation.metrics.reclaimed.to_string(), ansi::YELLOW),
        palette.dim(generation.metrics.max_depth.to_string()),
    );

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!("  Total: {}", palette.paint(format!("{:?}", generation.metrics.total), ansi::GREEN));
    println!();
}

fn print_selection(metrics: &GenerationMetrics, palette: &ansi::Palette) {
    println!(
        "  {} {}  {} {}",
        palette.paint("Calls:", ansi::BLUE),
        palette.paint(metrics.rule_calls.to_string(), ansi::YELLOW),
        palette.dim("executed:"),
        palette.paint(metrics.executions.to_string(), ansi::YELLOW),
    );
    println!(
        "  {} {}  {} {}  {} {}",
        palette.paint("Candidates:", ansi::BLUE),
        palette.paint(metrics.candidates_checked.to_string(), ansi::YELLOW),
        palette.dim("applicable:"),
        palette.paint(metrics.applicable.to_string(), ansi::YELLOW),
        palette.dim("hit rate:"),
        palette.paint(format!("{:.0}%", metrics.hit_rate() * 100.0), ansi::CYAN),
    );
    if metrics.unmatched_calls > 0 {
        println!(
            "  {} {}",
            palette.paint("✗ Unmatched calls:", ansi::YELLOW),
            palette.paint(metrics.unmatched_calls.to_string(), ansi::YELLOW)
        );
    }
}

pub fn print_state(rendered: &str, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.paint("━━━ Global State ━━━", ansi::GRAY));
    for line in rendered.lines() {
        match line.split_once(": ") {
            Some((key, value)) => println!("  {}: {}", palette.paint(key, ansi::BLUE), palette.dim(value)),
            None => println!("  {line}"),
        }
    }
}
