use fincal::parser::{LineKind, classify};
use fincal::{RunReport, SessionDraft};
use std::time::Duration;

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
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

const FLAG_NAMES: [(LineKind, &str); 6] = [
    (LineKind::DATE, "date"),
    (LineKind::TIME, "time"),
    (LineKind::STYLE, "style"),
    (LineKind::RELAY_EVENT, "relay"),
    (LineKind::WARMUP, "warm-up"),
    (LineKind::POOL_MENTION, "pool"),
];

pub fn print_program(program: &str, lines: &[String], drafts: &[SessionDraft], elapsed: Duration, color: bool) {
    let palette = ansi::Palette::new(color);
    let line_count = program.lines().filter(|l| !l.trim().is_empty()).count();
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Program: {line_count} lines"), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Program lines ━━━", ansi::GRAY));
    if lines.is_empty() {
        println!("{}", palette.dim("  No interesting lines"));
    }
    for line in lines {
        println!("  {} {}", palette.paint(format!("{:<24}", flags(classify(line))), ansi::BLUE), line);
    }

    println!("\n{}", palette.paint("━━━ Sessions ━━━", ansi::GRAY));
    if drafts.is_empty() {
        println!("{}", palette.dim("  No sessions extracted"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • No line carries an individual or relay event");
        println!("  • Event lines precede every date and time");
    }
    for draft in drafts {
        print_draft(draft, &palette);
    }

    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!("  Total: {}", palette.paint(format!("{elapsed:?}"), ansi::GREEN));
    println!();
}

fn print_draft(draft: &SessionDraft, palette: &ansi::Palette) {
    let date = match (&draft.day, &draft.month) {
        (Some(day), Some(month)) => format!("{day} {month}"),
        (Some(day), None) => day.clone(),
        _ => "?".to_string(),
    };
    let clock = |t: Option<chrono::NaiveTime>| t.map(|t| t.format("%H:%M").to_string()).unwrap_or_else(|| "--:--".into());
    println!(
        "  {} {} {} {} {}",
        palette.paint(format!("[{}]", draft.session_order), ansi::GRAY),
        palette.bold(palette.paint(date, ansi::GREEN)),
        palette.dim("│"),
        palette.paint(format!("start {}  warm-up {}", clock(draft.begin_time()), clock(draft.warm_up())), ansi::YELLOW),
        palette.dim(draft.day_part().map(|p| p.code()).unwrap_or("-")),
    );
    println!("      {} {}", palette.dim("events:"), palette.paint(draft.event_codes().join(", "), ansi::CYAN));
    if let Some(pool) = &draft.pool_override {
        println!("      {} {}", palette.dim("pool:"), palette.paint(pool, ansi::BLUE));
    }
}

pub fn print_reconciliation(report: &RunReport, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint("⚙  Reconciliation (dry run)", ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Actions ━━━", ansi::GRAY));
    if report.diff.actions.is_empty() {
        println!("{}", palette.dim("  Nothing to do"));
    }
    for action in &report.diff.actions {
        let color = if action.starts_with("ERROR") { ansi::RED } else { ansi::GREEN };
        println!("  {}", palette.paint(action, color));
    }

    if !report.errors.is_empty() {
        println!("\n{}", palette.paint("━━━ Errors ━━━", ansi::GRAY));
        for error in &report.errors {
            let code = if error.meeting_code.is_empty() { "(run)" } else { &error.meeting_code };
            println!("  {} {}", palette.paint(code, ansi::YELLOW), palette.paint(&error.message, ansi::RED));
        }
    }

    println!("\n{}", palette.paint("━━━ Summary ━━━", ansi::GRAY));
    println!(
        "  Processed: {}  │  Skipped: {}  │  Errors: {}  │  Changes: {}  │  {}",
        palette.paint(report.processed.to_string(), ansi::GREEN),
        palette.paint(report.skipped.to_string(), ansi::YELLOW),
        palette.paint(report.errors.len().to_string(), ansi::RED),
        palette.paint(report.diff.change_count().to_string(), ansi::CYAN),
        palette.dim(format!("{:?}", report.elapsed)),
    );
    println!();
}

fn flags(kind: LineKind) -> String {
    let names: Vec<&str> = FLAG_NAMES.iter().filter(|(flag, _)| kind.contains(*flag)).map(|(_, name)| *name).collect();
    names.join("+")
}
