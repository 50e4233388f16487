//! Assistant text to HTML fragments
//!
//! Markdown goes through pulldown-cmark. Math is rewritten into readable
//! prose and wrapped in `math-inline` / `math-block` elements. Raw HTML in the
//! input is always escaped.

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::warn;

const MATH_LANGUAGE: &str = "math";

const GREEK_LETTERS: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "pi", "rho", "sigma", "tau", "upsilon", "phi", "chi", "psi",
    "omega",
];

struct MathPatterns {
    power: Regex,
    fraction: Regex,
    boxed: Regex,
    sqrt: Regex,
    command: Regex,
}

impl MathPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            power: Regex::new(r"(\d+)\^(\d+)")?,
            fraction: Regex::new(r"\\frac\{(\d+)\}\{(\d+)\}")?,
            boxed: Regex::new(r"\\boxed\{([^}]+)\}")?,
            sqrt: Regex::new(r"\\sqrt\{([^}]+)\}")?,
            command: Regex::new(r"\\([a-zA-Z]+)")?,
        })
    }
}

fn patterns() -> Option<&'static MathPatterns> {
    static PATTERNS: OnceLock<Result<MathPatterns, regex::Error>> = OnceLock::new();
    match PATTERNS.get_or_init(MathPatterns::compile) {
        Ok(patterns) => Some(patterns),
        Err(e) => {
            warn!("Math patterns failed to compile: {}", e);
            None
        }
    }
}

/// Rewrite LaTeX-ish math into words a listener or reader can follow.
///
/// `2^3` becomes "2 raised to power 3", `\frac{1}{4}` becomes "1/4 (0.25)",
/// `\boxed{x}` becomes "x", `\sqrt{x}` becomes "square root of x" and
/// `\alpha` becomes "alpha". Unknown commands lose their backslash.
pub fn humanize_math(text: &str) -> String {
    let Some(p) = patterns() else {
        return text.to_string();
    };

    let text = p.power.replace_all(text, "$1 raised to power $2");
    let text = p.fraction.replace_all(&text, |caps: &Captures| {
        let (num, den) = (&caps[1], &caps[2]);
        match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => format!("{}/{} ({:.2})", num, den, n / d),
            _ => format!("{}/{}", num, den),
        }
    });
    let text = p.boxed.replace_all(&text, "$1");
    let text = p.sqrt.replace_all(&text, "square root of $1");
    let text = p.command.replace_all(&text, |caps: &Captures| {
        let name = &caps[1];
        GREEK_LETTERS
            .iter()
            .find(|&&letter| letter == name)
            .map(|letter| letter.to_string())
            .unwrap_or_else(|| name.to_string())
    });

    text.into_owned()
}

/// Wrap humanized math in a styled element. The math itself goes out as
/// text so the HTML writer escapes it.
fn push_math(events: &mut Vec<Event<'_>>, math: &str, block: bool) {
    if block {
        events.push(Event::Html(CowStr::from("<div class=\"math-block\">")));
        events.push(Event::Text(CowStr::from(humanize_math(math.trim()))));
        events.push(Event::Html(CowStr::from("</div>\n")));
    } else {
        events.push(Event::InlineHtml(CowStr::from("<span class=\"math-inline\">")));
        events.push(Event::Text(CowStr::from(humanize_math(math))));
        events.push(Event::InlineHtml(CowStr::from("</span>")));
    }
}

/// Render assistant markdown to an HTML fragment.
pub fn render_markdown(text: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_MATH;

    let mut events: Vec<Event> = Vec::new();
    // Source of a ```math fence while inside one
    let mut math_fence: Option<String> = None;

    for event in Parser::new_ext(text, options) {
        if let Some(source) = math_fence.as_mut() {
            match event {
                Event::End(TagEnd::CodeBlock) => {
                    push_math(&mut events, source, true);
                    math_fence = None;
                }
                Event::Text(chunk) => source.push_str(&chunk),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(ref lang)))
                if lang.trim() == MATH_LANGUAGE =>
            {
                math_fence = Some(String::new());
            }
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            Event::InlineMath(math) => push_math(&mut events, &math, false),
            Event::DisplayMath(math) => push_math(&mut events, &math, true),
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize_math() {
        assert_eq!(humanize_math("2^10"), "2 raised to power 10");
        assert_eq!(humanize_math(r"\frac{1}{4}"), "1/4 (0.25)");
        assert_eq!(humanize_math(r"\frac{2}{3}"), "2/3 (0.67)");
        assert_eq!(humanize_math(r"\boxed{42}"), "42");
        assert_eq!(humanize_math(r"\sqrt{x}"), "square root of x");
        assert_eq!(humanize_math(r"\alpha + \beta"), "alpha + beta");
        assert_eq!(humanize_math(r"\cdot"), "cdot");
    }

    #[test]
    fn test_zero_denominator() {
        assert_eq!(humanize_math(r"\frac{1}{0}"), "1/0");
    }

    #[test]
    fn test_basic_markdown() {
        let html = render_markdown("**bold** and ~~gone~~");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn test_code_block_language_class() {
        let html = render_markdown("```rust\nfn main() {}\n```");
        assert!(html.contains("<pre><code class=\"language-rust\">"));
        assert!(html.contains("fn main() {}"));
    }

    #[test]
    fn test_math_fence() {
        let html = render_markdown("```math\n\\sqrt{16}\n```");
        assert!(html.contains("<div class=\"math-block\">square root of 16</div>"));
        assert!(!html.contains("<code"));
    }

    #[test]
    fn test_dollar_math() {
        let html = render_markdown("Area is $\\pi r^2$ exactly.");
        assert!(html.contains("<span class=\"math-inline\">pi r^2</span>"));

        let html = render_markdown("Power: $$2^8$$");
        assert!(html.contains("<div class=\"math-block\">2 raised to power 8</div>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render_markdown("<script>alert(1)</script>\n\nhi <b>there</b>");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&lt;b&gt;"));
    }

    #[test]
    fn test_math_text_is_escaped() {
        let html = render_markdown("$a < b$");
        assert!(html.contains("<span class=\"math-inline\">a &lt; b</span>"));
    }

    #[test]
    fn test_tables() {
        let html = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }
}
