//! Markdown + LaTeX answer rendering for the terminal.
//!
//! Markdown is walked with pulldown-cmark and turned into styled ratatui
//! lines. Math spans (`$$…$$` display, `$…$` inline) are rewritten into
//! Unicode notation so they read naturally without a math typesetter.

use std::sync::OnceLock;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
};
use regex::{Captures, Regex};

#[derive(Debug, Clone, Default)]
pub struct RenderedAnswer {
    pub text: Text<'static>,
    /// What the clipboard receives
    pub plain: String,
}

pub fn render_markdown(source: &str) -> RenderedAnswer {
    let options = Options::ENABLE_MATH
        | Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;

    let mut writer = Writer::default();
    for event in Parser::new_ext(source, options) {
        writer.event(event);
    }
    writer.finish()
}

#[derive(Default)]
struct Writer {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    // `Some(n)` for ordered lists, holding the next number
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    in_code_block: bool,
}

impl Writer {
    fn style(&self) -> Style {
        self.styles
            .iter()
            .fold(Style::default(), |acc, s| acc.patch(*s))
    }

    fn push_span(&mut self, content: String, style: Style) {
        if !content.is_empty() {
            self.current.push(Span::styled(content, style));
        }
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.current.len() + 1);
        if self.quote_depth > 0 {
            spans.push(Span::styled(
                "│ ".repeat(self.quote_depth),
                Style::default().fg(Color::DarkGray),
            ));
        }
        spans.append(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    fn blank(&mut self) {
        self.flush();
        let last_blank = self.lines.last().map(|l| l.spans.is_empty()).unwrap_or(true);
        if !last_blank {
            self.lines.push(Line::default());
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    let style = Style::default().fg(Color::Green);
                    for line in text.lines() {
                        self.push_span(format!("    {}", line), style);
                        self.flush();
                    }
                } else {
                    let style = self.style();
                    self.push_span(text.into_string(), style);
                }
            }
            Event::Code(code) => {
                let style = self.style().fg(Color::Yellow);
                self.push_span(code.into_string(), style);
            }
            Event::InlineMath(math) => {
                let style = self.style().fg(Color::Magenta);
                self.push_span(latex_to_unicode(&math), style);
            }
            Event::DisplayMath(math) => {
                self.flush();
                let style = Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD);
                for line in latex_to_unicode(&math).lines().filter(|l| !l.trim().is_empty()) {
                    self.push_span(format!("    {}", line.trim()), style);
                    self.flush();
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let style = self.style();
                self.push_span(html.trim_end_matches('\n').to_string(), style);
            }
            Event::SoftBreak => {
                let style = self.style();
                self.push_span(" ".to_string(), style);
            }
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                self.lines.push(Line::from(Span::styled(
                    "─".repeat(40),
                    Style::default().fg(Color::DarkGray),
                )));
                self.blank();
            }
            Event::TaskListMarker(done) => {
                let marker = if done { "[x] " } else { "[ ] " };
                self.push_span(marker.to_string(), Style::default().fg(Color::Cyan));
            }
            Event::FootnoteReference(name) => {
                self.push_span(format!("[{}]", name), Style::default().fg(Color::DarkGray));
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.blank();
                let style = match level {
                    HeadingLevel::H1 => Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                    HeadingLevel::H2 => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    _ => Style::default().add_modifier(Modifier::BOLD),
                };
                self.styles.push(style);
            }
            Tag::Emphasis => self.styles.push(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.styles.push(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.styles.push(Style::default().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { .. } => self.styles.push(
                Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
            ),
            Tag::BlockQuote { .. } => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.blank();
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.push_span(format!("  {}", lang), Style::default().fg(Color::DarkGray));
                        self.flush();
                    }
                }
                self.in_code_block = true;
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().saturating_sub(1);
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let b = format!("{}. ", n);
                        *n += 1;
                        b
                    }
                    _ => "• ".to_string(),
                };
                self.push_span(
                    format!("{}{}", "  ".repeat(depth), bullet),
                    Style::default().fg(Color::Cyan),
                );
            }
            Tag::TableHead => self.styles.push(Style::default().add_modifier(Modifier::BOLD)),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                // Tight list items keep their text on the bullet line
                if self.lists.is_empty() {
                    self.blank();
                } else {
                    self.flush();
                }
            }
            TagEnd::Heading { .. } => {
                self.styles.pop();
                self.blank();
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.styles.pop();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    self.blank();
                }
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.blank();
            }
            TagEnd::List { .. } => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::TableCell => {
                self.push_span(" │ ".to_string(), Style::default().fg(Color::DarkGray));
            }
            TagEnd::TableHead => {
                self.styles.pop();
                self.flush();
            }
            TagEnd::TableRow => self.flush(),
            TagEnd::Table => self.blank(),
            _ => {}
        }
    }

    fn finish(mut self) -> RenderedAnswer {
        self.flush();
        while self.lines.last().map(|l| l.spans.is_empty()).unwrap_or(false) {
            self.lines.pop();
        }

        let plain = self
            .lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n");

        RenderedAnswer {
            text: Text::from(self.lines),
            plain,
        }
    }
}

const FUNCTIONS: &[&str] = &["sin", "cos", "tan", "log", "ln", "lim", "exp", "max", "min"];

struct MathPatterns {
    text: Regex,
    frac: Regex,
    sqrt: Regex,
    degree: Regex,
    command: Regex,
    superscript: Regex,
    subscript: Regex,
    spaces: Regex,
}

fn patterns() -> &'static MathPatterns {
    static PATTERNS: OnceLock<MathPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| MathPatterns {
        text: Regex::new(r"\\(?:text|mathrm|mathbf|mathit|operatorname)\{([^{}]*)\}").unwrap(),
        frac: Regex::new(r"\\[dt]?frac\{([^{}]*)\}\{([^{}]*)\}").unwrap(),
        sqrt: Regex::new(r"\\sqrt(?:\[([^\]]*)\])?\{([^{}]*)\}").unwrap(),
        degree: Regex::new(r"\^\{?\\circ\}?").unwrap(),
        command: Regex::new(r"\\([A-Za-z]+|[,;:! ])").unwrap(),
        superscript: Regex::new(r"\^(?:\{([^{}]*)\}|(\S))").unwrap(),
        subscript: Regex::new(r"_(?:\{([^{}]*)\}|(\S))").unwrap(),
        spaces: Regex::new(r"[ \t]{2,}").unwrap(),
    })
}

/// Best-effort LaTeX → Unicode. Unknown commands are left untouched.
pub fn latex_to_unicode(latex: &str) -> String {
    let p = patterns();

    let mut out = p.text.replace_all(latex.trim(), "$1").into_owned();
    out = p.degree.replace_all(&out, "°").into_owned();

    // Innermost fractions first so nesting unwinds
    loop {
        let next = p
            .frac
            .replace_all(&out, |c: &Captures| format!("{}/{}", group(&c[1]), group(&c[2])))
            .into_owned();
        if next == out {
            break;
        }
        out = next;
    }

    out = p
        .sqrt
        .replace_all(&out, |c: &Captures| {
            let index = c.get(1).map(|m| to_script(m.as_str(), superscript_char)).unwrap_or_default();
            format!("{}√{}", index.unwrap_or_default(), group(&c[2]))
        })
        .into_owned();

    out = p
        .command
        .replace_all(&out, |c: &Captures| match symbol(&c[1]) {
            Some(s) => s.to_string(),
            None if FUNCTIONS.contains(&&c[1]) => c[1].to_string(),
            None => c[0].to_string(),
        })
        .into_owned();

    out = p
        .superscript
        .replace_all(&out, |c: &Captures| {
            let body = c.get(1).or_else(|| c.get(2)).map(|m| m.as_str()).unwrap_or_default();
            to_script(body, superscript_char).unwrap_or_else(|| format!("^({})", body))
        })
        .into_owned();

    out = p
        .subscript
        .replace_all(&out, |c: &Captures| {
            let body = c.get(1).or_else(|| c.get(2)).map(|m| m.as_str()).unwrap_or_default();
            to_script(body, subscript_char).unwrap_or_else(|| format!("_({})", body))
        })
        .into_owned();

    out = out.replace(['{', '}'], "");
    p.spaces.replace_all(&out, " ").trim().to_string()
}

/// Parenthesize anything that is not a single plain token
fn group(s: &str) -> String {
    let s = s.trim();
    if s.chars().all(|c| c.is_alphanumeric() || c == '.') {
        s.to_string()
    } else {
        format!("({})", s)
    }
}

fn to_script(s: &str, map: fn(char) -> Option<char>) -> Option<String> {
    s.chars().map(map).collect()
}

fn superscript_char(c: char) -> Option<char> {
    Some(match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        '+' => '⁺',
        '-' => '⁻',
        '=' => '⁼',
        '(' => '⁽',
        ')' => '⁾',
        'n' => 'ⁿ',
        'i' => 'ⁱ',
        'x' => 'ˣ',
        'y' => 'ʸ',
        _ => return None,
    })
}

fn subscript_char(c: char) -> Option<char> {
    Some(match c {
        '0' => '₀',
        '1' => '₁',
        '2' => '₂',
        '3' => '₃',
        '4' => '₄',
        '5' => '₅',
        '6' => '₆',
        '7' => '₇',
        '8' => '₈',
        '9' => '₉',
        '+' => '₊',
        '-' => '₋',
        '=' => '₌',
        '(' => '₍',
        ')' => '₎',
        'a' => 'ₐ',
        'e' => 'ₑ',
        'i' => 'ᵢ',
        'n' => 'ₙ',
        'x' => 'ₓ',
        _ => return None,
    })
}

fn symbol(command: &str) -> Option<&'static str> {
    Some(match command {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" | "varepsilon" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" => "θ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "pi" => "π",
        "rho" => "ρ",
        "sigma" => "σ",
        "tau" => "τ",
        "phi" | "varphi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Omega" => "Ω",
        "times" => "×",
        "cdot" => "·",
        "div" => "÷",
        "pm" => "±",
        "mp" => "∓",
        "le" | "leq" => "≤",
        "ge" | "geq" => "≥",
        "neq" | "ne" => "≠",
        "approx" => "≈",
        "equiv" => "≡",
        "propto" => "∝",
        "infty" => "∞",
        "to" | "rightarrow" => "→",
        "leftarrow" => "←",
        "Rightarrow" | "implies" => "⇒",
        "Leftrightarrow" | "iff" => "⇔",
        "sum" => "Σ",
        "prod" => "Π",
        "int" => "∫",
        "oint" => "∮",
        "partial" => "∂",
        "nabla" => "∇",
        "in" => "∈",
        "notin" => "∉",
        "subset" => "⊂",
        "cup" => "∪",
        "cap" => "∩",
        "forall" => "∀",
        "exists" => "∃",
        "angle" => "∠",
        "perp" => "⊥",
        "parallel" => "∥",
        "circ" => "∘",
        "degree" => "°",
        "ldots" | "cdots" | "dots" => "…",
        "sqrt" => "√",
        "left" | "right" | "displaystyle" | "!" => "",
        "quad" | "qquad" | "," | ";" | ":" | " " => " ",
        _ => return None,
    })
}
