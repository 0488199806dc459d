/*!
format.rs

Human-output helpers for `ollamanager` (JSON paths never go through here).

  - StyleOptions::detect()   NO_COLOR / NO_EMOJI / COLUMNS
  - color(role, text, &style)
  - emoji(tag, &style)
  - status_line(tag, role, text, &style)
  - table(headers, rows, max_width, &style)

Functions return strings; callers decide where to print.
*/

use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub use_emoji: bool,
    pub term_width: usize,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self::detect()
    }
}

impl StyleOptions {
    pub fn detect() -> Self {
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 220))
            .unwrap_or(100);

        StyleOptions {
            use_color: std::env::var_os("NO_COLOR").is_none(),
            use_emoji: std::env::var_os("NO_EMOJI").is_none(),
            term_width: width,
        }
    }

    /// No color, no emoji.
    pub fn plain() -> Self {
        StyleOptions {
            use_color: false,
            use_emoji: false,
            term_width: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Accent,
    Success,
    Warning,
    Error,
    Dim,
    Bold,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45",  // cyan-ish
        Role::Accent => "38;5;213",  // magenta/pink
        Role::Success => "38;5;82",  // green
        Role::Warning => "38;5;214", // orange
        Role::Error => "38;5;196",   // red
        Role::Dim => "2",
        Role::Bold => "1",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

pub fn emoji(tag: &str, style: &StyleOptions) -> &'static str {
    if !style.use_emoji {
        return "";
    }
    match tag {
        "success" => "✔",
        "error" => "✖",
        "warn" => "⚠",
        "server" => "🖥",
        _ => "",
    }
}

/// `<emoji> <colored text>`, without a leading space when emoji are off.
pub fn status_line(tag: &str, role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    let icon = emoji(tag, style);
    let body = color(role, text, style);
    if icon.is_empty() {
        body
    } else {
        format!("{icon} {body}")
    }
}

/// Left-aligned columns separated by two spaces, with a dashed header rule.
///
/// When the natural width exceeds `max_width` the widest columns shrink first
/// and overflowing cells end in `…`.
pub fn table(
    headers: &[&str],
    rows: &[Vec<String>],
    max_width: usize,
    style: &StyleOptions,
) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let cols = headers.len();
    let limit = if max_width == 0 {
        style.term_width
    } else {
        max_width.min(style.term_width)
    };

    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(cols) {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    let natural: usize = widths.iter().sum::<usize>() + (cols - 1) * 2;
    if natural > limit {
        let mut overflow = natural - limit;
        let mut order: Vec<usize> = (0..cols).collect();
        order.sort_by(|a, b| widths[*b].cmp(&widths[*a]));
        for idx in order {
            if overflow == 0 {
                break;
            }
            let shrink = widths[idx].saturating_sub(4).min(overflow);
            widths[idx] -= shrink;
            overflow -= shrink;
        }
    }

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(color(
        Role::Accent,
        render_row(headers.iter().copied(), &widths),
        style,
    ));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push(color(Role::Dim, rule.join("  "), style));
    for row in rows {
        let cells = (0..cols).map(|c| row.get(c).map(String::as_str).unwrap_or(""));
        out.push(render_row(cells, &widths));
    }
    out.join("\n")
}

fn render_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let parts: Vec<String> = cells
        .zip(widths.iter())
        .map(|(cell, w)| fit(cell, *w))
        .collect();
    parts.join("  ").trim_end().to_string()
}

/// Pad to `width`, or cut and end with `…`.
fn fit(s: &str, width: usize) -> String {
    let len = display_width(s);
    if len <= width {
        return format!("{s}{}", " ".repeat(width - len));
    }
    if width <= 1 {
        return "…".to_string();
    }
    let plain = strip_ansi(s);
    let mut out: String = plain.chars().take(width - 1).collect();
    out.push('…');
    out
}

fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut buf = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            // CSI runs until its final letter
            for n in chars.by_ref() {
                if n.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        buf.push(c);
    }
    Cow::Owned(buf)
}

fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}
