//! Terminal rendering of the result popup and the error notification.

use std::sync::OnceLock;

use regex::Regex;

const BOLD: (&str, &str) = ("\x1b[1m", "\x1b[22m");
const ITALIC: (&str, &str) = ("\x1b[3m", "\x1b[23m");
const CODE: (&str, &str) = ("\x1b[7m", "\x1b[27m");
const ERROR: (&str, &str) = ("\x1b[41;97m", "\x1b[0m");

const MIN_WIDTH: usize = 20;
const MAX_WIDTH: usize = 80;

struct Markup {
    bold: Regex,
    italic: Regex,
    code: Regex,
}

fn markup() -> &'static Markup {
    static MARKUP: OnceLock<Markup> = OnceLock::new();
    MARKUP.get_or_init(|| Markup {
        bold: Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern"),
        italic: Regex::new(r"\*(.*?)\*").expect("italic pattern"),
        code: Regex::new(r"`(.*?)`").expect("code pattern"),
    })
}

/// Applies the light markdown the models tend to produce: bold, italic and
/// inline code. Bold is handled first so `**` is never read as two italics.
pub fn render_markdown(text: &str) -> String {
    let markup = markup();
    let text = markup
        .bold
        .replace_all(text, format!("{}$1{}", BOLD.0, BOLD.1).as_str());
    let text = markup
        .italic
        .replace_all(&text, format!("{}$1{}", ITALIC.0, ITALIC.1).as_str());
    markup
        .code
        .replace_all(&text, format!("{}$1{}", CODE.0, CODE.1).as_str())
        .into_owned()
}

/// Boxed popup. Lines wider than the widest frame are wrapped at spaces,
/// or split mid-word when a single word does not fit.
pub fn render_result(text: &str) -> String {
    let body: Vec<String> = render_markdown(text)
        .lines()
        .flat_map(|line| wrap_line(line, MAX_WIDTH))
        .collect();
    let width = body
        .iter()
        .map(|line| visible_width(line))
        .max()
        .unwrap_or(0)
        .clamp(MIN_WIDTH, MAX_WIDTH);
    let rule = "─".repeat(width);
    format!("┌{rule}┐\n{}\n└{rule}┘\n", body.join("\n"))
}

fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let mut wrapped = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for word in line.split(' ') {
        for piece in split_visible(word, width) {
            let piece_width = visible_width(&piece);
            if current_width > 0 && current_width + 1 + piece_width > width {
                wrapped.push(std::mem::take(&mut current));
                current_width = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_width += 1;
            }
            current.push_str(&piece);
            current_width += piece_width;
        }
    }
    wrapped.push(current);
    wrapped
}

/// Chunks `word` into pieces of at most `width` visible characters. Escape
/// sequences stay with the character that follows them.
fn split_visible(word: &str, width: usize) -> Vec<String> {
    let mut pieces = vec![String::new()];
    let mut count = 0;
    let mut in_escape = false;
    for ch in word.chars() {
        let visible = match (in_escape, ch) {
            (false, '\x1b') => {
                in_escape = true;
                false
            }
            (true, 'm') => {
                in_escape = false;
                false
            }
            (true, _) => false,
            (false, _) => true,
        };
        if visible {
            if count == width {
                pieces.push(String::new());
                count = 0;
            }
            count += 1;
        }
        if let Some(piece) = pieces.last_mut() {
            piece.push(ch);
        }
    }
    pieces
}

fn visible_width(line: &str) -> usize {
    strip_ansi(line).chars().count()
}

pub fn render_error(message: &str) -> String {
    format!("{}Error: {message}{}\n", ERROR.0, ERROR.1)
}

fn strip_ansi(line: &str) -> String {
    let mut plain = String::with_capacity(line.len());
    let mut in_escape = false;
    for ch in line.chars() {
        match (in_escape, ch) {
            (false, '\x1b') => in_escape = true,
            (true, 'm') => in_escape = false,
            (true, _) => {}
            (false, ch) => plain.push(ch),
        }
    }
    plain
}
