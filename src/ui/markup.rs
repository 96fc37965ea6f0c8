//! Terminal rendering of finalized agent markup.
//!
//! Agent turns are stored as HTML. This turns that HTML back into styled
//! lines: block structure (paragraphs, headings, lists, quotes, code) is
//! kept, inline formatting is flattened.

use crate::markdown::unescape_html;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Columns a tab expands to inside code blocks
const TAB_WIDTH: usize = 4;

/// One block-level element of rendered markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph { indent: usize, text: String },
    Heading { level: u8, text: String },
    ListItem { indent: usize, marker: String, text: String },
    Quote { text: String },
    /// `index` is the position of the block among the node's code blocks
    Code { index: usize, text: String },
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Paragraph,
    Heading(u8),
    ListItem,
}

struct ListFrame {
    ordered: bool,
    next: usize,
}

#[derive(Default)]
struct BlockParser {
    blocks: Vec<Block>,
    text: String,
    context: Option<Context>,
    marker: String,
    lists: Vec<ListFrame>,
    quote_depth: usize,
    in_pre: bool,
    code: String,
    code_count: usize,
}

impl BlockParser {
    fn flush(&mut self) {
        let text = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        self.text.clear();
        if text.is_empty() {
            return;
        }

        let indent = self.lists.len().saturating_sub(1) * 2;
        let block = if self.quote_depth > 0 {
            Block::Quote { text }
        } else {
            match self.context {
                Some(Context::Heading(level)) => Block::Heading { level, text },
                Some(Context::ListItem) => Block::ListItem {
                    indent,
                    marker: self.marker.clone(),
                    text,
                },
                Some(Context::Paragraph) | None => Block::Paragraph {
                    indent: if self.lists.is_empty() { 0 } else { indent + 2 },
                    text,
                },
            }
        };
        self.blocks.push(block);

        // Continuation paragraphs of a list item get no second bullet
        if self.context == Some(Context::ListItem) {
            self.context = Some(Context::Paragraph);
        }
    }

    fn open(&mut self, name: &str, raw: &str) {
        match name {
            "p" | "div" | "tr" => self.flush(),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                let level = name[1..].parse().unwrap_or(1);
                self.context = Some(Context::Heading(level));
            }
            "ul" | "ol" => {
                self.flush();
                self.lists.push(ListFrame {
                    ordered: name == "ol",
                    next: start_attribute(raw).unwrap_or(1),
                });
            }
            "li" => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(frame) if frame.ordered => {
                        let marker = format!("{}. ", frame.next);
                        frame.next += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.marker = marker;
                self.context = Some(Context::ListItem);
            }
            "blockquote" => {
                self.flush();
                self.quote_depth += 1;
            }
            "pre" => {
                self.flush();
                self.in_pre = true;
                self.code.clear();
            }
            "code" if !self.in_pre => self.text.push('`'),
            "br" => self.text.push('\n'),
            "hr" => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            "input" if raw.contains("checkbox") => {
                self.text
                    .push_str(if raw.contains("checked") { "[x] " } else { "[ ] " });
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        match name {
            "p" | "div" => {
                self.flush();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" => {
                self.flush();
                self.context = None;
            }
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            "blockquote" => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            "pre" => {
                self.in_pre = false;
                let text = unescape_html(&std::mem::take(&mut self.code));
                self.blocks.push(Block::Code {
                    index: self.code_count,
                    text,
                });
                self.code_count += 1;
            }
            "code" if !self.in_pre => self.text.push('`'),
            "td" | "th" => self.text.push_str(" │ "),
            "tr" => self.flush(),
            _ => {}
        }
    }

    fn text(&mut self, raw: &str) {
        if self.in_pre {
            self.code.push_str(raw);
        } else {
            self.text.push_str(&unescape_html(raw));
        }
    }
}

fn start_attribute(raw: &str) -> Option<usize> {
    let rest = &raw[raw.find("start=\"")? + 7..];
    rest[..rest.find('"')?].parse().ok()
}

/// Split markup into blocks
pub fn parse_blocks(markup: &str) -> Vec<Block> {
    let mut parser = BlockParser::default();
    let mut rest = markup;

    while !rest.is_empty() {
        match rest.find('<') {
            Some(0) => {
                let Some(end) = rest.find('>') else {
                    parser.text(rest);
                    break;
                };
                let raw = &rest[1..end];
                rest = &rest[end + 1..];

                let (closing, body) = match raw.strip_prefix('/') {
                    Some(body) => (true, body),
                    None => (false, raw),
                };
                let name = body
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();

                if closing {
                    parser.close(&name);
                } else {
                    parser.open(&name, raw);
                }
            }
            Some(next) => {
                parser.text(&rest[..next]);
                rest = &rest[next..];
            }
            None => {
                parser.text(rest);
                break;
            }
        }
    }

    parser.flush();
    parser.blocks
}

/// Word-wrap `text` to `width` display columns, keeping explicit newlines.
///
/// Runs of whitespace collapse to one space. A word wider than `width` is
/// broken at character boundaries.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let word_width = word.width();
            if current_width > 0 && current_width + 1 + word_width > width {
                lines.push(std::mem::take(&mut current_line));
                current_width = 0;
            }

            if word_width > width {
                // Too wide for any line: break it by character
                let mut parts = wrap_chars(word, width);
                let last = parts.pop().unwrap_or_default();
                lines.extend(parts);
                current_width = last.width();
                current_line = last;
                continue;
            }

            if current_width > 0 {
                current_line.push(' ');
                current_width += 1;
            }
            current_line.push_str(word);
            current_width += word_width;
        }

        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Hard-wrap `text` at character boundaries so no part exceeds `width`
/// display columns. Whitespace is kept as is.
pub fn wrap_chars(text: &str, width: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if ch_width > 0 && current_width + ch_width > width && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(ch);
        current_width += ch_width;
    }

    if !current.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

/// Wrap plain text that may carry layout, such as a reply still streaming.
///
/// Each line keeps its leading whitespace, and continuation lines are
/// indented to match it.
pub fn wrap_plain(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for line in text.split('\n') {
        let body = line.trim_start();
        let indent = expand_tabs(&line[..line.len() - body.len()]);
        let indent_width = indent.width();

        // Deep indentation would leave no room: hard-wrap the line instead
        if indent_width * 2 >= width {
            lines.extend(wrap_chars(&expand_tabs(line), width));
            continue;
        }

        for part in wrap_text(body, width - indent_width) {
            lines.push(format!("{indent}{part}"));
        }
    }
    lines
}

fn expand_tabs(text: &str) -> String {
    text.replace('\t', &" ".repeat(TAB_WIDTH))
}

/// Render markup into styled lines.
///
/// `copy_label` yields the label for code block `index`, or `None` when no
/// copy control is attached to it.
pub fn render_markup(
    markup: &str,
    width: u16,
    copy_label: &dyn Fn(usize) -> Option<String>,
) -> Vec<Line<'static>> {
    let width = width as usize;
    let mut lines = Vec::new();

    for block in parse_blocks(markup) {
        match block {
            Block::Paragraph { indent, text } => {
                push_wrapped(&mut lines, &text, width, &" ".repeat(indent), &" ".repeat(indent), Style::default());
            }
            Block::Heading { level, text } => {
                let style = Style::default()
                    .fg(if level <= 2 { Color::Cyan } else { Color::LightCyan })
                    .add_modifier(Modifier::BOLD);
                push_wrapped(&mut lines, &text, width, "", "", style);
            }
            Block::ListItem {
                indent,
                marker,
                text,
            } => {
                let first = format!("{}{}", " ".repeat(indent), marker);
                let rest = " ".repeat(first.width());
                push_wrapped(&mut lines, &text, width, &first, &rest, Style::default());
            }
            Block::Quote { text } => {
                push_wrapped(&mut lines, &text, width, "▎ ", "▎ ", Style::default().fg(Color::Gray));
            }
            Block::Code { index, text } => {
                let code_style = Style::default().fg(Color::Yellow);
                let code_width = width.saturating_sub(2).max(1);
                for code_line in text.trim_end_matches('\n').split('\n') {
                    for part in wrap_chars(&expand_tabs(code_line), code_width) {
                        lines.push(Line::from(vec![
                            Span::styled("│ ", Style::default().fg(Color::DarkGray)),
                            Span::styled(part, code_style),
                        ]));
                    }
                }
                if let Some(label) = copy_label(index) {
                    lines.push(Line::from(vec![Span::styled(
                        format!("[{} {}]", label, index + 1),
                        Style::default().fg(Color::Blue),
                    )]));
                }
            }
            Block::Rule => {
                lines.push(Line::from(Span::styled(
                    "─".repeat(width.clamp(1, 40)),
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
    }

    lines
}

fn push_wrapped(
    lines: &mut Vec<Line<'static>>,
    text: &str,
    width: usize,
    first_prefix: &str,
    rest_prefix: &str,
    style: Style,
) {
    let available = width.saturating_sub(first_prefix.width()).max(1);
    for (i, line) in wrap_text(text, available).into_iter().enumerate() {
        let prefix = if i == 0 { first_prefix } else { rest_prefix };
        lines.push(Line::from(vec![
            Span::raw(prefix.to_string()),
            Span::styled(line, style),
        ]));
    }
}
