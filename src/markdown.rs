//! Markdown to markup conversion for finished agent replies.
//!
//! Uses pulldown-cmark for parsing. The transform is only ever applied to a
//! complete reply, never to a partial stream.

use pulldown_cmark::{Options, Parser, html};

/// Pure text-to-markup transform
pub trait MarkdownTransform: Send {
    fn render(&self, text: &str) -> String;
}

/// CommonMark with the GitHub extensions agents tend to emit
#[derive(Debug, Clone, Copy, Default)]
pub struct CmarkTransform;

impl CmarkTransform {
    fn options() -> Options {
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
    }
}

impl MarkdownTransform for CmarkTransform {
    fn render(&self, text: &str) -> String {
        let parser = Parser::new_ext(text, Self::options());
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

impl<F> MarkdownTransform for F
where
    F: Fn(&str) -> String + Send,
{
    fn render(&self, text: &str) -> String {
        self(text)
    }
}

/// Plain text of every `<pre><code>` block in rendered markup, in order.
///
/// Works on markup alone so that copy controls can be attached to restored
/// turns as well as freshly rendered ones.
pub fn code_blocks(markup: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = markup;

    while let Some(pre) = rest.find("<pre") {
        rest = &rest[pre + 4..];
        let Some(pre_end) = rest.find("</pre>") else {
            break;
        };
        let inside = &rest[..pre_end];
        rest = &rest[pre_end + 6..];

        let Some(code) = inside.find("<code") else {
            continue;
        };
        let after_tag = &inside[code..];
        let Some(open_end) = after_tag.find('>') else {
            continue;
        };
        let body = &after_tag[open_end + 1..];
        let body = match body.rfind("</code>") {
            Some(close) => &body[..close],
            None => body,
        };
        blocks.push(unescape_html(body));
    }

    blocks
}

/// Decode the entities an HTML renderer produces for text content
pub fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_paragraphs() {
        assert_eq!(CmarkTransform.render("Hello, world"), "<p>Hello, world</p>\n");
    }

    #[test]
    fn renders_gfm_tables() {
        let markup = CmarkTransform.render("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(markup.contains("<table>"));
        assert!(markup.contains("<td>2</td>"));
    }

    #[test]
    fn extracts_code_blocks_with_entities_decoded() {
        let markup = CmarkTransform.render(
            "Run this:\n\n```rust\nif a < b && c > d { println!(\"x\"); }\n```\n\nand `inline` is not a block\n\n```\nls -la\n```\n",
        );
        let blocks = code_blocks(&markup);
        assert_eq!(
            blocks,
            vec![
                "if a < b && c > d { println!(\"x\"); }\n".to_string(),
                "ls -la\n".to_string(),
            ]
        );
    }

    #[test]
    fn no_code_blocks_in_plain_markup() {
        assert!(code_blocks("<p>just <code>inline</code></p>").is_empty());
    }

    #[test]
    fn unescape_handles_numeric_and_unknown_entities() {
        assert_eq!(unescape_html("&#39;a&#x27; &amp;&bogus; & b"), "'a' &&bogus; & b");
    }

    #[test]
    fn closures_are_transforms() {
        let upper = |text: &str| text.to_uppercase();
        assert_eq!(upper.render("abc"), "ABC");
    }
}
