//! Markdown-to-Telegram-HTML rendering for streamed replies.
//!
//! The renderer is called on the *whole* accumulated buffer after every
//! chunk, so the input is usually a prefix of some larger document.
//! Invariant: for any input, including one cut mid-construct, the output
//! is balanced HTML — Telegram rejects an edit whose markup does not
//! parse, which would stall the stream.

/// Telegram message size limit.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Convert a subset of Markdown to Telegram-compatible HTML.
///
/// Supported: `**bold**`, `*italic*`, `` `code` ``, fenced code blocks
/// with an optional language tag, `~~strike~~`, `[text](url)`. HTML
/// special characters are escaped first. Constructs still open at end of
/// input are closed.
pub fn render_html(text: &str) -> String {
    let escaped = escape_html(text);
    let mut chars = escaped.chars().peekable();
    let mut out = String::with_capacity(escaped.len());
    let mut in_code = false;

    while let Some(&ch) = chars.peek() {
        // Fenced code block: ```lang\n ... ```
        if !in_code && ch == '`' && peek_n(&mut chars, 3) == "```" {
            advance(&mut chars, 3);
            let mut lang = String::new();
            while let Some(&c) = chars.peek() {
                chars.next();
                if c == '\n' {
                    break;
                }
                lang.push(c);
            }
            let mut block = String::new();
            loop {
                if chars.peek().is_none() {
                    break;
                }
                if peek_n(&mut chars, 3) == "```" {
                    advance(&mut chars, 3);
                    break;
                }
                if let Some(c) = chars.next() {
                    block.push(c);
                }
            }
            if lang.is_empty() {
                out.push_str("<pre>");
                out.push_str(&block);
                out.push_str("</pre>");
            } else {
                out.push_str(&format!("<pre><code class=\"language-{lang}\">"));
                out.push_str(&block);
                out.push_str("</code></pre>");
            }
            continue;
        }

        // Inline code toggles; markdown inside it passes through untouched.
        if ch == '`' {
            chars.next();
            out.push_str(if in_code { "</code>" } else { "<code>" });
            in_code = !in_code;
            continue;
        }
        if in_code {
            if let Some(c) = chars.next() {
                out.push(c);
            }
            continue;
        }

        if ch == '~' && peek_n(&mut chars, 2) == "~~" {
            advance(&mut chars, 2);
            let content = take_until(&mut chars, "~~");
            out.push_str("<s>");
            out.push_str(&content);
            out.push_str("</s>");
            continue;
        }

        if ch == '*' && peek_n(&mut chars, 2) == "**" {
            advance(&mut chars, 2);
            let content = take_until(&mut chars, "**");
            out.push_str("<b>");
            out.push_str(&content);
            out.push_str("</b>");
            continue;
        }

        if ch == '*' {
            chars.next();
            let content = take_until(&mut chars, "*");
            out.push_str("<i>");
            out.push_str(&content);
            out.push_str("</i>");
            continue;
        }

        // Link: [text](url). Without the (url) part, the brackets are
        // reproduced literally.
        if ch == '[' {
            chars.next();
            let mut link_text = String::new();
            let mut found_close = false;
            while let Some(&c) = chars.peek() {
                chars.next();
                if c == ']' {
                    found_close = true;
                    break;
                }
                link_text.push(c);
            }
            if found_close && chars.peek() == Some(&'(') {
                chars.next();
                let mut url = String::new();
                while let Some(&c) = chars.peek() {
                    chars.next();
                    if c == ')' {
                        break;
                    }
                    url.push(c);
                }
                out.push_str(&format!("<a href=\"{url}\">{link_text}</a>"));
            } else {
                out.push('[');
                out.push_str(&link_text);
                if found_close {
                    out.push(']');
                }
            }
            continue;
        }

        if let Some(c) = chars.next() {
            out.push(c);
        }
    }

    // Input ended inside an inline code span.
    if in_code {
        out.push_str("</code>");
    }

    out
}

/// Collect characters until `delim` (consumed) or end of input.
///
/// Running off the end is the streaming case; the caller closes the
/// construct regardless.
fn take_until(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, delim: &str) -> String {
    let mut content = String::new();
    loop {
        if chars.peek().is_none() {
            break;
        }
        if peek_n(chars, delim.chars().count()) == delim {
            advance(chars, delim.chars().count());
            break;
        }
        if let Some(c) = chars.next() {
            content.push(c);
        }
    }
    content
}

fn peek_n(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, n: usize) -> String {
    chars.clone().take(n).collect()
}

fn advance(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, n: usize) {
    for _ in 0..n {
        chars.next();
    }
}

/// Escape HTML special characters.
///
/// Quotes are included because link URLs land inside an `href="…"`
/// attribute; a raw `"` there makes the whole message unparseable.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Truncate to at most `max_len` bytes without splitting a character.
#[must_use]
pub fn truncate_at_char_boundary(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("**hello**", "<b>hello</b>")]
    #[case("*hello*", "<i>hello</i>")]
    #[case("`code`", "<code>code</code>")]
    #[case("~~old~~", "<s>old</s>")]
    #[case("plain text", "plain text")]
    #[case("<script>alert(1)</script>", "&lt;script&gt;alert(1)&lt;/script&gt;")]
    #[case("a & b", "a &amp; b")]
    fn inline_constructs(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(render_html(input), expected);
    }

    #[test]
    fn fenced_code_block_with_language() {
        let output = render_html("```rust\nfn main() {}\n```");
        assert!(output.contains("<pre><code class=\"language-rust\">"));
        assert!(output.contains("fn main() {}"));
        assert!(output.ends_with("</code></pre>"));
    }

    #[test]
    fn fenced_code_block_without_language() {
        assert_eq!(render_html("```\nx\n```"), "<pre>x\n</pre>");
    }

    #[test]
    fn link() {
        assert_eq!(
            render_html("[click](https://example.com)"),
            "<a href=\"https://example.com\">click</a>"
        );
    }

    #[test]
    fn bracket_without_url_passes_through() {
        assert_eq!(render_html("[note] text"), "[note] text");
    }

    #[test]
    fn quotes_are_escaped_in_plain_text() {
        assert_eq!(render_html("say \"hi\""), "say &quot;hi&quot;");
    }

    // A raw quote inside href="…" would make every later re-render of
    // the growing buffer unparseable, stalling the stream.
    #[test]
    fn quote_in_link_url_cannot_break_the_href_attribute() {
        let output = render_html(r#"see [docs](https://e.com/a"b) for more"#);
        assert_eq!(
            output,
            "see <a href=\"https://e.com/a&quot;b\">docs</a> for more"
        );
        assert_attribute_safe(&output);
    }

    #[test]
    fn markdown_inside_inline_code_is_literal() {
        assert_eq!(render_html("`**x**`"), "<code>**x**</code>");
    }

    #[rstest]
    #[case("prefix `untermin")]
    #[case("**bold cut off")]
    #[case("~~strike cut")]
    #[case("```rust\nfn half(")]
    fn unterminated_constructs_are_closed(#[case] input: &str) {
        assert_balanced(&render_html(input));
    }

    // The renderer runs on a growing prefix each chunk, so every prefix
    // must produce markup Telegram will accept.
    #[test]
    fn every_prefix_renders_balanced_html() {
        let doc = "Intro **bold** then `code`, a [link](https://e.com/a\"b),\n\
                   ```python\nprint('hi')\n```\nand ~~gone~~ *emph* end.";
        for (i, _) in doc.char_indices().skip(1) {
            let html = render_html(&doc[..i]);
            assert_balanced(&html);
            assert_attribute_safe(&html);
        }
        assert_balanced(&render_html(doc));
    }

    fn assert_balanced(html: &str) {
        for tag in ["b", "i", "s", "code", "pre"] {
            let opens = html.matches(&format!("<{tag}")).count();
            let closes = html.matches(&format!("</{tag}>")).count();
            assert_eq!(opens, closes, "unbalanced <{tag}> in: {html}");
        }
    }

    // Every literal quote must be escaped, so the only raw `"` left are
    // the two delimiting each href attribute.
    fn assert_attribute_safe(html: &str) {
        let quotes = html.matches('"').count();
        let hrefs = html.matches("href=\"").count();
        assert_eq!(quotes, hrefs * 2, "stray quote in: {html}");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = format!("{}л", "a".repeat(4095));
        let truncated = truncate_at_char_boundary(&text, 4096);
        assert_eq!(truncated.len(), 4095);
        assert!(truncated.chars().all(|c| c == 'a'));
    }

    #[test]
    fn truncation_is_noop_for_short_input() {
        assert_eq!(truncate_at_char_boundary("short", 4096), "short");
    }
}
