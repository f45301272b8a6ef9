//! Basic content processor: HTML clean-up and markdown/HTML conversion
//!
//! Covers the subset of markdown that articles actually use (headings,
//! paragraphs, emphasis, links, images, lists, code). Anything fancier
//! should come from a dedicated converter behind the same port.

use crosspost_domain::ContentProcessor;
use regex::{Captures, Regex};
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pattern).expect("Valid regex"));
    };
}

regex!(SCRIPT_OR_STYLE, r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>");
regex!(COMMENT, r"(?s)<!--.*?-->");
regex!(EVENT_ATTR, r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#);
regex!(BLANK_RUNS, r"\n{3,}");

regex!(MD_HEADING, r"^(#{1,6})\s+(.*?)\s*#*\s*$");
regex!(MD_LIST_ITEM, r"^\s*(?:[-*+]|\d+\.)\s+(.*)$");
regex!(MD_IMAGE, r"!\[([^\]]*)\]\(([^)\s]+)\)");
regex!(MD_LINK, r"\[([^\]]+)\]\(([^)\s]+)\)");
regex!(MD_BOLD, r"\*\*([^*]+)\*\*");
regex!(MD_ITALIC, r"\*([^*]+)\*");
regex!(MD_CODE, r"`([^`]+)`");

regex!(HTML_PRE, r"(?is)<pre[^>]*>\s*(?:<code[^>]*>)?(.*?)(?:</code>)?\s*</pre>");
regex!(HTML_HEADING, r"(?is)<h([1-6])[^>]*>(.*?)</h[1-6]>");
regex!(HTML_IMG, r#"(?is)<img\b[^>]*?src\s*=\s*["']([^"']+)["'][^>]*>"#);
regex!(HTML_ALT, r#"(?is)alt\s*=\s*["']([^"']*)["']"#);
regex!(HTML_LINK, r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#);
regex!(HTML_BOLD, r"(?is)<(?:strong|b)>(.*?)</(?:strong|b)>");
regex!(HTML_ITALIC, r"(?is)<(?:em|i)>(.*?)</(?:em|i)>");
regex!(HTML_CODE, r"(?is)<code[^>]*>(.*?)</code>");
regex!(HTML_LI, r"(?is)<li[^>]*>(.*?)</li>");
regex!(HTML_BR, r"(?i)<br\s*/?>");
regex!(HTML_BLOCK_END, r"(?i)</(p|div|ul|ol|blockquote|h[1-6])>");
regex!(HTML_TAG, r"(?s)<[^>]+>");

/// Regex-based implementation of the content port
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicContentProcessor;

impl BasicContentProcessor {
    pub fn new() -> Self {
        Self
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Inline markdown on one escaped line
fn inline_markdown(line: &str) -> String {
    let text = escape_html(line);
    let text = MD_CODE.replace_all(&text, "<code>$1</code>");
    let text = MD_IMAGE.replace_all(&text, r#"<img src="$2" alt="$1">"#);
    let text = MD_LINK.replace_all(&text, r#"<a href="$2">$1</a>"#);
    let text = MD_BOLD.replace_all(&text, "<strong>$1</strong>");
    MD_ITALIC.replace_all(&text, "<em>$1</em>").into_owned()
}

#[derive(PartialEq)]
enum Block {
    None,
    Paragraph,
    List,
    Code,
}

struct HtmlWriter {
    out: Vec<String>,
    block: Block,
    paragraph: Vec<String>,
}

impl HtmlWriter {
    fn close(&mut self) {
        match self.block {
            Block::Paragraph => {
                let text = self.paragraph.join(" ");
                self.out.push(format!("<p>{}</p>", inline_markdown(&text)));
                self.paragraph.clear();
            }
            Block::List => self.out.push("</ul>".to_string()),
            Block::Code => self.out.push("</code></pre>".to_string()),
            Block::None => {}
        }
        self.block = Block::None;
    }
}

impl ContentProcessor for BasicContentProcessor {
    fn preprocess(&self, html: &str) -> String {
        let html = SCRIPT_OR_STYLE.replace_all(html, "");
        let html = COMMENT.replace_all(&html, "");
        let html = EVENT_ATTR.replace_all(&html, "");
        html.trim().to_string()
    }

    fn markdown_to_html(&self, markdown: &str) -> String {
        let mut writer = HtmlWriter {
            out: Vec::new(),
            block: Block::None,
            paragraph: Vec::new(),
        };

        for line in markdown.lines() {
            if writer.block == Block::Code {
                if line.trim_start().starts_with("```") {
                    writer.close();
                } else {
                    let escaped = escape_html(line);
                    writer.out.push(escaped);
                }
                continue;
            }

            if line.trim_start().starts_with("```") {
                writer.close();
                writer.out.push("<pre><code>".to_string());
                writer.block = Block::Code;
                continue;
            }

            if line.trim().is_empty() {
                writer.close();
                continue;
            }

            if let Some(caps) = MD_HEADING.captures(line) {
                writer.close();
                let level = caps[1].len();
                writer
                    .out
                    .push(format!("<h{level}>{}</h{level}>", inline_markdown(&caps[2])));
                continue;
            }

            if let Some(caps) = MD_LIST_ITEM.captures(line) {
                if writer.block != Block::List {
                    writer.close();
                    writer.out.push("<ul>".to_string());
                    writer.block = Block::List;
                }
                writer.out.push(format!("<li>{}</li>", inline_markdown(&caps[1])));
                continue;
            }

            if writer.block != Block::Paragraph {
                writer.close();
                writer.block = Block::Paragraph;
            }
            writer.paragraph.push(line.trim().to_string());
        }
        writer.close();

        // One block per line; code blocks hug their delimiters
        let mut html = String::new();
        for chunk in writer.out {
            match chunk.as_str() {
                "<pre><code>" => html.push_str(&chunk),
                "</code></pre>" => {
                    if html.ends_with('\n') {
                        html.pop();
                    }
                    html.push_str(&chunk);
                    html.push('\n');
                }
                _ => {
                    html.push_str(&chunk);
                    html.push('\n');
                }
            }
        }
        html.trim_end().to_string()
    }

    fn html_to_markdown(&self, html: &str) -> String {
        let text = self.preprocess(html);
        let text = HTML_PRE.replace_all(&text, |caps: &Captures<'_>| {
            format!("\n```\n{}\n```\n", unescape_html(caps[1].trim_matches('\n')))
        });
        let text = HTML_HEADING.replace_all(&text, |caps: &Captures<'_>| {
            let level: usize = caps[1].parse().unwrap_or(1);
            format!("\n{} {}\n", "#".repeat(level), caps[2].trim())
        });
        let text = HTML_IMG.replace_all(&text, |caps: &Captures<'_>| {
            let alt = HTML_ALT
                .captures(&caps[0])
                .map(|a| a[1].to_string())
                .unwrap_or_default();
            format!("![{}]({})", alt, &caps[1])
        });
        let text = HTML_LINK.replace_all(&text, "[$2]($1)");
        let text = HTML_BOLD.replace_all(&text, "**$1**");
        let text = HTML_ITALIC.replace_all(&text, "*$1*");
        let text = HTML_CODE.replace_all(&text, "`$1`");
        let text = HTML_LI.replace_all(&text, "- $1\n");
        let text = HTML_BR.replace_all(&text, "\n");
        let text = HTML_BLOCK_END.replace_all(&text, "\n\n");
        let text = HTML_TAG.replace_all(&text, "");
        let text = unescape_html(&text);

        let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
        let joined = lines.join("\n");
        BLANK_RUNS.replace_all(&joined, "\n\n").trim().to_string()
    }
}
