//! Article file loading
//!
//! Markdown files may start with a `---` YAML frontmatter block carrying
//! `title`, `summary`, `cover`, `tags`, `categories` and `source_url`.

use anyhow::{Context, Result};
use crosspost_domain::Article;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    source_url: Option<String>,
}

/// Load an article from `.json`, `.html`/`.htm`, or markdown
pub fn load(path: &Path) -> Result<Article> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read article: {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let mut article = match extension.as_deref() {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid article JSON: {}", path.display()))?,
        Some("html" | "htm") => Article {
            html: Some(content),
            ..Article::default()
        },
        _ => parse_markdown(&content)
            .with_context(|| format!("Invalid frontmatter in {}", path.display()))?,
    };

    if article.title.trim().is_empty() {
        article.title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
    }

    if article.markdown.is_none() && article.html.is_none() {
        anyhow::bail!("Article has no content: {}", path.display());
    }

    Ok(article)
}

/// Split frontmatter off and build the article; the first `# ` heading
/// stands in for a missing title
fn parse_markdown(content: &str) -> Result<Article> {
    let (frontmatter, body) = split_frontmatter(content);
    let meta: Frontmatter = match frontmatter {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml)?,
        _ => Frontmatter::default(),
    };

    let title = meta
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            body.lines()
                .find_map(|line| line.strip_prefix("# "))
                .map(|t| t.trim().to_string())
        })
        .unwrap_or_default();

    Ok(Article {
        title,
        markdown: Some(body.trim().to_string()),
        html: None,
        summary: meta.summary,
        cover: meta.cover,
        tags: meta.tags,
        categories: meta.categories,
        source_url: meta.source_url,
    })
}

fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let content = content.trim_start_matches('\u{feff}');
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, content)
}
