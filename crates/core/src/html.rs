use regex::{Captures, Regex};

/// Strips stored article HTML down to readable plain text.
#[derive(Debug, Clone)]
pub struct HtmlText {
    dropped_blocks: Regex,
    comments: Regex,
    block_tags: Regex,
    tags: Regex,
    blank_runs: Regex,
    spaces: Regex,
    numeric_entities: Regex,
}

impl HtmlText {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            dropped_blocks: Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")?,
            comments: Regex::new(r"(?s)<!--.*?-->")?,
            block_tags: Regex::new(
                r"(?i)</?(div|p|br|h[1-6]|li|tr|blockquote|section|article|header|footer|figure|figcaption)[^>]*>",
            )?,
            tags: Regex::new(r"<[^>]+>")?,
            blank_runs: Regex::new(r"\n\s*\n+")?,
            spaces: Regex::new(r"[ \t\x{a0}]+")?,
            numeric_entities: Regex::new(r"&#(?:[xX]([0-9a-fA-F]+)|([0-9]+));")?,
        })
    }

    pub fn to_text(&self, html: &str) -> String {
        let text = self.dropped_blocks.replace_all(html, "");
        let text = self.comments.replace_all(&text, "");
        let text = self.block_tags.replace_all(&text, "\n");
        let text = self.tags.replace_all(&text, "");
        let text = self.decode_entities(&text);
        let text = self.spaces.replace_all(&text, " ");

        let lines = text
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n");
        self.blank_runs
            .replace_all(&lines, "\n\n")
            .trim()
            .to_string()
    }

    fn decode_entities(&self, text: &str) -> String {
        let text = text
            .replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&ldquo;", "\u{201c}")
            .replace("&rdquo;", "\u{201d}");
        let text = self
            .numeric_entities
            .replace_all(&text, |caps: &Captures<'_>| {
                let code = match (caps.get(1), caps.get(2)) {
                    (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                    (None, Some(decimal)) => decimal.as_str().parse::<u32>().ok(),
                    (None, None) => None,
                };
                match code.and_then(char::from_u32) {
                    Some(ch) => ch.to_string(),
                    None => caps[0].to_string(),
                }
            });
        text.replace("&amp;", "&")
    }
}
