//! Markdown cleanup for text-to-speech
//!
//! Chat replies come back as Markdown. A speech engine would read the markup
//! aloud, so code, headings, quotes, list markers and emphasis markers are
//! stripped first.

use regex::Regex;
use std::sync::OnceLock;

/// Compiled cleanup rules, applied in order
pub struct TtsCleaner {
    fenced_code: Regex,
    heading: Regex,
    blockquote: Regex,
    bullet: Regex,
    numbered: Regex,
    bold_stars: Regex,
    bold_underscores: Regex,
    italic_stars: Regex,
    italic_underscores: Regex,
    blank_lines: Regex,
    spaces: Regex,
}

impl TtsCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            fenced_code: Regex::new(r"(?s)```.*?```")?,
            heading: Regex::new(r"(?m)^\s*#{1,6}\s*")?,
            blockquote: Regex::new(r"(?m)^\s*>\s*")?,
            bullet: Regex::new(r"(?m)^\s*[-*+]\s+")?,
            numbered: Regex::new(r"(?m)^\s*\d+[.)]\s+")?,
            bold_stars: Regex::new(r"\*\*(.+?)\*\*")?,
            bold_underscores: Regex::new(r"__(.+?)__")?,
            italic_stars: Regex::new(r"\*([^*_]+?)\*")?,
            italic_underscores: Regex::new(r"_([^*_]+?)_")?,
            blank_lines: Regex::new(r"\n{3,}")?,
            spaces: Regex::new(r"[ \t]{2,}")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let text = self.fenced_code.replace_all(text, " ");
        let text = text.replace('`', "");

        let text = self.heading.replace_all(&text, "");
        let text = self.blockquote.replace_all(&text, "");
        let text = self.bullet.replace_all(&text, "");
        let text = self.numbered.replace_all(&text, "");

        let text = self.bold_stars.replace_all(&text, "$1");
        let text = self.bold_underscores.replace_all(&text, "$1");
        let text = self.italic_stars.replace_all(&text, "$1");
        let text = self.italic_underscores.replace_all(&text, "$1");

        let text = text
            .replace(['\u{201C}', '\u{201D}'], "\"")
            .replace(['\u{2018}', '\u{2019}'], "'");

        let text = self.blank_lines.replace_all(&text, "\n\n");
        let text = self.spaces.replace_all(&text, " ");

        text.trim().to_string()
    }
}

fn shared_cleaner() -> Result<&'static TtsCleaner, regex::Error> {
    static CLEANER: OnceLock<Result<TtsCleaner, regex::Error>> = OnceLock::new();
    CLEANER
        .get_or_init(TtsCleaner::new)
        .as_ref()
        .map_err(Clone::clone)
}

/// Strip Markdown so a speech engine reads only the content
pub fn clean_for_tts(text: &str) -> Result<String, regex::Error> {
    let cleaned = shared_cleaner()?.clean(text);
    tracing::debug!("TTS cleanup: {} -> {} chars", text.len(), cleaned.len());
    Ok(cleaned)
}
