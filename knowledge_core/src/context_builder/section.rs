//! Titled sections of a context bundle.

/// How a section lays out its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLayout {
    /// One `- entry` line each.
    Bulleted,
    /// All entries on one comma-separated line.
    Inline,
}

/// One titled block of context. Entries are never split when trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSection {
    pub title: String,
    pub entries: Vec<String>,
    pub layout: SectionLayout,
}

impl ContextSection {
    /// Create a section with one entry per line.
    pub fn bulleted(title: impl Into<String>, entries: Vec<String>) -> Self {
        Self {
            title: title.into(),
            entries,
            layout: SectionLayout::Bulleted,
        }
    }

    /// Create a section with entries on one comma-separated line.
    pub fn inline(title: impl Into<String>, entries: Vec<String>) -> Self {
        Self {
            title: title.into(),
            entries,
            layout: SectionLayout::Inline,
        }
    }

    /// Whether the section has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a `## Title` header followed by the entries.
    pub fn render(&self) -> String {
        let mut text = format!("## {}\n", self.title);
        match self.layout {
            SectionLayout::Bulleted => {
                for entry in &self.entries {
                    text.push_str("- ");
                    text.push_str(entry);
                    text.push('\n');
                }
            }
            SectionLayout::Inline => {
                text.push_str(&self.entries.join(", "));
                text.push('\n');
            }
        }
        text
    }
}

/// Render sections separated by blank lines.
pub fn render_sections(sections: &[ContextSection]) -> String {
    sections
        .iter()
        .map(ContextSection::render)
        .collect::<Vec<_>>()
        .join("\n")
}
