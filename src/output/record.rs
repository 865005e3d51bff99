//! Story record type and the artifact column schema

/// Artifact columns, in on-disk order
pub const COLUMNS: [&str; 12] = [
    "story_title",
    "story_link",
    "story_id",
    "author",
    "author_link",
    "summary",
    "language",
    "word_count",
    "chapters",
    "comments",
    "kudos",
    "hits",
];

/// Written when a listing has no language field
pub const UNKNOWN_LANGUAGE: &str = "UNKNOWN";

/// Written for any absent count field
pub const ZERO_COUNT: &str = "0";

/// One story entry extracted from a result listing
///
/// Optional fields are `None` when the listing markup omitted them. Defaults
/// are only applied by [`StoryRecord::to_row`]. Counts stay textual because the
/// listing formats them with thousands separators and chapters as ratios
/// such as `3/10`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoryRecord {
    pub title: String,
    /// Story link as it appears in the markup, possibly relative
    pub link: String,
    /// Last path segment of `link`
    pub story_id: String,
    pub author: String,
    pub author_link: String,
    pub summary: Option<String>,
    pub language: Option<String>,
    pub word_count: Option<String>,
    pub chapters: Option<String>,
    pub comments: Option<String>,
    pub kudos: Option<String>,
    pub hits: Option<String>,
}

impl StoryRecord {
    /// Serializes the record in [`COLUMNS`] order, applying field defaults
    pub fn to_row(&self) -> [&str; 12] {
        [
            self.title.as_str(),
            self.link.as_str(),
            self.story_id.as_str(),
            self.author.as_str(),
            self.author_link.as_str(),
            self.summary.as_deref().unwrap_or(""),
            self.language.as_deref().unwrap_or(UNKNOWN_LANGUAGE),
            self.word_count.as_deref().unwrap_or(ZERO_COUNT),
            self.chapters.as_deref().unwrap_or(ZERO_COUNT),
            self.comments.as_deref().unwrap_or(ZERO_COUNT),
            self.kudos.as_deref().unwrap_or(ZERO_COUNT),
            self.hits.as_deref().unwrap_or(ZERO_COUNT),
        ]
    }
}
