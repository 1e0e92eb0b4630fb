//! Target file name construction
//!
//! Renders the canonical episode file name from a template. Supported
//! placeholders:
//! - `{show}` - Series name (sanitized)
//! - `{season}` or `{season:NN}` - Season number with optional zero-padding
//! - `{episode}` or `{episode:NN}` - Episode number with optional zero-padding;
//!   a combined file renders its whole range, e.g. `01-E02`
//! - `{title}` - Episode title (sanitized, empty when unknown)
//! - `{original}` - Current name of the entry without its extension, e.g.
//!   `S01E01 --- {original}` keeps the release name. Renaming twice with
//!   such a template nests the name again.
//!
//! The part suffix and the original extension are appended after the template.

/// Template for `reorder`: `S01E02`
pub const DEFAULT_TEMPLATE: &str = "S{season:02}E{episode:02}";

/// Template for `number`: `Show - S01E02`
pub const NUMBERED_TEMPLATE: &str = "{show} - S{season:02}E{episode:02}";

/// Separator placed between the name and the part index: `S01E02.part1`
pub const DEFAULT_PART_SEPARATOR: &str = ".part";

/// Aired season/episode a local file is renamed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeTarget {
    /// Aired season number
    pub season: u32,
    /// Aired episode number (first of a range)
    pub episode: u32,
    /// Last aired episode when one file holds several episodes
    pub last_episode: Option<u32>,
    /// 1-based part index when one episode spans several files
    pub part: Option<u32>,
    /// Episode title, if known
    pub title: Option<String>,
    /// Name of the entry being renamed, without extension
    pub original: Option<String>,
}

impl EpisodeTarget {
    /// A plain single-file, single-episode target
    pub fn new(season: u32, episode: u32) -> Self {
        Self {
            season,
            episode,
            last_episode: None,
            part: None,
            title: None,
            original: None,
        }
    }
}

/// How target file names are rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    /// Name template, see the module documentation
    pub template: String,
    /// Text between the name and the part index
    pub part_separator: String,
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            part_separator: DEFAULT_PART_SEPARATOR.to_string(),
        }
    }
}

impl NamingScheme {
    /// Naming scheme with a custom template and the default part separator
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    /// Renders the file name for `target`
    ///
    /// # Examples
    ///
    /// ```
    /// use tv_rename::{EpisodeTarget, NamingScheme};
    ///
    /// let mut target = EpisodeTarget::new(1, 2);
    /// target.part = Some(1);
    /// let name = NamingScheme::default().file_name("Show", &target, Some("mkv"));
    /// assert_eq!(name, "S01E02.part1.mkv");
    /// ```
    pub fn file_name(&self, show_name: &str, target: &EpisodeTarget, extension: Option<&str>) -> String {
        let title = target.title.as_deref().map(sanitize_filename).unwrap_or_default();

        let mut name = self.template.replace("{show}", &sanitize_filename(show_name));
        name = replace_with_padding(&name, "season", |width| format!("{:0width$}", target.season));
        name = replace_with_padding(&name, "episode", |width| match target.last_episode {
            Some(last) if last != target.episode => {
                format!("{:0width$}-E{:0width$}", target.episode, last)
            }
            _ => format!("{:0width$}", target.episode),
        });
        name = name.replace("{title}", &title);
        let original = target.original.as_deref().map(sanitize_filename).unwrap_or_default();
        name = name.replace("{original}", &original);

        // An empty title must not leave a dangling separator behind
        let mut name = name
            .trim_end_matches(|c: char| c.is_whitespace() || c == '-' || c == '.')
            .to_string();

        if let Some(part) = target.part {
            name.push_str(&self.part_separator);
            name.push_str(&part.to_string());
        }

        if let Some(ext) = extension.filter(|e| !e.is_empty()) {
            name.push('.');
            name.push_str(ext);
        }

        name
    }
}

/// Sanitizes a string for use in filenames by replacing problematic characters
///
/// Replaces characters that are invalid or problematic in filenames across platforms:
/// - Path separators: / \
/// - Reserved characters: : * ? " < > |
/// - Control characters
/// - Trim leading/trailing whitespace and dots
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    sanitized
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// Replaces `{name}` and `{name:NN}` placeholders with the rendered value
///
/// `render` receives the requested padding width (0 when unpadded).
/// Placeholders with an unparsable width are left untouched.
fn replace_with_padding(text: &str, name: &str, render: impl Fn(usize) -> String) -> String {
    let open = format!("{{{name}");
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(&open) {
        result.push_str(&rest[..start]);
        let after = &rest[start + open.len()..];

        let placeholder = if after.starts_with('}') {
            Some((0, 1))
        } else if let Some(spec) = after.strip_prefix(':') {
            spec.find('}')
                .and_then(|end| spec[..end].parse::<usize>().ok().map(|w| (w, end + 2)))
        } else {
            None
        };

        match placeholder {
            Some((width, consumed)) => {
                result.push_str(&render(width));
                rest = &after[consumed..];
            }
            None => {
                result.push_str(&open);
                rest = after;
            }
        }
    }

    result.push_str(rest);
    result
}
