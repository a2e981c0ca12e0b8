use rusqlite::{Connection, params_from_iter};
use serde::Deserialize;

use crate::store::images::{IMAGE_COLUMNS, row_to_image};
use crate::store::{Image, StoreResult};

/// Upper bound on images returned by one gallery query.
pub const MAX_RESULTS: usize = 60;

/// Raw query-string parameters of the gallery view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryParams {
    pub q: Option<String>,
    pub tag: Option<String>,
    pub color: Option<String>,
    pub shuffle: Option<String>,
}

/// Normalized gallery filters. Every active filter must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryFilter {
    /// Case-insensitive substring of title, prompt, or any tag name.
    pub text: Option<String>,
    /// Exact tag slug.
    pub tag: Option<String>,
    /// Lowercase substring of the stored palette text.
    pub color: Option<String>,
    pub shuffle: bool,
}

impl Default for GalleryFilter {
    fn default() -> Self {
        Self {
            text: None,
            tag: None,
            color: None,
            shuffle: true,
        }
    }
}

impl From<&GalleryParams> for GalleryFilter {
    fn from(params: &GalleryParams) -> Self {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            text: non_empty(&params.q),
            tag: non_empty(&params.tag),
            color: non_empty(&params.color).map(|c| c.to_lowercase()),
            // Shuffled unless explicitly asked for something other than "1".
            shuffle: params.shuffle.as_deref().is_none_or(|s| s == "1"),
        }
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<String>,
}

impl GalleryFilter {
    pub fn to_sql(&self) -> BuiltQuery {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(text) = &self.text {
            clauses.push(
                "(images.title LIKE ? ESCAPE '\\' \
                 OR images.prompt LIKE ? ESCAPE '\\' \
                 OR EXISTS (SELECT 1 FROM image_tags JOIN tags ON tags.id = image_tags.tag_id \
                            WHERE image_tags.image_id = images.id AND tags.name LIKE ? ESCAPE '\\'))",
            );
            let pattern = format!("%{}%", escape_like(text));
            params.extend(std::iter::repeat_n(pattern, 3));
        }

        if let Some(tag) = &self.tag {
            clauses.push(
                "EXISTS (SELECT 1 FROM image_tags JOIN tags ON tags.id = image_tags.tag_id \
                 WHERE image_tags.image_id = images.id AND tags.slug = ?)",
            );
            params.push(tag.clone());
        }

        if let Some(color) = &self.color {
            clauses.push("instr(COALESCE(images.palette, ''), ?) > 0");
            params.push(color.clone());
        }

        let mut sql = format!("SELECT {} FROM images", IMAGE_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql.push_str(if self.shuffle {
            " ORDER BY RANDOM()"
        } else {
            " ORDER BY images.id DESC"
        });
        sql.push_str(&format!(" LIMIT {}", MAX_RESULTS));

        BuiltQuery { sql, params }
    }

    pub fn execute(&self, conn: &Connection) -> StoreResult<Vec<Image>> {
        let query = self.to_sql();
        let mut stmt = conn.prepare(&query.sql)?;
        let images = stmt
            .query_map(params_from_iter(query.params.iter()), row_to_image)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
