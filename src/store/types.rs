use serde::Serialize;

pub type ImageId = i64;
pub type TagId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub id: ImageId,
    pub slug: String,
    pub title: String,
    pub filename: String,
    pub prompt: String,
    pub model: String,
    pub seed: String,
    pub preset: String,
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
    pub likes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub slug: String,
}

/// Every field of an image the ingestion routine writes. `likes` is not
/// here: it is set to zero on insert and never touched on update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub slug: String,
    pub title: String,
    pub filename: String,
    pub prompt: String,
    pub model: String,
    pub seed: String,
    pub preset: String,
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
}

/// Ordered list of `#rrggbb` colors, stored as a JSON array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Palette(pub Vec<String>);

impl Palette {
    /// Parses the stored column. Absent or malformed text yields an empty
    /// palette instead of an error.
    pub fn from_stored(stored: Option<&str>) -> Self {
        match stored {
            Some(text) if !text.trim().is_empty() => serde_json::from_str::<Vec<String>>(text)
                .map(Palette)
                .unwrap_or_else(|e| {
                    tracing::debug!("Ignoring malformed stored palette {:?}: {}", text, e);
                    Palette::default()
                }),
            _ => Palette::default(),
        }
    }

    pub fn to_stored(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn colors(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
