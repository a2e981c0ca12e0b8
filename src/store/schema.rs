pub(crate) const INIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    slug     TEXT,
    title    TEXT,
    filename TEXT UNIQUE,
    prompt   TEXT,
    model    TEXT,
    seed     TEXT,
    preset   TEXT,
    width    INTEGER,
    height   INTEGER,
    palette  TEXT,
    likes    INTEGER DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_images_slug ON images(slug);

CREATE TABLE IF NOT EXISTS tags (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS image_tags (
    image_id INTEGER NOT NULL REFERENCES images(id),
    tag_id   INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (image_id, tag_id)
);

CREATE INDEX IF NOT EXISTS idx_image_tags_tag ON image_tags(tag_id);
"#;

pub(crate) const CONNECTION_PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
"#;
