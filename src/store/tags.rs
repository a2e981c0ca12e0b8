//! Tag rows and the image/tag join relation.
//!
//! The join table is the only place the association is recorded. Callers
//! get one-directional views of it: [`tags_for_images`] for image -> tags
//! and [`image_ids_for_tag`] for tag -> images.

use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::HashMap;

use super::{ImageId, StoreResult, Tag, TagId};

fn row_to_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
    })
}

pub fn find_by_slug(conn: &Connection, slug: &str) -> StoreResult<Option<Tag>> {
    Ok(conn
        .query_row(
            "SELECT id, name, slug FROM tags WHERE slug = ?1",
            params![slug],
            row_to_tag,
        )
        .optional()?)
}

pub fn insert(conn: &Connection, name: &str, slug: &str) -> StoreResult<TagId> {
    conn.execute(
        "INSERT INTO tags (name, slug) VALUES (?1, ?2)",
        params![name, slug],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Looks a tag up by slug, creating it with `name` when absent. An existing
/// tag keeps the name it was first created with.
pub fn find_or_create(conn: &Connection, name: &str, slug: &str) -> StoreResult<Tag> {
    if let Some(tag) = find_by_slug(conn, slug)? {
        return Ok(tag);
    }

    let id = insert(conn, name, slug)?;
    Ok(Tag {
        id,
        name: name.to_string(),
        slug: slug.to_string(),
    })
}

pub fn list_all(conn: &Connection) -> StoreResult<Vec<Tag>> {
    let mut stmt = conn.prepare("SELECT id, name, slug FROM tags ORDER BY name COLLATE NOCASE")?;
    let tags = stmt
        .query_map([], row_to_tag)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tags)
}

/// Associates a tag with an image. Returns false if they were already linked.
pub fn attach(conn: &Connection, image_id: ImageId, tag_id: TagId) -> StoreResult<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO image_tags (image_id, tag_id) VALUES (?1, ?2)",
        params![image_id, tag_id],
    )?;
    Ok(rows > 0)
}

pub fn clear_for_image(conn: &Connection, image_id: ImageId) -> StoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM image_tags WHERE image_id = ?1",
        params![image_id],
    )?)
}

/// Image -> tags lookup for a batch of images, each list ordered by tag name.
/// Images without tags map to an empty list.
pub fn tags_for_images(
    conn: &Connection,
    image_ids: &[ImageId],
) -> StoreResult<HashMap<ImageId, Vec<Tag>>> {
    let mut lookup: HashMap<ImageId, Vec<Tag>> =
        image_ids.iter().map(|id| (*id, Vec::new())).collect();

    if image_ids.is_empty() {
        return Ok(lookup);
    }

    let placeholders = vec!["?"; image_ids.len()].join(", ");
    let sql = format!(
        "SELECT image_tags.image_id AS image_id, tags.id AS id, tags.name AS name, tags.slug AS slug \
         FROM image_tags JOIN tags ON tags.id = image_tags.tag_id \
         WHERE image_tags.image_id IN ({}) \
         ORDER BY tags.name COLLATE NOCASE",
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(image_ids.iter()), |row| {
        Ok((row.get::<_, ImageId>("image_id")?, row_to_tag(row)?))
    })?;

    for row in rows {
        let (image_id, tag) = row?;
        lookup.entry(image_id).or_default().push(tag);
    }

    Ok(lookup)
}

/// Tag -> images lookup, by tag slug, oldest image first.
pub fn image_ids_for_tag(conn: &Connection, slug: &str) -> StoreResult<Vec<ImageId>> {
    let mut stmt = conn.prepare(
        "SELECT image_tags.image_id FROM image_tags \
         JOIN tags ON tags.id = image_tags.tag_id \
         WHERE tags.slug = ?1 ORDER BY image_tags.image_id ASC",
    )?;
    let ids = stmt
        .query_map(params![slug], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<ImageId>>>()?;
    Ok(ids)
}
