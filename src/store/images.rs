//! Image rows.

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Image, ImageId, ImageRecord, Palette, StoreResult};

/// Column list shared by every image read. NULLs from rows written by
/// other tools are folded into the defaults here.
pub(crate) const IMAGE_COLUMNS: &str = "images.id, \
     COALESCE(images.slug, '') AS slug, \
     COALESCE(images.title, '') AS title, \
     COALESCE(images.filename, '') AS filename, \
     COALESCE(images.prompt, '') AS prompt, \
     COALESCE(images.model, '') AS model, \
     COALESCE(images.seed, '') AS seed, \
     COALESCE(images.preset, '') AS preset, \
     COALESCE(images.width, 0) AS width, \
     COALESCE(images.height, 0) AS height, \
     images.palette AS palette, \
     COALESCE(images.likes, 0) AS likes";

pub(crate) fn row_to_image(row: &Row<'_>) -> rusqlite::Result<Image> {
    let palette: Option<String> = row.get("palette")?;
    let width: i64 = row.get("width")?;
    let height: i64 = row.get("height")?;

    Ok(Image {
        id: row.get("id")?,
        slug: row.get("slug")?,
        title: row.get("title")?,
        filename: row.get("filename")?,
        prompt: row.get("prompt")?,
        model: row.get("model")?,
        seed: row.get("seed")?,
        preset: row.get("preset")?,
        width: u32::try_from(width).unwrap_or(0),
        height: u32::try_from(height).unwrap_or(0),
        palette: Palette::from_stored(palette.as_deref()),
        likes: row.get("likes")?,
    })
}

pub fn find_by_id(conn: &Connection, id: ImageId) -> StoreResult<Option<Image>> {
    let sql = format!("SELECT {} FROM images WHERE images.id = ?1", IMAGE_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_image).optional()?)
}

/// Slugs are not unique; when titles collide the oldest image wins.
pub fn find_by_slug(conn: &Connection, slug: &str) -> StoreResult<Option<Image>> {
    let sql = format!(
        "SELECT {} FROM images WHERE images.slug = ?1 ORDER BY images.id ASC LIMIT 1",
        IMAGE_COLUMNS
    );
    Ok(conn.query_row(&sql, params![slug], row_to_image).optional()?)
}

pub fn find_by_filename(conn: &Connection, filename: &str) -> StoreResult<Option<Image>> {
    let sql = format!(
        "SELECT {} FROM images WHERE images.filename = ?1",
        IMAGE_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![filename], row_to_image)
        .optional()?)
}

pub fn list_all(conn: &Connection) -> StoreResult<Vec<Image>> {
    let sql = format!("SELECT {} FROM images ORDER BY images.id ASC", IMAGE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let images = stmt
        .query_map([], row_to_image)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(images)
}

pub fn insert(conn: &Connection, record: &ImageRecord) -> StoreResult<ImageId> {
    conn.execute(
        "INSERT INTO images (slug, title, filename, prompt, model, seed, preset, width, height, palette, likes) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
        params![
            record.slug,
            record.title,
            record.filename,
            record.prompt,
            record.model,
            record.seed,
            record.preset,
            record.width,
            record.height,
            record.palette.to_stored(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrites every ingested field. `likes` and `filename` are left alone.
pub fn update(conn: &Connection, id: ImageId, record: &ImageRecord) -> StoreResult<bool> {
    let rows = conn.execute(
        "UPDATE images SET slug = ?1, title = ?2, prompt = ?3, model = ?4, seed = ?5, \
         preset = ?6, width = ?7, height = ?8, palette = ?9 WHERE id = ?10",
        params![
            record.slug,
            record.title,
            record.prompt,
            record.model,
            record.seed,
            record.preset,
            record.width,
            record.height,
            record.palette.to_stored(),
            id,
        ],
    )?;
    Ok(rows > 0)
}

/// Adds one like and returns the new count, or `None` for an unknown id.
pub fn increment_likes(conn: &Connection, id: ImageId) -> StoreResult<Option<i64>> {
    let likes = conn
        .query_row(
            "UPDATE images SET likes = COALESCE(likes, 0) + 1 WHERE id = ?1 RETURNING likes",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(likes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::*;

    #[test]
    fn test_insert_and_find() {
        let (_temp_dir, db) = temp_database();
        let session = db.session().unwrap();

        let id = insert(&session, &record("neon.png", "Neon City")).unwrap();

        let by_id = find_by_id(&session, id).unwrap().unwrap();
        assert_eq!(by_id.slug, "neon-city");
        assert_eq!(by_id.likes, 0);
        assert_eq!(by_id.palette.colors(), ["#112233"]);

        let by_slug = find_by_slug(&session, "neon-city").unwrap().unwrap();
        assert_eq!(by_slug.id, id);

        let by_filename = find_by_filename(&session, "neon.png").unwrap().unwrap();
        assert_eq!(by_filename.id, id);

        assert!(find_by_id(&session, id + 100).unwrap().is_none());
        assert!(find_by_slug(&session, "missing").unwrap().is_none());
    }

    #[test]
    fn test_update_keeps_likes() {
        let (_temp_dir, db) = temp_database();
        let session = db.session().unwrap();

        let id = insert(&session, &record("neon.png", "Neon City")).unwrap();
        increment_likes(&session, id).unwrap();

        let mut changed = record("neon.png", "Neon Nights");
        changed.seed = "0007".to_string();
        assert!(update(&session, id, &changed).unwrap());

        let image = find_by_id(&session, id).unwrap().unwrap();
        assert_eq!(image.title, "Neon Nights");
        assert_eq!(image.slug, "neon-nights");
        assert_eq!(image.seed, "0007");
        assert_eq!(image.likes, 1);
    }

    #[test]
    fn test_increment_likes() {
        let (_temp_dir, db) = temp_database();
        let session = db.session().unwrap();
        let id = insert(&session, &record("a.png", "A")).unwrap();

        assert_eq!(increment_likes(&session, id).unwrap(), Some(1));
        assert_eq!(increment_likes(&session, id).unwrap(), Some(2));
        assert_eq!(increment_likes(&session, id + 1).unwrap(), None);
    }

    #[test]
    fn test_increment_likes_treats_null_as_zero() {
        let (_temp_dir, db) = temp_database();
        let session = db.session().unwrap();
        let id = insert(&session, &record("a.png", "A")).unwrap();
        session
            .execute("UPDATE images SET likes = NULL WHERE id = ?1", params![id])
            .unwrap();

        assert_eq!(find_by_id(&session, id).unwrap().unwrap().likes, 0);
        assert_eq!(increment_likes(&session, id).unwrap(), Some(1));
    }

    #[test]
    fn test_malformed_palette_reads_as_empty() {
        let (_temp_dir, db) = temp_database();
        let session = db.session().unwrap();
        let id = insert(&session, &record("a.png", "A")).unwrap();
        session
            .execute(
                "UPDATE images SET palette = '[\"#fff' WHERE id = ?1",
                params![id],
            )
            .unwrap();

        let image = find_by_id(&session, id).unwrap().unwrap();
        assert!(image.palette.is_empty());
    }

    #[test]
    fn test_colliding_slugs_resolve_to_oldest() {
        let (_temp_dir, db) = temp_database();
        let session = db.session().unwrap();
        let first = insert(&session, &record("one.png", "Same Title")).unwrap();
        insert(&session, &record("two.png", "Same Title")).unwrap();

        let found = find_by_slug(&session, "same-title").unwrap().unwrap();
        assert_eq!(found.id, first);
        assert_eq!(list_all(&session).unwrap().len(), 2);
    }
}
