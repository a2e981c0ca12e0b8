// Ingestion - scans the images directory and upserts image/tag records
mod error;
pub mod metadata;
pub mod palette;

pub use error::IngestError;
pub use metadata::{MetadataEntry, MetadataFile, ResolvedMetadata, load_metadata_file};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::slug::{image_slug, slugify, title_from_filename};
use crate::store::{Database, ImageRecord, images, tags};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Where an ingestion run reads from.
#[derive(Debug, Clone)]
pub struct IngestSource {
    pub images_directory: PathBuf,
    pub metadata_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl IngestReport {
    pub fn summary(&self) -> String {
        let mut summary = format!("OK — added {}, updated {}", self.added, self.updated);
        if self.skipped > 0 {
            summary.push_str(&format!(", skipped {}", self.skipped));
        }
        summary
    }
}

pub fn is_image_file(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// A decoded file ready to be written.
struct PreparedImage {
    record: ImageRecord,
    tags: Vec<String>,
}

/// Runs a full ingestion pass. Files are decoded first; all database writes
/// then happen in a single transaction.
pub fn run_ingest(db: &Database, source: &IngestSource) -> Result<IngestReport, IngestError> {
    let start_time = Instant::now();
    let images_dir = &source.images_directory;

    if !images_dir.is_dir() {
        return Err(IngestError::MissingDirectory(images_dir.clone()));
    }

    let metadata = load_metadata_file(source.metadata_file.as_deref())?;

    info!("Scanning images directory {:?}", images_dir);

    let mut report = IngestReport::default();
    let mut prepared = Vec::new();

    for entry in WalkDir::new(images_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(file_name) = entry.file_name().to_str() else {
            warn!("Skipping file with non UTF-8 name: {:?}", entry.path());
            continue;
        };

        if !is_image_file(file_name) {
            continue;
        }

        match prepare_image(entry.path(), file_name, metadata.get(file_name)) {
            Some(image) => prepared.push(image),
            None => report.skipped += 1,
        }
    }

    let mut session = db.session()?;
    session.transaction(|conn| {
        for image in &prepared {
            if upsert_image(conn, image)? {
                report.added += 1;
            } else {
                report.updated += 1;
            }
        }
        Ok::<_, IngestError>(())
    })?;

    info!(
        "Ingest completed in {:.2}s: {} added, {} updated, {} skipped",
        start_time.elapsed().as_secs_f64(),
        report.added,
        report.updated,
        report.skipped
    );

    Ok(report)
}

/// Runs [`run_ingest`] on the blocking thread pool.
pub async fn run_ingest_blocking(
    db: Database,
    source: IngestSource,
) -> Result<IngestReport, IngestError> {
    tokio::task::spawn_blocking(move || run_ingest(&db, &source))
        .await
        .map_err(|e| IngestError::Join(e.to_string()))?
}

fn prepare_image(
    path: &Path,
    file_name: &str,
    entry: Option<&MetadataEntry>,
) -> Option<PreparedImage> {
    let (width, height) = match image::image_dimensions(path) {
        Ok(dimensions) => dimensions,
        Err(e) => {
            warn!("Skipping unreadable image {}: {}", file_name, e);
            return None;
        }
    };

    let palette = palette::palette_or_empty(path);
    let resolved = ResolvedMetadata::resolve(file_name, entry);

    debug!(
        "Prepared {} ({}x{}, {} colors, {} tags)",
        file_name,
        width,
        height,
        palette.colors().len(),
        resolved.tags.len()
    );

    // A title made only of symbols still needs a reachable recipe URL.
    let mut slug = image_slug(&resolved.title);
    if slug.is_empty() {
        slug = image_slug(&title_from_filename(file_name));
    }

    Some(PreparedImage {
        record: ImageRecord {
            slug,
            title: resolved.title,
            filename: file_name.to_string(),
            prompt: resolved.prompt,
            model: resolved.model,
            seed: resolved.seed,
            preset: resolved.preset,
            width,
            height,
            palette,
        },
        tags: resolved.tags,
    })
}

/// Inserts or updates one image by file name and rebuilds its tags.
/// Returns true when a new row was inserted.
fn upsert_image(conn: &Connection, image: &PreparedImage) -> Result<bool, IngestError> {
    let (image_id, inserted) = match images::find_by_filename(conn, &image.record.filename)? {
        Some(existing) => {
            images::update(conn, existing.id, &image.record)?;
            tags::clear_for_image(conn, existing.id)?;
            debug!("Updated: {}", image.record.filename);
            (existing.id, false)
        }
        None => {
            let id = images::insert(conn, &image.record)?;
            debug!("Inserted: {}", image.record.filename);
            (id, true)
        }
    };

    for name in &image.tags {
        let tag_slug = slugify(name);
        if tag_slug.is_empty() {
            debug!("Ignoring tag {:?} with empty slug", name);
            continue;
        }
        let tag = tags::find_or_create(conn, name, &tag_slug)?;
        tags::attach(conn, image_id, tag.id)?;
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_database;
    use crate::store::{Palette, Session};
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 3]) {
        let img = ImageBuffer::from_pixel(width, height, Rgb(color));
        img.save(dir.join(name)).unwrap();
    }

    fn setup_source(temp_dir: &TempDir, metadata: Option<&str>) -> IngestSource {
        let images_dir = temp_dir.path().join("images");
        std::fs::create_dir_all(&images_dir).unwrap();

        let metadata_file = temp_dir.path().join("meta.json");
        if let Some(content) = metadata {
            std::fs::write(&metadata_file, content).unwrap();
        }

        IngestSource {
            images_directory: images_dir,
            metadata_file: Some(metadata_file),
        }
    }

    fn snapshot(session: &Session) -> Vec<(crate::store::Image, Vec<String>)> {
        let all = images::list_all(session).unwrap();
        let ids: Vec<_> = all.iter().map(|i| i.id).collect();
        let lookup = tags::tags_for_images(session, &ids).unwrap();
        all.into_iter()
            .map(|image| {
                let slugs = lookup[&image.id].iter().map(|t| t.slug.clone()).collect();
                (image, slugs)
            })
            .collect()
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file("a.png"));
        assert!(is_image_file("a.JPG"));
        assert!(is_image_file("a.jpeg"));
        assert!(is_image_file("a.WebP"));
        assert!(!is_image_file("a.gif"));
        assert!(!is_image_file("meta.json"));
        assert!(!is_image_file("png"));
    }

    #[test]
    fn test_ingest_inserts_with_fallbacks() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(&temp_dir, None);
        write_image(&source.images_directory, "misty_forest.png", 30, 20, [10, 80, 30]);

        let (_db_dir, db) = temp_database();
        let report = run_ingest(&db, &source).unwrap();
        assert_eq!(report, IngestReport { added: 1, updated: 0, skipped: 0 });

        let session = db.session().unwrap();
        let image = images::find_by_filename(&session, "misty_forest.png")
            .unwrap()
            .unwrap();
        assert_eq!(image.title, "Misty Forest");
        assert_eq!(image.slug, "misty-forest");
        assert_eq!((image.width, image.height), (30, 20));
        assert_eq!(image.palette, Palette(vec!["#0a501e".to_string()]));
        assert_eq!(image.likes, 0);
        assert_eq!(image.seed, "");
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(
            &temp_dir,
            Some(
                r#"{
                    "a.png": {"title": "Alpha", "prompt": "first", "seed": 7, "tags": ["Food", "Night"]},
                    "b.jpg": {"title": "Beta", "tags": ["food"]}
                }"#,
            ),
        );
        write_image(&source.images_directory, "a.png", 8, 8, [200, 0, 0]);
        write_image(&source.images_directory, "b.jpg", 8, 8, [0, 0, 200]);

        let (_db_dir, db) = temp_database();
        let first = run_ingest(&db, &source).unwrap();
        assert_eq!(first.added, 2);

        let before = snapshot(&db.session().unwrap());
        let counts_before = db.session().unwrap().counts().unwrap();

        let second = run_ingest(&db, &source).unwrap();
        assert_eq!(second, IngestReport { added: 0, updated: 2, skipped: 0 });

        let after = snapshot(&db.session().unwrap());
        let counts_after = db.session().unwrap().counts().unwrap();

        assert_eq!(before, after);
        assert_eq!(counts_before, counts_after);
        assert_eq!(counts_after.images, 2);
        assert_eq!(counts_after.tags, 2);
    }

    #[test]
    fn test_duplicate_tag_spellings_collapse() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(
            &temp_dir,
            Some(r#"{"a.png": {"tags": ["Food", "food"]}}"#),
        );
        write_image(&source.images_directory, "a.png", 4, 4, [1, 2, 3]);

        let (_db_dir, db) = temp_database();
        run_ingest(&db, &source).unwrap();

        let session = db.session().unwrap();
        let all_tags = tags::list_all(&session).unwrap();
        assert_eq!(all_tags.len(), 1);
        assert_eq!(all_tags[0].slug, "food");
        assert_eq!(all_tags[0].name, "Food");
        assert_eq!(session.counts().unwrap().links, 1);
    }

    #[test]
    fn test_first_seen_tag_name_wins_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(&temp_dir, Some(r#"{"a.png": {"tags": ["Street Food"]}}"#));
        write_image(&source.images_directory, "a.png", 4, 4, [1, 2, 3]);

        let (_db_dir, db) = temp_database();
        run_ingest(&db, &source).unwrap();

        std::fs::write(
            source.metadata_file.as_ref().unwrap(),
            r#"{"a.png": {"tags": ["street-food"]}}"#,
        )
        .unwrap();
        run_ingest(&db, &source).unwrap();

        let session = db.session().unwrap();
        let tag = tags::find_by_slug(&session, "street-food").unwrap().unwrap();
        assert_eq!(tag.name, "Street Food");
        assert_eq!(tags::list_all(&session).unwrap().len(), 1);
    }

    #[test]
    fn test_update_rebuilds_tags_and_keeps_likes() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(&temp_dir, Some(r#"{"a.png": {"title": "Old", "tags": ["one", "two"]}}"#));
        write_image(&source.images_directory, "a.png", 4, 4, [1, 2, 3]);

        let (_db_dir, db) = temp_database();
        run_ingest(&db, &source).unwrap();
        {
            let session = db.session().unwrap();
            let image = images::find_by_filename(&session, "a.png").unwrap().unwrap();
            images::increment_likes(&session, image.id).unwrap();
        }

        std::fs::write(
            source.metadata_file.as_ref().unwrap(),
            r#"{"a.png": {"title": "New", "tags": ["two", "three"]}}"#,
        )
        .unwrap();
        run_ingest(&db, &source).unwrap();

        let session = db.session().unwrap();
        let image = images::find_by_filename(&session, "a.png").unwrap().unwrap();
        assert_eq!(image.title, "New");
        assert_eq!(image.slug, "new");
        assert_eq!(image.likes, 1);

        let lookup = tags::tags_for_images(&session, &[image.id]).unwrap();
        let slugs: Vec<_> = lookup[&image.id].iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, ["three", "two"]);
        // Tags are never deleted, only detached.
        assert_eq!(tags::list_all(&session).unwrap().len(), 3);
    }

    #[test]
    fn test_unreadable_and_unrelated_files() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(&temp_dir, None);
        write_image(&source.images_directory, "good.png", 4, 4, [1, 2, 3]);
        std::fs::write(source.images_directory.join("broken.jpg"), b"garbage").unwrap();
        std::fs::write(source.images_directory.join("notes.txt"), b"hello").unwrap();
        std::fs::create_dir(source.images_directory.join("nested.png")).unwrap();

        let (_db_dir, db) = temp_database();
        let report = run_ingest(&db, &source).unwrap();
        assert_eq!(report, IngestReport { added: 1, updated: 0, skipped: 1 });

        let session = db.session().unwrap();
        assert!(images::find_by_filename(&session, "broken.jpg").unwrap().is_none());
        assert_eq!(session.counts().unwrap().images, 1);
    }

    #[test]
    fn test_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let source = IngestSource {
            images_directory: temp_dir.path().join("nope"),
            metadata_file: None,
        };
        let (_db_dir, db) = temp_database();
        assert!(matches!(
            run_ingest(&db, &source),
            Err(IngestError::MissingDirectory(_))
        ));
    }

    #[test]
    fn test_malformed_metadata_aborts_before_writes() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(&temp_dir, Some("[1, 2"));
        write_image(&source.images_directory, "a.png", 4, 4, [1, 2, 3]);

        let (_db_dir, db) = temp_database();
        assert!(run_ingest(&db, &source).is_err());
        assert_eq!(db.session().unwrap().counts().unwrap().images, 0);
    }

    #[test]
    fn test_non_latin_titles_and_tags() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(
            &temp_dir,
            Some(
                r#"{
                    "tokyo.png": {"title": "東京の夜", "tags": ["日本", "夜景", "Café"]},
                    "kyoto.png": {"title": "京都", "tags": ["Cafe"]}
                }"#,
            ),
        );
        write_image(&source.images_directory, "tokyo.png", 4, 4, [1, 2, 3]);
        write_image(&source.images_directory, "kyoto.png", 4, 4, [3, 2, 1]);

        let (_db_dir, db) = temp_database();
        run_ingest(&db, &source).unwrap();

        let session = db.session().unwrap();
        let tokyo = images::find_by_filename(&session, "tokyo.png").unwrap().unwrap();
        let kyoto = images::find_by_filename(&session, "kyoto.png").unwrap().unwrap();
        assert!(!tokyo.slug.is_empty());
        assert!(!kyoto.slug.is_empty());

        let lookup = tags::tags_for_images(&session, &[tokyo.id, kyoto.id]).unwrap();
        let tokyo_slugs: Vec<_> = lookup[&tokyo.id].iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(tokyo_slugs.len(), 3);
        assert!(tokyo_slugs.contains(&"ri-ben"));
        assert!(tokyo_slugs.contains(&"cafe"));

        // Both spellings share one tag, named by the first seen.
        let cafe = tags::find_by_slug(&session, "cafe").unwrap().unwrap();
        assert_eq!(lookup[&kyoto.id], vec![cafe.clone()]);
        assert_eq!(tags::image_ids_for_tag(&session, "cafe").unwrap().len(), 2);
        assert_eq!(tags::list_all(&session).unwrap().len(), 3);
    }

    #[test]
    fn test_symbol_title_falls_back_to_filename_slug() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(&temp_dir, Some(r#"{"sunset_02.png": {"title": "!!!"}}"#));
        write_image(&source.images_directory, "sunset_02.png", 4, 4, [1, 2, 3]);

        let (_db_dir, db) = temp_database();
        run_ingest(&db, &source).unwrap();

        let session = db.session().unwrap();
        let image = images::find_by_filename(&session, "sunset_02.png").unwrap().unwrap();
        assert_eq!(image.title, "!!!");
        assert_eq!(image.slug, "sunset-02");
    }

    #[test]
    fn test_bad_metadata_entry_does_not_abort_run() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(
            &temp_dir,
            Some(
                r#"{
                    "bad.png": {"title": 2024, "tags": "food", "prompt": {"nested": true}},
                    "good.png": {"title": "Good", "tags": ["Nature"]}
                }"#,
            ),
        );
        write_image(&source.images_directory, "bad.png", 4, 4, [1, 2, 3]);
        write_image(&source.images_directory, "good.png", 4, 4, [3, 2, 1]);

        let (_db_dir, db) = temp_database();
        let report = run_ingest(&db, &source).unwrap();
        assert_eq!(report.added, 2);

        let session = db.session().unwrap();
        let bad = images::find_by_filename(&session, "bad.png").unwrap().unwrap();
        assert_eq!(bad.title, "2024");
        assert_eq!(bad.prompt, "");
        let good = images::find_by_filename(&session, "good.png").unwrap().unwrap();
        assert_eq!(good.title, "Good");

        let lookup = tags::tags_for_images(&session, &[bad.id, good.id]).unwrap();
        assert_eq!(lookup[&bad.id][0].slug, "food");
        assert_eq!(lookup[&good.id][0].slug, "nature");
    }

    #[test]
    fn test_summary() {
        let report = IngestReport { added: 2, updated: 3, skipped: 0 };
        assert_eq!(report.summary(), "OK — added 2, updated 3");
        let report = IngestReport { added: 0, updated: 0, skipped: 1 };
        assert_eq!(report.summary(), "OK — added 0, updated 0, skipped 1");
    }

    #[tokio::test]
    async fn test_run_ingest_blocking() {
        let temp_dir = TempDir::new().unwrap();
        let source = setup_source(&temp_dir, None);
        write_image(&source.images_directory, "a.png", 4, 4, [1, 2, 3]);

        let (_db_dir, db) = temp_database();
        let report = run_ingest_blocking(db.clone(), source).await.unwrap();
        assert_eq!(report.added, 1);
    }
}
