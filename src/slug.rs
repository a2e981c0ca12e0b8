/// Maximum length of an image slug as stored in the database.
pub const MAX_IMAGE_SLUG_LEN: usize = 180;

/// Turns a display string into a lowercase, URL-safe slug.
///
/// Text is transliterated to ASCII first ("Café" -> "cafe", "日本" ->
/// "ri-ben"). Quotes are dropped so that contractions stay joined
/// ("Don't" -> "dont"), every other run of non-alphanumeric characters
/// collapses into a single hyphen, and hyphens never lead or trail.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode::deunicode_with_tofu(text, "");
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_hyphen = false;

    for ch in ascii.chars() {
        if matches!(ch, '\'' | '"' | '\u{2019}' | '\u{2018}') {
            continue;
        }

        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Slug for an image title, truncated to the column width.
pub fn image_slug(title: &str) -> String {
    let mut slug = slugify(title);
    if slug.len() > MAX_IMAGE_SLUG_LEN {
        slug.truncate(MAX_IMAGE_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Fallback title for an image without explicit metadata: the file stem
/// with underscores as spaces, title-cased.
pub fn title_from_filename(file_name: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    title_case(&stem.replace('_', " "))
}

// A letter starts a new word whenever the previous character was not a letter.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_is_letter = false;

    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }

    out
}
