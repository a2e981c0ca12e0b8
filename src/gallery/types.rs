use serde::Serialize;
use std::collections::HashMap;

use crate::store::{Image, ImageId, Tag};

/// Template-facing view of one image with its tags resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
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
    pub likes: i64,
    pub palette: Vec<String>,
    pub tags: Vec<Tag>,
    pub image_url: String,
    pub recipe_url: String,
}

impl ImageView {
    pub fn new(image: Image, tags: Vec<Tag>, image_url_prefix: &str) -> Self {
        let image_url = format!(
            "{}/{}",
            image_url_prefix.trim_end_matches('/'),
            urlencoding::encode(&image.filename)
        );
        let recipe_url = format!("/recipe/{}", image.slug);

        Self {
            id: image.id,
            slug: image.slug,
            title: image.title,
            filename: image.filename,
            prompt: image.prompt,
            model: image.model,
            seed: image.seed,
            preset: image.preset,
            width: image.width,
            height: image.height,
            likes: image.likes,
            palette: image.palette.0,
            tags,
            image_url,
            recipe_url,
        }
    }

    /// Joins images with an image -> tags lookup, keeping image order.
    pub fn from_images(
        images: Vec<Image>,
        mut tags: HashMap<ImageId, Vec<Tag>>,
        image_url_prefix: &str,
    ) -> Vec<Self> {
        images
            .into_iter()
            .map(|image| {
                let image_tags = tags.remove(&image.id).unwrap_or_default();
                Self::new(image, image_tags, image_url_prefix)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LikeResponse {
    pub likes: i64,
}
