//! Shared fixtures for integration tests.
//!
//! Test "images" are not real pictures: their bytes encode the features the
//! test extractor should return, so each test controls exactly what gets
//! indexed.
//!
//! Layout: `[n_colors][r g b]*n [text_len][text] [f32 LE]*`, where `text`
//! is `description|tag,tag`. An empty byte string fails extraction.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use gallerydb::{
    Caller, Config, ExtractedFeatures, FeatureExtractor, GalleryDB, GalleryDBError, ImageId,
    IngestionConfig, NewImage, Result, Rgb,
};

pub fn encode(embedding: &[f32], colors: &[Rgb], text: &str) -> Vec<u8> {
    let mut bytes = vec![colors.len() as u8];
    for c in colors {
        bytes.extend_from_slice(&[c.r, c.g, c.b]);
    }
    bytes.push(text.len() as u8);
    bytes.extend_from_slice(text.as_bytes());
    for v in embedding {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn decode(bytes: &[u8]) -> Result<ExtractedFeatures> {
    if bytes.is_empty() {
        return Err(GalleryDBError::extraction("unreadable image"));
    }
    let n = bytes[0] as usize;
    let colors = bytes[1..1 + 3 * n]
        .chunks_exact(3)
        .map(|c| Rgb::new(c[0], c[1], c[2]))
        .collect();
    let text_at = 1 + 3 * n;
    let text_len = bytes[text_at] as usize;
    let text = std::str::from_utf8(&bytes[text_at + 1..text_at + 1 + text_len]).unwrap();
    let (description, tags) = text.split_once('|').unwrap_or((text, ""));
    let embedding = bytes[text_at + 1 + text_len..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(ExtractedFeatures {
        embedding,
        tags: tags.split(',').map(str::to_string).collect(),
        description: description.to_string(),
        colors,
    })
}

pub fn extractor() -> Arc<dyn FeatureExtractor> {
    Arc::new(decode)
}

pub fn inline_config(dimension: usize) -> Config {
    Config {
        dimension,
        ingestion: IngestionConfig::inline(),
        ..Default::default()
    }
}

pub fn open_inline(path: &Path, dimension: usize) -> GalleryDB {
    GalleryDB::open_with_extractor(path, inline_config(dimension), extractor()).unwrap()
}

pub fn caller() -> Caller {
    Caller::new("alice")
}

/// Uploads one image and returns its id.
pub fn upload(db: &GalleryDB, filename: &str, bytes: Vec<u8>) -> ImageId {
    db.upload(Some(&caller()), vec![NewImage::new(filename, bytes)])
        .unwrap()[0]
        .id
}

/// Uploads an image with the given embedding and colors.
pub fn upload_features(db: &GalleryDB, filename: &str, embedding: &[f32], colors: &[Rgb]) -> ImageId {
    upload(db, filename, encode(embedding, colors, ""))
}

/// Hex string to color, for readable test setup.
pub fn rgb(hex: &str) -> Rgb {
    hex.parse().unwrap()
}
