#![no_main]

use std::sync::{Arc, OnceLock};

use gallerydb::{Caller, Config, ExtractedFeatures, GalleryDB, IngestionConfig, NewImage, Rgb};
use libfuzzer_sys::fuzz_target;

struct Fixture {
    _dir: tempfile::TempDir,
    db: GalleryDB,
}

fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            dimension: 2,
            ingestion: IngestionConfig::inline(),
            ..Default::default()
        };
        let extractor = |bytes: &[u8]| -> gallerydb::Result<ExtractedFeatures> {
            Ok(ExtractedFeatures {
                embedding: vec![1.0, bytes[0] as f32],
                colors: vec![Rgb::new(bytes[0], bytes[0].wrapping_mul(7), 255 - bytes[0])],
                ..Default::default()
            })
        };
        let db =
            GalleryDB::open_with_extractor(dir.path().join("fuzz.db"), config, Arc::new(extractor))
                .unwrap();
        let images = (0..=255u8)
            .step_by(5)
            .map(|b| NewImage::new(format!("{}.jpg", b), vec![b]))
            .collect();
        db.upload(Some(&Caller::new("fuzz")), images).unwrap();
        Fixture { _dir: dir, db }
    })
}

fuzz_target!(|data: &[u8]| {
    let Some((&limit, rest)) = data.split_first() else {
        return;
    };
    let Ok(color) = std::str::from_utf8(rest) else {
        return;
    };

    match fixture().db.filter_by_color(Some(&Caller::new("fuzz")), color, limit as usize) {
        Ok(results) => {
            assert!(results.len() <= limit as usize);
            assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
        Err(e) => assert!(e.is_invalid_color()),
    }
});
