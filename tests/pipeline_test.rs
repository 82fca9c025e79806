//! End-to-end tests of the enhancement pipeline against deterministic
//! networks.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Harness, Nearest, encoded, offline_registry};
use image::{ImageFormat, Rgb, Rgb32FImage};
use reviver::error::ErrorKind;
use reviver::identity::{self, translate};
use reviver::inference::tile::{TileConfig, upsample_tiled};
use reviver::inference::BackgroundChoice;
use reviver::pipeline::EnhancementRequest;
use reviver::registry::{ModelVersion, UpsampleScale, WeightLocation, resolve, weight_path};

fn jpeg_request(w: u32, h: u32, user: &str) -> EnhancementRequest {
    EnhancementRequest::new(
        encoded(w, h, ImageFormat::Jpeg),
        Some("image/jpeg".to_string()),
        user,
    )
}

#[tokio::test]
async fn test_jpeg_upload_is_enhanced_and_stored() {
    let harness = Harness::new();
    let request = jpeg_request(512, 512, "firebase-uid-123")
        .with_version("1.4")
        .with_upscale(4)
        .with_background(BackgroundChoice::None, UpsampleScale::X4);

    let result = harness.enhancer.process(request).await.unwrap();

    let stored = harness.output.path().join(&result.locator.key);
    assert!(stored.is_file());
    assert!(result.locator.url.starts_with("file://"));
    let output = image::open(&stored).unwrap();
    assert!(output.width() > 512 && output.height() > 512);
    assert_eq!((output.width(), output.height()), (2048, 2048));
    assert_eq!(harness.sink.stores(), 1);
}

#[tokio::test]
async fn test_non_image_payload_does_no_model_work() {
    let harness = Harness::new();
    let request = EnhancementRequest::new(
        b"just some text".to_vec(),
        Some("text/plain".to_string()),
        "user",
    );

    let err = harness.enhancer.process(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(harness.loader.loads(), 0);
    assert_eq!(harness.sink.stores(), 0);
}

#[tokio::test]
async fn test_text_bytes_labelled_as_image_are_rejected() {
    let harness = Harness::new();
    let request = EnhancementRequest::new(
        b"just some text".to_vec(),
        Some("image/png".to_string()),
        "user",
    );

    let err = harness.enhancer.process(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(harness.loader.loads(), 0);
    assert_eq!(harness.sink.stores(), 0);
}

#[tokio::test]
async fn test_unknown_version_constructs_no_engine() {
    let harness = Harness::new();
    let request = jpeg_request(16, 16, "user").with_version("9.9");

    let err = harness.enhancer.process(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
    assert_eq!(harness.engines.builds(), 0);
    assert_eq!(harness.loader.loads(), 0);
    assert_eq!(harness.sink.stores(), 0);
}

#[tokio::test]
async fn test_canonical_token_is_stored_unchanged() {
    let harness = Harness::new();
    let token = "3F2504E0-4F89-11D3-9A0C-0305E82C3301";

    let result = harness
        .enhancer
        .process(jpeg_request(16, 16, token).with_upscale(1))
        .await
        .unwrap();

    assert_eq!(result.owner.to_string(), token.to_lowercase());
    assert!(result.locator.key.starts_with(&format!("{}/", token.to_lowercase())));
}

#[tokio::test]
async fn test_distinct_opaque_tokens_get_distinct_prefixes() {
    let harness = Harness::new();
    let a = harness
        .enhancer
        .process(jpeg_request(16, 16, "alice").with_upscale(1))
        .await
        .unwrap();
    let b = harness
        .enhancer
        .process(jpeg_request(16, 16, "bob").with_upscale(1))
        .await
        .unwrap();

    assert_ne!(a.owner, b.owner);
    assert_eq!(a.owner, translate("alice"));
    assert!(identity::is_canonical(&a.owner.to_string()));
}

#[tokio::test]
async fn test_repeated_configuration_reuses_engine() {
    let harness = Harness::new();
    for user in ["a", "b", "c"] {
        harness
            .enhancer
            .process(jpeg_request(16, 16, user).with_upscale(2))
            .await
            .unwrap();
    }
    assert_eq!(harness.engines.builds(), 1);
    // Restorer and detector, loaded once.
    assert_eq!(harness.loader.loads(), 2);
    assert_eq!(harness.sink.stores(), 3);
}

#[tokio::test]
async fn test_background_upsampler_sets_output_size() {
    let harness = Harness::new();
    let request = jpeg_request(20, 12, "user")
        .with_upscale(2)
        .with_background(BackgroundChoice::RealEsrgan, UpsampleScale::X4);

    let result = harness.enhancer.process(request).await.unwrap();
    let output = image::load_from_memory(&result.processed_image).unwrap();
    assert_eq!((output.width(), output.height()), (40, 24));
    // Restorer, detector and the x4 upsampler.
    assert_eq!(harness.loader.loads(), 3);
}

#[test]
fn test_every_version_has_weights_and_url() {
    let registry = offline_registry();
    for version in ModelVersion::ALL {
        let spec = registry.lookup(version.as_str()).unwrap();
        assert!(!spec.weight_file_name.is_empty());
        assert!(spec.remote_url.starts_with("http://127.0.0.1:9/"));
        assert!(spec.remote_url.ends_with(spec.weight_file_name));
    }
    assert_eq!(
        registry.lookup("9.9").unwrap_err().kind(),
        ErrorKind::UnsupportedVersion
    );
}

#[test]
fn test_resolution_follows_file_presence() {
    let dir = tempfile::tempdir().unwrap();
    let spec = offline_registry().spec(ModelVersion::V1_2);
    let path = weight_path(&spec, dir.path());

    assert_eq!(resolve(&spec, dir.path()), WeightLocation::Remote(spec.remote_url.clone()));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"w").unwrap();
    assert_eq!(resolve(&spec, dir.path()), WeightLocation::Local(path.clone()));
    std::fs::remove_file(&path).unwrap();
    assert!(!resolve(&spec, dir.path()).is_local());
}

#[test]
fn test_translation_is_deterministic_and_idempotent() {
    let first = translate("opaque-token");
    assert_eq!(first, translate("opaque-token"));
    let canonical = first.to_string();
    assert_eq!(translate(&canonical), first);
    assert_eq!(translate(&translate(&canonical).to_string()), first);
}

#[test]
fn test_tiled_upsampling_matches_single_pass() {
    let image = Rgb32FImage::from_fn(37, 29, |x, y| {
        Rgb([x as f32 / 37.0, y as f32 / 29.0, ((x * y) % 7) as f32 / 7.0])
    });
    let tiles = TileConfig {
        tile_size: 10,
        tile_padding: 3,
        pre_pad: 0,
    };

    let tiled = upsample_tiled(&mut Nearest(4), &image, 4, &tiles).unwrap();
    let whole = upsample_tiled(&mut Nearest(4), &image, 4, &TileConfig::UNTILED).unwrap();
    assert_eq!(tiled.dimensions(), (148, 116));
    assert_eq!(tiled, whole);
}
