//! End-to-end renders through the dispatcher and a real worker.

mod common;

use std::io::Cursor;

use axum::Router;
use axum::http::header;
use axum::routing::get;
use cardkit_client::{DispatchError, Dispatcher};
use cardkit_core::{ContentType, Scaling};
use common::test_settings;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 120, 220]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

async fn banner_server() -> String {
    let banner = jpeg(640, 320);
    let router = Router::new().route(
        "/banner.jpg",
        get(move || {
            let banner = banner.clone();
            async move { ([(header::CONTENT_TYPE, "image/jpeg")], banner) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn decode(bytes: &[u8]) -> image::RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

#[tokio::test]
async fn test_balance_at_double_scale() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(test_settings(dir.path())).unwrap();

    let result = dispatcher
        .render(
            "Balance",
            json!({"username": "ada", "balance": 42.5, "bank": 10}),
            json!({}),
            Scaling { image: 2.0, emoji: 1.0 },
        )
        .await
        .unwrap();
    assert_eq!(result.content_type, ContentType::Png);
    assert_eq!(decode(&result.data).dimensions(), (960, 440));
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_repeated_renders_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::new(test_settings(dir.path())).unwrap();
    let props = json!({"from": "ada", "to": "bob", "amount": "12.50", "currency": "coins"});

    let first = dispatcher
        .render("Transfer", props.clone(), json!({}), Scaling::default())
        .await
        .unwrap();
    let second = dispatcher
        .render("Transfer", props, json!({}), Scaling::default())
        .await
        .unwrap();
    assert_eq!(first.data, second.data);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_static_banner_and_missing_banner() {
    let dir = tempfile::tempdir().unwrap();
    let base = banner_server().await;
    let dispatcher = Dispatcher::new(test_settings(dir.path())).unwrap();

    let with_banner = dispatcher
        .render(
            "Transfer",
            json!({"from": "ada", "to": "bob", "amount": 5, "banner_url": format!("{base}/banner.jpg")}),
            json!({}),
            Scaling::default(),
        )
        .await
        .unwrap();
    assert_eq!(with_banner.content_type, ContentType::Png);
    let img = decode(&with_banner.data);
    assert_eq!(img.dimensions(), (520, 240));
    // The rounded card leaves its corner to the banner.
    assert_eq!(img.get_pixel(0, 0).0[3], 255);

    let without = dispatcher
        .render(
            "Transfer",
            json!({"from": "ada", "to": "bob", "amount": 5, "banner_url": format!("{base}/gone.jpg")}),
            json!({}),
            Scaling::default(),
        )
        .await
        .unwrap();
    assert_eq!(without.content_type, ContentType::Png);
    assert_eq!(decode(&without.data).get_pixel(0, 0).0[3], 0);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_validation_errors_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    // A retry would take at least this long.
    settings.dispatcher.initial_delay_ms = 5_000;
    let dispatcher = Dispatcher::new(settings).unwrap();

    let started = std::time::Instant::now();
    let err = dispatcher
        .render("Nope", json!({}), json!({}), Scaling::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(started.elapsed() < std::time::Duration::from_secs(5));

    // The worker survives a validation error and serves the next request.
    dispatcher
        .render("Balance", json!({"username": "ada", "balance": 1}), json!({}), Scaling::default())
        .await
        .unwrap();
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_fatal_startup_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.assets.require_fonts = true;
    settings.dispatcher.initial_delay_ms = 5_000;
    let dispatcher = Dispatcher::new(settings).unwrap();

    let started = std::time::Instant::now();
    let err = dispatcher
        .render("Balance", json!({"balance": 1}), json!({}), Scaling::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::StartupFailed(_)));
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}
