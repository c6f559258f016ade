//! Archive export integration tests

mod common;

use common::*;
use std::io::{Cursor, Read};
use unity_asset_export::{ArchiveCompression, ArchiveOptions, AssetManager, GroupMethod};
use zip::ZipArchive;

fn read_entry(data: &[u8], name: &str) -> anyhow::Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

#[tokio::test]
async fn test_archive_entries_follow_grouping() -> anyhow::Result<()> {
    let (manager, _) = manager(ManifestDecoder::new());
    let ids = load(
        &manager,
        &[
            "1|TextAsset|readme|assets/docs|hello",
            "2|TextAsset|readme|assets/docs|again",
            "3|Texture2D|hero||2x2",
            "4|Shader|fx||",
        ],
    )
    .await;
    let (on_progress, progress) = export_recorder();

    let export = manager
        .export_assets_to_archive(&ids, GroupMethod::ContainerPath, Some(on_progress))
        .await?
        .unwrap();

    assert_eq!(
        export.entries,
        [
            "assets/docs/readme.txt",
            "assets/docs/readme (1).txt",
            "hero.png"
        ]
    );
    assert_eq!(export.stats.success, 3);
    assert_eq!(read_entry(&export.data, "assets/docs/readme.txt")?, b"hello");
    assert_eq!(read_entry(&export.data, "assets/docs/readme (1).txt")?, b"again");
    let hero = image::load_from_memory(&read_entry(&export.data, "hero.png")?)?;
    assert_eq!((hero.width(), hero.height()), (2, 2));

    let progress = progress.lock().unwrap();
    let fractions: Vec<f32> = progress.iter().map(|p| p.fraction).collect();
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "{:?}", fractions);
    assert_eq!(fractions.last(), Some(&1.0));
    Ok(())
}

#[tokio::test]
async fn test_archive_counts_failures() -> anyhow::Result<()> {
    let manager = AssetManager::builder(ManifestDecoder::new())
        .config(test_config().with_archive(ArchiveOptions {
            compression: ArchiveCompression::Stored,
        }))
        .build();
    let ids = load(&manager, &["1|Texture2D|hero||broken", "2|TextAsset|ok||x"]).await;

    let export = manager
        .export_assets_to_archive(&ids, GroupMethod::TypeName, None)
        .await?
        .unwrap();

    assert_eq!(export.entries, ["TextAsset/ok.txt"]);
    assert_eq!((export.stats.success, export.stats.error), (1, 1));
    assert_eq!(ZipArchive::new(Cursor::new(&export.data[..]))?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_escaping_container_paths_are_not_archived() -> anyhow::Result<()> {
    let (manager, _) = manager(ManifestDecoder::new());
    let ids = load(
        &manager,
        &["1|TextAsset|evil|../outside|x", "2|TextAsset|ok|docs|y"],
    )
    .await;

    let export = manager
        .export_assets_to_archive(&ids, GroupMethod::ContainerPath, None)
        .await?
        .unwrap();

    assert_eq!(export.entries, ["docs/ok.txt"]);
    assert_eq!((export.stats.success, export.stats.error), (1, 1));
    Ok(())
}

#[tokio::test]
async fn test_empty_selection_gives_empty_archive()-> anyhow::Result<()> {
    let (manager, _) = manager(ManifestDecoder::new());

    let export = manager
        .export_assets_to_archive(&[], GroupMethod::Flat, None)
        .await?
        .unwrap();

    assert!(export.entries.is_empty());
    assert_eq!(export.stats.total(), 0);
    assert_eq!(ZipArchive::new(Cursor::new(&export.data[..]))?.len(), 0);
    Ok(())
}
