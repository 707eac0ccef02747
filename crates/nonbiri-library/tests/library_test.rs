//! Library Service Tests
//!
//! Fetch-through caching and promotion of transient entities into the
//! library store, against a registry backed by the in-process loader.

use std::sync::{Arc, Barrier};
use std::thread;

use nonbiri_core::extension::{Capabilities, ErrorKind, ExtensionRegistry};
use nonbiri_core::models::{cache_key, ChapterEntry, Identity, MangaEntry, ReadingStatus};
use nonbiri_core::{CacheConfig, Manga};
use nonbiri_library::Library;
use nonbiri_storage::LibraryStore;
use nonbiri_testing::{FetchCounts, MockExtension, MockModuleLoader, MockTransport, ModuleSpec};
use tempfile::TempDir;

const SOURCE: &str = "mangadex";
const PATH: &str = "/title/yotsuba";

struct Fixture {
    _dir: TempDir,
    counts: Arc<FetchCounts>,
    library: Library,
}

impl Fixture {
    fn new() -> Self {
        Self::build(None)
    }

    /// The first detail fetch blocks on `gate` until released.
    fn gated(gate: Arc<Barrier>) -> Self {
        Self::build(Some(gate))
    }

    fn build(gate: Option<Arc<Barrier>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let counts = Arc::new(FetchCounts::default());

        let shared = Arc::clone(&counts);
        let loader = MockModuleLoader::new().with_factory(SOURCE, move |spec| {
            let mut yotsuba = MangaEntry::new(PATH, "Yotsuba&!");
            yotsuba.authors = vec!["Kiyohiko Azuma".into()];
            yotsuba.genres = vec!["Comedy".into()];

            let ext = MockExtension::new(&spec.id, &spec.version)
                .with_manga(yotsuba)
                .with_manga(MangaEntry::new("/title/azumanga", "Azumanga Daioh"))
                .with_chapters(
                    PATH,
                    vec![
                        ChapterEntry::new("/chapter/1", "Yotsuba & Frogs"),
                        ChapterEntry::new("/chapter/2", "Yotsuba & Cicadas"),
                    ],
                )
                .with_pages(
                    "/chapter/1",
                    vec!["p1.png".into(), "p2.png".into(), "p3.png".into()],
                )
                .with_counts(Arc::clone(&shared));
            match &gate {
                Some(gate) => ext.with_manga_gate(Arc::clone(gate)),
                None => ext,
            }
        });

        let registry = ExtensionRegistry::new(
            Capabilities::new(Arc::new(MockTransport::new())),
            dir.path().join("extensions"),
        )
        .with_loader(loader);
        let module = ModuleSpec::new(SOURCE, "1.0.0")
            .write(dir.path(), "libmangadex.so")
            .unwrap();
        registry.load(&module).unwrap();

        let library = Library::new(
            Arc::new(registry),
            LibraryStore::memory().unwrap(),
            &CacheConfig::default(),
        );

        Self {
            _dir: dir,
            counts,
            library,
        }
    }
}

#[test]
fn test_detail_fetch_is_cached() {
    let fx = Fixture::new();

    let first = fx.library.manga(SOURCE, PATH).unwrap();
    let second = fx.library.manga(SOURCE, PATH).unwrap();

    assert!(!first.is_durable());
    assert_eq!(second.title, "Yotsuba&!");
    assert_eq!(fx.counts.manga(), 1);
    assert!(fx.library.caches().manga.has(&cache_key(SOURCE, PATH)));
}

#[test]
fn test_add_evicts_transient_copy() {
    let fx = Fixture::new();
    let key = cache_key(SOURCE, PATH);

    let transient = fx.library.manga(SOURCE, PATH).unwrap();
    assert!(fx.library.caches().manga.has(&key));

    let saved = fx.library.add(&transient).unwrap();
    assert!(saved.is_durable());
    assert!(!fx.library.caches().manga.has(&key));

    // Served from the store from now on.
    let again = fx.library.manga(SOURCE, PATH).unwrap();
    assert_eq!(again.id, saved.id);
    assert_eq!(again.authors, vec!["Kiyohiko Azuma"]);
    assert_eq!(fx.counts.manga(), 1);
}

#[test]
fn test_durable_copy_wins_over_fetch() {
    let fx = Fixture::new();

    let mut stored = Manga::from_entry(SOURCE, MangaEntry::new(PATH, "Stored Title"));
    stored.description = "kept locally".into();
    fx.library.store().save_manga(&stored).unwrap();

    let manga = fx.library.manga(SOURCE, PATH).unwrap();
    assert!(manga.is_durable());
    assert_eq!(manga.title, "Stored Title");
    assert_eq!(fx.counts.manga(), 0);
}

#[test]
fn test_chapter_batch_is_promoted_on_add() {
    let fx = Fixture::new();
    let key = cache_key(SOURCE, PATH);

    let transient = fx.library.chapters(SOURCE, PATH).unwrap();
    assert_eq!(transient.len(), 2);
    assert!(transient.iter().all(|c| !c.is_durable()));
    assert!(fx.library.caches().chapters.has(&key));
    assert!(fx
        .library
        .caches()
        .chapter
        .has(&cache_key(SOURCE, "/chapter/1")));

    let manga = fx.library.add_path(SOURCE, PATH).unwrap();
    assert!(!fx.library.caches().chapters.has(&key));
    assert!(!fx
        .library
        .caches()
        .chapter
        .has(&cache_key(SOURCE, "/chapter/1")));

    let stored = fx.library.store().chapters(manga.id).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|c| c.is_durable() && c.manga_id == manga.id));

    let served = fx.library.chapters(SOURCE, PATH).unwrap();
    assert_eq!(served.len(), 2);
    assert_eq!(fx.counts.chapters(), 1);
}

#[test]
fn test_saved_manga_fetches_and_stores_chapters() {
    let fx = Fixture::new();
    let manga = fx.library.add_path(SOURCE, PATH).unwrap();

    let chapters = fx.library.chapters(SOURCE, PATH).unwrap();
    assert_eq!(chapters.len(), 2);
    assert!(chapters.iter().all(|c| c.manga_id == manga.id));

    fx.library.chapters(SOURCE, PATH).unwrap();
    assert_eq!(fx.counts.chapters(), 1);
}

#[test]
fn test_pages_are_recorded_for_saved_chapters() {
    let fx = Fixture::new();
    fx.library.add_path(SOURCE, PATH).unwrap();
    fx.library.chapters(SOURCE, PATH).unwrap();

    let pages = fx.library.pages(SOURCE, "/chapter/1").unwrap();
    assert_eq!(pages.len(), 3);

    let chapter = fx
        .library
        .store()
        .find_chapter(SOURCE, "/chapter/1")
        .unwrap()
        .unwrap();
    assert_eq!(chapter.page_count(), 3);
}

#[test]
fn test_latest_marks_saved_entries() {
    let fx = Fixture::new();
    let saved = fx.library.add_path(SOURCE, PATH).unwrap();

    let listing = fx.library.latest(SOURCE, 1).unwrap();
    assert_eq!(listing.entries.len(), 2);
    let yotsuba = listing.entries.iter().find(|m| m.path == PATH).unwrap();
    assert_eq!(yotsuba.id, saved.id);
    let other = listing
        .entries
        .iter()
        .find(|m| m.path == "/title/azumanga")
        .unwrap();
    assert!(!other.is_durable());
}

#[test]
fn test_reading_status_saves_transient_manga() {
    let fx = Fixture::new();
    let transient = fx.library.manga(SOURCE, PATH).unwrap();

    let updated = fx
        .library
        .set_reading_status(&transient, ReadingStatus::Reading)
        .unwrap();
    assert!(updated.is_durable());
    assert_eq!(updated.reading_status, ReadingStatus::Reading);
    assert!(!fx.library.caches().manga.has(&cache_key(SOURCE, PATH)));

    let err = fx
        .library
        .set_reading_status_by_id(999, ReadingStatus::Completed)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_remove_deletes_saved_manga() {
    let fx = Fixture::new();
    let saved = fx.library.add_path(SOURCE, PATH).unwrap();
    fx.library.chapters(SOURCE, PATH).unwrap();

    assert!(fx.library.remove(saved.id).unwrap());
    assert!(fx.library.get(saved.id).unwrap().is_none());
    assert!(fx.library.list().unwrap().is_empty());
    assert!(!fx.library.remove(saved.id).unwrap());
}

#[test]
fn test_unknown_source_is_not_found() {
    let fx = Fixture::new();
    let err = fx.library.manga("unknown", PATH).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_preferences_pass_through() {
    let fx = Fixture::new();
    assert_eq!(fx.library.filters(SOURCE).unwrap().len(), 1);

    let updated = fx
        .library
        .set_preferences(SOURCE, &serde_json::json!({ "quality": "low" }))
        .unwrap();
    assert_eq!(updated["quality"], "low");
    assert_eq!(
        fx.library.preferences(SOURCE).unwrap().unwrap()["quality"],
        "low"
    );
}

// ============================================================================
// Concurrent fetch and save
// ============================================================================

#[test]
fn test_save_during_detail_fetch_is_not_shadowed() {
    let gate = Arc::new(Barrier::new(2));
    let fx = Fixture::gated(Arc::clone(&gate));
    let key = cache_key(SOURCE, PATH);

    let (fetched, saved) = thread::scope(|s| {
        let fetcher = s.spawn(|| fx.library.manga(SOURCE, PATH).unwrap());

        // The fetch is in flight; save the same entity underneath it.
        gate.wait();
        let saved = fx
            .library
            .add(&Manga::from_entry(SOURCE, MangaEntry::new(PATH, "Yotsuba&!")))
            .unwrap();
        gate.wait();

        (fetcher.join().unwrap(), saved)
    });

    assert!(saved.is_durable());
    assert_eq!(fetched.id, saved.id);
    assert!(!fx.library.caches().manga.has(&key));

    let again = fx.library.manga(SOURCE, PATH).unwrap();
    assert_eq!(again.id, saved.id);
    assert_eq!(fx.counts.manga(), 1);
}

#[test]
fn test_concurrent_browse_and_add_settle_on_durable_state() {
    let fx = Fixture::new();
    let key = cache_key(SOURCE, PATH);

    let saved = thread::scope(|s| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    for _ in 0..25 {
                        fx.library.manga(SOURCE, PATH).unwrap();
                        fx.library.chapters(SOURCE, PATH).unwrap();
                    }
                })
            })
            .collect();
        let saved = fx.library.add_path(SOURCE, PATH).unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        saved
    });

    let cached_transient = fx
        .library
        .caches()
        .manga
        .peek(&key)
        .map_or(false, |m| !m.is_durable());
    assert!(!cached_transient);
    assert!(!fx.library.caches().chapters.has(&key));
    assert!(!fx
        .library
        .caches()
        .chapter
        .has(&cache_key(SOURCE, "/chapter/1")));

    assert_eq!(fx.library.manga(SOURCE, PATH).unwrap().id, saved.id);
    let chapters = fx.library.chapters(SOURCE, PATH).unwrap();
    assert_eq!(chapters.len(), 2);
    assert!(chapters.iter().all(|c| c.manga_id == saved.id));
    assert_eq!(fx.library.list().unwrap().len(), 1);
}
