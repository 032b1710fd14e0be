//! Tests for tag routing.

use pcap_dispatcher::config::{AnalysisConfig, BackendConfig, CaptureConfig, DispatcherConfig};
use pcap_dispatcher::engine::Router;
use pcap_dispatcher::model::{Backend, ExtractionMode, WorkItem};
use std::path::PathBuf;

fn item(tags: &[&str]) -> WorkItem {
    WorkItem::new("/data/x.pcap", tags.iter().map(|t| t.to_string()).collect())
}

// ---------------------------------------------------------------------------
// Capture backend
// ---------------------------------------------------------------------------

#[test]
fn capture_forwards_residual_tags_when_autotag() {
    let router = Router::new(Backend::Capture, true);
    let route = router.route(item(&["site1", "AUTOZEEK", "AUTOCARVE-mapped", "sensor2"]));

    assert!(route.process);
    assert_eq!(route.path, PathBuf::from("/data/x.pcap"));
    assert_eq!(route.tags, vec!["site1", "sensor2"]);
}

#[test]
fn capture_forwards_nothing_without_autotag() {
    let router = Router::new(Backend::Capture, false);
    let route = router.route(item(&["site1", "sensor2"]));

    assert!(route.process);
    assert!(route.tags.is_empty());
}

// ---------------------------------------------------------------------------
// Analysis backend
// ---------------------------------------------------------------------------

#[test]
fn analysis_skipped_without_flag_or_tag() {
    let router = Router::new(Backend::Analysis, true);
    assert!(!router.route(item(&["site1"])).process);
}

#[test]
fn autozeek_tag_forces_analysis() {
    let router = Router::new(Backend::Analysis, true).autoanalyze(false);
    let route = router.route(item(&["AUTOZEEK", "site1"]));

    assert!(route.process);
    assert_eq!(route.tags, vec!["site1"]);
}

#[test]
fn autoanalyze_flag_processes_everything() {
    let router = Router::new(Backend::Analysis, false).autoanalyze(true);
    assert!(router.route(item(&[])).process);
}

#[test]
fn carve_tag_overrides_default_mode() {
    let router = Router::new(Backend::Analysis, true)
        .autoanalyze(true)
        .default_mode(ExtractionMode::None);
    let route = router.route(item(&["AUTOCARVE-interesting", "site1"]));

    assert_eq!(route.extract_mode, ExtractionMode::Interesting);
    assert_eq!(route.tags, vec!["site1"]);
}

#[test]
fn default_mode_applies_without_carve_tag() {
    let router = Router::new(Backend::Analysis, false)
        .autoanalyze(true)
        .default_mode(ExtractionMode::Mapped);
    assert_eq!(router.route(item(&["site1"])).extract_mode, ExtractionMode::Mapped);
}

#[test]
fn last_carve_tag_wins() {
    let router = Router::new(Backend::Analysis, true).autoanalyze(true);
    let route = router.route(item(&["AUTOCARVE-mapped", "a", "AUTOCARVE-interesting", "b"]));

    assert_eq!(route.extract_mode, ExtractionMode::Interesting);
    assert_eq!(route.tags, vec!["a", "b"]);
}

#[test]
fn unknown_carve_mode_is_consumed_and_ignored() {
    let router = Router::new(Backend::Analysis, true)
        .autoanalyze(true)
        .default_mode(ExtractionMode::Mapped);
    let route = router.route(item(&["AUTOCARVE-everything", "a"]));

    assert_eq!(route.extract_mode, ExtractionMode::Mapped);
    assert_eq!(route.tags, vec!["a"]);
}

#[test]
fn carve_override_does_not_leak_between_items() {
    let router = Router::new(Backend::Analysis, false)
        .autoanalyze(true)
        .default_mode(ExtractionMode::None);

    let first = router.route(item(&["AUTOCARVE-mapped"]));
    let second = router.route(item(&[]));

    assert_eq!(first.extract_mode, ExtractionMode::Mapped);
    assert_eq!(second.extract_mode, ExtractionMode::None);
}

#[test]
fn end_to_end_tags_route_to_interesting_with_no_outgoing_tags() {
    let router = Router::new(Backend::Analysis, true);
    let route = router.route(item(&["AUTOZEEK", "AUTOCARVE-interesting"]));

    assert!(route.process);
    assert_eq!(route.extract_mode, ExtractionMode::Interesting);
    assert!(route.tags.is_empty());
}

#[test]
fn router_built_from_config() {
    let analysis = DispatcherConfig::new(BackendConfig::Analysis(AnalysisConfig {
        executable: PathBuf::from("zeek"),
        autoanalyze: false,
        extract_mode: ExtractionMode::Mapped,
        output_dir: PathBuf::from("/out"),
        scratch_dir: PathBuf::from("/tmp"),
    }))
    .autotag(true);
    let route = Router::from_config(&analysis).route(item(&["AUTOZEEK", "x"]));
    assert!(route.process);
    assert_eq!(route.extract_mode, ExtractionMode::Mapped);
    assert_eq!(route.tags, vec!["x"]);

    let capture = DispatcherConfig::new(BackendConfig::Capture(CaptureConfig {
        executable: PathBuf::from("moloch-capture"),
        managed: false,
    }));
    let route = Router::from_config(&capture).route(item(&["x"]));
    assert!(route.process);
    assert!(route.tags.is_empty());
}
