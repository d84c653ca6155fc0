//! Phase 4 — View Registry Tests
//!
//! A view directory on disk: initial compilation, page rendering with
//! partials and layout, file-change handling and slicing the rendered page.

use std::fs;
use std::path::{Path, PathBuf};

use mapview::registry::ViewResult;
use mapview::{slice, ChangeKind, FileChange, RegistryOptions, ViewError, ViewRegistry};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const LAYOUT: &str =
    "<!DOCTYPE html><html><head><title>test</title></head><body><render-body></render-body></body></html>";

const INDEX: &str =
    r#"<layout template="layout"><h1>Old</h1><partial template="partials/p1" id="p1"></partial></layout>"#;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create view dir");
    }
    fs::write(path, content).expect("Failed to write view file");
}

/// `<tmp>/views` with a layout, a page and one partial carrying a script.
fn create_views() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let views = tmp.path().join("views");
    write(&views.join("layout.html"), LAYOUT);
    write(&views.join("index.html"), INDEX);
    write(&views.join("index.html.json"), r#"{ "h1": { "html": "title" } }"#);
    write(&views.join("partials/p1.html"), "<p>Old</p>");
    write(
        &views.join("partials/p1.html.json"),
        r#"{ "p": { "html": "content.{partials_p1}.text" } }"#,
    );
    write(&views.join("partials/p1.html.js"), "console.log('p1');");
    (tmp, views)
}

fn model() -> Value {
    json!({ "title": "Hi", "content": { "p1": { "text": "from p1" } } })
}

async fn init(views: &Path) -> ViewRegistry {
    ViewRegistry::init(views, RegistryOptions::default())
        .await
        .expect("registry init")
}

fn render(registry: &ViewRegistry, mode: &str) -> Result<String, ViewError> {
    registry.render(Some("views"), "index", &model(), mode, None, None)
}

// ===========================================================================
// 4.1 — Initialisation
// ===========================================================================

#[tokio::test]
async fn init_compiles_every_view() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;

    assert_eq!(
        registry.ids(),
        vec![
            "views/index.html".to_string(),
            "views/layout.html".to_string(),
            "views/partials/p1.html".to_string(),
        ]
    );
    assert_eq!(registry.options().view_dir_id.as_deref(), Some("views"));

    let index = registry.get("views/index.html").unwrap();
    assert_eq!(index.layout(), Some("layout"));
    assert_eq!(index.template_id(), Some("index.html"));
    assert_eq!(index.mapping().base_prop.as_deref(), Some("index"));
    assert!(registry.get("views/layout.html").unwrap().is_layout());

    assert_eq!(
        registry.script("views/partials/p1.html"),
        Some(views.join("partials/p1.html.js"))
    );
    assert_eq!(registry.script("views/index.html"), None);
}

#[tokio::test]
async fn init_creates_missing_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let views = tmp.path().join("fresh");
    let registry = init(&views).await;

    assert!(views.is_dir());
    assert!(registry.ids().is_empty());
}

#[tokio::test]
async fn init_fails_on_broken_view() {
    let (_tmp, views) = create_views();
    write(&views.join("broken.html"), "<p>x</p>");
    write(&views.join("broken.html.json"), "[1, 2]");

    let err = ViewRegistry::init(&views, RegistryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ViewError::Template { ref template, .. } if template == "views/broken.html"));
}

// ===========================================================================
// 4.2 — Page rendering
// ===========================================================================

#[tokio::test]
async fn page_renders_inside_layout() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;

    assert_eq!(
        render(&registry, "").unwrap(),
        "<!DOCTYPE html><html><head><title>test</title></head><body><h1>Hi</h1><p>from p1</p></body></html>"
    );
}

#[tokio::test]
async fn page_renders_ids_in_show_ids_mode() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;

    assert_eq!(
        render(&registry, "admin").unwrap(),
        concat!(
            r#"<!DOCTYPE html><html e-template-id="layout.html" e-widget-id="">"#,
            r#"<head><title>test</title></head><body>"#,
            r#"<h1 e-template-id="index.html" e-widget-id="">Hi</h1>"#,
            r#"<p e-template-id="partials/p1.html" e-widget-id="p1">from p1</p>"#,
            r#"</body></html>"#
        )
    );
}

/// The show-ids output slices back into one fragment per template.
#[tokio::test]
async fn rendered_page_slices_back() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;
    let html = render(&registry, "admin").unwrap();

    let fragments = slice(&html, None);
    let templates: Vec<&str> = fragments.iter().map(|f| f.template.as_str()).collect();
    assert_eq!(templates, vec!["layout.html", "index.html", "partials/p1.html"]);
    assert_eq!(
        fragments[1].html,
        r#"<h1 e-template-id="index.html" e-widget-id="">Hi</h1>"#
    );
    assert_eq!(fragments[2].widget_id, "p1");
    assert!(!fragments[0].html.contains("<h1"));
}

#[tokio::test]
async fn rename_applies_before_lookup() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;
    let rename = |name: &str| name.replace("start", "index");

    let html = registry
        .render(Some("views"), "start", &model(), "", None, Some(&rename))
        .unwrap();
    assert!(html.contains("<h1>Hi</h1>"));
}

#[tokio::test]
async fn missing_view_is_reported() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;

    let err = registry
        .render(Some("views"), "nope", &model(), "", None, None)
        .unwrap_err();
    assert!(matches!(err, ViewError::ViewNotFound(ref id) if id == "views/nope.html"));
}

/// Views added after init are compiled on first use.
#[tokio::test]
async fn lazy_render_compiles_on_demand() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;
    write(&views.join("late.html"), "<main>late</main>");
    write(&views.join("late.html.json"), r#"{ "main": { "html": "title" } }"#);

    let html = registry
        .render_lazy(Some("views"), "late", &model(), "", None, None)
        .unwrap();
    assert_eq!(html, "<main>Hi</main>");
    assert!(registry.get("views/late.html").is_ok());
}

// ===========================================================================
// 4.3 — File changes
// ===========================================================================

#[tokio::test]
async fn updated_view_is_recompiled() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;
    let path = views.join("partials/p1.html");
    assert!(registry.has_changed("views/partials/p1.html"));
    assert!(!registry.has_changed("views/partials/p1.html"));

    write(&path, "<p>Old</p><hr>");
    let id = registry
        .apply_change(&FileChange {
            path,
            kind: ChangeKind::Updated,
        })
        .await;

    assert_eq!(id.as_deref(), Some("views/partials/p1.html"));
    assert!(registry.has_changed("views/partials/p1.html"));
    assert!(render(&registry, "").unwrap().contains("<p>from p1</p><hr>"));
    // script survives recompilation
    assert!(registry.script("views/partials/p1.html").is_some());
}

#[tokio::test]
async fn mapping_change_recompiles_its_view() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;
    let map_path = views.join("index.html.json");

    write(&map_path, r#"{ "h1": { "html": "content.p1.text" } }"#);
    let id = registry
        .apply_change(&FileChange {
            path: map_path.clone(),
            kind: ChangeKind::Updated,
        })
        .await;
    assert_eq!(id.as_deref(), Some("views/index.html"));
    assert!(render(&registry, "").unwrap().contains("<h1>from p1</h1>"));

    fs::remove_file(&map_path).unwrap();
    registry
        .apply_change(&FileChange {
            path: map_path,
            kind: ChangeKind::Removed,
        })
        .await;
    assert!(render(&registry, "").unwrap().contains("<h1>Old</h1>"));
}

#[tokio::test]
async fn script_changes_update_the_entry() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;
    let script = views.join("index.html.js");

    write(&script, "console.log('index');");
    registry
        .apply_change(&FileChange {
            path: script.clone(),
            kind: ChangeKind::Created,
        })
        .await;
    assert_eq!(registry.script("views/index.html"), Some(script.clone()));

    registry
        .apply_change(&FileChange {
            path: script,
            kind: ChangeKind::Removed,
        })
        .await;
    assert_eq!(registry.script("views/index.html"), None);
}

#[tokio::test]
async fn removed_view_is_dropped() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;
    let path = views.join("layout.html");
    fs::remove_file(&path).unwrap();

    registry
        .apply_change(&FileChange {
            path,
            kind: ChangeKind::Removed,
        })
        .await;

    assert!(matches!(
        registry.get("views/layout.html"),
        Err(ViewError::ViewNotFound(_))
    ));
    assert!(matches!(render(&registry, ""), Err(ViewError::ViewNotFound(_))));
}

/// A view that stops compiling is cached as a failure.
#[tokio::test]
async fn broken_update_is_cached_as_failure() {
    let (_tmp, views) = create_views();
    let registry = init(&views).await;
    let path = views.join("index.html");

    write(&path, "<render-body></render-body><render-body></render-body>");
    registry
        .apply_change(&FileChange {
            path,
            kind: ChangeKind::Updated,
        })
        .await;

    let err = registry.get("views/index.html").unwrap_err();
    assert!(matches!(err, ViewError::ViewFailed { ref id, .. } if id == "views/index.html"));
}

/// Files outside the view directory are ignored.
#[tokio::test]
async fn foreign_paths_are_ignored() {
    let (tmp, views) = create_views();
    let registry = init(&views).await;

    let id = registry
        .apply_change(&FileChange {
            path: tmp.path().join("elsewhere.html"),
            kind: ChangeKind::Updated,
        })
        .await;
    assert_eq!(id, None);
}

// ===========================================================================
// 4.4 — Registration
// ===========================================================================

#[tokio::test]
async fn register_external_view() {
    let (tmp, views) = create_views();
    let registry = init(&views).await;
    let external = tmp.path().join("extra.html");
    write(&external, "<aside>extra</aside>");

    let result: ViewResult = registry.register("views/extra.html", &external, None);
    assert!(result.is_ok());
    assert!(registry.ids().contains(&"views/extra.html".to_string()));
}

#[tokio::test]
async fn register_failure_is_stored() {
    let (tmp, views) = create_views();
    let registry = init(&views).await;
    let missing = tmp.path().join("missing.html");

    assert!(registry.register("views/missing.html", &missing, None).is_err());
    assert!(matches!(
        registry.get("views/missing.html"),
        Err(ViewError::ViewFailed { .. })
    ));
}
