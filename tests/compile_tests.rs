//! Phase 1 — Compile + Render Tests
//!
//! A mapped document compiled once, rendered against a model in the
//! regular and the show-ids mode. Covers value and attribute bindings,
//! repeats with class and style maps, partials, containers, the body slot,
//! layout unwrapping and mode gates.

use mapview::{compile, CompileOptions, Containers, DynamicKeys, Mapping, RenderArgs, ViewError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mapping(value: Value) -> Mapping {
    Mapping::from_value(&value).expect("valid mapping")
}

const PAGE: &str = concat!(
    r#"<layout template="test_layout">"#,
    r#"<a show-if-mode="admin" href="asd">@{text..sdfsdf}</a>"#,
    r#"<div style="width:300px;"><span style="display:none;">div1.span1</span></div>"#,
    r#"<div style="height:200px;"><span style="display:none;">div2.span1</span></div>"#,
    r#"<nav e-container="left" e-container-widgets="widgets/w1, widgets/w2"></nav>"#,
    r#"<nav e-container="center"></nav>"#,
    r#"<widget template="widgets/w1" id="w1"></widget>"#,
    r#"<partial template="partials/p1"></partial>"#,
    r#"<render-body></render-body>"#,
    r#"</layout>"#
);

fn page_mapping() -> Mapping {
    mapping(json!({
        "a": {
            "html": "link.text",
            "attrs": {
                "href": "link.href",
                "data": "JSON(link.{data_replace})"
            }
        },
        "div": {
            "repeat": "divs",
            "html": "text",
            "attrs": {
                "class": {
                    "suffix(-block)": "blockNameSuffix",
                    "prefix(block-)": "blockNamePrefix",
                    "hidden": "isHidden"
                },
                "style": {
                    "width": "style.w",
                    "height": "style.h"
                }
            },
            "inside": {
                "span": { "repeat": "ispans", "html": "innerspan" }
            }
        }
    }))
}

fn page_model() -> Value {
    json!({
        "link": {
            "text": "this is test anchor",
            "href": "http://test",
            "data": { "test": "test" }
        },
        "divs": [
            {
                "text": "this is test div-1",
                "blockNameSuffix": "test-1",
                "blockNamePrefix": "test-1",
                "isHidden": true,
                "style": { "w": "100px", "h": "100px" }
            },
            {
                "text": "this is test div-2",
                "blockNameSuffix": "test-2",
                "blockNamePrefix": "test-2",
                "style": { "w": "200px", "h": "200px" }
            }
        ]
    })
}

fn page_containers() -> Containers {
    Containers::from([
        ("left".to_string(), "LEFT".to_string()),
        ("center".to_string(), "CENTER".to_string()),
    ])
}

fn data_keys() -> DynamicKeys {
    DynamicKeys::from([("data_replace".to_string(), "data".to_string())])
}

// ===========================================================================
// 1.1 — Composite page
// ===========================================================================

/// Metadata collected while compiling.
#[test]
fn page_metadata() {
    let view = compile(PAGE, &page_mapping(), &CompileOptions::default()).unwrap();

    assert!(view.is_layout());
    assert_eq!(view.layout(), Some("test_layout"));

    let partials: Vec<(&str, &str)> = view
        .partials()
        .iter()
        .map(|p| (p.template.as_str(), p.id.as_str()))
        .collect();
    assert_eq!(partials, vec![("widgets/w1", "w1"), ("partials/p1", "")]);

    let containers: Vec<(&str, Vec<String>)> = view
        .containers()
        .iter()
        .map(|c| (c.id.as_str(), c.widgets.clone()))
        .collect();
    assert_eq!(
        containers,
        vec![
            ("left", vec!["widgets/w1".to_string(), "widgets/w2".to_string()]),
            ("center", vec![]),
        ]
    );
}

/// Show-ids mode renders the gated anchor and echoes every id attribute.
#[test]
fn page_renders_in_show_ids_mode() {
    let view = compile(PAGE, &page_mapping(), &CompileOptions::default()).unwrap();
    let containers = page_containers();
    let keys = data_keys();
    let partials = vec!["W1".to_string(), "P1".to_string()];

    let html = view.render(
        &page_model(),
        &RenderArgs {
            mode: "admin",
            body: "BODY",
            partials: &partials,
            containers: Some(&containers),
            widget_id: "",
            dynamic_keys: Some(&keys),
        },
    );

    let expected = concat!(
        r#"<a href="http://test" data="{&quot;test&quot;:&quot;test&quot;}" e-template-id="" e-widget-id="">this is test anchor</a>"#,
        r#"<div style="width: 100px; height: 100px;" class="test-1-block block-test-1 hidden">this is test div-1</div>"#,
        r#"<div style="width: 200px; height: 200px;" class="test-2-block block-test-2">this is test div-2</div>"#,
        r#"<nav e-container="left" e-container-widgets="widgets/w1,widgets/w2" e-template-id="" e-widget-id="">LEFT</nav>"#,
        r#"<nav e-container="center" e-container-widgets="" e-template-id="" e-widget-id="">CENTER</nav>"#,
        "W1P1BODY"
    );
    assert_eq!(html, expected);
}

/// Outside show-ids mode the gated anchor and all id attributes vanish.
#[test]
fn page_renders_without_ids() {
    let view = compile(PAGE, &page_mapping(), &CompileOptions::default()).unwrap();
    let keys = data_keys();

    let html = view.render(
        &page_model(),
        &RenderArgs {
            body: "BODY",
            dynamic_keys: Some(&keys),
            ..Default::default()
        },
    );

    assert!(!html.contains("<a "), "gated element rendered: {html}");
    assert!(!html.contains("e-template-id"), "debug ids leaked: {html}");
    assert!(html.contains("<nav></nav><nav></nav>"), "containers: {html}");
    assert!(html.ends_with("BODY"));
}

/// Missing model data falls back to the original markup.
#[test]
fn empty_model_renders_defaults() {
    let view = compile(PAGE, &page_mapping(), &CompileOptions::default()).unwrap();

    let html = view.render(&json!({}), &RenderArgs::default());

    assert!(html.contains(r#"<div style="width:300px;"><span style="display:none;">div1.span1</span></div>"#));
    assert!(html.contains(r#"<div style="height:200px;"><span style="display:none;">div2.span1</span></div>"#));
}

// ===========================================================================
// 1.2 — Plain documents
// ===========================================================================

/// A full document without composition elements.
#[test]
fn plain_document_metadata() {
    let html = r#"<html><a href="asd">@{text..sdfsdf}</a><div style="width:300px;"><span>x</span></div></html>"#;
    let view = compile(html, &Mapping::default(), &CompileOptions::default()).unwrap();

    assert!(!view.is_layout());
    assert_eq!(view.layout(), None);
    assert!(view.partials().is_empty());
    assert!(view.containers().is_empty());
}

/// Without a mapping a fragment renders back unchanged.
#[test]
fn unmapped_fragment_renders_verbatim() {
    let html = r#"<section class="a"><p>one</p><p>two</p></section>"#;
    let view = compile(html, &Mapping::default(), &CompileOptions::default()).unwrap();

    assert_eq!(view.render(&json!({ "x": 1 }), &RenderArgs::default()), html);
}

/// The template id is echoed on every root element in show-ids mode.
#[test]
fn template_id_is_echoed() {
    let options = CompileOptions {
        template_id: Some("widgets/menu.html".into()),
        ..Default::default()
    };
    let view = compile("<ul><li>a</li></ul>", &Mapping::default(), &options).unwrap();

    let html = view.render(
        &Value::Null,
        &RenderArgs {
            mode: "admin",
            widget_id: "m1",
            ..Default::default()
        },
    );
    assert_eq!(
        html,
        r#"<ul e-template-id="widgets/menu.html" e-widget-id="m1"><li>a</li></ul>"#
    );
}

// ===========================================================================
// 1.3 — Structural errors
// ===========================================================================

#[test]
fn two_render_bodies_fail() {
    let options = CompileOptions {
        template_id: Some("layout.html".into()),
        ..Default::default()
    };
    let err = compile(
        "<div><render-body></render-body></div><render-body></render-body>",
        &Mapping::default(),
        &options,
    )
    .unwrap_err();

    assert!(matches!(err, ViewError::MultipleBodies { .. }));
    assert!(err.to_string().contains("layout.html"));
}

#[test]
fn two_layouts_fail() {
    let err = compile(
        r#"<layout template="a"></layout><layout template="b"></layout>"#,
        &Mapping::default(),
        &CompileOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, ViewError::MultipleLayouts { .. }));
}

// ===========================================================================
// 1.4 — Nested markers, escaping and parsing context
// ===========================================================================

/// An `html` binding whose original content holds other bindings falls back
/// to that content with the inner bindings evaluated.
#[test]
fn nested_bindings_in_default_content() {
    let html = r#"<article><h2>Old</h2><ul><li>one</li><li>two</li></ul></article>"#;
    let m = mapping(json!({
        "h2": { "html": "title" },
        "li": { "repeat": "tags", "html": "this" },
        "article": { "html": "body" }
    }));
    let view = compile(html, &m, &CompileOptions::default()).unwrap();

    assert_eq!(
        view.render(&json!({ "title": "New", "tags": ["a", "b"] }), &RenderArgs::default()),
        "<article><h2>New</h2><ul><li>a</li><li>b</li></ul></article>"
    );
    assert_eq!(
        view.render(&json!({ "body": "<p>raw</p>" }), &RenderArgs::default()),
        "<article>&lt;p&gt;raw&lt;/p&gt;</article>"
    );
}

/// Quotes in class values cannot break out of the attribute.
#[test]
fn class_values_are_escaped() {
    let m = mapping(json!({
        "button": { "attrs": { "class": { "prefix(btn-)": "kind", "active": "on" } } }
    }));
    let view = compile(r#"<button class="btn">Go</button>"#, &m, &CompileOptions::default()).unwrap();

    assert_eq!(
        view.render(
            &json!({ "kind": "x\" onclick=\"alert(1)", "on": true }),
            &RenderArgs::default()
        ),
        r#"<button class="btn btn-x&quot; onclick=&quot;alert(1) active">Go</button>"#
    );
}

/// Repeated table rows and options keep their tags.
#[test]
fn table_and_select_repeats() {
    let html = concat!(
        "<table><tbody><tr><td>name</td><td>0</td></tr></tbody></table>",
        r#"<select><option value="a">A</option></select>"#
    );
    let m = mapping(json!({
        "tr": {
            "repeat": "rows",
            "inside": { "td": { "html": "name" } }
        },
        "option": {
            "repeat": "choices",
            "html": "label",
            "attrs": { "value": "id" }
        }
    }));
    let view = compile(html, &m, &CompileOptions::default()).unwrap();
    let model = json!({
        "rows": [{ "name": "x" }, { "name": "y" }],
        "choices": [{ "id": "1", "label": "One" }, { "id": "2", "label": "Two" }]
    });

    assert_eq!(
        view.render(&model, &RenderArgs::default()),
        concat!(
            "<table><tbody><tr><td>x</td><td>0</td></tr><tr><td>y</td><td>0</td></tr></tbody></table>",
            r#"<select><option value="1">One</option><option value="2">Two</option></select>"#
        )
    );
}

/// A mode-gated row disappears without disturbing its siblings.
#[test]
fn mode_gated_table_row() {
    let html = r#"<table><tbody><tr show-if-mode="edit"><td>tools</td></tr><tr><td>row</td></tr></tbody></table>"#;
    let view = compile(html, &Mapping::default(), &CompileOptions::default()).unwrap();

    assert_eq!(
        view.render(&Value::Null, &RenderArgs::default()),
        "<table><tbody><tr><td>row</td></tr></tbody></table>"
    );
    assert_eq!(
        view.render(
            &Value::Null,
            &RenderArgs {
                mode: "edit",
                ..Default::default()
            }
        ),
        "<table><tbody><tr><td>tools</td></tr><tr><td>row</td></tr></tbody></table>"
    );
}
