use std::path::PathBuf;

use serde_json::json;
use uuid::Uuid;

use leadflow::mail::template::{self, TemplateError, TemplateStore};

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("leadflow-templates-{}", Uuid::now_v7().simple()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn render_substitutes_every_occurrence() {
    let out = template::render(
        "Hallo {{name}}, {{ name }}! {{discount}}% Rabatt.",
        &json!({ "name": "Anna", "discount": 30 }),
    );
    assert_eq!(out, "Hallo Anna, Anna! 30% Rabatt.");
}

#[test]
fn render_leaves_unknown_placeholders() {
    let out = template::render("Hi {{name}} {{missing}}", &json!({ "name": "Ben" }));
    assert_eq!(out, "Hi Ben {{missing}}");
}

#[test]
fn render_null_as_empty() {
    let out = template::render("[{{name}}]", &json!({ "name": null }));
    assert_eq!(out, "[]");
}

#[test]
fn render_does_not_rescan_substituted_values() {
    let out = template::render(
        "{{a}} {{b}}",
        &json!({ "a": "{{b}}", "b": "x" }),
    );
    assert_eq!(out, "{{b}} x");
}

#[test]
fn escape_html_escapes_markup() {
    let out = template::escape_html("<b>Tom & \"Jerry\" O'Neil</b>");
    assert!(out.starts_with("&lt;b&gt;Tom &amp; "));
    assert!(out.ends_with("&lt;/b&gt;"));
    assert!(!out.contains('"'));
    assert!(!out.contains('\''));
    assert_eq!(template::escape_html("plain text"), "plain text");
}

#[tokio::test]
async fn load_prefers_primary_then_fallback() {
    let primary = temp_dir();
    let fallback = temp_dir();
    std::fs::write(primary.join("confirmation.html"), "primary").unwrap();
    std::fs::write(fallback.join("confirmation.html"), "fallback").unwrap();
    std::fs::write(fallback.join("followup-1h.html"), "only fallback").unwrap();

    let store = TemplateStore::new(&primary, &fallback);
    assert_eq!(store.load("confirmation").await.unwrap(), "primary");
    assert_eq!(store.load("followup-1h").await.unwrap(), "only fallback");
}

#[tokio::test]
async fn load_reads_changes_without_restart() {
    let primary = temp_dir();
    let store = TemplateStore::new(&primary, temp_dir());

    std::fs::write(primary.join("confirmation.html"), "v1").unwrap();
    assert_eq!(store.load("confirmation").await.unwrap(), "v1");

    std::fs::write(primary.join("confirmation.html"), "v2").unwrap();
    assert_eq!(store.load("confirmation").await.unwrap(), "v2");
}

#[tokio::test]
async fn load_missing_template() {
    let store = TemplateStore::new(temp_dir(), temp_dir());

    match store.load("followup-3d").await {
        Err(TemplateError::NotFound { name, tried }) => {
            assert_eq!(name, "followup-3d");
            assert_eq!(tried.len(), 2);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn load_rejects_path_traversal() {
    let store = TemplateStore::new(temp_dir(), temp_dir());

    assert!(matches!(
        store.load("../secrets").await,
        Err(TemplateError::InvalidName(_))
    ));
}

#[tokio::test]
async fn bundled_follow_up_templates_exist() {
    let store = TemplateStore::new("templates/email", "dist/templates/email");

    for name in ["confirmation", "followup-1h", "followup-8h", "followup-24h", "followup-3d"] {
        let source = store.load(name).await.unwrap();
        assert!(source.contains("{{name}}"), "{name} has no name placeholder");
    }
}
