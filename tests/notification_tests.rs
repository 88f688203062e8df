mod common;

use common::snapshot;
use leadflow::mail::notifications::{EmailKind, Notifier};

fn notifier() -> Notifier {
    Notifier {
        from: "studio@test.com".to_string(),
        admin_recipient: "owner@test.com".to_string(),
        base_url: "https://studio.test/".to_string(),
    }
}

#[test]
fn admin_notification_lists_lead_details() {
    let mut lead = snapshot("Anna", "anna@test.com");
    lead.utm_source = Some("instagram".to_string());
    lead.utm_campaign = Some("spring".to_string());

    let email = notifier().build(EmailKind::AdminNotification, &lead).unwrap();

    assert_eq!(email.to, "owner@test.com");
    assert_eq!(email.from, "studio@test.com");
    assert_eq!(email.subject, "Neue Anfrage: Anna");
    assert!(email.html.contains("anna@test.com"));
    assert!(email.html.contains("https://wa.me/4915112345678"));
    assert!(email.html.contains(&format!("https://studio.test/admin/leads/{}", lead.id)));
    assert!(email.html.contains("instagram"));
}

#[test]
fn user_confirmation_goes_to_lead() {
    let lead = snapshot("Ben", "ben@test.com");

    let email = notifier().build(EmailKind::UserConfirmation, &lead).unwrap();

    assert_eq!(email.to, "ben@test.com");
    assert_eq!(email.subject, "Anfrage Bestätigung");
    assert!(email.html.contains("Ben"));
}

#[test]
fn lead_input_is_escaped() {
    let mut lead = snapshot("<script>alert(1)</script>", "x@test.com");
    lead.description = "<img src=x onerror=alert(1)>".to_string();

    let email = notifier().build(EmailKind::AdminNotification, &lead).unwrap();

    assert!(!email.html.contains("<script>"));
    assert!(!email.html.contains("<img src=x"));
    assert!(email.html.contains("&lt;script&gt;"));
}
