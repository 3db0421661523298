//! URL pattern and route-construction tests: token classes, capture
//! positions, and the construction-time binding checks.

use coserv::router::pattern::UrlPattern;
use coserv::router::{HandlerResult, Reply};
use coserv::{Route, Token};
use serde_json::json;

#[test]
fn int_segment_matches_digits_only() {
    let pattern = UrlPattern::compile("/users/<int>");
    let caps = pattern.captures("/users/42").expect("digits match");
    assert_eq!(caps[0], "/users/42");
    assert_eq!(caps[1], "42");
    assert!(pattern.captures("/users/alice").is_none());
    assert!(pattern.captures("/users/").is_none());
    assert!(pattern.captures("/users/42/extra").is_none());
}

#[test]
fn str_segment_stops_at_slash() {
    let pattern = UrlPattern::compile("/find/<str>");
    let caps = pattern.captures("/find/alice-a.b_c").expect("match");
    assert_eq!(caps[1], "alice-a.b_c");
    assert!(pattern.captures("/find/a/b").is_none());
}

#[test]
fn path_segment_crosses_slashes() {
    let pattern = UrlPattern::compile("/statics/<path>");
    let caps = pattern.captures("/statics/css/site.css").expect("match");
    assert_eq!(caps[1], "css/site.css");
}

#[test]
fn multiple_captures_are_positional() {
    let pattern = UrlPattern::compile("/orgs/<str>/repos/<int>");
    assert_eq!(pattern.capture_count(), 2);
    let caps = pattern.captures("/orgs/acme/repos/7").expect("match");
    assert_eq!(caps[1], "acme");
    assert_eq!(caps[2], "7");
}

#[test]
fn literal_pattern_has_no_captures() {
    let pattern = UrlPattern::compile("/login");
    assert_eq!(pattern.capture_count(), 0);
    assert!(pattern.captures("/login").is_some());
    assert!(pattern.captures("/login/").is_none());
}

/// Re-substituting a match's captures into the pattern's literal shell
/// reproduces the matched URL.
#[test]
fn capture_idempotence() {
    let cases = [
        ("/users/<int>", "/users/314"),
        ("/find/<str>", "/find/bob_2.x-y"),
        ("/statics/<path>", "/statics/js/app/main.js"),
        ("/orgs/<str>/repos/<int>", "/orgs/acme/repos/9"),
    ];
    for (pattern_str, url) in cases {
        let pattern = UrlPattern::compile(pattern_str);
        let caps = pattern.captures(url).expect("match");
        let mut rebuilt = pattern_str.to_string();
        for cap in caps.iter().skip(1) {
            let token_at = ["<int>", "<str>", "<path>"]
                .iter()
                .filter_map(|t| rebuilt.find(t).map(|i| (i, *t)))
                .min()
                .expect("token left");
            rebuilt.replace_range(token_at.0..token_at.0 + token_at.1.len(), cap);
        }
        assert_eq!(rebuilt, url, "pattern {pattern_str}");
    }
}

fn one_capture(s: String) -> HandlerResult {
    Ok(Reply::Json(json!({ "got": s })))
}

#[test]
fn route_accepts_matching_binding() {
    let _ = Route::new("/find/<str>", one_capture, vec![Token::Url(1)]);
    let _ = Route::new("/fixed", one_capture, vec![Token::literal("x")]);
}

#[test]
#[should_panic(expected = "out of range")]
fn route_rejects_capture_out_of_range() {
    let _ = Route::new("/find/<str>", one_capture, vec![Token::Url(2)]);
}

#[test]
#[should_panic(expected = "placeholder")]
fn route_rejects_arity_mismatch() {
    let _ = Route::new("/find/<str>", one_capture, vec![Token::Url(1), Token::Session]);
}

#[test]
#[should_panic(expected = "cannot bind")]
fn route_rejects_token_type_mismatch() {
    let _ = Route::new("/find/<str>", one_capture, vec![Token::Session]);
}
