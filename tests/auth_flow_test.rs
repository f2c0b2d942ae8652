//! End-to-end authentication flow tests: Basic and Digest against the
//! controller's pipeline hooks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use authnet::http::{AuthController, AuthPreferences, CredentialCallback, Credentials};
use authnet::{AuthDisposition, AuthError};
use digest::Digest as _;
use http::{HeaderMap, HeaderValue, StatusCode};
use md5::Md5;
use pretty_assertions::assert_eq;
use url::Url;

fn md5_hex(input: &str) -> String {
    let mut h = Md5::new();
    h.update(input.as_bytes());
    hex::encode(h.finalize())
}

fn creds() -> CredentialCallback {
    Box::new(|_| Some(Credentials::new("jo", "foo")))
}

fn counting_creds(count: Arc<AtomicU32>) -> CredentialCallback {
    Box::new(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
        Some(Credentials::new("jo", "foo"))
    })
}

fn controller(origin: &str) -> AuthController {
    let url = Url::parse(origin).expect("origin url");
    AuthController::new(&url, AuthPreferences::default())
}

fn challenge(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("www-authenticate", value.parse().expect("header value"));
    headers
}

/// Split a `Digest k="v", k=v` credential header into its parameters.
fn digest_params(value: &str) -> HashMap<String, String> {
    let rest = value.strip_prefix("Digest ").expect("digest header");
    rest.split(", ")
        .map(|kv| {
            let (k, v) = kv.split_once('=').expect("key=value");
            (k.to_string(), v.trim_matches('"').to_string())
        })
        .collect()
}

#[test]
fn test_basic_flow() {
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(creds());

    let mut request = auth.create_request("GET", "/");
    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    assert!(headers.get("authorization").is_none());

    let resp = challenge(r#"Basic realm="x""#);
    let d = auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry");
    assert_eq!(d, AuthDisposition::Retry);

    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    assert_eq!(headers["authorization"], "Basic am86Zm9v");
}

#[test]
fn test_digest_2069_flow() {
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(creds());

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Digest realm="x", nonce="abc""#);
    let d = auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry");
    assert_eq!(d, AuthDisposition::Retry);

    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    let value = headers["authorization"].to_str().expect("ascii");
    let params = digest_params(value);

    let expected = md5_hex(&format!("{}:abc:{}", md5_hex("jo:x:foo"), md5_hex("GET:/")));
    assert_eq!(params["username"], "jo");
    assert_eq!(params["realm"], "x");
    assert_eq!(params["nonce"], "abc");
    assert_eq!(params["uri"], "/");
    assert_eq!(params["response"], expected);
    assert_eq!(params["algorithm"], "MD5");
    assert!(!params.contains_key("qop"));
    assert!(!params.contains_key("nc"));
    assert!(!params.contains_key("cnonce"));
}

#[test]
fn test_digest_2617_flow_and_nonce_count() {
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(creds());

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Digest realm="x", nonce="abc", qop="auth""#);
    assert!(auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry")
        .is_retry());

    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    let params = digest_params(headers["authorization"].to_str().expect("ascii"));

    assert_eq!(params["nc"], "00000001");
    assert_eq!(params["qop"], "auth");
    let cnonce = &params["cnonce"];
    let expected = md5_hex(&format!(
        "{}:abc:00000001:{cnonce}:auth:{}",
        md5_hex("jo:x:foo"),
        md5_hex("GET:/")
    ));
    assert_eq!(params["response"], expected);

    // A second request against the same session steps the nonce count.
    let request = auth.create_request("GET", "/");
    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    let params = digest_params(headers["authorization"].to_str().expect("ascii"));
    assert_eq!(params["nc"], "00000002");
}

#[test]
fn test_stale_nonce_refreshes_without_prompt() {
    let prompts = Arc::new(AtomicU32::new(0));
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(counting_creds(prompts.clone()));

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Digest realm="x", nonce="abc", qop="auth""#);
    assert!(auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry")
        .is_retry());
    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    assert_eq!(prompts.load(Ordering::SeqCst), 1);

    // Server expired the nonce but the credentials are still good.
    let resp = challenge(r#"Digest realm="x", nonce="def", qop="auth", stale=true"#);
    assert!(auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry")
        .is_retry());
    assert_eq!(prompts.load(Ordering::SeqCst), 1);

    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    let params = digest_params(headers["authorization"].to_str().expect("ascii"));
    assert_eq!(params["nonce"], "def");
    assert_eq!(params["nc"], "00000001");
    let cnonce = &params["cnonce"];
    // Same H(A1): the password was not prompted for again.
    let expected = md5_hex(&format!(
        "{}:def:00000001:{cnonce}:auth:{}",
        md5_hex("jo:x:foo"),
        md5_hex("GET:/")
    ));
    assert_eq!(params["response"], expected);
}

#[test]
fn test_digest_preferred_over_basic() {
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(creds());

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Basic realm="x", Digest realm="x", nonce="y""#);
    assert!(auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry")
        .is_retry());

    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    let value = headers["authorization"].to_str().expect("ascii");
    assert!(value.starts_with("Digest "), "got: {value}");
}

#[test]
fn test_mutual_auth_success() {
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(creds());

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Digest realm="x", nonce="abc", qop="auth""#);
    assert!(auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry")
        .is_retry());

    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    let params = digest_params(headers["authorization"].to_str().expect("ascii"));
    let cnonce = &params["cnonce"];

    let rspauth = md5_hex(&format!(
        "{}:abc:00000001:{cnonce}:auth:{}",
        md5_hex("jo:x:foo"),
        md5_hex(":/")
    ));
    let mut resp = HeaderMap::new();
    resp.insert(
        "authentication-info",
        format!("qop=auth, rspauth=\"{rspauth}\", cnonce=\"{cnonce}\", nc=00000001")
            .parse()
            .expect("header value"),
    );
    let d = auth
        .post_send(&mut request, StatusCode::OK, &resp)
        .expect("verified");
    assert_eq!(d, AuthDisposition::Complete);
    assert!(auth.last_error().is_none());
}

#[test]
fn test_mutual_auth_failure() {
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(creds());

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Digest realm="x", nonce="abc", qop="auth""#);
    assert!(auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry")
        .is_retry());

    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    let params = digest_params(headers["authorization"].to_str().expect("ascii"));
    let cnonce = &params["cnonce"];

    let mut resp = HeaderMap::new();
    resp.insert(
        "authentication-info",
        format!("qop=auth, rspauth=\"deadbeef\", cnonce=\"{cnonce}\", nc=00000001")
            .parse()
            .expect("header value"),
    );
    let err = auth
        .post_send(&mut request, StatusCode::OK, &resp)
        .expect_err("mismatch");
    assert!(matches!(err, AuthError::MutualAuthFailed { .. }));
    assert!(auth
        .last_error()
        .expect("diagnostic")
        .contains("request-digest mismatch"));

    // Mutual-auth failure does not clear the staged credentials.
    let request = auth.create_request("GET", "/");
    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    assert!(headers.get("authorization").is_some());
}

#[test]
fn test_nextnonce_rotates_server_nonce() {
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(creds());

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Digest realm="x", nonce="abc""#);
    assert!(auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry")
        .is_retry());
    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);

    // 2069-style header carrying only a nextnonce.
    let mut resp = HeaderMap::new();
    resp.insert(
        "authentication-info",
        HeaderValue::from_static("nextnonce=\"rotated\""),
    );
    assert_eq!(
        auth.post_send(&mut request, StatusCode::OK, &resp)
            .expect("ok"),
        AuthDisposition::Complete
    );

    let request = auth.create_request("GET", "/");
    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    let params = digest_params(headers["authorization"].to_str().expect("ascii"));
    assert_eq!(params["nonce"], "rotated");
}

#[test]
fn test_forget_auth_drops_credentials() {
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(creds());

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Basic realm="x""#);
    assert!(auth
        .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
        .expect("retry")
        .is_retry());

    auth.forget_auth();

    let mut headers = HeaderMap::new();
    auth.pre_send(&request, &mut headers);
    assert!(headers.get("authorization").is_none());
}

#[test]
fn test_retry_attempt_counts_limit_reprompting() {
    // The attempt number is handed to the credential callback so it can
    // give up; verify it increments across consecutive challenges.
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let mut auth = controller("http://example.com/");
    auth.set_server_auth(Box::new(move |prompt| {
        seen_cb.lock().expect("lock").push(prompt.attempt);
        Some(Credentials::new("jo", "bad-password"))
    }));

    let mut request = auth.create_request("GET", "/");
    let resp = challenge(r#"Basic realm="x""#);
    for _ in 0..3 {
        assert!(auth
            .post_send(&mut request, StatusCode::UNAUTHORIZED, &resp)
            .expect("retry")
            .is_retry());
    }
    assert_eq!(*seen.lock().expect("lock"), vec![0, 1, 2]);
}
