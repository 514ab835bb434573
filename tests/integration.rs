//! End-to-end flows driven through `handle_request` against an in-memory store.

use snapbord::auth::issue_session;
use snapbord::config::{token_key, Config, TOKENS_LIST_KEY};
use snapbord::core::db;
use snapbord::core::helpers::{hash_password, now};
use snapbord::core::store::Store;
use snapbord::handle_request;
use snapbord::likes::{like_count, like_post};
use snapbord::mail::{EmailMessage, Outbox};
use snapbord::models::models::{Post, TokenData, User};
use snapbord::state::AppState;
use spin_sdk::http::{Method, Request, Response};
use tokio::sync::mpsc::UnboundedReceiver;

const BOUNDARY: &str = "snapbord-test-boundary";
const PASSWORD: &str = "correct horse battery";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n fake bytes";
const JPEG: &[u8] = b"\xff\xd8\xff\xe0 fake bytes";

struct TestApp {
    state: AppState,
    mail: UnboundedReceiver<EmailMessage>,
}

impl TestApp {
    fn new() -> Self {
        let (outbox, mail) = Outbox::channel();
        Self {
            state: AppState::new(Store::memory(), Config::default(), outbox),
            mail,
        }
    }

    fn send(&self, method: Method, uri: &str, headers: &[(&str, &str)], body: Vec<u8>) -> Response {
        let mut builder = Request::builder();
        builder.method(method).uri(uri);
        for (name, value) in headers {
            builder.header(*name, *value);
        }
        let req = builder.body(body).build();
        handle_request(&self.state, req).expect("handle_request never fails")
    }

    fn get(&self, uri: &str, session: Option<&str>) -> Response {
        match session {
            Some(cookie) => self.send(Method::Get, uri, &[("cookie", cookie)], Vec::new()),
            None => self.send(Method::Get, uri, &[], Vec::new()),
        }
    }

    fn fragment(&self, uri: &str, session: &str) -> Response {
        self.send(Method::Get, uri, &[("cookie", session), ("hx-request", "true")], Vec::new())
    }

    fn post_form(&self, uri: &str, session: Option<&str>, fields: &[(&str, &str)]) -> Response {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let mut headers = vec![("content-type", "application/x-www-form-urlencoded")];
        if let Some(cookie) = session {
            headers.push(("cookie", cookie));
        }
        self.send(Method::Post, uri, &headers, body.into_bytes())
    }

    fn post_multipart(&self, uri: &str, session: &str, fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Response {
        let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
        let body = multipart_body(fields, file);
        self.send(
            Method::Post,
            uri,
            &[("cookie", session), ("content-type", content_type.as_str())],
            body,
        )
    }

    /// Inserts a user directly and returns it with a ready `cookie` header value.
    fn user(&self, username: &str) -> (User, String) {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            email_verified: true,
            password: hash_password(PASSWORD).unwrap(),
            name: None,
            image: None,
            bio: None,
            website: None,
            birthday: None,
            notifications: true,
            darkmode: false,
            is_staff: false,
            date_joined: now(),
        };
        db::insert_user(&self.state.store, &user).unwrap();
        let token = issue_session(&self.state.store, &user.id).unwrap();
        (user, format!("sessionid={}", token))
    }

    fn upload(&self, session: &str, caption: &str) -> Post {
        let resp = self.post_multipart(
            "/upload/",
            session,
            &[("body", caption), ("tags", "#test")],
            Some(("photo.png", "image/png", PNG)),
        );
        assert_eq!(*resp.status(), 302, "upload failed: {}", text(&resp));
        db::all_posts(&self.state.store).unwrap().remove(0)
    }

    fn reload_user(&self, id: &str) -> User {
        db::get_user(&self.state.store, id).unwrap().unwrap()
    }

    fn mailed_code(&mut self) -> String {
        let mail = self.mail.try_recv().expect("a verification mail was queued");
        mail.body.chars().filter(char::is_ascii_digit).take(6).collect()
    }
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn text(resp: &Response) -> String {
    String::from_utf8_lossy(resp.body()).into_owned()
}

fn location(resp: &Response) -> String {
    resp.header("location")
        .and_then(|h| h.as_str())
        .unwrap_or_default()
        .to_string()
}

fn session_from(resp: &Response) -> String {
    let set_cookie = resp
        .header("set-cookie")
        .and_then(|h| h.as_str())
        .expect("response sets the session cookie");
    set_cookie.split(';').next().unwrap().to_string()
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("{} not found in response", needle))
}

// === Signup and sessions ===

#[test]
fn signup_with_mailed_code_starts_a_session() {
    let mut app = TestApp::new();

    let resp = app.get("/profile/verification_code/?email=ann%40example.com", None);
    assert_eq!(*resp.status(), 200);
    assert!(text(&resp).contains("Verification code sent to your email!"));
    let code = app.mailed_code();

    let resp = app.post_form(
        "/accounts/signup/",
        None,
        &[
            ("email", "ann@example.com"),
            ("username", "ann"),
            ("password1", PASSWORD),
            ("password2", PASSWORD),
            ("birthday", "1990-05-01"),
            ("code", code.as_str()),
        ],
    );
    assert_eq!(*resp.status(), 302);
    assert_eq!(location(&resp), "/");

    let session = session_from(&resp);
    let home = app.get("/", Some(&session));
    assert_eq!(*home.status(), 200);
    assert!(text(&home).contains("/@ann/"));

    let user = db::find_user_by_username(&app.state.store, "ann").unwrap().unwrap();
    assert!(user.email_verified);
    assert_eq!(user.birthday.unwrap().to_string(), "1990-05-01");
}

#[test]
fn signup_with_a_wrong_code_is_rejected() {
    let mut app = TestApp::new();
    app.get("/profile/verification_code/?email=ann%40example.com", None);
    let code = app.mailed_code();
    let wrong = if code == "111111" { "222222" } else { "111111" };

    let resp = app.post_form(
        "/accounts/signup/",
        None,
        &[
            ("email", "ann@example.com"),
            ("username", "ann"),
            ("password1", PASSWORD),
            ("password2", PASSWORD),
            ("birthday", "1990-05-01"),
            ("code", wrong),
        ],
    );
    assert_eq!(*resp.status(), 200);
    assert!(text(&resp).contains("Invalid or expired verification code."));
    assert!(resp.header("set-cookie").is_none());
    assert!(db::find_user_by_username(&app.state.store, "ann").unwrap().is_none());
}

#[test]
fn verification_code_endpoint_validates_the_address() {
    let mut app = TestApp::new();

    let resp = app.get("/profile/verification_code/", None);
    assert!(text(&resp).contains("Email is required."));

    let resp = app.get("/profile/verification_code/?email=not-an-email", None);
    assert!(text(&resp).contains("Invalid email address provided."));

    assert!(app.mail.try_recv().is_err());
}

#[test]
fn login_accepts_username_or_email_and_logout_ends_the_session() {
    let app = TestApp::new();
    app.user("ann");

    let resp = app.post_form("/accounts/login/", None, &[("login", "ann"), ("password", PASSWORD)]);
    assert_eq!(*resp.status(), 302);
    let by_name = session_from(&resp);

    let resp = app.post_form(
        "/accounts/login/",
        None,
        &[("login", "ANN@example.com"), ("password", PASSWORD), ("next", "/explore/")],
    );
    assert_eq!(location(&resp), "/explore/");

    let resp = app.post_form("/accounts/login/", None, &[("login", "ann"), ("password", "nope")]);
    assert_eq!(*resp.status(), 200);
    assert!(text(&resp).contains("are not correct"));

    let resp = app.get("/accounts/logout/", Some(&by_name));
    assert_eq!(location(&resp), "/login/");
    assert_eq!(location(&app.get("/", Some(&by_name))), "/login/");
}

#[test]
fn username_with_an_at_sign_can_log_in() {
    let app = TestApp::new();
    app.user("ann@home");

    let resp = app.post_form("/accounts/login/", None, &[("login", "ann@home"), ("password", PASSWORD)]);
    assert_eq!(*resp.status(), 302);
    let session = session_from(&resp);
    assert_eq!(*app.get("/explore/", Some(&session)).status(), 200);
}

#[test]
fn expired_sessions_are_deleted() {
    let app = TestApp::new();
    let (ann, _) = app.user("ann");
    let (_, bob_session) = app.user("bob");
    let store = &app.state.store;
    let stale = now() - chrono::Duration::hours(app.state.config.session_hours + 1);

    let expire = |user_id: &str| {
        let token = uuid::Uuid::new_v4().to_string();
        let data = TokenData { user_id: user_id.to_string(), created_at: stale };
        store.set_json(&token_key(&token), &data).unwrap();
        db::push_back(store, TOKENS_LIST_KEY, &token).unwrap();
        token
    };

    // presenting an expired token drops it
    let old = expire(&ann.id);
    assert_eq!(location(&app.get("/", Some(&format!("sessionid={}", old)))), "/login/");
    assert!(!store.exists(&token_key(&old)).unwrap());
    assert!(!store.get_list(TOKENS_LIST_KEY).unwrap().contains(&old));

    // revoking one user's sessions prunes everyone's expired tokens
    let forgotten = expire(&ann.id);
    let resp = app.post_form(
        "/accounts/password/change/",
        Some(&bob_session),
        &[("oldpassword", PASSWORD), ("password1", "new password 1"), ("password2", "new password 1")],
    );
    assert_eq!(location(&resp), "/profile/settings/");
    assert!(!store.exists(&token_key(&forgotten)).unwrap());

    let remaining = store.get_list(TOKENS_LIST_KEY).unwrap();
    assert_eq!(remaining.len(), 2, "ann's live session and bob's fresh one");
    assert!(remaining.iter().all(|t| store.exists(&token_key(t)).unwrap()));
}

#[test]
fn offsite_next_is_ignored_after_login() {
    let app = TestApp::new();
    app.user("ann");

    let resp = app.post_form(
        "/accounts/login/",
        None,
        &[("login", "ann"), ("password", PASSWORD), ("next", "//evil.example.com/")],
    );
    assert_eq!(location(&resp), "/");
}

#[test]
fn protected_pages_redirect_to_login_with_next() {
    let app = TestApp::new();

    assert_eq!(location(&app.get("/", None)), "/login/");
    assert_eq!(location(&app.get("/explore/", None)), "/login/?next=%2Fexplore%2F");
    assert_eq!(location(&app.get("/upload/", None)), "/login/?next=%2Fupload%2F");
    assert_eq!(location(&app.get("/admin/", None)), "/login/?next=%2Fadmin%2F");
}

#[test]
fn bearer_token_is_accepted() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");
    let token = session.trim_start_matches("sessionid=");
    let bearer = format!("Bearer {}", token);

    let resp = app.send(Method::Get, "/explore/", &[("authorization", bearer.as_str())], Vec::new());
    assert_eq!(*resp.status(), 200);
}

#[test]
fn password_change_rotates_sessions() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");

    let resp = app.post_form(
        "/accounts/password/change/",
        Some(&session),
        &[("oldpassword", "wrong"), ("password1", "new password 1"), ("password2", "new password 1")],
    );
    assert_eq!(*resp.status(), 200);
    assert!(text(&resp).contains("Please type your current password."));

    let resp = app.post_form(
        "/accounts/password/change/",
        Some(&session),
        &[("oldpassword", PASSWORD), ("password1", "new password 1"), ("password2", "new password 1")],
    );
    assert_eq!(location(&resp), "/profile/settings/");
    let fresh = session_from(&resp);

    assert_eq!(location(&app.get("/", Some(&session))), "/login/");
    assert_eq!(*app.get("/", Some(&fresh)).status(), 200);

    let resp = app.post_form("/accounts/login/", None, &[("login", "ann"), ("password", "new password 1")]);
    assert_eq!(*resp.status(), 302);
}

// === Posts ===

#[test]
fn feed_shows_one_post_per_page_newest_first() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");
    let older = app.upload(&session, "older");
    let newer = app.upload(&session, "newer");

    let first = text(&app.get("/", Some(&session)));
    assert!(first.contains(&newer.id));
    assert!(!first.contains(&older.id));
    assert!(first.contains("page_number=2"));

    let second = text(&app.fragment("/?paginator=1&page_number=2", &session));
    assert!(second.contains(&older.id));
    assert!(!second.contains("<!DOCTYPE html>"));
    assert!(!second.contains("page_number=3"));

    // out of range clamps to the last page
    let clamped = text(&app.get("/?paginator=1&page_number=99", Some(&session)));
    assert!(clamped.contains(&older.id));
}

#[test]
fn feed_page_zero_or_negative_is_the_last_page() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");
    let older = app.upload(&session, "older");
    let newer = app.upload(&session, "newer");

    for number in ["0", "-1"] {
        let body = text(&app.fragment(&format!("/?paginator=1&page_number={}", number), &session));
        assert!(body.contains(&older.id), "page_number={}", number);
        assert!(!body.contains(&newer.id), "page_number={}", number);
    }

    let body = text(&app.fragment("/?paginator=1&page_number=abc", &session));
    assert!(body.contains(&newer.id));

    // a bare switch is off, so the whole home page comes back
    let full = text(&app.get("/?paginator&page_number=2", Some(&session)));
    assert!(full.contains("<!DOCTYPE html>"));
}

#[test]
fn upload_rejects_non_images_and_long_captions() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");

    let resp = app.post_multipart(
        "/upload/",
        &session,
        &[("body", "notes")],
        Some(("notes.txt", "text/plain", &b"hello"[..])),
    );
    assert_eq!(*resp.status(), 200);
    assert!(text(&resp).contains("Upload a valid image."));

    let long = "x".repeat(81);
    let resp = app.post_multipart(
        "/upload/",
        &session,
        &[("body", long.as_str())],
        Some(("photo.png", "image/png", PNG)),
    );
    assert!(text(&resp).contains("Ensure this value has at most 80 characters."));

    let resp = app.post_multipart("/upload/", &session, &[("body", "no file")], None);
    assert!(text(&resp).contains("This field is required."));

    assert!(db::all_posts(&app.state.store).unwrap().is_empty());
}

#[test]
fn uploaded_image_is_served_from_media() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");
    let post = app.upload(&session, "sunset");

    let resp = app.get(&post.image_url(), None);
    assert_eq!(*resp.status(), 200);
    assert_eq!(resp.body(), PNG);
    assert_eq!(resp.header("content-type").and_then(|h| h.as_str()), Some("image/png"));
    assert_eq!(resp.header("x-content-type-options").and_then(|h| h.as_str()), Some("nosniff"));
}

#[test]
fn upload_rejects_svg_and_mislabelled_bytes() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");

    let svg = &br#"<svg xmlns="http://www.w3.org/2000/svg"><script>alert(document.cookie)</script></svg>"#[..];
    let resp = app.post_multipart("/upload/", &session, &[("body", "vector")], Some(("x.svg", "image/svg+xml", svg)));
    assert_eq!(*resp.status(), 200);
    assert!(text(&resp).contains("Upload a valid image."));

    let resp = app.post_multipart(
        "/upload/",
        &session,
        &[("body", "fake")],
        Some(("x.png", "image/png", &b"<script>alert(1)</script>"[..])),
    );
    assert!(text(&resp).contains("Upload a valid image."));

    assert!(db::all_posts(&app.state.store).unwrap().is_empty());
}

#[test]
fn post_page_renders_full_or_fragment() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");
    let post = app.upload(&session, "sunset");
    let url = format!("/post/{}/", post.id);

    let full = text(&app.get(&url, Some(&session)));
    assert!(full.contains("<!DOCTYPE html>"));
    assert!(full.contains("sunset"));

    let partial = text(&app.fragment(&url, &session));
    assert!(!partial.contains("<!DOCTYPE html>"));
    assert!(partial.contains("sunset"));

    // readable without a session
    assert_eq!(*app.get(&url, None).status(), 200);

    assert_eq!(*app.get("/post/not-a-uuid/", Some(&session)).status(), 404);
    let missing = format!("/post/{}/", uuid::Uuid::new_v4());
    assert_eq!(*app.get(&missing, Some(&session)).status(), 404);
    assert_eq!(location(&app.get("/post/", Some(&session))), "/");
}

#[test]
fn captions_and_names_are_escaped_in_pages() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");
    let post = app.upload(&session, r#"<img src=x onerror="alert(1)">"#);

    let page = text(&app.get(&format!("/post/{}/", post.id), Some(&session)));
    assert!(!page.contains("<img src=x"));
    assert!(page.contains("&lt;img src=x onerror=&quot;alert(1)&quot;&gt;"));

    let resp = app.post_form("/accounts/login/", None, &[("login", r#""><script>"#), ("password", "x")]);
    let body = text(&resp);
    assert!(!body.contains("<script>"));
    assert!(body.contains(r#"value="&quot;&gt;&lt;script&gt;""#));
}

#[test]
fn post_page_links_to_the_authors_neighbouring_posts() {
    let app = TestApp::new();
    let (_, session) = app.user("ann");
    let first = app.upload(&session, "first");
    let middle = app.upload(&session, "middle");
    let last = app.upload(&session, "last");

    let page = text(&app.fragment(&format!("/post/{}/", middle.id), &session));
    assert!(page.contains(&format!(r#"class="post-nav" href="/post/{}/""#, first.id)));
    assert!(page.contains(&format!(r#"class="post-nav" href="/post/{}/""#, last.id)));
    assert!(page.contains("Previous"));
    assert!(page.contains("Next"));
}

#[test]
fn only_the_author_can_edit_or_delete() {
    let app = TestApp::new();
    let (_, ann) = app.user("ann");
    let (_, bob) = app.user("bob");
    let post = app.upload(&ann, "original");
    let edit_url = format!("/post/{}/edit/", post.id);

    let resp = app.post_form(&edit_url, Some(&bob), &[("body", "hijacked")]);
    assert_eq!(location(&resp), "/");
    let resp = app.get(&format!("{}?delete=1", edit_url), Some(&bob));
    assert_eq!(location(&resp), "/");
    let stored = db::get_post(&app.state.store, &post.id).unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some("original"));

    let form = text(&app.fragment(&edit_url, &ann));
    assert!(form.contains("original"));

    let resp = app.post_form(&edit_url, Some(&ann), &[("body", "edited"), ("tags", "#new")]);
    assert_eq!(location(&resp), format!("/post/{}/", post.id));
    let stored = db::get_post(&app.state.store, &post.id).unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some("edited"));
    assert_eq!(stored.tags.as_deref(), Some("#new"));

    // a bare or empty switch does not delete
    for bare in ["?delete", "?delete="] {
        let resp = app.get(&format!("{}{}", edit_url, bare), Some(&ann));
        assert_eq!(location(&resp), format!("/post/{}/", post.id));
        assert!(db::get_post(&app.state.store, &post.id).unwrap().is_some());
    }

    let resp = app.get(&format!("{}?delete=1", edit_url), Some(&ann));
    assert_eq!(location(&resp), "/@ann/");
    assert!(db::get_post(&app.state.store, &post.id).unwrap().is_none());
    assert_eq!(*app.get(&post.image_url(), None).status(), 404);
}

// === Likes ===

#[test]
fn like_toggles_on_fragment_requests_only() {
    let app = TestApp::new();
    let (_, ann) = app.user("ann");
    let (_, bob) = app.user("bob");
    let post = app.upload(&ann, "sunset");
    let like_url = format!("/post/{}/like/?home=1", post.id);
    let hx = [("cookie", bob.as_str()), ("hx-request", "true")];

    let liked = text(&app.send(Method::Post, &like_url, &hx, Vec::new()));
    assert!(liked.contains("like-button liked"));
    assert!(liked.contains(r#"<span class="like-count">1</span>"#));

    let unliked = text(&app.send(Method::Post, &like_url, &hx, Vec::new()));
    assert!(!unliked.contains("like-button liked"));
    assert!(unliked.contains(r#"<span class="like-count">0</span>"#));

    let plain = app.send(Method::Post, &format!("/post/{}/like/", post.id), &[("cookie", bob.as_str())], Vec::new());
    assert_eq!(location(&plain), format!("/post/{}/", post.id));
    assert_eq!(like_count(&app.state.store, &post.id).unwrap(), 0);
}

#[test]
fn postpage_like_fragment_reports_the_authors_total() {
    let app = TestApp::new();
    let (ann_user, ann) = app.user("ann");
    let (_, bob) = app.user("bob");
    let first = app.upload(&ann, "first");
    let second = app.upload(&ann, "second");
    like_post(&app.state.store, &ann_user.id, &first.id).unwrap();

    let hx = [("cookie", bob.as_str()), ("hx-request", "true")];
    let body = text(&app.send(Method::Post, &format!("/post/{}/like/?postpage=1", second.id), &hx, Vec::new()));
    assert!(body.contains(r#"id="author-likes">2</span>"#));
}

// === Profiles ===

#[test]
fn profile_sorts_by_date_or_popularity() {
    let app = TestApp::new();
    let (_, ann) = app.user("ann");
    let (bob, _) = app.user("bob");
    let (cat, _) = app.user("cat");
    let a = app.upload(&ann, "a");
    let b = app.upload(&ann, "b");
    let c = app.upload(&ann, "c");

    like_post(&app.state.store, &bob.id, &a.id).unwrap();
    like_post(&app.state.store, &bob.id, &b.id).unwrap();
    like_post(&app.state.store, &cat.id, &b.id).unwrap();
    like_post(&app.state.store, &cat.id, &c.id).unwrap();

    let order = |sort: &str| {
        let body = text(&app.fragment(&format!("/@ann/?sort={}", sort), &ann));
        let mut ids = vec![&a.id, &b.id, &c.id];
        ids.sort_by_key(|id| position(&body, id));
        ids.into_iter().cloned().collect::<Vec<_>>()
    };

    assert_eq!(order("newest"), vec![c.id.clone(), b.id.clone(), a.id.clone()]);
    assert_eq!(order("oldest"), vec![a.id.clone(), b.id.clone(), c.id.clone()]);
    // a and c tie on one like each, the newer one first
    assert_eq!(order("popular"), vec![b.id.clone(), c.id.clone(), a.id.clone()]);
}

#[test]
fn profile_shows_counts_and_liked_tab() {
    let app = TestApp::new();
    let (ann_user, ann) = app.user("ann");
    let (_, bob) = app.user("bob");
    let post = app.upload(&bob, "bob's photo");
    like_post(&app.state.store, &ann_user.id, &post.id).unwrap();

    let liked = text(&app.fragment("/@ann/?liked=1", &bob));
    assert!(liked.contains(&post.id));

    let bob_profile = text(&app.get("/@bob/", Some(&ann)));
    assert!(bob_profile.contains("<strong>1</strong> posts"));
    assert!(bob_profile.contains("<strong>1</strong> likes"));
    assert!(!bob_profile.contains("Edit profile"));

    let own = text(&app.get("/@ann/", Some(&ann)));
    assert!(own.contains("Edit profile"));

    assert_eq!(*app.get("/@nobody/", Some(&ann)).status(), 404);
    assert_eq!(location(&app.get("/profile/", Some(&ann))), "/@ann/");
}

#[test]
fn profile_edit_updates_fields_and_avatar() {
    let app = TestApp::new();
    let (user, session) = app.user("ann");

    let resp = app.post_multipart(
        "/profile/edit/",
        &session,
        &[("username", "annie"), ("name", "Ann"), ("bio", "<b>hi</b> there"), ("website", "example.com")],
        Some(("me.jpg", "image/jpeg", JPEG)),
    );
    assert_eq!(location(&resp), "/@annie/");

    let updated = app.reload_user(&user.id);
    assert_eq!(updated.username, "annie");
    assert_eq!(updated.name.as_deref(), Some("Ann"));
    assert_eq!(updated.bio.as_deref(), Some("hi there"));
    assert!(updated.avatar().starts_with("/media/avatars/"));

    let profile = text(&app.get("/@annie/", Some(&session)));
    assert!(profile.contains(r#"href="http://example.com""#));
}

#[test]
fn profile_edit_rejects_a_taken_username() {
    let app = TestApp::new();
    let (user, session) = app.user("ann");
    app.user("bob");

    let resp = app.send(
        Method::Post,
        "/profile/edit/",
        &[
            ("cookie", session.as_str()),
            ("hx-request", "true"),
            ("content-type", "application/x-www-form-urlencoded"),
        ],
        b"username=bob".to_vec(),
    );
    assert!(text(&resp).contains("A user with that username already exists."));
    assert_eq!(app.reload_user(&user.id).username, "ann");
}

// === Settings ===

#[test]
fn email_change_requires_reverification() {
    let mut app = TestApp::new();
    let (user, session) = app.user("ann");
    app.user("bob");

    let resp = app.post_form("/profile/settings/", Some(&session), &[("email", "bob@example.com")]);
    assert!(text(&resp).contains("This email is already taken."));

    let resp = app.post_form("/profile/settings/", Some(&session), &[("email", "new@example.com")]);
    assert_eq!(location(&resp), "/profile/settings/");
    let updated = app.reload_user(&user.id);
    assert_eq!(updated.email, "new@example.com");
    assert!(!updated.email_verified);

    app.get("/profile/verification_code/?email=new%40example.com", Some(&session));
    let code = app.mailed_code();
    let resp = app.post_form("/profile/settings/", Some(&session), &[("code", code.as_str())]);
    assert_eq!(location(&resp), "/profile/settings/");
    assert!(app.reload_user(&user.id).email_verified);
}

#[test]
fn settings_toggles_and_birthday() {
    let app = TestApp::new();
    let (user, session) = app.user("ann");

    let resp = app.post_form("/profile/settings/", Some(&session), &[("birthday", "31/12/1999")]);
    assert!(text(&resp).contains("Enter a valid date."));

    let resp = app.post_form("/profile/settings/", Some(&session), &[("birthday", "1999-12-31")]);
    assert_eq!(location(&resp), "/profile/settings/");

    let resp = app.post_form("/profile/settings/", Some(&session), &[("notifications", "off")]);
    assert_eq!(*resp.status(), 200);
    assert!(resp.body().is_empty());

    let resp = app.get("/profile/settings/?darkmode=true", Some(&session));
    assert_eq!(*resp.status(), 200);

    let updated = app.reload_user(&user.id);
    assert_eq!(updated.birthday.unwrap().to_string(), "1999-12-31");
    assert!(!updated.notifications);
    assert!(updated.darkmode);

    let page = text(&app.get("/profile/settings/", Some(&session)));
    assert!(page.contains(r#"<html lang="en" class="dark">"#));
}

// === Account deletion ===

#[test]
fn deleting_an_account_keeps_posts_without_author() {
    let app = TestApp::new();
    let (ann_user, ann) = app.user("ann");
    let (_, bob) = app.user("bob");
    let post = app.upload(&ann, "legacy");
    like_post(&app.state.store, &ann_user.id, &post.id).unwrap();

    let confirm = text(&app.get("/profile/delete/", Some(&ann)));
    assert!(confirm.contains("ann"));

    let resp = app.post_form("/profile/delete/", Some(&ann), &[]);
    assert_eq!(location(&resp), "/login/");

    let orphan = db::get_post(&app.state.store, &post.id).unwrap().unwrap();
    assert!(orphan.author_id.is_none());
    assert_eq!(like_count(&app.state.store, &post.id).unwrap(), 0);
    assert!(db::find_user_by_username(&app.state.store, "ann").unwrap().is_none());

    assert_eq!(location(&app.get("/", Some(&ann))), "/login/");
    let page = text(&app.get(&format!("/post/{}/", post.id), Some(&bob)));
    assert!(page.contains("Deleted user"));
}

// === Admin and assets ===

#[test]
fn admin_dashboard_is_staff_only() {
    let app = TestApp::new();
    let (_, ann) = app.user("ann");
    app.upload(&ann, "photo");

    assert_eq!(location(&app.get("/admin/", Some(&ann))), "/login/?next=%2Fadmin%2F");

    let admin = snapbord::config::AdminBootstrap {
        username: "root".to_string(),
        password: PASSWORD.to_string(),
        email: "root@example.com".to_string(),
    };
    db::bootstrap_admin(&app.state.store, &admin).unwrap();
    let resp = app.post_form("/accounts/login/", None, &[("login", "root"), ("password", PASSWORD)]);
    let root = session_from(&resp);

    let body = text(&app.get("/admin/", Some(&root)));
    assert!(body.contains("2 users, 1 posts"));
    assert!(body.contains("ann@example.com"));
}

#[test]
fn static_assets_and_unknown_routes() {
    let app = TestApp::new();

    let resp = app.get("/static/images/avatar.svg", None);
    assert_eq!(*resp.status(), 200);
    assert_eq!(resp.header("content-type").and_then(|h| h.as_str()), Some("image/svg+xml"));

    assert_eq!(*app.get("/static/missing.css", None).status(), 404);
    assert_eq!(*app.get("/no/such/page/", None).status(), 404);
    assert_eq!(location(&app.get("/explore", None)), "/explore/");
}
