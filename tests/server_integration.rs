//! End-to-end tests for the HTTP API against a temporary SQLite database.

use learnbase::config::Config;
use learnbase::server::run_server;
use serde_json::{json, Value};
use tempfile::TempDir;

fn test_config_with_port(tmp: &TempDir, port: u16) -> Config {
    let db_path = tmp.path().join("lbase.sqlite");
    let config_content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:{}"

[import]
base_dir = "{}"
"#,
        db_path.display(),
        port,
        tmp.path().display()
    );
    toml::from_str(&config_content).unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start a server on a free port; returns its base URL and the temp dir
/// that owns the database.
async fn start_server() -> (String, TempDir) {
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();
    let cfg = test_config_with_port(&tmp, port);

    tokio::spawn(async move {
        run_server(&cfg).await.ok();
    });
    wait_for_server(port).await;

    (format!("http://127.0.0.1:{}", port), tmp)
}

fn doc(title: &str, body: &str) -> String {
    format!(
        "---\nmodule: ml\nsubcategory: optimization\ntitle: {}\n---\n{}\n",
        title, body
    )
}

#[tokio::test]
async fn test_health() {
    let (base, _tmp) = start_server().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_import_text_create_skip_overwrite() {
    let (base, _tmp) = start_server().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/import-md/text", base);

    let first: Value = client
        .post(&url)
        .json(&json!({ "md_text": doc("Momentum", "first") }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["status"], "created");
    assert_eq!(first["title"], "Momentum");
    assert!(first["file_name"].is_null());
    let id = first["id"].as_str().unwrap().to_string();

    let second: Value = client
        .post(&url)
        .json(&json!({ "md_text": doc("Momentum", "second") }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["status"], "skipped");
    assert_eq!(second["id"], id.as_str());

    let third: Value = client
        .post(&url)
        .json(&json!({ "md_text": doc("Momentum", "third"), "overwrite": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(third["status"], "updated");

    let record: Value = client
        .get(format!("{}/api/v1/content/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["body"], "third");
    assert_eq!(record["module"], "ml");
}

#[tokio::test]
async fn test_import_text_validation_failure_is_outcome() {
    let (base, _tmp) = start_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/import-md/text", base))
        .json(&json!({ "md_text": "---\nmodule: ml\n---\nbody" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "failed");
    assert!(body["id"].is_null());
    assert!(body["title"].is_null());
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("subcategory") && error.contains("title"));
}

#[tokio::test]
async fn test_import_text_uses_configured_base_dir() {
    let (base, tmp) = start_server().await;
    std::fs::write(tmp.path().join("curve.svg"), b"<svg/>").unwrap();

    let resp: Value = reqwest::Client::new()
        .post(format!("{}/api/v1/import-md/text", base))
        .json(&json!({ "md_text": doc("Curves", "![](curve.svg)") }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = resp["id"].as_str().unwrap();

    let record: Value = reqwest::get(format!("{}/api/v1/content/{}", base, id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(record["images"]["curve"]
        .as_str()
        .unwrap()
        .starts_with("data:image/svg+xml;base64,"));
}

#[tokio::test]
async fn test_import_files_multipart() {
    let (base, _tmp) = start_server().await;

    let form = reqwest::multipart::Form::new()
        .part(
            "files",
            reqwest::multipart::Part::text(doc("Adam", "adaptive moments"))
                .file_name("adam.md"),
        )
        .part(
            "files",
            reqwest::multipart::Part::text("---\nmodule: ml\nsubcategory: x\n---\n")
                .file_name("broken.md"),
        )
        .part(
            "files",
            reqwest::multipart::Part::bytes(vec![0xff, 0xfe, 0x00]).file_name("binary.md"),
        )
        .text("overwrite", "false");

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/import-md/files", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["file_name"], "adam.md");
    assert_eq!(results[0]["status"], "created");
    assert_eq!(results[1]["file_name"], "broken.md");
    assert_eq!(results[1]["status"], "failed");
    assert_eq!(results[2]["status"], "failed");
}

#[tokio::test]
async fn test_import_files_requires_files() {
    let (base, _tmp) = start_server().await;
    let form = reqwest::multipart::Form::new().text("overwrite", "true");
    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/import-md/files", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_list_search_and_errors() {
    let (base, _tmp) = start_server().await;
    let client = reqwest::Client::new();

    for (title, body) in [
        ("SGD", "stochastic gradient descent"),
        ("RMSProp", "scaled gradient steps"),
        ("Percentiles", "the 95% interval"),
    ] {
        client
            .post(format!("{}/api/v1/import-md/text", base))
            .json(&json!({ "md_text": doc(title, body) }))
            .send()
            .await
            .unwrap();
    }

    let list: Value = client
        .get(format!("{}/api/v1/content?module=ml&limit=2", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 2);

    let page: Value = client
        .get(format!("{}/api/v1/search?query=GRADIENT&limit=1", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["results"].as_array().unwrap().len(), 1);

    let percent: Value = client
        .get(format!("{}/api/v1/search?query=5%25", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(percent["total_count"], 1);
    assert_eq!(percent["results"][0]["title"], "Percentiles");

    let resp = client
        .get(format!("{}/api/v1/search?query=%20", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{}/api/v1/content/does-not-exist", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_import_single_file_decodes_lossily() {
    let (base, _tmp) = start_server().await;

    let mut bytes = doc("Lasso", "sparse").into_bytes();
    bytes.extend_from_slice(&[0xff, 0xfe]);
    bytes.extend_from_slice(b"weights\n");
    let form = reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(bytes).file_name("lasso.md"))
        .text("overwrite", "false");

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/import-md/file", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["status"], "created");
    assert_eq!(outcome["file_name"], "lasso.md");

    let id = outcome["id"].as_str().unwrap();
    let record: Value = reqwest::get(format!("{}/api/v1/content/{}", base, id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["body"], "sparse\nweights");

    let empty = reqwest::multipart::Form::new().text("overwrite", "true");
    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/import-md/file", base))
        .multipart(empty)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_import_over_http_cannot_inline_files_outside_base_dir() {
    let (base, _tmp) = start_server().await;
    let outside = TempDir::new().unwrap();
    let secret = outside.path().join("secret.png");
    std::fs::write(&secret, b"not for the api").unwrap();

    let body = format!("![secret]({})\n![remote](https://example.com/r.png)", secret.display());
    let resp: Value = reqwest::Client::new()
        .post(format!("{}/api/v1/import-md/text", base))
        .json(&json!({
            "md_text": doc("Leak", &body),
            "base_dir": outside.path(),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["status"], "created");

    let id = resp["id"].as_str().unwrap();
    let record: Value = reqwest::get(format!("{}/api/v1/content/{}", base, id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(record["images"].get("secret").is_none());
    assert_eq!(record["images"]["remote"], "https://example.com/r.png");
}

async fn register_and_login(client: &reqwest::Client, base: &str) -> Value {
    let resp = client
        .post(format!("{}/api/v1/auth/register", base))
        .json(&json!({
            "username": "ada",
            "email": "ada@example.com",
            "password": "analytical engine",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let user: Value = resp.json().await.unwrap();
    assert_eq!(user["username"], "ada");
    assert_eq!(user["email_verified"], false);
    assert!(user.get("password_hash").is_none());

    client
        .post(format!("{}/api/v1/auth/login", base))
        .form(&[("username", "ada"), ("password", "analytical engine")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_auth_register_login_profile() {
    let (base, _tmp) = start_server().await;
    let client = reqwest::Client::new();

    let tokens = register_and_login(&client, &base).await;
    assert_eq!(tokens["token_type"], "bearer");
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    let duplicate = client
        .post(format!("{}/api/v1/auth/register", base))
        .json(&json!({ "username": "ada", "email": "x@example.com", "password": "pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 400);

    let bad_login = client
        .post(format!("{}/api/v1/auth/login", base))
        .form(&[("username", "ada"), ("password", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(bad_login.status(), 401);

    let me: Value = client
        .get(format!("{}/api/v1/auth/me", base))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["username"], "ada");

    let anonymous = client
        .get(format!("{}/api/v1/auth/me", base))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);
    let body: Value = anonymous.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    let refresh_as_access = client
        .get(format!("{}/api/v1/auth/me", base))
        .bearer_auth(&refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(refresh_as_access.status(), 401);

    let profile: Value = client
        .put(format!("{}/api/v1/auth/profile", base))
        .bearer_auth(&access)
        .json(&json!({ "nickname": "Countess", "bio": "first programmer" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile["nickname"], "Countess");
    assert!(profile["avatar_url"].is_null());

    let renewed: Value = client
        .post(format!("{}/api/v1/auth/refresh", base))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let profile: Value = client
        .get(format!("{}/api/v1/auth/profile", base))
        .bearer_auth(renewed["access_token"].as_str().unwrap())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile["bio"], "first programmer");
}

#[tokio::test]
async fn test_auth_reset_and_verify_requests() {
    let (base, _tmp) = start_server().await;
    let client = reqwest::Client::new();
    register_and_login(&client, &base).await;

    for path in ["password/reset/request", "email/verify/request"] {
        for email in ["ada@example.com", "nobody@example.com"] {
            let body: Value = client
                .post(format!("{}/api/v1/auth/{}", base, path))
                .json(&json!({ "email": email }))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(body["status"], "ok");
        }
    }

    let resp = client
        .post(format!("{}/api/v1/auth/password/reset/confirm", base))
        .json(&json!({ "token": "forged", "new_password": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/v1/auth/email/verify/confirm", base))
        .json(&json!({ "token": "forged" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_favorites_lifecycle() {
    let (base, _tmp) = start_server().await;
    let client = reqwest::Client::new();
    let tokens = register_and_login(&client, &base).await;
    let access = tokens["access_token"].as_str().unwrap().to_string();

    let imported: Value = client
        .post(format!("{}/api/v1/import-md/text", base))
        .json(&json!({ "md_text": doc("Nesterov", "look-ahead momentum") }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let content_id = imported["id"].as_str().unwrap().to_string();

    let added = client
        .post(format!("{}/api/v1/auth/favorites", base))
        .bearer_auth(&access)
        .json(&json!({ "content_id": content_id, "note": "exam" }))
        .send()
        .await
        .unwrap();
    assert_eq!(added.status(), 200);
    let added: Value = added.json().await.unwrap();
    assert_eq!(added["note"], "exam");

    let again = client
        .post(format!("{}/api/v1/auth/favorites", base))
        .bearer_auth(&access)
        .json(&json!({ "content_id": content_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 409);

    let listed: Value = client
        .get(format!("{}/api/v1/auth/favorites", base))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let with_content: Value = client
        .get(format!("{}/api/v1/auth/favorites/with-content", base))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(with_content[0]["content"]["title"], "Nesterov");
    assert_eq!(with_content[0]["content_id"], content_id.as_str());

    let deleted: Value = client
        .delete(format!("{}/api/v1/auth/favorites/{}", base, content_id))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], 1);

    let missing = client
        .delete(format!("{}/api/v1/auth/favorites/{}", base, content_id))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let anonymous = client
        .get(format!("{}/api/v1/auth/favorites", base))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);
}
