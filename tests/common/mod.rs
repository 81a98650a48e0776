use std::fs;
use std::path::PathBuf;

use base64::Engine as _;
use tempfile::TempDir;
use url::Url;

use native_oidc::config::ClientConfiguration;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Discovery document whose endpoints live on `base_url`.
#[allow(dead_code)]
pub fn discovery_body(base_url: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": base_url,
        "authorization_endpoint": format!("{}/authorize", base_url),
        "token_endpoint": format!("{}/token", base_url),
        "jwks_uri": format!("{}/jwks", base_url),
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256"]
    })
}

/// Unsigned compact JWT carrying `nonce`.
#[allow(dead_code)]
pub fn make_id_token(nonce: &str) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let payload = serde_json::json!({
        "iss": "https://idp.example.com/",
        "sub": "user-1",
        "aud": "https://rp.example.com/notes",
        "nonce": nonce,
    });
    format!(
        "{}.{}.{}",
        engine.encode(br#"{"alg":"none","typ":"JWT"}"#),
        engine.encode(payload.to_string()),
        engine.encode("signature")
    )
}

/// Client configuration whose authorization server and resource are served
/// by the mock server at `server_uri`.
#[allow(dead_code)]
pub fn client_config_for(server_uri: &str) -> ClientConfiguration {
    let base = Url::parse(server_uri).expect("valid server uri");
    ClientConfiguration {
        client_id: "https://rp.example.com/notes".to_string(),
        authorization_server_url: base.clone(),
        native_redirect_uri: "com.example.notes:/oauth2redirect".to_string(),
        web_redirect_uri: "https://rp.example.com/login/oauth2/code/eid".to_string(),
        resource_url: base.join("api/notes").expect("valid resource url"),
    }
}

/// Query parameter `name` of `url`.
#[allow(dead_code)]
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
