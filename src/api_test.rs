use serde_json::json;

use super::*;

#[test]
fn save_request_omits_missing_file_path() {
    let request = SaveCodeRequest {
        code: "<html></html>".to_owned(),
        project_path: "/w/site".to_owned(),
        file_path: None,
        stack: Stack::HtmlTailwind,
    };
    let value = serde_json::to_value(&request).expect("serialize");
    assert_eq!(value, json!({ "code": "<html></html>", "project_path": "/w/site", "stack": "html_tailwind" }));
}

#[test]
fn save_request_carries_target_file() {
    let request = SaveCodeRequest {
        code: String::new(),
        project_path: "/w/site".to_owned(),
        file_path: Some("src/App.tsx".to_owned()),
        stack: Stack::ReactTailwind,
    };
    let value = serde_json::to_value(&request).expect("serialize");
    assert_eq!(value["file_path"], "src/App.tsx");
    assert_eq!(value["stack"], "react_tailwind");
}

#[test]
fn parse_successful_save() {
    let body = json!({
        "success": true,
        "file_path": "/w/site/index.html",
        "rel_path": "index.html",
        "url_path": "/index.html",
        "message": "Saved"
    })
    .to_string();

    let result = parse_save_response(&body).expect("parse");
    assert_eq!(result.file_path, "/w/site/index.html");
    assert_eq!(result.rel_path, "index.html");
    assert_eq!(result.url_path, "/index.html");
    assert_eq!(result.message, "Saved");
}

#[test]
fn parse_refusal_uses_detail() {
    let body = json!({ "success": false, "detail": "path escapes project" }).to_string();
    let err = parse_save_response(&body).expect_err("refused");
    assert!(matches!(err, ApiError::Rejected(reason) if reason == "path escapes project"));
}

#[test]
fn parse_without_file_path_is_an_error() {
    let body = json!({ "success": true }).to_string();
    assert!(matches!(parse_save_response(&body), Err(ApiError::Parse(_))));
}

#[test]
fn parse_garbage_is_an_error() {
    assert!(matches!(parse_save_response("<html>502</html>"), Err(ApiError::Parse(_))));
}

#[test]
fn endpoint_joins_without_double_slash() {
    let client = ApiClient::new("http://127.0.0.1:7001/").expect("client");
    assert_eq!(client.endpoint("/save-code"), "http://127.0.0.1:7001/save-code");
}
