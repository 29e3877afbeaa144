//! Push payload decoding, shared by all providers

use serde_json::Value;

use crate::error::HookError;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Name of the form field holding the JSON payload in url-encoded deliveries.
const FORM_PAYLOAD_FIELD: &str = "payload";

/// The part of a push notification needed to find and deploy a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPush {
    pub clone_url: String,
    pub commit_hash: String,
    pub branch: String,
}

/// How the JSON payload was carried in the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Form,
    /// Body taken as JSON without looking at the content type.
    Raw,
}

impl BodyEncoding {
    pub fn progress_line(&self) -> Option<&'static str> {
        match self {
            BodyEncoding::Json => Some("Received JSON data in body."),
            BodyEncoding::Form => Some("Received URL-encoded form data in body."),
            BodyEncoding::Raw => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayloadBody {
    pub encoding: BodyEncoding,
    pub data: Vec<u8>,
}

impl PayloadBody {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Media type without parameters, lowercased: `Application/JSON; charset=utf-8` -> `application/json`.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Pick the JSON payload out of the body according to the declared content type.
pub fn negotiate_body(content_type: Option<&str>, body: &[u8]) -> Result<PayloadBody, HookError> {
    let declared = content_type.unwrap_or_default();
    match media_type(declared).as_str() {
        JSON_CONTENT_TYPE => Ok(PayloadBody {
            encoding: BodyEncoding::Json,
            data: body.to_vec(),
        }),
        FORM_CONTENT_TYPE => {
            let data = url::form_urlencoded::parse(body)
                .find(|(key, _)| key == FORM_PAYLOAD_FIELD)
                .map(|(_, value)| value.into_owned().into_bytes())
                .unwrap_or_default();
            Ok(PayloadBody {
                encoding: BodyEncoding::Form,
                data,
            })
        }
        _ => Err(HookError::UnsupportedContentType {
            content_type: declared.to_string(),
        }),
    }
}

/// Branch name from a ref such as `refs/heads/feature/x`: the first two
/// segments are dropped and the rest is kept as-is.
pub fn branch_from_ref(git_ref: &str) -> Option<&str> {
    let mut segments = git_ref.splitn(3, '/');
    segments.next()?;
    segments.next()?;
    segments.next().filter(|branch| !branch.is_empty())
}

/// Decode the JSON payload and pull out clone URL, commit hash and branch.
/// `clone_url_pointer` is a JSON pointer since providers disagree on the field.
pub fn parse_push(data: &[u8], clone_url_pointer: &str) -> Result<NormalizedPush, HookError> {
    let payload: Value = serde_json::from_slice(data)
        .map_err(|_| HookError::InvalidPayload("no JSON?".to_string()))?;
    if !(payload.is_object() || payload.is_array()) {
        return Err(HookError::InvalidPayload("no JSON?".to_string()));
    }

    let clone_url = string_at(&payload, clone_url_pointer)?;
    let commit_hash = string_at(&payload, "/after")?;
    let git_ref = string_at(&payload, "/ref")?;

    let branch = branch_from_ref(&git_ref)
        .ok_or_else(|| HookError::InvalidRef(git_ref.clone()))?
        .to_string();

    Ok(NormalizedPush {
        clone_url,
        commit_hash,
        branch,
    })
}

fn string_at(payload: &Value, pointer: &str) -> Result<String, HookError> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            let field = pointer.trim_start_matches('/').replace('/', ".");
            HookError::InvalidPayload(format!("missing {} field", field))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GITEA_BODY: &str = r#"{"repository":{"clone_url":"https://git.example.com/a/b.git"},"after":"deadbeef","ref":"refs/heads/main"}"#;

    #[test]
    fn branch_keeps_everything_after_two_segments() {
        assert_eq!(branch_from_ref("refs/heads/main"), Some("main"));
        assert_eq!(branch_from_ref("refs/heads/feature/x"), Some("feature/x"));
        assert_eq!(branch_from_ref("refs/tags/v1.0.0"), Some("v1.0.0"));
    }

    #[test]
    fn branch_requires_two_separators() {
        assert_eq!(branch_from_ref("main"), None);
        assert_eq!(branch_from_ref("heads/main"), None);
        assert_eq!(branch_from_ref("refs/heads/"), None);
        assert_eq!(branch_from_ref(""), None);
    }

    #[test]
    fn parses_gitea_style_payload() {
        let push = parse_push(GITEA_BODY.as_bytes(), "/repository/clone_url").unwrap();
        assert_eq!(
            push,
            NormalizedPush {
                clone_url: "https://git.example.com/a/b.git".into(),
                commit_hash: "deadbeef".into(),
                branch: "main".into(),
            }
        );
    }

    #[test]
    fn parses_gitlab_style_payload() {
        let body = r#"{"repository":{"url":"git@gitlab.example.com:a/b.git"},"after":"0123abc","ref":"refs/heads/develop"}"#;
        let push = parse_push(body.as_bytes(), "/repository/url").unwrap();
        assert_eq!(push.clone_url, "git@gitlab.example.com:a/b.git");
        assert_eq!(push.branch, "develop");
    }

    #[test]
    fn rejects_non_json_and_scalars() {
        for body in ["not json", "42", "\"string\"", "null", ""] {
            let err = parse_push(body.as_bytes(), "/repository/clone_url").unwrap_err();
            assert!(matches!(err, HookError::InvalidPayload(_)), "body {:?}", body);
        }
    }

    #[test]
    fn missing_fields_are_invalid_payload() {
        let err = parse_push(br#"{"after":"x","ref":"refs/heads/main"}"#, "/repository/clone_url")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid payload (missing repository.clone_url field)."
        );

        let err = parse_push(br#"[1, 2, 3]"#, "/repository/clone_url").unwrap_err();
        assert!(matches!(err, HookError::InvalidPayload(_)));
    }

    #[test]
    fn short_ref_is_invalid_ref() {
        let body = r#"{"repository":{"clone_url":"u"},"after":"c","ref":"main"}"#;
        let err = parse_push(body.as_bytes(), "/repository/clone_url").unwrap_err();
        assert!(matches!(err, HookError::InvalidRef(ref r) if r == "main"));
    }

    #[test]
    fn negotiates_json_with_parameters() {
        let body = negotiate_body(Some("application/json; charset=utf-8"), b"{}").unwrap();
        assert_eq!(body.encoding, BodyEncoding::Json);
        assert_eq!(body.data, b"{}");
    }

    #[test]
    fn negotiates_form_payload_field() {
        let encoded: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("other", "1")
            .append_pair("payload", GITEA_BODY)
            .finish();
        let body = negotiate_body(Some(FORM_CONTENT_TYPE), encoded.as_bytes()).unwrap();
        assert_eq!(body.encoding, BodyEncoding::Form);
        assert_eq!(body.data, GITEA_BODY.as_bytes());
    }

    #[test]
    fn form_without_payload_field_is_empty() {
        let body = negotiate_body(Some(FORM_CONTENT_TYPE), b"foo=bar").unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        let err = negotiate_body(Some("text/plain"), b"{}").unwrap_err();
        assert_eq!(err.to_string(), "Don't know what to do with text/plain content type.");
        assert!(matches!(
            negotiate_body(None, b"{}"),
            Err(HookError::UnsupportedContentType { .. })
        ));
    }
}
