//! JSON bodies for the configuration requests sent after an upload.

use serde_json::{Map, Value};

use crate::config::{UID_LENGTH, UID_PLACEHOLDER};
use crate::error::{ProvisionError, ProvisionResult};

/// A bind UID must be exactly six values, each fitting in a byte.
pub fn validate_uid(uid: &[i64]) -> ProvisionResult<()> {
    if uid.len() != UID_LENGTH {
        return Err(ProvisionError::Config(format!(
            "UID must have {} values, got {}",
            UID_LENGTH,
            uid.len()
        )));
    }
    if let Some(bad) = uid.iter().find(|v| !(0..=255).contains(*v)) {
        return Err(ProvisionError::Config(format!(
            "UID values must be 0..255, got {}",
            bad
        )));
    }
    Ok(())
}

/// Serialize `template` and replace every quoted `"$UID6"` with the numeric
/// array, e.g. `{"uid":"$UID6"}` becomes `{"uid":[1,2,3,4,5,6]}`.
pub fn build_bind_body(template: &Value, uid: &[i64]) -> ProvisionResult<Value> {
    validate_uid(uid)?;

    let array = format!(
        "[{}]",
        uid.iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    );
    let raw = serde_json::to_string(template)?.replace(UID_PLACEHOLDER, &array);
    Ok(serde_json::from_str(&raw)?)
}

/// Merge `freq1`/`freq2` into a copy of `base`. Unset frequencies leave the
/// base value untouched.
pub fn build_domain_body(
    base: &Map<String, Value>,
    freq1: Option<i64>,
    freq2: Option<i64>,
) -> Value {
    let mut body = base.clone();
    if let Some(freq) = freq1 {
        body.insert("freq1".to_string(), Value::from(freq));
    }
    if let Some(freq) = freq2 {
        body.insert("freq2".to_string(), Value::from(freq));
    }
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bind_body_replaces_placeholder() {
        let template = json!({"uid": "$UID6", "mode": "bind", "name": "keep $UID6 in text"});
        let body = build_bind_body(&template, &[10, 20, 30, 40, 50, 255]).unwrap();

        assert_eq!(body["uid"], json!([10, 20, 30, 40, 50, 255]));
        assert_eq!(body["mode"], "bind");
        assert_eq!(body["name"], "keep $UID6 in text");
    }

    #[test]
    fn test_bind_body_nested_placeholder() {
        let template = json!({"config": {"uid": "$UID6"}});
        let body = build_bind_body(&template, &[0, 0, 0, 0, 0, 1]).unwrap();
        assert_eq!(body["config"]["uid"], json!([0, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn test_uid_validation() {
        assert!(validate_uid(&[1, 2, 3, 4, 5, 6]).is_ok());
        assert!(validate_uid(&[1, 2, 3]).is_err());
        assert!(validate_uid(&[1, 2, 3, 4, 5, 256]).is_err());
        assert!(validate_uid(&[-1, 2, 3, 4, 5, 6]).is_err());
        assert!(build_bind_body(&json!({}), &[]).is_err());
    }

    #[test]
    fn test_domain_body_merge() {
        let mut base = Map::new();
        base.insert("domain".into(), json!(1));
        base.insert("freq1".into(), json!(0));

        let body = build_domain_body(&base, Some(915), None);
        assert_eq!(body, json!({"domain": 1, "freq1": 915}));

        let body = build_domain_body(&base, None, Some(868));
        assert_eq!(body, json!({"domain": 1, "freq1": 0, "freq2": 868}));
    }
}
