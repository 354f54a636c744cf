//! Stable identifier minting
//!
//! Stable ids are UUIDs. Freshly minted ids are v7 so they sort by creation
//! time; client-supplied ids are accepted when they parse as any UUID and are
//! normalised to the lowercase hyphenated form.

use serde_json::Value;
use uuid::Uuid;

/// Field names a client may echo a stable id under, besides `id`
pub const CLIENT_ID_FIELDS: [&str; 3] = ["_id", "clientId", "client_id"];

/// Mint a brand-new stable identifier
pub fn mint_id() -> String {
    Uuid::now_v7().to_string()
}

/// Normalise a client-supplied identifier, `None` if it is not a valid UUID
pub fn normalize_id(raw: &str) -> Option<String> {
    Uuid::parse_str(raw.trim()).ok().map(|uuid| uuid.to_string())
}

/// Check whether a client-supplied identifier is syntactically valid
pub fn is_valid_id(raw: &str) -> bool {
    normalize_id(raw).is_some()
}

/// Mint an identifier, using `seed` when it is a valid identifier
pub fn mint_from_seed(seed: Option<&str>) -> String {
    seed.and_then(normalize_id).unwrap_or_else(mint_id)
}

/// Compare a client-supplied identifier with a stored one
///
/// Stored ids are already normalised; the raw value matches either verbatim
/// or after normalisation.
pub fn same_id(client: &str, stored: &str) -> bool {
    if client == stored {
        return true;
    }
    normalize_id(client).is_some_and(|normalized| normalized == stored)
}

/// Collapse client id fields into `id`, recursively
///
/// An object may carry the id under several names as long as every non-null
/// value names the same id; the `id` value wins when present.
pub fn fold_client_ids(value: &mut Value) -> Result<(), String> {
    match value {
        Value::Object(map) => {
            let had_id = map.contains_key("id");
            let mut chosen = map.remove("id").filter(|v| !v.is_null());
            for field in CLIENT_ID_FIELDS {
                let Some(alias) = map.remove(field).filter(|v| !v.is_null()) else {
                    continue;
                };
                match &chosen {
                    None => chosen = Some(alias),
                    Some(current) if ids_agree(current, &alias) => {}
                    Some(current) => return Err(format!("conflicting ids {} and {} ({})", current, alias, field)),
                }
            }
            match chosen {
                Some(id) => {
                    map.insert("id".to_string(), id);
                }
                None if had_id => {
                    map.insert("id".to_string(), Value::Null);
                }
                None => {}
            }
            map.values_mut().try_for_each(fold_client_ids)
        }
        Value::Array(items) => items.iter_mut().try_for_each(fold_client_ids),
        _ => Ok(()),
    }
}

fn ids_agree(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a == b || normalize_id(a).is_some_and(|n| normalize_id(b).as_deref() == Some(n.as_str())),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mint_id_is_valid_and_unique() {
        let a = mint_id();
        let b = mint_id();
        assert!(is_valid_id(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalize_uppercase() {
        let id = "0192F3A1-7C3B-7D4E-9F00-0123456789AB";
        assert_eq!(
            normalize_id(id),
            Some("0192f3a1-7c3b-7d4e-9f00-0123456789ab".to_string())
        );
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!is_valid_id("1"));
        assert!(!is_valid_id("channel-a"));
        assert!(!is_valid_id(""));
    }

    #[test]
    fn test_mint_from_seed() {
        let seed = "0192f3a1-7c3b-7d4e-9f00-0123456789ab";
        assert_eq!(mint_from_seed(Some(seed)), seed);

        let fresh = mint_from_seed(Some("not-a-uuid"));
        assert!(is_valid_id(&fresh));
        assert_ne!(fresh, "not-a-uuid");

        assert!(is_valid_id(&mint_from_seed(None)));
    }

    #[test]
    fn test_fold_client_ids_accepts_agreeing_duplicates() {
        let id = "0192f3a1-7c3b-7d4e-9f00-0123456789ab";
        let mut value = json!({
            "channels": [
                { "id": id, "_id": id.to_uppercase(), "name": "LinkedIn" },
                { "clientId": id, "id": null, "name": "Blog" },
                { "name": "Podcast" }
            ]
        });
        fold_client_ids(&mut value).unwrap();

        let channels = value["channels"].as_array().unwrap();
        assert_eq!(channels[0], json!({ "id": id, "name": "LinkedIn" }));
        assert_eq!(channels[1], json!({ "id": id, "name": "Blog" }));
        assert_eq!(channels[2], json!({ "name": "Podcast" }));
    }

    #[test]
    fn test_fold_client_ids_rejects_conflicts() {
        let mut value = json!([{ "id": "a", "client_id": "b", "name": "x" }]);
        let err = fold_client_ids(&mut value).unwrap_err();
        assert!(err.contains("conflicting ids"));
    }

    #[test]
    fn test_same_id() {
        let stored = "0192f3a1-7c3b-7d4e-9f00-0123456789ab";
        assert!(same_id(stored, stored));
        assert!(same_id("0192F3A1-7C3B-7D4E-9F00-0123456789AB", stored));
        assert!(!same_id("a", stored));
        assert!(same_id("a", "a"));
    }
}
