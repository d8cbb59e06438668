//! Golden test vectors for deterministic verification.
//!
//! Peers written in other languages must produce exactly these bytes.

use syncbridge_core::canonical::canonical_identity_bytes;
use syncbridge_core::{tree, CipherKind, CipherMaterial, CommitAction, Value};

/// Credentials used by the cipher vectors.
pub const VECTOR_KEY: &str = "ThisIsSecretKey";
pub const VECTOR_IDENTIFIER: &str = "ThisIsConnectorId";

/// An XML tree vector.
#[derive(Debug, Clone)]
pub struct TreeVector {
    pub name: &'static str,
    pub value: Value,
    pub expected_xml: &'static str,
}

/// An envelope cipher vector.
#[derive(Debug, Clone)]
pub struct CipherVector {
    pub name: &'static str,
    pub kind: CipherKind,
    pub plaintext: &'static [u8],
    pub expected_base64: &'static str,
}

/// A commit identity vector.
#[derive(Debug, Clone)]
pub struct IdentityVector {
    pub name: &'static str,
    pub object_type: &'static str,
    pub ids: &'static [&'static str],
    pub action: CommitAction,
    pub expected_hex: &'static str,
}

pub fn tree_vectors() -> Vec<TreeVector> {
    vec![
        TreeVector {
            name: "flat map with every scalar kind",
            value: Value::from_pairs([
                ("name", Value::from("Acme")),
                ("count", Value::from(42)),
                ("active", Value::from(true)),
                ("parent", Value::Null),
            ]),
            expected_xml: concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<object-tree>",
                "<string-name>QWNtZQ==</string-name>",
                "<int-count>NDI=</int-count>",
                "<bool-active>MQ==</bool-active>",
                "<null-parent/>",
                "</object-tree>"
            ),
        },
        TreeVector {
            name: "list at the root",
            value: Value::List(vec![Value::from("a"), Value::from(2)]),
            expected_xml: concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<array-tree>",
                "<string-0>YQ==</string-0>",
                "<int-1>Mg==</int-1>",
                "</array-tree>"
            ),
        },
        TreeVector {
            name: "empty containers",
            value: Value::from_pairs([
                ("tags", Value::List(vec![])),
                ("extra", Value::empty_map()),
            ]),
            expected_xml: concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<object-tree>",
                "<array-tags/>",
                "<object-extra/>",
                "</object-tree>"
            ),
        },
        TreeVector {
            name: "key outside the element name alphabet",
            value: Value::from_pairs([("a b", Value::from("x"))]),
            expected_xml: concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<object-tree>",
                r#"<string key="YSBi">eA==</string>"#,
                "</object-tree>"
            ),
        },
    ]
}

pub fn cipher_vectors() -> Vec<CipherVector> {
    vec![
        CipherVector {
            name: "AES-256-CBC short text",
            kind: CipherKind::Aes256Cbc,
            plaintext: b"hello syncbridge",
            expected_base64: "KChjFxZHFhJAHGnLVvQ/MJbBQQ+rzMd1mrn1eUwCZ4o=",
        },
        CipherVector {
            name: "AES-128-CBC short text",
            kind: CipherKind::Aes128Cbc,
            plaintext: b"hello syncbridge",
            expected_base64: "Za4vH3fEiOc/B+iwew3G3BDEsnCbG0kC4XgHrByUOsM=",
        },
        CipherVector {
            name: "AES-256-CBC empty payload",
            kind: CipherKind::Aes256Cbc,
            plaintext: b"",
            expected_base64: "4CStQeRnqanWcCfwzQmqAQ==",
        },
    ]
}

pub fn identity_vectors() -> Vec<IdentityVector> {
    vec![
        IdentityVector {
            name: "single id update",
            object_type: "Product",
            ids: &["12"],
            action: CommitAction::Update,
            expected_hex: "836750726f647563748162313266757064617465",
        },
        IdentityVector {
            name: "two ids delete",
            object_type: "T",
            ids: &["1", "2"],
            action: CommitAction::Delete,
            expected_hex: "83615482613161326664656c657465",
        },
    ]
}

/// Check every vector. Returns `(name, passed, detail)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();

    for vector in tree_vectors() {
        let outcome = tree::encode(&vector.value).and_then(|xml| {
            let back = tree::decode(&xml)?;
            Ok((xml, back))
        });
        let (passed, detail) = match outcome {
            Ok((xml, back)) => (
                xml == vector.expected_xml && back == vector.value,
                xml,
            ),
            Err(e) => (false, e.to_string()),
        };
        results.push((vector.name.to_string(), passed, detail));
    }

    for vector in cipher_vectors() {
        let material = CipherMaterial::derive(vector.kind, VECTOR_KEY, VECTOR_IDENTIFIER);
        let (passed, detail) = match material.encrypt(vector.plaintext) {
            Ok(encoded) => (encoded == vector.expected_base64, encoded),
            Err(e) => (false, e.to_string()),
        };
        results.push((vector.name.to_string(), passed, detail));
    }

    for vector in identity_vectors() {
        let ids: Vec<String> = vector.ids.iter().map(|id| id.to_string()).collect();
        let encoded = hex::encode(canonical_identity_bytes(vector.object_type, &ids, vector.action));
        results.push((
            vector.name.to_string(),
            encoded == vector.expected_hex,
            encoded,
        ));
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_pass() {
        for (name, passed, detail) in verify_all_vectors() {
            assert!(passed, "vector {:?} failed: {}", name, detail);
        }
    }

    #[test]
    fn test_cipher_vectors_decrypt() {
        for vector in cipher_vectors() {
            let material = CipherMaterial::derive(vector.kind, VECTOR_KEY, VECTOR_IDENTIFIER);
            assert_eq!(
                material.decrypt(vector.expected_base64).unwrap(),
                vector.plaintext,
                "{}",
                vector.name
            );
        }
    }
}
