//! Validator identifier canonicalization.
//!
//! Operators name peers by hostname, sometimes short (`node-1`) and
//! sometimes fully qualified (`node-1.cluster.local`). The canonical
//! form is the lowercase first label, so every host has exactly one
//! representation in the validator set, and matching accepts either
//! spelling.

/// Returns the canonical form of an identifier: its lowercase first
/// dot-separated label.
pub fn canonical(id: &str) -> String {
    first_label(id).to_ascii_lowercase()
}

/// The first dot-separated label of an identifier.
pub fn first_label(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

/// True when two identifiers name the same host: equal in full, or
/// equal on their first labels.
pub fn matches(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || first_label(a).eq_ignore_ascii_case(first_label(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_strips_domain() {
        assert_eq!(canonical("node-1.cluster.local"), "node-1");
        assert_eq!(canonical("Node-2"), "node-2");
        assert_eq!(canonical("plain"), "plain");
    }

    #[test]
    fn short_and_qualified_names_interoperate() {
        assert!(matches("node-1", "node-1.cluster.local"));
        assert!(matches("node-1.cluster.local", "node-1"));
        assert!(matches("node-1", "node-1"));
        assert!(!matches("node-1", "node-2.cluster.local"));
    }
}
