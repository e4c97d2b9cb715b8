//! Agent identity normalization.
//!
//! Every source spells agent names differently ("EGLP-habdelaziz" vs
//! "EGLP-HABdelaziz "). Joining uses uppercase + trim; two names that agree
//! under this rule are the same agent.

/// Canonical join key for an agent name
pub fn normalize(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Null-preserving form of [`normalize`]
pub fn normalize_opt(name: Option<&str>) -> Option<String> {
    name.map(normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_and_trim() {
        assert_eq!(normalize("  EGLP-habdelaziz "), "EGLP-HABDELAZIZ");
        assert_eq!(normalize("EGLP-HABdelaziz"), "EGLP-HABDELAZIZ");
    }

    #[test]
    fn test_idempotent() {
        for raw in ["alice", " Bob ", "ÉLODIE", "eglp-x\t", "", "  "] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_null_passthrough() {
        assert_eq!(normalize_opt(None), None);
        assert_eq!(normalize_opt(Some(" a ")), Some("A".to_string()));
    }
}
