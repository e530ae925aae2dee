//! Ownership tags attached to inventory IPs.
//!
//! A service tag encodes which Service owns an address:
//! `lb.stahl.io/service=<cluster>/<namespace>/<name>`. An address may carry
//! one tag per owning Service. Machine and egress markers mark addresses
//! that must never be handed to a Service.

pub const TAG_SERVICE_PREFIX: &str = "lb.stahl.io/service";
pub const TAG_MACHINE_PREFIX: &str = "machine.stahl.io/machine";
pub const TAG_EGRESS_PREFIX: &str = "network.stahl.io/egress";

pub fn service_tag(cluster_id: &str, namespace: &str, name: &str) -> String {
    format!("{TAG_SERVICE_PREFIX}={cluster_id}/{namespace}/{name}")
}

pub fn is_machine_tag(tag: &str) -> bool {
    tag.starts_with(TAG_MACHINE_PREFIX)
}

pub fn is_egress_tag(tag: &str) -> bool {
    tag.starts_with(TAG_EGRESS_PREFIX)
}

/// Whether a tag marks ownership by any Service of the given cluster.
pub fn is_cluster_service_tag(tag: &str, cluster_id: &str) -> bool {
    tag.starts_with(&format!("{TAG_SERVICE_PREFIX}={cluster_id}/"))
}

/// Remove every occurrence of `tag` and report whether the address is now
/// unowned. Duplicated tags count as a single owner.
pub fn remove_tag(tags: &[String], tag: &str) -> (Vec<String>, bool) {
    let remaining: Vec<String> = tags.iter().filter(|t| t.as_str() != tag).cloned().collect();
    let last = remaining.is_empty();
    (remaining, last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest(
        tags,
        tag,
        expected,
        case(
            vec!["t1".to_string(), "t2".to_string()],
            "t1",
            (vec!["t2".to_string()], false),
        ),
        case(
            vec!["t1".to_string()],
            "t1",
            (vec![], true),
        ),
        case(
            vec!["t1".to_string(), "t1".to_string()],
            "t1",
            (vec![], true),
        ),
        case(
            vec![],
            "t1",
            (vec![], true),
        ),
    )]
    fn works_remove_tag(tags: Vec<String>, tag: &str, expected: (Vec<String>, bool)) {
        let (remaining, last) = remove_tag(&tags, tag);
        assert_eq!(remaining, expected.0);
        assert_eq!(last, expected.1);
    }

    #[test]
    fn service_tag_encodes_cluster_namespace_and_name() {
        let tag = service_tag("cluster-a", "default", "web");
        assert_eq!(tag, "lb.stahl.io/service=cluster-a/default/web");
        assert!(is_cluster_service_tag(&tag, "cluster-a"));
        assert!(!is_cluster_service_tag(&tag, "cluster-b"));
    }

    #[rstest(
        tag,
        machine,
        egress,
        case("machine.stahl.io/machine=abcd", true, false),
        case("network.stahl.io/egress=internet", false, true),
        case("lb.stahl.io/service=c/ns/svc", false, false),
    )]
    fn works_tag_markers(tag: &str, machine: bool, egress: bool) {
        assert_eq!(is_machine_tag(tag), machine);
        assert_eq!(is_egress_tag(tag), egress);
    }
}
