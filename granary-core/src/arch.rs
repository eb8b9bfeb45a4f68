//! Debian architecture matching
//!
//! Source packages declare the architectures they build for; the field may
//! name concrete architectures (`amd64`), the wildcards `any`/`all`, or
//! tuple wildcards such as `linux-any`. Matching expands names into
//! (abi, libc, os, cpu) tuples the way dpkg does and compares them
//! component-wise, with `any` matching every value.

/// Known architecture names and their dpkg tuples.
const ARCH_TUPLES: &[(&str, [&str; 4])] = &[
    ("amd64", ["base", "gnu", "linux", "amd64"]),
    ("arm64", ["base", "gnu", "linux", "arm64"]),
    ("armel", ["eabi", "gnu", "linux", "arm"]),
    ("armhf", ["eabihf", "gnu", "linux", "arm"]),
    ("i386", ["base", "gnu", "linux", "i386"]),
    ("loong64", ["base", "gnu", "linux", "loong64"]),
    ("mips64el", ["abi64", "gnu", "linux", "mips64el"]),
    ("ppc64el", ["base", "gnu", "linux", "ppc64el"]),
    ("riscv64", ["base", "gnu", "linux", "riscv64"]),
    ("s390x", ["base", "gnu", "linux", "s390x"]),
    ("x32", ["x32", "gnu", "linux", "amd64"]),
    ("hurd-amd64", ["base", "gnu", "hurd", "amd64"]),
    ("hurd-i386", ["base", "gnu", "hurd", "i386"]),
    ("kfreebsd-amd64", ["base", "gnu", "kfreebsd", "amd64"]),
    ("kfreebsd-i386", ["base", "gnu", "kfreebsd", "i386"]),
    ("musl-linux-amd64", ["base", "musl", "linux", "amd64"]),
    ("musl-linux-arm64", ["base", "musl", "linux", "arm64"]),
];

/// Whether a declared architecture entry covers a concrete target.
///
/// `declared` comes from a package's architecture list and may be a
/// wildcard; `target` is a concrete architecture name. `all` never matches
/// a concrete architecture and wildcards never match `all`.
pub fn arch_matches(declared: &str, target: &str) -> bool {
    if declared == target {
        return true;
    }
    if declared == "all" || target == "all" {
        return false;
    }
    let Some(target_tuple) = tuple_of(target) else {
        return false;
    };
    let Some(pattern) = wildcard_tuple(declared) else {
        return false;
    };
    pattern
        .iter()
        .zip(target_tuple.iter())
        .all(|(p, t)| *p == "any" || p == t)
}

/// Whether any entry of a declared architecture list covers the target.
pub fn any_matches(declared: &[String], target: &str) -> bool {
    declared.iter().any(|entry| arch_matches(entry, target))
}

fn tuple_of(name: &str) -> Option<&'static [&'static str; 4]> {
    ARCH_TUPLES.iter().find(|(n, _)| *n == name).map(|(_, t)| t)
}

/// Expand a (possibly partial) wildcard into a full tuple pattern.
///
/// Wildcards shorter than four components are right-aligned against the
/// (abi, libc, os, cpu) tuple and padded with `any`, so `linux-any` becomes
/// `any-any-linux-any`.
fn wildcard_tuple(name: &str) -> Option<[&str; 4]> {
    if name == "any" {
        return Some(["any"; 4]);
    }
    if !name.contains("any") {
        return tuple_of(name).copied();
    }
    let parts: Vec<&str> = name.split('-').collect();
    if parts.is_empty() || parts.len() > 4 {
        return None;
    }
    let mut tuple = ["any"; 4];
    tuple[4 - parts.len()..].copy_from_slice(&parts);
    Some(tuple)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_names_match_themselves_only() {
        assert!(arch_matches("amd64", "amd64"));
        assert!(!arch_matches("amd64", "arm64"));
    }

    #[test]
    fn any_matches_every_concrete_architecture_but_not_all() {
        assert!(arch_matches("any", "amd64"));
        assert!(arch_matches("any", "riscv64"));
        assert!(!arch_matches("any", "all"));
        assert!(!arch_matches("all", "amd64"));
        assert!(arch_matches("all", "all"));
    }

    #[test]
    fn os_wildcards_respect_the_os_component() {
        assert!(arch_matches("linux-any", "amd64"));
        assert!(arch_matches("linux-any", "musl-linux-amd64"));
        assert!(!arch_matches("linux-any", "kfreebsd-amd64"));
        assert!(arch_matches("kfreebsd-any", "kfreebsd-i386"));
        assert!(!arch_matches("kfreebsd-any", "i386"));
    }

    #[test]
    fn cpu_wildcards_respect_the_cpu_component() {
        assert!(arch_matches("any-amd64", "amd64"));
        assert!(arch_matches("any-amd64", "musl-linux-amd64"));
        assert!(!arch_matches("any-amd64", "arm64"));
        assert!(arch_matches("any-arm", "armhf"));
        assert!(arch_matches("any-arm", "armel"));
    }

    #[test]
    fn libc_wildcards_respect_the_libc_component() {
        assert!(arch_matches("gnu-linux-any", "amd64"));
        assert!(!arch_matches("gnu-linux-any", "musl-linux-amd64"));
        assert!(arch_matches("musl-linux-any", "musl-linux-arm64"));
    }

    #[test]
    fn unknown_names_only_match_exactly() {
        assert!(!arch_matches("linux-any", "sparc"));
        assert!(!arch_matches("sparc", "amd64"));
        assert!(arch_matches("sparc", "sparc"));
    }

    #[test]
    fn list_matching_selects_suite_architectures() {
        let declared = vec!["any".to_string()];
        assert!(any_matches(&declared, "amd64"));
        assert!(any_matches(&declared, "arm64"));
        assert!(!any_matches(&declared, "all"));

        let declared = vec!["amd64".to_string(), "all".to_string()];
        assert!(any_matches(&declared, "amd64"));
        assert!(!any_matches(&declared, "arm64"));
        assert!(any_matches(&declared, "all"));
    }
}
