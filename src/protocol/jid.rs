//! JID part extraction.
//!
//! These helpers split on the first separator only, and [`node`] looks at
//! the full jid rather than the bare one. A resource containing `@` or `/`
//! therefore yields different answers from [`node`] and [`bare_jid`]; callers
//! that persist and re-attach sessions rely on exactly this behavior.

/// Bare jid: everything before the first `/`
pub fn bare_jid(jid: &str) -> &str {
    jid.split_once('/').map_or(jid, |(bare, _)| bare)
}

/// Resource: everything after the first `/`, further slashes kept
pub fn resource(jid: &str) -> Option<&str> {
    jid.split_once('/').map(|(_, resource)| resource)
}

/// Domain: the bare jid without its node part
pub fn domain(jid: &str) -> &str {
    let bare = bare_jid(jid);
    bare.split_once('@').map_or(bare, |(_, domain)| domain)
}

/// Node: everything before the first `@` of the full jid
pub fn node(jid: &str) -> Option<&str> {
    jid.split_once('@').map(|(node, _)| node)
}

/// Build `node@domain[/resource]`
pub fn full_jid(node: &str, domain: &str, resource: Option<&str>) -> String {
    match resource {
        Some(resource) if !resource.is_empty() => format!("{node}@{domain}/{resource}"),
        _ => format!("{node}@{domain}"),
    }
}
