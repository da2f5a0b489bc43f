//! Queue name normalization
//!
//! Workflow and transition names become lowercase, dot-delimited slugs:
//!
//! - `MediaWorkflow` becomes `media`
//! - `asset_flow` becomes `asset`
//! - `AssetFlow` becomes `assetflow`, since `flow` is not a segment of its own
//! - `Send Email!` becomes `send.email`

/// Transport schemes backed by one shared relational/durable store
pub const SHARED_STORE_SCHEMES: [&str; 5] = ["doctrine", "postgres", "postgresql", "mysql", "sqlite"];

/// Table holding every queue of a shared store
pub const SHARED_STORE_TABLE: &str = "messenger_messages";

/// Normalize a workflow or transition name into a slug.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single `.` and trims dots at both ends. A trailing `workflow`, or a trailing
/// `flow` segment, is then removed until the slug no longer changes, which
/// makes the function idempotent.
///
/// A `flow` glued to the previous word is kept, so `DataFlow` becomes
/// `dataflow` rather than `data`; a plain `(workflow|flow)$` strip would give
/// the latter.
pub fn normalize_slug(name: &str) -> String {
    let mut slug = collapse(name);
    loop {
        let stripped = strip_suffix(&slug);
        if stripped == slug {
            return slug;
        }
        slug = stripped;
    }
}

fn collapse(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dot = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dot && !slug.is_empty() {
                slug.push('.');
            }
            pending_dot = false;
            slug.push(c);
        } else {
            pending_dot = true;
        }
    }
    slug
}

fn strip_suffix(slug: &str) -> String {
    let stripped = if let Some(rest) = slug.strip_suffix("workflow") {
        rest
    } else if slug == "flow" {
        ""
    } else if let Some(rest) = slug.strip_suffix(".flow") {
        rest
    } else {
        slug
    };
    stripped.trim_matches('.').to_string()
}

/// Queue prefix policy: empty stays empty, anything else ends with one `.`
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}.")
    }
}

/// Scheme part of a DSN, lowercased
pub fn dsn_scheme(dsn: &str) -> Option<String> {
    dsn.split_once("://")
        .map(|(scheme, _)| scheme.trim().to_ascii_lowercase())
        .filter(|scheme| !scheme.is_empty())
}

/// Whether the DSN targets a shared relational/durable store
pub fn is_shared_store_dsn(dsn: &str) -> bool {
    dsn_scheme(dsn).is_some_and(|scheme| SHARED_STORE_SCHEMES.contains(&scheme.as_str()))
}

/// Prefix actually applied for a DSN; shared stores never get one
pub fn effective_prefix(prefix: &str, dsn: &str) -> String {
    if is_shared_store_dsn(dsn) {
        String::new()
    } else {
        normalize_prefix(prefix)
    }
}

/// `(workflow_slug, transition_slug)` for a raw pair
pub fn slug_pair(workflow: &str, transition: &str) -> (String, String) {
    (normalize_slug(workflow), normalize_slug(transition))
}

/// `<prefix><workflow_slug>.<transition_slug>`
///
/// `prefix` is used as given; pass it through [`normalize_prefix`] first.
pub fn queue_address(prefix: &str, workflow_slug: &str, transition_slug: &str) -> String {
    format!("{prefix}{workflow_slug}.{transition_slug}")
}

/// Table name for the queue at `address` outside shared stores
pub fn table_name_for(address: &str) -> String {
    let table: String = address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("messenger_{}", table.to_ascii_lowercase())
}
