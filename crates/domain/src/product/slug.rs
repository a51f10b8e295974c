use chrono::Utc;

/// Derives a URL slug from a product name.
///
/// The name is lowercased, whitespace and underscores become `-`, anything
/// other than letters, digits and `-` is dropped, runs of `-` collapse, and
/// the current unix time in milliseconds is appended to keep slugs unique.
pub fn slugify(name: &str) -> String {
    format!("{}-{}", slug_base(name), Utc::now().timestamp_millis())
}

fn slug_base(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        let c = if c.is_whitespace() || c == '_' { '-' } else { c };
        if c == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else if c.is_alphanumeric() {
            slug.push(c);
        }
    }

    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "product".to_string()
    } else {
        slug.to_string()
    }
}
