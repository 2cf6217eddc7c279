//! Step name slugs

/// Turn a step name into a key-safe slug.
///
/// `"Run Tests"`, `"run_tests"` and `"runTests"` all become `"run-tests"`.
pub fn slugify(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            pending_dash = true;
            continue;
        }

        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let camel_boundary = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let acronym_boundary = prev.is_ascii_uppercase() && next_is_lower;
            if camel_boundary || acronym_boundary {
                pending_dash = true;
            }
        }

        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(c.to_ascii_lowercase());
    }

    slug
}
