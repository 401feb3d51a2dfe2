//! URL slugs for posts.
//!
//! A slug is derived from the title; collisions are resolved by the store
//! probing `base`, `base-1`, `base-2`, … via [`candidate`].

/// Lowercase the title, keep letters, digits and `-`, turn whitespace into `-`
/// and drop everything else.
pub fn slugify(title: &str) -> String {
    title
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' {
                Some(c)
            } else if c.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Slug base for a title; titles with nothing sluggable fall back to `post`.
pub fn base(title: &str) -> String {
    let s = slugify(title);
    if s.is_empty() { "post".to_string() } else { s }
}

/// The `n`th candidate for a base slug.
pub fn candidate(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{base}-{n}")
    }
}

/// First candidate for which `taken` returns false.
pub fn first_free(base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    let mut n = 0;
    loop {
        let slug = candidate(base, n);
        if !taken(&slug) {
            return slug;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_maps_whitespace_and_drops_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("Rust  2024 - notes"), "rust--2024---notes");
        assert_eq!(slugify("Привет Мир"), "привет-мир");
        assert_eq!(slugify("?!"), "");
        assert_eq!(base("?!"), "post");
        assert_eq!(base("Hi there"), "hi-there");
    }

    #[test]
    fn candidates_get_numeric_suffix() {
        assert_eq!(candidate("post", 0), "post");
        assert_eq!(candidate("post", 3), "post-3");
    }

    #[test]
    fn first_free_tries_suffixes_in_order() {
        let existing = ["my-post", "my-post-1"];
        let slug = first_free("my-post", |s| existing.contains(&s));
        assert_eq!(slug, "my-post-2");
        assert_eq!(first_free("fresh", |_| false), "fresh");
    }
}
