//! Hostmask wildcards for ban and exception lists.

/// Matches `text` against `pattern`, where `*` matches any run of
/// characters and `?` matches exactly one. ASCII case is ignored.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut p, mut t) = (0, 0);
    // Pattern index just past the last `*`, and the text index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p + 1, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Expands a partial mask into full `nick!user@host` form.
///
/// ```text
/// bob          → bob!*@*
/// bob!ident    → bob!ident@*
/// *@host       → *!*@host
/// ident@host   → *!ident@host
/// ```
pub fn normalize_mask(mask: &str) -> String {
    let (nick_user, host) = match mask.split_once('@') {
        Some((left, host)) => (left, if host.is_empty() { "*" } else { host }),
        None => (mask, "*"),
    };

    let (nick, user) = match nick_user.split_once('!') {
        Some((nick, user)) => (nick, user),
        None if mask.contains('@') => ("*", nick_user),
        None => (nick_user, "*"),
    };

    let nick = if nick.is_empty() { "*" } else { nick };
    let user = if user.is_empty() { "*" } else { user };
    format!("{nick}!{user}@{host}")
}
