use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "brave", "calm", "clever", "eager", "gentle", "happy", "keen", "lively",
    "merry", "proud", "quick", "quiet", "sunny", "swift", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "falcon", "heron", "lynx", "marmot", "otter", "panda", "puffin",
    "raven", "salmon", "sparrow", "tiger", "walrus", "wombat", "yak",
];

/// 3-20 chars, lowercase alphanumeric plus underscore, starting with a letter.
pub fn is_valid_username(username: &str) -> bool {
    if username.len() < 3 || username.len() > 20 {
        return false;
    }
    let mut chars = username.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// adjective_noun_NN suggestion for signups that omit a username.
pub fn generate_random_username() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    format!("{}_{}_{:02}", adjective, noun, rng.gen_range(0..100))
}

/// Escape a user-supplied prefix before it lands inside a $regex query.
pub fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
