/// Strips line breaks and tabs, trims, and cuts to `max_chars` characters.
pub fn clean_subject(raw: &str, max_chars: usize) -> String {
    let flat: String = raw
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\t'))
        .collect();
    flat.trim().chars().take(max_chars).collect()
}

/// `prefix + subject`, cut to `max_chars`. A subject that already carries the
/// prefix is not prefixed again.
pub fn reply_subject(prefix: &str, subject: &str, max_chars: usize) -> String {
    if subject.starts_with(prefix) {
        return subject.chars().take(max_chars).collect();
    }
    prefix.chars().chain(subject.chars()).take(max_chars).collect()
}

/// Lower-cased words for the subject search cache, deduplicated and sorted.
pub fn subject_words(subject: &str) -> Vec<String> {
    let mut words: Vec<String> = subject
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 1)
        .map(|word| word.to_lowercase().chars().take(20).collect())
        .collect();
    words.sort();
    words.dedup();
    words
}
