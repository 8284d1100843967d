pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Non-empty trimmed pieces between runs of `.`, `!` and `?`.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

pub fn mean_token_length<'a, I>(tokens: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a str>,
{
    let (total, count) = tokens
        .into_iter()
        .fold((0usize, 0usize), |(total, count), token| {
            (total + char_len(token), count + 1)
        });

    if count == 0 {
        None
    } else {
        Some(total as f64 / count as f64)
    }
}

/// Characters that are neither word characters nor whitespace.
pub fn special_char_count(text: &str) -> usize {
    text.chars()
        .filter(|character| !is_word_char(*character) && !character.is_whitespace())
        .count()
}

pub fn special_char_ratio(text: &str) -> f64 {
    special_char_count(text) as f64 / char_len(text).max(1) as f64
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round3(value: f64) -> f64 {
    round_to(value, 3)
}

fn is_word_char(character: char) -> bool {
    character.is_alphanumeric() || character == '_'
}
