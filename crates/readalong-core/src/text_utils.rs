//! Text splitting helpers for speech chunking.

/// Split into speakable segments: sentence punctuation first, then whitespace
/// so no segment exceeds `max_chars` (a single longer word is kept whole).
/// Segments are trimmed; blank ones are skipped.
pub fn split_speakable(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    split_sentences(text)
        .into_iter()
        .flat_map(|sentence| wrap_words(&sentence, max_chars))
        .collect()
}

/// Very lightweight sentence splitter based on punctuation.
///
/// A run of terminal punctuation (`...`, `?!`) stays with its sentence, and
/// punctuation only ends a sentence when whitespace or the end of the text
/// follows it, so `3.14` is never cut.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        let ends_sentence = ch == '\n'
            || (is_terminal(ch) && chars.peek().is_none_or(|next| next.is_whitespace()));
        if ends_sentence {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);

    sentences
}

fn is_terminal(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | ';' | '…')
}

fn push_trimmed(out: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn wrap_words(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in sentence.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if !current.is_empty() && needed > max_chars {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_sentence_punctuation() {
        assert_eq!(
            split_speakable("Tere. Kuidas läheb?", 200),
            vec!["Tere.", "Kuidas läheb?"]
        );
    }

    #[test]
    fn punctuation_runs_and_decimals_stay_in_one_sentence() {
        assert_eq!(
            split_sentences("Wait... Tere?! Pi is 3.14 now"),
            vec!["Wait...", "Tere?!", "Pi is 3.14 now"]
        );
        assert_eq!(split_sentences("Jah;ei. Läks\nedasi"), vec!["Jah;ei.", "Läks", "edasi"]);
    }

    #[test]
    fn long_sentences_wrap_on_whitespace() {
        let pieces = split_speakable("one two three four five", 9);
        assert_eq!(pieces, vec!["one two", "three", "four five"]);
        assert!(pieces.iter().all(|p| p.chars().count() <= 9));
    }

    #[test]
    fn oversized_words_stay_whole() {
        assert_eq!(split_speakable("supercalifragilistic", 5), vec!["supercalifragilistic"]);
    }

    #[test]
    fn blank_text_has_no_segments() {
        assert!(split_speakable("  \n ", 10).is_empty());
    }
}
