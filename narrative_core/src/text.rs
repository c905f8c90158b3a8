//! Text measurement and slicing shared by the assemblers and checkers.
//!
//! Sizes are counted in word-equivalents: every CJK ideograph counts as one,
//! every other whitespace-separated run counts as one.

use std::collections::HashSet;

pub use story_bible::{is_cjk, word_count};

/// Appended wherever text was cut to fit a cap.
pub const TRUNCATION_MARKER: &str = "[…]";

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "chapter", "could", "every", "from",
    "have", "into", "more", "most", "must", "only", "over", "should", "some", "such", "than",
    "that", "their", "them", "then", "there", "these", "they", "this", "those", "through",
    "unit", "until", "volume", "were", "what", "when", "where", "which", "while", "will",
    "with", "would", "your",
];

/// Estimated token cost of a text: four tokens per three word-equivalents, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    (word_count(text) * 4 + 2) / 3
}

/// Split text into paragraphs separated by blank lines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Split text into trimmed sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut after_terminator = false;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let end = idx + ch.len_utf8();
        let next_is_break = chars.peek().map_or(true, |(_, next)| next.is_whitespace());

        let boundary = match ch {
            '。' | '！' | '？' | '\n' => true,
            '.' | '!' | '?' => next_is_break,
            '"' | '\'' | '”' | '’' | '」' => after_terminator && next_is_break,
            _ => false,
        };
        after_terminator = matches!(ch, '.' | '!' | '?' | '。' | '！' | '？');

        if boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

/// Whether the character next to a match leaves the match a whole word.
/// `None` is the edge of the text.
pub fn is_word_boundary(adjacent: Option<char>) -> bool {
    adjacent.map_or(true, |c| !c.is_alphanumeric())
}

/// Case-insensitive phrase search respecting word boundaries for non-CJK text.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let haystack = haystack.to_lowercase();
    let cjk_start = needle.chars().next().is_some_and(is_cjk);
    let cjk_end = needle.chars().last().is_some_and(is_cjk);

    for (idx, _) in haystack.match_indices(&needle) {
        let before_ok = cjk_start || is_word_boundary(haystack[..idx].chars().last());
        let after_ok = cjk_end || is_word_boundary(haystack[idx + needle.len()..].chars().next());
        if before_ok && after_ok {
            return true;
        }
    }

    false
}

/// Cut text to at most `cap` word-equivalents, marker included.
///
/// Returns the text and whether it was cut.
pub fn truncate_words(text: &str, cap: usize) -> (String, bool) {
    if word_count(text) <= cap {
        return (text.to_string(), false);
    }
    if cap == 0 {
        return (String::new(), true);
    }

    let keep = cap - 1;
    let mut count = 0;
    let mut in_word = false;
    let mut end = 0;

    for (idx, ch) in text.char_indices() {
        if is_cjk(ch) {
            if count == keep {
                break;
            }
            count += 1;
            in_word = false;
            end = idx + ch.len_utf8();
        } else if ch.is_whitespace() {
            in_word = false;
        } else {
            if !in_word {
                if count == keep {
                    break;
                }
                count += 1;
                in_word = true;
            }
            end = idx + ch.len_utf8();
        }
    }

    let kept = text[..end].trim_end();
    if kept.is_empty() {
        (TRUNCATION_MARKER.to_string(), true)
    } else {
        (format!("{} {}", kept, TRUNCATION_MARKER), true)
    }
}

/// Cut text to at most `cap` word-equivalents, preferring whole sentences.
///
/// Falls back to a word cut when the first sentence alone is over the cap.
pub fn truncate_sentences(text: &str, cap: usize) -> (String, bool) {
    if word_count(text) <= cap {
        return (text.to_string(), false);
    }

    let budget = cap.saturating_sub(1);
    let mut kept: Vec<&str> = Vec::new();
    let mut used = 0;
    for sentence in split_sentences(text) {
        let words = word_count(sentence);
        if used + words > budget {
            break;
        }
        used += words;
        kept.push(sentence);
    }

    if kept.is_empty() {
        return truncate_words(text, cap);
    }
    (format!("{} {}", kept.join(" "), TRUNCATION_MARKER), true)
}

/// Content keywords of a text: lowercased words of four or more letters that
/// are not stopwords, plus CJK bigrams. Order of first appearance, deduplicated.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |word: String| {
        if seen.insert(word.clone()) {
            out.push(word);
        }
    };

    let mut cjk_run: Vec<char> = Vec::new();
    let mut word = String::new();

    let flush_word = |word: &mut String, push: &mut dyn FnMut(String)| {
        if word.chars().count() >= 4 && !STOPWORDS.contains(&word.as_str()) {
            push(word.clone());
        }
        word.clear();
    };
    let flush_cjk = |run: &mut Vec<char>, push: &mut dyn FnMut(String)| {
        if run.len() == 1 {
            push(run[0].to_string());
        }
        for pair in run.windows(2) {
            push(pair.iter().collect());
        }
        run.clear();
    };

    for ch in text.chars() {
        if is_cjk(ch) {
            flush_word(&mut word, &mut push);
            cjk_run.push(ch);
        } else if ch.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut push);
            word.extend(ch.to_lowercase());
        } else {
            flush_word(&mut word, &mut push);
            flush_cjk(&mut cjk_run, &mut push);
        }
    }
    flush_word(&mut word, &mut push);
    flush_cjk(&mut cjk_run, &mut push);

    out
}

/// Lowercased word set for overlap measures; CJK runs are kept whole.
pub fn term_set(text: &str) -> HashSet<String> {
    let mut terms = HashSet::new();
    let mut word = String::new();
    let mut cjk = String::new();

    for ch in text.chars() {
        if is_cjk(ch) {
            if !word.is_empty() {
                terms.insert(std::mem::take(&mut word));
            }
            cjk.push(ch);
        } else if ch.is_alphanumeric() {
            if !cjk.is_empty() {
                terms.insert(std::mem::take(&mut cjk));
            }
            word.extend(ch.to_lowercase());
        } else {
            if !word.is_empty() {
                terms.insert(std::mem::take(&mut word));
            }
            if !cjk.is_empty() {
                terms.insert(std::mem::take(&mut cjk));
            }
        }
    }
    if !word.is_empty() {
        terms.insert(word);
    }
    if !cjk.is_empty() {
        terms.insert(cjk);
    }

    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one"), 2);
        assert_eq!(estimate_tokens("one two three"), 4);
    }

    #[test]
    fn test_split_paragraphs() {
        let text = "First line.\nStill first.\n\n\nSecond.\n   \nThird.";
        let paragraphs = split_paragraphs(text);
        assert_eq!(paragraphs.len(), 3);
        assert_eq!(paragraphs[0], "First line.\nStill first.");
        assert_eq!(paragraphs[2], "Third.");
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("Mira ran. \"Stop!\" she said. The end");
        assert_eq!(sentences, vec!["Mira ran.", "\"Stop!\"", "she said.", "The end"]);

        let sentences = split_sentences("研究站被廢棄。船員失蹤了。");
        assert_eq!(sentences.len(), 2);

        // Decimal points do not split.
        assert_eq!(split_sentences("It cost 3.5 credits.").len(), 1);
    }

    #[test]
    fn test_contains_phrase_word_boundaries() {
        assert!(contains_phrase("The Research Station was quiet.", "research station"));
        assert!(!contains_phrase("The stationary drone hummed.", "station"));
        assert!(contains_phrase("她走進研究站。", "研究站"));
        assert!(!contains_phrase("anything", ""));
    }

    #[test]
    fn test_truncate_words_respects_cap() {
        let (text, cut) = truncate_words("one two three four five", 3);
        assert!(cut);
        assert_eq!(text, "one two […]");
        assert_eq!(word_count(&text), 3);

        let (text, cut) = truncate_words("short", 3);
        assert!(!cut);
        assert_eq!(text, "short");
    }

    #[test]
    fn test_truncate_sentences_keeps_whole_sentences() {
        let (text, cut) = truncate_sentences("One two. Three four. Five six seven.", 5);
        assert!(cut);
        assert_eq!(text, "One two. Three four. […]");
        assert!(word_count(&text) <= 5);

        let (text, _) = truncate_sentences("A very long first sentence indeed.", 3);
        assert_eq!(text, "A very […]");
    }

    #[test]
    fn test_keywords() {
        let words = keywords("Destroy the reactor before the reactor destroys them. 摧毀反應爐");
        assert_eq!(words[0], "destroy");
        assert!(words.contains(&"reactor".to_string()));
        assert!(!words.contains(&"before".to_string()));
        assert!(!words.contains(&"them".to_string()));
        assert!(words.contains(&"摧毀".to_string()));
        assert!(words.contains(&"應爐".to_string()));
        assert_eq!(words.iter().filter(|w| *w == "reactor").count(), 1);
    }

    #[test]
    fn test_term_set() {
        let terms = term_set("The hero met 老人 in the forest.");
        assert!(terms.contains("hero"));
        assert!(terms.contains("老人"));
        assert!(terms.contains("the"));
    }
}
