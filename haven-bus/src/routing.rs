use crate::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Word(String),
    /// exactly one word
    Star,
    /// zero or more words
    Hash,
}

/// Topic binding pattern: dot-separated words where `*` matches one word
/// and `#` matches zero or more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutingPattern {
    pub fn parse(raw: &str) -> Result<Self, BusError> {
        if raw.is_empty() {
            return Err(BusError::InvalidPattern(raw.to_string()));
        }

        let mut segments = Vec::new();
        for word in raw.split('.') {
            let segment = match word {
                "*" => Segment::Star,
                "#" => Segment::Hash,
                w if w.is_empty() || w.contains('*') || w.contains('#') => {
                    return Err(BusError::InvalidPattern(raw.to_string()));
                }
                w => Segment::Word(w.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        let words: Vec<&str> = routing_key.split('.').collect();
        match_words(&self.segments, &words)
    }

    /// Anchored regex equivalent, for brokers that subscribe by topic regex.
    /// `#` is approximated as "anything", so `a.#` requires at least `a.`.
    pub fn to_regex(&self) -> String {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Word(w) => escape(w),
                Segment::Star => "[^.]+".to_string(),
                Segment::Hash => ".*".to_string(),
            })
            .collect();
        format!("^{}$", parts.join("\\."))
    }
}

/// Routing keys are concrete: no empty words, no wildcards.
pub fn validate_routing_key(routing_key: &str) -> Result<(), BusError> {
    let valid = !routing_key.is_empty()
        && routing_key
            .split('.')
            .all(|w| !w.is_empty() && !w.contains('*') && !w.contains('#'));
    if valid {
        Ok(())
    } else {
        Err(BusError::InvalidRoutingKey(routing_key.to_string()))
    }
}

fn match_words(pattern: &[Segment], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((Segment::Hash, rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((Segment::Star, rest)) => !key.is_empty() && match_words(rest, &key[1..]),
        Some((Segment::Word(word), rest)) => {
            key.first() == Some(&word.as_str()) && match_words(rest, &key[1..])
        }
    }
}

fn escape(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_exactly_one_word() {
        let pattern = RoutingPattern::parse("hotel.*").unwrap();
        assert!(pattern.matches("hotel.created"));
        assert!(pattern.matches("hotel.deleted"));
        assert!(!pattern.matches("hotel"));
        assert!(!pattern.matches("hotel.photos.updated"));
        assert!(!pattern.matches("booking.created"));
    }

    #[test]
    fn test_hash_matches_zero_or_more_words() {
        let pattern = RoutingPattern::parse("hotel.#").unwrap();
        assert!(pattern.matches("hotel"));
        assert!(pattern.matches("hotel.created"));
        assert!(pattern.matches("hotel.photos.updated"));

        let middle = RoutingPattern::parse("#.deleted").unwrap();
        assert!(middle.matches("hotel.deleted"));
        assert!(middle.matches("deleted"));
        assert!(!middle.matches("hotel.deleted.audit"));
    }

    #[test]
    fn test_rejects_malformed_patterns_and_keys() {
        assert!(RoutingPattern::parse("").is_err());
        assert!(RoutingPattern::parse("hotel..created").is_err());
        assert!(RoutingPattern::parse("hotel.cre*").is_err());
        assert!(validate_routing_key("hotel.*").is_err());
        assert!(validate_routing_key("hotel.created").is_ok());
    }

    #[test]
    fn test_regex_translation() {
        assert_eq!(RoutingPattern::parse("hotel.*").unwrap().to_regex(), "^hotel\\.[^.]+$");
        assert_eq!(RoutingPattern::parse("hotel.#").unwrap().to_regex(), "^hotel\\..*$");
    }
}
