use std::ops::Range;

/// Find-in-preview state. Match ranges are in chars, not bytes.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub query: String,
    pub case_sensitive: bool,
    pub highlight_all: bool,
    matches: Vec<Range<usize>>,
    current: Option<usize>,
    // False until navigation has visited `current` since the last rebuild.
    landed: bool,
    searched: Option<(String, bool, u64)>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            query: String::new(),
            case_sensitive: false,
            highlight_all: true,
            matches: Vec::new(),
            current: None,
            landed: false,
            searched: None,
        }
    }
}

impl SearchState {
    /// Non-overlapping occurrences of `query` in `text`, left to right.
    pub fn find_matches(text: &str, query: &str, case_sensitive: bool) -> Vec<Range<usize>> {
        if query.is_empty() {
            return Vec::new();
        }
        let fold = |c: char| {
            if case_sensitive {
                c
            } else {
                c.to_lowercase().next().unwrap_or(c)
            }
        };
        let haystack: Vec<char> = text.chars().map(fold).collect();
        let needle: Vec<char> = query.chars().map(fold).collect();

        let mut found = Vec::new();
        let mut i = 0;
        while i + needle.len() <= haystack.len() {
            if haystack[i..i + needle.len()] == needle[..] {
                found.push(i..i + needle.len());
                i += needle.len();
            } else {
                i += 1;
            }
        }
        found
    }

    /// Recompute matches when the query, case mode or text version changed.
    /// Returns true if the match list was rebuilt.
    pub fn refresh(&mut self, text: &str, version: u64) -> bool {
        let key = (self.query.clone(), self.case_sensitive, version);
        if self.searched.as_ref() == Some(&key) {
            return false;
        }
        self.matches = Self::find_matches(text, &self.query, self.case_sensitive);
        self.current = if self.matches.is_empty() { None } else { Some(0) };
        self.landed = false;
        self.searched = Some(key);
        true
    }

    /// The first call after a rebuild stays on the first match.
    pub fn next(&mut self) -> Option<Range<usize>> {
        if self.matches.is_empty() {
            return None;
        }
        if !self.landed && self.current.is_some() {
            self.landed = true;
            return self.current_match();
        }
        self.landed = true;
        let len = self.matches.len();
        let index = match self.current {
            Some(i) => (i + 1) % len,
            None => 0,
        };
        self.current = Some(index);
        self.current_match()
    }

    pub fn previous(&mut self) -> Option<Range<usize>> {
        if self.matches.is_empty() {
            return None;
        }
        let len = self.matches.len();
        let index = match self.current {
            Some(i) => (i + len - 1) % len,
            None => len - 1,
        };
        self.current = Some(index);
        self.landed = true;
        self.current_match()
    }

    pub fn current_match(&self) -> Option<Range<usize>> {
        self.current.and_then(|i| self.matches.get(i).cloned())
    }

    pub fn matches(&self) -> &[Range<usize>] {
        &self.matches
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn summary(&self) -> String {
        match self.current {
            _ if self.query.is_empty() => String::new(),
            Some(i) if !self.matches.is_empty() => format!("{} of {}", i + 1, self.match_count()),
            _ => "No matches".to_string(),
        }
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.matches.clear();
        self.current = None;
        self.landed = false;
        self.searched = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_by_default() {
        let found = SearchState::find_matches("Table table TABLE", "table", false);
        assert_eq!(found, vec![0..5, 6..11, 12..17]);
        let exact = SearchState::find_matches("Table table TABLE", "table", true);
        assert_eq!(exact, vec![6..11]);
    }

    #[test]
    fn matches_do_not_overlap() {
        assert_eq!(SearchState::find_matches("aaaa", "aa", true), vec![0..2, 2..4]);
    }

    #[test]
    fn ranges_count_chars_not_bytes() {
        let found = SearchState::find_matches("héllo wörld wörld", "wörld", false);
        assert_eq!(found, vec![6..11, 12..17]);
    }

    #[test]
    fn next_and_previous_wrap_around() {
        let mut search = SearchState {
            query: "x".into(),
            ..SearchState::default()
        };
        search.refresh("x.x.x", 1);
        assert_eq!(search.current_match(), Some(0..1));
        assert_eq!(search.next(), Some(0..1));
        assert_eq!(search.next(), Some(2..3));
        assert_eq!(search.next(), Some(4..5));
        assert_eq!(search.next(), Some(0..1));
        assert_eq!(search.previous(), Some(4..5));
        assert_eq!(search.summary(), "3 of 3");
    }

    #[test]
    fn refresh_only_when_inputs_change() {
        let mut search = SearchState {
            query: "a".into(),
            ..SearchState::default()
        };
        assert!(search.refresh("banana", 1));
        assert!(!search.refresh("banana", 1));
        search.case_sensitive = true;
        assert!(search.refresh("banana", 1));
        assert!(search.refresh("bAnana", 2));
        assert_eq!(search.match_count(), 2);
    }

    #[test]
    fn empty_query_or_text_has_no_matches() {
        let mut search = SearchState::default();
        search.refresh("anything", 0);
        assert_eq!(search.next(), None);
        assert_eq!(search.summary(), "");

        search.query = "zzz".into();
        search.refresh("anything", 0);
        assert_eq!(search.summary(), "No matches");
    }

    #[test]
    fn previous_after_rebuild_steps_back_from_first() {
        let mut search = SearchState {
            query: "x".into(),
            ..SearchState::default()
        };
        search.refresh("x.x.x", 1);
        assert_eq!(search.previous(), Some(4..5));
        assert_eq!(search.next(), Some(0..1));
    }
}
