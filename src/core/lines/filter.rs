/// Substring filter over line text.
///
/// Terms are OR-combined. No terms, or any empty term, matches every line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    terms: Vec<String>,
    case_sensitive: bool,
}

impl FilterSpec {
    /// Filter that matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<I, S>(terms: I, case_sensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms = terms
            .into_iter()
            .map(Into::into)
            .map(|term: String| if case_sensitive { term } else { term.to_lowercase() })
            .collect();

        Self {
            terms,
            case_sensitive,
        }
    }

    /// Split user input on `delimiter`. Empty pieces are kept, so `"ERR,"`
    /// matches every line.
    pub fn parse(input: &str, delimiter: &str, case_sensitive: bool) -> Self {
        if input.is_empty() {
            return Self {
                terms: Vec::new(),
                case_sensitive,
            };
        }
        if delimiter.is_empty() {
            return Self::new([input], case_sensitive);
        }
        Self::new(input.split(delimiter), case_sensitive)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn matches_everything(&self) -> bool {
        self.terms.is_empty() || self.terms.iter().any(String::is_empty)
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.matches_everything() {
            return true;
        }
        if text.is_empty() {
            return false;
        }

        if self.case_sensitive {
            self.terms.iter().any(|term| text.contains(term.as_str()))
        } else {
            let folded = text.to_lowercase();
            self.terms.iter().any(|term| folded.contains(term.as_str()))
        }
    }
}
