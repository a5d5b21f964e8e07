//! Content expressions such as `"paragraph block*"` or `"(text | image)*"`.

/// One element of a content expression: a set of allowed node types with a
/// repetition range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTerm {
    choices: Vec<String>,
    min: usize,
    max: Option<usize>,
}

impl ContentTerm {
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    fn accepts(&self, name: &str) -> bool {
        self.choices.iter().any(|c| c == name)
    }
}

/// A parsed content expression. An empty expression only matches empty
/// content (leaf nodes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentExpr {
    terms: Vec<ContentTerm>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContentExprError {
    Unknown(String),
    Syntax(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Name(String),
    Open,
    Close,
    Pipe,
    Star,
    Plus,
    Question,
    Range(usize, Option<usize>),
}

fn tokenize(expr: &str) -> Result<Vec<Tok>, ContentExprError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Tok::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::Close);
            }
            '|' => {
                chars.next();
                tokens.push(Tok::Pipe);
            }
            '*' => {
                chars.next();
                tokens.push(Tok::Star);
            }
            '+' => {
                chars.next();
                tokens.push(Tok::Plus);
            }
            '?' => {
                chars.next();
                tokens.push(Tok::Question);
            }
            '{' => {
                chars.next();
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => body.push(ch),
                        None => return Err(ContentExprError::Syntax("unclosed `{`".into())),
                    }
                }
                tokens.push(parse_range(&body)?);
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Name(name));
            }
            other => {
                return Err(ContentExprError::Syntax(format!(
                    "unexpected character `{other}`"
                )))
            }
        }
    }
    Ok(tokens)
}

fn parse_range(body: &str) -> Result<Tok, ContentExprError> {
    let bad = || ContentExprError::Syntax(format!("invalid range `{{{body}}}`"));
    let parse = |s: &str| s.trim().parse::<usize>().map_err(|_| bad());
    match body.split_once(',') {
        None => {
            let n = parse(body)?;
            Ok(Tok::Range(n, Some(n)))
        }
        Some((lo, hi)) if hi.trim().is_empty() => Ok(Tok::Range(parse(lo)?, None)),
        Some((lo, hi)) => {
            let (lo, hi) = (parse(lo)?, parse(hi)?);
            if hi < lo {
                return Err(bad());
            }
            Ok(Tok::Range(lo, Some(hi)))
        }
    }
}

impl ContentExpr {
    /// Parse `expr`, resolving every name to the node types it stands for
    /// (a node name resolves to itself, a group to its members).
    pub(crate) fn parse<F>(expr: &str, resolve: F) -> Result<Self, ContentExprError>
    where
        F: Fn(&str) -> Option<Vec<String>>,
    {
        let tokens = tokenize(expr)?;
        let mut terms = Vec::new();
        let mut pos = 0;

        while pos < tokens.len() {
            let mut choices = Vec::new();
            match &tokens[pos] {
                Tok::Name(name) => {
                    choices.extend(resolve(name).ok_or_else(|| ContentExprError::Unknown(name.clone()))?);
                    pos += 1;
                }
                Tok::Open => {
                    pos += 1;
                    loop {
                        match tokens.get(pos) {
                            Some(Tok::Name(name)) => {
                                for member in resolve(name)
                                    .ok_or_else(|| ContentExprError::Unknown(name.clone()))?
                                {
                                    if !choices.contains(&member) {
                                        choices.push(member);
                                    }
                                }
                                pos += 1;
                            }
                            _ => return Err(ContentExprError::Syntax("expected a type name".into())),
                        }
                        match tokens.get(pos) {
                            Some(Tok::Pipe) => pos += 1,
                            Some(Tok::Close) => {
                                pos += 1;
                                break;
                            }
                            _ => return Err(ContentExprError::Syntax("expected `|` or `)`".into())),
                        }
                    }
                }
                other => {
                    return Err(ContentExprError::Syntax(format!("unexpected {other:?}")));
                }
            }

            let (min, max) = match tokens.get(pos) {
                Some(Tok::Star) => (0, None),
                Some(Tok::Plus) => (1, None),
                Some(Tok::Question) => (0, Some(1)),
                Some(Tok::Range(lo, hi)) => (*lo, *hi),
                _ => (1, Some(1)),
            };
            if matches!(
                tokens.get(pos),
                Some(Tok::Star | Tok::Plus | Tok::Question | Tok::Range(..))
            ) {
                pos += 1;
            }
            terms.push(ContentTerm { choices, min, max });
        }

        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[ContentTerm] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether `name` may appear anywhere in content matching this expression.
    pub fn allows(&self, name: &str) -> bool {
        self.terms.iter().any(|t| t.accepts(name))
    }

    /// Every node type mentioned by the expression, in order of first
    /// appearance.
    pub fn mentioned(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for term in &self.terms {
            for choice in &term.choices {
                if !out.contains(&choice.as_str()) {
                    out.push(choice);
                }
            }
        }
        out
    }

    /// The types that must be created to satisfy the expression when no
    /// content is given: the first choice of every required term.
    pub fn required_fill(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for term in &self.terms {
            if let Some(first) = term.choices.first() {
                for _ in 0..term.min {
                    out.push(first.as_str());
                }
            }
        }
        out
    }

    /// Check a sequence of child type names against the expression.
    pub fn matches(&self, names: &[&str]) -> bool {
        self.match_from(0, names)
    }

    fn match_from(&self, term_index: usize, names: &[&str]) -> bool {
        let Some(term) = self.terms.get(term_index) else {
            return names.is_empty();
        };
        let mut taken = 0;
        let limit = term.max.unwrap_or(usize::MAX);
        let mut ends = Vec::new();
        loop {
            if taken >= term.min {
                ends.push(taken);
            }
            if taken == limit || taken == names.len() || !term.accepts(names[taken]) {
                break;
            }
            taken += 1;
        }
        // Greedy first, then back off.
        ends.into_iter()
            .rev()
            .any(|end| self.match_from(term_index + 1, &names[end..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(name: &str) -> Option<Vec<String>> {
        match name {
            "block" => Some(vec!["paragraph".into(), "heading".into()]),
            "inline" => Some(vec!["text".into(), "image".into()]),
            "paragraph" | "heading" | "text" | "image" | "list_item" => Some(vec![name.into()]),
            _ => None,
        }
    }

    #[test]
    fn matches_groups_and_quantifiers() {
        let expr = ContentExpr::parse("block+", resolve).unwrap();
        assert!(expr.matches(&["paragraph", "heading"]));
        assert!(!expr.matches(&[]));
        assert!(!expr.matches(&["text"]));

        let expr = ContentExpr::parse("paragraph block*", resolve).unwrap();
        assert!(expr.matches(&["paragraph"]));
        assert!(expr.matches(&["paragraph", "paragraph", "heading"]));
        assert!(!expr.matches(&["heading"]));
    }

    #[test]
    fn parenthesized_alternatives() {
        let expr = ContentExpr::parse("(text | image)*", resolve).unwrap();
        assert!(expr.matches(&[]));
        assert!(expr.matches(&["image", "text", "image"]));
        assert!(expr.allows("image"));
        assert!(!expr.allows("paragraph"));
    }

    #[test]
    fn ranges_and_backtracking() {
        let expr = ContentExpr::parse("paragraph{1,2} paragraph", resolve).unwrap();
        assert!(expr.matches(&["paragraph", "paragraph"]));
        assert!(expr.matches(&["paragraph", "paragraph", "paragraph"]));
        assert!(!expr.matches(&["paragraph"]));
    }

    #[test]
    fn unknown_reference_is_reported() {
        assert_eq!(
            ContentExpr::parse("paragraph widget*", resolve),
            Err(ContentExprError::Unknown("widget".into()))
        );
        assert!(matches!(
            ContentExpr::parse("(paragraph", resolve),
            Err(ContentExprError::Syntax(_))
        ));
    }

    #[test]
    fn required_fill_uses_first_choice() {
        let expr = ContentExpr::parse("block+ list_item?", resolve).unwrap();
        assert_eq!(expr.required_fill(), vec!["paragraph"]);
    }
}
