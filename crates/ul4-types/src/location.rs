use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// The position of a template tag (or literal text run) in its source.
///
/// All offsets are byte offsets into `source`. `starttag..endtag` covers the
/// complete tag including delimiters, `startcode..endcode` the code between
/// them. For literal text both ranges coincide and `kind` is `None`.
///
/// Many AST nodes share one location, so nodes hold `Arc<Location>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub source: Arc<str>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub starttag: usize,
    pub endtag: usize,
    pub startcode: usize,
    pub endcode: usize,
}

impl Location {
    pub fn new(
        source: impl Into<Arc<str>>,
        kind: Option<&str>,
        starttag: usize,
        endtag: usize,
        startcode: usize,
        endcode: usize,
    ) -> Self {
        Self {
            source: source.into(),
            kind: kind.map(str::to_string),
            starttag,
            endtag,
            startcode,
            endcode,
        }
    }

    /// A location for a tag that has no surrounding template source,
    /// e.g. `Location::for_tag("print", "name")` describes `<?print name?>`.
    pub fn for_tag(kind: &str, code: &str) -> Arc<Self> {
        let source = if code.is_empty() {
            format!("<?{kind}?>")
        } else {
            format!("<?{kind} {code}?>")
        };
        let endtag = source.len();
        let endcode = endtag - 2;
        let startcode = endcode - code.len();
        Arc::new(Self::new(source, Some(kind), 0, endtag, startcode, endcode))
    }

    /// A location for a literal text run that has no surrounding source.
    pub fn for_text(text: &str) -> Arc<Self> {
        Arc::new(Self::new(text, None, 0, text.len(), 0, text.len()))
    }

    /// The complete tag, delimiters included.
    pub fn tag(&self) -> &str {
        self.source.get(self.starttag..self.endtag).unwrap_or("")
    }

    /// The code inside the tag.
    pub fn code(&self) -> &str {
        self.source.get(self.startcode..self.endcode).unwrap_or("")
    }

    /// 1-based line and column of the tag start.
    pub fn line_col(&self) -> (usize, usize) {
        let before = self.source.get(..self.starttag).unwrap_or("");
        match before.rfind('\n') {
            Some(lastlinefeed) => {
                let line = before.matches('\n').count() + 1;
                (line, self.starttag - lastlinefeed)
            }
            None => (1, self.starttag + 1),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.line_col();
        write!(
            f,
            "'{}' at {} (line {}, col {})",
            self.tag(),
            self.starttag + 1,
            line,
            col
        )
    }
}
