//! A small structured stylesheet model.
//!
//! Vector snapshots must be self-contained, but the engine's stylesheet also carries editor
//! rules. [`Stylesheet::scoped`] keeps only rules for the node structure; [`embeddable_css`]
//! falls back to the whole sheet when scoping leaves almost nothing.

/// Selector prefixes for the structural parts of a node.
pub const STRUCTURAL_SELECTOR_PREFIXES: &[&str] = &[
    ".node-container",
    ".node-header",
    ".role-group",
    ".person-row",
    ".single-person",
];

/// Scoped output shorter than this is treated as a failed extraction.
pub const MIN_SCOPED_CSS_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    Style {
        selectors: Vec<String>,
        declarations: String,
    },
    /// `@media`, `@font-face`, ... kept verbatim and never matched by selector filters.
    At { prelude: String, block: String },
}

impl CssRule {
    fn write_to(&self, out: &mut String) {
        match self {
            CssRule::Style {
                selectors,
                declarations,
            } => {
                out.push_str(&selectors.join(", "));
                out.push_str(" { ");
                out.push_str(declarations);
                out.push_str(" }\n");
            }
            CssRule::At { prelude, block } => {
                out.push_str(prelude);
                out.push_str(" {");
                out.push_str(block);
                out.push_str("}\n");
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
}

impl Stylesheet {
    /// Parses `css` into top-level rules. Comments are dropped; malformed trailing input is
    /// ignored.
    pub fn parse(css: &str) -> Self {
        let text = strip_comments(css);
        let bytes = text.as_bytes();
        let mut rules = Vec::new();
        let mut i = 0usize;

        while i < bytes.len() {
            let Some(open_rel) = find_unquoted(&text[i..], b'{') else {
                break;
            };
            let open = i + open_rel;
            let prelude = text[i..open].trim();
            let Some(close) = matching_brace(&text, open) else {
                break;
            };
            let block = &text[open + 1..close];
            i = close + 1;

            if prelude.is_empty() {
                continue;
            }
            if prelude.starts_with('@') {
                rules.push(CssRule::At {
                    prelude: prelude.to_string(),
                    block: block.to_string(),
                });
                continue;
            }
            let selectors: Vec<String> = prelude
                .split(',')
                .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|s| !s.is_empty())
                .collect();
            if selectors.is_empty() {
                continue;
            }
            let declarations = block
                .split(';')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            rules.push(CssRule::Style {
                selectors,
                declarations: if declarations.is_empty() {
                    declarations
                } else {
                    format!("{declarations};")
                },
            });
        }

        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Keeps style rules where at least one selector satisfies `keep`.
    pub fn filter(&self, keep: impl Fn(&str) -> bool) -> Self {
        let rules = self
            .rules
            .iter()
            .filter(|r| match r {
                CssRule::Style { selectors, .. } => selectors.iter().any(|s| keep(s)),
                CssRule::At { .. } => false,
            })
            .cloned()
            .collect();
        Self { rules }
    }

    pub fn scoped(&self) -> Self {
        self.filter(|sel| {
            STRUCTURAL_SELECTOR_PREFIXES
                .iter()
                .any(|prefix| sel.starts_with(prefix))
        })
    }

    pub fn to_css(&self) -> String {
        let mut out = String::new();
        for r in &self.rules {
            r.write_to(&mut out);
        }
        out
    }
}

/// CSS to inline into a standalone vector snapshot.
pub fn embeddable_css(sheet: &Stylesheet) -> String {
    let scoped = sheet.scoped().to_css();
    if scoped.trim().len() < MIN_SCOPED_CSS_LEN {
        tracing::warn!(
            scoped_len = scoped.len(),
            "scoped stylesheet is near-empty, embedding full stylesheet"
        );
        return sheet.to_css();
    }
    scoped
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn find_unquoted(s: &str, needle: u8) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in s.as_bytes().iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == needle => return Some(i),
            None => {}
        }
    }
    None
}

fn matching_brace(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in s.as_bytes().iter().enumerate().skip(open) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}
