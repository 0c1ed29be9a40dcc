use crate::event::Reference;

/// Ordered, append-only set of references known to one session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceResolver {
    references: Vec<Reference>,
}

impl ReferenceResolver {
    /// Appends newly announced references in arrival order.
    pub fn extend(&mut self, references: impl IntoIterator<Item = Reference>) {
        self.references.extend(references);
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Rewrites every `[{id}]` marker of a known reference into a markdown link.
    pub fn format(&self, text: &str) -> String {
        let mut formatted = text.to_string();
        for reference in &self.references {
            if reference.id.is_empty() {
                continue;
            }
            let marker = format!("[{}]", reference.id);
            if !formatted.contains(&marker) {
                continue;
            }
            let link = format!("[【资料{}】]({})", reference.id, reference.url);
            formatted = formatted.replace(&marker, &link);
        }
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ReferenceResolver {
        let mut resolver = ReferenceResolver::default();
        resolver.extend([Reference::new("1", "http://x"), Reference::new("2", "http://y")]);
        resolver
    }

    #[test]
    fn replaces_every_marker_with_link() {
        let out = resolver().format("见[1]和[2]，另见[1]。");
        assert_eq!(
            out,
            "见[【资料1】](http://x)和[【资料2】](http://y)，另见[【资料1】](http://x)。"
        );
    }

    #[test]
    fn unknown_markers_are_left_alone() {
        assert_eq!(resolver().format("see [3]"), "see [3]");
        assert_eq!(ReferenceResolver::default().format("see [1]"), "see [1]");
    }

    #[test]
    fn formatting_is_idempotent() {
        let resolver = resolver();
        let once = resolver.format("a [1] b [2] c");
        assert_eq!(resolver.format(&once), once);
    }

    #[test]
    fn references_keep_arrival_order() {
        let mut resolver = resolver();
        resolver.extend([Reference::new("0", "http://z")]);
        let ids: Vec<&str> = resolver.references().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "0"]);
        assert_eq!(resolver.len(), 3);
    }
}
