//! Path aliases.
//!
//! `link(to, from)` makes writes and notifications on `from` (or below it)
//! re-raise on `to`, and the other way round, until `unlink(to)`.

use tempera_carton::CompactString;
use tempera_relief::path::{self, AsPath};

/// One alias pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLink {
    pub alias: CompactString,
    pub target: CompactString,
}

#[derive(Debug, Clone, Default)]
pub struct PathLinker {
    links: Vec<PathLink>,
}

impl PathLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `to` with `from`. Relinking an alias replaces its target.
    pub fn link<A: AsPath + ?Sized, B: AsPath + ?Sized>(&mut self, to: &A, from: &B) {
        let alias = path::normalize(to);
        let target = path::normalize(from);
        match self.links.iter_mut().find(|l| l.alias == alias) {
            Some(link) => link.target = target,
            None => self.links.push(PathLink { alias, target }),
        }
    }

    /// Returns whether a link was removed.
    pub fn unlink<P: AsPath + ?Sized>(&mut self, to: &P) -> bool {
        let alias = path::normalize(to);
        let before = self.links.len();
        self.links.retain(|l| l.alias != alias);
        before != self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> &[PathLink] {
        &self.links
    }

    /// Paths a change at `path` must be re-raised on.
    pub fn linked_paths(&self, path: &str) -> Vec<CompactString> {
        let mut out = Vec::new();
        for link in &self.links {
            if let Some(p) = path::translate(&link.alias, &link.target, path) {
                out.push(p);
            } else if let Some(p) = path::translate(&link.target, &link.alias, path) {
                out.push(p);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempera_relief::PathSegment;

    #[test]
    fn test_symmetric_links() {
        let mut linker = PathLinker::new();
        linker.link("alias.x", "source.x");
        assert_eq!(linker.linked_paths("source.x"), ["alias.x"]);
        assert_eq!(linker.linked_paths("source.x.y"), ["alias.x.y"]);
        assert_eq!(linker.linked_paths("alias.x.y"), ["source.x.y"]);
        assert!(linker.linked_paths("source.xy").is_empty());
        assert!(linker.linked_paths("source").is_empty());
    }

    #[test]
    fn test_segment_paths_and_unlink() {
        let mut linker = PathLinker::new();
        linker.link(&[PathSegment::from("sel"), PathSegment::Index(0)], "items.3");
        assert_eq!(linker.links()[0].alias, "sel.0");
        assert_eq!(linker.linked_paths("items.3.name"), ["sel.0.name"]);
        linker.link("sel.0", "items.4");
        assert_eq!(linker.links().len(), 1);
        assert!(linker.unlink("sel.0"));
        assert!(!linker.unlink("sel.0"));
        assert!(linker.is_empty());
    }
}
